use super::payment::Payment;
use serde::{Deserialize, Serialize};

/// One event per payment state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    PaymentCreated { payment: Payment },
    PaymentAccepted { payment: Payment },
    PaymentRejected { payment: Payment },
    PaymentsRejected { payments: Vec<Payment> },
    PaymentsCancelled { payments: Vec<Payment> },
    PaymentUpdated { payment: Payment, old_target: String },
}

impl PaymentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentCreated { .. } => "payment_created",
            PaymentEvent::PaymentAccepted { .. } => "payment_accepted",
            PaymentEvent::PaymentRejected { .. } => "payment_rejected",
            PaymentEvent::PaymentsRejected { .. } => "payments_rejected",
            PaymentEvent::PaymentsCancelled { .. } => "payments_cancelled",
            PaymentEvent::PaymentUpdated { .. } => "payment_updated",
        }
    }
}
