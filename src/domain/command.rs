use super::payment::Payment;

/// A payment state transition requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCommand {
    Create(Payment),
    Accept(Payment),
    Reject {
        target: String,
        source: String,
        external_id: String,
    },
    RejectAll {
        target: String,
        sources: Vec<String>,
    },
    Cancel {
        source: String,
        external_ids: Vec<String>,
    },
    Retarget {
        source: String,
        external_id: String,
        new_target: String,
    },
}
