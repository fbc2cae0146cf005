use crate::domain::payment::Payment;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct PaymentRecord<'a> {
    source: &'a str,
    external_id: &'a str,
    source_amount: String,
    target: &'a str,
    target_amount: String,
}

impl<'a> From<&'a Payment> for PaymentRecord<'a> {
    fn from(p: &'a Payment) -> Self {
        Self {
            source: &p.source,
            external_id: &p.external_id,
            source_amount: p.source_amount.to_string(),
            target: &p.target,
            target_amount: p.target_amount.to_string(),
        }
    }
}

/// Writes payments as CSV, one row per payment.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments<'a>(&mut self, payments: impl IntoIterator<Item = &'a Payment>) -> Result<()> {
        for payment in payments {
            self.writer.serialize(PaymentRecord::from(payment))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
