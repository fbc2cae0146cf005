use crate::domain::coins::Coins;
use crate::domain::command::PaymentCommand;
use crate::domain::payment::Payment;
use crate::error::{EscrowError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOp {
    Create,
    Accept,
    Reject,
    RejectAll,
    Cancel,
    Retarget,
}

/// One row of a commands file.
///
/// `reject_all` takes a `;`-separated list of sources, `cancel` a `;`-separated
/// list of external ids, and `retarget` reads the new target from `target`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRecord {
    pub op: CommandOp,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub source_amount: Coins,
    #[serde(default)]
    pub target_amount: Coins,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

impl TryFrom<CommandRecord> for PaymentCommand {
    type Error = EscrowError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let payment = |r: CommandRecord| Payment {
            source: r.source,
            source_amount: r.source_amount,
            target: r.target,
            target_amount: r.target_amount,
            external_id: r.external_id,
        };
        let command = match record.op {
            CommandOp::Create => PaymentCommand::Create(payment(record)),
            CommandOp::Accept => PaymentCommand::Accept(payment(record)),
            CommandOp::Reject => PaymentCommand::Reject {
                target: record.target,
                source: record.source,
                external_id: record.external_id,
            },
            CommandOp::RejectAll => PaymentCommand::RejectAll {
                sources: split_list(&record.source),
                target: record.target,
            },
            CommandOp::Cancel => PaymentCommand::Cancel {
                external_ids: split_list(&record.external_id),
                source: record.source,
            },
            CommandOp::Retarget => PaymentCommand::Retarget {
                source: record.source,
                external_id: record.external_id,
                new_target: record.target,
            },
        };
        Ok(command)
    }
}

/// Reads payment commands from a CSV source.
///
/// Whitespace is trimmed and short rows are accepted; missing trailing
/// columns take their defaults.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and converts each row.
    pub fn commands(self) -> impl Iterator<Item = Result<PaymentCommand>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|result| result.map_err(EscrowError::from).and_then(PaymentCommand::try_from))
    }
}
