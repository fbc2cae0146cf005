use miette::Diagnostic;
use thiserror::Error;

/// Errors produced by the payment ledger and its collaborators.
#[derive(Error, Debug, Diagnostic)]
pub enum EscrowError {
    #[error("validation error: {0}")]
    #[diagnostic(code(escrow::validation))]
    Validation(String),

    #[error("invalid {role} {address:?}: {reason}")]
    #[diagnostic(code(escrow::invalid_address))]
    InvalidAddress {
        role: &'static str,
        address: String,
        reason: String,
    },

    #[error("no payment found with source {owner} and external id {external_id:?}")]
    #[diagnostic(code(escrow::not_found))]
    NotFound { owner: String, external_id: String },

    #[error("a payment already exists with source {owner} and external id {external_id:?}")]
    #[diagnostic(code(escrow::already_exists))]
    AlreadyExists { owner: String, external_id: String },

    #[error("provided {field} {provided:?} does not equal existing {field} {existing:?}")]
    #[diagnostic(code(escrow::mismatch))]
    Mismatch {
        field: &'static str,
        provided: String,
        existing: String,
    },

    #[error("payment with source {owner} and external id {external_id:?} does not have a target")]
    #[diagnostic(code(escrow::no_target))]
    NoTarget { owner: String, external_id: String },

    #[error("target {target} cannot reject payment with target {payment_target}")]
    #[diagnostic(code(escrow::target_mismatch))]
    TargetMismatch {
        target: String,
        payment_target: String,
    },

    #[error("payment with source {owner} and external id {external_id:?} already has target {target:?}")]
    #[diagnostic(code(escrow::no_change))]
    NoChange {
        owner: String,
        external_id: String,
        target: String,
    },

    #[error("source {owner} does not have any payments for target {target}")]
    #[diagnostic(code(escrow::no_payments_for_source))]
    NoPaymentsForSource { owner: String, target: String },

    #[error("failed to decode payment stored at {key}: {reason}")]
    #[diagnostic(code(escrow::decode))]
    Decode { key: String, reason: String },

    #[error("error sending {amount:?} from {from} to {to}")]
    #[diagnostic(code(escrow::transfer))]
    Transfer {
        from: String,
        to: String,
        amount: String,
        #[source]
        cause: Box<EscrowError>,
    },

    #[error("hold ledger error: {0}")]
    HoldLedger(String),

    #[error("account {account} has insufficient funds: needs {needed:?}, has {available:?}")]
    InsufficientFunds {
        account: String,
        needed: String,
        available: String,
    },

    #[error("amount overflow in denomination {denom:?}")]
    AmountOverflow { denom: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("invalid configuration in {path}: {reason}")]
    #[diagnostic(code(escrow::config))]
    Config { path: String, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl EscrowError {
    /// Invariant violations must abort whatever loaded the state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EscrowError::Invariant(_))
    }
}

/// Consistency violations found while reconciling holds against stored state.
#[derive(Error, Debug, Diagnostic)]
pub enum InvariantViolation {
    #[error("account {account} should have at least {required:?} on hold, but only has {held:?}")]
    #[diagnostic(code(escrow::insufficient_hold))]
    InsufficientHold {
        account: String,
        denom: String,
        required: String,
        held: String,
    },

    #[error("last order id {last_order_id} is less than largest order id {max_order_id}")]
    #[diagnostic(code(escrow::order_id_range))]
    OrderIdRange {
        last_order_id: u64,
        max_order_id: u64,
    },

    #[error("invalid {entry} in state: {cause}")]
    #[diagnostic(code(escrow::invalid_state))]
    InvalidState {
        entry: String,
        #[source]
        cause: Box<EscrowError>,
    },

    #[error("failed to look up amount of {denom:?} on hold for {account}")]
    #[diagnostic(code(escrow::hold_lookup))]
    HoldLookup {
        account: String,
        denom: String,
        #[source]
        cause: Box<EscrowError>,
    },
}

pub type Result<T> = std::result::Result<T, EscrowError>;
