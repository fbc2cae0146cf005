//! Application layer: payment storage, the payment engine and the whole-state
//! checks run when a snapshot is loaded.
//!
//! Everything here is synchronous and works on whatever ports it is handed;
//! atomicity beyond a single store batch belongs to the caller.

pub mod engine;
pub mod genesis;
pub mod keys;
pub mod payment_store;
pub mod reconciliation;
pub mod replay;
