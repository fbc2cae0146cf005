//! Store key layout for payments.
//!
//! Payments: `0x70 | len(source) | source | external id`.
//! Target index: `0x71 | len(target) | target | len(source) | source | external id`,
//! stored with an empty value.

use crate::domain::address::Address;

pub const KEY_TYPE_PAYMENT: u8 = 0x70;
pub const KEY_TYPE_TARGET_TO_PAYMENT: u8 = 0x71;

fn push_length_prefixed(key: &mut Vec<u8>, addr: &Address) {
    // Address decoding caps the length at 255 bytes.
    key.push(addr.as_bytes().len() as u8);
    key.extend_from_slice(addr.as_bytes());
}

/// Prefix covering every payment record.
pub fn all_payments_prefix() -> Vec<u8> {
    vec![KEY_TYPE_PAYMENT]
}

pub fn payment_key(source: &Address, external_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + source.as_bytes().len() + external_id.len());
    key.push(KEY_TYPE_PAYMENT);
    push_length_prefixed(&mut key, source);
    key.extend_from_slice(external_id.as_bytes());
    key
}

/// Prefix covering every index entry for payments from `source` to `target`.
pub fn target_index_prefix(target: &Address, source: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(3 + target.as_bytes().len() + source.as_bytes().len());
    key.push(KEY_TYPE_TARGET_TO_PAYMENT);
    push_length_prefixed(&mut key, target);
    push_length_prefixed(&mut key, source);
    key
}

pub fn target_index_key(target: &Address, source: &Address, external_id: &str) -> Vec<u8> {
    let mut key = target_index_prefix(target, source);
    key.extend_from_slice(external_id.as_bytes());
    key
}

/// Renders a key for log and error messages.
pub fn display_key(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}
