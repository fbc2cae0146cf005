#![allow(dead_code)]

use escrow_ledger::domain::address::Address;
use escrow_ledger::domain::coins::Coins;
use escrow_ledger::domain::payment::Payment;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const STATE_FIXTURE: &str = "tests/fixtures/state.json";
pub const COMMANDS_FIXTURE: &str = "tests/fixtures/commands.csv";

pub fn addr(s: &str) -> Address {
    Address::decode("test", s).unwrap()
}

pub fn coins(s: &str) -> Coins {
    s.parse().unwrap()
}

pub fn payment(source: &str, source_amount: &str, target: &str, target_amount: &str, external_id: &str) -> Payment {
    Payment {
        source: source.to_string(),
        source_amount: coins(source_amount),
        target: target.to_string(),
        target_amount: coins(target_amount),
        external_id: external_id.to_string(),
    }
}

/// Writes `rows` under the commands header into a temp file.
pub fn commands_file(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op,source,target,external_id,source_amount,target_amount").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

/// The state fixture with its JSON passed through `edit` first.
pub fn edited_state(edit: impl FnOnce(&mut serde_json::Value)) -> NamedTempFile {
    let mut state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(Path::new(STATE_FIXTURE)).unwrap()).unwrap();
    edit(&mut state);
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{state}").unwrap();
    file
}
