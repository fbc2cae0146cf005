mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::{COMMANDS_FIXTURE, STATE_FIXTURE, edited_state};
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_check() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("escrow-ledger"));
    cmd.arg("check").arg(STATE_FIXTURE);

    cmd.assert().success().stdout(predicate::str::contains(
        "state ok: 1 payments, 1 orders, 1 commitments, 3 accounts with holds",
    ));

    Ok(())
}

#[test]
fn test_cli_apply_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("escrow-ledger"));
    cmd.arg("apply").arg(STATE_FIXTURE).arg(COMMANDS_FIXTURE);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "source,external_id,source_amount,target,target_amount",
        ))
        // Retargeted, still pending
        .stdout(predicate::str::contains("alice,y,2apple,dave,"))
        // Accepted
        .stdout(predicate::str::contains("alice,x").not())
        // Rejected
        .stdout(predicate::str::contains("bob,z").not())
        .stderr(predicate::str::contains("Error processing command").not());

    Ok(())
}

#[test]
fn test_cli_short_hold_is_fatal() {
    let state = edited_state(|state| {
        state["holds"][2]["amount"] = "6apple".into();
    });

    let mut cmd = Command::new(cargo_bin!("escrow-ledger"));
    cmd.arg("check").arg(state.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("should have at least"));
}

#[test]
fn test_cli_order_counter_behind_is_fatal() {
    let state = edited_state(|state| {
        state["last_order_id"] = 3.into();
    });

    let mut cmd = Command::new(cargo_bin!("escrow-ledger"));
    cmd.arg("check").arg(state.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("last order id 3"));
}

#[test]
fn test_cli_config_fee_file_and_bad_log_level() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut config, br#"{"log_level": "shouting"}"#).unwrap();

    let mut cmd = Command::new(cargo_bin!("escrow-ledger"));
    cmd.arg("--config").arg(config.path()).arg("check").arg(STATE_FIXTURE);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown log level"));
}

#[test]
fn test_cli_list_empty_store() {
    let mut cmd = Command::new(cargo_bin!("escrow-ledger"));
    cmd.arg("list");

    cmd.assert().success().stdout(predicate::str::is_empty());
}
