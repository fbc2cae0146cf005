use super::engine::PaymentEngine;
use super::payment_store::PaymentStore;
use crate::domain::command::PaymentCommand;
use crate::domain::ports::{Checkpoint, EventSink, HoldLedger, KvStore, TransferService};
use crate::error::{EscrowError, Result};
use crate::infrastructure::staged::StagedKvStore;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: usize,
    pub failed: usize,
}

/// Runs one command as its own transaction.
///
/// Store writes are staged and only committed on success. Events reach the
/// sink only once the commit went through. On failure the hold ledger and
/// transfer service are put back as they were and the events are dropped, so
/// nothing the command did part way through survives.
pub fn apply_command<S, H, T, E>(
    engine: &mut PaymentEngine<H, T, E>,
    kv: &mut S,
    command: PaymentCommand,
) -> Result<()>
where
    S: KvStore + ?Sized,
    H: HoldLedger + Checkpoint,
    T: TransferService + Checkpoint,
    E: EventSink,
{
    let saved = engine.checkpoint();
    engine.defer_events();

    let mut staged = PaymentStore::new(StagedKvStore::new(kv));
    let result = engine
        .execute(&mut staged, command)
        .and_then(|()| staged.into_inner().commit());
    match result {
        Ok(()) => engine.flush_events(),
        Err(_) => engine.rollback(saved),
    }
    result
}

/// Applies every command in order, reporting failures to `on_error` and
/// carrying on with the next one.
///
/// `on_error` receives the 1-based position of the failed command.
pub fn replay_commands<S, H, T, E, I, F>(
    engine: &mut PaymentEngine<H, T, E>,
    kv: &mut S,
    commands: I,
    mut on_error: F,
) -> ReplayReport
where
    S: KvStore + ?Sized,
    H: HoldLedger + Checkpoint,
    T: TransferService + Checkpoint,
    E: EventSink,
    I: IntoIterator<Item = Result<PaymentCommand>>,
    F: FnMut(usize, &EscrowError),
{
    let mut report = ReplayReport::default();
    for (i, command) in commands.into_iter().enumerate() {
        let result = command.and_then(|command| apply_command(engine, kv, command));
        match result {
            Ok(()) => report.applied += 1,
            Err(e) => {
                warn!(position = i + 1, error = %e, "command failed");
                report.failed += 1;
                on_error(i + 1, &e);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaymentFeeParams;
    use crate::domain::address::Address;
    use crate::domain::coins::Coins;
    use crate::domain::payment::Payment;
    use crate::domain::ports::KvOp;
    use crate::infrastructure::in_memory::{
        EventLog, InMemoryAccounts, InMemoryBank, InMemoryHoldLedger, InMemoryKvStore,
    };
    use std::ops::ControlFlow;

    fn addr(s: &str) -> Address {
        Address::decode("test", s).unwrap()
    }

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    fn payment(external_id: &str) -> Payment {
        Payment {
            source: "alice".to_string(),
            source_amount: coins("7apple"),
            target: "bob".to_string(),
            target_amount: coins("3pear"),
            external_id: external_id.to_string(),
        }
    }

    fn engine(bob_pears: &str) -> PaymentEngine<InMemoryHoldLedger, InMemoryBank, EventLog> {
        let bank = InMemoryBank::from_balances(vec![
            (addr("alice"), coins("10apple")),
            (addr("bob"), coins(bob_pears)),
        ])
        .unwrap();
        PaymentEngine::new(InMemoryHoldLedger::new(), bank, EventLog::new(), PaymentFeeParams::default())
    }

    #[test]
    fn test_failed_accept_rolls_back_everything() {
        // Bob cannot pay his side, so the second transfer fails.
        let mut engine = engine("1pear");
        let mut kv = InMemoryKvStore::new();
        apply_command(&mut engine, &mut kv, PaymentCommand::Create(payment("x"))).unwrap();
        let kv_before = kv.len();

        let err = apply_command(&mut engine, &mut kv, PaymentCommand::Accept(payment("x"))).unwrap_err();
        assert!(matches!(err, EscrowError::Transfer { .. }));

        assert_eq!(kv.len(), kv_before);
        assert_eq!(engine.holds().holds_for(&addr("alice")), coins("7apple"));
        assert_eq!(engine.transfers().balance_of(&addr("alice")), coins("10apple"));
        assert_eq!(engine.transfers().balance_of(&addr("bob")), coins("1pear"));
        assert_eq!(engine.events().events().len(), 1);
    }

    #[test]
    fn test_replay_continues_after_failure() {
        let mut engine = engine("5pear");
        let mut kv = InMemoryKvStore::new();
        let commands = vec![
            Ok(PaymentCommand::Create(payment("x"))),
            Ok(PaymentCommand::Create(payment("x"))),
            Err(EscrowError::Validation("bad row".to_string())),
            Ok(PaymentCommand::Accept(payment("x"))),
        ];

        let mut failures = Vec::new();
        let report = replay_commands(&mut engine, &mut kv, commands, |pos, e| {
            failures.push((pos, e.to_string()));
        });

        assert_eq!(report, ReplayReport { applied: 2, failed: 2 });
        assert_eq!(failures.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![2, 3]);
        assert!(kv.is_empty());
        assert_eq!(engine.transfers().balance_of(&addr("bob")), coins("7apple,2pear"));
        assert_eq!(engine.holds().holds_for(&addr("alice")), Coins::new());
    }

    /// Reads like an empty store and refuses every write.
    struct ReadOnlyKvStore;

    impl KvStore for ReadOnlyKvStore {
        fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn write(&mut self, _batch: Vec<KvOp>) -> Result<()> {
            Err(EscrowError::Storage("read only".to_string()))
        }

        fn iterate_prefix(
            &self,
            _prefix: &[u8],
            _f: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_commit_emits_nothing() {
        let mut engine = engine("1pear");
        let mut kv = ReadOnlyKvStore;

        let err = apply_command(&mut engine, &mut kv, PaymentCommand::Create(payment("x"))).unwrap_err();
        assert!(matches!(err, EscrowError::Storage(_)));
        assert!(engine.events().events().is_empty());
        assert_eq!(engine.holds().holds_for(&addr("alice")), Coins::new());

        let mut kv = InMemoryKvStore::new();
        apply_command(&mut engine, &mut kv, PaymentCommand::Create(payment("x"))).unwrap();
        assert_eq!(engine.events().events().len(), 1);
    }

    #[test]
    fn test_over_promised_create_is_rejected() {
        let accounts =
            InMemoryAccounts::from_entries(vec![(addr("alice"), coins("20apple"))], vec![]).unwrap();
        let mut engine = PaymentEngine::new(
            accounts.clone(),
            accounts.clone(),
            EventLog::new(),
            PaymentFeeParams::default(),
        );
        let mut kv = InMemoryKvStore::new();
        let promise = |external_id: &str| Payment {
            source_amount: coins("15apple"),
            ..payment(external_id)
        };

        let commands = vec![
            Ok(PaymentCommand::Create(promise("a"))),
            Ok(PaymentCommand::Create(promise("b"))),
        ];
        let mut failures = Vec::new();
        let report = replay_commands(&mut engine, &mut kv, commands, |pos, e| {
            failures.push((pos, e.to_string()));
        });

        assert_eq!(report, ReplayReport { applied: 1, failed: 1 });
        assert_eq!(failures[0].0, 2);
        assert!(failures[0].1.contains("insufficient funds"));
        assert_eq!(accounts.holds_for(&addr("alice")), coins("15apple"));
        assert_eq!(accounts.balance_of(&addr("alice")), coins("20apple"));
        assert_eq!(engine.events().events().len(), 1);

        let store = PaymentStore::new(kv);
        assert!(store.get("alice", "a").unwrap().is_some());
        assert!(store.get("alice", "b").unwrap().is_none());
    }
}
