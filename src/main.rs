use clap::{Parser, Subcommand};
use escrow_ledger::application::engine::PaymentEngine;
use escrow_ledger::application::genesis::{audit_holds, export_payments, init_state};
use escrow_ledger::application::payment_store::PaymentStore;
use escrow_ledger::application::replay::replay_commands;
use escrow_ledger::config::EngineConfig;
use escrow_ledger::domain::ports::KvStoreBox;
use escrow_ledger::domain::state::{StateSnapshot, decode_entries};
use escrow_ledger::error::EscrowError;
use escrow_ledger::infrastructure::in_memory::{EventLog, InMemoryAccounts, InMemoryHoldLedger, InMemoryKvStore};
#[cfg(feature = "storage-rocksdb")]
use escrow_ledger::infrastructure::rocksdb::RocksDbKvStore;
use escrow_ledger::interfaces::csv::command_reader::CommandReader;
use escrow_ledger::interfaces::csv::payment_writer::PaymentWriter;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a state snapshot and reconcile holds
    Check {
        /// State snapshot (JSON)
        state: PathBuf,
    },
    /// Load a state snapshot, then replay payment commands against it
    Apply {
        /// State snapshot (JSON)
        state: PathBuf,
        /// Payment commands CSV file
        commands: PathBuf,
    },
    /// Print the payments currently in the store
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let kv = open_store(cli.db_path.as_deref())?;
    let mut store = PaymentStore::new(kv);

    match cli.command {
        Command::Check { state } => {
            let snapshot = load_snapshot(&state)?;
            let ledger = InMemoryHoldLedger::from_entries(decode_entries(&snapshot.holds)?)?;
            let summary = init_state(&mut store, &snapshot, &ledger)?;
            println!(
                "state ok: {} payments, {} orders, {} commitments, {} accounts with holds",
                summary.payments, summary.orders, summary.commitments, summary.accounts_with_holds
            );
        }
        Command::Apply { state, commands } => {
            let snapshot = load_snapshot(&state)?;
            let accounts = InMemoryAccounts::from_entries(
                decode_entries(&snapshot.balances)?,
                decode_entries(&snapshot.holds)?,
            )?;
            init_state(&mut store, &snapshot, &accounts)?;

            let mut engine = PaymentEngine::new(accounts.clone(), accounts, EventLog::new(), config.fees);
            let mut kv = store.into_inner();
            let file = File::open(commands).into_diagnostic()?;
            let reader = CommandReader::new(file);
            replay_commands(&mut engine, &mut kv, reader.commands(), |position, e| {
                eprintln!("Error processing command {}: {}", position, e);
            });

            let store = PaymentStore::new(kv);
            audit_holds(&snapshot.orders, &snapshot.commitments, &store, engine.holds())?;
            write_payments(&store)?;
        }
        Command::List => write_payments(&store)?,
    }

    Ok(())
}

fn load_snapshot(path: &Path) -> Result<StateSnapshot> {
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    Ok(StateSnapshot::from_json(&content).map_err(EscrowError::from)?)
}

fn write_payments(store: &PaymentStore<KvStoreBox>) -> Result<()> {
    let payments = export_payments(store)?;
    let stdout = io::stdout();
    let mut writer = PaymentWriter::new(stdout.lock());
    writer.write_payments(&payments)?;
    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<&Path>) -> Result<KvStoreBox> {
    match db_path {
        Some(path) => Ok(Box::new(RocksDbKvStore::open(path)?)),
        None => Ok(Box::new(InMemoryKvStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<&Path>) -> Result<KvStoreBox> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Box::new(InMemoryKvStore::new()))
}
