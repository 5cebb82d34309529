/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Drives a single on-disk store through the push/delta pipeline from the
//! command line, for manual poking and reproducing reported issues. Not
//! part of the wire protocol or any collaborator's contract -- the real
//! deployment is a transport embedding `engram-engine` directly.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use interrupt_support::NeverInterrupts;

use engram_engine::{delta, push};
use engram_registry::Registry;
use engram_store::{EngineConfig, Store};
use engram_traits::{PendingEntry, PushRequest};

const DEFAULT_LOG_FILTER: &str = "engram_engine=info,engram_store=info";
const DEFAULT_LOG_FILTER_VERBOSE: &str = "engram_engine=trace,engram_store=trace";

#[derive(Debug, Parser)]
#[command(about, long_about = None)]
struct Cli {
    /// Path to the store's SQLite database file.
    #[arg(short = 'd', long, default_value = "engram.sqlite")]
    db: String,
    /// Store ID to operate against -- bookkeeping for the idempotency cache
    /// only, one physical database holds a single store.
    #[arg(long, default_value = "default")]
    store_id: String,
    #[arg(long, short, action)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Push a batch of entries read from a JSON file (a `PendingEntry[]` array).
    Push {
        /// Which `DomainPlugin` governs this store: generic, recall, or tract.
        #[arg(long, default_value = "generic")]
        store_type: String,
        /// Deduplication key for this push; reusing one replays the cached response.
        #[arg(long)]
        push_id: String,
        /// Identifies the client that produced these entries.
        #[arg(long)]
        source_id: String,
        /// Path to a JSON file holding a `PendingEntry[]` array.
        entries_file: String,
    },
    /// Read the change log strictly after a sequence number.
    Delta {
        #[arg(long, default_value_t = 0)]
        after: i64,
        #[arg(long)]
        limit: Option<i64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::init_from_env(env_logger::Env::default().filter_or(
        "RUST_LOG",
        if cli.verbose {
            DEFAULT_LOG_FILTER_VERBOSE
        } else {
            DEFAULT_LOG_FILTER
        },
    ));

    let registry = build_registry();
    let store = Store::open(&cli.db, &registry, EngineConfig::default())
        .with_context(|| format!("opening store at {}", cli.db))?;

    match cli.command {
        Commands::Push {
            store_type,
            push_id,
            source_id,
            entries_file,
        } => run_push(&store, &registry, &cli.store_id, &store_type, push_id, source_id, &entries_file),
        Commands::Delta { after, limit } => run_delta(&store, after, limit),
    }
}

fn build_registry() -> Registry {
    let registry = Registry::new();
    registry.set_generic(Arc::new(engram_plugin_generic::GenericPlugin::new()));
    registry.register(Arc::new(engram_plugin_recall::RecallPlugin::new()));
    registry.register(Arc::new(engram_plugin_tract::TractPlugin::new()));
    registry
}

fn run_push(
    store: &Store,
    registry: &Registry,
    store_id: &str,
    store_type: &str,
    push_id: String,
    source_id: String,
    entries_file: &str,
) -> Result<()> {
    let raw = std::fs::read_to_string(entries_file).with_context(|| format!("reading {entries_file}"))?;
    let entries: Vec<PendingEntry> =
        serde_json::from_str(&raw).with_context(|| format!("{entries_file} is not a JSON array of entries"))?;
    if entries.is_empty() {
        bail!("{entries_file} contains no entries");
    }

    let request = PushRequest {
        push_id,
        source_id,
        schema_version: engram_traits::CURRENT_SCHEMA_VERSION,
        entries,
    };

    let result = push(store, registry, store_id, store_type, request, &NeverInterrupts)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "accepted": result.response.accepted,
            "remote_sequence": result.response.remote_sequence,
            "idempotent_replay": result.idempotent_replay,
        }))?
    );
    Ok(())
}

fn run_delta(store: &Store, after: i64, limit: Option<i64>) -> Result<()> {
    let page = delta(store, after, limit, &NeverInterrupts)?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}
