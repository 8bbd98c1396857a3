//! flow-context
//!
//! Command line access to a sled-backed flow context store.
//!
//! # Usage
//!
//! ```bash
//! flow-context --path ./data/context set f1 counter 42
//! flow-context --path ./data/context get f1 counter
//! flow-context --path ./data/context keys global
//! flow-context --path ./data/context clean n1 n2
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use flow_context_store::{
    CleanMatching, ConnectionConfig, ContextStore, DeleteRouting, StoreConfig,
};

/// Flow context store client
#[derive(Parser, Debug)]
#[command(name = "flow-context")]
#[command(about = "Read and write scoped flow context")]
#[command(version)]
struct Args {
    /// Path of the sled database
    #[arg(long, default_value = "./data/context_store")]
    path: PathBuf,

    /// Database namespace
    #[arg(long, default_value = "context")]
    database: String,

    /// Send every delete to the global partition
    #[arg(long)]
    legacy_delete: bool,

    /// Keep node context whose node id is listed, whatever its flow
    #[arg(long)]
    clean_by_node_id: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key
    Get { scope: String, key: String },
    /// Store a JSON value under a key
    Set {
        scope: String,
        key: String,
        /// JSON value; bare words are stored as strings
        value: String,
    },
    /// List the keys of a scope
    Keys { scope: String },
    /// Remove all keys of a scope
    Delete { scope: String },
    /// Remove node context for nodes not listed
    Clean { active_nodes: Vec<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let delete_routing = if args.legacy_delete {
        DeleteRouting::Legacy
    } else {
        DeleteRouting::ByScope
    };
    let clean_matching = if args.clean_by_node_id {
        CleanMatching::NodeId
    } else {
        CleanMatching::ScopeId
    };
    let config = StoreConfig::new(ConnectionConfig::for_database(args.database))
        .with_delete_routing(delete_routing)
        .with_clean_matching(clean_matching);

    let store = ContextStore::with_sled(config, args.path);
    store.open().await?;

    let outcome = run(&store, args.command).await;
    store.close().await?;
    outcome
}

async fn run(store: &ContextStore, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Get { scope, key } => match store.get(&scope, key).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => anyhow::bail!("no value stored"),
        },
        Command::Set { scope, key, value } => {
            let value = serde_json::from_str(&value)
                .unwrap_or(serde_json::Value::String(value));
            store.set(&scope, key, value).await?;
        }
        Command::Keys { scope } => {
            let mut keys = store.keys(&scope).await?;
            keys.sort();
            for key in keys {
                println!("{}", key);
            }
        }
        Command::Delete { scope } => {
            let removed = store.delete(&scope).await?;
            println!("removed {}", removed);
        }
        Command::Clean { active_nodes } => {
            let removed = store.clean(active_nodes.as_slice()).await?;
            println!("removed {}", removed);
        }
    }
    Ok(())
}
