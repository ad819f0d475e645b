use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use shardroute::OperationKind;

mod cli;

#[derive(Parser)]
#[command(name = "shardroute")]
#[command(about = "Inspect shard routing for configured tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured tables and their sharding
    Tables {
        #[arg(long)]
        config: PathBuf,
    },
    /// Resolve where a statement would be routed
    Resolve {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long, value_enum, default_value_t = OpArg::Select)]
        op: OpArg,
        #[arg(long)]
        shard_key: Vec<String>,
        #[arg(long)]
        key_range: Option<String>,
        #[arg(long)]
        shard_name: Vec<String>,
    },
    /// Compute the keyspace id of a shard key
    KeyspaceId {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long)]
        shard_key: String,
    },
    /// Decode an 8-byte routing token given as 16 hex digits
    DecodeToken { token: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum OpArg {
    Select,
    Insert,
    Update,
    Delete,
}

impl From<OpArg> for OperationKind {
    fn from(op: OpArg) -> Self {
        match op {
            OpArg::Select => OperationKind::Select,
            OpArg::Insert => OperationKind::Insert,
            OpArg::Update => OperationKind::Update,
            OpArg::Delete => OperationKind::Delete,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Tables { config } => cli::list_tables(&config),
        Command::Resolve {
            config,
            table,
            op,
            shard_key,
            key_range,
            shard_name,
        } => cli::resolve(
            &config,
            &table,
            op.into(),
            &shard_key,
            key_range.as_deref(),
            &shard_name,
        ),
        Command::KeyspaceId {
            config,
            table,
            shard_key,
        } => cli::keyspace_id(&config, &table, &shard_key),
        Command::DecodeToken { token } => cli::decode_token(&token),
    }
}
