//! Configuration for the transfer indexer

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tally_transfers::{TokenSchedule, TransferIdScheme};

/// Transfer indexer for Substrate-based chains
///
/// Replays captured blocks and stores normalized transfers, accounts and
/// blocks in SQLite.
#[derive(Parser, Debug)]
#[command(name = "tally-transfers")]
#[command(about = "Index native and multi-asset transfers into SQLite", long_about = None)]
pub struct Config {
    /// JSON file with the captured blocks to index
    #[arg(long, env = "TALLY_EVENTS_FILE")]
    pub events_file: PathBuf,

    /// Database path for transfers, accounts and blocks
    #[arg(long, env = "TALLY_DB_PATH", default_value = "./transfers.db")]
    pub db_path: String,

    /// Starting block number
    #[arg(long, default_value = "0")]
    pub from_block: u64,

    /// Ending block number (None = until the end of the file)
    #[arg(long)]
    pub to_block: Option<u64>,

    /// Blocks handed to the pipeline per batch
    #[arg(long, default_value = "100")]
    pub blocks_per_batch: usize,

    /// Seconds to wait before polling an extractor that has nothing new
    #[arg(long, default_value = "3")]
    pub cycle_interval: u64,

    /// JSON file with height-indexed native token epochs
    ///
    /// Example: [{"from_height": 0, "name": "KSM", "decimals": 12}]
    /// Overrides --token-name and --token-decimals.
    #[arg(long, env = "TALLY_TOKEN_SCHEDULE")]
    pub token_schedule: Option<PathBuf>,

    /// Native token name used at every height when no schedule is given
    #[arg(long, default_value = "UNIT")]
    pub token_name: String,

    /// Native token decimals used at every height when no schedule is given
    #[arg(long, default_value = "12")]
    pub token_decimals: u8,

    /// Transfer id derivation: block-extrinsic or block-extrinsic-event
    ///
    /// block-extrinsic keeps only the last transfer of an extrinsic.
    #[arg(long, default_value = "block-extrinsic")]
    pub transfer_id_scheme: TransferIdScheme,

    /// Address of the Prometheus metrics endpoint (disabled when unset)
    #[arg(long, env = "TALLY_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Config {
    pub fn token_schedule(&self) -> anyhow::Result<TokenSchedule> {
        match &self.token_schedule {
            Some(path) => Ok(TokenSchedule::from_file(path)?),
            None => Ok(TokenSchedule::single(self.token_name.clone(), self.token_decimals)),
        }
    }
}
