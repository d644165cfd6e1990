use std::{env, env::VarError};

use clap::{Parser, Subcommand};
use standing_order_engine::db_types::OrderCycleId;

#[derive(Parser, Debug)]
#[command(version, about = "Places the standing orders of open order cycles", after_help = env_help())]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the placement job once for the given order cycle and print a summary
    #[clap(name = "place")]
    Place {
        /// The order cycle whose standing orders should be placed
        #[arg(short = 'c', long = "order-cycle")]
        order_cycle: i64,
    },
    /// Keep running, placing the standing orders of every open order cycle as it comes up
    #[clap(name = "watch")]
    Watch,
}

impl Command {
    pub fn order_cycle(&self) -> Option<OrderCycleId> {
        match self {
            Command::Place { order_cycle } => Some(OrderCycleId(*order_cycle)),
            Command::Watch => None,
        }
    }
}

// Be explicit about which envars to print, so as to avoid accidentally exposing secrets
const DISPLAY_ENVS: [&str; 6] = [
    "RUST_LOG",
    "SOW_DATABASE_URL",
    "SOW_MAX_CONNECTIONS",
    "SOW_ALLOW_BACKORDERS",
    "SOW_POLL_INTERVAL",
    "SOW_EVENT_BUFFER_SIZE",
];

fn env_help() -> String {
    let mut help = String::from("Current environment values:\n");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        help.push_str(&format!("  {name:<35} {val:<15}\n"));
    });
    help
}
