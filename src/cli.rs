//! Command-line interface for tictactoe_sync.

use clap::{Parser, Subcommand};

/// Two-player tic-tac-toe over a shared game record
#[derive(Parser, Debug)]
#[command(name = "tictactoe_sync")]
#[command(about = "Play tic-tac-toe against another client through a shared store", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Database file (overrides configuration and environment)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new game and print its id
    Create,

    /// List games waiting for an opponent
    Open,

    /// List games you created or joined
    Mine {
        /// Keep running and reprint the list whenever one of them changes
        #[arg(long)]
        watch: bool,
    },

    /// Join a waiting game as O
    Join {
        /// Game id
        game_id: String,
    },

    /// Place your mark on a square (0 = top-left, 8 = bottom-right)
    Move {
        /// Game id
        game_id: String,

        /// Square index
        #[arg(value_parser = clap::value_parser!(u8).range(0..9))]
        index: u8,
    },

    /// Print the current state of a game
    Show {
        /// Game id
        game_id: String,

        /// Print the raw record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Follow a game and print every change until it completes
    Watch {
        /// Game id
        game_id: String,
    },

    /// Play a scripted game between two in-memory clients
    Demo,
}
