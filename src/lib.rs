//! Two-player tic-tac-toe over a shared, change-notified game record.
//!
//! Each client runs its own [`Coordinator`]. Coordinators never talk to
//! each other directly: they read and write one [`GameRecord`] through a
//! [`GameStore`] and learn about the other side's moves from change
//! notifications.
//!
//! # Architecture
//!
//! - **Rules**: pure board logic lives in the `tictactoe_rules` crate
//! - **Record**: the shared [`GameRecord`] and partial updates ([`RecordPatch`])
//! - **Store**: [`GameStore`] with [`MemoryStore`] and [`SqliteStore`] adapters
//! - **Coordinator**: optimistic moves, compare-and-set joins, reconciliation
//! - **Identity**: anonymous participant ids ([`IdentityProvider`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tictactoe_sync::{Lobby, MemoryStore, UserId};
//!
//! # async fn example() -> Result<(), tictactoe_sync::SyncError> {
//! let store = Arc::new(MemoryStore::new());
//! let alice = Lobby::new(Arc::clone(&store), UserId::from("alice"));
//! let bob = Lobby::new(store, UserId::from("bob"));
//!
//! let game = alice.create_game().await?;
//! let bob_view = bob.open(game.id().clone()).await?;
//! bob_view.join_game().await?;
//!
//! let alice_view = alice.open(game.id().clone()).await?;
//! alice_view.submit_move(4).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod coordinator;
mod identity;
mod lobby;
mod record;

pub mod store;

pub use config::{ConfigError, ENV_DATABASE, ENV_IDENTITY, ENV_POLL_MS, SyncConfig};
pub use coordinator::{
    CancelHandle, Coordinator, JoinOutcome, JoinRejection, LocalView, MoveOutcome, MoveRejection,
    SyncError, reconcile,
};
pub use identity::{EphemeralIdentity, FileIdentity, IdentityError, IdentityProvider};
pub use lobby::Lobby;
pub use record::{Condition, GameId, GameRecord, GameStatus, NewGame, RecordPatch, UserId};
pub use store::{GameStore, MemoryStore, SqliteStore, StoreError, Subscription};

pub use tictactoe_rules;
pub use tictactoe_rules::{Board, Mark, Outcome, Square};
