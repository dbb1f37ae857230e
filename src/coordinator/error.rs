//! Coordinator errors and operation outcomes.

use derive_more::{Display, Error, From};
use tictactoe_rules::IllegalMoveError;

use crate::store::StoreError;
use crate::{GameRecord, GameStatus, IdentityError};

/// Failure surfaced by a coordinator or lobby operation.
///
/// Nothing here is retried automatically; the caller decides.
#[derive(Debug, Clone, Display, Error, From)]
pub enum SyncError {
    /// The store rejected or could not perform the call.
    #[display("{}", _0)]
    Store(#[error(source)] StoreError),

    /// The client has no identity to act under.
    #[display("{}", _0)]
    Identity(#[error(source)] IdentityError),
}

impl SyncError {
    /// Lost a compare-and-set race (e.g. someone else joined first).
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, SyncError::Store(StoreError::ConditionFailed(_)))
    }

    /// The game does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Store(StoreError::NotFound(_)))
    }

    /// The operation may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_retryable())
    }
}

/// Why a move was not sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MoveRejection {
    /// No record has been loaded yet.
    #[display("game not loaded")]
    NotLoaded,
    /// Moves are only accepted while the game is started.
    #[display("game is {}", _0)]
    NotStarted(GameStatus),
    /// The turn belongs to the other participant (or the caller is not playing).
    #[display("not your turn")]
    NotYourTurn,
    /// The square cannot take a mark.
    #[display("{}", _0)]
    Illegal(IllegalMoveError),
}

/// Result of [`Coordinator::submit_move`](crate::Coordinator::submit_move).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move was written; carries the record as stored.
    Applied(GameRecord),
    /// The local guard refused the move; nothing was written.
    Ignored(MoveRejection),
}

impl MoveOutcome {
    /// True if the move reached the store.
    pub fn is_applied(&self) -> bool {
        matches!(self, MoveOutcome::Applied(_))
    }
}

/// Why a join was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JoinRejection {
    /// No record has been loaded yet.
    #[display("game not loaded")]
    NotLoaded,
    /// The creator already plays X in this game.
    #[display("creator cannot join their own game")]
    IsCreator,
    /// The game has left the waiting stage.
    #[display("game is {}", _0)]
    NotWaiting(GameStatus),
}

/// Result of [`Coordinator::join_game`](crate::Coordinator::join_game).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The caller is now the opponent; carries the record as stored.
    Joined(GameRecord),
    /// The local guard refused the join; nothing was written.
    Ignored(JoinRejection),
}
