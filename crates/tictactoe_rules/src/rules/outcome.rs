//! Derived terminal condition of a board.

use super::{is_full, winner};
use crate::{Board, Mark};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Where a board stands, as derived from its squares alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum Outcome {
    /// No winner and at least one empty square.
    #[display("in progress")]
    InProgress,
    /// A line is complete.
    #[display("{} wins", _0)]
    Won(Mark),
    /// Board full with no winner.
    #[display("draw")]
    Draw,
}

impl Outcome {
    /// True for [`Outcome::Won`] and [`Outcome::Draw`].
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

/// Computes the outcome of `board`.
#[instrument(skip(board))]
pub fn outcome(board: &Board) -> Outcome {
    if let Some(mark) = winner(board) {
        Outcome::Won(mark)
    } else if is_full(board) {
        Outcome::Draw
    } else {
        Outcome::InProgress
    }
}
