//! Per-client cached view of a game.

use derive_getters::Getters;
use tictactoe_rules::Outcome;

use crate::{GameRecord, GameStatus, UserId};

/// The client's cached copy of the shared record.
///
/// `pending` is set while the view holds an optimistic move that no
/// authoritative read or notification has confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct LocalView {
    record: GameRecord,
    pending: bool,
}

impl LocalView {
    /// A view that mirrors the store.
    pub fn authoritative(record: GameRecord) -> Self {
        Self {
            record,
            pending: false,
        }
    }

    /// A view ahead of the store by one local move.
    pub fn optimistic(record: GameRecord) -> Self {
        Self {
            record,
            pending: true,
        }
    }

    /// Outcome derived from the cached board.
    pub fn outcome(&self) -> Outcome {
        self.record.outcome()
    }

    /// One-line status for a participant, as a client would display it.
    pub fn headline(&self, user: &UserId) -> String {
        match (self.outcome(), self.record.status()) {
            (Outcome::Won(mark), _) => format!("Game over - winner: {}", mark),
            (Outcome::Draw, _) => "Game over - draw".to_string(),
            (Outcome::InProgress, GameStatus::Waiting) => "Waiting for opponent...".to_string(),
            (Outcome::InProgress, GameStatus::Completed) => "Game over".to_string(),
            (Outcome::InProgress, GameStatus::Started) if self.record.can_move(user) => {
                "Your turn!".to_string()
            }
            (Outcome::InProgress, GameStatus::Started) => "Opponent's turn...".to_string(),
        }
    }
}

/// Reduces an incoming authoritative record to the next view.
///
/// Last writer wins by full replacement: whatever the client held before,
/// optimistic or not, is discarded in favour of `record`. No field merge.
pub fn reconcile(record: GameRecord) -> LocalView {
    LocalView::authoritative(record)
}
