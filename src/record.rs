//! The shared game record and its partial updates.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use tictactoe_rules::{Board, Mark, Outcome, invariants};
use tracing::instrument;

/// Opaque identifier of a game record, assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrows the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GameId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Stable identity of a participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Borrows the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle stage of a game.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GameStatus {
    /// Created, waiting for a second participant.
    Waiting,
    /// Both participants present; moves are accepted.
    Started,
    /// A line was completed or the board filled.
    Completed,
}

impl GameStatus {
    /// Whether the lifecycle may move from `self` to `next`.
    ///
    /// Status only moves forward: waiting, started, completed. Staying put
    /// is allowed so repeated writes of the same status are harmless.
    pub fn can_advance_to(self, next: GameStatus) -> bool {
        use GameStatus::*;
        matches!(
            (self, next),
            (Waiting, Waiting | Started)
                | (Started, Started | Completed)
                | (Completed, Completed)
        )
    }
}

/// Fields supplied when a game is created.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new, Getters)]
pub struct NewGame {
    creator_id: UserId,
}

/// Full state of one game as persisted and delivered in notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct GameRecord {
    id: GameId,
    board: Board,
    turn_owner: Mark,
    status: GameStatus,
    creator_id: UserId,
    opponent_id: Option<UserId>,
    created_at: DateTime<Utc>,
}

impl GameRecord {
    /// Builds a record from stored fields.
    pub fn from_parts(
        id: GameId,
        board: Board,
        turn_owner: Mark,
        status: GameStatus,
        creator_id: UserId,
        opponent_id: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            board,
            turn_owner,
            status,
            creator_id,
            opponent_id,
            created_at,
        }
    }

    /// A freshly created record: waiting, empty board, X to move.
    pub fn waiting(id: GameId, creator_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self::from_parts(
            id,
            Board::new(),
            Mark::X,
            GameStatus::Waiting,
            creator_id,
            None,
            created_at,
        )
    }

    /// Outcome recomputed from the board, independent of the stored status.
    pub fn outcome(&self) -> Outcome {
        tictactoe_rules::outcome(&self.board)
    }

    /// Whether `user` may place the next mark.
    ///
    /// Only checks turn ownership; status and board legality are separate.
    pub fn can_move(&self, user: &UserId) -> bool {
        tictactoe_rules::can_move(
            &self.creator_id,
            self.opponent_id.as_ref(),
            self.turn_owner,
            user,
        )
    }

    /// The mark `user` plays in this game, if any.
    pub fn mark_of(&self, user: &UserId) -> Option<Mark> {
        tictactoe_rules::mark_for(&self.creator_id, self.opponent_id.as_ref(), user)
    }

    /// True if `user` created or joined this game.
    pub fn involves(&self, user: &UserId) -> bool {
        self.mark_of(user).is_some()
    }

    /// Applies a partial update, returning the new record.
    ///
    /// Immutable fields (`id`, `creator_id`, `created_at`) are carried over.
    pub fn patched(&self, patch: &RecordPatch) -> Self {
        let mut next = self.clone();
        if let Some(board) = patch.board {
            next.board = board;
        }
        if let Some(turn_owner) = patch.turn_owner {
            next.turn_owner = turn_owner;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(opponent_id) = &patch.opponent_id {
            next.opponent_id = Some(opponent_id.clone());
        }
        next
    }

    /// Lists every record-level invariant this record breaks.
    ///
    /// An empty list means the record is consistent. Completion is judged
    /// from the board, not from the stored status.
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub fn violations(&self) -> Vec<String> {
        let mut problems: Vec<String> = match invariants::check_board(&self.board) {
            Ok(()) => Vec::new(),
            Err(violations) => violations.into_iter().map(|v| v.description).collect(),
        };

        match self.status {
            GameStatus::Waiting => {
                if self.opponent_id.is_some() {
                    problems.push("Waiting game already has an opponent".to_string());
                }
                if !self.board.is_blank() {
                    problems.push("Waiting game has marks on the board".to_string());
                }
            }
            GameStatus::Started => {
                if self.opponent_id.is_none() {
                    problems.push("Started game has no opponent".to_string());
                }
            }
            GameStatus::Completed => {
                if !self.outcome().is_terminal() {
                    problems.push("Completed game has neither a winner nor a full board".to_string());
                }
            }
        }

        if self.opponent_id.as_ref() == Some(&self.creator_id) {
            problems.push("Creator and opponent are the same participant".to_string());
        }

        if self.status == GameStatus::Started
            && !self.outcome().is_terminal()
            && self.turn_owner != invariants::expected_turn_owner(&self.board)
        {
            problems.push(format!(
                "Turn owner {} does not match the marks on the board",
                self.turn_owner
            ));
        }

        problems
    }
}

/// Partial update of a record; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct RecordPatch {
    board: Option<Board>,
    turn_owner: Option<Mark>,
    status: Option<GameStatus>,
    opponent_id: Option<UserId>,
}

impl RecordPatch {
    /// Patch that starts a game with `opponent` as player O.
    pub fn join(opponent: UserId) -> Self {
        Self {
            status: Some(GameStatus::Started),
            opponent_id: Some(opponent),
            ..Self::default()
        }
    }

    /// Patch writing the result of a move.
    ///
    /// `status` is only set when the move ends the game.
    pub fn after_move(board: Board, turn_owner: Mark, status: Option<GameStatus>) -> Self {
        Self {
            board: Some(board),
            turn_owner: Some(turn_owner),
            status,
            opponent_id: None,
        }
    }

    /// True if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.board.is_none()
            && self.turn_owner.is_none()
            && self.status.is_none()
            && self.opponent_id.is_none()
    }
}

/// Precondition of a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Condition {
    /// The stored status must equal the given value at write time.
    #[display("status = {}", _0)]
    StatusIs(GameStatus),
}

impl Condition {
    /// Evaluates the precondition against the current record.
    pub fn holds(&self, record: &GameRecord) -> bool {
        match self {
            Condition::StatusIs(status) => record.status == *status,
        }
    }
}
