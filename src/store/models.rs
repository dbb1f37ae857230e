//! Diesel row types for the `games` table.

use std::str::FromStr;

use chrono::NaiveDateTime;
use derive_new::new;
use diesel::prelude::*;
use tictactoe_rules::{Board, Mark};
use tracing::instrument;

use super::{StoreError, schema};
use crate::{GameId, GameRecord, GameStatus, RecordPatch, UserId};

/// A stored game row.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = schema::games)]
pub struct GameRow {
    id: String,
    board: String,
    turn_owner: String,
    status: String,
    creator_id: String,
    opponent_id: Option<String>,
    created_at: NaiveDateTime,
}

impl GameRow {
    /// Parses the row into a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if a column holds an unknown value.
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub fn into_record(self) -> Result<GameRecord, StoreError> {
        let board: Board = serde_json::from_str(&self.board)?;
        let turn_owner = Mark::from_str(&self.turn_owner)
            .map_err(|_| StoreError::Decode(format!("Invalid turn owner: '{}'", self.turn_owner)))?;
        let status = GameStatus::from_str(&self.status)
            .map_err(|_| StoreError::Decode(format!("Invalid status: '{}'", self.status)))?;

        Ok(GameRecord::from_parts(
            GameId::from(self.id),
            board,
            turn_owner,
            status,
            UserId::from(self.creator_id),
            self.opponent_id.map(UserId::from),
            self.created_at.and_utc(),
        ))
    }
}

/// Insertable row for a new game.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::games)]
pub struct NewGameRow {
    id: String,
    board: String,
    turn_owner: String,
    status: String,
    creator_id: String,
    created_at: NaiveDateTime,
}

impl NewGameRow {
    /// Row for a freshly created record.
    pub fn from_record(record: &GameRecord) -> Result<Self, StoreError> {
        Ok(Self::new(
            record.id().to_string(),
            serde_json::to_string(record.board())?,
            record.turn_owner().to_string(),
            record.status().to_string(),
            record.creator_id().to_string(),
            record.created_at().naive_utc(),
        ))
    }
}

/// Column changes for a partial update; `None` leaves the column as is.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = schema::games)]
pub struct GameChangeset {
    board: Option<String>,
    turn_owner: Option<String>,
    status: Option<String>,
    opponent_id: Option<String>,
}

impl GameChangeset {
    /// Converts a record patch into column changes.
    pub fn from_patch(patch: &RecordPatch) -> Result<Self, StoreError> {
        Ok(Self {
            board: patch.board().map(|b| serde_json::to_string(&b)).transpose()?,
            turn_owner: patch.turn_owner().map(|m| m.to_string()),
            status: patch.status().map(|s| s.to_string()),
            opponent_id: patch.opponent_id().as_ref().map(|u| u.to_string()),
        })
    }
}
