//! Persistence and change-notification layer for game records.
//!
//! [`GameStore`] is the contract the coordinator depends on. Two adapters
//! implement it: [`MemoryStore`] for tests and single-process play, and
//! [`SqliteStore`] for records shared between processes.

mod error;
mod memory;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only
mod subscription;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use repository::SqliteStore;
pub use subscription::{ChangeFeed, Subscription};

use async_trait::async_trait;

use crate::{Condition, GameId, GameRecord, NewGame, RecordPatch, UserId};

/// Durable storage of game records with per-record serialized updates.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Inserts a new waiting game and returns it with its assigned id.
    async fn create(&self, game: NewGame) -> Result<GameRecord, StoreError>;

    /// Fetches a record.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no record has this id.
    async fn get(&self, id: &GameId) -> Result<GameRecord, StoreError>;

    /// Applies `patch` atomically, optionally guarded by `condition`.
    ///
    /// Returns the record as written.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConditionFailed`] if the condition did not hold at
    /// write time, [`StoreError::NotFound`] if the record is absent.
    async fn update(
        &self,
        id: &GameId,
        patch: RecordPatch,
        condition: Option<Condition>,
    ) -> Result<GameRecord, StoreError>;

    /// Subscribes to changes of one record.
    async fn subscribe(&self, id: &GameId) -> Result<Subscription, StoreError>;

    /// Subscribes to changes of every game `user` created or joined.
    ///
    /// Delivers the changed record; games joined later are included from
    /// the moment they involve `user`.
    async fn subscribe_user(&self, user: &UserId) -> Result<Subscription<UserId>, StoreError>;

    /// Waiting games created by someone other than `exclude`, oldest first.
    async fn list_open(&self, exclude: &UserId) -> Result<Vec<GameRecord>, StoreError>;

    /// Games `user` created or joined, newest first.
    async fn list_for_user(&self, user: &UserId) -> Result<Vec<GameRecord>, StoreError>;
}
