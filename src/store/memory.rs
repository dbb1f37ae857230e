//! In-process store with a broadcast change feed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{ChangeFeed, GameStore, StoreError, Subscription};
use crate::{Condition, GameId, GameRecord, NewGame, RecordPatch, UserId};

/// Game records held in memory.
///
/// Updates to all records are serialized behind one lock, which gives
/// every record the single write order the coordinator relies on.
/// Clones share the same records and feed.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<GameId, GameRecord>>>,
    feed: ChangeFeed,
    available: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating in-memory game store");
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            feed: ChangeFeed::new(),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates an outage: while unavailable every call fails with
    /// [`StoreError::Transient`].
    #[instrument(skip(self))]
    pub fn set_available(&self, available: bool) {
        info!(available, "Store availability changed");
        self.available.store(available, Ordering::SeqCst);
    }

    /// Overwrites a record without any check, as a misbehaving client could.
    #[instrument(skip(self, record), fields(game_id = %record.id()))]
    pub async fn force_write(&self, record: GameRecord) {
        warn!("Writing record without validation");
        self.records
            .lock()
            .await
            .insert(record.id().clone(), record.clone());
        self.feed.publish(&record);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Transient("memory store is offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    #[instrument(skip(self, game), fields(creator_id = %game.creator_id()))]
    async fn create(&self, game: NewGame) -> Result<GameRecord, StoreError> {
        self.ensure_available()?;
        let record = GameRecord::waiting(GameId::generate(), game.creator_id().clone(), Utc::now());
        let mut records = self.records.lock().await;
        records.insert(record.id().clone(), record.clone());
        self.feed.publish(&record);
        drop(records);
        info!(game_id = %record.id(), "Game created");
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &GameId) -> Result<GameRecord, StoreError> {
        self.ensure_available()?;
        self.records
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    #[instrument(skip(self, patch))]
    async fn update(
        &self,
        id: &GameId,
        patch: RecordPatch,
        condition: Option<Condition>,
    ) -> Result<GameRecord, StoreError> {
        self.ensure_available()?;
        let mut records = self.records.lock().await;
        let current = records
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if let Some(condition) = condition
            && !condition.holds(current)
        {
            debug!(%condition, status = %current.status(), "Condition failed");
            return Err(StoreError::ConditionFailed(condition.to_string()));
        }

        if patch.is_empty() {
            return Ok(current.clone());
        }

        let next = current.patched(&patch);
        records.insert(id.clone(), next.clone());
        // Publish while holding the lock so notifications follow write order.
        self.feed.publish(&next);
        drop(records);

        debug!(status = %next.status(), turn_owner = %next.turn_owner(), "Record updated");
        Ok(next)
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, id: &GameId) -> Result<Subscription, StoreError> {
        self.ensure_available()?;
        if !self.records.lock().await.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(self.feed.subscribe(id))
    }

    #[instrument(skip(self))]
    async fn subscribe_user(&self, user: &UserId) -> Result<Subscription<UserId>, StoreError> {
        self.ensure_available()?;
        Ok(self.feed.subscribe_user(user))
    }

    #[instrument(skip(self))]
    async fn list_open(&self, exclude: &UserId) -> Result<Vec<GameRecord>, StoreError> {
        self.ensure_available()?;
        let mut open: Vec<GameRecord> = self
            .records
            .lock()
            .await
            .values()
            .filter(|r| *r.status() == crate::GameStatus::Waiting && r.creator_id() != exclude)
            .cloned()
            .collect();
        open.sort_by_key(|r| *r.created_at());
        debug!(count = open.len(), "Listed open games");
        Ok(open)
    }

    #[instrument(skip(self))]
    async fn list_for_user(&self, user: &UserId) -> Result<Vec<GameRecord>, StoreError> {
        self.ensure_available()?;
        let mut games: Vec<GameRecord> = self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.involves(user))
            .cloned()
            .collect();
        games.sort_by_key(|r| std::cmp::Reverse(*r.created_at()));
        debug!(count = games.len(), "Listed games for user");
        Ok(games)
    }
}
