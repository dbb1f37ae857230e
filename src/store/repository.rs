//! SQLite-backed game store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::models::{GameChangeset, GameRow, NewGameRow};
use super::{GameStore, StoreError, Subscription, schema};
use crate::config::is_in_memory_database;
use crate::{Condition, GameId, GameRecord, GameStatus, NewGame, RecordPatch, UserId};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Game store backed by a SQLite file.
///
/// Each call opens its own connection on a blocking thread. Conditional
/// updates are single `UPDATE ... WHERE` statements inside an immediate
/// transaction, so concurrent writers from any process are serialized by
/// SQLite's write lock. SQLite has no change notifications; subscriptions
/// poll the row instead.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: String,
    poll_interval: Duration,
}

impl SqliteStore {
    /// Opens the database at `db_path`, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or migrated.
    /// In-memory databases are rejected with [`StoreError::Backend`]: every
    /// connection would see its own empty database.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: String, poll_interval: Duration) -> Result<Self, StoreError> {
        if is_in_memory_database(&db_path) {
            return Err(StoreError::Backend(format!(
                "{} is private to one connection; use MemoryStore instead",
                db_path
            )));
        }
        let store = Self {
            db_path,
            poll_interval,
        };
        let mut conn = store.connection()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Backend(format!("Migrations failed: {}", e)))?;
        info!(path = %store.db_path, "SQLite game store ready");
        Ok(store)
    }

    /// Path of the database file.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, StoreError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path)?;
        diesel::sql_query(format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS)).execute(&mut conn)?;
        Ok(conn)
    }

    /// Runs `op` with a fresh connection on the blocking pool.
    async fn with_connection<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.connection()?;
            op(&mut conn)
        })
        .await?
    }

    fn load(conn: &mut SqliteConnection, id: &GameId) -> Result<Option<GameRecord>, StoreError> {
        schema::games::table
            .find(id.as_str())
            .select(GameRow::as_select())
            .first(conn)
            .optional()?
            .map(GameRow::into_record)
            .transpose()
    }

    fn load_existing(conn: &mut SqliteConnection, id: &GameId) -> Result<GameRecord, StoreError> {
        Self::load(conn, id)?.ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn write(
        conn: &mut SqliteConnection,
        id: &GameId,
        patch: &RecordPatch,
        condition: Option<Condition>,
    ) -> Result<GameRecord, StoreError> {
        if patch.is_empty() {
            return Self::load_existing(conn, id);
        }
        let changes = GameChangeset::from_patch(patch)?;
        let target = schema::games::table.filter(schema::games::id.eq(id.as_str()));

        let updated = match condition {
            Some(Condition::StatusIs(status)) => diesel::update(
                target.filter(schema::games::status.eq(status.to_string())),
            )
            .set(&changes)
            .execute(conn)?,
            None => diesel::update(target).set(&changes).execute(conn)?,
        };

        if updated == 0 {
            // Either the row is gone or the condition did not hold.
            let current = Self::load_existing(conn, id)?;
            let condition = condition.map(|c| c.to_string()).unwrap_or_default();
            debug!(%condition, status = %current.status(), "Condition failed");
            return Err(StoreError::ConditionFailed(condition));
        }

        Self::load_existing(conn, id)
    }

    fn into_records(rows: Vec<GameRow>) -> Result<Vec<GameRecord>, StoreError> {
        rows.into_iter().map(GameRow::into_record).collect()
    }

    /// Games `user` created or joined, newest first.
    async fn games_for_user(&self, user: &UserId) -> Result<Vec<GameRecord>, StoreError> {
        let user = user.to_string();
        self.with_connection(move |conn| {
            let rows = schema::games::table
                .filter(
                    schema::games::creator_id
                        .eq(&user)
                        .or(schema::games::opponent_id.eq(&user)),
                )
                .order(schema::games::created_at.desc())
                .select(GameRow::as_select())
                .load(conn)?;
            Self::into_records(rows)
        })
        .await
    }
}

#[async_trait]
impl GameStore for SqliteStore {
    #[instrument(skip(self, game), fields(creator_id = %game.creator_id()))]
    async fn create(&self, game: NewGame) -> Result<GameRecord, StoreError> {
        let record = GameRecord::waiting(GameId::generate(), game.creator_id().clone(), Utc::now());
        let row = NewGameRow::from_record(&record)?;
        let id = record.id().clone();

        let created = self
            .with_connection(move |conn| {
                diesel::insert_into(schema::games::table)
                    .values(&row)
                    .execute(conn)?;
                Self::load_existing(conn, &id)
            })
            .await?;

        info!(game_id = %created.id(), "Game created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &GameId) -> Result<GameRecord, StoreError> {
        let id = id.clone();
        self.with_connection(move |conn| Self::load_existing(conn, &id))
            .await
    }

    #[instrument(skip(self, patch))]
    async fn update(
        &self,
        id: &GameId,
        patch: RecordPatch,
        condition: Option<Condition>,
    ) -> Result<GameRecord, StoreError> {
        let id = id.clone();
        let record = self
            .with_connection(move |conn| {
                conn.immediate_transaction(|conn| Self::write(conn, &id, &patch, condition))
            })
            .await?;
        debug!(status = %record.status(), turn_owner = %record.turn_owner(), "Record updated");
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, id: &GameId) -> Result<Subscription, StoreError> {
        let initial = self.get(id).await?;
        let (tx, rx) = broadcast::channel(16);
        let store = self.clone();
        let game_id = id.clone();
        let interval = self.poll_interval.max(Duration::from_millis(1));

        let feeder = tokio::spawn(async move {
            let mut last = initial;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.get(&game_id).await {
                    Ok(record) if record != last => {
                        last = record.clone();
                        if tx.send(record).is_err() {
                            debug!(game_id = %game_id, "Subscriber gone, stopping poller");
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(StoreError::NotFound(_)) => {
                        warn!(game_id = %game_id, "Record disappeared, stopping poller");
                        return;
                    }
                    Err(e) => warn!(game_id = %game_id, error = %e, "Poll failed, will retry"),
                }
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "Polling subscription started");
        Ok(Subscription::with_feeder(id.clone(), rx, feeder))
    }

    #[instrument(skip(self))]
    async fn list_open(&self, exclude: &UserId) -> Result<Vec<GameRecord>, StoreError> {
        let exclude = exclude.to_string();
        let games = self
            .with_connection(move |conn| {
                let rows = schema::games::table
                    .filter(schema::games::status.eq(GameStatus::Waiting.to_string()))
                    .filter(schema::games::creator_id.ne(exclude))
                    .order(schema::games::created_at.asc())
                    .select(GameRow::as_select())
                    .load(conn)?;
                Self::into_records(rows)
            })
            .await?;
        info!(count = games.len(), "Open games loaded");
        Ok(games)
    }

    #[instrument(skip(self))]
    async fn subscribe_user(&self, user: &UserId) -> Result<Subscription<UserId>, StoreError> {
        let mut seen: HashMap<GameId, GameRecord> = self
            .games_for_user(user)
            .await?
            .into_iter()
            .map(|record| (record.id().clone(), record))
            .collect();
        let (tx, rx) = broadcast::channel(16);
        let store = self.clone();
        let user_id = user.clone();
        let interval = self.poll_interval.max(Duration::from_millis(1));

        let feeder = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let games = match store.games_for_user(&user_id).await {
                    Ok(games) => games,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Poll failed, will retry");
                        continue;
                    }
                };
                // Oldest first so a burst is delivered in creation order.
                for record in games.into_iter().rev() {
                    if seen.get(record.id()) == Some(&record) {
                        continue;
                    }
                    seen.insert(record.id().clone(), record.clone());
                    if tx.send(record).is_err() {
                        debug!(user_id = %user_id, "Subscriber gone, stopping poller");
                        return;
                    }
                }
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "Polling user subscription started");
        Ok(Subscription::with_feeder(user.clone(), rx, feeder))
    }

    #[instrument(skip(self))]
    async fn list_for_user(&self, user: &UserId) -> Result<Vec<GameRecord>, StoreError> {
        let games = self.games_for_user(user).await?;
        info!(count = games.len(), "User games loaded");
        Ok(games)
    }
}
