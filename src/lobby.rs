//! Game creation and discovery for one participant.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::store::{GameStore, Subscription};
use crate::{Coordinator, GameId, GameRecord, IdentityProvider, NewGame, SyncError, UserId};

/// Entry point for a participant: create games, find games, open one.
pub struct Lobby<S> {
    store: Arc<S>,
    user_id: UserId,
}

impl<S> Lobby<S>
where
    S: GameStore + 'static,
{
    /// Creates a lobby acting as `user_id`.
    pub fn new(store: Arc<S>, user_id: UserId) -> Self {
        Self { store, user_id }
    }

    /// Resolves the client's identity, then creates the lobby.
    ///
    /// # Errors
    ///
    /// [`SyncError::Identity`] if no identity could be issued.
    #[instrument(skip(store, identity))]
    pub async fn for_identity(
        store: Arc<S>,
        identity: &dyn IdentityProvider,
    ) -> Result<Self, SyncError> {
        let user_id = identity.get_or_create_anonymous_id().await?;
        info!(user_id = %user_id, "Identity ready");
        Ok(Self::new(store, user_id))
    }

    /// The participant this lobby acts for.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Creates a waiting game with the caller as X.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn create_game(&self) -> Result<GameRecord, SyncError> {
        let record = self.store.create(NewGame::new(self.user_id.clone())).await?;
        info!(game_id = %record.id(), "Created game");
        Ok(record)
    }

    /// Waiting games created by other participants.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn open_games(&self) -> Result<Vec<GameRecord>, SyncError> {
        Ok(self.store.list_open(&self.user_id).await?)
    }

    /// Games the caller created or joined, newest first.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn my_games(&self) -> Result<Vec<GameRecord>, SyncError> {
        Ok(self.store.list_for_user(&self.user_id).await?)
    }

    /// Follows every game the caller created or joined.
    ///
    /// Each notification carries the full changed record, including games
    /// another participant joins after the subscription started.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn watch_my_games(&self) -> Result<Subscription<UserId>, SyncError> {
        Ok(self.store.subscribe_user(&self.user_id).await?)
    }

    /// Builds a coordinator for `game_id` with an empty view.
    pub fn coordinator(&self, game_id: GameId) -> Coordinator<S> {
        Coordinator::new(Arc::clone(&self.store), self.user_id.clone(), game_id)
    }

    /// Builds a coordinator for `game_id` and loads the record into it.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn open(&self, game_id: GameId) -> Result<Coordinator<S>, SyncError> {
        let coordinator = self.coordinator(game_id);
        coordinator.load_game().await?;
        Ok(coordinator)
    }
}
