//! Synchronization between a client's view and the shared game record.
//!
//! The coordinator validates local actions against the rules, updates the
//! local view optimistically, writes through the [`GameStore`] and folds
//! every authoritative record it receives back into the view.

mod error;
mod view;

pub use error::{JoinOutcome, JoinRejection, MoveOutcome, MoveRejection, SyncError};
pub use view::{LocalView, reconcile};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tictactoe_rules::{apply_move, invariants::is_valid_successor};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

use crate::store::GameStore;
use crate::{Condition, GameId, GameRecord, GameStatus, RecordPatch, UserId};

/// One client's coordinator for one game.
///
/// Clones share the same local view. Coordinators of different
/// participants share nothing; they meet only through the store.
pub struct Coordinator<S> {
    store: Arc<S>,
    game_id: GameId,
    user_id: UserId,
    view: Arc<watch::Sender<Option<LocalView>>>,
}

impl<S> Clone for Coordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            game_id: self.game_id.clone(),
            user_id: self.user_id.clone(),
            view: Arc::clone(&self.view),
        }
    }
}

impl<S> std::fmt::Debug for Coordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("game_id", &self.game_id)
            .field("user_id", &self.user_id)
            .field("view", &*self.view.borrow())
            .finish()
    }
}

impl<S> Coordinator<S>
where
    S: GameStore + 'static,
{
    /// Creates a coordinator for `game_id`, acting as `user_id`.
    ///
    /// The view starts empty; call [`Coordinator::load_game`] or wait for a
    /// notification before acting.
    #[instrument(skip(store))]
    pub fn new(store: Arc<S>, user_id: UserId, game_id: GameId) -> Self {
        let (view, _) = watch::channel(None);
        Self {
            store,
            game_id,
            user_id,
            view: Arc::new(view),
        }
    }

    /// The game this coordinator follows.
    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    /// The participant this coordinator acts for.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Snapshot of the local view.
    pub fn view(&self) -> Option<LocalView> {
        self.view.borrow().clone()
    }

    /// Receiver notified whenever the local view changes.
    pub fn watch(&self) -> watch::Receiver<Option<LocalView>> {
        self.view.subscribe()
    }

    /// Fetches the record and replaces the local view with it.
    ///
    /// # Errors
    ///
    /// [`SyncError`] wrapping `NotFound` or `Transient` store failures.
    #[instrument(skip(self), fields(game_id = %self.game_id, user_id = %self.user_id))]
    pub async fn load_game(&self) -> Result<GameRecord, SyncError> {
        let record = self.store.get(&self.game_id).await?;
        info!(status = %record.status(), "Game loaded");
        self.on_remote_change(record.clone());
        Ok(record)
    }

    /// Claims the opponent seat of a waiting game.
    ///
    /// The write only succeeds if the stored status is still waiting, so
    /// of several concurrent joiners exactly one wins; the others get a
    /// condition failure and should reload.
    ///
    /// # Errors
    ///
    /// [`SyncError`] if the store refuses the write or is unavailable.
    #[instrument(skip(self), fields(game_id = %self.game_id, user_id = %self.user_id))]
    pub async fn join_game(&self) -> Result<JoinOutcome, SyncError> {
        let Some(current) = self.view() else {
            debug!("Join ignored: game not loaded");
            return Ok(JoinOutcome::Ignored(JoinRejection::NotLoaded));
        };
        let record = current.record();
        if record.creator_id() == &self.user_id {
            debug!("Join ignored: caller created this game");
            return Ok(JoinOutcome::Ignored(JoinRejection::IsCreator));
        }
        if *record.status() != GameStatus::Waiting {
            debug!(status = %record.status(), "Join ignored: game not waiting");
            return Ok(JoinOutcome::Ignored(JoinRejection::NotWaiting(*record.status())));
        }

        let joined = self
            .store
            .update(
                &self.game_id,
                RecordPatch::join(self.user_id.clone()),
                Some(Condition::StatusIs(GameStatus::Waiting)),
            )
            .await
            .inspect_err(|e| warn!(error = %e, "Join failed"))?;

        info!("Joined game as O");
        self.on_remote_change(joined.clone());
        Ok(JoinOutcome::Joined(joined))
    }

    /// Plays the caller's mark at `index`.
    ///
    /// Works from the cached record. If the game is not started, the turn
    /// is not the caller's, or the square cannot be taken, nothing is
    /// written and the rejection is returned. Otherwise the view advances
    /// immediately and the move is written to the store.
    ///
    /// # Errors
    ///
    /// [`SyncError`] if the write fails. The view keeps the optimistic
    /// move until the next authoritative read or notification replaces it.
    #[instrument(skip(self), fields(game_id = %self.game_id, user_id = %self.user_id))]
    pub async fn submit_move(&self, index: usize) -> Result<MoveOutcome, SyncError> {
        let Some(current) = self.view() else {
            debug!("Move ignored: game not loaded");
            return Ok(MoveOutcome::Ignored(MoveRejection::NotLoaded));
        };
        let record = current.record();

        if *record.status() != GameStatus::Started {
            debug!(status = %record.status(), "Move ignored: game not started");
            return Ok(MoveOutcome::Ignored(MoveRejection::NotStarted(*record.status())));
        }
        if !record.can_move(&self.user_id) {
            debug!(turn_owner = %record.turn_owner(), "Move ignored: not caller's turn");
            return Ok(MoveOutcome::Ignored(MoveRejection::NotYourTurn));
        }
        let mark = *record.turn_owner();
        let board = match apply_move(record.board(), index, mark) {
            Ok(board) => board,
            Err(e) => {
                debug!(error = %e, "Move ignored: illegal");
                return Ok(MoveOutcome::Ignored(MoveRejection::Illegal(e)));
            }
        };

        let outcome = tictactoe_rules::outcome(&board);
        let status = outcome.is_terminal().then_some(GameStatus::Completed);
        let patch = RecordPatch::after_move(board, mark.opponent(), status);

        let optimistic = LocalView::optimistic(record.patched(&patch));
        self.view.send_replace(Some(optimistic.clone()));
        debug!(%mark, %outcome, "Applied move locally");

        let written = match self.store.update(&self.game_id, patch, None).await {
            Ok(written) => written,
            Err(e) => {
                warn!(error = %e, "Move write failed, local view is ahead of the store");
                return Err(e.into());
            }
        };

        // Confirm only if no newer record replaced the optimistic view meanwhile.
        let confirmed = LocalView::authoritative(written.clone());
        self.view.send_if_modified(|view| {
            if view.as_ref() == Some(&optimistic) {
                *view = Some(confirmed);
                true
            } else {
                false
            }
        });

        info!(%mark, %outcome, status = %written.status(), "Move written");
        Ok(MoveOutcome::Applied(written))
    }

    /// Folds an authoritative record into the local view.
    ///
    /// Records for other games are ignored. Otherwise the view becomes
    /// exactly `record`; delivering the same record twice changes nothing.
    /// Returns whether the view changed. Never blocks.
    #[instrument(skip(self, record), fields(game_id = %self.game_id, user_id = %self.user_id))]
    pub fn on_remote_change(&self, record: GameRecord) -> bool {
        if record.id() != &self.game_id {
            warn!(other = %record.id(), "Ignoring record for another game");
            return false;
        }

        let problems = record.violations();
        if !problems.is_empty() {
            warn!(?problems, "Adopting record that breaks game invariants");
        }

        self.view.send_if_modified(|view| {
            if let Some(previous) = view.as_ref() {
                let before = previous.record();
                if !before.status().can_advance_to(*record.status()) {
                    warn!(from = %before.status(), to = %record.status(), "Status moved backwards");
                }
                if !*previous.pending() && !is_valid_successor(before.board(), record.board()) {
                    debug!("Board changed by more than one move since last record");
                }
            }

            let next = reconcile(record);
            if view.as_ref() == Some(&next) {
                false
            } else {
                debug!(status = %next.record().status(), turn_owner = %next.record().turn_owner(), "View reconciled");
                *view = Some(next);
                true
            }
        })
    }

    /// Delivers every change of this game to `callback`.
    ///
    /// Each record is reconciled into the local view before `callback`
    /// sees it. The subscription lasts until the returned handle is
    /// cancelled or dropped.
    ///
    /// # Errors
    ///
    /// [`SyncError`] if the store cannot register the subscription.
    #[instrument(skip(self, callback), fields(game_id = %self.game_id, user_id = %self.user_id))]
    pub async fn subscribe<F>(&self, mut callback: F) -> Result<CancelHandle, SyncError>
    where
        F: FnMut(&GameRecord) + Send + 'static,
    {
        let mut subscription = self.store.subscribe(&self.game_id).await?;
        let coordinator = self.clone();

        let task = tokio::spawn(async move {
            while let Some(record) = subscription.recv().await {
                coordinator.on_remote_change(record.clone());
                callback(&record);
            }
            debug!(game_id = %coordinator.game_id, "Change feed ended");
        });

        info!("Subscribed to game changes");
        Ok(CancelHandle::new(self.game_id.clone(), task.abort_handle()))
    }
}

/// Releases a subscription registered by [`Coordinator::subscribe`].
///
/// Cancelling is idempotent. Dropping the handle cancels as well.
#[derive(Debug)]
pub struct CancelHandle {
    game_id: GameId,
    abort: AbortHandle,
    cancelled: AtomicBool,
}

impl CancelHandle {
    fn new(game_id: GameId, abort: AbortHandle) -> Self {
        Self {
            game_id,
            abort,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Stops delivering notifications.
    #[instrument(skip(self), fields(game_id = %self.game_id))]
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.abort.abort();
            info!("Subscription cancelled");
        }
    }

    /// Whether [`CancelHandle::cancel`] has run.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
