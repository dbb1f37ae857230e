//! Change notifications for a single record or for one participant's games.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::{GameId, GameRecord, UserId};

const FEED_CAPACITY: usize = 64;

/// Stream of full records delivered after each change.
///
/// Keyed by [`GameId`] for one game, or by [`UserId`] for every game a
/// participant created or joined. Dropping the subscription releases it,
/// including any background poller feeding it.
#[derive(Debug)]
pub struct Subscription<K = GameId> {
    key: K,
    rx: broadcast::Receiver<GameRecord>,
    feeder: Option<JoinHandle<()>>,
}

impl<K> Subscription<K> {
    /// Wraps a receiver fed directly by the store.
    pub(crate) fn new(key: K, rx: broadcast::Receiver<GameRecord>) -> Self {
        Self {
            key,
            rx,
            feeder: None,
        }
    }

    /// Wraps a receiver fed by a background task owned by this subscription.
    pub(crate) fn with_feeder(
        key: K,
        rx: broadcast::Receiver<GameRecord>,
        feeder: JoinHandle<()>,
    ) -> Self {
        Self {
            key,
            rx,
            feeder: Some(feeder),
        }
    }

    /// What this subscription follows.
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl Subscription<GameId> {
    /// The game this subscription follows.
    pub fn game_id(&self) -> &GameId {
        &self.key
    }
}

impl Subscription<UserId> {
    /// The participant whose games this subscription follows.
    pub fn user_id(&self) -> &UserId {
        &self.key
    }
}

impl<K: Display> Subscription<K> {
    /// Waits for the next record. Returns `None` once the feed is closed.
    ///
    /// A slow reader skips notifications it missed; every notification
    /// carries the complete record, so the next one delivered is still
    /// a full authoritative state.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn recv(&mut self) -> Option<GameRecord> {
        loop {
            match self.rx.recv().await {
                Ok(record) => return Some(record),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged, skipping stale notifications");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Change feed closed");
                    return None;
                }
            }
        }
    }
}

impl<K> Drop for Subscription<K> {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

type Channels<K> = HashMap<K, broadcast::Sender<GameRecord>>;

fn register<K: Eq + Hash + Clone>(
    channels: &mut Channels<K>,
    key: &K,
) -> broadcast::Receiver<GameRecord> {
    channels
        .entry(key.clone())
        .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
        .subscribe()
}

/// Sends `record` on the channel for `key`, removing it if nobody listens.
fn send<K: Eq + Hash>(channels: &mut Channels<K>, key: &K, record: &GameRecord) -> usize {
    let Some(tx) = channels.get(key) else {
        return 0;
    };
    match tx.send(record.clone()) {
        Ok(receivers) => receivers,
        Err(_) => {
            channels.remove(key);
            0
        }
    }
}

#[derive(Debug, Default)]
struct FeedChannels {
    games: Channels<GameId>,
    users: Channels<UserId>,
}

impl FeedChannels {
    /// Drops channels whose subscribers have all gone away.
    fn prune(&mut self) {
        self.games.retain(|_, tx| tx.receiver_count() > 0);
        self.users.retain(|_, tx| tx.receiver_count() > 0);
    }
}

/// Broadcast channels shared by everything writing to one store.
///
/// Each change is delivered to the game's own channel and to the channels
/// of its creator and opponent.
#[derive(Debug, Clone, Default)]
pub struct ChangeFeed {
    channels: Arc<Mutex<FeedChannels>>,
}

impl ChangeFeed {
    /// Creates an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `game_id`.
    #[instrument(skip(self))]
    pub fn subscribe(&self, game_id: &GameId) -> Subscription {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.prune();
        Subscription::new(game_id.clone(), register(&mut channels.games, game_id))
    }

    /// Registers interest in every game `user_id` takes part in.
    #[instrument(skip(self))]
    pub fn subscribe_user(&self, user_id: &UserId) -> Subscription<UserId> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.prune();
        Subscription::new(user_id.clone(), register(&mut channels.users, user_id))
    }

    /// Delivers `record` to every live subscriber of its game and participants.
    #[instrument(skip(self, record), fields(game_id = %record.id()))]
    pub fn publish(&self, record: &GameRecord) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let mut receivers = send(&mut channels.games, record.id(), record);
        receivers += send(&mut channels.users, record.creator_id(), record);
        if let Some(opponent) = record.opponent_id() {
            receivers += send(&mut channels.users, opponent, record);
        }
        debug!(receivers, "Published change");
    }

    /// Number of open channels, game and participant channels together.
    pub fn channel_count(&self) -> usize {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.games.len() + channels.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordPatch;
    use chrono::Utc;

    fn waiting(id: &str) -> GameRecord {
        GameRecord::waiting(GameId::from(id), UserId::from("alice"), Utc::now())
    }

    #[test]
    fn test_abandoned_channels_are_pruned_on_subscribe() {
        let feed = ChangeFeed::new();
        let game = feed.subscribe(&GameId::from("g1"));
        let user = feed.subscribe_user(&UserId::from("bob"));
        drop(game);
        drop(user);
        assert_eq!(feed.channel_count(), 2);

        let _live = feed.subscribe(&GameId::from("g2"));
        assert_eq!(feed.channel_count(), 1);
    }

    #[test]
    fn test_publish_without_listeners_drops_channel() {
        let feed = ChangeFeed::new();
        drop(feed.subscribe(&GameId::from("g1")));
        feed.publish(&waiting("g1"));
        assert_eq!(feed.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_participants_hear_about_their_games() {
        let feed = ChangeFeed::new();
        let mut creator = feed.subscribe_user(&UserId::from("alice"));
        let mut joiner = feed.subscribe_user(&UserId::from("bob"));
        let mut stranger = feed.subscribe_user(&UserId::from("carol"));

        let joined = waiting("g1").patched(&RecordPatch::join(UserId::from("bob")));
        feed.publish(&joined);

        assert_eq!(creator.recv().await, Some(joined.clone()));
        assert_eq!(joiner.recv().await, Some(joined));
        assert!(stranger.rx.try_recv().is_err());
        assert_eq!(creator.user_id(), &UserId::from("alice"));
    }
}
