/*!
 * Keeps the bot's reactions on scored messages in line with the current ranking.
 *
 * Calls to discord go through a bounded queue drained by a single worker, so a burst of scoring
 * messages never turns into an unbounded number of concurrent API calls and the calls for one
 * message are applied in the order they were issued.
 */

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    num::NonZeroU64,
    sync::Arc,
};

use async_trait::async_trait;
use serenity::{
    http::Http,
    model::prelude::{ChannelId, MessageId, ReactionType},
};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    leet::scoreboard::{Classification, EarlyBird},
    models::Game,
};

/// The part of discord the reconciler talks to
#[async_trait]
pub trait ReactionApi: Send + Sync {
    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()>;

    /// Removes the bot's own reaction, if any
    async fn remove_own_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<()>;
}

fn snowflake(id: &str) -> Result<u64> {
    id.parse::<NonZeroU64>().map(NonZeroU64::get).map_err(|_| Error::InvalidId(id.to_owned()))
}

fn reaction(emoji: &str) -> Result<ReactionType> {
    ReactionType::try_from(emoji).map_err(|_| Error::InvalidEmoji(emoji.to_owned()))
}

#[async_trait]
impl ReactionApi for Http {
    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        let channel = ChannelId::new(snowflake(channel_id)?);
        let message = MessageId::new(snowflake(message_id)?);
        Ok(self.create_reaction(channel, message, &reaction(emoji)?).await?)
    }

    async fn remove_own_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let channel = ChannelId::new(snowflake(channel_id)?);
        let message = MessageId::new(snowflake(message_id)?);
        Ok(self.delete_reaction_me(channel, message, &reaction(emoji)?).await?)
    }
}

/// Reaction emojis, either unicode or `<:name:id>` custom emojis
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Emojis {
    pub first: String,
    pub second: String,
    pub third: String,
    pub zonk: String,
    /// Early bird whose player is also a zonk
    pub early_zonk: String,
    /// Early bird whose player is also a winner
    pub early_winner: String,
    pub early_bird: String,
    /// First on-target message of a player each day
    pub clock: String,
}

impl Default for Emojis {
    fn default() -> Self {
        Self {
            first: "🥇".to_owned(),
            second: "🥈".to_owned(),
            third: "🥉".to_owned(),
            zonk: "😭".to_owned(),
            early_zonk: "🫠".to_owned(),
            early_winner: "😐".to_owned(),
            early_bird: "🤨".to_owned(),
            clock: "⏰".to_owned(),
        }
    }
}

impl Emojis {
    fn medal(&self, rank: usize) -> Option<&str> {
        match rank {
            0 => Some(self.first.as_str()),
            1 => Some(self.second.as_str()),
            2 => Some(self.third.as_str()),
            _ => None,
        }
    }

    /// Emojis each classified message should carry, keyed by message id
    fn desired(&self, classification: &Classification) -> BTreeMap<String, BTreeSet<String>> {
        let mut desired: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut put = |message_id: &str, emoji: &str| {
            desired.entry(message_id.to_owned()).or_default().insert(emoji.to_owned());
        };

        for (rank, winner) in classification.winners.iter().enumerate() {
            if let Some(medal) = self.medal(rank) {
                put(&winner.message_id, medal);
            }
        }
        for zonk in &classification.zonks {
            put(&zonk.message_id, &self.zonk);
        }
        for early in &classification.early_birds {
            let emoji = match classification.early_bird_kind(early) {
                EarlyBird::AlsoZonk => &self.early_zonk,
                EarlyBird::AlsoWinner => &self.early_winner,
                EarlyBird::Only => &self.early_bird,
            };
            put(&early.message_id, emoji);
        }

        desired
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOp {
    Add { channel_id: String, message_id: String, emoji: String },
    Remove { channel_id: String, message_id: String, emoji: String },
}

/// Sending side of the reaction worker
#[derive(Clone)]
pub struct ReactionQueue {
    tx: mpsc::Sender<ReactionOp>,
}

/// Receiving side, waiting for an API to drain into
pub struct ReactionWorker {
    rx: mpsc::Receiver<ReactionOp>,
}

impl ReactionQueue {
    pub fn new(capacity: usize) -> (Self, ReactionWorker) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, ReactionWorker { rx })
    }

    /// Waits for room in the queue, never for the call itself
    pub async fn push(&self, op: ReactionOp) {
        if self.tx.send(op).await.is_err() {
            warn!("Reaction worker is gone, dropping reaction");
        }
    }
}

impl ReactionWorker {
    /// Starts applying queued calls in order. The worker stops once every queue handle is
    /// dropped and the backlog is done.
    pub fn spawn(mut self, api: Arc<dyn ReactionApi>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(op) = self.rx.recv().await {
                let res = match &op {
                    ReactionOp::Add { channel_id, message_id, emoji } => {
                        api.add_reaction(channel_id, message_id, emoji).await
                    }
                    ReactionOp::Remove { channel_id, message_id, emoji } => {
                        api.remove_own_reaction(channel_id, message_id, emoji).await
                    }
                };
                if let Err(e) = res {
                    warn!("reaction {op:?} failed: {e}");
                }
            }
            debug!("Reaction worker stopped");
        })
    }
}

/// Managed emojis the bot put on each message, per game
type Placed = HashMap<i32, BTreeMap<String, BTreeSet<String>>>;

pub struct Reconciler {
    emojis: Emojis,
    queue: ReactionQueue,
    placed: Mutex<Placed>,
}

impl Reconciler {
    pub fn new(emojis: Emojis, queue: ReactionQueue) -> Self {
        Self { emojis, queue, placed: Mutex::new(HashMap::new()) }
    }

    pub fn emojis(&self) -> &Emojis {
        &self.emojis
    }

    pub fn queue(&self) -> &ReactionQueue {
        &self.queue
    }

    /// Brings the managed emojis of the game's messages in line with `classification`. Only
    /// messages classified now or decorated by an earlier run are touched, and only emojis the
    /// bot placed are removed. Running it again on the same classification issues no call.
    /// Concurrent calls wait for the one in progress.
    pub async fn reconcile(&self, game: &Game, classification: &Classification) {
        let mut placed = self.placed.lock().await;
        let placed = placed.entry(game.id).or_default();
        let desired = self.emojis.desired(classification);

        let messages: BTreeSet<String> = placed.keys().chain(desired.keys()).cloned().collect();
        for message_id in messages {
            let wanted = desired.get(&message_id).cloned().unwrap_or_default();
            let current = placed.remove(&message_id).unwrap_or_default();

            for emoji in current.difference(&wanted) {
                self.queue
                    .push(ReactionOp::Remove {
                        channel_id: game.channel_id.clone(),
                        message_id: message_id.clone(),
                        emoji: emoji.clone(),
                    })
                    .await;
            }
            for emoji in wanted.difference(&current) {
                self.queue
                    .push(ReactionOp::Add {
                        channel_id: game.channel_id.clone(),
                        message_id: message_id.clone(),
                        emoji: emoji.clone(),
                    })
                    .await;
            }

            if !wanted.is_empty() {
                placed.insert(message_id, wanted);
            }
        }
    }

    /// Forgets what was placed, once the day's games are over
    pub async fn forget(&self) {
        self.placed.lock().await.clear();
    }
}
