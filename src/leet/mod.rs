/*!
 * Leet o'Clock: every day, be the first to post right at 13:37.
 *
 * Messages posted in the minute before the target or during the target minute are scored by
 * their offset to the target. Reactions on scored messages follow the live ranking, and once
 * the target minute is over the scheduler posts a board per channel.
 */

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Local, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument};

use crate::{
    error::{LogResultExt, Result},
    models::{Game, Score},
    store::Store,
};

pub mod clock;
pub mod reactions;
pub mod scheduler;
pub mod scoreboard;

use reactions::{ReactionOp, Reconciler};
use scoreboard::Classification;

/// A guild message, as far as the game cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub author_id: String,
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: String,
    /// When the message was posted, from its id
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub game: Game,
    pub score: Score,
    /// Posted during the target minute itself
    pub on_target: bool,
}

pub struct LeetOClock {
    store: Arc<Store>,
    reconciler: Reconciler,
    target: watch::Receiver<DateTime<Local>>,
    /// Players who already got today's clock reaction
    clocked: Mutex<HashSet<String>>,
}

impl LeetOClock {
    pub fn new(
        store: Arc<Store>,
        reconciler: Reconciler,
        target: watch::Receiver<DateTime<Local>>,
    ) -> Self {
        Self { store, reconciler, target, clocked: Mutex::new(HashSet::new()) }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Today's target instant, as last published by the scheduler
    pub fn target(&self) -> DateTime<Local> {
        *self.target.borrow()
    }

    /// Scores the message if it was posted in the scoring window, then refreshes reactions of
    /// the whole game. Failures are logged, never surfaced in chat.
    pub async fn handle_submission(&self, submission: &Submission) {
        let recorded = match self.record(submission, &self.target()).await {
            Ok(Some(recorded)) => recorded,
            Ok(None) => return,
            Err(e) if e.is_unique_violation() => {
                debug!("Message {} is already scored", submission.message_id);
                return;
            }
            Err(e) => {
                error!("Recording score of message {} failed: {e}", submission.message_id);
                return;
            }
        };
        debug!(
            "Player {} scored {} ms in game {}",
            submission.author_id, recorded.score.score, recorded.game.id
        );

        if recorded.on_target && self.clocked.lock().await.insert(submission.author_id.clone()) {
            self.reconciler
                .queue()
                .push(ReactionOp::Add {
                    channel_id: submission.channel_id.clone(),
                    message_id: submission.message_id.clone(),
                    emoji: self.reconciler.emojis().clock.clone(),
                })
                .await;
        }

        self.renew_reactions(&recorded.game).await;
    }

    /// Persists the score of `submission` relative to `target`. Returns `None` when the message
    /// was not posted in the window.
    #[instrument(skip_all, fields(message_id = %submission.message_id))]
    pub async fn record(
        &self,
        submission: &Submission,
        target: &DateTime<Local>,
    ) -> Result<Option<Recorded>> {
        if !clock::is_on_target(&submission.timestamp, target, false) {
            return Ok(None);
        }

        let game_date = target.naive_local();
        let season = self.store.ensure_season(game_date).await?;
        let game = self
            .store
            .ensure_game(&submission.channel_id, &submission.guild_id, game_date, season.id)
            .await?;
        let player = self.store.ensure_player(&submission.author_id).await?;

        let offset = clock::score(&submission.timestamp, target);
        let score =
            self.store.create_score(&submission.message_id, player.id, offset, game.id).await?;
        let on_target = clock::is_on_target(&submission.timestamp, target, true);

        Ok(Some(Recorded { game, score, on_target }))
    }

    pub async fn renew_reactions(&self, game: &Game) {
        if let Some(scores) = self.store.get_scores_for_game(game).await.log_err("loading scores") {
            self.reconcile(game, &Classification::classify(scores)).await;
        }
    }

    pub async fn reconcile(&self, game: &Game, classification: &Classification) {
        self.reconciler.reconcile(game, classification).await;
    }

    /// The final board of `game`, with the classification it shows
    pub async fn scoreboard(
        &self,
        game: &Game,
        target: &DateTime<Local>,
    ) -> Result<(String, Classification)> {
        scoreboard::build(&self.store, game, target).await
    }

    /// Stores the best score of the season as one of its highscores
    #[instrument(skip(self), err)]
    pub async fn record_season_highscore(&self, season_id: i32) -> Result<()> {
        if let Some((score, _, player)) = self.store.season_highscore(season_id).await? {
            self.store.ensure_highscore(player.id, score.id, season_id).await?;
        }
        Ok(())
    }

    /// Forgets the day's clock reactions and reaction bookkeeping
    pub async fn reset_day(&self) {
        self.clocked.lock().await.clear();
        self.reconciler.forget().await;
        info!("Leet o'Clock day is over");
    }
}
