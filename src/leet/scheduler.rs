/*!
 * The daily tick: keeps the target instant current and fires the two announcements
 */

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local};
use serenity::model::prelude::ChannelId;
use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    error::{Error, Result},
    leet::{
        clock::{Clock, Phase},
        scoreboard::Classification,
        LeetOClock,
    },
    messages::{self, MessageApi},
    models::Game,
};

/// Delay between the start of the target minute and the winners query, so that messages
/// posted in the last second are in
const WINNERS_DELAY: Duration = Duration::from_secs(62);
const HOT_POLL: Duration = Duration::from_secs(1);

/// Owns every piece of timing state. Message handlers only see the target, through the watch
/// channel.
pub struct Scheduler {
    leet: Arc<LeetOClock>,
    chat: Arc<dyn MessageApi>,
    clock: Clock,
    target: watch::Sender<DateTime<Local>>,
    channels: Vec<ChannelId>,
    idle_poll: Duration,
    phase: Phase,
    preparation_announced: bool,
    winners: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        leet: Arc<LeetOClock>,
        chat: Arc<dyn MessageApi>,
        clock: Clock,
        target: watch::Sender<DateTime<Local>>,
        channels: Vec<ChannelId>,
        idle_poll: Duration,
    ) -> Self {
        Self {
            leet,
            chat,
            clock,
            target,
            channels,
            idle_poll,
            phase: Phase::Idle,
            preparation_announced: false,
            winners: None,
        }
    }

    pub async fn run(mut self) {
        info!(
            "Leet o'Clock ticking, target {:02}:{:02}",
            self.clock.hour(),
            self.clock.minute()
        );
        loop {
            self.tick(Local::now());
            sleep(if self.phase.is_hot() { HOT_POLL } else { self.idle_poll }).await;
        }
    }

    fn tick(&mut self, now: DateTime<Local>) {
        let target = *self.target.borrow();
        let announcing = self.winners.as_ref().is_some_and(|w| !w.is_finished());
        let phase = Phase::at(&now, &target, announcing);
        if phase != self.phase {
            debug!("Leet o'Clock phase {:?} -> {phase:?}", self.phase);
        }

        match phase {
            Phase::Approaching | Phase::Target => {
                if !self.preparation_announced {
                    self.preparation_announced = true;
                    let chat = self.chat.clone();
                    let channels = self.channels.clone();
                    tokio::spawn(async move {
                        announce_preparation(chat.as_ref(), &channels, &target).await
                    });
                }
                if phase == Phase::Target && self.winners.is_none() {
                    let leet = self.leet.clone();
                    let chat = self.chat.clone();
                    self.winners = Some(tokio::spawn(async move {
                        sleep(WINNERS_DELAY).await;
                        announce_winners(&leet, chat.as_ref(), &target).await;
                    }));
                }
            }
            Phase::Announcing => {}
            Phase::Idle => {
                if self.phase != Phase::Idle {
                    self.preparation_announced = false;
                    self.winners = None;
                }
                self.refresh_target(&now);
            }
        }

        self.phase = phase;
    }

    /// Publishes today's target when the day changed
    fn refresh_target(&self, now: &DateTime<Local>) {
        let target = self.clock.target_on(now);
        let changed = self.target.send_if_modified(|current| {
            let changed = *current != target;
            *current = target;
            changed
        });
        if changed {
            info!("Next Leet o'Clock at {target}");
        }
    }
}

async fn announce_preparation(
    chat: &dyn MessageApi,
    channels: &[ChannelId],
    target: &DateTime<Local>,
) {
    for channel in channels {
        if let Err(e) = messages::preparation(chat, *channel, target).await {
            error!("Error while sending preparation announcement to {channel}: {e}");
        }
    }
}

/// Posts the board of every game played today. A failing game does not hold up the others.
/// Reactions are lined up with the boards once every board is out.
async fn announce_winners(leet: &LeetOClock, chat: &dyn MessageApi, target: &DateTime<Local>) {
    info!("Announcing winners");
    let games = match leet.store().get_games_by_date(target.date_naive()).await {
        Ok(games) => games,
        Err(e) => {
            error!("Error while getting games by date: {e}");
            return;
        }
    };

    let mut posted = Vec::new();
    let mut seasons = Vec::new();
    for game in games {
        if !seasons.contains(&game.season_id) {
            seasons.push(game.season_id);
        }
        match try_announce_game(leet, chat, &game, target).await {
            Ok(classification) => posted.push((game, classification)),
            Err(e) => error!("Error while announcing game {}: {e}", game.id),
        }
    }

    for (game, classification) in &posted {
        leet.reconcile(game, classification).await;
    }

    for season in seasons {
        if let Err(e) = leet.record_season_highscore(season).await {
            warn!("Error while recording highscore of season {season}: {e}");
        }
    }

    leet.reset_day().await;
}

#[instrument(skip_all, fields(game_id = game.id))]
async fn try_announce_game(
    leet: &LeetOClock,
    chat: &dyn MessageApi,
    game: &Game,
    target: &DateTime<Local>,
) -> Result<Classification> {
    let (board, classification) = leet.scoreboard(game, target).await?;
    let channel = game
        .channel_id
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(ChannelId::new)
        .ok_or_else(|| Error::InvalidId(game.channel_id.clone()))?;
    messages::scoreboard(chat, channel, &board).await?;
    Ok(classification)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        leet::{
            reactions::{tests::start, tests::FakeDiscord, Emojis, Reconciler},
            Submission,
        },
        messages::tests::FakeChat,
        store::Store,
    };

    const ANNOUNCEMENTS: u64 = 5;

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, day, h, m, s).earliest().unwrap()
    }

    struct Setup {
        scheduler: Scheduler,
        target: watch::Receiver<DateTime<Local>>,
        chat: Arc<FakeChat>,
    }

    fn setup(now: DateTime<Local>) -> Setup {
        let clock = Clock::new(13, 37).unwrap();
        let (tx, rx) = watch::channel(clock.target_on(&now));
        let (queue, _worker) = start(&Arc::new(FakeDiscord::default()), 64);
        let store = Arc::new(Store::open(":memory:").unwrap());
        let reconciler = Reconciler::new(Emojis::default(), queue);
        let leet = Arc::new(LeetOClock::new(store, reconciler, rx.clone()));
        let chat = Arc::new(FakeChat::default());
        let channels = vec![ChannelId::new(ANNOUNCEMENTS)];
        let idle = Duration::from_secs(60);
        let scheduler = Scheduler::new(leet, chat.clone(), clock, tx, channels, idle);
        Setup { scheduler, target: rx, chat }
    }

    fn submission(author: &str, channel: &str, message: &str, offset_ms: i64) -> Submission {
        Submission {
            author_id: author.to_owned(),
            guild_id: "100".to_owned(),
            channel_id: channel.to_owned(),
            message_id: message.to_owned(),
            timestamp: (at(1, 13, 37, 0) + chrono::Duration::milliseconds(offset_ms))
                .with_timezone(&Utc),
        }
    }

    fn winners_done(s: &Scheduler) -> bool {
        s.winners.as_ref().is_some_and(|w| w.is_finished())
    }

    #[tokio::test]
    async fn announcements_fire_once_per_day() {
        let Setup { scheduler: mut s, .. } = setup(at(1, 9, 0, 0));

        s.tick(at(1, 13, 36, 5));
        assert_eq!(s.phase, Phase::Approaching);
        assert!(s.preparation_announced);
        assert!(s.winners.is_none());

        s.tick(at(1, 13, 37, 0));
        assert_eq!(s.phase, Phase::Target);
        assert!(s.winners.as_ref().is_some_and(|w| !w.is_finished()));

        s.tick(at(1, 13, 37, 1));
        assert_eq!(s.phase, Phase::Target);
        assert!(s.winners.is_some());

        s.tick(at(1, 13, 38, 1));
        assert_eq!(s.phase, Phase::Announcing);
        assert!(s.preparation_announced);
    }

    #[tokio::test(start_paused = true)]
    async fn full_day_rearms_announcements() {
        let Setup { scheduler: mut s, mut target, chat } = setup(at(1, 9, 0, 0));

        s.tick(at(1, 13, 36, 5));
        s.tick(at(1, 13, 37, 0));
        for _ in 0..1000 {
            if winners_done(&s) {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
        assert!(winners_done(&s));

        s.tick(at(1, 13, 38, 30));
        assert_eq!(s.phase, Phase::Idle);
        assert!(!s.preparation_announced);
        assert!(s.winners.is_none());
        assert!(!target.has_changed().unwrap());

        s.tick(at(2, 0, 1, 0));
        assert!(target.has_changed().unwrap());
        assert_eq!(*target.borrow_and_update(), at(2, 13, 37, 0));
        s.tick(at(2, 9, 0, 0));
        assert!(!target.has_changed().unwrap());

        s.tick(at(2, 13, 36, 10));
        assert_eq!(s.phase, Phase::Approaching);
        assert!(s.preparation_announced);
        s.tick(at(2, 13, 37, 0));
        assert!(s.winners.as_ref().is_some_and(|w| !w.is_finished()));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let notices = chat.sent_to(ANNOUNCEMENTS);
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[1], messages::preparation_text(&at(2, 13, 37, 0)));
    }

    #[tokio::test]
    async fn failing_game_does_not_hold_up_the_others() {
        let Setup { scheduler: s, chat, .. } = setup(at(1, 9, 0, 0));
        let leet = &s.leet;
        leet.handle_submission(&submission("a", "not-a-channel", "1", 10)).await;
        leet.handle_submission(&submission("b", "200", "2", 20)).await;
        assert_eq!(leet.clocked.lock().await.len(), 2);

        announce_winners(leet, chat.as_ref(), &at(1, 13, 37, 0)).await;

        let boards = chat.sent_to(200);
        assert_eq!(boards.len(), 1);
        assert!(boards[0].contains("🥇 <@b> with 20 ms"));
        assert_eq!(chat.sent.lock().unwrap().len(), 1);

        let highscores = leet.store().get_highscores().await.unwrap();
        let a = leet.store().get_player_by_user_id("a").await.unwrap();
        assert_eq!(highscores.len(), 1);
        assert_eq!(highscores[0].player_id, a.id);

        assert!(leet.clocked.lock().await.is_empty());
    }
}
