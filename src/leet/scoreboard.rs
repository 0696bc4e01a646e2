/*!
 * Ranking of a game's scores and the 1337erboard posted once the game is over
 */

use std::{collections::HashMap, fmt::Write};

use chrono::{DateTime, TimeZone};
use futures::future::try_join_all;
use itertools::Itertools;

use crate::{
    error::Result,
    models::{Game, Player, Score},
    store::Store,
};

/// Most winners a game can have
pub const MAX_WINNERS: usize = 3;
/// How early a message can be and still be mentioned, in milliseconds
pub const EARLY_BIRD_THRESHOLD: i64 = -5000;

const MEDALS: [&str; MAX_WINNERS] = ["🥇", "🥈", "🥉"];
const OTHER_MEDAL: &str = "🏅";
const ZONK: &str = "😭";
const EARLY_ZONK: &str = "🫠";
const EARLY_WINNER: &str = "😐";
const EARLY_BIRD: &str = "🤨";

/// Scores of a game split in the three buckets shown on the board. A player takes at most one
/// winner slot and one zonk entry, early birds are listed whatever else the player did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Every score of the game, ascending
    pub ranked: Vec<Score>,
    pub winners: Vec<Score>,
    pub zonks: Vec<Score>,
    pub early_birds: Vec<Score>,
}

/// What an early bird's player did besides being early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyBird {
    AlsoZonk,
    AlsoWinner,
    Only,
}

impl Classification {
    pub fn classify(mut scores: Vec<Score>) -> Self {
        // Stable, so equal scores keep insertion order
        scores.sort_by_key(|s| s.score);

        let mut winners: Vec<Score> = Vec::new();
        for score in &scores {
            if winners.len() >= MAX_WINNERS {
                break;
            }
            if score.score >= 0 && !has_player(&winners, score) {
                winners.push(score.clone());
            }
        }

        let mut zonks: Vec<Score> = Vec::new();
        for score in &scores {
            if score.score > 0 && !has_player(&zonks, score) && !has_player(&winners, score) {
                zonks.push(score.clone());
            }
        }

        let mut early_birds: Vec<Score> = Vec::new();
        for score in &scores {
            let early = (EARLY_BIRD_THRESHOLD..0).contains(&score.score);
            if early && !has_player(&early_birds, score) {
                early_birds.push(score.clone());
            }
        }

        Self { ranked: scores, winners, zonks, early_birds }
    }

    pub fn early_bird_kind(&self, score: &Score) -> EarlyBird {
        if has_player(&self.zonks, score) {
            EarlyBird::AlsoZonk
        } else if has_player(&self.winners, score) {
            EarlyBird::AlsoWinner
        } else {
            EarlyBird::Only
        }
    }

    pub fn player_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.winners
            .iter()
            .chain(&self.zonks)
            .chain(&self.early_birds)
            .map(|s| s.player_id)
            .unique()
    }
}

fn has_player(scores: &[Score], score: &Score) -> bool {
    scores.iter().any(|s| s.player_id == score.player_id)
}

/// Medal for a 0-based winner rank
pub fn medal(rank: usize) -> &'static str {
    MEDALS.get(rank).copied().unwrap_or(OTHER_MEDAL)
}

/// Best score of the season the game belongs to, shown at the bottom of the board
#[derive(Debug, Clone)]
pub struct SeasonHighscore {
    pub score: Score,
    pub game: Game,
    pub player: Player,
    /// Unix timestamp the season ends at
    pub season_end: i64,
}

/// Renders the board. Every classified score's player must be in `players`.
pub fn render<Tz: TimeZone>(
    game: &Game,
    target: &DateTime<Tz>,
    classification: &Classification,
    players: &HashMap<i32, Player>,
    highscore: Option<&SeasonHighscore>,
) -> String {
    let mut board = format!("## 1337erboard for <t:{}>\n", target.timestamp());
    let line = |board: &mut String, award: &str, score: &Score| {
        let user = players.get(&score.player_id).map(|p| p.user_id.as_str()).unwrap_or_default();
        // Writing to a String cannot fail
        let _ = writeln!(
            board,
            "{award} <@{user}> with {} ms ({})",
            score.score,
            game.message_link(&score.message_id)
        );
    };

    if !classification.winners.is_empty() {
        board.push_str("### Top scorers\n");
    }
    for (rank, winner) in classification.winners.iter().enumerate() {
        line(&mut board, medal(rank), winner);
    }

    if !classification.zonks.is_empty() {
        board.push_str("### Zonks\n");
    }
    for zonk in &classification.zonks {
        line(&mut board, ZONK, zonk);
    }

    if !classification.early_birds.is_empty() {
        board.push_str("### Honorlolable mentions\n");
    }
    for early in &classification.early_birds {
        let award = match classification.early_bird_kind(early) {
            EarlyBird::AlsoZonk => EARLY_ZONK,
            EarlyBird::AlsoWinner => EARLY_WINNER,
            EarlyBird::Only => EARLY_BIRD,
        };
        line(&mut board, award, early);
    }

    if let Some(hs) = highscore {
        let _ = write!(
            board,
            "### Current season highscore\n<@{}> with {} ms on <t:{}> ({})\n\
             \nCurrent season ends on <t:{end}> (<t:{end}:R>)\n",
            hs.player.user_id,
            hs.score.score,
            hs.score.created_at.and_utc().timestamp(),
            hs.game.message_link(&hs.score.message_id),
            end = hs.season_end,
        );
    }

    board
}

/// Fetches everything needed and renders the board of `game`, along with the classification it
/// shows. Any lookup failure aborts the whole board.
pub async fn build<Tz: TimeZone>(
    store: &Store,
    game: &Game,
    target: &DateTime<Tz>,
) -> Result<(String, Classification)> {
    let classification = Classification::classify(store.get_scores_for_game(game).await?);

    let players = try_join_all(classification.player_ids().map(|id| store.get_player_by_id(id)))
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect::<HashMap<_, _>>();

    let season = store.get_season_by_id(game.season_id).await?;
    let season_end = target
        .timezone()
        .from_local_datetime(&season.end_date)
        .earliest()
        .map(|end| end.timestamp())
        .unwrap_or_else(|| season.end_date.and_utc().timestamp());
    let highscore = store
        .season_highscore(season.id)
        .await?
        .map(|(score, game, player)| SeasonHighscore { score, game, player, season_end });

    let board = render(game, target, &classification, &players, highscore.as_ref());
    Ok((board, classification))
}
