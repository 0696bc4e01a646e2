/*!
 * DB models for the bot
 */

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

pub use crate::schema::{game, highscore, player, score, season};

/// A calendar month grouping of games
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = season)]
pub struct Season {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = season)]
pub struct NewSeason {
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
}

impl NewSeason {
    /// Bounds of the calendar month containing `date`, the end being the last nanosecond of the
    /// month.
    pub fn for_date(date: NaiveDateTime) -> Self {
        let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
            .unwrap_or_else(|| date.date());
        let next_month = first
            .checked_add_months(chrono::Months::new(1))
            .unwrap_or(NaiveDate::MAX);
        let last = next_month.pred_opt().unwrap_or(next_month);
        let end_of_day = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
            .unwrap_or(NaiveTime::MIN);

        Self { start_date: first.and_time(NaiveTime::MIN), end_date: last.and_time(end_of_day) }
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = player)]
pub struct Player {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub user_id: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = player)]
pub struct NewPlayer<'a> {
    pub user_id: &'a str,
}

/// One occurrence of the daily event in one channel
#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = game, belongs_to(Season))]
pub struct Game {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub channel_id: String,
    pub guild_id: String,
    pub game_date: NaiveDateTime,
    pub season_id: i32,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = game)]
pub struct NewGame<'a> {
    pub channel_id: &'a str,
    pub guild_id: &'a str,
    pub game_date: NaiveDateTime,
    pub season_id: i32,
}

impl Game {
    /// Discord link to a message posted in this game's channel
    pub fn message_link(&self, message_id: &str) -> String {
        format!("https://discord.com/channels/{}/{}/{}", self.guild_id, self.channel_id, message_id)
    }
}

/// Offset of a single message from the target instant, in milliseconds
#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = score, belongs_to(Game), belongs_to(Player))]
pub struct Score {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub game_id: i32,
    pub message_id: String,
    pub player_id: i32,
    #[diesel(column_name = value)]
    pub score: i64,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = score)]
pub struct NewScore<'a> {
    pub game_id: i32,
    pub message_id: &'a str,
    pub player_id: i32,
    #[diesel(column_name = value)]
    pub score: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = highscore)]
pub struct Highscore {
    pub id: i32,
    pub created_at: NaiveDateTime,
    pub player_id: i32,
    pub score_id: i32,
    pub season_id: i32,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = highscore)]
pub struct NewHighscore {
    pub player_id: i32,
    pub score_id: i32,
    pub season_id: i32,
}
