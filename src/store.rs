/*!
 * Persistent store for seasons, games, players, scores and highscores.
 *
 * Every access goes through a single async mutex around one SQLite connection. Write volume is
 * a handful of rows per day, so serializing everything is fine. The `ensure_*` operations are
 * get-or-create: they insert with `ON CONFLICT DO NOTHING` against a unique index and re-select,
 * so calling them twice for the same logical entity always yields the same row.
 */

use chrono::{NaiveDate, NaiveDateTime};
use diesel::{
    connection::SimpleConnection, BelongingToDsl, BoolExpressionMethods, Connection,
    ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper, SqliteConnection,
};
use diesel_async::{sync_connection_wrapper::SyncConnectionWrapper, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::{
    error::{Error, Result},
    models::*,
};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type Conn = SyncConnectionWrapper<SqliteConnection>;

pub struct Store {
    conn: Mutex<Conn>,
}

#[allow(dead_code)]
impl Store {
    /// Opens (or creates) the database at `path` and brings its schema up to date. `:memory:`
    /// gives a private in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let mut conn = SqliteConnection::establish(path)?;
        conn.batch_execute("PRAGMA foreign_keys = ON;")?;

        let applied = conn.run_pending_migrations(MIGRATIONS).map_err(Error::Migration)?;
        if !applied.is_empty() {
            info!("Applied {} migration(s) to {path}", applied.len());
        }

        Ok(Self { conn: Mutex::new(SyncConnectionWrapper::new(conn)) })
    }

    // Seasons

    #[instrument(skip(self), err)]
    pub async fn ensure_season(&self, date: NaiveDateTime) -> Result<Season> {
        let mut conn = self.conn.lock().await;

        if let Some(season) = find_season_by_date(&mut conn, date).await? {
            return Ok(season);
        }

        let new = NewSeason::for_date(date);
        debug!("Creating season {} - {}", new.start_date, new.end_date);
        diesel::insert_into(season::table)
            .values(&new)
            .on_conflict_do_nothing()
            .execute(&mut *conn)
            .await?;

        Ok(season::table
            .filter(season::start_date.eq(new.start_date))
            .select(Season::as_select())
            .first(&mut *conn)
            .await?)
    }

    pub async fn get_seasons(&self) -> Result<Vec<Season>> {
        let mut conn = self.conn.lock().await;
        Ok(season::table.select(Season::as_select()).load(&mut *conn).await?)
    }

    pub async fn get_season_by_id(&self, id: i32) -> Result<Season> {
        let mut conn = self.conn.lock().await;
        Ok(season::table.find(id).select(Season::as_select()).first(&mut *conn).await?)
    }

    pub async fn get_season_by_date(&self, date: NaiveDateTime) -> Result<Option<Season>> {
        let mut conn = self.conn.lock().await;
        find_season_by_date(&mut conn, date).await
    }

    // Players

    pub async fn create_player(&self, user_id: &str) -> Result<Player> {
        let mut conn = self.conn.lock().await;
        diesel::insert_into(player::table)
            .values(&NewPlayer { user_id })
            .execute(&mut *conn)
            .await?;
        find_player_by_user_id(&mut conn, user_id).await
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_player(&self, user_id: &str) -> Result<Player> {
        let mut conn = self.conn.lock().await;
        diesel::insert_into(player::table)
            .values(&NewPlayer { user_id })
            .on_conflict_do_nothing()
            .execute(&mut *conn)
            .await?;
        find_player_by_user_id(&mut conn, user_id).await
    }

    pub async fn get_players(&self) -> Result<Vec<Player>> {
        let mut conn = self.conn.lock().await;
        Ok(player::table.select(Player::as_select()).load(&mut *conn).await?)
    }

    pub async fn get_player_by_id(&self, id: i32) -> Result<Player> {
        let mut conn = self.conn.lock().await;
        Ok(player::table.find(id).select(Player::as_select()).first(&mut *conn).await?)
    }

    pub async fn get_player_by_user_id(&self, user_id: &str) -> Result<Player> {
        let mut conn = self.conn.lock().await;
        find_player_by_user_id(&mut conn, user_id).await
    }

    // Games

    #[instrument(skip(self), err)]
    pub async fn ensure_game(
        &self,
        channel_id: &str,
        guild_id: &str,
        game_date: NaiveDateTime,
        season_id: i32,
    ) -> Result<Game> {
        let mut conn = self.conn.lock().await;

        let new = NewGame { channel_id, guild_id, game_date, season_id };
        diesel::insert_into(game::table)
            .values(&new)
            .on_conflict_do_nothing()
            .execute(&mut *conn)
            .await?;

        Ok(game::table
            .filter(game::channel_id.eq(channel_id))
            .filter(game::guild_id.eq(guild_id))
            .filter(game::game_date.eq(game_date))
            .filter(game::season_id.eq(season_id))
            .select(Game::as_select())
            .first(&mut *conn)
            .await?)
    }

    pub async fn get_games(&self) -> Result<Vec<Game>> {
        let mut conn = self.conn.lock().await;
        Ok(game::table.select(Game::as_select()).load(&mut *conn).await?)
    }

    pub async fn get_game_by_id(&self, id: i32) -> Result<Game> {
        let mut conn = self.conn.lock().await;
        Ok(game::table.find(id).select(Game::as_select()).first(&mut *conn).await?)
    }

    pub async fn get_games_by_channel_id(&self, channel_id: &str) -> Result<Vec<Game>> {
        let mut conn = self.conn.lock().await;
        Ok(game::table
            .filter(game::channel_id.eq(channel_id))
            .select(Game::as_select())
            .load(&mut *conn)
            .await?)
    }

    pub async fn get_games_by_guild_id(&self, guild_id: &str) -> Result<Vec<Game>> {
        let mut conn = self.conn.lock().await;
        Ok(game::table
            .filter(game::guild_id.eq(guild_id))
            .select(Game::as_select())
            .load(&mut *conn)
            .await?)
    }

    /// Every game played on `date`, one per channel the game happened in
    #[instrument(skip(self), err)]
    pub async fn get_games_by_date(&self, date: NaiveDate) -> Result<Vec<Game>> {
        let start = date.and_time(chrono::NaiveTime::MIN);
        let end = date.succ_opt().unwrap_or(date).and_time(chrono::NaiveTime::MIN);

        let mut conn = self.conn.lock().await;
        Ok(game::table
            .filter(game::game_date.ge(start).and(game::game_date.lt(end)))
            .order(game::id)
            .select(Game::as_select())
            .load(&mut *conn)
            .await?)
    }

    // Scores

    /// Scores are never updated: a second score for the same message is rejected by the
    /// storage layer.
    #[instrument(skip(self), err)]
    pub async fn create_score(
        &self,
        message_id: &str,
        player_id: i32,
        score: i64,
        game_id: i32,
    ) -> Result<Score> {
        let mut conn = self.conn.lock().await;
        diesel::insert_into(score::table)
            .values(&NewScore { game_id, message_id, player_id, score })
            .execute(&mut *conn)
            .await?;

        Ok(score::table
            .filter(score::message_id.eq(message_id))
            .select(Score::as_select())
            .first(&mut *conn)
            .await?)
    }

    pub async fn get_scores(&self) -> Result<Vec<Score>> {
        let mut conn = self.conn.lock().await;
        Ok(score::table.select(Score::as_select()).load(&mut *conn).await?)
    }

    pub async fn get_score_by_id(&self, id: i32) -> Result<Score> {
        let mut conn = self.conn.lock().await;
        Ok(score::table.find(id).select(Score::as_select()).first(&mut *conn).await?)
    }

    /// Scores of a game in insertion order
    pub async fn get_scores_for_game(&self, game: &Game) -> Result<Vec<Score>> {
        let mut conn = self.conn.lock().await;
        Ok(Score::belonging_to(game)
            .order(score::id)
            .select(Score::as_select())
            .load(&mut *conn)
            .await?)
    }

    /// Best on-or-after-target score of any game in the season, with where and by whom it was
    /// posted.
    pub async fn season_highscore(&self, season_id: i32) -> Result<Option<(Score, Game, Player)>> {
        let mut conn = self.conn.lock().await;
        Ok(score::table
            .inner_join(game::table)
            .inner_join(player::table)
            .filter(game::season_id.eq(season_id))
            .filter(score::value.ge(0))
            .order((score::value.asc(), score::id.asc()))
            .select((Score::as_select(), Game::as_select(), Player::as_select()))
            .first(&mut *conn)
            .await
            .optional()?)
    }

    // Highscores

    pub async fn create_highscore(
        &self,
        player_id: i32,
        score_id: i32,
        season_id: i32,
    ) -> Result<Highscore> {
        let mut conn = self.conn.lock().await;
        diesel::insert_into(highscore::table)
            .values(&NewHighscore { player_id, score_id, season_id })
            .execute(&mut *conn)
            .await?;
        find_highscore_by_score_id(&mut conn, score_id).await
    }

    /// Records `score` as a highscore of its season unless it already is one
    #[instrument(skip(self), err)]
    pub async fn ensure_highscore(
        &self,
        player_id: i32,
        score_id: i32,
        season_id: i32,
    ) -> Result<Highscore> {
        let mut conn = self.conn.lock().await;
        diesel::insert_into(highscore::table)
            .values(&NewHighscore { player_id, score_id, season_id })
            .on_conflict_do_nothing()
            .execute(&mut *conn)
            .await?;
        find_highscore_by_score_id(&mut conn, score_id).await
    }

    pub async fn get_highscores(&self) -> Result<Vec<Highscore>> {
        let mut conn = self.conn.lock().await;
        Ok(highscore::table.select(Highscore::as_select()).load(&mut *conn).await?)
    }

    pub async fn get_highscore_by_id(&self, id: i32) -> Result<Highscore> {
        let mut conn = self.conn.lock().await;
        Ok(highscore::table.find(id).select(Highscore::as_select()).first(&mut *conn).await?)
    }

    pub async fn get_highscore_by_player_and_season(
        &self,
        player_id: i32,
        season_id: i32,
    ) -> Result<Option<Highscore>> {
        let mut conn = self.conn.lock().await;
        Ok(highscore::table
            .filter(highscore::player_id.eq(player_id))
            .filter(highscore::season_id.eq(season_id))
            .select(Highscore::as_select())
            .first(&mut *conn)
            .await
            .optional()?)
    }
}

async fn find_season_by_date(conn: &mut Conn, date: NaiveDateTime) -> Result<Option<Season>> {
    Ok(season::table
        .filter(season::start_date.le(date))
        .filter(season::end_date.ge(date))
        .select(Season::as_select())
        .first(conn)
        .await
        .optional()?)
}

async fn find_player_by_user_id(conn: &mut Conn, user_id: &str) -> Result<Player> {
    Ok(player::table
        .filter(player::user_id.eq(user_id))
        .select(Player::as_select())
        .first(conn)
        .await?)
}

async fn find_highscore_by_score_id(conn: &mut Conn, score_id: i32) -> Result<Highscore> {
    Ok(highscore::table
        .filter(highscore::score_id.eq(score_id))
        .select(Highscore::as_select())
        .first(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    fn store() -> Store {
        Store::open(":memory:").unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[tokio::test]
    async fn ensure_season_creates_calendar_month_once() {
        let store = store();

        let july = store.ensure_season(at(2023, 7, 8, 13, 37)).await.unwrap();
        assert_eq!(july.start_date, at(2023, 7, 1, 0, 0));
        assert_eq!(
            july.end_date,
            NaiveDate::from_ymd_opt(2023, 7, 31)
                .unwrap()
                .and_hms_nano_opt(23, 59, 59, 999_999_999)
                .unwrap()
        );

        let again = store.ensure_season(at(2023, 7, 31, 23, 59)).await.unwrap();
        assert_eq!(again.id, july.id);
        let first_day = store.ensure_season(at(2023, 7, 1, 0, 0)).await.unwrap();
        assert_eq!(first_day.id, july.id);

        let august = store.ensure_season(at(2023, 8, 1, 0, 0)).await.unwrap();
        assert_ne!(august.id, july.id);
        assert_eq!(store.get_seasons().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn ensure_season_leap_february() {
        let store = store();
        let season = store.ensure_season(at(2024, 2, 29, 13, 37)).await.unwrap();
        assert_eq!(season.end_date.date(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let found = store.get_season_by_date(at(2024, 2, 29, 23, 59)).await.unwrap();
        assert_eq!(found.map(|s| s.id), Some(season.id));
        assert!(store.get_season_by_date(at(2024, 3, 1, 0, 0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ensure_game_is_idempotent() {
        let store = store();
        let date = at(2024, 5, 1, 13, 37);
        let season = store.ensure_season(date).await.unwrap();

        let a = store.ensure_game("chan", "guild", date, season.id).await.unwrap();
        let b = store.ensure_game("chan", "guild", date, season.id).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.get_games().await.unwrap().len(), 1);

        let other = store.ensure_game("other", "guild", date, season.id).await.unwrap();
        assert_ne!(other.id, a.id);
        assert_eq!(store.get_games_by_channel_id("chan").await.unwrap(), vec![a.clone()]);
        assert_eq!(store.get_games_by_guild_id("guild").await.unwrap().len(), 2);
        assert_eq!(store.get_game_by_id(a.id).await.unwrap(), a);
    }

    #[tokio::test]
    async fn games_by_date_only_returns_that_day() {
        let store = store();
        let season = store.ensure_season(at(2024, 5, 1, 0, 0)).await.unwrap();
        let today = store.ensure_game("c", "g", at(2024, 5, 2, 13, 37), season.id).await.unwrap();
        store.ensure_game("c", "g", at(2024, 5, 1, 13, 37), season.id).await.unwrap();
        store.ensure_game("c", "g", at(2024, 5, 3, 0, 0), season.id).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let games = store.get_games_by_date(day).await.unwrap();
        assert_eq!(games, vec![today]);
    }

    #[tokio::test]
    async fn ensure_player_is_unique_per_user() {
        let store = store();
        let a = store.ensure_player("42").await.unwrap();
        let b = store.ensure_player("42").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.get_player_by_user_id("42").await.unwrap(), a);
        assert_eq!(store.get_player_by_id(a.id).await.unwrap(), a);

        assert!(store.create_player("42").await.unwrap_err().is_unique_violation());
        store.create_player("43").await.unwrap();
        assert_eq!(store.get_players().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_score_rejects_duplicate_message() {
        let store = store();
        let date = at(2024, 5, 1, 13, 37);
        let season = store.ensure_season(date).await.unwrap();
        let game = store.ensure_game("c", "g", date, season.id).await.unwrap();
        let player = store.ensure_player("1").await.unwrap();

        let score = store.create_score("100", player.id, -250, game.id).await.unwrap();
        assert_eq!(score.score, -250);
        assert_eq!(score.message_id, "100");
        assert_eq!(score.game_id, game.id);
        assert_eq!(score.player_id, player.id);

        let err = store.create_score("100", player.id, 10, game.id).await.unwrap_err();
        assert!(err.is_unique_violation());

        assert_eq!(store.get_scores_for_game(&game).await.unwrap(), vec![score.clone()]);
        assert_eq!(store.get_score_by_id(score.id).await.unwrap(), score);
        assert_eq!(store.get_scores().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn season_highscore_is_best_non_negative_score() {
        let store = store();
        let season = store.ensure_season(at(2024, 5, 1, 0, 0)).await.unwrap();
        let day1 = store.ensure_game("c", "g", at(2024, 5, 1, 13, 37), season.id).await.unwrap();
        let day2 = store.ensure_game("c", "g", at(2024, 5, 2, 13, 37), season.id).await.unwrap();
        let alice = store.ensure_player("alice").await.unwrap();
        let bob = store.ensure_player("bob").await.unwrap();

        assert!(store.season_highscore(season.id).await.unwrap().is_none());

        store.create_score("1", alice.id, -3, day1.id).await.unwrap();
        store.create_score("2", alice.id, 120, day1.id).await.unwrap();
        let best = store.create_score("3", bob.id, 15, day2.id).await.unwrap();

        let (score, game, player) = store.season_highscore(season.id).await.unwrap().unwrap();
        assert_eq!(score, best);
        assert_eq!(game, day2);
        assert_eq!(player, bob);
    }

    #[tokio::test]
    async fn highscores_are_unique_per_score() {
        let store = store();
        let date = at(2024, 5, 1, 13, 37);
        let season = store.ensure_season(date).await.unwrap();
        let game = store.ensure_game("c", "g", date, season.id).await.unwrap();
        let player = store.ensure_player("1").await.unwrap();
        let score = store.create_score("1", player.id, 7, game.id).await.unwrap();

        let a = store.ensure_highscore(player.id, score.id, season.id).await.unwrap();
        let b = store.ensure_highscore(player.id, score.id, season.id).await.unwrap();
        assert_eq!(a, b);
        let err = store.create_highscore(player.id, score.id, season.id).await.unwrap_err();
        assert!(err.is_unique_violation());

        assert_eq!(store.get_highscores().await.unwrap(), vec![a.clone()]);
        assert_eq!(store.get_highscore_by_id(a.id).await.unwrap(), a);
        let found = store.get_highscore_by_player_and_season(player.id, season.id).await.unwrap();
        assert_eq!(found, Some(a));
        let other = store.get_highscore_by_player_and_season(player.id, season.id + 1).await;
        assert!(other.unwrap().is_none());
    }
}
