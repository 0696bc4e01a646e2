diesel::table! {
    season (id) {
        id -> Integer,
        created_at -> Timestamp,
        start_date -> Timestamp,
        end_date -> Timestamp,
    }
}

diesel::table! {
    player (id) {
        id -> Integer,
        created_at -> Timestamp,
        user_id -> Text,
    }
}

diesel::table! {
    game (id) {
        id -> Integer,
        created_at -> Timestamp,
        channel_id -> Text,
        guild_id -> Text,
        game_date -> Timestamp,
        season_id -> Integer,
    }
}

diesel::table! {
    score (id) {
        id -> Integer,
        created_at -> Timestamp,
        game_id -> Integer,
        message_id -> Text,
        player_id -> Integer,
        #[sql_name = "score"]
        value -> BigInt,
    }
}

diesel::table! {
    highscore (id) {
        id -> Integer,
        created_at -> Timestamp,
        player_id -> Integer,
        score_id -> Integer,
        season_id -> Integer,
    }
}

diesel::joinable!(game -> season (season_id));
diesel::joinable!(score -> game (game_id));
diesel::joinable!(score -> player (player_id));
diesel::joinable!(highscore -> score (score_id));

diesel::allow_tables_to_appear_in_same_query!(season, player, game, score, highscore,);
