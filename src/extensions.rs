/*!
 * Extensions to some builtin or external types
 */

use chrono::{DateTime, Utc};
use serenity::model::prelude::Message;
use tracing::error;

use crate::leet::Submission;

/// Milliseconds between the unix epoch and the first second of 2015, where discord ids start
const DISCORD_EPOCH: u64 = 1_420_070_400_000;

/// Instant a discord snowflake was generated at, from the 42 high bits of the id. Falls back to
/// the unix epoch on ids that cannot map to a date.
pub fn snowflake_timestamp(id: u64) -> DateTime<Utc> {
    let millis = (id >> 22) + DISCORD_EPOCH;
    match i64::try_from(millis).ok().and_then(DateTime::from_timestamp_millis) {
        Some(timestamp) => timestamp,
        None => {
            error!("Cannot derive a timestamp from id {id}");
            DateTime::UNIX_EPOCH
        }
    }
}

pub trait MessageExt {
    /// The message as a game entry, for guild messages
    fn submission(&self) -> Option<Submission>;
}

impl MessageExt for Message {
    fn submission(&self) -> Option<Submission> {
        let guild_id = self.guild_id?;
        Some(Submission {
            author_id: self.author.id.to_string(),
            guild_id: guild_id.to_string(),
            channel_id: self.channel_id.to_string(),
            message_id: self.id.to_string(),
            timestamp: snowflake_timestamp(self.id.get()),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn decodes_snowflake_timestamp() {
        let at = snowflake_timestamp(175928847299117063);
        assert_eq!(at.timestamp_millis(), 1462015105796);
        let expected = Utc.with_ymd_and_hms(2016, 4, 30, 11, 18, 25).unwrap()
            + chrono::Duration::milliseconds(796);
        assert_eq!(at, expected);
    }

    #[test]
    fn smallest_snowflake_is_discord_epoch() {
        assert_eq!(snowflake_timestamp(0), Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap());
    }
}
