/*!
 * Pre-defined messages
 */

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use serenity::{http::Http, model::prelude::ChannelId};

use crate::error::Result;

/// The part of discord announcements are posted through
#[async_trait]
pub trait MessageApi: Send + Sync {
    async fn say(&self, channel: ChannelId, text: &str) -> Result<()>;
}

#[async_trait]
impl MessageApi for Http {
    async fn say(&self, channel: ChannelId, text: &str) -> Result<()> {
        channel.say(self, text).await?;
        Ok(())
    }
}

pub fn preparation_text<Tz: TimeZone>(target: &DateTime<Tz>) -> String {
    format!("## Leet o'Clock scheduled:\n<t:{}:R>", target.timestamp())
}

pub async fn preparation<Tz: TimeZone>(
    api: &dyn MessageApi,
    channel: ChannelId,
    target: &DateTime<Tz>,
) -> Result<()> {
    api.say(channel, &preparation_text(target)).await
}

pub async fn scoreboard(api: &dyn MessageApi, channel: ChannelId, board: &str) -> Result<()> {
    api.say(channel, board).await
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;

    /// Keeps every message instead of posting it
    #[derive(Default)]
    pub(crate) struct FakeChat {
        pub sent: Mutex<Vec<(ChannelId, String)>>,
    }

    impl FakeChat {
        pub fn sent_to(&self, channel: u64) -> Vec<String> {
            let sent = self.sent.lock().unwrap();
            sent.iter().filter(|(c, _)| c.get() == channel).map(|(_, text)| text.clone()).collect()
        }
    }

    #[async_trait]
    impl MessageApi for FakeChat {
        async fn say(&self, channel: ChannelId, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((channel, text.to_owned()));
            Ok(())
        }
    }

    #[test]
    fn preparation_shows_relative_target() {
        let target = Utc.with_ymd_and_hms(2024, 5, 1, 13, 37, 0).unwrap();
        let expected = format!("## Leet o'Clock scheduled:\n<t:{}:R>", target.timestamp());
        assert_eq!(preparation_text(&target), expected);
    }

    #[tokio::test]
    async fn preparation_goes_to_the_given_channel() {
        let chat = FakeChat::default();
        let target = Utc.with_ymd_and_hms(2024, 5, 1, 13, 37, 0).unwrap();
        preparation(&chat, ChannelId::new(5), &target).await.unwrap();
        assert_eq!(chat.sent_to(5), vec![preparation_text(&target)]);
    }
}
