/*!
 * Actual discord client
 */

use std::sync::Arc;

use serenity::{
    async_trait,
    client::{Context, EventHandler},
    model::prelude::{Message, Ready},
};
use tracing::{info, instrument};

use crate::{extensions::MessageExt, leet::LeetOClock};

pub struct Bot {
    pub leet: Arc<LeetOClock>,
}

#[async_trait]
impl EventHandler for Bot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Connected as {} to {} guild(s)", ready.user.name, ready.guilds.len());
    }

    #[instrument(skip_all, fields(message_id = %msg.id, channel_id = %msg.channel_id))]
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }

        if let Some(submission) = msg.submission() {
            self.leet.handle_submission(&submission).await;
        }
    }
}
