use async_trait::async_trait;

use crate::{
    domain::{ChatId, UserId},
    messaging::types::{MembershipStatus, PhotoSource},
    Result,
};

/// Outbound capabilities the bot needs from a chat platform.
///
/// Every call returns a `Result`; callers decide explicitly whether a failure
/// becomes a user-facing reply, a log line or a failure count.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Send Telegram-flavoured HTML (`parse_mode = HTML`).
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: &PhotoSource,
        caption: Option<&str>,
    ) -> Result<()>;

    /// Membership of `user_id` in the channel identified by `channel_id`.
    async fn membership_status(&self, channel_id: &str, user_id: UserId)
        -> Result<MembershipStatus>;
}
