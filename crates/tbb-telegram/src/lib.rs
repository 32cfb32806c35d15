//! Telegram adapter (teloxide).
//!
//! Implements the `tbb-core` chat-client and launcher ports over the Telegram
//! Bot API.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ChatMemberStatus, InputFile, ParseMode, Recipient},
    RequestError,
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use tbb_core::{
    domain::{ChatId, UserId},
    errors::Error,
    messaging::{
        port::ChatClient,
        types::{MembershipStatus, PhotoSource},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(wait)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(wait.duration()).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

/// Channels are addressed by numeric id (`-100...`) or by `@username`.
fn channel_recipient(channel_id: &str) -> Recipient {
    match channel_id.trim().parse::<i64>() {
        Ok(id) => Recipient::Id(teloxide::types::ChatId(id)),
        Err(_) => Recipient::ChannelUsername(channel_id.trim().to_string()),
    }
}

fn membership_from(status: ChatMemberStatus) -> MembershipStatus {
    match status {
        ChatMemberStatus::Owner => MembershipStatus::Creator,
        ChatMemberStatus::Administrator => MembershipStatus::Administrator,
        ChatMemberStatus::Member => MembershipStatus::Member,
        ChatMemberStatus::Restricted => MembershipStatus::Restricted,
        ChatMemberStatus::Left => MembershipStatus::Left,
        ChatMemberStatus::Banned => MembershipStatus::Kicked,
    }
}

fn input_file(photo: &PhotoSource) -> InputFile {
    match photo {
        PhotoSource::Url(url) => InputFile::url(url.clone()),
        PhotoSource::File(path) => InputFile::file(path.clone()),
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(())
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(chat_id), html.to_string())
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: &PhotoSource,
        caption: Option<&str>,
    ) -> Result<()> {
        if let PhotoSource::File(path) = photo {
            if !path.is_file() {
                return Err(Error::External(format!(
                    "photo file not found: {}",
                    path.display()
                )));
            }
        }

        self.with_retry(|| {
            let req = self.bot.send_photo(Self::tg_chat(chat_id), input_file(photo));
            match caption {
                Some(c) => req.caption(c.to_string()),
                None => req,
            }
        })
        .await?;
        Ok(())
    }

    async fn membership_status(
        &self,
        channel_id: &str,
        user_id: UserId,
    ) -> Result<MembershipStatus> {
        let user = teloxide::types::UserId(
            u64::try_from(user_id.0)
                .map_err(|_| Error::External(format!("invalid user id {}", user_id.0)))?,
        );
        let member = self
            .with_retry(|| self.bot.get_chat_member(channel_recipient(channel_id), user))
            .await?;
        Ok(membership_from(member.status()))
    }
}
