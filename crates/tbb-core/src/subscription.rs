use std::sync::Arc;

use tracing::warn;

use crate::{
    domain::UserId,
    formatting::{escape_html, html_link},
    messaging::port::ChatClient,
    store::ConfigStore,
};

pub const SUBSCRIBED_REPLY: &str = "✅ You are subscribed to all required channels!";
pub const MISSING_HEADER: &str = "❌ To use this bot, please subscribe to these channels:";

/// A channel the user still has to join.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
    pub link: Option<String>,
}

impl ChannelRef {
    pub fn to_html(&self) -> String {
        match &self.link {
            Some(href) => html_link(&self.name, href),
            None => escape_html(&self.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Satisfied,
    Missing(Vec<ChannelRef>),
}

impl SubscriptionStatus {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    /// Reply body in Telegram HTML.
    pub fn to_html(&self) -> String {
        match self {
            Self::Satisfied => escape_html(SUBSCRIBED_REPLY),
            Self::Missing(channels) => {
                let mut out = escape_html(MISSING_HEADER);
                for ch in channels {
                    out.push('\n');
                    out.push_str(&ch.to_html());
                }
                out
            }
        }
    }
}

/// Checks a user against every required channel.
///
/// Default-deny: a failed lookup counts the channel as missing and never
/// short-circuits the remaining channels.
pub struct SubscriptionChecker {
    store: Arc<ConfigStore>,
    client: Arc<dyn ChatClient>,
}

impl SubscriptionChecker {
    pub fn new(store: Arc<ConfigStore>, client: Arc<dyn ChatClient>) -> Self {
        Self { store, client }
    }

    pub async fn check(&self, user_id: UserId) -> SubscriptionStatus {
        let channels = self.store.get().channels.clone();
        let mut missing = Vec::new();

        for (channel_id, def) in &channels {
            let subscribed = match self.client.membership_status(channel_id, user_id).await {
                Ok(status) => status.is_subscribed(),
                Err(e) => {
                    warn!(
                        user_id = user_id.0,
                        channel = %channel_id,
                        error = %e,
                        "membership check failed"
                    );
                    false
                }
            };
            if !subscribed {
                missing.push(ChannelRef {
                    id: channel_id.clone(),
                    name: def.name.clone(),
                    link: def.public_link(),
                });
            }
        }

        if missing.is_empty() {
            SubscriptionStatus::Satisfied
        } else {
            SubscriptionStatus::Missing(missing)
        }
    }
}
