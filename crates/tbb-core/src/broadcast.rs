use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    domain::ChatId,
    messaging::{port::ChatClient, types::PhotoSource},
    store::ConfigStore,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Best-effort fan-out to every known subscriber.
pub struct Broadcaster {
    store: Arc<ConfigStore>,
    client: Arc<dyn ChatClient>,
}

impl Broadcaster {
    pub fn new(store: Arc<ConfigStore>, client: Arc<dyn ChatClient>) -> Self {
        Self { store, client }
    }

    /// Send `message` (as a photo caption when `media` is readable) to each
    /// subscriber in the current snapshot. One failed send never stops the
    /// rest.
    pub async fn broadcast(&self, message: &str, media: Option<&str>) -> BroadcastReport {
        let subscribers = self.store.get().subscribers.clone();
        let mut report = BroadcastReport::default();
        if subscribers.is_empty() {
            return report;
        }

        let photo = media.and_then(PhotoSource::readable);
        if media.is_some_and(|m| !m.trim().is_empty()) && photo.is_none() {
            warn!(media = ?media, "broadcast media is not readable, sending text only");
        }

        info!(recipients = subscribers.len(), with_photo = photo.is_some(), "broadcast started");

        for user_id in subscribers {
            let chat_id = ChatId::from(user_id);
            let sent = match &photo {
                Some(p) => self.client.send_photo(chat_id, p, Some(message)).await,
                None => self.client.send_text(chat_id, message).await,
            };
            match sent {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(user_id = user_id.0, error = %e, "broadcast send failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            delivered = report.delivered,
            failed = report.failed,
            "broadcast finished"
        );
        report
    }
}
