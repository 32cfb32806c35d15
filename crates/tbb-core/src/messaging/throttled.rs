use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, UserId},
    messaging::{
        port::ChatClient,
        types::{MembershipStatus, PhotoSource},
    },
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// ChatClient decorator that rate-limits outbound calls.
///
/// Broadcasts fan out to every subscriber back to back; this keeps the send
/// rate under Telegram's flood limits. It does not guarantee zero 429s.
pub struct ThrottledClient {
    inner: Arc<dyn ChatClient>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledClient {
    pub fn new(inner: Arc<dyn ChatClient>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        // A limiter whose next slot has passed behaves like a fresh one; drop
        // it unless another send still holds it.
        let now = Instant::now();
        map.retain(|_, lim| {
            Arc::strong_count(lim) > 1 || lim.try_lock().map_or(true, |l| l.next > now)
        });
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat_id: i64) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl ChatClient for ThrottledClient {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_text(chat_id, text).await
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: &PhotoSource,
        caption: Option<&str>,
    ) -> Result<()> {
        self.throttle_chat(chat_id.0).await;
        self.inner.send_photo(chat_id, photo, caption).await
    }

    async fn membership_status(
        &self,
        channel_id: &str,
        user_id: UserId,
    ) -> Result<MembershipStatus> {
        // Read-only lookup, not tied to the user's chat; global spacing only.
        self.throttle_global().await;
        self.inner.membership_status(channel_id, user_id).await
    }
}
