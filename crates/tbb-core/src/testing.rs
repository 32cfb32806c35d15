//! In-memory fakes for the messaging and lifecycle ports.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    lifecycle::{BotLauncher, PollingHandle},
    messaging::{
        port::ChatClient,
        types::{MembershipStatus, PhotoSource},
    },
    store::ConfigStore,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Text(ChatId, String),
    Html(ChatId, String),
    Photo(ChatId, PhotoSource, Option<String>),
}

/// Records every outbound call. Membership defaults to `Left`.
#[derive(Default)]
pub struct FakeChatClient {
    sent: Mutex<Vec<Sent>>,
    memberships: Mutex<HashMap<(String, UserId), MembershipStatus>>,
    failing_channels: Mutex<HashSet<String>>,
    failing_chats: Mutex<HashSet<ChatId>>,
    fail_photos: Mutex<bool>,
    sends: AtomicUsize,
}

impl FakeChatClient {
    pub fn set_membership(&self, channel_id: &str, user_id: UserId, status: MembershipStatus) {
        self.memberships
            .lock()
            .unwrap()
            .insert((channel_id.to_string(), user_id), status);
    }

    pub fn fail_channel(&self, channel_id: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel_id.to_string());
    }

    pub fn fail_chat(&self, chat_id: ChatId) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn fail_photos(&self) {
        *self.fail_photos.lock().unwrap() = true;
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Plain and HTML bodies, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(_, t) | Sent::Html(_, t) => Some(t),
                Sent::Photo(..) => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.sent_texts().pop()
    }

    /// Number of send attempts, including failed ones.
    pub fn send_attempts(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    fn attempt(&self, chat_id: ChatId) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(Error::External(format!("chat {} blocked the bot", chat_id.0)));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatClient for FakeChatClient {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.attempt(chat_id)?;
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Text(chat_id, text.to_string()));
        Ok(())
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.attempt(chat_id)?;
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Html(chat_id, html.to_string()));
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: &PhotoSource,
        caption: Option<&str>,
    ) -> Result<()> {
        self.attempt(chat_id)?;
        if *self.fail_photos.lock().unwrap() {
            return Err(Error::External("wrong file identifier".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Photo(
            chat_id,
            photo.clone(),
            caption.map(str::to_string),
        ));
        Ok(())
    }

    async fn membership_status(
        &self,
        channel_id: &str,
        user_id: UserId,
    ) -> Result<MembershipStatus> {
        if self.failing_channels.lock().unwrap().contains(channel_id) {
            return Err(Error::External("chat not found".to_string()));
        }
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .get(&(channel_id.to_string(), user_id))
            .copied()
            .unwrap_or(MembershipStatus::Left))
    }
}

/// Launcher that hands out a shared [`FakeChatClient`] and counts launches.
#[derive(Default)]
pub struct FakeLauncher {
    pub client: Arc<FakeChatClient>,
    pub launches: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
    pub reject_tokens: Mutex<HashSet<String>>,
}

impl FakeLauncher {
    pub fn reject_token(&self, token: &str) {
        self.reject_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotLauncher for FakeLauncher {
    async fn launch(&self, token: &str, _store: Arc<ConfigStore>) -> Result<Box<dyn PollingHandle>> {
        if self.reject_tokens.lock().unwrap().contains(token) {
            return Err(Error::External("Unauthorized".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHandle {
            client: self.client.clone(),
            stops: self.stops.clone(),
        }))
    }
}

struct FakeHandle {
    client: Arc<FakeChatClient>,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl PollingHandle for FakeHandle {
    fn client(&self) -> Arc<dyn ChatClient> {
        self.client.clone()
    }

    async fn stop(self: Box<Self>) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Unique scratch path under `/tmp`.
pub fn tmp_path(prefix: &str) -> PathBuf {
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    let pid = std::process::id();
    let seq = SEQ.fetch_add(1, Ordering::SeqCst);
    PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}-{seq}.json"))
}
