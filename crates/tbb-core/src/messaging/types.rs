use std::path::{Path, PathBuf};

use url::Url;

use crate::domain::{ChatId, UserId};

/// Inbound message model, independent of the chat platform.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub text: Option<String>,
}

/// Who asked, and where the answer goes.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
}

impl From<&InboundMessage> for RequestContext {
    fn from(m: &InboundMessage) -> Self {
        Self {
            chat_id: m.chat_id,
            user_id: m.user_id,
            username: m.username.clone(),
        }
    }
}

/// Channel membership as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MembershipStatus {
    pub fn is_subscribed(self) -> bool {
        matches!(self, Self::Creator | Self::Administrator | Self::Member)
    }
}

/// Where a photo comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhotoSource {
    Url(Url),
    /// Local file, read when the photo is sent.
    File(PathBuf),
}

impl PhotoSource {
    /// Interpret configured command content: an http(s) URL, otherwise a
    /// local path. A missing file surfaces as a send error.
    pub fn from_content(content: &str) -> Self {
        let c = content.trim();
        match parse_http_url(c) {
            Some(url) => Self::Url(url),
            None => Self::File(PathBuf::from(c)),
        }
    }

    /// Interpret operator-supplied broadcast media. Only URLs and readable
    /// local files qualify; anything else means "send text only".
    pub fn readable(media: &str) -> Option<Self> {
        let m = media.trim();
        if m.is_empty() {
            return None;
        }
        if let Some(url) = parse_http_url(m) {
            return Some(Self::Url(url));
        }
        let p = Path::new(m);
        if p.is_file() && std::fs::File::open(p).is_ok() {
            return Some(Self::File(p.to_path_buf()));
        }
        None
    }
}

fn parse_http_url(s: &str) -> Option<Url> {
    let url = Url::parse(s).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
