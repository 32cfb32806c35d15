//! The persisted configuration document and its validation rules.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::OnceLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{domain::UserId, errors::Error, Result};

pub const TOKEN_PLACEHOLDER: &str = "YOUR_BOT_TOKEN";
pub const ADMIN_PLACEHOLDER: &str = "YOUR_TELEGRAM_ID";

/// Defaults written by earlier, Russian-language releases of the bot. Files
/// carrying them are still unconfigured.
pub const LEGACY_TOKEN_PLACEHOLDER: &str = "ВАШ_ТОКЕН_БОТА";
pub const LEGACY_ADMIN_PLACEHOLDER: &str = "ВАШ_TELEGRAM_ID";

/// Commands handled by the bot itself; custom commands cannot shadow them.
pub const BUILTIN_COMMANDS: [&str; 3] = ["start", "help", "check"];

/// What a custom command does when invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    Text,
    Photo,
    Check,
}

impl CommandAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "photo" => Some(Self::Photo),
            "check" => Some(Self::Check),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Check => "check",
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDef {
    pub action: CommandAction,
    #[serde(default)]
    pub content: String,
}

impl CommandDef {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            action: CommandAction::Text,
            content: content.into(),
        }
    }

    pub fn photo(content: impl Into<String>) -> Self {
        Self {
            action: CommandAction::Photo,
            content: content.into(),
        }
    }

    pub fn check() -> Self {
        Self {
            action: CommandAction::Check,
            content: String::new(),
        }
    }

    /// `content` may only be empty for `check`.
    pub fn validate(&self) -> Result<()> {
        if self.action != CommandAction::Check && self.content.trim().is_empty() {
            return Err(Error::Validation(format!(
                "content is required for '{}' commands",
                self.action
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDef {
    pub name: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl ChannelDef {
    /// Public `t.me` link, when the channel has a username.
    pub fn public_link(&self) -> Option<String> {
        let username = self.username.as_deref()?.trim().trim_start_matches('@');
        if username.is_empty() {
            return None;
        }
        Some(format!("https://t.me/{username}"))
    }
}

/// The whole on-disk document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_token")]
    pub token: String,
    #[serde(default = "default_admin_id")]
    pub admin_id: String,
    #[serde(default)]
    pub commands: BTreeMap<String, CommandDef>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelDef>,
    #[serde(default)]
    pub subscribers: BTreeSet<UserId>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            token: default_token(),
            admin_id: default_admin_id(),
            commands: BTreeMap::new(),
            channels: BTreeMap::new(),
            subscribers: BTreeSet::new(),
        }
    }
}

impl Configuration {
    pub fn has_token(&self) -> bool {
        let t = self.token.trim();
        !t.is_empty() && t != TOKEN_PLACEHOLDER && t != LEGACY_TOKEN_PLACEHOLDER
    }

    pub fn has_admin(&self) -> bool {
        let a = self.admin_id.trim();
        !a.is_empty() && a != ADMIN_PLACEHOLDER && a != LEGACY_ADMIN_PLACEHOLDER
    }

    /// Both the token and the admin id have been filled in.
    pub fn is_configured(&self) -> bool {
        self.has_token() && self.has_admin()
    }
}

fn default_token() -> String {
    TOKEN_PLACEHOLDER.to_string()
}

fn default_admin_id() -> String {
    ADMIN_PLACEHOLDER.to_string()
}

/// Normalize and validate a command name as typed by the operator.
///
/// Accepts an optional leading `/`; returns the lowercase name.
pub fn normalize_command_name(raw: &str) -> Result<String> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9_]{1,32}$").expect("valid regex"));

    let name = raw.trim().trim_start_matches('/').to_lowercase();
    if name.is_empty() {
        return Err(Error::Validation("command name cannot be empty".to_string()));
    }
    if !re.is_match(&name) {
        return Err(Error::Validation(format!(
            "command name '{name}' must be 1-32 characters of a-z, 0-9 or _"
        )));
    }
    if BUILTIN_COMMANDS.contains(&name.as_str()) {
        return Err(Error::Validation(format!(
            "/{name} is a built-in command and cannot be redefined"
        )));
    }
    Ok(name)
}

/// Channel ids are numeric strings prefixed with `-100`.
pub fn validate_channel_id(raw: &str) -> Result<String> {
    static CHANNEL_RE: OnceLock<Regex> = OnceLock::new();
    let re = CHANNEL_RE.get_or_init(|| Regex::new(r"^-100\d+$").expect("valid regex"));

    let id = raw.trim();
    if !re.is_match(id) {
        return Err(Error::Validation(format!(
            "channel id '{id}' must be numeric and start with -100"
        )));
    }
    Ok(id.to_string())
}
