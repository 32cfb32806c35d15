use std::sync::Arc;

use tracing::info;

use crate::{
    errors::Error,
    model::{normalize_command_name, validate_channel_id, ChannelDef, CommandDef},
    store::ConfigStore,
    Result,
};

/// The live command and channel tables.
///
/// There is no separate handler binding: the router reads this table on every
/// inbound message, so a command registered while the bot is running answers
/// on the very next update.
#[derive(Clone)]
pub struct CommandRegistry {
    store: Arc<ConfigStore>,
}

impl CommandRegistry {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    /// Validate, insert (or overwrite) and persist a custom command.
    ///
    /// Returns the normalized command name.
    pub fn register(&self, name: &str, def: CommandDef) -> Result<String> {
        let name = normalize_command_name(name)?;
        def.validate()?;
        let def = CommandDef {
            action: def.action,
            content: def.content.trim().to_string(),
        };

        let replaced = self.store.mutate(|cfg| Ok(cfg.commands.insert(name.clone(), def)))?;
        info!(command = %name, replaced = replaced.is_some(), "command registered");
        Ok(name)
    }

    pub fn lookup(&self, name: &str) -> Option<CommandDef> {
        self.store.get().commands.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.store.get().commands.keys().cloned().collect()
    }

    /// Add (or replace) a required channel.
    pub fn add_channel(&self, name: &str, id: &str, username: Option<&str>) -> Result<ChannelDef> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("channel name cannot be empty".to_string()));
        }
        let id = validate_channel_id(id)?;
        let username = username
            .map(|u| u.trim().trim_start_matches('@').to_string())
            .filter(|u| !u.is_empty());

        let def = ChannelDef {
            name: name.to_string(),
            id: id.clone(),
            username,
        };
        let stored = def.clone();
        self.store.mutate(move |cfg| {
            cfg.channels.insert(id, stored);
            Ok(())
        })?;
        info!(channel = %def.id, name = %def.name, "channel registered");
        Ok(def)
    }
}
