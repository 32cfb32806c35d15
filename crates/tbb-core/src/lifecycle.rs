//! Start/stop state machine for the polling bot.
//!
//! `Stopped -> Starting -> Running -> Stopped`. Starting while running is a
//! restart: the old poller is stopped before a fresh one is launched.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{error, info};

use crate::{
    broadcast::Broadcaster, errors::Error, messaging::port::ChatClient, store::ConfigStore,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Starting,
    Running,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Stopped => "stopped",
            Phase::Starting => "starting",
            Phase::Running => "running",
        })
    }
}

/// Builds a client for a token, binds the update router to it and starts
/// polling in the background.
#[async_trait]
pub trait BotLauncher: Send + Sync {
    async fn launch(&self, token: &str, store: Arc<ConfigStore>)
        -> Result<Box<dyn PollingHandle>>;
}

/// A running poller.
#[async_trait]
pub trait PollingHandle: Send + Sync {
    /// The outbound client bound to this poller's token.
    fn client(&self) -> Arc<dyn ChatClient>;

    /// Ask the poller to stop and wait for it. Handlers already running are
    /// allowed to finish.
    async fn stop(self: Box<Self>);
}

pub struct BotLifecycle {
    store: Arc<ConfigStore>,
    launcher: Arc<dyn BotLauncher>,
    phase: Mutex<Phase>,
    handle: tokio::sync::Mutex<Option<Box<dyn PollingHandle>>>,
}

impl BotLifecycle {
    pub fn new(store: Arc<ConfigStore>, launcher: Arc<dyn BotLauncher>) -> Self {
        Self {
            store,
            launcher,
            phase: Mutex::new(Phase::Stopped),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Start (or restart) polling with the token currently in the store.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.handle.lock().await;

        let cfg = self.store.get();
        if !cfg.has_token() {
            return Err(Error::Config(format!(
                "bot token is not configured; set \"token\" in {}",
                self.store.path().display()
            )));
        }

        if let Some(old) = slot.take() {
            info!("restarting bot");
            old.stop().await;
        }

        self.set_phase(Phase::Starting);
        match self.launcher.launch(&cfg.token, self.store.clone()).await {
            Ok(handle) => {
                *slot = Some(handle);
                self.set_phase(Phase::Running);
                info!("bot is running");
                Ok(())
            }
            Err(e) => {
                self.set_phase(Phase::Stopped);
                error!(error = %e, "bot failed to start");
                Err(e)
            }
        }
    }

    /// Stop polling if running. Idempotent.
    pub async fn stop(&self) {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.take() {
            handle.stop().await;
            info!("bot stopped");
        }
        self.set_phase(Phase::Stopped);
    }

    /// Live client, when running.
    pub async fn client(&self) -> Option<Arc<dyn ChatClient>> {
        self.handle.lock().await.as_ref().map(|h| h.client())
    }

    /// Broadcaster bound to the live client, when running.
    pub async fn broadcaster(&self) -> Option<Broadcaster> {
        let client = self.client().await?;
        Some(Broadcaster::new(self.store.clone(), client))
    }
}
