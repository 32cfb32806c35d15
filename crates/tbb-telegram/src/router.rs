use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use teloxide::{dispatching::ShutdownToken, dptree, prelude::*};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tbb_core::{
    errors::Error,
    lifecycle::{BotLauncher, PollingHandle},
    messaging::{
        port::ChatClient,
        throttled::{ThrottleConfig, ThrottledClient},
    },
    router::UpdateRouter,
    store::ConfigStore,
    Result,
};

use crate::{handlers, TelegramClient};

/// Starts a long-polling teloxide dispatcher per launch.
#[derive(Clone, Debug, Default)]
pub struct TelegramLauncher {
    /// `None` disables outbound throttling.
    throttle: Option<ThrottleConfig>,
}

impl TelegramLauncher {
    pub fn new(throttle: Option<ThrottleConfig>) -> Self {
        Self { throttle }
    }
}

#[async_trait]
impl BotLauncher for TelegramLauncher {
    async fn launch(
        &self,
        token: &str,
        store: Arc<ConfigStore>,
    ) -> Result<Box<dyn PollingHandle>> {
        let polling = start_polling(token, store, self.throttle)
            .await
            .map_err(|e| Error::External(format!("telegram bot failed to start: {e:#}")))?;
        Ok(Box::new(polling))
    }
}

pub struct TelegramPolling {
    client: Arc<dyn ChatClient>,
    shutdown: ShutdownToken,
    task: JoinHandle<()>,
}

#[async_trait]
impl PollingHandle for TelegramPolling {
    fn client(&self) -> Arc<dyn ChatClient> {
        self.client.clone()
    }

    async fn stop(self: Box<Self>) {
        let TelegramPolling { shutdown, task, .. } = *self;
        match shutdown.shutdown() {
            Ok(done) => {
                done.await;
                if let Err(e) = task.await {
                    warn!(error = %e, "polling task ended abnormally");
                }
            }
            // The dispatcher never got going; nothing to drain.
            Err(_) => task.abort(),
        };
    }
}

pub async fn start_polling(
    token: &str,
    store: Arc<ConfigStore>,
    throttle: Option<ThrottleConfig>,
) -> anyhow::Result<TelegramPolling> {
    // Client timeout must exceed the long-polling timeout so requests are not
    // cut off before Telegram answers.
    let http = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(45))
        .build()?;
    let bot = Bot::with_client(token, http);

    let me = bot.get_me().await?;
    info!(username = %me.username(), "telegram bot connected");

    let raw_client: Arc<dyn ChatClient> = Arc::new(TelegramClient::new(bot.clone()));
    let client: Arc<dyn ChatClient> = match throttle {
        Some(cfg) => Arc::new(ThrottledClient::new(raw_client, cfg)),
        None => raw_client,
    };

    let router = Arc::new(
        UpdateRouter::new(store, client.clone()).with_bot_username(me.username()),
    );

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        .default_handler(|_| async {})
        .build();
    let shutdown = dispatcher.shutdown_token();

    let task = tokio::spawn(async move {
        info!("polling started");
        dispatcher.dispatch().await;
        info!("polling stopped");
    });

    Ok(TelegramPolling {
        client,
        shutdown,
        task,
    })
}
