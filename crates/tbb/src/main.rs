use std::{io, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tbb_core::{config::Settings, lifecycle::BotLifecycle, store::ConfigStore};
use tbb_telegram::router::TelegramLauncher;

mod console;

use console::Console;

#[tokio::main]
async fn main() -> Result<(), tbb_core::Error> {
    tbb_core::logging::init("tbb")?;

    let settings = Settings::load();
    let store = Arc::new(ConfigStore::open(settings.config_file.clone()));
    let launcher = Arc::new(TelegramLauncher::new(
        settings.throttle_enabled.then_some(settings.throttle),
    ));
    let lifecycle = Arc::new(BotLifecycle::new(store.clone(), launcher));

    println!("Telegram bot builder (config: {})", store.path().display());
    if !store.get().is_configured() {
        println!("{}", console::setup_instructions(&store));
    } else if settings.autostart {
        if let Err(e) = lifecycle.start().await {
            println!("Bot did not start: {e}");
        }
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let console = {
        let store = store.clone();
        let lifecycle = lifecycle.clone();
        let runtime = tokio::runtime::Handle::current();
        let shutdown = shutdown.clone();
        move || {
            let stdin = io::stdin();
            let console = Console::new(
                stdin.lock(),
                io::stdout(),
                store,
                lifecycle,
                runtime,
                shutdown,
            );
            if let Err(e) = console.run() {
                error!(error = %e, "console failed");
            }
        }
    };
    // Not joined: a thread parked in `read_line` must not hold up exit.
    let _ = std::thread::Builder::new()
        .name("tbb-console".to_string())
        .spawn(console)?;

    shutdown.cancelled().await;
    lifecycle.stop().await;
    info!("shutdown complete");
    Ok(())
}

async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}
