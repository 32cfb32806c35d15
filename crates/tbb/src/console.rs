//! Line-oriented operator console.
//!
//! Runs on its own OS thread so a blocked `read_line` never stalls the bot;
//! async work (start, broadcast) is driven through the runtime handle.

use std::{
    io::{BufRead, Write},
    sync::Arc,
};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tbb_core::{
    formatting::truncate_text,
    lifecycle::{BotLifecycle, Phase},
    model::{normalize_command_name, validate_channel_id, CommandAction, CommandDef, Configuration},
    registry::CommandRegistry,
    store::ConfigStore,
    Error, Result,
};

const CONTENT_PREVIEW_CHARS: usize = 30;

const MENU: &str = "\
=== Bot control panel ===
1. Add command
2. Add channel
3. Broadcast
4. Show configuration
5. Start / restart bot
6. Exit";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct Console<R, W> {
    input: R,
    output: W,
    store: Arc<ConfigStore>,
    registry: CommandRegistry,
    lifecycle: Arc<BotLifecycle>,
    runtime: Handle,
    shutdown: CancellationToken,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(
        input: R,
        output: W,
        store: Arc<ConfigStore>,
        lifecycle: Arc<BotLifecycle>,
        runtime: Handle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            input,
            output,
            registry: CommandRegistry::new(store.clone()),
            store,
            lifecycle,
            runtime,
            shutdown,
        }
    }

    /// Serve menu actions until the operator exits, input ends or shutdown
    /// is requested elsewhere. Always cancels the shutdown token on return.
    pub fn run(mut self) -> Result<()> {
        let res = self.serve();
        self.shutdown.cancel();
        res
    }

    fn serve(&mut self) -> Result<()> {
        while !self.shutdown.is_cancelled() {
            writeln!(self.output, "\n{MENU}")?;
            let Some(choice) = self.prompt("Choose an action: ")? else {
                info!("console input closed");
                return Ok(());
            };

            let flow = match choice.as_str() {
                "1" => self.add_command()?,
                "2" => self.add_channel()?,
                "3" => self.broadcast()?,
                "4" => self.show_config()?,
                "5" => self.start_bot()?,
                "6" => Flow::Exit,
                other => {
                    writeln!(self.output, "Unknown action '{other}'. Pick 1-6.")?;
                    Flow::Continue
                }
            };
            if flow == Flow::Exit {
                writeln!(self.output, "Shutting down...")?;
                return Ok(());
            }
        }
        Ok(())
    }

    fn add_command(&mut self) -> Result<Flow> {
        let Some(name) = self.prompt_valid("Command name (without /): ", normalize_command_name)?
        else {
            return Ok(Flow::Exit);
        };
        let Some(action) = self.prompt_valid("Action (text/photo/check): ", |s| {
            CommandAction::parse(s).ok_or_else(|| {
                Error::Validation("action must be text, photo or check".to_string())
            })
        })?
        else {
            return Ok(Flow::Exit);
        };

        let def = match action {
            CommandAction::Check => CommandDef::check(),
            CommandAction::Text | CommandAction::Photo => {
                let label = if action == CommandAction::Photo {
                    "Photo URL or file path: "
                } else {
                    "Reply text: "
                };
                let Some(content) = self.prompt_required(label)? else {
                    return Ok(Flow::Exit);
                };
                CommandDef {
                    action,
                    content,
                }
            }
        };

        match self.registry.register(&name, def) {
            Ok(name) => writeln!(self.output, "Command /{name} saved.")?,
            Err(e) => writeln!(self.output, "Could not save command: {e}")?,
        }
        Ok(Flow::Continue)
    }

    fn add_channel(&mut self) -> Result<Flow> {
        let Some(name) = self.prompt_required("Channel name: ")? else {
            return Ok(Flow::Exit);
        };
        let Some(id) = self.prompt_valid("Channel id (starts with -100): ", validate_channel_id)?
        else {
            return Ok(Flow::Exit);
        };
        let Some(username) = self.prompt("Public username (optional, without @): ")? else {
            return Ok(Flow::Exit);
        };

        let username = Some(username.as_str()).filter(|u| !u.is_empty());
        match self.registry.add_channel(&name, &id, username) {
            Ok(ch) => writeln!(self.output, "Channel {} ({}) saved.", ch.name, ch.id)?,
            Err(e) => writeln!(self.output, "Could not save channel: {e}")?,
        }
        Ok(Flow::Continue)
    }

    fn broadcast(&mut self) -> Result<Flow> {
        let count = self.store.get().subscribers.len();
        if count == 0 {
            writeln!(self.output, "No subscribers yet, nothing to send.")?;
            return Ok(Flow::Continue);
        }
        let Some(broadcaster) = self.runtime.block_on(self.lifecycle.broadcaster()) else {
            writeln!(self.output, "The bot is not running. Start it first (action 5).")?;
            return Ok(Flow::Continue);
        };

        let Some(message) = self.prompt_required("Message: ")? else {
            return Ok(Flow::Exit);
        };
        let Some(media) = self.prompt("Photo path or URL (optional): ")? else {
            return Ok(Flow::Exit);
        };
        let media = Some(media.as_str()).filter(|m| !m.is_empty());

        writeln!(self.output, "Sending to {count} subscriber(s)...")?;
        let report = self.runtime.block_on(broadcaster.broadcast(&message, media));
        writeln!(
            self.output,
            "Broadcast finished: {} delivered, {} failed.",
            report.delivered, report.failed
        )?;
        Ok(Flow::Continue)
    }

    fn show_config(&mut self) -> Result<Flow> {
        let cfg = self.store.get();
        let phase = self.lifecycle.phase();
        let text = render_config(&cfg, phase);
        writeln!(self.output, "{text}")?;
        Ok(Flow::Continue)
    }

    fn start_bot(&mut self) -> Result<Flow> {
        let restarting = self.lifecycle.phase() == Phase::Running;
        writeln!(
            self.output,
            "{}",
            if restarting { "Restarting bot..." } else { "Starting bot..." }
        )?;
        match self.runtime.block_on(self.lifecycle.start()) {
            Ok(()) => writeln!(self.output, "Bot is running.")?,
            Err(e) => {
                warn!(error = %e, "start requested from console failed");
                writeln!(self.output, "Could not start the bot: {e}")?;
            }
        }
        Ok(Flow::Continue)
    }

    /// One trimmed line. `None` on end of input.
    fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn prompt_required(&mut self, label: &str) -> Result<Option<String>> {
        loop {
            match self.prompt(label)? {
                Some(v) if v.is_empty() => writeln!(self.output, "This field cannot be empty.")?,
                other => return Ok(other),
            }
        }
    }

    /// Re-prompt until `parse` accepts the input.
    fn prompt_valid<T>(
        &mut self,
        label: &str,
        parse: impl Fn(&str) -> Result<T>,
    ) -> Result<Option<T>> {
        loop {
            let Some(raw) = self.prompt_required(label)? else {
                return Ok(None);
            };
            match parse(&raw) {
                Ok(v) => return Ok(Some(v)),
                Err(e) => writeln!(self.output, "{e}")?,
            }
        }
    }
}

fn render_config(cfg: &Configuration, phase: Phase) -> String {
    let mut out = String::from("=== Configuration ===\n");
    out.push_str(&format!("Token: {}\n", mask_token(cfg)));
    out.push_str(&format!("Admin ID: {}\n", cfg.admin_id));
    out.push_str(&format!("Bot: {phase}\n"));

    out.push_str(&format!("Commands ({}):\n", cfg.commands.len()));
    for (name, def) in &cfg.commands {
        out.push_str(&format!(
            "  /{name} [{}] {}\n",
            def.action,
            truncate_text(&def.content, CONTENT_PREVIEW_CHARS)
        ));
    }

    out.push_str(&format!("Channels ({}):\n", cfg.channels.len()));
    for ch in cfg.channels.values() {
        match ch.public_link() {
            Some(link) => out.push_str(&format!("  {} ({}) {link}\n", ch.name, ch.id)),
            None => out.push_str(&format!("  {} ({})\n", ch.name, ch.id)),
        }
    }

    out.push_str(&format!("Subscribers: {}", cfg.subscribers.len()));
    out
}

/// Keep the bot id part of `123456:secret`, hide the secret.
fn mask_token(cfg: &Configuration) -> String {
    if !cfg.has_token() {
        return "(not set)".to_string();
    }
    match cfg.token.split_once(':') {
        Some((bot_id, _)) => format!("{bot_id}:****"),
        None => "****".to_string(),
    }
}

/// Printed at startup when the token or admin id still hold placeholders.
pub fn setup_instructions(store: &ConfigStore) -> String {
    format!(
        "\
The bot is not configured yet.
  1. Create a bot with @BotFather and copy its token.
  2. Get your numeric Telegram id from @userinfobot.
  3. Put both into \"token\" and \"admin_id\" in {}.
  4. Start the bot with action 5.",
        store.path().display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tbb_core::{
        domain::{ChatId, UserId},
        testing::{tmp_path, FakeLauncher},
    };

    struct Harness {
        rt: tokio::runtime::Runtime,
        store: Arc<ConfigStore>,
        launcher: Arc<FakeLauncher>,
        lifecycle: Arc<BotLifecycle>,
    }

    fn harness(token: Option<&str>) -> Harness {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let store = Arc::new(ConfigStore::open(tmp_path("tbb-console")));
        if let Some(t) = token {
            store
                .mutate(|cfg| {
                    cfg.token = t.to_string();
                    cfg.admin_id = "42".to_string();
                    Ok(())
                })
                .unwrap();
        }
        let launcher = Arc::new(FakeLauncher::default());
        let lifecycle = Arc::new(BotLifecycle::new(store.clone(), launcher.clone()));
        Harness {
            rt,
            store,
            launcher,
            lifecycle,
        }
    }

    impl Harness {
        fn run(&self, script: &str) -> (String, CancellationToken) {
            let token = CancellationToken::new();
            let mut out = Vec::new();
            Console::new(
                script.as_bytes(),
                &mut out,
                self.store.clone(),
                self.lifecycle.clone(),
                self.rt.handle().clone(),
                token.clone(),
            )
            .run()
            .unwrap();
            (String::from_utf8(out).unwrap(), token)
        }
    }

    #[test]
    fn adds_a_text_command() {
        let h = harness(None);
        let (out, token) = h.run("1\n/Promo\ntext\nСкидка 20%\n6\n");
        assert!(out.contains("Command /promo saved."));
        assert!(token.is_cancelled());
        let def = h.store.get().commands.get("promo").cloned().unwrap();
        assert_eq!(def, CommandDef::text("Скидка 20%"));
    }

    #[test]
    fn check_command_needs_no_content() {
        let h = harness(None);
        h.run("1\ngate\ncheck\n6\n");
        assert_eq!(
            h.store.get().commands.get("gate"),
            Some(&CommandDef::check())
        );
    }

    #[test]
    fn invalid_input_reprompts_without_saving() {
        let h = harness(None);
        let (out, _) = h.run("1\nhelp\n\nbad name\nok\nvideo\ntext\n\nhi\n6\n");
        assert!(out.contains("built-in"));
        assert!(out.contains("cannot be empty"));
        assert!(out.contains("action must be"));
        let cfg = h.store.get();
        assert_eq!(cfg.commands.len(), 1);
        assert_eq!(cfg.commands["ok"].content, "hi");
    }

    #[test]
    fn adds_a_channel_after_bad_id() {
        let h = harness(None);
        let (out, _) = h.run("2\nNews\n12345\n-1001234567890\n@news\n6\n");
        assert!(out.contains("must be numeric and start with -100"));
        let ch = h.store.get().channels.get("-1001234567890").cloned().unwrap();
        assert_eq!(ch.name, "News");
        assert_eq!(ch.username.as_deref(), Some("news"));
    }

    #[test]
    fn broadcast_refused_without_subscribers_or_bot() {
        let h = harness(Some("123:secret"));
        let (out, _) = h.run("3\n6\n");
        assert!(out.contains("No subscribers yet"));

        h.store.add_subscriber(UserId(7)).unwrap();
        let (out, _) = h.run("3\n6\n");
        assert!(out.contains("not running"));
        assert_eq!(h.launcher.client.send_attempts(), 0);
    }

    #[test]
    fn start_then_broadcast_reports_counts() {
        let h = harness(Some("123:secret"));
        for id in [1, 2, 3] {
            h.store.add_subscriber(UserId(id)).unwrap();
        }
        h.launcher.client.fail_chat(ChatId(2));

        let (out, _) = h.run("5\n3\nHello all\n\n6\n");
        assert!(out.contains("Bot is running."));
        assert!(out.contains("Broadcast finished: 2 delivered, 1 failed."));
        assert_eq!(h.lifecycle.phase(), Phase::Running);
        assert_eq!(
            h.launcher.client.sent_texts(),
            vec!["Hello all".to_string(), "Hello all".to_string()]
        );
    }

    #[test]
    fn start_with_placeholder_token_is_reported() {
        let h = harness(None);
        let (out, _) = h.run("5\n6\n");
        assert!(out.contains("Could not start the bot"));
        assert_eq!(h.lifecycle.phase(), Phase::Stopped);
        assert_eq!(h.launcher.launch_count(), 0);
    }

    #[test]
    fn show_config_masks_token_and_truncates_content() {
        let h = harness(Some("123456:very-secret"));
        CommandRegistry::new(h.store.clone())
            .register("long", CommandDef::text("a".repeat(40)))
            .unwrap();
        let (out, _) = h.run("4\n6\n");
        assert!(out.contains("Token: 123456:****"));
        assert!(!out.contains("very-secret"));
        assert!(out.contains(&format!("/long [text] {}...", "a".repeat(30))));
        assert!(out.contains("Bot: stopped"));
        assert!(out.contains("Subscribers: 0"));
    }

    #[test]
    fn end_of_input_exits() {
        let h = harness(None);
        let (out, token) = h.run("4\n");
        assert!(out.contains("=== Configuration ==="));
        assert!(token.is_cancelled());
    }

    #[test]
    fn unknown_action_is_reported() {
        let h = harness(None);
        let (out, _) = h.run("9\n6\n");
        assert!(out.contains("Unknown action '9'"));
    }
}
