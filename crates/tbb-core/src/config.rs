use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::messaging::throttled::ThrottleConfig;

pub const DEFAULT_CONFIG_FILE: &str = "bot_config.json";

/// Process-level settings, resolved from the environment (and `.env`).
///
/// The bot's own data (token, commands, channels, subscribers) lives in the
/// JSON document managed by [`crate::store::ConfigStore`]; this struct only
/// says where that document is and how the runtime behaves.
#[derive(Clone, Debug)]
pub struct Settings {
    pub config_file: PathBuf,
    pub throttle_enabled: bool,
    pub throttle: ThrottleConfig,
    pub autostart: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            throttle_enabled: true,
            throttle: ThrottleConfig::default(),
            autostart: true,
        }
    }
}

impl Settings {
    pub fn load() -> Self {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_env()
    }

    fn from_env() -> Self {
        let defaults = Self::default();

        let config_file = env_path("TBB_CONFIG_FILE").unwrap_or(defaults.config_file);

        let global_min_interval = env_u64("TBB_GLOBAL_MIN_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.throttle.global_min_interval);
        let per_chat_min_interval = env_u64("TBB_PER_CHAT_MIN_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.throttle.per_chat_min_interval);

        Self {
            config_file,
            throttle_enabled: env_bool("TBB_THROTTLE_ENABLED").unwrap_or(defaults.throttle_enabled),
            throttle: ThrottleConfig {
                global_min_interval,
                per_chat_min_interval,
            },
            autostart: env_bool("TBB_AUTOSTART").unwrap_or(defaults.autostart),
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nTBB_CONFIG_FILE=\"/srv/bot.json\"\n\nTBB_AUTOSTART='no'\nbroken line\n=x\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TBB_CONFIG_FILE".to_string(), "/srv/bot.json".to_string()),
                ("TBB_AUTOSTART".to_string(), "no".to_string()),
            ]
        );
    }

    #[test]
    fn bool_parsing_is_lenient() {
        assert!(parse_bool("YES"));
        assert!(parse_bool(" 1 "));
        assert!(!parse_bool("off"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn defaults_point_at_bot_config_json() {
        let s = Settings::default();
        assert_eq!(s.config_file, PathBuf::from("bot_config.json"));
        assert!(s.autostart);
        assert!(s.throttle_enabled);
    }
}
