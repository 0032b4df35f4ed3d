use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    domain::{ChatId, EntityId},
    errors::Error,
    Result,
};

/// Variables the service refuses to start without.
pub const REQUIRED_VARS: [&str; 3] = ["TELEGRAM_TOKEN", "CHAT_ID", "SMULE_ACCOUNT_IDS"];

pub const DEFAULT_API_URL: &str = "https://www.smule.com/api/profile/followers";
pub const DEFAULT_PROFILE_URL: &str = "https://www.smule.com";
pub const DEFAULT_DATA_DIR: &str = "/app";

/// Typed configuration, read once at startup and treated as read-only afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_token: String,
    pub chat_id: ChatId,

    // Smule
    pub account_ids: Vec<EntityId>,
    pub account_aliases: HashMap<String, String>,
    pub api_url: String,
    pub profile_base_url: String,

    // Runtime
    pub check_interval: Duration,
    pub log_level: String,
    pub data_dir: PathBuf,

    // Outbound rate limiting
    pub rate_limit_per_second: u32,
    pub rate_limit_per_minute: u32,
    pub send_max_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let telegram_token = env_str("TELEGRAM_TOKEN")
            .and_then(non_empty)
            .ok_or_else(|| missing("TELEGRAM_TOKEN"))?;
        let chat_id = env_str("CHAT_ID")
            .and_then(non_empty)
            .map(|s| ChatId(s.trim().to_string()))
            .ok_or_else(|| missing("CHAT_ID"))?;

        let account_ids = parse_csv_entities(env_str("SMULE_ACCOUNT_IDS"));
        if account_ids.is_empty() {
            return Err(missing("SMULE_ACCOUNT_IDS"));
        }
        let account_aliases = parse_aliases(env_str("ACCOUNT_ALIASES"));

        let api_url = env_str("SMULE_API_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let profile_base_url = env_str("SMULE_PROFILE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_PROFILE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let check_interval = Duration::from_secs(env_u64("CHECK_INTERVAL").unwrap_or(300));
        let log_level = log_level_from_env();

        let data_dir = env_path("DATA_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        fs::create_dir_all(&data_dir)?;

        let rate_limit_per_second = env_u32("RATE_LIMIT_PER_SECOND").unwrap_or(1).max(1);
        let rate_limit_per_minute = env_u32("RATE_LIMIT_PER_MINUTE").unwrap_or(20).max(1);
        let send_max_attempts = env_u32("SEND_MAX_ATTEMPTS").unwrap_or(5).max(1);

        Ok(Self {
            telegram_token,
            chat_id,
            account_ids,
            account_aliases,
            api_url,
            profile_base_url,
            check_interval,
            log_level,
            data_dir,
            rate_limit_per_second,
            rate_limit_per_minute,
            send_max_attempts,
        })
    }
}

/// `LOG_LEVEL`, readable before the full config so logging can come up first.
pub fn log_level_from_env() -> String {
    env_str("LOG_LEVEL")
        .and_then(non_empty)
        .unwrap_or_else(|| "INFO".to_string())
}

/// Names of required variables that are unset or blank.
pub fn missing_required_vars() -> Vec<&'static str> {
    REQUIRED_VARS
        .iter()
        .copied()
        .filter(|k| env_str(k).and_then(non_empty).is_none())
        .collect()
}

fn missing(key: &str) -> Error {
    Error::Config(format!("{key} environment variable is required"))
}

pub fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

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
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return &s[1..s.len() - 1];
    }
    s
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

pub fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Comma-separated ids, order preserved, blanks and duplicates dropped.
fn parse_csv_entities(v: Option<String>) -> Vec<EntityId> {
    let mut out: Vec<EntityId> = Vec::new();
    for id in v.unwrap_or_default().split(',').map(str::trim) {
        if id.is_empty() || out.iter().any(|e| e.0 == id) {
            continue;
        }
        out.push(EntityId(id.to_string()));
    }
    out
}

/// `id:alias,id:alias`; malformed pairs are skipped.
fn parse_aliases(v: Option<String>) -> HashMap<String, String> {
    v.unwrap_or_default()
        .split(',')
        .filter_map(|pair| pair.split_once(':'))
        .map(|(id, alias)| (id.trim().to_string(), alias.trim().to_string()))
        .filter(|(id, alias)| !id.is_empty() && !alias.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_ids_keep_order_and_drop_blanks() {
        let ids = parse_csv_entities(Some(" 96242367, ,3150102762,96242367,".to_string()));
        assert_eq!(
            ids,
            vec![
                EntityId("96242367".to_string()),
                EntityId("3150102762".to_string())
            ]
        );
    }

    #[test]
    fn aliases_parse_pairs_and_skip_garbage() {
        let aliases = parse_aliases(Some("96242367:dsip, 3150102762 : lithiumly,bad,:x".to_string()));
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases.get("96242367").map(String::as_str), Some("dsip"));
        assert_eq!(aliases.get("3150102762").map(String::as_str), Some("lithiumly"));
    }

    #[test]
    fn dotenv_values_lose_surrounding_quotes() {
        assert_eq!(strip_quotes("\"abc\""), "abc");
        assert_eq!(strip_quotes("'abc'"), "abc");
        assert_eq!(strip_quotes("abc"), "abc");
        assert_eq!(strip_quotes("\""), "\"");
    }
}
