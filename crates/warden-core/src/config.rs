use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// How the message processor treats an AI backend failure.
///
/// This is a deliberate, configured choice, not an accident of code path
/// selection: `Permissive` keeps the message (and does not grow trust),
/// `Closed` deletes it. Both alert the admin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPolicy {
    Permissive,
    Closed,
}

impl FailPolicy {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "permissive" | "open" => Ok(FailPolicy::Permissive),
            "closed" | "strict" => Ok(FailPolicy::Closed),
            other => Err(Error::Config(format!(
                "invalid WARDEN_AI_FAIL_POLICY: {other} (expected permissive|closed)"
            ))),
        }
    }
}

/// AI backend settings.
#[derive(Clone, Debug)]
pub struct AiConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: f64,
    pub spam_threshold: f64,
    /// Global cap on concurrent AI requests, sized independently of the
    /// worker count so the downstream endpoint stays protected even when
    /// workers are scaled up.
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub fail_policy: FailPolicy,
}

/// Typed configuration for the bot, loaded from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub main_admin_id: i64,
    pub database_url: String,

    // Trust thresholds
    pub min_seconds_in_chat: u64,
    pub min_valid_messages: i64,

    // Rule detectors
    pub max_emojis: usize,

    // Anti-spam service
    pub queue_size: usize,
    pub workers: usize,
    pub dedupe_ttl: Duration,
    pub dedupe_max_size: usize,

    // Admin alerting
    pub notify_cooldown: Duration,

    // AI
    pub ai: AiConfig,

    /// Explicit, ordered moderation prompt files. Empty means "use the
    /// built-in templates"; ordering comes from this list, never from the
    /// filesystem.
    pub prompt_files: Vec<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let main_admin_id = env_i64("WARDEN_MAIN_ADMIN_ID").ok_or_else(|| {
            Error::Config("WARDEN_MAIN_ADMIN_ID environment variable is required".to_string())
        })?;

        let database_url = env_str("WARDEN_DATABASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "sqlite://warden.db?mode=rwc".to_string());

        let min_seconds_in_chat = env_u64("WARDEN_MIN_SECONDS_IN_CHAT").unwrap_or(86_400);
        let min_valid_messages = env_i64("WARDEN_MIN_VALID_MESSAGES").unwrap_or(5);

        let max_emojis = env_usize("WARDEN_MAX_EMOJIS").unwrap_or(10);

        let queue_size = env_usize("WARDEN_QUEUE_SIZE").unwrap_or(10_000).max(1);
        let workers = env_usize("WARDEN_WORKERS").unwrap_or(4).max(1);
        let dedupe_ttl = Duration::from_secs(env_u64("WARDEN_DEDUPE_TTL_S").unwrap_or(300));
        let dedupe_max_size = env_usize("WARDEN_DEDUPE_MAX_SIZE").unwrap_or(2_000);

        let notify_cooldown = Duration::from_secs(env_u64("WARDEN_NOTIFY_COOLDOWN_S").unwrap_or(60));

        let fail_policy = match env_str("WARDEN_AI_FAIL_POLICY") {
            Some(raw) => FailPolicy::parse(&raw)?,
            None => FailPolicy::Permissive,
        };

        let ai = AiConfig {
            enabled: env_bool("WARDEN_AI_ENABLED").unwrap_or(false),
            base_url: env_str("WARDEN_AI_BASE_URL").and_then(non_empty),
            api_key: env_str("WARDEN_AI_API_KEY").and_then(non_empty),
            model: env_str("WARDEN_AI_MODEL").and_then(non_empty),
            temperature: env_f64("WARDEN_AI_TEMPERATURE").unwrap_or(0.2),
            spam_threshold: env_f64("WARDEN_AI_SPAM_THRESHOLD").unwrap_or(0.3),
            concurrency: env_usize("WARDEN_AI_CONCURRENCY").unwrap_or(5).max(1),
            request_timeout: Duration::from_secs(env_u64("WARDEN_AI_TIMEOUT_S").unwrap_or(30)),
            fail_policy,
        };

        let prompt_files =
            parse_csv_paths(env_str("WARDEN_PROMPT_FILES")).unwrap_or_default();

        Ok(Self {
            telegram_bot_token,
            main_admin_id,
            database_url,
            min_seconds_in_chat,
            min_valid_messages,
            max_emojis,
            queue_size,
            workers,
            dedupe_ttl,
            dedupe_max_size,
            notify_cooldown,
            ai,
            prompt_files,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
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

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_str(key).and_then(|s| s.trim().parse::<f64>().ok())
}

fn parse_csv_paths(v: Option<String>) -> Option<Vec<PathBuf>> {
    let v = v?;
    let out = v
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect::<Vec<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
