use std::env;

use anyhow::{bail, Context};
use chrono::Duration;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";
const DEV_SECRET: &str = "change-me-to-a-random-32-char-string";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Read ahead of [`Config`] so the subscriber is installed before config warnings.
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub sqlite_path: String,
    pub token_secret: String,
    pub token_ttl: Duration,
    pub cors_origins: Vec<String>,
    pub rate_limit_enabled: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let server_port = env::var("PORT")
            .or_else(|_| env::var("SERVER_PORT"))
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("PORT must be a valid port number")?;

        let token_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET is not set, using the development secret");
                DEV_SECRET.to_string()
            }
        };

        let token_ttl = parse_duration(
            &env::var("JWT_EXPIRE").unwrap_or_else(|_| "7d".to_string()),
        )
        .context("JWT_EXPIRE must look like 7d, 12h, 30m, 45s or a number of seconds")?;

        let mut cors_origins = vec![DEFAULT_ORIGIN.to_string()];
        if let Ok(extra) = env::var("ALLOWED_ORIGINS") {
            cors_origins.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string),
            );
        }

        let rate_limit_enabled = env::var("RATE_LIMIT_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .context("RATE_LIMIT_ENABLED must be true or false")?;

        Ok(Self {
            server_port,
            sqlite_path: env::var("SQLITE_PATH")
                .unwrap_or_else(|_| "./data/fintrack.db".to_string()),
            token_secret,
            token_ttl,
            cors_origins,
            rate_limit_enabled,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            server_port: 0,
            sqlite_path: ":memory:".to_string(),
            token_secret: "test-secret".to_string(),
            token_ttl: Duration::days(7),
            cors_origins: vec![DEFAULT_ORIGIN.to_string()],
            rate_limit_enabled: false,
        }
    }
}

/// Parse a lifetime such as `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: i64 = digits.parse().with_context(|| format!("invalid duration `{raw}`"))?;
    if value <= 0 {
        bail!("duration must be positive, got `{raw}`");
    }

    let duration = match unit {
        "d" => Duration::try_days(value),
        "h" => Duration::try_hours(value),
        "m" => Duration::try_minutes(value),
        "s" => Duration::try_seconds(value),
        other => bail!("unknown duration unit `{other}`"),
    };
    duration.with_context(|| format!("duration `{raw}` is out of range"))
}
