use std::time::Duration;

use clap::{Args, Parser, ValueEnum};
use serde::Deserialize;

use listener::{Backoff, DecodeFailurePolicy, DisconnectPolicy, ListenerConfig};
use relay_api::USERS_CHANNEL;

use crate::error::SubscriberError;

#[derive(Parser)]
#[command(name = "relay-subscriber", about = "Listener канала пользователей: decode → structured log")]
pub struct Cli {
    #[command(flatten)]
    pub args: SubscriberArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct SubscriberArgs {
    /// Путь к TOML конфиг файлу (необязательный)
    #[arg(long, default_value = "subscriber.toml", env = "RELAY_CONFIG")]
    pub config: String,

    /// Redis URL, напр. redis://:password@redis:6379/0
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Битое сообщение: skip (залогировать) | abort (завершить процесс)
    #[arg(long)]
    pub on_decode_error: Option<DecodeFailurePolicy>,

    /// Потеря подписки: reconnect (с backoff) | exit
    #[arg(long)]
    pub on_disconnect: Option<DisconnectPolicy>,

    /// Начальная задержка переподписки, мс
    #[arg(long)]
    pub reconnect_initial_ms: Option<u64>,

    /// Максимальная задержка переподписки, мс
    #[arg(long)]
    pub reconnect_max_ms: Option<u64>,

    /// Формат логов
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub redis_url: Option<String>,
    pub on_decode_error: Option<DecodeFailurePolicy>,
    pub on_disconnect: Option<DisconnectPolicy>,
    pub reconnect_initial_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
}

fn default_redis_url() -> String {
    "redis://:redis@redis:6379/0".into()
}

pub fn load_config(path: &str) -> Result<Config, SubscriberError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SubscriberError::Config { context: "read", detail: format!("'{path}': {e}") })?;
    toml::from_str(&content)
        .map_err(|e| SubscriberError::Config { context: "parse", detail: format!("'{path}': {e}") })
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: config.toml < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub redis_url: String,
    pub listener: ListenerConfig,
}

impl Effective {
    pub fn new(args: &SubscriberArgs) -> Result<Self, SubscriberError> {
        let cfg = if std::path::Path::new(&args.config).exists() {
            load_config(&args.config)?
        } else {
            Config::default()
        };
        Self::merge(args, cfg)
    }

    fn merge(args: &SubscriberArgs, cfg: Config) -> Result<Self, SubscriberError> {
        let defaults = Backoff::default();
        let backoff = Backoff {
            initial: args
                .reconnect_initial_ms
                .or(cfg.reconnect_initial_ms)
                .map_or(defaults.initial, Duration::from_millis),
            max: args
                .reconnect_max_ms
                .or(cfg.reconnect_max_ms)
                .map_or(defaults.max, Duration::from_millis),
        };
        if backoff.initial.is_zero() || backoff.initial > backoff.max {
            return Err(SubscriberError::Config {
                context: "reconnect",
                detail: format!(
                    "need 0 < reconnect_initial_ms <= reconnect_max_ms, got {}..{}",
                    backoff.initial.as_millis(),
                    backoff.max.as_millis()
                ),
            });
        }

        Ok(Self {
            redis_url: args.redis_url.clone().or(cfg.redis_url).unwrap_or_else(default_redis_url),
            listener: ListenerConfig {
                on_decode_error: args.on_decode_error.or(cfg.on_decode_error).unwrap_or_default(),
                on_disconnect: args.on_disconnect.or(cfg.on_disconnect).unwrap_or_default(),
                backoff,
                ..ListenerConfig::new(USERS_CHANNEL)
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> SubscriberArgs {
        let mut argv = vec!["relay-subscriber"];
        argv.extend_from_slice(extra);
        Cli::parse_from(argv).args
    }

    #[test]
    fn defaults_are_hardened() {
        let eff = Effective::merge(&args(&[]), Config::default()).unwrap();
        assert_eq!(eff.redis_url, "redis://:redis@redis:6379/0");
        assert_eq!(eff.listener.channel, "users");
        assert_eq!(eff.listener.on_decode_error, DecodeFailurePolicy::Skip);
        assert_eq!(eff.listener.on_disconnect, DisconnectPolicy::Reconnect);
        assert_eq!(eff.listener.backoff, Backoff::default());
    }

    #[test]
    fn parity_mode_from_file_and_cli() {
        let cfg: Config = toml::from_str(
            r#"
            on_decode_error = "abort"
            reconnect_max_ms = 2000
            "#,
        )
        .unwrap();
        let eff = Effective::merge(&args(&["--on-disconnect", "exit"]), cfg).unwrap();
        assert_eq!(eff.listener.on_decode_error, DecodeFailurePolicy::Abort);
        assert_eq!(eff.listener.on_disconnect, DisconnectPolicy::Exit);
        assert_eq!(eff.listener.backoff.max, Duration::from_millis(2000));
    }

    #[test]
    fn cli_rejects_unknown_policy() {
        let argv = ["relay-subscriber", "--on-decode-error", "panic"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn rejects_inverted_backoff() {
        let err = Effective::merge(
            &args(&["--reconnect-initial-ms", "5000", "--reconnect-max-ms", "100"]),
            Config::default(),
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("config (reconnect)"), "{err}");
    }
}
