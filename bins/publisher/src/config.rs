use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Parser, ValueEnum};
use serde::Deserialize;

use gateway_api_server::StatusCode;

use crate::error::PublisherError;

#[derive(Parser)]
#[command(name = "relay-publisher", about = "HTTP gateway: записи пользователей → канал брокера")]
pub struct Cli {
    #[command(flatten)]
    pub args: PublisherArgs,
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
pub struct PublisherArgs {
    /// Путь к TOML конфиг файлу (необязательный)
    #[arg(long, default_value = "publisher.toml", env = "RELAY_CONFIG")]
    pub config: String,

    /// Redis URL, напр. redis://:password@redis:6379/0
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Адрес HTTP gateway
    #[arg(long, env = "LISTEN_ADDR")]
    pub listen: Option<SocketAddr>,

    /// Таймаут обработки одного запроса, секунды
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// HTTP статус при ошибке брокера (400 — legacy-режим)
    #[arg(long)]
    pub broker_error_status: Option<u16>,

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
    pub listen: Option<SocketAddr>,
    pub request_timeout_secs: Option<u64>,
    pub broker_error_status: Option<u16>,
}

fn default_redis_url() -> String {
    "redis://:redis@redis:6379/0".into()
}
fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_broker_error_status() -> u16 {
    502
}

pub fn load_config(path: &str) -> Result<Config, PublisherError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PublisherError::Config { context: "read", detail: format!("'{path}': {e}") })?;
    toml::from_str(&content)
        .map_err(|e| PublisherError::Config { context: "parse", detail: format!("'{path}': {e}") })
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: config.toml < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub redis_url: String,
    pub listen: SocketAddr,
    pub request_timeout: Duration,
    pub broker_error_status: StatusCode,
}

impl Effective {
    pub fn new(args: &PublisherArgs) -> Result<Self, PublisherError> {
        let cfg = if std::path::Path::new(&args.config).exists() {
            load_config(&args.config)?
        } else {
            Config::default()
        };
        Self::merge(args, cfg)
    }

    fn merge(args: &PublisherArgs, cfg: Config) -> Result<Self, PublisherError> {
        let timeout_secs = args
            .request_timeout_secs
            .or(cfg.request_timeout_secs)
            .unwrap_or_else(default_request_timeout_secs);
        if timeout_secs == 0 {
            return Err(PublisherError::Config {
                context: "request_timeout_secs",
                detail: "must be greater than zero".into(),
            });
        }

        let code = args
            .broker_error_status
            .or(cfg.broker_error_status)
            .unwrap_or_else(default_broker_error_status);
        let broker_error_status = StatusCode::from_u16(code)
            .ok()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .ok_or_else(|| PublisherError::Config {
                context: "broker_error_status",
                detail: format!("{code} is not a 4xx/5xx status"),
            })?;

        Ok(Self {
            redis_url: args.redis_url.clone().or(cfg.redis_url).unwrap_or_else(default_redis_url),
            listen: args.listen.or(cfg.listen).unwrap_or_else(default_listen),
            request_timeout: Duration::from_secs(timeout_secs),
            broker_error_status,
        })
    }
}
