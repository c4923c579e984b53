use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Что делать с сообщением, которое не декодируется в запись.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFailurePolicy {
    /// Залогировать и перейти к следующему сообщению.
    #[default]
    Skip,
    /// Остановить listener с ошибкой: одно битое сообщение валит процесс.
    Abort,
}

/// Что делать, когда брокер закрыл подписку.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Переподписаться с экспоненциальным backoff. Пропущенные сообщения не воспроизводятся.
    #[default]
    Reconnect,
    /// Остановить listener с ошибкой.
    Exit,
}

impl FromStr for DecodeFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown decode failure policy '{other}' (expected skip|abort)")),
        }
    }
}

impl fmt::Display for DecodeFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("skip"),
            Self::Abort => f.write_str("abort"),
        }
    }
}

impl FromStr for DisconnectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reconnect" => Ok(Self::Reconnect),
            "exit" => Ok(Self::Exit),
            other => Err(format!("unknown disconnect policy '{other}' (expected reconnect|exit)")),
        }
    }
}

impl fmt::Display for DisconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnect => f.write_str("reconnect"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

/// Задержки переподписки: initial, x2 после каждой неудачи, не больше max.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}
