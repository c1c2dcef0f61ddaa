use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a stream.
///
/// The same four values are used locally and by the system of record, but the
/// two sides apply different transition rules: see [`StreamStatus::local_accepts`]
/// and [`StreamStatus::record_accepts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

impl StreamStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Statuses the system of record treats as in flight, replayed on recovery.
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Local transition rule. The orchestrator never refuses a transition
    /// requested by the liveness monitor or an explicit call.
    pub const fn local_accepts(&self, _next: Self) -> bool {
        true
    }

    /// Transition table enforced by the system of record.
    ///
    /// Self-loops are accepted, `Error` is reachable from anywhere and may go
    /// anywhere, and a stopped stream cannot jump straight to running.
    pub const fn record_accepts(&self, next: Self) -> bool {
        match (*self, next) {
            (a, b) if a as u8 == b as u8 => true,
            (_, Self::Error) | (Self::Error, _) => true,
            (Self::Stopped, Self::Starting) => true,
            (Self::Stopped, _) => false,
            (Self::Starting | Self::Running, _) => true,
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stream status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for StreamStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "error" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
