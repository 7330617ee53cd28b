// MIT License - Copyright (c) 2026 Peter Wright
// Alarm modes and inbound commands

use std::fmt;

/// Alarm mode as published on the state topic.
///
/// `Pending` is only ever announced by the bridge while a command is in
/// flight; the cloud never reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Unknown,
    Disarmed,
    ArmedAway,
    ArmedHome,
    Pending,
}

impl Mode {
    /// Normalize a raw mode name reported by the cloud.
    ///
    /// Base stations without a home/away distinction report plain `armed`,
    /// which is treated as away.
    pub fn from_cloud(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "disarmed" => Self::Disarmed,
            "armed" | "armed_away" => Self::ArmedAway,
            "armed_home" | "home" => Self::ArmedHome,
            _ => Self::Unknown,
        }
    }

    /// The payload string published on the state topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Disarmed => "disarmed",
            Self::ArmedAway => "armed_away",
            Self::ArmedHome => "armed_home",
            Self::Pending => "pending",
        }
    }

    /// Whether this is a mode the cloud can actually be in.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Unknown | Self::Pending)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands accepted on the command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Disarm,
    ArmAway,
}

impl Command {
    /// Parse a command payload. Returns `None` for anything unrecognized.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match std::str::from_utf8(payload).ok()?.trim() {
            "DISARM" => Some(Self::Disarm),
            "ARM_AWAY" => Some(Self::ArmAway),
            _ => None,
        }
    }

    /// The mode the base station should end up in.
    pub fn target(&self) -> Mode {
        match self {
            Self::Disarm => Mode::Disarmed,
            Self::ArmAway => Mode::ArmedAway,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disarm => "DISARM",
            Self::ArmAway => "ARM_AWAY",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
