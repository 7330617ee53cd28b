// MIT License - Copyright (c) 2026 Peter Wright
// Cloud session abstraction

pub mod arlo;

use async_trait::async_trait;

use crate::error::Result;
use crate::mode::Mode;

/// An authenticated session with the vendor cloud for a single base station.
///
/// Calls are expected to be bounded by the underlying transport's timeout.
#[async_trait]
pub trait CloudSession: Send {
    /// Human-readable name of the base station, used in log messages.
    fn station_name(&self) -> &str;

    /// (Re-)authenticate with the cloud.
    async fn login(&mut self) -> Result<()>;

    /// Raw mode name currently reported by the cloud.
    ///
    /// `Ok(None)` means the cloud answered without a usable mode, which is how
    /// a stale session shows up.
    async fn current_mode(&mut self) -> Result<Option<String>>;

    /// Ask the base station to switch to `mode`.
    async fn request_mode_change(&mut self, mode: Mode) -> Result<()>;
}
