// MIT License - Copyright (c) 2026 Peter Wright
// Pending-command and reconciliation state machine

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cloud::CloudSession;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::mode::{Command, Mode};
use crate::mqtt::{AVAILABILITY_OFFLINE, BusClient};
use crate::timer::TimerSlot;

/// Everything the bridge mutates. Only ever touched while holding the lock.
struct BridgeState {
    /// `None` once the bridge has been torn down
    session: Option<Box<dyn CloudSession>>,
    /// Last mode published (retained) on the state topic
    last_known: Mode,
    pending_command: TimerSlot,
    poll: TimerSlot,
}

/// Bridges the cloud's alarm mode to the state topic and applies commands.
///
/// Poll ticks, delayed commands and inbound MQTT messages all run on separate
/// tokio tasks; each of them takes the same lock before touching the session or
/// the timers, so at most one of them is in flight at a time.
pub struct Bridge {
    config: BridgeConfig,
    publisher: Arc<dyn BusClient>,
    state: Mutex<BridgeState>,
    /// Bumped by every command before it waits for the lock. A delayed apply
    /// whose generation is no longer current has been superseded.
    command_generation: AtomicU64,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        session: Box<dyn CloudSession>,
        publisher: Arc<dyn BusClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            publisher,
            state: Mutex::new(BridgeState {
                session: Some(session),
                last_known: Mode::Unknown,
                pending_command: TimerSlot::default(),
                poll: TimerSlot::default(),
            }),
            command_generation: AtomicU64::new(0),
        })
    }

    /// Begin the reconciliation loop.
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.session.is_none() {
            warn!("Bridge already shut down, not starting");
            return;
        }
        self.schedule_poll(&mut state);
    }

    /// Handle a raw payload from the command topic.
    pub async fn on_message(self: &Arc<Self>, payload: &[u8]) {
        match Command::from_payload(payload) {
            Some(cmd) => self.on_command(cmd).await,
            None => warn!(
                "Ignoring unrecognized command on {}: {:?}",
                self.config.command_topic,
                String::from_utf8_lossy(payload)
            ),
        }
    }

    /// Announce `pending`, then apply `cmd` after its configured delay.
    ///
    /// A command arriving before the previous one was applied replaces it.
    pub async fn on_command(self: &Arc<Self>, cmd: Command) {
        // An older apply may already be queued on the lock; bumping first makes it stale.
        let generation = self.command_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(session) = state.session.as_ref() else {
            debug!("Dropping {cmd}: bridge is shut down");
            return;
        };
        if !self.is_current_command(generation) {
            debug!("Dropping {cmd}: superseded by a newer command");
            return;
        }
        let station = session.station_name().to_string();

        state.poll.cancel();
        state.pending_command.cancel();

        let delay = self.config.pending_delay(cmd);
        info!("[{station}] Received {cmd}, applying in {}s", delay.as_secs_f64());

        if let Err(e) = self
            .publisher
            .publish(&self.config.state_topic, Mode::Pending.as_str(), false)
            .await
        {
            error!("[{station}] Failed to publish pending state: {e}");
        }

        let bridge = Arc::clone(self);
        let target = cmd.target();
        state.pending_command.replace(delay, async move {
            bridge.apply_queued_command(target, generation).await;
        });

        self.schedule_poll(state);
    }

    /// Ask the cloud to switch to `target`.
    ///
    /// Failures are logged and swallowed; either way the next poll publishes
    /// whatever mode the base station actually ends up in.
    pub async fn apply_command(&self, target: Mode) {
        let mut state = self.state.lock().await;
        Self::apply_locked(&mut state, target).await;
    }

    /// Apply a delayed command unless a newer one arrived while it was waiting
    /// for its timer or for the lock.
    async fn apply_queued_command(&self, target: Mode, generation: u64) {
        let mut state = self.state.lock().await;
        if !self.is_current_command(generation) {
            debug!("Not setting mode to {target}: superseded by a newer command");
            return;
        }
        Self::apply_locked(&mut state, target).await;
    }

    fn is_current_command(&self, generation: u64) -> bool {
        self.command_generation.load(Ordering::SeqCst) == generation
    }

    async fn apply_locked(state: &mut BridgeState, target: Mode) {
        let Some(session) = state.session.as_mut() else {
            return;
        };
        let station = session.station_name().to_string();

        info!("[{station}] Setting mode to {target}");
        if let Err(e) = session.request_mode_change(target).await {
            let err = BridgeError::CommandApplyFailure {
                station,
                mode: target,
                reason: e.to_string(),
            };
            error!("{err}");
        }
        state.last_known = Mode::Pending;
    }

    /// Read the cloud's mode and publish it if it changed, then schedule the
    /// next poll.
    ///
    /// An unreadable mode triggers one re-login. If that login fails the error
    /// is returned, but the next poll is still scheduled so a later tick can
    /// retry.
    pub async fn reconcile(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            debug!("Skipping poll: bridge is shut down");
            return Ok(());
        };

        let outcome = read_mode_with_relogin(&mut **session).await;
        let station = session.station_name().to_string();

        let result = match outcome {
            Ok(Some(mode)) if mode != state.last_known => {
                info!("[{station}] New alarm mode is {mode}");
                match self
                    .publisher
                    .publish(&self.config.state_topic, mode.as_str(), true)
                    .await
                {
                    Ok(()) => state.last_known = mode,
                    Err(e) => error!("[{station}] Failed to publish mode {mode}: {e}"),
                }
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        self.schedule_poll(state);
        result
    }

    /// Cancel both timers, release the cloud session and close the bus
    /// connection. Safe to call more than once.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.poll.cancel();
        state.pending_command.cancel();

        let Some(session) = state.session.take() else {
            return;
        };
        info!("[{}] Shutting down bridge", session.station_name());
        drop(session);

        if let Err(e) = self
            .publisher
            .publish(&self.config.availability_topic, AVAILABILITY_OFFLINE, true)
            .await
        {
            warn!("Failed to publish offline availability: {e}");
        }
        if let Err(e) = self.publisher.disconnect().await {
            warn!("Error disconnecting MQTT client: {e}");
        }
    }

    /// The mode last published on the state topic.
    pub async fn last_known(&self) -> Mode {
        self.state.lock().await.last_known
    }

    /// Whether the bridge still holds its cloud session (false after shutdown).
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    /// Whether a reconciliation poll is waiting to run.
    pub async fn poll_scheduled(&self) -> bool {
        self.state.lock().await.poll.is_scheduled()
    }

    /// Whether a received command has not been applied or cancelled yet.
    pub async fn command_scheduled(&self) -> bool {
        self.state.lock().await.pending_command.is_scheduled()
    }

    fn schedule_poll(self: &Arc<Self>, state: &mut BridgeState) {
        let bridge = Arc::clone(self);
        state.poll.replace(self.config.poll_interval, async move {
            if let Err(e) = bridge.reconcile().await {
                error!("Poll failed: {e}");
            }
        });
    }
}

async fn read_mode(session: &mut dyn CloudSession) -> Result<Mode> {
    let raw = session.current_mode().await?;
    match raw.as_deref().map(Mode::from_cloud) {
        Some(mode) if mode.is_settled() => Ok(mode),
        Some(_) => {
            debug!(
                "[{}] Unrecognized cloud mode {:?}",
                session.station_name(),
                raw.unwrap_or_default()
            );
            Err(BridgeError::TransientReadFailure {
                station: session.station_name().to_string(),
            })
        }
        None => Err(BridgeError::TransientReadFailure {
            station: session.station_name().to_string(),
        }),
    }
}

/// Read the current mode, logging in again once if the session looks stale.
///
/// `Ok(None)` means the mode was still unreadable after a successful login.
async fn read_mode_with_relogin(session: &mut dyn CloudSession) -> Result<Option<Mode>> {
    let err = match read_mode(session).await {
        Ok(mode) => return Ok(Some(mode)),
        Err(e) => e,
    };

    let station = session.station_name().to_string();
    warn!("[{station}] Detected stale connection ({err}). Re-authenticating.");
    if let Err(e) = session.login().await {
        return Err(BridgeError::AuthFailure {
            station,
            reason: e.to_string(),
        });
    }

    match read_mode(session).await {
        Ok(mode) => Ok(Some(mode)),
        Err(e) => {
            warn!("[{station}] Mode still unreadable after re-login: {e}");
            Ok(None)
        }
    }
}
