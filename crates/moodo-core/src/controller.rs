// ── Reconciliation coordinator ──
//
// Owns the device mirror, the REST client and the push channel. Fetches
// the initial snapshot, feeds push events into the mirror, and serializes
// user commands through a single processor task.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use moodo_api::{MoodoClient, PushConfig, PushHandle, PushStatus, RemoteBox, TransportConfig};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::accessory::AccessoryView;
use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::model::{DeviceKey, DeviceState, MAX_LEVEL, SLOT_COUNT, UpdateSource};
use crate::store::DeviceStore;
use crate::stream::DeviceStream;
use crate::synth;

const COMMAND_CHANNEL_SIZE: usize = 64;

/// How many locally issued request ids are remembered for echo detection.
const RECENT_WRITES_CAPACITY: usize = 64;
const RECENT_WRITES_TTL: Duration = Duration::from_secs(30);

// ── ConnectionState ──────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Starting,
    Running,
    Stopped,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Holds one mirror entry per
/// configured box from construction on; [`start()`](Self::start) fills them.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: BridgeConfig,
    store: Arc<DeviceStore>,
    client: MoodoClient,
    connection_state: watch::Sender<ConnectionState>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    push_handle: Mutex<Option<PushHandle>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    recent_writes: Mutex<RecentWrites>,
}

impl Controller {
    /// Create a controller and an `Uninitialized` entry per configured box.
    /// Does not touch the network until [`start()`](Self::start).
    pub fn new(config: BridgeConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: config.timeout,
        };
        let client = MoodoClient::new(config.api_url.clone(), &config.token, &transport)?
            .with_retry(config.retry);

        let store = Arc::new(DeviceStore::new());
        for device in &config.devices {
            if !store.register(device.key) {
                warn!(device_key = %device.key, "duplicate device in configuration, ignoring");
            }
        }

        let (connection_state, _) = watch::channel(ConnectionState::Idle);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                store,
                client,
                connection_state,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
                push_handle: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
                recent_writes: Mutex::new(RecentWrites::default()),
            }),
        })
    }

    /// Access the bridge configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Access the device mirror.
    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Fetch the initial snapshot and spawn the background tasks.
    ///
    /// A failed initial fetch is logged, not returned: affected boxes stay
    /// `Uninitialized` until a push event or a later refresh fills them.
    pub async fn start(&self) -> Result<(), CoreError> {
        let Some(command_rx) = self.inner.command_rx.lock().await.take() else {
            return Err(CoreError::Internal("controller already started".into()));
        };

        self.inner
            .connection_state
            .send_replace(ConnectionState::Starting);

        match self.full_refresh().await {
            Ok(synced) => {
                info!(
                    synced,
                    configured = self.inner.store.len(),
                    "initial refresh complete"
                );
                for state in self.inner.store.snapshot() {
                    if !state.is_synced() {
                        warn!(device_key = %state.key, "configured device not found in account");
                    }
                }
            }
            Err(e) => warn!(error = %e, "initial refresh failed (non-fatal)"),
        }

        {
            let mut handles = self.inner.task_handles.lock().await;
            handles.push(tokio::spawn(command_processor_task(
                self.clone(),
                command_rx,
            )));

            if self.inner.config.push_enabled {
                self.spawn_push(&mut handles).await;
            }
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Running);
        Ok(())
    }

    /// Connect the push channel and spawn the bridge task feeding the mirror.
    ///
    /// Non-fatal on failure: the mirror then only changes through fetches
    /// and local writes.
    async fn spawn_push(&self, handles: &mut Vec<JoinHandle<()>>) {
        let cfg = &self.inner.config;
        let mut push_config = PushConfig::new(cfg.socket_url.clone(), cfg.token.clone());
        push_config.auth_delay = cfg.auth_delay;
        push_config.subscribe_delay = cfg.subscribe_delay;

        let push_cancel = self.inner.cancel.child_token();
        let handle = match PushHandle::connect(push_config, push_cancel.clone()) {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "push channel unavailable (non-fatal)");
                return;
            }
        };

        let mut push_rx = handle.subscribe();
        let controller = self.clone();

        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = push_cancel.cancelled() => break,
                    result = push_rx.recv() => {
                        match result {
                            Ok(remote) => {
                                controller.handle_push(&remote).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "push bridge lagged, refreshing");
                                if let Err(e) = controller.full_refresh().await {
                                    warn!(error = %e, "refresh after lag failed");
                                }
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        }));

        *self.inner.push_handle.lock().await = Some(handle);
        info!("push channel spawned (handshake in progress)");
    }

    /// Cancel background tasks, close the push channel and wait for both.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.push_handle.lock().await.take() {
            handle.shutdown();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Stopped);
        debug!("controller stopped");
    }

    /// Start, run `f`, shut down. The push channel is never connected.
    pub async fn oneshot<F, Fut, T>(config: BridgeConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.push_enabled = false;

        let controller = Controller::new(cfg)?;
        controller.start().await?;
        let result = f(controller.clone()).await;
        controller.shutdown().await;
        result
    }

    // ── Remote → mirror ──────────────────────────────────────────

    /// Fetch every box and overwrite the matching mirror entries.
    ///
    /// Returns how many configured boxes were in the response.
    pub async fn full_refresh(&self) -> Result<usize, CoreError> {
        let boxes = self.inner.client.fetch_all().await?;
        let store = &self.inner.store;

        let mut applied = 0;
        for remote in &boxes {
            if store.apply_remote_snapshot(remote, UpdateSource::Fetch) {
                applied += 1;
            } else {
                debug!(device_key = remote.device_key, "skipping unconfigured box");
            }
        }

        store.mark_full_refresh();
        debug!(fetched = boxes.len(), applied, "full refresh");
        Ok(applied)
    }

    /// Fetch a single box and overwrite its mirror entry.
    pub async fn refresh_device(&self, key: DeviceKey) -> Result<Arc<DeviceState>, CoreError> {
        if !self.inner.store.contains(key) {
            return Err(CoreError::DeviceNotFound { key });
        }

        let remote = self.inner.client.fetch_box(key.get()).await?;
        self.inner
            .store
            .apply_remote_snapshot(&remote, UpdateSource::Fetch);
        self.inner
            .store
            .get(key)
            .ok_or(CoreError::DeviceNotFound { key })
    }

    /// Apply a pushed snapshot. Returns `true` if the mirror changed.
    ///
    /// Snapshots for unconfigured boxes and echoes of our own recent writes
    /// are dropped.
    pub async fn handle_push(&self, remote: &RemoteBox) -> bool {
        let key = DeviceKey::new(remote.device_key);
        if !self.inner.store.contains(key) {
            trace!(device_key = %key, "ignoring push for unconfigured box");
            return false;
        }

        if let Some(ref id) = remote.restful_request_id {
            if self
                .inner
                .recent_writes
                .lock()
                .await
                .contains(id, Instant::now())
            {
                debug!(device_key = %key, request_id = %id, "dropping echo of local write");
                return false;
            }
        }

        self.inner.store.mark_push_event();
        self.inner
            .store
            .apply_remote_snapshot(remote, UpdateSource::Push)
    }

    // ── Command execution ────────────────────────────────────────

    /// Execute a command through the command processor and await the result.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if *self.inner.connection_state.borrow() != ConnectionState::Running {
            return Err(CoreError::CoordinatorStopped);
        }

        let (tx, rx) = tokio::sync::oneshot::channel();

        self.inner
            .command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::CoordinatorStopped)?;

        rx.await.map_err(|_| CoreError::CoordinatorStopped)?
    }

    pub async fn set_power(&self, key: DeviceKey, on: bool) -> Result<CommandResult, CoreError> {
        self.execute(Command::SetPower { key, on }).await
    }

    pub async fn set_intensity(&self, key: DeviceKey, value: u8) -> Result<CommandResult, CoreError> {
        self.execute(Command::SetIntensity { key, value }).await
    }

    pub async fn set_slot_active(
        &self,
        key: DeviceKey,
        slot: usize,
        active: bool,
    ) -> Result<CommandResult, CoreError> {
        self.execute(Command::SetSlotActive { key, slot, active })
            .await
    }

    pub async fn set_slot_speed(
        &self,
        key: DeviceKey,
        slot: usize,
        speed: u8,
    ) -> Result<CommandResult, CoreError> {
        self.execute(Command::SetSlotSpeed { key, slot, speed })
            .await
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to lifecycle changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Status of the push channel, once it has been spawned.
    pub async fn push_status(&self) -> Option<watch::Receiver<PushStatus>> {
        self.inner
            .push_handle
            .lock()
            .await
            .as_ref()
            .map(PushHandle::status)
    }

    pub fn device(&self, key: DeviceKey) -> Option<Arc<DeviceState>> {
        self.inner.store.get(key)
    }

    pub fn devices_snapshot(&self) -> Vec<Arc<DeviceState>> {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self, key: DeviceKey) -> Option<DeviceStream> {
        self.inner.store.subscribe(key)
    }

    /// Accessory projection of a configured box.
    pub fn accessory(&self, key: DeviceKey) -> Option<AccessoryView> {
        let device = self.inner.config.device(key)?;
        let state = self.inner.store.get(key)?;
        Some(AccessoryView::project(device, &state))
    }

    // ── Command routing ──────────────────────────────────────────

    async fn route_command(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        validate(cmd)?;

        let key = cmd.key();
        let mut state = self
            .inner
            .store
            .get(key)
            .ok_or(CoreError::DeviceNotFound { key })?;

        // Zeroed placeholder state says nothing about the box: fetch it first.
        if !state.is_synced() {
            match self.refresh_device(key).await {
                Ok(fresh) => state = fresh,
                // A capsule update rewrites every slot and needs the real ones.
                Err(e) if cmd.field_change().is_some() => return Err(e),
                Err(e) => warn!(device_key = %key, error = %e, "box state unknown, writing unconditionally"),
            }
        }
        let known = state.is_synced();
        let client = &self.inner.client;

        match cmd {
            Command::SetPower { on, .. } => {
                if known && state.powered == on {
                    return Ok(CommandResult::Unchanged);
                }
                info!(device_key = %key, on, "changing power");
                let result = if on {
                    client.power_on(key.get()).await
                } else {
                    client.power_off(key.get()).await
                };
                self.finish_write(key, result, |s| s.powered = on)
            }

            Command::SetIntensity { value: 0, .. } => {
                if known && !state.powered {
                    return Ok(CommandResult::Unchanged);
                }
                info!(device_key = %key, "intensity 0, powering off");
                let result = client.power_off(key.get()).await;
                self.finish_write(key, result, |s| s.powered = false)
            }

            Command::SetIntensity { value, .. } => {
                if known && state.intensity == value {
                    return Ok(CommandResult::Unchanged);
                }
                info!(device_key = %key, value, "changing intensity");
                let result = client.set_intensity(key.get(), value).await;
                self.finish_write(key, result, |s| s.intensity = value)
            }

            Command::SetSlotActive { .. } | Command::SetSlotSpeed { .. } => {
                let Some(change) = cmd.field_change() else {
                    return Err(CoreError::Internal("slot command without slot change".into()));
                };
                self.route_slot_change(&state, change).await
            }
        }
    }

    async fn route_slot_change(
        &self,
        state: &DeviceState,
        change: synth::FieldChange,
    ) -> Result<CommandResult, CoreError> {
        let key = state.key;
        let observed = state.observed();

        if let Some(shown) = observed.slots.get(change.slot()) {
            let unchanged = match change {
                synth::FieldChange::SetSlotActive { active, .. } => shown.active == active,
                synth::FieldChange::SetSlotSpeed { speed: 0, .. } => !shown.active,
                synth::FieldChange::SetSlotSpeed { speed, .. } => {
                    shown.active && shown.speed == speed
                }
            };
            if unchanged {
                return Ok(CommandResult::Unchanged);
            }
        }

        if !state.powered {
            debug!(device_key = %key, ?change, "rejecting capsule change while powered off");
            self.schedule_revert(key);
            return Err(CoreError::DevicePoweredOff { key });
        }

        let mut update = synth::build_update(state, change);
        let request_id = uuid::Uuid::new_v4().to_string();
        update.restful_request_id = Some(request_id.clone());

        // Remember before sending: the echo can beat the HTTP response.
        self.inner
            .recent_writes
            .lock()
            .await
            .remember(request_id, Instant::now());

        info!(device_key = %key, ?change, "updating capsule");
        let result = self.inner.client.apply_update(&update).await;
        self.finish_write(key, result, |s| synth::apply_update(s, &update))
    }

    /// Update the mirror after a successful write, or revert consumers on failure.
    fn finish_write(
        &self,
        key: DeviceKey,
        result: Result<(), moodo_api::Error>,
        change: impl FnOnce(&mut DeviceState),
    ) -> Result<CommandResult, CoreError> {
        match result {
            Ok(()) => {
                self.inner.store.apply_local_change(key, change);
                Ok(CommandResult::Applied)
            }
            Err(e) => {
                warn!(device_key = %key, error = %e, "write failed, reverting");
                self.inner.store.republish(key);
                Err(e.into())
            }
        }
    }

    /// Republish `key` after the revert delay so consumers drop the change.
    fn schedule_revert(&self, key: DeviceKey) {
        let store = Arc::clone(&self.inner.store);
        let delay = self.inner.config.revert_delay;
        let cancel = self.inner.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    store.republish(key);
                }
            }
        });
    }
}

fn validate(cmd: Command) -> Result<(), CoreError> {
    let (slot, level) = match cmd {
        Command::SetPower { .. } => (None, None),
        Command::SetIntensity { value, .. } => (None, Some(value)),
        Command::SetSlotActive { slot, .. } => (Some(slot), None),
        Command::SetSlotSpeed { slot, speed, .. } => (Some(slot), Some(speed)),
    };

    if let Some(slot) = slot.filter(|s| *s >= SLOT_COUNT) {
        return Err(CoreError::ValidationFailed {
            message: format!("slot {slot} out of range (0..{SLOT_COUNT})"),
        });
    }
    if let Some(level) = level.filter(|l| *l > MAX_LEVEL) {
        return Err(CoreError::ValidationFailed {
            message: format!("value {level} out of range (0..={MAX_LEVEL})"),
        });
    }
    Ok(())
}

// ── Background tasks ─────────────────────────────────────────────

/// Process commands one at a time so writes never interleave.
async fn command_processor_task(controller: Controller, mut rx: mpsc::Receiver<CommandEnvelope>) {
    let cancel = controller.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = controller.route_command(envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Echo detection ───────────────────────────────────────────────

/// Bounded, time-limited set of request ids attached to local writes.
#[derive(Debug, Default)]
struct RecentWrites {
    entries: VecDeque<(String, Instant)>,
}

impl RecentWrites {
    fn remember(&mut self, id: String, now: Instant) {
        self.prune(now);
        if self.entries.len() >= RECENT_WRITES_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((id, now));
    }

    fn contains(&mut self, id: &str, now: Instant) -> bool {
        self.prune(now);
        self.entries.iter().any(|(known, _)| known == id)
    }

    fn prune(&mut self, now: Instant) {
        while self
            .entries
            .front()
            .is_some_and(|(_, at)| now.duration_since(*at) > RECENT_WRITES_TTL)
        {
            self.entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_writes_expire_after_ttl() {
        let mut recent = RecentWrites::default();
        let start = Instant::now();
        recent.remember("a".into(), start);

        assert!(recent.contains("a", start + Duration::from_secs(10)));
        assert!(!recent.contains("a", start + RECENT_WRITES_TTL + Duration::from_secs(1)));
    }

    #[test]
    fn recent_writes_are_bounded() {
        let mut recent = RecentWrites::default();
        let now = Instant::now();
        for i in 0..=RECENT_WRITES_CAPACITY {
            recent.remember(i.to_string(), now);
        }

        assert_eq!(recent.entries.len(), RECENT_WRITES_CAPACITY);
        assert!(!recent.contains("0", now));
        assert!(recent.contains(&RECENT_WRITES_CAPACITY.to_string(), now));
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let key = DeviceKey::new(1);
        assert!(validate(Command::SetSlotSpeed { key, slot: 4, speed: 10 }).is_err());
        assert!(validate(Command::SetSlotSpeed { key, slot: 3, speed: 101 }).is_err());
        assert!(validate(Command::SetIntensity { key, value: 150 }).is_err());
        assert!(validate(Command::SetSlotActive { key, slot: 0, active: true }).is_ok());
        assert!(validate(Command::SetPower { key, on: false }).is_ok());
    }
}
