//! The device coordinator: connection lifecycle and command dispatch.
//!
//! One [`Coordinator`] owns one physical link. A background run loop keeps
//! the link alive while a connection is wanted: it attempts a fresh connect,
//! subscribes to the status-register notifications, seeds the state store
//! with an initial full read, then polls the temperature every second and
//! the slow-changing characteristics on a longer interval. Link loss
//! freezes the state snapshot and re-enters the retry cycle after a fixed
//! delay, indefinitely, until told otherwise.
//!
//! Commands validate and encode caller input, then write over the same
//! single-flight link. Blocking variants use subscribe-then-await: register
//! a one-shot waiter, watch the state broadcast, resolve on match, timeout,
//! or cancellation. Disconnecting cancels every pending wait; a newer
//! conflicting command cancels its predecessor's wait.
//!
//! The coordinator is an explicitly owned object: create it, `start` it,
//! share it (`Arc`) with whatever needs the command or observation API, and
//! `stop` it when the device is unconfigured.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use volcano_types::{ConnectionStatus, codec, uuids};

use crate::ble::BleTransport;
use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::state::{DeviceState, StateReceiver, StateStore, StateUpdate};
use crate::transport::DeviceTransport;

/// Conditions a blocking command can wait on. One waiter per key; a newer
/// waiter for the same key supersedes the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WaitKey {
    Connected,
    TargetTemperature,
}

struct Waiter {
    id: u64,
    token: CancellationToken,
}

/// How a connected session ended.
enum SessionEnd {
    /// The link dropped or an operation failed; retry after the interval.
    LinkLost,
    /// The caller asked for teardown or shutdown; do not retry.
    Released,
}

struct Inner {
    config: CoordinatorConfig,
    store: StateStore,
    transport: Arc<dyn DeviceTransport>,
    /// Single-flight guard: every GATT operation holds this across the call.
    gatt: Mutex<()>,
    /// Whether the run loop should be maintaining a link right now.
    link_wanted: AtomicBool,
    /// Wakes the run loop out of idle or backoff sleeps.
    kick: Notify,
    shutdown: CancellationToken,
    waiters: StdMutex<HashMap<WaitKey, Waiter>>,
    waiter_seq: AtomicU64,
    /// Status-register patterns already reported, to log each once.
    unseen_patterns: StdMutex<HashSet<u16>>,
}

/// Coordinator for one Volcano device.
///
/// # Example
///
/// ```no_run
/// use volcano_core::{Coordinator, CoordinatorConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = Coordinator::new(CoordinatorConfig::new("CE:9E:A6:43:25:F3"))?;
///     coordinator.start();
///     coordinator.connect_wait().await?;
///
///     coordinator.set_temperature(180.0).await?;
///     coordinator.heat_on().await?;
///
///     let state = coordinator.state();
///     println!("chamber at {:?} °C", state.current_temperature);
///
///     coordinator.stop().await;
///     Ok(())
/// }
/// ```
pub struct Coordinator {
    inner: Arc<Inner>,
    run_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("address", &self.inner.config.address)
            .field("state", &self.inner.store.snapshot().connection_status)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator over the real Bluetooth stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(BleTransport::new(&config));
        Self::with_transport(config, transport)
    }

    /// Create a coordinator over a custom transport (tests use
    /// [`crate::MockTransport`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is invalid.
    pub fn with_transport(
        config: CoordinatorConfig,
        transport: Arc<dyn DeviceTransport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store: StateStore::new(),
                transport,
                gatt: Mutex::new(()),
                link_wanted: AtomicBool::new(false),
                kick: Notify::new(),
                shutdown: CancellationToken::new(),
                waiters: StdMutex::new(HashMap::new()),
                waiter_seq: AtomicU64::new(0),
                unseen_patterns: StdMutex::new(HashSet::new()),
            }),
            run_handle: StdMutex::new(None),
        })
    }

    /// Spawn the background run loop. Idempotent.
    ///
    /// The loop idles until [`connect`](Self::connect) raises the
    /// connection intent.
    pub fn start(&self) {
        let mut guard = self.run_handle.lock().expect("run handle lock poisoned");
        if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        debug!(address = %self.inner.config.address, "starting coordinator run loop");
        let inner = Arc::clone(&self.inner);
        *guard = Some(tokio::spawn(inner.run()));
    }

    /// Stop the run loop and release the link. Terminal: a stopped
    /// coordinator is done for; build a new one to reconnect.
    pub async fn stop(&self) {
        self.inner.link_wanted.store(false, Ordering::SeqCst);
        self.inner.shutdown.cancel();
        self.inner.cancel_all_waiters();

        let handle = self
            .run_handle
            .lock()
            .expect("run handle lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        {
            let _gatt = self.inner.gatt.lock().await;
            let _ = self.inner.transport.disconnect().await;
        }
        self.inner
            .store
            .apply(StateUpdate::status(ConnectionStatus::Disconnected));
    }

    // --- Observation API ---

    /// Current state snapshot.
    pub fn state(&self) -> DeviceState {
        self.inner.store.snapshot()
    }

    /// Subscribe to state changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> StateReceiver {
        self.inner.store.subscribe()
    }

    /// The configured device address.
    pub fn address(&self) -> &str {
        &self.inner.config.address
    }

    // --- Connection commands ---

    /// Request a connection. Returns immediately; the run loop connects
    /// (and keeps reconnecting) in the background. Starts the run loop if
    /// it is not running yet.
    pub fn connect(&self) {
        self.start();
        self.inner.link_wanted.store(true, Ordering::SeqCst);
        self.inner.kick.notify_one();
    }

    /// Request a connection and wait until the link is up, using the
    /// configured command timeout.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if the deadline passes (the background attempt
    /// continues); [`Error::Cancelled`] if superseded by `disconnect` or a
    /// newer `connect_wait`.
    pub async fn connect_wait(&self) -> Result<()> {
        self.connect_wait_with_timeout(self.inner.config.command_timeout)
            .await
    }

    /// [`connect_wait`](Self::connect_wait) with an explicit deadline.
    pub async fn connect_wait_with_timeout(&self, deadline: Duration) -> Result<()> {
        let rx = self.inner.store.subscribe();
        let waiter = self.inner.register_waiter(WaitKey::Connected);
        self.connect();

        let result = if self.state().connection_status == ConnectionStatus::Connected {
            Ok(())
        } else {
            self.inner
                .wait_on(rx, waiter.token.clone(), deadline, "wait until connected", |state| {
                    state.connection_status == ConnectionStatus::Connected
                })
                .await
        };
        self.inner.finish_waiter(WaitKey::Connected, waiter.id);
        result
    }

    /// Release the link and stop reconnecting. Idempotent.
    ///
    /// Cancels every pending blocking wait with [`Error::Cancelled`].
    pub fn disconnect(&self) {
        self.inner.link_wanted.store(false, Ordering::SeqCst);
        self.inner.cancel_all_waiters();
        self.inner.kick.notify_one();
    }

    // --- Device commands ---

    /// Write the heater setpoint.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] when the link is down (commands are never
    /// queued); [`Error::Validation`] outside 40-230 °C, before any write.
    pub async fn set_temperature(&self, celsius: f32) -> Result<()> {
        self.inner.require_connected()?;
        let payload = codec::encode_temperature_setpoint(celsius)?;
        // A new setpoint invalidates whatever a previous caller was
        // waiting for; release them instead of leaving a stale waiter.
        self.inner.cancel_waiter(WaitKey::TargetTemperature);
        self.inner
            .write_gatt(uuids::TARGET_TEMPERATURE, &payload)
            .await
    }

    /// Write the heater setpoint and wait until the chamber reports it
    /// reached, per the configured [`crate::TargetPolicy`]. Uses the
    /// configured command timeout.
    pub async fn set_temperature_wait(&self, celsius: f32) -> Result<()> {
        self.set_temperature_wait_with_timeout(celsius, self.inner.config.command_timeout)
            .await
    }

    /// [`set_temperature_wait`](Self::set_temperature_wait) with an
    /// explicit deadline.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if no qualifying reading arrives in time;
    /// [`Error::Cancelled`] when superseded by `disconnect` or a newer
    /// conflicting setpoint wait.
    pub async fn set_temperature_wait_with_timeout(
        &self,
        celsius: f32,
        deadline: Duration,
    ) -> Result<()> {
        self.inner.require_connected()?;
        let payload = codec::encode_temperature_setpoint(celsius)?;

        // Subscribe and register before the write so a fast ramp cannot
        // slip between the write and the wait.
        let rx = self.inner.store.subscribe();
        let waiter = self.inner.register_waiter(WaitKey::TargetTemperature);
        let policy = self.inner.config.target_policy;

        let result = async {
            self.inner
                .write_gatt(uuids::TARGET_TEMPERATURE, &payload)
                .await?;

            let reached = |state: &DeviceState| {
                state
                    .current_temperature
                    .is_some_and(|current| policy.reached(current, celsius))
            };
            if reached(&self.inner.store.snapshot()) {
                return Ok(());
            }
            self.inner
                .wait_on(
                    rx,
                    waiter.token.clone(),
                    deadline,
                    "wait for target temperature",
                    reached,
                )
                .await
        }
        .await;
        self.inner.finish_waiter(WaitKey::TargetTemperature, waiter.id);
        result
    }

    /// Turn the heater on.
    pub async fn heat_on(&self) -> Result<()> {
        self.inner.require_connected()?;
        self.inner
            .write_gatt(uuids::HEAT_ON, &codec::encode_on_off(true))
            .await
    }

    /// Turn the heater off.
    pub async fn heat_off(&self) -> Result<()> {
        self.inner.require_connected()?;
        self.inner
            .write_gatt(uuids::HEAT_OFF, &codec::encode_on_off(false))
            .await
    }

    /// Turn the pump on.
    pub async fn pump_on(&self) -> Result<()> {
        self.inner.require_connected()?;
        self.inner
            .write_gatt(uuids::PUMP_ON, &codec::encode_on_off(true))
            .await
    }

    /// Turn the pump off.
    pub async fn pump_off(&self) -> Result<()> {
        self.inner.require_connected()?;
        self.inner
            .write_gatt(uuids::PUMP_OFF, &codec::encode_on_off(false))
            .await
    }

    /// Set the LED display brightness (0-100%).
    pub async fn set_led_brightness(&self, percent: u8) -> Result<()> {
        self.inner.require_connected()?;
        let payload = codec::encode_led_brightness(percent)?;
        self.inner.write_gatt(uuids::LED_BRIGHTNESS, &payload).await
    }

    /// Arm or disarm the auto-shutoff timer (30-360 minutes when armed).
    pub async fn set_auto_shutoff(&self, enabled: bool, minutes: u16) -> Result<()> {
        self.inner.require_connected()?;
        let payload = codec::encode_auto_shutoff(enabled, minutes)?;
        self.inner.write_gatt(uuids::AUTO_SHUTOFF, &payload).await
    }

    /// Enable or disable haptic feedback.
    pub async fn set_vibration(&self, enabled: bool) -> Result<()> {
        self.inner.require_connected()?;
        self.inner
            .write_gatt(uuids::VIBRATION, &codec::encode_vibration(enabled))
            .await
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        // Best effort: without this the run loop would keep the transport
        // alive past the coordinator.
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    // --- Run loop ---

    async fn run(self: Arc<Self>) {
        let mut consecutive_failures: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            if !self.link_wanted.load(Ordering::SeqCst) {
                if self.store.snapshot().connection_status != ConnectionStatus::Disconnected {
                    self.store
                        .apply(StateUpdate::status(ConnectionStatus::Disconnected));
                }
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = self.kick.notified() => {}
                }
                continue;
            }

            match Self::establish(&self).await {
                Ok(ingest) => {
                    consecutive_failures = 0;
                    match self.run_session(ingest).await {
                        SessionEnd::Released => continue,
                        SessionEnd::LinkLost => {
                            info!(
                                "link lost; reconnecting in {:?}",
                                self.config.reconnect_interval
                            );
                        }
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        error = %e,
                        attempt = consecutive_failures,
                        "connection attempt failed; retrying in {:?}",
                        self.config.reconnect_interval
                    );
                    let status = if consecutive_failures >= self.config.max_connect_failures {
                        ConnectionStatus::Error
                    } else {
                        ConnectionStatus::Disconnected
                    };
                    self.store.apply(StateUpdate::status(status));
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.config.reconnect_interval) => {}
                _ = self.kick.notified() => {}
            }
        }
        debug!("coordinator run loop exited");
    }

    /// One connection attempt: link, subscribe, seed the snapshot, then
    /// declare `Connected`. Returns the notification ingest task.
    async fn establish(this: &Arc<Self>) -> Result<JoinHandle<()>> {
        this.store
            .apply(StateUpdate::status(ConnectionStatus::Connecting));
        info!(address = %this.config.address, "attempting connection");

        {
            let _gatt = this.gatt.lock().await;
            this.transport.connect().await?;
        }

        let mut stream = {
            let _gatt = this.gatt.lock().await;
            match this.transport.subscribe(uuids::STATUS_REGISTER).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = this.transport.disconnect().await;
                    return Err(e);
                }
            }
        };

        let ingest_inner = Arc::clone(this);
        let ingest = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                ingest_inner.ingest_status_frame(&frame);
            }
            debug!("status notification stream ended");
        });

        // Seed every characteristic before declaring Connected; individual
        // misses are tolerated (undocumented firmware drops fields).
        for &characteristic in uuids::INITIAL_READ_CHARACTERISTICS {
            match this.read_gatt(characteristic).await {
                Ok(data) => this.apply_frame(characteristic, &data),
                Err(e) => debug!(%characteristic, error = %e, "initial read failed"),
            }
        }
        this.refresh_rssi().await;

        this.store
            .apply(StateUpdate::status(ConnectionStatus::Connected));
        info!(address = %this.config.address, "connected");
        Ok(ingest)
    }

    /// Poll loop for a live session. Resolves when the link drops or the
    /// caller releases it.
    async fn run_session(&self, mut ingest: JoinHandle<()>) -> SessionEnd {
        let mut temp_tick = interval(self.config.temp_poll_interval);
        temp_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut slow_tick = interval(self.config.slow_poll_interval);
        slow_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The initial read just covered the slow set.
        slow_tick.tick().await;

        let end = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break SessionEnd::Released,
                _ = self.kick.notified() => {
                    if !self.link_wanted.load(Ordering::SeqCst) {
                        break SessionEnd::Released;
                    }
                }
                _ = &mut ingest => {
                    // Notification stream ended underneath us.
                    break SessionEnd::LinkLost;
                }
                _ = temp_tick.tick() => {
                    if self.poll_temperature().await.is_err() {
                        break SessionEnd::LinkLost;
                    }
                }
                _ = slow_tick.tick() => {
                    if self.poll_slow().await.is_err() {
                        break SessionEnd::LinkLost;
                    }
                }
            }
        };

        ingest.abort();
        {
            let _gatt = self.gatt.lock().await;
            let _ = self.transport.disconnect().await;
        }
        // Link status flips; every other field stays frozen at its last
        // known value until the next successful read.
        self.store
            .apply(StateUpdate::status(ConnectionStatus::Disconnected));
        if matches!(end, SessionEnd::Released) {
            self.cancel_all_waiters();
        }
        end
    }

    /// Read the chamber temperature. A transport failure means link loss;
    /// a malformed frame does not.
    async fn poll_temperature(&self) -> Result<()> {
        let data = self.read_gatt(uuids::CURRENT_TEMPERATURE).await?;
        self.apply_frame(uuids::CURRENT_TEMPERATURE, &data);
        Ok(())
    }

    /// Refresh the slow-changing characteristics.
    async fn poll_slow(&self) -> Result<()> {
        for characteristic in [
            uuids::HOURS_OF_OPERATION,
            uuids::AUTO_SHUTOFF,
            uuids::LED_BRIGHTNESS,
            uuids::TARGET_TEMPERATURE,
        ] {
            match self.read_gatt(characteristic).await {
                Ok(data) => self.apply_frame(characteristic, &data),
                // A missing characteristic is a firmware quirk, not loss.
                Err(Error::CharacteristicNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        self.refresh_rssi().await;
        Ok(())
    }

    async fn refresh_rssi(&self) {
        let rssi = {
            let _gatt = self.gatt.lock().await;
            self.transport.rssi().await
        };
        if let Ok(Some(dbm)) = rssi {
            self.store.apply(StateUpdate {
                signal_strength_dbm: Some(dbm),
                ..Default::default()
            });
        }
    }

    // --- Ingest ---

    /// Decode one characteristic frame into a state update. Malformed
    /// frames update nothing and are reported through the log.
    fn apply_frame(&self, characteristic: Uuid, data: &[u8]) {
        let update = if characteristic == uuids::CURRENT_TEMPERATURE {
            match codec::decode_temperature(data) {
                Ok(celsius) => StateUpdate::temperature(celsius),
                Err(e) => return self.report_decode_error("temperature", &e),
            }
        } else if characteristic == uuids::TARGET_TEMPERATURE {
            match codec::decode_temperature(data) {
                Ok(celsius) => StateUpdate {
                    target_temperature: Some(celsius),
                    ..Default::default()
                },
                Err(e) => return self.report_decode_error("target temperature", &e),
            }
        } else if characteristic == uuids::STATUS_REGISTER {
            return self.ingest_status_frame(data);
        } else if characteristic == uuids::LED_BRIGHTNESS {
            match codec::decode_led_brightness(data) {
                Ok(percent) => StateUpdate {
                    led_brightness: Some(percent),
                    ..Default::default()
                },
                Err(e) => return self.report_decode_error("LED brightness", &e),
            }
        } else if characteristic == uuids::AUTO_SHUTOFF {
            match codec::decode_auto_shutoff(data) {
                Ok(shutoff) => StateUpdate {
                    auto_shutoff: Some(shutoff),
                    ..Default::default()
                },
                Err(e) => return self.report_decode_error("auto shutoff", &e),
            }
        } else if characteristic == uuids::HOURS_OF_OPERATION {
            match codec::decode_operating_hours(data) {
                Ok(time) => StateUpdate {
                    operating_time: Some(time),
                    ..Default::default()
                },
                Err(e) => return self.report_decode_error("operating hours", &e),
            }
        } else if characteristic == uuids::FIRMWARE_VERSION {
            StateUpdate {
                firmware_version: Some(codec::decode_firmware_string(data)),
                ..Default::default()
            }
        } else if characteristic == uuids::BLE_FIRMWARE_VERSION {
            StateUpdate {
                ble_firmware_version: Some(codec::decode_firmware_string(data)),
                ..Default::default()
            }
        } else if characteristic == uuids::SERIAL_NUMBER {
            StateUpdate {
                serial_number: Some(codec::decode_firmware_string(data)),
                ..Default::default()
            }
        } else {
            debug!(%characteristic, "frame for unhandled characteristic");
            return;
        };
        self.store.apply(update);
    }

    /// Decode a status-register frame and apply the flags. Unrecognized
    /// patterns are logged once per distinct register value and decode to
    /// `Unknown`; the pipeline keeps going either way.
    fn ingest_status_frame(&self, data: &[u8]) {
        let flags = match codec::decode_status_flags(data) {
            Ok(flags) => flags,
            Err(e) => return self.report_decode_error("status register", &e),
        };

        if let Some(register) = flags.unrecognized {
            let fresh = self
                .unseen_patterns
                .lock()
                .expect("pattern lock poisoned")
                .insert(register);
            if fresh {
                warn!(
                    "unrecognized status-register pattern {register:#06x}; affected fields read as UNKNOWN"
                );
            }
        }

        self.store
            .apply(StateUpdate::flags(flags.heat, flags.pump, flags.fan));
    }

    fn report_decode_error(&self, what: &str, error: &volcano_types::ParseError) {
        warn!(error = %error, "dropping malformed {what} frame");
    }

    // --- Link helpers ---

    fn require_connected(&self) -> Result<()> {
        if self.store.snapshot().connection_status == ConnectionStatus::Connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    async fn read_gatt(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let _gatt = self.gatt.lock().await;
        self.transport.read(characteristic).await
    }

    async fn write_gatt(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let _gatt = self.gatt.lock().await;
        self.transport.write(characteristic, data).await
    }

    // --- Waiters ---

    fn register_waiter(&self, key: WaitKey) -> Waiter {
        let id = self.waiter_seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut waiters = self.waiters.lock().expect("waiter lock poisoned");
        if let Some(superseded) = waiters.insert(
            key,
            Waiter {
                id,
                token: token.clone(),
            },
        ) {
            debug!(?key, "superseding pending waiter");
            superseded.token.cancel();
        }
        Waiter { id, token }
    }

    fn finish_waiter(&self, key: WaitKey, id: u64) {
        let mut waiters = self.waiters.lock().expect("waiter lock poisoned");
        if waiters.get(&key).is_some_and(|waiter| waiter.id == id) {
            waiters.remove(&key);
        }
    }

    fn cancel_waiter(&self, key: WaitKey) {
        let mut waiters = self.waiters.lock().expect("waiter lock poisoned");
        if let Some(waiter) = waiters.remove(&key) {
            waiter.token.cancel();
        }
    }

    fn cancel_all_waiters(&self) {
        let mut waiters = self.waiters.lock().expect("waiter lock poisoned");
        for (_, waiter) in waiters.drain() {
            waiter.token.cancel();
        }
    }

    /// Subscribe-then-await: resolve when `predicate` holds for a state
    /// change, the deadline passes, or the waiter token is cancelled.
    async fn wait_on(
        &self,
        mut rx: StateReceiver,
        token: CancellationToken,
        deadline: Duration,
        operation: &str,
        predicate: impl Fn(&DeviceState) -> bool,
    ) -> Result<()> {
        let timer = sleep(deadline);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                _ = &mut timer => return Err(Error::timeout(operation, deadline)),
                change = rx.recv() => match change {
                    Ok(change) => {
                        if predicate(&change.state) {
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Dropped behind ingestion; resync from the snapshot.
                        if predicate(&self.store.snapshot()) {
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::Cancelled),
                }
            }
        }
    }
}
