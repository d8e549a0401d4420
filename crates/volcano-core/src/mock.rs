//! Mock transport for testing without BLE hardware.
//!
//! [`MockTransport`] implements [`DeviceTransport`] with scripted reads,
//! pushable notifications, failure injection, and write recording, so the
//! coordinator's connection lifecycle and command paths can be exercised
//! deterministically in unit and integration tests.
//!
//! # Features
//!
//! - **Scripted reads**: set per-characteristic frames with [`set_read`](MockTransport::set_read)
//! - **Failure injection**: fail the next N connects, or all reads/writes
//! - **Latency simulation**: artificial connect delay
//! - **Link-loss simulation**: [`drop_link`](MockTransport::drop_link)
//! - **Write recording**: every write is captured for assertions

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{DeviceTransport, NotificationStream};

/// A scriptable in-memory GATT link.
pub struct MockTransport {
    address: String,
    connected: AtomicBool,
    reads: Mutex<HashMap<Uuid, Vec<u8>>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    notify_senders: Mutex<Vec<(Uuid, mpsc::UnboundedSender<Vec<u8>>)>>,
    remaining_connect_failures: AtomicU32,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    connect_latency_ms: AtomicU64,
    connect_count: AtomicU32,
    read_count: AtomicU32,
    rssi: Mutex<Option<i16>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("address", &self.address)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock with no scripted reads.
    pub fn new() -> Self {
        Self {
            address: format!("MOCK-{:06X}", rand::random::<u32>() % 0xFF_FFFF),
            connected: AtomicBool::new(false),
            reads: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            notify_senders: Mutex::new(Vec::new()),
            remaining_connect_failures: AtomicU32::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            connect_latency_ms: AtomicU64::new(0),
            connect_count: AtomicU32::new(0),
            read_count: AtomicU32::new(0),
            rssi: Mutex::new(Some(-55)),
        }
    }

    /// The fake address of this mock.
    pub fn address(&self) -> &str {
        &self.address
    }

    // --- Scripting ---

    /// Script the frame returned by reads of `characteristic`.
    pub fn set_read(&self, characteristic: Uuid, data: impl Into<Vec<u8>>) {
        self.reads
            .lock()
            .expect("mock lock poisoned")
            .insert(characteristic, data.into());
    }

    /// Remove the scripted frame for `characteristic`.
    pub fn clear_read(&self, characteristic: Uuid) {
        self.reads
            .lock()
            .expect("mock lock poisoned")
            .remove(&characteristic);
    }

    /// Fail the next `n` connect attempts before succeeding again.
    pub fn fail_next_connects(&self, n: u32) {
        self.remaining_connect_failures.store(n, Ordering::Relaxed);
    }

    /// Make all reads fail until cleared.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make all writes fail until cleared.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Add an artificial delay to connect attempts.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set the reported signal strength.
    pub fn set_rssi(&self, rssi: Option<i16>) {
        *self.rssi.lock().expect("mock lock poisoned") = rssi;
    }

    /// Simulate an unexpected link loss: the link goes down and all
    /// notification streams end.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.notify_senders
            .lock()
            .expect("mock lock poisoned")
            .clear();
    }

    /// Push a notification frame to every subscriber of `characteristic`.
    pub fn push_notification(&self, characteristic: Uuid, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let senders = self.notify_senders.lock().expect("mock lock poisoned");
        for (uuid, tx) in senders.iter() {
            if *uuid == characteristic {
                let _ = tx.send(data.clone());
            }
        }
    }

    // --- Inspection ---

    /// All recorded writes in order.
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().expect("mock lock poisoned").clone()
    }

    /// Payloads written to one characteristic, in order.
    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .expect("mock lock poisoned")
            .iter()
            .filter(|(uuid, _)| *uuid == characteristic)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Number of connect attempts made (including failed ones).
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }

    /// Number of successful reads served.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.remaining_connect_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_connect_failures
                .fetch_sub(1, Ordering::Relaxed);
            return Err(Error::connection_failed(
                Some(self.address.clone()),
                ConnectionFailureReason::Rejected,
            ));
        }

        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.drop_link();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.check_connected()?;
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(Error::Bluetooth(btleplug::Error::NotConnected));
        }

        let reads = self.reads.lock().expect("mock lock poisoned");
        match reads.get(&characteristic) {
            Some(data) => {
                self.read_count.fetch_add(1, Ordering::Relaxed);
                Ok(data.clone())
            }
            None => Err(Error::characteristic_not_found(characteristic.to_string())),
        }
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.check_connected()?;
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::Bluetooth(btleplug::Error::NotConnected));
        }

        self.writes
            .lock()
            .expect("mock lock poisoned")
            .push((characteristic, data.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        self.check_connected()?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.notify_senders
            .lock()
            .expect("mock lock poisoned")
            .push((characteristic, tx));

        Ok(Box::pin(futures::stream::poll_fn(move |cx| {
            rx.poll_recv(cx)
        })))
    }

    async fn rssi(&self) -> Result<Option<i16>> {
        self.check_connected()?;
        Ok(*self.rssi.lock().expect("mock lock poisoned"))
    }
}
