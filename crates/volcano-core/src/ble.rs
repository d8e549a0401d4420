//! btleplug-backed transport.
//!
//! [`BleTransport`] implements [`DeviceTransport`] against a real adapter.
//! The device address is fixed at construction; `connect` runs a bounded
//! scan purely to resolve that address to a peripheral handle (platforms
//! do not hand out peripherals by address directly), then connects,
//! discovers services, and caches characteristics for O(1) lookup.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{DeviceTransport, NotificationStream};

/// Poll step while waiting for the configured address to appear.
const LOOKUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

struct Link {
    /// Kept alive for the lifetime of the peripheral connection; the
    /// peripheral may hold internal references to the adapter.
    #[allow(dead_code)]
    adapter: Adapter,
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, Characteristic>,
}

/// A [`DeviceTransport`] over btleplug for one fixed device address.
pub struct BleTransport {
    address: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    link: RwLock<Option<Link>>,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Extract the identifier string from a platform peripheral id.
///
/// macOS exposes UUIDs, other platforms MAC addresses; neither implements
/// `Display`, so this goes through the `Debug` form.
fn format_peripheral_id(id: &btleplug::platform::PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Case- and separator-insensitive address comparison; also accepts the
/// platform peripheral id (macOS exposes UUIDs instead of MAC addresses).
fn matches_address(configured: &str, candidate: &str) -> bool {
    fn normalize(s: &str) -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase()
    }
    normalize(configured) == normalize(candidate)
}

impl BleTransport {
    /// Create a transport for the address in `config`.
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            address: config.address.clone(),
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            link: RwLock::new(None),
        }
    }

    /// The configured device address.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn find_peripheral(&self, adapter: &Adapter) -> Result<Peripheral> {
        adapter.start_scan(ScanFilter::default()).await?;

        let deadline = tokio::time::Instant::now() + self.connect_timeout;
        let found = 'lookup: loop {
            for peripheral in adapter.peripherals().await? {
                let by_id = matches_address(&self.address, &format_peripheral_id(&peripheral.id()));
                let by_addr = peripheral
                    .properties()
                    .await
                    .ok()
                    .flatten()
                    .is_some_and(|p| matches_address(&self.address, &p.address.to_string()));
                if by_id || by_addr {
                    break 'lookup Some(peripheral);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                break 'lookup None;
            }
            sleep(LOOKUP_POLL_INTERVAL).await;
        };

        if let Err(e) = adapter.stop_scan().await {
            debug!("stop_scan failed: {}", e);
        }

        found.ok_or_else(|| {
            Error::connection_failed(
                Some(self.address.clone()),
                ConnectionFailureReason::DeviceNotFound,
            )
        })
    }

    async fn with_characteristic(&self, uuid: Uuid) -> Result<(Peripheral, Characteristic)> {
        let guard = self.link.read().await;
        let link = guard.as_ref().ok_or(Error::NotConnected)?;
        let characteristic = link
            .characteristics
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(uuid.to_string()))?;
        Ok((link.peripheral.clone(), characteristic))
    }
}

#[async_trait]
impl DeviceTransport for BleTransport {
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    async fn connect(&self) -> Result<()> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::connection_failed(
                    Some(self.address.clone()),
                    ConnectionFailureReason::AdapterUnavailable,
                )
            })?;

        let peripheral = self.find_peripheral(&adapter).await?;

        info!("Connecting to device...");
        timeout(self.connect_timeout, peripheral.connect())
            .await
            .map_err(|_| {
                Error::connection_failed(
                    Some(self.address.clone()),
                    ConnectionFailureReason::Timeout,
                )
            })??;

        debug!("Discovering services...");
        timeout(self.connect_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", self.connect_timeout))??;

        let mut characteristics = HashMap::new();
        for service in peripheral.services() {
            debug!("  Service: {}", service.uuid);
            for characteristic in &service.characteristics {
                characteristics.insert(characteristic.uuid, characteristic.clone());
            }
        }
        debug!("Cached {} characteristics", characteristics.len());

        *self.link.write().await = Some(Link {
            adapter,
            peripheral,
            characteristics,
        });
        info!("Connected");
        Ok(())
    }

    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    async fn disconnect(&self) -> Result<()> {
        if let Some(link) = self.link.write().await.take() {
            if let Err(e) = link.peripheral.disconnect().await {
                warn!("disconnect failed (device may already be gone): {}", e);
            }
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        let guard = self.link.read().await;
        if let Some(link) = guard.as_ref() {
            link.peripheral.is_connected().await.unwrap_or(false)
        } else {
            false
        }
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let (peripheral, char) = self.with_characteristic(characteristic).await?;
        let data = timeout(self.read_timeout, peripheral.read(&char))
            .await
            .map_err(|_| {
                Error::timeout(format!("read characteristic {}", characteristic), self.read_timeout)
            })??;
        Ok(data)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let (peripheral, char) = self.with_characteristic(characteristic).await?;
        timeout(
            self.write_timeout,
            peripheral.write(&char, data, WriteType::WithResponse),
        )
        .await
        .map_err(|_| {
            Error::timeout(
                format!("write characteristic {}", characteristic),
                self.write_timeout,
            )
        })??;
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        let (peripheral, char) = self.with_characteristic(characteristic).await?;
        peripheral.subscribe(&char).await?;

        let stream = peripheral.notifications().await?;
        Ok(Box::pin(stream.filter_map(move |notification| async move {
            (notification.uuid == characteristic).then_some(notification.value)
        })))
    }

    async fn rssi(&self) -> Result<Option<i16>> {
        let guard = self.link.read().await;
        let link = guard.as_ref().ok_or(Error::NotConnected)?;
        let properties = link.peripheral.properties().await?;
        Ok(properties.and_then(|p| p.rssi))
    }
}
