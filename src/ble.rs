use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{IfitError, Result};
use crate::session::Session;
use crate::transport::Transport;
use crate::types::SessionConfig;
use crate::{IFIT_ADVERTISEMENT_MARKER, IFIT_RX_CHAR_UUID, IFIT_SERVICE_UUID, IFIT_TX_CHAR_UUID};

/// How long a discovery scan listens for advertisements
const SCAN_DURATION: Duration = Duration::from_secs(10);

/// Settle time after connecting; consoles re-register their GATT table
/// shortly after the link comes up and early discovery sees a stale table
const POST_CONNECT_SETTLE: Duration = Duration::from_millis(600);

/// Capacity of the notification channel between the pump task and the
/// session; responses are at most 15 chunks, so this never backpressures
const NOTIFICATION_BUFFER: usize = 64;

/// An iFit console found during scanning
#[derive(Debug, Clone)]
pub struct IfitDevice {
    peripheral: Peripheral,
    /// Advertised local name, when present
    pub name: Option<String>,
    /// Signal strength at scan time
    pub rssi: Option<i16>,
    /// Manufacturer data payload that carried the iFit marker
    pub manufacturer_data: Vec<u8>,
}

impl IfitDevice {
    /// Bluetooth address of the console
    #[must_use]
    pub fn address(&self) -> BDAddr {
        self.peripheral.address()
    }

    /// Whether this console's advertisement matches a 4-character pairing
    /// code shown on its display
    #[must_use]
    pub fn matches_console_code(&self, code: &str) -> bool {
        console_code_suffix(code)
            .is_ok_and(|suffix| self.manufacturer_data.ends_with(&suffix))
    }
}

/// Scan for iFit consoles
///
/// Consoles do not advertise the iFit service UUID; they are recognized by
/// the `0xDD` marker in their manufacturer data, two bytes from the end.
///
/// # Errors
///
/// Returns [`IfitError::DeviceNotFound`] if no Bluetooth adapter is
/// available, or [`IfitError::Ble`] for scanner failures.
pub async fn scan(duration: Duration) -> Result<Vec<IfitDevice>> {
    info!("scanning for iFit devices");

    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    let Some(central) = adapters.first() else {
        return Err(IfitError::DeviceNotFound);
    };

    central.start_scan(ScanFilter::default()).await?;
    sleep(duration).await;
    central.stop_scan().await?;

    let mut devices = Vec::new();
    for peripheral in central.peripherals().await? {
        let Ok(Some(properties)) = peripheral.properties().await else {
            continue;
        };
        let Some(manufacturer_data) = properties
            .manufacturer_data
            .values()
            .find(|payload| is_ifit_advertisement(payload))
            .cloned()
        else {
            continue;
        };
        debug!(address = %peripheral.address(), name = ?properties.local_name, "found iFit device");
        devices.push(IfitDevice {
            peripheral,
            name: properties.local_name,
            rssi: properties.rssi,
            manufacturer_data,
        });
    }

    info!("scan completed, found {} iFit device(s)", devices.len());
    Ok(devices)
}

/// Scan for the console displaying the given 4-character pairing code
///
/// # Errors
///
/// Returns [`IfitError::InvalidParameters`] for a malformed code and
/// [`IfitError::DeviceNotFound`] if no matching console is in range.
pub async fn find_by_console_code(code: &str, duration: Duration) -> Result<IfitDevice> {
    let suffix = console_code_suffix(code)?;
    scan(duration)
        .await?
        .into_iter()
        .find(|device| device.manufacturer_data.ends_with(&suffix))
        .ok_or(IfitError::DeviceNotFound)
}

/// Connect to a scanned console and establish a [`Session`]
///
/// Connects, waits out the console's GATT re-registration, validates the
/// iFit service and characteristics, subscribes to TX notifications and
/// starts the notification pump.
///
/// # Errors
///
/// Returns [`IfitError::Timeout`] if connection and discovery exceed
/// [`SessionConfig::connect_timeout`], [`IfitError::Transport`] if the
/// device lacks the iFit characteristics, or [`IfitError::Ble`] for BLE
/// failures.
pub async fn connect_device(device: &IfitDevice, config: SessionConfig) -> Result<Session> {
    info!(address = %device.address(), "connecting to iFit device");
    let peripheral = device.peripheral.clone();

    timeout(config.connect_timeout, async {
        peripheral.connect().await?;
        sleep(POST_CONNECT_SETTLE).await;
        peripheral.discover_services().await?;
        Ok::<(), IfitError>(())
    })
    .await
    .map_err(|_| IfitError::Timeout {
        timeout: config.connect_timeout,
    })??;

    let service_uuid = parse_uuid(IFIT_SERVICE_UUID)?;
    let rx_uuid = parse_uuid(IFIT_RX_CHAR_UUID)?;
    let tx_uuid = parse_uuid(IFIT_TX_CHAR_UUID)?;

    let services = peripheral.services();
    let service = services
        .iter()
        .find(|s| s.uuid == service_uuid)
        .ok_or_else(|| IfitError::Transport("iFit service not found on device".to_string()))?;
    let rx_char = find_characteristic(service, rx_uuid, "RX")?;
    let tx_char = find_characteristic(service, tx_uuid, "TX")?;

    // Subscribe before the first request; responses only arrive as
    // notifications
    peripheral.subscribe(&tx_char).await?;

    let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_BUFFER);
    tokio::spawn(pump_notifications(peripheral.clone(), tx_uuid, notify_tx));

    info!(address = %device.address(), "connected");
    Ok(Session::new(
        Box::new(BleTransport {
            peripheral,
            rx_char,
        }),
        notify_rx,
        config,
    ))
}

/// Scan and connect to the first iFit console in range
///
/// # Errors
///
/// As for [`scan`] and [`connect_device`].
pub async fn connect_first(config: SessionConfig) -> Result<Session> {
    let devices = scan(SCAN_DURATION).await?;
    let device = devices.first().ok_or(IfitError::DeviceNotFound)?;
    connect_device(device, config).await
}

/// Scan for the console showing `code` on its display and connect to it
///
/// # Errors
///
/// As for [`find_by_console_code`] and [`connect_device`].
pub async fn connect_by_console_code(code: &str, config: SessionConfig) -> Result<Session> {
    let device = find_by_console_code(code, SCAN_DURATION).await?;
    connect_device(&device, config).await
}

/// [`Transport`] over a connected btleplug peripheral
struct BleTransport {
    peripheral: Peripheral,
    rx_char: Characteristic,
}

#[async_trait]
impl Transport for BleTransport {
    async fn write_chunk(&self, chunk: &[u8]) -> Result<()> {
        debug!("-> {:02X?}", chunk);
        self.peripheral
            .write(&self.rx_char, chunk, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// Forward TX-characteristic notifications into the session's channel
///
/// Runs until the peripheral disconnects or the session is dropped. The
/// channel closing on exit is how the session learns the transport died.
async fn pump_notifications(
    peripheral: Peripheral,
    tx_uuid: Uuid,
    sender: mpsc::Sender<Vec<u8>>,
) {
    let mut stream = match peripheral.notifications().await {
        Ok(stream) => stream,
        Err(error) => {
            warn!(%error, "failed to open notification stream");
            return;
        }
    };
    while let Some(notification) = stream.next().await {
        if notification.uuid != tx_uuid {
            continue;
        }
        debug!("<- {:02X?}", notification.value);
        if sender.send(notification.value).await.is_err() {
            break;
        }
    }
    debug!("notification pump stopped");
}

/// Advertisement filter: manufacturer data ends with `DD` plus the
/// two-byte pairing code
fn is_ifit_advertisement(payload: &[u8]) -> bool {
    payload.len() >= 3 && payload[payload.len() - 3] == IFIT_ADVERTISEMENT_MARKER
}

/// Suffix the advertisement carries for a console pairing code
///
/// The displayed code is a 4-character hex string; its two bytes appear
/// reversed after the `0xDD` marker.
fn console_code_suffix(code: &str) -> Result<[u8; 3]> {
    let cleaned = code.trim().to_ascii_lowercase();
    if cleaned.len() != 4 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IfitError::InvalidParameters(
            "console code must be a 4-character hex string".to_string(),
        ));
    }
    let high = u8::from_str_radix(&cleaned[0..2], 16)
        .map_err(|e| IfitError::InvalidParameters(e.to_string()))?;
    let low = u8::from_str_radix(&cleaned[2..4], 16)
        .map_err(|e| IfitError::InvalidParameters(e.to_string()))?;
    Ok([IFIT_ADVERTISEMENT_MARKER, low, high])
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| IfitError::Transport(format!("invalid UUID {text}: {e}")))
}

fn find_characteristic(
    service: &btleplug::api::Service,
    uuid: Uuid,
    label: &str,
) -> Result<Characteristic> {
    service
        .characteristics
        .iter()
        .find(|c| c.uuid == uuid)
        .cloned()
        .ok_or_else(|| IfitError::Transport(format!("{label} characteristic not found on device")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_parsing() {
        assert!(parse_uuid(IFIT_SERVICE_UUID).is_ok());
        assert!(parse_uuid(IFIT_RX_CHAR_UUID).is_ok());
        assert!(parse_uuid(IFIT_TX_CHAR_UUID).is_ok());
    }

    #[test]
    fn test_console_code_suffix() {
        // Code "50dd" on the display advertises ... DD DD 50
        assert_eq!(console_code_suffix("50dd").unwrap(), [0xDD, 0xDD, 0x50]);
        assert_eq!(console_code_suffix(" 12AB ").unwrap(), [0xDD, 0xAB, 0x12]);
        assert!(console_code_suffix("xyz").is_err());
        assert!(console_code_suffix("12345").is_err());
    }

    #[test]
    fn test_advertisement_filter() {
        assert!(is_ifit_advertisement(&[0x01, 0x02, 0xDD, 0xAB, 0x12]));
        assert!(is_ifit_advertisement(&[0xDD, 0xAB, 0x12]));
        assert!(!is_ifit_advertisement(&[0xAB, 0x12]));
        assert!(!is_ifit_advertisement(&[0x01, 0x02, 0xDC, 0xAB, 0x12]));
    }
}
