//! USB HID transport for real Open8055 boards (feature `hardware-usb`).
//!
//! hidapi is blocking, so a dedicated reader thread polls the device with a
//! short timeout and forwards reports over a channel; writes run on the
//! blocking thread pool. The device handle is shared between both behind a
//! mutex.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::thread;

use hidapi::{HidApi, HidDevice};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use open8055_core::{
    CardAddress,
    constants::{HID_MESSAGE_SIZE, USB_PRODUCT_ID_BASE, USB_VENDOR_ID},
};
use open8055_protocol::{RawReport, Report};

use crate::{DeviceInfo, HardwareError, Result, traits::CardTransport};

/// How long one blocking read may hold the device lock.
const READ_TIMEOUT_MS: i32 = 10;

/// Reader thread → transport channel depth.
const REPORT_QUEUE: usize = 64;

/// An Open8055 board attached over USB.
pub struct HidCard {
    api: Arc<Mutex<HidApi>>,
    device: Arc<Mutex<HidDevice>>,
    reports: mpsc::Receiver<Result<RawReport>>,
    stop: Arc<AtomicBool>,
    info: DeviceInfo,
}

impl std::fmt::Debug for HidCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidCard").field("info", &self.info).finish()
    }
}

impl HidCard {
    /// Open the card with the given address.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InitializationFailed` if hidapi cannot be
    /// initialised or no card with that address is attached.
    pub fn open(address: CardAddress) -> Result<Self> {
        let api = HidApi::new().map_err(|e| HardwareError::initialization_failed(e.to_string()))?;
        let product_id = product_id(address);

        let device = api.open(USB_VENDOR_ID, product_id).map_err(|e| {
            HardwareError::initialization_failed(format!("card{address}: {e}"))
        })?;

        let mut info = DeviceInfo::new(format!("Open8055 card{address}"), address)
            .with_usb_id(USB_VENDOR_ID, product_id);
        if let Ok(Some(serial)) = device.get_serial_number_string() {
            info = info.with_serial_number(serial);
        }
        info!(card = %address, product_id = format!("{product_id:#06x}"), "opened Open8055 card");

        let device = Arc::new(Mutex::new(device));
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, reports) = mpsc::channel(REPORT_QUEUE);

        let reader_device = Arc::clone(&device);
        let reader_stop = Arc::clone(&stop);
        thread::Builder::new()
            .name(format!("open8055-card{address}"))
            .spawn(move || reader_loop(reader_device, reader_stop, tx))?;

        Ok(Self {
            api: Arc::new(Mutex::new(api)),
            device,
            reports,
            stop,
            info,
        })
    }
}

fn product_id(address: CardAddress) -> u16 {
    USB_PRODUCT_ID_BASE + u16::from(address.as_u8())
}

fn reader_loop(
    device: Arc<Mutex<HidDevice>>,
    stop: Arc<AtomicBool>,
    tx: mpsc::Sender<Result<RawReport>>,
) {
    let mut buffer = [0u8; HID_MESSAGE_SIZE];

    while !stop.load(Ordering::Relaxed) {
        let read = {
            let Ok(guard) = device.lock() else {
                break;
            };
            guard.read_timeout(&mut buffer, READ_TIMEOUT_MS)
        };

        let item = match read {
            Ok(0) => continue,
            Ok(n) if n == HID_MESSAGE_SIZE => Ok(buffer),
            Ok(n) => Err(HardwareError::invalid_data(format!(
                "short HID report ({n} bytes)"
            ))),
            Err(e) => {
                warn!(error = %e, "HID read failed, stopping reader");
                let _ = tx.blocking_send(Err(HardwareError::disconnected(e.to_string())));
                break;
            }
        };

        if tx.blocking_send(item).is_err() {
            break;
        }
    }

    debug!("HID reader thread exiting");
}

impl Drop for HidCard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl CardTransport for HidCard {
    async fn send_report(&mut self, report: &Report) -> Result<()> {
        // hidapi expects the report id in front of the payload
        let mut frame = [0u8; HID_MESSAGE_SIZE + 1];
        frame[1..].copy_from_slice(&report.encode());

        let device = Arc::clone(&self.device);
        let written = tokio::task::spawn_blocking(move || {
            let guard = device
                .lock()
                .map_err(|_| HardwareError::communication("HID device lock poisoned"))?;
            guard
                .write(&frame)
                .map_err(|e| HardwareError::communication(e.to_string()))
        })
        .await
        .map_err(|e| HardwareError::communication(e.to_string()))??;

        if written < HID_MESSAGE_SIZE {
            return Err(HardwareError::communication(format!(
                "short HID write ({written} bytes)"
            )));
        }
        Ok(())
    }

    async fn recv_report(&mut self) -> Result<Report> {
        match self.reports.recv().await {
            Some(Ok(raw)) => Ok(Report::decode(&raw)?),
            Some(Err(e)) => Err(e),
            None => Err(HardwareError::disconnected(self.info.name.clone())),
        }
    }

    async fn card_present(&self, address: CardAddress) -> Result<bool> {
        let mut api = self
            .api
            .lock()
            .map_err(|_| HardwareError::communication("hidapi lock poisoned"))?;
        api.refresh_devices()
            .map_err(|e| HardwareError::communication(e.to_string()))?;

        let wanted = product_id(address);
        Ok(api
            .device_list()
            .any(|d| d.vendor_id() == USB_VENDOR_ID && d.product_id() == wanted))
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(self.info.clone())
    }
}
