//! An in-memory [`BleTransport`] that plays back a scripted band.
//!
//! Used by the test suite, and handy for exercising a session without hardware.
//! Clones share state, so a test can keep one handle to inject notifications
//! and inspect writes while the session owns another.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use async_trait::async_trait;
use uuid::Uuid;

use crate::device::constants::ids;
use crate::device::registry::{self, resolve};
use crate::device::transport::{Advertisement, BleTransport, Characteristic, Notification, Service};
use crate::error::TransportError;

/// The standard battery service and level characteristic, which the band also exposes.
pub const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
pub const BATTERY_LEVEL_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Value handles of [`SimulatedDevice::myo`], as observed on a real band.
pub mod handles {
    pub const BATTERY_LEVEL: u16 = 0x11;
    pub const MYO_INFO: u16 = 0x14;
    pub const FIRMWARE_VERSION: u16 = 0x17;
    pub const COMMAND: u16 = 0x19;
    pub const IMU_DATA: u16 = 0x1c;
    pub const MOTION_EVENT: u16 = 0x1f;
    pub const CLASSIFIER_EVENT: u16 = 0x23;
    pub const EMG_DATA: [u16; 4] = [0x2b, 0x2e, 0x31, 0x34];
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    services: Vec<(Uuid, Vec<Characteristic>)>,
    fail_connect: bool,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, uuid: Uuid, characteristics: &[(Uuid, u16)]) -> Self {
        let characteristics = characteristics
            .iter()
            .map(|(uuid, value_handle)| Characteristic { uuid: *uuid, value_handle: *value_handle })
            .collect();
        self.services.push((uuid, characteristics));
        self
    }

    /// Every connection attempt to this device fails.
    pub fn failing(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// The GATT layout of a Myo band.
    pub fn myo() -> Self {
        SimulatedDevice::new()
            .with_service(BATTERY_SERVICE, &[(BATTERY_LEVEL_CHARACTERISTIC, handles::BATTERY_LEVEL)])
            .with_service(resolve(ids::CONTROL_SERVICE), &[
                (resolve(ids::MYO_INFO_CHARACTERISTIC), handles::MYO_INFO),
                (resolve(ids::FIRMWARE_VERSION_CHARACTERISTIC), handles::FIRMWARE_VERSION),
                (resolve(ids::COMMAND_CHARACTERISTIC), handles::COMMAND),
            ])
            .with_service(resolve(ids::IMU_DATA_SERVICE), &[
                (resolve(ids::IMU_DATA_CHARACTERISTIC), handles::IMU_DATA),
                (resolve(ids::MOTION_EVENT_CHARACTERISTIC), handles::MOTION_EVENT),
            ])
            .with_service(resolve(ids::CLASSIFIER_SERVICE), &[
                (resolve(ids::CLASSIFIER_EVENT_CHARACTERISTIC), handles::CLASSIFIER_EVENT),
            ])
            .with_service(resolve(ids::EMG_DATA_SERVICE), &[
                (resolve(ids::EMG_DATA0_CHARACTERISTIC), handles::EMG_DATA[0]),
                (resolve(ids::EMG_DATA1_CHARACTERISTIC), handles::EMG_DATA[1]),
                (resolve(ids::EMG_DATA2_CHARACTERISTIC), handles::EMG_DATA[2]),
                (resolve(ids::EMG_DATA3_CHARACTERISTIC), handles::EMG_DATA[3]),
            ])
    }
}

/// A write the transport received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub address: String,
    pub handle: u16,
    pub data: Vec<u8>,
    pub with_response: bool,
}

#[derive(Debug, Default)]
struct SimulatedState {
    advertisements: Vec<Advertisement>,
    devices: BTreeMap<String, SimulatedDevice>,
    connect_attempts: Vec<String>,
    connected: Vec<String>,
    writes: Vec<WriteRecord>,
    notifications: VecDeque<Notification>,
    fail_writes: bool,
    fail_disconnect: bool,
    disconnect_attempts: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    state: Arc<Mutex<SimulatedState>>,
}

#[derive(Debug)]
pub struct SimulatedConnection {
    address: String,
}

/// An advertisement of the band's control service.
pub fn myo_advertisement(address: &str) -> Advertisement {
    Advertisement {
        address: address.to_string(),
        local_name: Some("Myo".to_string()),
        services: vec![registry::control_service()],
        connectable: true,
    }
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        // a panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn advertise(&self, advertisement: Advertisement) {
        self.lock().advertisements.push(advertisement);
    }

    pub fn add_device(&self, address: &str, device: SimulatedDevice) {
        self.lock().devices.insert(address.to_string(), device);
    }

    /// Advertise a Myo band at `address` and make it connectable.
    pub fn add_myo(&self, address: &str) {
        self.advertise(myo_advertisement(address));
        self.add_device(address, SimulatedDevice::myo());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn fail_disconnect(&self, fail: bool) {
        self.lock().fail_disconnect = fail;
    }

    pub fn disconnect_attempts(&self) -> usize {
        self.lock().disconnect_attempts
    }

    pub fn push_notification(&self, handle: u16, data: &[u8]) {
        self.lock().notifications.push_back(Notification { handle, data: data.to_vec() });
    }

    pub fn connect_attempts(&self) -> Vec<String> {
        self.lock().connect_attempts.clone()
    }

    pub fn connected(&self) -> Vec<String> {
        self.lock().connected.clone()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn writes_to(&self, handle: u16) -> Vec<Vec<u8>> {
        self.lock()
            .writes
            .iter()
            .filter(|write| write.handle == handle)
            .map(|write| write.data.clone())
            .collect()
    }

    fn device(&self, connection: &SimulatedConnection) -> Result<SimulatedDevice, TransportError> {
        let state = self.lock();
        if !state.connected.contains(&connection.address) {
            return Err(TransportError::NotConnected);
        }

        state
            .devices
            .get(&connection.address)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeripheral(connection.address.clone()))
    }
}

#[async_trait]
impl BleTransport for SimulatedTransport {
    type Connection = SimulatedConnection;

    async fn scan(&self, _duration: Duration) -> Result<Vec<Advertisement>, TransportError> {
        Ok(self.lock().advertisements.clone())
    }

    async fn connect(&self, address: &str) -> Result<SimulatedConnection, TransportError> {
        let mut state = self.lock();
        state.connect_attempts.push(address.to_string());

        let fail_connect = state.devices.get(address).map(|device| device.fail_connect);
        match fail_connect {
            None => Err(TransportError::UnknownPeripheral(address.to_string())),
            Some(true) => {
                Err(TransportError::Simulated(format!("connection to {} refused", address)))
            },
            Some(false) => {
                state.connected.push(address.to_string());
                Ok(SimulatedConnection { address: address.to_string() })
            },
        }
    }

    async fn get_service(&self, connection: &SimulatedConnection, uuid: Uuid) -> Result<Option<Service>, TransportError> {
        let device = self.device(connection)?;
        Ok(device
            .services
            .iter()
            .find(|(service_uuid, _)| *service_uuid == uuid)
            .map(|(service_uuid, _)| Service { uuid: *service_uuid }))
    }

    async fn get_characteristics(
        &self,
        connection: &SimulatedConnection,
        service: &Service,
        uuid: Option<Uuid>,
    ) -> Result<Vec<Characteristic>, TransportError> {
        let device = self.device(connection)?;
        Ok(device
            .services
            .iter()
            .filter(|(service_uuid, _)| *service_uuid == service.uuid)
            .flat_map(|(_, characteristics)| characteristics.iter())
            .filter(|characteristic| uuid.map_or(true, |uuid| characteristic.uuid == uuid))
            .cloned()
            .collect())
    }

    async fn write(
        &self,
        connection: &SimulatedConnection,
        handle: u16,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        self.device(connection)?;

        let mut state = self.lock();
        if state.fail_writes {
            return Err(TransportError::Simulated(format!("write to {:#06x} rejected", handle)));
        }

        state.writes.push(WriteRecord {
            address: connection.address.clone(),
            handle,
            data: data.to_vec(),
            with_response,
        });
        Ok(())
    }

    /// Returns whatever is queued; never waits.
    async fn wait_for_notifications(
        &self,
        connection: &SimulatedConnection,
        _timeout: Duration,
    ) -> Result<Vec<Notification>, TransportError> {
        self.device(connection)?;
        Ok(self.lock().notifications.drain(..).collect())
    }

    async fn disconnect(&self, connection: &SimulatedConnection) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.disconnect_attempts += 1;
        if state.fail_disconnect {
            return Err(TransportError::Timeout("disconnect"));
        }

        state.connected.retain(|address| *address != connection.address);
        Ok(())
    }
}
