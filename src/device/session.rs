use std::time::Duration;
use futures::channel::mpsc::Sender;
use log::{debug, info, log, warn, Level};
use uuid::Uuid;

use crate::device::codec::{encode, Command, VibrationStep};
use crate::device::constants::{
    CCCD_DISABLE, CCCD_ENABLE_NOTIFICATIONS, CCCD_HANDLE_OFFSET, SCAN_DURATION, VIBRATE2_STEPS,
};
use crate::device::handles::{dispatch, Dispatch, HandleTable};
use crate::device::registry;
use crate::device::transport::{Advertisement, BleTransport};
use crate::device::types::{
    ClassifierMode, DeviceEvent, EmgMode, EmgSample, ImuMode, ImuSample, Modes, RawNotification,
    SessionState, SleepMode, StreamKind, UnlockType, UserActionType, VibrationType,
};
use crate::error::DeviceError;

pub type EmgCallback = Box<dyn FnMut(EmgSample) + Send>;
pub type ImuCallback = Box<dyn FnMut(ImuSample) + Send>;
pub type RawCallback = Box<dyn FnMut(&RawNotification) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// The adapter this session's transport is bound to; used to label output.
    pub interface: String,
    pub scan_duration: Duration,
    /// Log protocol details (characteristic UUIDs, descriptor handles, raw
    /// notifications) at `info` instead of `debug`.
    pub debug_protocol: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            interface: String::from("0"),
            scan_duration: Duration::from_millis(SCAN_DURATION),
            debug_protocol: false,
        }
    }
}

/// One connection to one band.
///
/// Drive it in order: [`discover`](Self::discover), [`connect`](Self::connect),
/// [`configure`](Self::configure), [`subscribe`](Self::subscribe), then call
/// [`pump`](Self::pump) until done. There is no automatic reconnect; after
/// [`close`](Self::close) create a new session.
pub struct DeviceSession<T: BleTransport> {
    transport: T,
    options: SessionOptions,
    state: SessionState,
    candidates: Vec<Advertisement>,
    connection: Option<T::Connection>,
    address: Option<String>,
    command_handle: Option<u16>,
    modes: Modes,
    handle_table: HandleTable,
    on_emg: Option<EmgCallback>,
    on_imu: Option<ImuCallback>,
    on_raw: Option<RawCallback>,
    senders: Vec<Sender<DeviceEvent>>,
}

impl<T: BleTransport> DeviceSession<T> {
    pub fn new(transport: T, options: SessionOptions) -> Self {
        DeviceSession {
            transport,
            options,
            state: SessionState::Idle,
            candidates: vec![],
            connection: None,
            address: None,
            command_handle: None,
            modes: Modes::default(),
            handle_table: HandleTable::new(),
            on_emg: None,
            on_imu: None,
            on_raw: None,
            senders: vec![],
        }
    }

    pub fn on_emg<F: FnMut(EmgSample) + Send + 'static>(&mut self, callback: F) {
        self.on_emg = Some(Box::new(callback));
    }

    pub fn on_imu<F: FnMut(ImuSample) + Send + 'static>(&mut self, callback: F) {
        self.on_imu = Some(Box::new(callback));
    }

    /// Replaces the default handler for notifications on unmapped handles.
    pub fn on_raw<F: FnMut(&RawNotification) + Send + 'static>(&mut self, callback: F) {
        self.on_raw = Some(Box::new(callback));
    }

    /// Also deliver state changes and samples on `sender`. Delivery never blocks;
    /// events are dropped when the channel is full.
    pub fn add_event_sender(&mut self, sender: Sender<DeviceEvent>) {
        self.senders.push(sender);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn candidates(&self) -> &[Advertisement] {
        &self.candidates
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn modes(&self) -> Modes {
        self.modes
    }

    pub fn handle_table(&self) -> &HandleTable {
        &self.handle_table
    }

    fn protocol_level(&self) -> Level {
        if self.options.debug_protocol { Level::Info } else { Level::Debug }
    }

    fn emit(&mut self, event: DeviceEvent) {
        for sender in &mut self.senders {
            if let Err(err) = sender.try_send(event.clone()) {
                if err.is_full() {
                    warn!("Event channel is full; dropping {:?}", err.into_inner());
                }
            }
        }
        self.senders.retain(|sender| !sender.is_closed());
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session on interface {}: {} -> {}", self.options.interface, self.state, state);
            self.state = state;
            self.emit(DeviceEvent::StateChange(state));
        }
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<(), DeviceError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(DeviceError::InvalidState { operation, state: self.state })
        }
    }

    fn connection(&self, operation: &'static str) -> Result<&T::Connection, DeviceError> {
        self.connection
            .as_ref()
            .ok_or(DeviceError::InvalidState { operation, state: self.state })
    }

    /// Scan for advertising bands and append new ones to the candidate list.
    ///
    /// A band matches when it advertises the control service and is connectable.
    pub async fn discover(&mut self) -> Result<&[Advertisement], DeviceError> {
        self.require("discover", &[SessionState::Idle, SessionState::Scanning])?;
        self.set_state(SessionState::Scanning);

        let control_service = registry::control_service();
        let advertisements = self.transport.scan(self.options.scan_duration).await?;

        for advertisement in advertisements {
            if !advertisement.services.contains(&control_service) || !advertisement.connectable {
                continue;
            }
            if self.candidates.iter().any(|known| known.address == advertisement.address) {
                continue;
            }

            info!("Myo found. Addr: {}", advertisement.address);
            self.candidates.push(advertisement);
        }

        Ok(&self.candidates)
    }

    /// Connect to a specific address, bypassing the candidate list.
    pub async fn connect_to(&mut self, address: &str) -> Result<(), DeviceError> {
        self.require("connect", &[SessionState::Idle, SessionState::Scanning])?;
        let previous = self.state;
        self.set_state(SessionState::Connecting);

        match self.transport.connect(address).await {
            Ok(connection) => {
                self.connection = Some(connection);
                self.address = Some(address.to_string());
                self.set_state(SessionState::Connected);
                Ok(())
            },
            Err(source) => {
                self.set_state(previous);
                Err(DeviceError::ConnectionError { address: address.to_string(), source })
            },
        }
    }

    /// Try the candidates in discovery order; the first that connects wins.
    pub async fn connect(&mut self) -> Result<(), DeviceError> {
        self.require("connect", &[SessionState::Idle, SessionState::Scanning])?;

        let addresses: Vec<String> = self.candidates.iter().map(|c| c.address.clone()).collect();
        for address in addresses {
            match self.connect_to(&address).await {
                Ok(()) => {
                    info!("Connected to {} on interface {}", address, self.options.interface);
                    return Ok(());
                },
                Err(err) => warn!("error connecting: {}", err),
            }
        }

        Err(DeviceError::NoDeviceFound)
    }

    async fn find_characteristic(&self, service_uuid: Uuid, characteristic_uuid: Uuid) -> Result<u16, DeviceError> {
        let connection = self.connection("find characteristic")?;

        let service = self.transport
            .get_service(connection, service_uuid)
            .await?
            .ok_or(DeviceError::CharacteristicNotFound { what: "service", uuid: service_uuid })?;

        let characteristics = self.transport
            .get_characteristics(connection, &service, Some(characteristic_uuid))
            .await?;

        match characteristics.first() {
            Some(characteristic) => Ok(characteristic.value_handle),
            None => Err(DeviceError::CharacteristicNotFound { what: "characteristic", uuid: characteristic_uuid }),
        }
    }

    async fn command_handle(&mut self) -> Result<u16, DeviceError> {
        if let Some(handle) = self.command_handle {
            return Ok(handle);
        }

        let handle = self
            .find_characteristic(registry::control_service(), registry::command_characteristic())
            .await?;
        self.command_handle = Some(handle);
        Ok(handle)
    }

    async fn write(&self, handle: u16, data: &[u8], with_response: bool) -> Result<(), DeviceError> {
        let connection = self.connection("write")?;
        self.transport
            .write(connection, handle, data, with_response)
            .await
            .map_err(|source| DeviceError::WriteFailed { handle, source })
    }

    /// Write a command to the command characteristic, waiting for the acknowledgement.
    pub async fn send_command(&mut self, command: &Command) -> Result<(), DeviceError> {
        self.require("send a command", &[
            SessionState::Connected,
            SessionState::Configuring,
            SessionState::Subscribing,
            SessionState::Streaming,
        ])?;

        let handle = self.command_handle().await?;
        let bytes = encode(command);
        log!(self.protocol_level(), "Writing command {:02x?} to handle {:#06x}", bytes, handle);
        self.write(handle, &bytes, true).await
    }

    /// Negotiate the streaming modes with the band.
    pub async fn configure(&mut self, emg: EmgMode, imu: ImuMode, classifier: ClassifierMode) -> Result<(), DeviceError> {
        self.require("configure", &[SessionState::Connected])?;
        self.set_state(SessionState::Configuring);

        let result = self.send_command(&Command::set_mode(emg, imu, classifier)).await;
        if result.is_ok() {
            self.modes = Modes { emg, imu, classifier };
        }

        self.set_state(SessionState::Connected);
        result
    }

    /// Enable notifications for every characteristic of the data service of `kind`.
    async fn enable_all(&mut self, service_uuid: Uuid, kind: StreamKind) -> Result<(), DeviceError> {
        let characteristics = {
            let connection = self.connection("subscribe")?;
            let service = self.transport
                .get_service(connection, service_uuid)
                .await?
                .ok_or(DeviceError::CharacteristicNotFound { what: "service", uuid: service_uuid })?;
            self.transport.get_characteristics(connection, &service, None).await?
        };

        for characteristic in characteristics {
            let cccd_handle = characteristic
                .value_handle
                .checked_add(CCCD_HANDLE_OFFSET)
                .ok_or(DeviceError::CharacteristicNotFound { what: "descriptor", uuid: characteristic.uuid })?;

            log!(
                self.protocol_level(),
                "Enabling {} notifications for {} (descriptor {:#06x})",
                kind, characteristic.uuid, cccd_handle
            );
            self.write(cccd_handle, &CCCD_ENABLE_NOTIFICATIONS, false).await?;
            self.handle_table.insert(characteristic.value_handle, kind);
        }

        Ok(())
    }

    /// Turn notifications off again for every mapped handle and forget the mapping.
    async fn disable_all(&mut self) {
        let handles: Vec<u16> = self.handle_table.handles(StreamKind::Imu)
            .into_iter()
            .chain(self.handle_table.handles(StreamKind::Emg))
            .collect();
        self.handle_table.clear();

        for handle in handles {
            let cccd_handle = handle + CCCD_HANDLE_OFFSET;
            if let Err(err) = self.write(cccd_handle, &CCCD_DISABLE, false).await {
                warn!("Failed to disable notifications on descriptor {:#06x}: {}", cccd_handle, err);
            }
        }
    }

    /// Subscribe to the data streams enabled by the last [`configure`](Self::configure).
    ///
    /// On failure every stream enabled so far is disabled again, so no samples arrive.
    pub async fn subscribe(&mut self) -> Result<(), DeviceError> {
        self.require("subscribe", &[SessionState::Connected, SessionState::Configuring])?;
        self.set_state(SessionState::Subscribing);
        self.handle_table.clear();

        let mut result = Ok(());
        if self.modes.imu.is_enabled() {
            result = self.enable_all(registry::imu_data_service(), StreamKind::Imu).await;
        }
        if result.is_ok() && self.modes.emg.is_enabled() {
            result = self.enable_all(registry::emg_data_service(), StreamKind::Emg).await;
        }

        match result {
            Ok(()) => {
                self.set_state(SessionState::Streaming);
                Ok(())
            },
            Err(err) => {
                self.disable_all().await;
                self.set_state(SessionState::Connected);
                Err(err)
            },
        }
    }

    fn default_handler(&self, handle: u16, data: &[u8]) {
        let signed: Vec<String> = data.iter().map(|b| (*b as i8).to_string()).collect();
        log!(
            self.protocol_level(),
            "{} {} {:#06x} {}",
            self.options.interface,
            humantime::format_rfc3339_millis(std::time::SystemTime::now()),
            handle,
            signed.join(" ")
        );
    }

    /// Route one notification to the callbacks.
    ///
    /// Unmapped handles go to the raw handler and malformed payloads are logged and
    /// dropped; neither interrupts the stream.
    pub fn on_notification(&mut self, handle: u16, data: &[u8]) {
        match dispatch(&self.handle_table, handle, data) {
            Dispatch::Emg(sample) => {
                match self.on_emg.as_mut() {
                    Some(callback) => callback(sample),
                    None => self.default_handler(handle, data),
                }
                self.emit(DeviceEvent::Emg(sample));
            },
            Dispatch::Imu(sample) => {
                match self.on_imu.as_mut() {
                    Some(callback) => callback(sample),
                    None => self.default_handler(handle, data),
                }
                self.emit(DeviceEvent::Imu(sample));
            },
            Dispatch::Raw(raw) => {
                match self.on_raw.as_mut() {
                    Some(callback) => callback(&raw),
                    None => self.default_handler(handle, data),
                }
                self.emit(DeviceEvent::Raw(raw));
            },
            Dispatch::Dropped { handle, error } => {
                warn!("Dropping notification on handle {:#06x}: {}", handle, error);
            },
        }
    }

    /// Wait up to `timeout` for notifications and dispatch them. Returns how many arrived.
    pub async fn pump(&mut self, timeout: Duration) -> Result<usize, DeviceError> {
        let notifications = {
            let connection = self.connection("pump notifications")?;
            self.transport.wait_for_notifications(connection, timeout).await?
        };

        let count = notifications.len();
        for notification in notifications {
            self.on_notification(notification.handle, &notification.data);
        }

        Ok(count)
    }

    pub async fn set_sleep_mode(&mut self, sleep_mode: SleepMode) -> Result<(), DeviceError> {
        self.send_command(&Command::set_sleep_mode(sleep_mode)).await
    }

    pub async fn vibrate(&mut self, vibration: VibrationType) -> Result<(), DeviceError> {
        self.send_command(&Command::vibrate(vibration)).await
    }

    pub async fn vibrate2(&mut self, steps: [VibrationStep; VIBRATE2_STEPS]) -> Result<(), DeviceError> {
        self.send_command(&Command::vibrate2(steps)).await
    }

    /// Put the band into deep sleep. It only wakes up again when plugged in.
    pub async fn deep_sleep(&mut self) -> Result<(), DeviceError> {
        self.send_command(&Command::DeepSleep).await
    }

    pub async fn unlock(&mut self, unlock_type: UnlockType) -> Result<(), DeviceError> {
        self.send_command(&Command::unlock(unlock_type)).await
    }

    pub async fn user_action(&mut self, action: UserActionType) -> Result<(), DeviceError> {
        self.send_command(&Command::user_action(action)).await
    }

    /// Release the connection. Calling it again is a no-op once it succeeded.
    ///
    /// When the transport fails to disconnect, the session keeps its state and
    /// connection so `close` can be retried.
    pub async fn close(&mut self) -> Result<(), DeviceError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        if let Some(connection) = self.connection.as_ref() {
            info!("Closing connection to {}", self.address.as_deref().unwrap_or("UNKNOWN"));
            self.transport.disconnect(connection).await?;
        }

        self.connection = None;
        self.handle_table.clear();
        self.command_handle = None;
        self.set_state(SessionState::Closed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc::channel;
    use futures::StreamExt;
    use std::sync::{Arc, Mutex};
    use crate::device::constants::ids;
    use crate::device::registry::resolve;
    use crate::device::simulated::{handles, myo_advertisement, SimulatedDevice, SimulatedTransport};
    use crate::error::TransportError;

    const ADDRESS: &str = "d0:d0:00:00:00:01";

    fn session(transport: &SimulatedTransport) -> DeviceSession<SimulatedTransport> {
        DeviceSession::new(transport.clone(), SessionOptions::default())
    }

    async fn connected(transport: &SimulatedTransport) -> DeviceSession<SimulatedTransport> {
        transport.add_myo(ADDRESS);
        let mut session = session(transport);
        session.discover().await.unwrap();
        session.connect().await.unwrap();
        session
    }

    #[tokio::test]
    async fn discover_filters_by_control_service_and_connectable() {
        let transport = SimulatedTransport::new();
        transport.advertise(Advertisement {
            address: "aa".to_string(),
            local_name: Some("Headphones".to_string()),
            services: vec![Uuid::from_u128(0x0000110b_0000_1000_8000_00805f9b34fb)],
            connectable: true,
        });
        transport.advertise(Advertisement { connectable: false, ..myo_advertisement("bb") });
        transport.advertise(myo_advertisement("cc"));
        transport.advertise(myo_advertisement("dd"));
        transport.advertise(myo_advertisement("cc"));

        let mut session = session(&transport);
        let addresses: Vec<String> = session
            .discover()
            .await
            .unwrap()
            .iter()
            .map(|c| c.address.clone())
            .collect();

        assert_eq!(addresses, vec!["cc", "dd"]);
        assert_eq!(session.state(), SessionState::Scanning);
    }

    #[tokio::test]
    async fn connect_without_candidates_never_touches_transport() {
        let transport = SimulatedTransport::new();
        let mut session = session(&transport);

        assert!(session.discover().await.unwrap().is_empty());
        assert!(matches!(session.connect().await, Err(DeviceError::NoDeviceFound)));
        assert!(transport.connect_attempts().is_empty());
    }

    #[tokio::test]
    async fn connect_skips_failing_candidates() {
        let transport = SimulatedTransport::new();
        transport.advertise(myo_advertisement("first"));
        transport.add_device("first", SimulatedDevice::myo().failing());
        transport.add_myo("second");
        transport.add_myo("third");

        let mut session = session(&transport);
        session.discover().await.unwrap();
        session.connect().await.unwrap();

        assert_eq!(transport.connect_attempts(), vec!["first", "second"]);
        assert_eq!(transport.connected(), vec!["second"]);
        assert_eq!(session.address(), Some("second"));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn connect_to_reports_connection_error() {
        let transport = SimulatedTransport::new();
        let mut session = session(&transport);

        assert!(matches!(
            session.connect_to("missing").await,
            Err(DeviceError::ConnectionError { source: TransportError::UnknownPeripheral(_), .. })
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(matches!(session.connect().await, Err(DeviceError::NoDeviceFound)));
    }

    #[tokio::test]
    async fn failed_connect_to_after_scan_stays_scanning() {
        let transport = SimulatedTransport::new();
        let mut session = session(&transport);
        session.discover().await.unwrap();

        assert!(session.connect_to("missing").await.is_err());
        assert_eq!(session.state(), SessionState::Scanning);
    }

    #[tokio::test]
    async fn configure_writes_set_mode_with_response() {
        let transport = SimulatedTransport::new();
        let mut session = connected(&transport).await;

        session.configure(EmgMode::SendEmg, ImuMode::None, ClassifierMode::Disabled).await.unwrap();

        let writes = transport.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].handle, handles::COMMAND);
        assert_eq!(writes[0].data, vec![0x01, 3, 0x02, 0x00, 0x00]);
        assert!(writes[0].with_response);
        assert_eq!(session.modes().emg, EmgMode::SendEmg);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn configure_without_control_service() {
        let transport = SimulatedTransport::new();
        transport.advertise(myo_advertisement(ADDRESS));
        transport.add_device(ADDRESS, SimulatedDevice::new());
        let mut session = session(&transport);
        session.discover().await.unwrap();
        session.connect().await.unwrap();

        assert!(matches!(
            session.configure(EmgMode::SendEmg, ImuMode::None, ClassifierMode::Disabled).await,
            Err(DeviceError::CharacteristicNotFound { what: "service", .. })
        ));
    }

    #[tokio::test]
    async fn configure_without_command_characteristic() {
        let transport = SimulatedTransport::new();
        transport.advertise(myo_advertisement(ADDRESS));
        transport.add_device(ADDRESS, SimulatedDevice::new().with_service(resolve(ids::CONTROL_SERVICE), &[
            (resolve(ids::MYO_INFO_CHARACTERISTIC), handles::MYO_INFO),
        ]));
        let mut session = session(&transport);
        session.discover().await.unwrap();
        session.connect().await.unwrap();

        let result = session.configure(EmgMode::SendEmg, ImuMode::None, ClassifierMode::Disabled).await;
        match result {
            Err(DeviceError::CharacteristicNotFound { what: "characteristic", uuid }) => {
                assert_eq!(uuid, registry::command_characteristic());
            },
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(transport.writes().is_empty());
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn configure_reports_write_failure() {
        let transport = SimulatedTransport::new();
        let mut session = connected(&transport).await;
        transport.fail_writes(true);

        assert!(matches!(
            session.configure(EmgMode::SendEmg, ImuMode::None, ClassifierMode::Disabled).await,
            Err(DeviceError::WriteFailed { handle: handles::COMMAND, .. })
        ));
        assert_eq!(session.modes(), Modes::default());
    }

    #[tokio::test]
    async fn configure_before_connect_is_rejected() {
        let transport = SimulatedTransport::new();
        let mut session = session(&transport);

        assert!(matches!(
            session.configure(EmgMode::SendEmg, ImuMode::None, ClassifierMode::Disabled).await,
            Err(DeviceError::InvalidState { state: SessionState::Idle, .. })
        ));
    }

    #[tokio::test]
    async fn subscribe_writes_descriptor_after_each_value_handle() {
        let transport = SimulatedTransport::new();
        let mut session = connected(&transport).await;
        session.configure(EmgMode::SendEmg, ImuMode::SendData, ClassifierMode::Disabled).await.unwrap();
        session.subscribe().await.unwrap();

        for handle in handles::EMG_DATA.iter().chain([handles::IMU_DATA, handles::MOTION_EVENT].iter()) {
            assert_eq!(transport.writes_to(handle + 1), vec![CCCD_ENABLE_NOTIFICATIONS.to_vec()]);
        }
        assert_eq!(session.handle_table().handles(StreamKind::Emg), handles::EMG_DATA.to_vec());
        assert_eq!(session.state(), SessionState::Streaming);
    }

    #[tokio::test]
    async fn subscribe_reports_descriptor_write_failure() {
        let transport = SimulatedTransport::new();
        let mut session = connected(&transport).await;
        session.configure(EmgMode::SendEmg, ImuMode::None, ClassifierMode::Disabled).await.unwrap();
        transport.fail_writes(true);

        assert!(matches!(
            session.subscribe().await,
            Err(DeviceError::WriteFailed { handle, .. }) if handle == handles::EMG_DATA[0] + 1
        ));
        assert!(session.handle_table().is_empty());
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn failed_subscribe_disables_streams_already_enabled() {
        let transport = SimulatedTransport::new();
        transport.advertise(myo_advertisement(ADDRESS));
        transport.add_device(ADDRESS, SimulatedDevice::new()
            .with_service(resolve(ids::CONTROL_SERVICE), &[
                (resolve(ids::COMMAND_CHARACTERISTIC), handles::COMMAND),
            ])
            .with_service(resolve(ids::IMU_DATA_SERVICE), &[
                (resolve(ids::IMU_DATA_CHARACTERISTIC), handles::IMU_DATA),
            ]));
        let mut session = session(&transport);
        session.discover().await.unwrap();
        session.connect().await.unwrap();

        let imu_count = Arc::new(Mutex::new(0));
        let imu_sink = imu_count.clone();
        session.on_imu(move |_| *imu_sink.lock().unwrap() += 1);

        session.configure(EmgMode::SendEmg, ImuMode::SendData, ClassifierMode::Disabled).await.unwrap();
        assert!(matches!(
            session.subscribe().await,
            Err(DeviceError::CharacteristicNotFound { what: "service", .. })
        ));

        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.handle_table().is_empty());
        assert_eq!(transport.writes_to(handles::IMU_DATA + 1), vec![
            CCCD_ENABLE_NOTIFICATIONS.to_vec(),
            CCCD_DISABLE.to_vec(),
        ]);

        // a late notification is no longer decoded as IMU
        session.on_notification(handles::IMU_DATA, &[0u8; 20]);
        assert_eq!(*imu_count.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn state_changes_are_emitted() {
        let transport = SimulatedTransport::new();
        transport.add_myo(ADDRESS);
        let (sender, mut receiver) = channel(32);
        let mut session = session(&transport);
        session.add_event_sender(sender);

        session.discover().await.unwrap();
        session.connect().await.unwrap();
        session.close().await.unwrap();
        drop(session);

        let mut states = vec![];
        while let Some(event) = receiver.next().await {
            if let DeviceEvent::StateChange(state) = event {
                states.push(state);
            }
        }
        assert_eq!(states, vec![
            SessionState::Scanning,
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Closed,
        ]);
    }

    #[tokio::test]
    async fn raw_handler_receives_unmapped_handles() {
        let transport = SimulatedTransport::new();
        let mut session = connected(&transport).await;
        let seen = Arc::new(Mutex::new(vec![]));
        let seen_clone = seen.clone();
        session.on_raw(move |raw| seen_clone.lock().unwrap().push(raw.clone()));

        session.on_notification(handles::BATTERY_LEVEL, &[87]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], RawNotification { handle: handles::BATTERY_LEVEL, data: vec![87] });
    }

    #[tokio::test]
    async fn commands_after_connect() {
        let transport = SimulatedTransport::new();
        let mut session = connected(&transport).await;

        session.set_sleep_mode(SleepMode::NeverSleep).await.unwrap();
        session.vibrate(VibrationType::Short).await.unwrap();
        session.unlock(UnlockType::Hold).await.unwrap();
        session.user_action(UserActionType::Single).await.unwrap();
        session.deep_sleep().await.unwrap();

        assert_eq!(transport.writes_to(handles::COMMAND), vec![
            vec![0x09, 1, 1],
            vec![0x03, 1, 1],
            vec![0x0a, 1, 2],
            vec![0x0b, 1, 0],
            vec![0x04, 0],
        ]);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = SimulatedTransport::new();
        let mut session = connected(&transport).await;

        session.close().await.unwrap();
        session.close().await.unwrap();

        assert!(transport.connected().is_empty());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.set_sleep_mode(SleepMode::Normal).await,
            Err(DeviceError::InvalidState { state: SessionState::Closed, .. })
        ));
    }

    #[tokio::test]
    async fn close_can_be_retried_after_disconnect_failure() {
        let transport = SimulatedTransport::new();
        let mut session = connected(&transport).await;
        transport.fail_disconnect(true);

        assert!(matches!(
            session.close().await,
            Err(DeviceError::Transport { source: TransportError::Timeout("disconnect") })
        ));
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(transport.connected(), vec![ADDRESS]);

        transport.fail_disconnect(false);
        session.close().await.unwrap();

        assert_eq!(transport.disconnect_attempts(), 2);
        assert!(transport.connected().is_empty());
        assert_eq!(session.state(), SessionState::Closed);
    }
}
