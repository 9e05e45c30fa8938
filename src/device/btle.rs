use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic as BtleCharacteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{FutureExt, Stream, StreamExt};
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::device::constants::{CCCD_DISABLE, CCCD_HANDLE_OFFSET, CONNECT_DEADLINE, DISCOVER_DEADLINE, WRITE_DEADLINE};
use crate::device::transport::{Advertisement, BleTransport, Characteristic, Notification, Service};
use crate::error::TransportError;

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// [`BleTransport`] backed by the platform bluetooth stack through btleplug.
///
/// btleplug addresses characteristics by UUID rather than by attribute handle, so
/// handles are assigned here after service discovery, following the usual GATT
/// layout: a declaration, the value, then the client characteristic configuration
/// descriptor at value handle + 1. Writes to that descriptor handle become
/// subscribe/unsubscribe calls.
pub struct BtleplugTransport {
    adapter: Adapter,
}

struct GattCharacteristic {
    value_handle: u16,
    inner: BtleCharacteristic,
}

struct GattService {
    uuid: Uuid,
    characteristics: Vec<GattCharacteristic>,
}

pub struct BtleConnection {
    peripheral: Peripheral,
    services: Vec<GattService>,
    notifications: Mutex<NotificationStream>,
}

enum Target<'a> {
    Value(&'a BtleCharacteristic),
    Descriptor(&'a BtleCharacteristic),
}

impl BtleConnection {
    fn characteristics(&self) -> impl Iterator<Item = &GattCharacteristic> {
        self.services.iter().flat_map(|service| service.characteristics.iter())
    }

    fn target(&self, handle: u16) -> Option<Target<'_>> {
        for characteristic in self.characteristics() {
            if characteristic.value_handle == handle {
                return Some(Target::Value(&characteristic.inner));
            }
            if characteristic.value_handle.checked_add(CCCD_HANDLE_OFFSET) == Some(handle) {
                return Some(Target::Descriptor(&characteristic.inner));
            }
        }
        None
    }

    fn value_handle(&self, uuid: &Uuid) -> Option<u16> {
        self.characteristics()
            .find(|characteristic| characteristic.inner.uuid == *uuid)
            .map(|characteristic| characteristic.value_handle)
    }
}

fn assign_handles(peripheral: &Peripheral) -> Vec<GattService> {
    let mut next_handle: u16 = 1;
    let mut services = vec![];

    for service in peripheral.services() {
        // service declaration
        next_handle = next_handle.saturating_add(1);

        let mut characteristics = vec![];
        for characteristic in service.characteristics {
            // declaration, value, client characteristic configuration
            let value_handle = next_handle.saturating_add(1);
            next_handle = next_handle.saturating_add(3);
            characteristics.push(GattCharacteristic { value_handle, inner: characteristic });
        }

        services.push(GattService { uuid: service.uuid, characteristics });
    }

    services
}

async fn deadline<F, T>(what: &'static str, millis: u64, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, btleplug::Error>>,
{
    match timeout(Duration::from_millis(millis), fut).await {
        Err(_) => Err(TransportError::Timeout(what)),
        Ok(result) => Ok(result?),
    }
}

impl BtleplugTransport {
    /// Open the adapter identified by `interface`: either an index ("0" for the first
    /// adapter, like `hci0`) or a substring of the adapter description.
    pub async fn new(interface: &str) -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;

        if let Ok(index) = interface.parse::<usize>() {
            return adapters
                .into_iter()
                .nth(index)
                .map(|adapter| BtleplugTransport { adapter })
                .ok_or_else(|| TransportError::NoAdapter(interface.to_string()));
        }

        for adapter in adapters {
            let description = adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string());
            if description.contains(interface) {
                info!("Using adapter {}", description);
                return Ok(BtleplugTransport { adapter });
            }
        }

        Err(TransportError::NoAdapter(interface.to_string()))
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral, TransportError> {
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|peripheral| peripheral.id().to_string() == address)
            .ok_or_else(|| TransportError::UnknownPeripheral(address.to_string()))
    }

    async fn open(&self, peripheral: &Peripheral) -> Result<BtleConnection, TransportError> {
        // BlueZ reports the connection before the remote GATT cache is populated
        #[cfg(target_os = "linux")]
        sleep(Duration::from_millis(600)).await;

        info!("Connected; Discovering services...");
        deadline("discover services", DISCOVER_DEADLINE, peripheral.discover_services()).await?;

        let notifications = peripheral.notifications().await?;

        Ok(BtleConnection {
            peripheral: peripheral.clone(),
            services: assign_handles(peripheral),
            notifications: Mutex::new(notifications),
        })
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    type Connection = BtleConnection;

    async fn scan(&self, duration: Duration) -> Result<Vec<Advertisement>, TransportError> {
        info!("Scanning using adapter {}...", self.adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        self.adapter.start_scan(ScanFilter::default()).await?;
        sleep(duration).await;
        if let Err(err) = self.adapter.stop_scan().await {
            warn!("Failed to stop scanning: {:?}", err);
        }

        let mut advertisements = vec![];
        for peripheral in self.adapter.peripherals().await? {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    debug!("Peripheral {} has no properties", peripheral.id());
                },
                Ok(Some(properties)) => {
                    advertisements.push(Advertisement {
                        address: peripheral.id().to_string(),
                        local_name: properties.local_name,
                        services: properties.services,
                        // btleplug only reports peripherals it can connect to
                        connectable: true,
                    });
                },
            }
        }

        Ok(advertisements)
    }

    async fn connect(&self, address: &str) -> Result<BtleConnection, TransportError> {
        let peripheral = self.find_peripheral(address).await?;

        info!("Connecting to peripheral {}...", address);
        deadline("connect", CONNECT_DEADLINE, peripheral.connect()).await?;

        match self.open(&peripheral).await {
            Ok(connection) => Ok(connection),
            Err(err) => {
                if let Err(disconnect_err) = peripheral.disconnect().await {
                    warn!("Failed to disconnect after failed setup: {:?}", disconnect_err);
                }
                Err(err)
            },
        }
    }

    async fn get_service(&self, connection: &BtleConnection, uuid: Uuid) -> Result<Option<Service>, TransportError> {
        Ok(connection
            .services
            .iter()
            .find(|service| service.uuid == uuid)
            .map(|service| Service { uuid: service.uuid }))
    }

    async fn get_characteristics(
        &self,
        connection: &BtleConnection,
        service: &Service,
        uuid: Option<Uuid>,
    ) -> Result<Vec<Characteristic>, TransportError> {
        Ok(connection
            .services
            .iter()
            .filter(|gatt_service| gatt_service.uuid == service.uuid)
            .flat_map(|gatt_service| gatt_service.characteristics.iter())
            .filter(|characteristic| uuid.map_or(true, |uuid| characteristic.inner.uuid == uuid))
            .map(|characteristic| Characteristic {
                uuid: characteristic.inner.uuid,
                value_handle: characteristic.value_handle,
            })
            .collect())
    }

    async fn write(
        &self,
        connection: &BtleConnection,
        handle: u16,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        let peripheral = &connection.peripheral;

        match connection.target(handle) {
            None => Err(TransportError::UnknownHandle(handle)),
            Some(Target::Value(characteristic)) => {
                let write_type = if with_response { WriteType::WithResponse } else { WriteType::WithoutResponse };
                deadline("write", WRITE_DEADLINE, peripheral.write(characteristic, data, write_type)).await
            },
            Some(Target::Descriptor(characteristic)) => {
                if data == CCCD_DISABLE.as_slice() {
                    deadline("unsubscribe", WRITE_DEADLINE, peripheral.unsubscribe(characteristic)).await
                } else {
                    deadline("subscribe", WRITE_DEADLINE, peripheral.subscribe(characteristic)).await
                }
            },
        }
    }

    async fn wait_for_notifications(
        &self,
        connection: &BtleConnection,
        wait: Duration,
    ) -> Result<Vec<Notification>, TransportError> {
        let mut stream = connection.notifications.lock().await;
        let mut pending = vec![];

        let first = match timeout(wait, stream.next()).await {
            Err(_) => return Ok(pending),
            Ok(None) => return Err(TransportError::NotConnected),
            Ok(Some(notification)) => notification,
        };

        let mut next = Some(first);
        while let Some(notification) = next.take() {
            match connection.value_handle(&notification.uuid) {
                Some(handle) => pending.push(Notification { handle, data: notification.value }),
                None => debug!("Notification from unknown characteristic {}", notification.uuid),
            }

            // drain whatever else is already queued, without waiting
            next = stream.next().now_or_never().flatten();
        }

        Ok(pending)
    }

    async fn disconnect(&self, connection: &BtleConnection) -> Result<(), TransportError> {
        info!("Disconnecting from peripheral {}", connection.peripheral.id());
        deadline("disconnect", WRITE_DEADLINE, connection.peripheral.disconnect()).await
    }
}
