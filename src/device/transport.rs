use std::time::Duration;
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::TransportError;

/// A peripheral seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Transport specific identifier used to connect (a MAC address on Linux).
    pub address: String,
    pub local_name: Option<String>,
    /// Advertised 128-bit service UUIDs, in canonical byte order.
    pub services: Vec<Uuid>,
    pub connectable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub value_handle: u16,
}

/// Bytes pushed by the peripheral on a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub handle: u16,
    pub data: Vec<u8>,
}

/// The GATT client operations a [`crate::device::session::DeviceSession`] drives.
///
/// Timeouts and cancellation belong to the implementation; the session never retries.
#[async_trait]
pub trait BleTransport: Send + Sync {
    type Connection: Send + Sync + 'static;

    async fn scan(&self, duration: Duration) -> Result<Vec<Advertisement>, TransportError>;

    async fn connect(&self, address: &str) -> Result<Self::Connection, TransportError>;

    async fn get_service(&self, connection: &Self::Connection, uuid: Uuid) -> Result<Option<Service>, TransportError>;

    /// Characteristics of `service`, optionally only those matching `uuid`.
    async fn get_characteristics(
        &self,
        connection: &Self::Connection,
        service: &Service,
        uuid: Option<Uuid>,
    ) -> Result<Vec<Characteristic>, TransportError>;

    async fn write(
        &self,
        connection: &Self::Connection,
        handle: u16,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError>;

    /// Wait up to `timeout` for notifications and return everything pending.
    /// An empty result means the timeout expired.
    async fn wait_for_notifications(
        &self,
        connection: &Self::Connection,
        timeout: Duration,
    ) -> Result<Vec<Notification>, TransportError>;

    /// The connection stays usable when this fails, so the caller can retry.
    async fn disconnect(&self, connection: &Self::Connection) -> Result<(), TransportError>;
}
