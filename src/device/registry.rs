//! Resolution of the band's 16-bit service/characteristic ids to 128-bit UUIDs.
//!
//! The vendor template is published in the byte order a raw advertisement
//! carries it. Resolving an id takes two reversals: the 16-bit id is written
//! little-endian into the placeholder, then the whole 16-byte string is reversed
//! into the canonical (big-endian) order transports use for GATT lookups.

use uuid::Uuid;

use crate::device::constants::{ids, UUID_PLACEHOLDER_OFFSET, UUID_TEMPLATE_LE};

/// The little-endian form of the UUID for `id`, as it appears in advertisement data.
pub fn advertised_bytes(id: u16) -> [u8; 16] {
    let mut bytes = UUID_TEMPLATE_LE;
    bytes[UUID_PLACEHOLDER_OFFSET..UUID_PLACEHOLDER_OFFSET + 2].copy_from_slice(&id.to_le_bytes());
    bytes
}

/// Lower-case hex of [`advertised_bytes`], e.g. `4248124a7f2c4847b9de04a9010006d5`
/// for the control service.
pub fn advertised_hex(id: u16) -> String {
    advertised_bytes(id).iter().map(|b| format!("{:02x}", b)).collect()
}

/// Convert a 128-bit service UUID taken from raw advertisement data to its canonical form.
pub fn from_advertised_bytes(bytes: [u8; 16]) -> Uuid {
    let mut bytes = bytes;
    bytes.reverse();
    Uuid::from_bytes(bytes)
}

/// The canonical UUID of a service or characteristic id.
pub fn resolve(id: u16) -> Uuid {
    from_advertised_bytes(advertised_bytes(id))
}

pub fn control_service() -> Uuid {
    resolve(ids::CONTROL_SERVICE)
}

pub fn command_characteristic() -> Uuid {
    resolve(ids::COMMAND_CHARACTERISTIC)
}

pub fn imu_data_service() -> Uuid {
    resolve(ids::IMU_DATA_SERVICE)
}

pub fn emg_data_service() -> Uuid {
    resolve(ids::EMG_DATA_SERVICE)
}
