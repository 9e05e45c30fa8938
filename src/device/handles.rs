use std::collections::BTreeMap;

use crate::device::codec::{decode_emg, decode_imu};
use crate::device::types::{EmgSample, ImuSample, RawNotification, StreamKind};
use crate::error::DeviceError;

/// Maps attribute value handles to the sample stream they carry.
///
/// Filled while subscribing, read on every notification. Handles that are not
/// in the table (battery, firmware info, ...) are passed through as raw data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleTable {
    entries: BTreeMap<u16, StreamKind>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: u16, kind: StreamKind) {
        self.entries.insert(handle, kind);
    }

    pub fn lookup(&self, handle: u16) -> Option<StreamKind> {
        self.entries.get(&handle).copied()
    }

    /// All handles of `kind`, in ascending order.
    pub fn handles(&self, kind: StreamKind) -> Vec<u16> {
        self.entries
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(handle, _)| *handle)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The outcome of routing one notification through a [`HandleTable`].
#[derive(Debug)]
pub enum Dispatch {
    Emg(EmgSample),
    Imu(ImuSample),
    Raw(RawNotification),
    /// The handle belongs to a sample stream but the payload could not be decoded.
    Dropped { handle: u16, error: DeviceError },
}

pub fn dispatch(table: &HandleTable, handle: u16, data: &[u8]) -> Dispatch {
    let decoded = match table.lookup(handle) {
        None => {
            return Dispatch::Raw(RawNotification { handle, data: data.to_vec() });
        },
        Some(StreamKind::Emg) => decode_emg(data).map(Dispatch::Emg),
        Some(StreamKind::Imu) => decode_imu(data).map(Dispatch::Imu),
    };

    decoded.unwrap_or_else(|error| Dispatch::Dropped { handle, error })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> HandleTable {
        let mut table = HandleTable::new();
        table.insert(0x2b, StreamKind::Emg);
        table.insert(0x2e, StreamKind::Emg);
        table.insert(0x1c, StreamKind::Imu);
        table
    }

    #[test]
    fn lookup_and_handles() {
        let table = table();
        assert_eq!(table.lookup(0x2b), Some(StreamKind::Emg));
        assert_eq!(table.lookup(0x1c), Some(StreamKind::Imu));
        assert_eq!(table.lookup(0x11), None);
        assert_eq!(table.handles(StreamKind::Emg), vec![0x2b, 0x2e]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn routes_by_handle() {
        let table = table();

        assert!(matches!(dispatch(&table, 0x2e, &[1; 16]), Dispatch::Emg(s) if s.sample2 == [1; 8]));
        assert!(matches!(dispatch(&table, 0x1c, &[0; 20]), Dispatch::Imu(_)));
    }

    #[test]
    fn unknown_handle_is_raw() {
        let table = table();

        match dispatch(&table, 0x11, &[0x55]) {
            Dispatch::Raw(raw) => {
                assert_eq!(raw.handle, 0x11);
                assert_eq!(raw.data, vec![0x55]);
            },
            other => panic!("expected raw passthrough, got {:?}", other),
        }
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let table = table();

        assert!(matches!(
            dispatch(&table, 0x1c, &[0; 3]),
            Dispatch::Dropped { handle: 0x1c, error: DeviceError::MalformedPayload { .. } }
        ));
    }
}
