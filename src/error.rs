use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;

use crate::device::types::{SessionState, StreamKind};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Failures reported by a [`crate::device::transport::BleTransport`].
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter matches interface {0:?}")]
    NoAdapter(String),

    #[error("Peripheral {0} is not known to the adapter")]
    UnknownPeripheral(String),

    #[error("The connection has been closed")]
    NotConnected,

    #[error("No attribute with handle {0:#06x}")]
    UnknownHandle(u16),

    #[error("Transport operation {0} took too long")]
    Timeout(&'static str),

    #[error("Simulated transport failure: {0}")]
    Simulated(String),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No band could be connected to")]
    NoDeviceFound,

    #[error("Failed to connect to {address}: {source}")]
    ConnectionError { address: String, source: TransportError },

    #[error("The band does not expose {what} {uuid}")]
    CharacteristicNotFound { what: &'static str, uuid: uuid::Uuid },

    #[error("Failed to write to handle {handle:#06x}: {source}")]
    WriteFailed { handle: u16, source: TransportError },

    #[error("Malformed {kind} payload: expected {expected} bytes, got {actual}")]
    MalformedPayload { kind: StreamKind, expected: usize, actual: usize },

    #[error("Unsupported command kind {0:#04x}")]
    UnsupportedCommandKind(u8),

    #[error("Malformed command {kind:#04x}: payload size {declared} does not match its layout ({expected} bytes)")]
    MalformedCommand { kind: u8, declared: usize, expected: usize },

    #[error("Cannot {operation} while the session is {state}")]
    InvalidState { operation: &'static str, state: SessionState },

    #[error("Error communicating with device: {source}")]
    Transport { #[from] source: TransportError },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to stream from band: {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Failed to initialize bluetooth: {source}")]
    TransportError { #[from] source: TransportError },
}
