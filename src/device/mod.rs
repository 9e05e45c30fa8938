pub mod btle;
pub mod codec;
pub mod constants;
pub mod handles;
pub mod registry;
pub mod session;
pub mod simulated;
pub mod transport;
pub mod types;
