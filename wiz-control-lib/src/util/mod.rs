pub mod host;
pub mod transport;
