pub mod client;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod request;
pub mod response;
pub mod soap;
pub mod telemetry;
pub mod transport;
pub mod wsse;
pub mod xml;
