// routermq-api: Async Rust client for the MikroTik RouterOS binary API

pub mod client;
pub mod error;
pub mod proto;
pub mod transport;

pub use client::{Registration, RouterConfig, RouterosClient};
pub use error::Error;
pub use proto::{ReplySentence, ReplyWord};
pub use transport::TlsMode;
