//! Client of the host manager API over its local Unix socket.

mod client;
pub mod error;

pub use client::Client;
pub use error::{Error, Result};
pub use shared::types;
