//! Provider routing and fallback engine with daily quota enforcement.
//!
//! Requests for chat, image generation, and image analysis are routed
//! across interchangeable backends: quota admission first, then
//! sequential fallback through the eligible candidates with retry and
//! backoff, stopping at the first success. Cancellation is a first-class
//! outcome, never an error.

pub mod config;
pub mod error;
pub mod provider;
pub mod quota;
pub mod registry;
pub mod router;
pub mod switchboard;
pub mod types;
pub mod util;

pub use error::{Result, SwitchboardError};
pub use switchboard::Switchboard;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
