//! Temperature/humidity monitor core.
//!
//! One producer task ([`sensors::Monitor`]) polls the sensor and publishes every
//! reading by value to three independent consumers:
//!
//! - [`led::LedIndicator`] through a single-slot [`channel::Notification`],
//! - [`pixel::PixelIndicator`] through a second notification,
//! - [`display::DisplayPanel`] through the bounded [`channel::ReadingQueue`].
//!
//! The display consumer owns the only shared mutable value, the
//! [`state::SharedDisplayState`], which anyone may read.
//!
//! The crate is `no_std`; the ESP32 firmware in `main.rs` wires it to hardware.

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

pub mod channel;
pub mod classify;
pub mod config;
pub mod display;
pub mod lcd;
pub mod led;
pub mod pixel;
pub mod sensors;
pub mod state;
pub mod status;

pub use channel::{Channels, Notification, ReadingQueue};
pub use classify::{DisplayState, HumidityBand, TemperatureBand};
pub use config::Timing;
pub use sensors::{Reading, Sensor, SensorError};
pub use state::{LockUnavailable, SharedDisplayState};
pub use status::{Status, StatusFeed};
