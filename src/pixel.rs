use core::fmt::Debug;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Timer};
use smart_leds::{brightness, SmartLedsWrite, RGB8};

use crate::{channel::Notification, classify::HumidityBand, config::Timing};

const DEFAULT_HUMIDITY: f32 = 50.0;
const MIN_BRIGHTNESS: u8 = 50;
const MAX_BRIGHTNESS: u8 = 255;

/// A single RGB pixel.
pub trait Pixel {
    type Error: Debug;

    fn show(&mut self, color: RGB8, brightness: u8) -> Result<(), Self::Error>;
}

/// Scales `color` by `level` (255 = full).
pub fn dim(color: RGB8, level: u8) -> RGB8 {
    brightness(core::iter::once(color), level)
        .next()
        .unwrap_or_default()
}

/// Drives the first LED of a smart LED strip.
pub struct SmartPixel<W>(pub W);

impl<W> Pixel for SmartPixel<W>
where
    W: SmartLedsWrite<Color = RGB8>,
    W::Error: Debug,
{
    type Error = W::Error;

    fn show(&mut self, color: RGB8, level: u8) -> Result<(), Self::Error> {
        self.0.write(core::iter::once(dim(color, level)))
    }
}

/// Brightness bouncing between 50 and 255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    brightness: u8,
    rising: bool,
}

impl Pulse {
    pub const fn new() -> Self {
        Self {
            brightness: MAX_BRIGHTNESS,
            rising: false,
        }
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Moves `step` units and turns around at the limits.
    pub fn advance(&mut self, step: u8) -> u8 {
        if self.rising {
            self.brightness = self.brightness.saturating_add(step);
            if self.brightness >= MAX_BRIGHTNESS {
                self.rising = false;
            }
        } else {
            self.brightness = self.brightness.saturating_sub(step).max(MIN_BRIGHTNESS);
            if self.brightness <= MIN_BRIGHTNESS {
                self.rising = true;
            }
        }
        self.brightness
    }
}

impl Default for Pulse {
    fn default() -> Self {
        Self::new()
    }
}

/// Shows the humidity band as a breathing colour.
pub struct PixelIndicator<D> {
    pixel: D,
    humidity: f32,
    band: HumidityBand,
    pulse: Pulse,
}

impl<D: Pixel> PixelIndicator<D> {
    pub fn new(pixel: D) -> Self {
        Self {
            pixel,
            humidity: DEFAULT_HUMIDITY,
            band: HumidityBand::classify(DEFAULT_HUMIDITY),
            pulse: Pulse::new(),
        }
    }

    pub fn humidity(&self) -> f32 {
        self.humidity
    }

    pub fn band(&self) -> HumidityBand {
        self.band
    }

    /// Takes a humidity update if one arrives within `wait`; `false` on timeout.
    pub async fn refresh<M: RawMutex>(
        &mut self,
        updates: &Notification<M, f32>,
        wait: Duration,
    ) -> bool {
        let Some(humidity) = updates.wait_for(wait).await else {
            return false;
        };

        let band = HumidityBand::classify(humidity);
        log::info!(
            "NEO task: humidity {}% -> {:?}, RGB {:?}",
            humidity,
            band,
            band.color()
        );
        self.humidity = humidity;
        self.band = band;
        true
    }

    /// Shows the next brightness step and waits the band's breathing delay.
    pub async fn breathe(&mut self) {
        let breathing = self.band.breathing();
        let level = self.pulse.advance(breathing.step);

        if let Err(e) = self.pixel.show(self.band.color(), level) {
            log::error!("Failed to update pixel: {:?}", e);
        }
        Timer::after(breathing.delay).await;
    }

    pub async fn run<M: RawMutex>(mut self, updates: &Notification<M, f32>, timing: Timing) -> ! {
        log::info!("NEO task started, humidity responsive mode");
        loop {
            self.refresh(updates, timing.pixel_wait).await;
            self.breathe().await;
        }
    }
}
