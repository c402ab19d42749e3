use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Timer};
use embedded_hal::digital::{Error as _, OutputPin};

use crate::{
    channel::Notification,
    classify::{BlinkPattern, TemperatureBand},
    config::Timing,
};

const DEFAULT_TEMPERATURE: f32 = 25.0;

/// Blinks a single LED faster the warmer it gets.
pub struct LedIndicator<P> {
    pin: P,
    temperature: f32,
    band: TemperatureBand,
}

impl<P: OutputPin> LedIndicator<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            temperature: DEFAULT_TEMPERATURE,
            band: TemperatureBand::classify(DEFAULT_TEMPERATURE),
        }
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn band(&self) -> TemperatureBand {
        self.band
    }

    pub fn pattern(&self) -> BlinkPattern {
        self.band.blink()
    }

    /// Takes a temperature update if one arrives within `wait`.
    ///
    /// Returns `false` on timeout, leaving the cached temperature in place.
    pub async fn refresh<M: RawMutex>(
        &mut self,
        updates: &Notification<M, f32>,
        wait: Duration,
    ) -> bool {
        match updates.wait_for(wait).await {
            Some(temperature) => {
                self.apply(temperature);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, temperature: f32) {
        log::info!("LED task: temperature update received: {}°C", temperature);

        let band = TemperatureBand::classify(temperature);
        if band != self.band {
            log::info!("LED mode {:?} -> {:?}", self.band, band);
        }
        self.temperature = temperature;
        self.band = band;
    }

    /// One on/off period with the current pattern.
    pub async fn blink(&mut self) {
        let pattern = self.band.blink();

        if let Err(e) = self.pin.set_high() {
            log::error!("Failed to switch LED on: {:?}", e.kind());
        }
        Timer::after(pattern.on).await;

        if let Err(e) = self.pin.set_low() {
            log::error!("Failed to switch LED off: {:?}", e.kind());
        }
        Timer::after(pattern.off).await;
    }

    pub async fn run<M: RawMutex>(mut self, updates: &Notification<M, f32>, timing: Timing) -> ! {
        log::info!("LED task started, temperature responsive mode");
        loop {
            self.refresh(updates, timing.led_wait).await;
            self.blink().await;
        }
    }
}
