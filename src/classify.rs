//! Range tables mapping a reading to the behavior of each output.
//!
//! Intervals are half-open, low bound inclusive, unless noted otherwise.

use core::fmt;

use embassy_time::Duration;
use smart_leds::RGB8;

/// LED behavior derived from temperature (°C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureBand {
    /// below 20
    Cold,
    /// 20 up to 28
    Comfortable,
    /// 28 up to 35
    Warm,
    /// 35 and above
    Hot,
}

/// On/off times of one blink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkPattern {
    pub on: Duration,
    pub off: Duration,
}

impl BlinkPattern {
    const fn symmetric(millis: u64) -> Self {
        Self {
            on: Duration::from_millis(millis),
            off: Duration::from_millis(millis),
        }
    }
}

impl TemperatureBand {
    pub fn classify(temperature: f32) -> Self {
        if temperature < 20.0 {
            Self::Cold
        } else if temperature < 28.0 {
            Self::Comfortable
        } else if temperature < 35.0 {
            Self::Warm
        } else {
            Self::Hot
        }
    }

    pub const fn blink(self) -> BlinkPattern {
        match self {
            Self::Cold => BlinkPattern::symmetric(1000),
            Self::Comfortable => BlinkPattern::symmetric(500),
            Self::Warm => BlinkPattern::symmetric(200),
            Self::Hot => BlinkPattern::symmetric(100),
        }
    }
}

/// Pixel behavior derived from relative humidity (%).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumidityBand {
    /// below 30
    Dry,
    /// 30 up to 40
    Low,
    /// 40 up to 60
    Comfortable,
    /// 60 up to 70
    High,
    /// 70 and above
    VeryHigh,
}

/// How fast the pixel brightness pulses: `step` brightness units every `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breathing {
    pub step: u8,
    pub delay: Duration,
}

impl HumidityBand {
    pub fn classify(humidity: f32) -> Self {
        if humidity < 30.0 {
            Self::Dry
        } else if humidity < 40.0 {
            Self::Low
        } else if humidity < 60.0 {
            Self::Comfortable
        } else if humidity < 70.0 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }

    pub const fn color(self) -> RGB8 {
        match self {
            Self::Dry => RGB8 { r: 255, g: 165, b: 0 },
            Self::Low => RGB8 { r: 255, g: 255, b: 0 },
            Self::Comfortable => RGB8 { r: 0, g: 255, b: 0 },
            Self::High => RGB8 { r: 0, g: 255, b: 255 },
            Self::VeryHigh => RGB8 { r: 0, g: 0, b: 255 },
        }
    }

    pub const fn breathing(self) -> Breathing {
        let (step, millis) = match self {
            Self::Dry => (5, 30),
            Self::Low => (3, 40),
            Self::Comfortable => (2, 50),
            Self::High => (4, 35),
            Self::VeryHigh => (7, 20),
        };
        Breathing {
            step,
            delay: Duration::from_millis(millis),
        }
    }
}

/// Overall comfort level shown on the LCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayState {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl DisplayState {
    /// Critical outside 15..=32 °C or 30..=70 %, warning close to those
    /// limits, normal otherwise.
    pub fn classify(temperature: f32, humidity: f32) -> Self {
        if temperature < 15.0 || temperature > 32.0 || humidity < 30.0 || humidity > 70.0 {
            Self::Critical
        } else if (15.0..18.0).contains(&temperature)
            || (temperature > 28.0 && temperature <= 32.0)
            || (30.0..40.0).contains(&humidity)
            || (humidity > 60.0 && humidity <= 70.0)
        {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    /// How often the display should be redrawn while in this state.
    pub const fn refresh_interval(self) -> Duration {
        match self {
            Self::Normal => Duration::from_secs(5),
            Self::Warning => Duration::from_secs(2),
            Self::Critical => Duration::from_secs(1),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
