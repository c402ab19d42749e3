use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};
use heapless::String;

use crate::{
    channel::Channels,
    classify::DisplayState,
    config::Timing,
    lcd::TextDisplay,
    sensors::Reading,
    state::LockUnavailable,
    status::Status,
};

pub type Line = String<32>;

/// Text for both LCD rows. `flash` selects the visible phase of the blinking
/// warning and critical layouts.
pub fn layout(reading: &Reading, state: DisplayState, flash: bool) -> (Line, &'static str) {
    let mut top = Line::new();
    let (t, h) = (reading.temperature, reading.humidity);

    let written = match state {
        DisplayState::Normal => write!(top, "OK {:.1}C {:.0}%", t, h),
        DisplayState::Warning => write!(top, "!W {:.1}C {:.0}%", t, h),
        DisplayState::Critical if flash => write!(top, "!!{:.1}C {:.0}%!!", t, h),
        DisplayState::Critical => Ok(()),
    };
    if written.is_err() {
        log::warn!("LCD line truncated to {:?} for {}°C {}%", top.as_str(), t, h);
    }

    let bottom = match state {
        DisplayState::Normal => "Status: NORMAL",
        DisplayState::Warning if flash => "**  WARNING  **",
        DisplayState::Warning => "   WARNING     ",
        DisplayState::Critical if flash => "*** CRITICAL ***",
        DisplayState::Critical => "",
    };

    (top, bottom)
}

/// The display consumer: drains the reading queue, keeps the shared display
/// state current and mirrors every reading to the status feed.
pub struct DisplayPanel<'a, M: RawMutex, D> {
    display: D,
    channels: &'a Channels<M>,
    timing: Timing,
    last: Option<Reading>,
    state: DisplayState,
    flash: bool,
    last_render: Option<Instant>,
}

impl<'a, M: RawMutex, D: TextDisplay> DisplayPanel<'a, M, D> {
    pub fn new(mut display: D, channels: &'a Channels<M>, timing: Timing) -> Self {
        if let Err(e) = display.render_lines("LCD Task Ready", "Waiting data...") {
            log::error!("Failed to write LCD splash: {:?}", e);
        }

        Self {
            display,
            channels,
            timing,
            last: None,
            state: DisplayState::Normal,
            flash: true,
            last_render: None,
        }
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    /// One iteration: wait for a reading, apply it or redraw the cached one
    /// when it is due, then idle briefly.
    ///
    /// Returns the classification of a newly received reading.
    pub async fn step(&mut self) -> Option<DisplayState> {
        let received = self
            .channels
            .readings
            .try_receive(self.timing.display_wait)
            .await;

        let applied = match received {
            Some(reading) => Some(self.apply(reading).await),
            None => {
                if self.refresh_due(Instant::now()) {
                    self.render();
                }
                None
            }
        };

        Timer::after(self.timing.display_idle).await;
        applied
    }

    async fn apply(&mut self, reading: Reading) -> DisplayState {
        log::info!(
            "LCD task: reading received, {}°C {}%",
            reading.temperature,
            reading.humidity
        );

        let state = DisplayState::classify(reading.temperature, reading.humidity);
        match self
            .channels
            .display_state
            .write(state, self.timing.state_lock_timeout)
            .await
        {
            Ok(previous) if previous != state => {
                log::info!("LCD task: state change {} -> {}", previous, state);
            }
            Ok(_) => {}
            Err(LockUnavailable) => {
                log::warn!("LCD task: display state busy, skipping update to {}", state);
            }
        }

        self.state = state;
        self.last = Some(reading);
        self.render();
        self.channels.status.broadcast(Status { reading, state });
        state
    }

    fn refresh_due(&self, now: Instant) -> bool {
        match (self.last, self.last_render) {
            (Some(_), Some(at)) => now >= at + self.state.refresh_interval(),
            _ => false,
        }
    }

    fn render(&mut self) {
        let Some(reading) = self.last else {
            return;
        };

        let (top, bottom) = layout(&reading, self.state, self.flash);
        if self.state != DisplayState::Normal {
            self.flash = !self.flash;
        }

        if let Err(e) = self.display.render_lines(&top, bottom) {
            log::error!("Failed to update LCD: {:?}", e);
        }
        self.last_render = Some(Instant::now());
    }

    pub async fn run(mut self) -> ! {
        log::info!("LCD task started, queue based updates");
        loop {
            self.step().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, pubsub::WaitResult};
    use embassy_time::Duration;

    #[derive(Default)]
    struct FakeLcd {
        frames: Vec<(std::string::String, std::string::String)>,
    }

    impl TextDisplay for FakeLcd {
        type Error = ();

        fn render_lines(&mut self, top: &str, bottom: &str) -> Result<(), ()> {
            self.frames.push((top.to_string(), bottom.to_string()));
            Ok(())
        }
    }

    fn quick_timing() -> Timing {
        Timing {
            display_wait: Duration::from_millis(10),
            display_idle: Duration::from_ticks(0),
            ..Timing::new()
        }
    }

    fn reading(temperature: f32, humidity: f32) -> Reading {
        Reading::new(temperature, humidity, Instant::from_millis(0))
    }

    #[test]
    fn test_layout_normal() {
        let (top, bottom) = layout(&reading(21.46, 44.6), DisplayState::Normal, true);
        assert_eq!(top.as_str(), "OK 21.5C 45%");
        assert_eq!(bottom, "Status: NORMAL");
    }

    #[test]
    fn test_layout_warning_alternates() {
        let r = reading(30.0, 50.0);
        assert_eq!(
            layout(&r, DisplayState::Warning, true).1,
            "**  WARNING  **"
        );
        assert_eq!(
            layout(&r, DisplayState::Warning, false).1,
            "   WARNING     "
        );
        assert_eq!(layout(&r, DisplayState::Warning, false).0.as_str(), "!W 30.0C 50%");
    }

    #[test]
    fn test_layout_critical_blanks_off_phase() {
        let r = reading(10.0, 20.0);
        let (top, bottom) = layout(&r, DisplayState::Critical, true);
        assert_eq!(top.as_str(), "!!10.0C 20%!!");
        assert_eq!(bottom, "*** CRITICAL ***");

        let (top, bottom) = layout(&r, DisplayState::Critical, false);
        assert!(top.is_empty() && bottom.is_empty());
    }

    #[test]
    fn test_layout_overflow_keeps_status_row() {
        let (top, bottom) = layout(&reading(1.0e30, 50.0), DisplayState::Normal, true);

        assert!(top.starts_with("OK "));
        assert!(top.len() <= top.capacity());
        assert_eq!(bottom, "Status: NORMAL");
    }

    #[test]
    fn test_cached_reading_redrawn_when_refresh_is_due() {
        let channels: Channels<CriticalSectionRawMutex> = Channels::new();
        // longer than the one second critical refresh interval
        let timing = Timing {
            display_wait: Duration::from_millis(1100),
            display_idle: Duration::from_ticks(0),
            ..Timing::new()
        };
        let mut panel = DisplayPanel::new(FakeLcd::default(), &channels, timing);

        block_on(async {
            assert!(channels.readings.try_send(reading(10.0, 20.0), Duration::from_ticks(0)).await);
            assert_eq!(panel.step().await, Some(DisplayState::Critical));
            assert_eq!(panel.step().await, None);
        });

        assert_eq!(
            panel.display.frames[1..],
            [
                ("!!10.0C 20%!!".to_string(), "*** CRITICAL ***".to_string()),
                (std::string::String::new(), std::string::String::new()),
            ]
        );
    }

    #[test]
    fn test_splash_before_first_reading() {
        let channels: Channels<CriticalSectionRawMutex> = Channels::new();
        let mut panel = DisplayPanel::new(FakeLcd::default(), &channels, quick_timing());

        assert_eq!(block_on(panel.step()), None);

        assert_eq!(
            panel.display.frames,
            vec![("LCD Task Ready".to_string(), "Waiting data...".to_string())]
        );
    }

    #[test]
    fn test_received_reading_updates_shared_state() {
        let channels: Channels<CriticalSectionRawMutex> = Channels::new();
        let mut subscriber = channels.status.subscriber().expect("subscriber slot");
        let mut panel = DisplayPanel::new(FakeLcd::default(), &channels, quick_timing());

        block_on(async {
            assert!(channels.readings.try_send(reading(31.0, 50.0), Duration::from_ticks(0)).await);
            assert_eq!(panel.step().await, Some(DisplayState::Warning));
            assert_eq!(channels.display_state.read().await, DisplayState::Warning);
        });

        assert_eq!(panel.state(), DisplayState::Warning);
        assert_eq!(
            panel.display.frames.last(),
            Some(&("!W 31.0C 50%".to_string(), "**  WARNING  **".to_string()))
        );
        assert!(matches!(
            subscriber.try_next_message(),
            Some(WaitResult::Message(status)) if status.state == DisplayState::Warning
        ));
    }

    #[test]
    fn test_every_buffered_reading_is_applied_in_order() {
        let channels: Channels<CriticalSectionRawMutex> = Channels::new();
        let mut panel = DisplayPanel::new(FakeLcd::default(), &channels, quick_timing());

        let states = block_on(async {
            for (t, h) in [(25.0, 50.0), (10.0, 50.0), (25.0, 50.0)] {
                channels
                    .readings
                    .try_send(reading(t, h), Duration::from_ticks(0))
                    .await;
            }
            let mut states = Vec::new();
            for _ in 0..3 {
                states.push(panel.step().await);
            }
            states
        });

        // the transient critical reading is not skipped
        assert_eq!(
            states,
            vec![
                Some(DisplayState::Normal),
                Some(DisplayState::Critical),
                Some(DisplayState::Normal)
            ]
        );
        assert_eq!(block_on(channels.display_state.read()), DisplayState::Normal);
    }

    #[test]
    fn test_refresh_due_follows_state_interval() {
        let channels: Channels<CriticalSectionRawMutex> = Channels::new();
        let mut panel = DisplayPanel::new(FakeLcd::default(), &channels, quick_timing());
        let rendered = Instant::from_millis(0);
        let later = Instant::from_millis(1500);

        assert!(!panel.refresh_due(later));

        panel.last = Some(reading(10.0, 20.0));
        panel.last_render = Some(rendered);
        panel.state = DisplayState::Critical;
        assert!(panel.refresh_due(later));

        panel.state = DisplayState::Normal;
        assert!(!panel.refresh_due(later));
    }
}
