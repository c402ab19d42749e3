use embassy_time::Duration;

/// Number of readings the display queue can buffer.
pub const QUEUE_DEPTH: usize = 5;

/// Periods and timeouts used by the tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Delay between two sensor polls.
    pub poll_period: Duration,
    /// How long the monitor waits for room in the display queue.
    pub queue_send_timeout: Duration,
    /// LED wait on its notification before blinking with the cached pattern.
    pub led_wait: Duration,
    /// Pixel wait on its notification before the next breathing step.
    pub pixel_wait: Duration,
    /// Display wait on the reading queue.
    pub display_wait: Duration,
    /// Pause at the end of every display iteration.
    pub display_idle: Duration,
    /// Bound on acquiring the shared display state for a write.
    pub state_lock_timeout: Duration,
}

impl Timing {
    pub const fn new() -> Self {
        Self {
            poll_period: Duration::from_secs(5),
            queue_send_timeout: Duration::from_millis(100),
            led_wait: Duration::from_millis(100),
            pixel_wait: Duration::from_millis(100),
            display_wait: Duration::from_millis(500),
            display_idle: Duration::from_millis(100),
            state_lock_timeout: Duration::from_millis(100),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::new()
    }
}
