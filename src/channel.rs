use core::task::Poll;

use embassy_futures::poll_once;
use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Channel, TrySendError},
    signal::Signal,
};
use embassy_time::{with_timeout, Duration};

use crate::{config::QUEUE_DEPTH, sensors::Reading, state::SharedDisplayState, status::StatusFeed};

/// Single-slot "new data" notification.
///
/// At most one value is pending: signalling again before the consumer takes it
/// replaces the pending value, so bursts collapse into one wake-up carrying the
/// latest value. There is no update counting.
pub struct Notification<M: RawMutex, T> {
    slot: Signal<M, T>,
}

impl<M: RawMutex, T> Notification<M, T> {
    pub const fn new() -> Self {
        Self {
            slot: Signal::new(),
        }
    }
}

impl<M: RawMutex, T: Send> Notification<M, T> {
    /// Marks the slot as pending with `value`, replacing anything not yet taken.
    pub fn signal(&self, value: T) {
        self.slot.signal(value);
    }

    /// Takes the pending value without waiting.
    pub fn try_take(&self) -> Option<T> {
        match poll_once(self.slot.wait()) {
            Poll::Ready(value) => Some(value),
            Poll::Pending => None,
        }
    }

    /// Waits up to `timeout` for a pending value and clears the slot.
    ///
    /// `None` means nothing arrived in time; callers keep their cached value.
    pub async fn wait_for(&self, timeout: Duration) -> Option<T> {
        if let Some(value) = self.try_take() {
            return Some(value);
        }
        with_timeout(timeout, self.slot.wait()).await.ok()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.signaled()
    }
}

impl<M: RawMutex, T> Default for Notification<M, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded FIFO between one producer and one consumer.
///
/// A send on a full queue waits up to its timeout for a slot and then drops the
/// item it was trying to send. A zero timeout makes that plain drop-newest.
pub struct BoundedQueue<M: RawMutex, T, const N: usize> {
    inner: Channel<M, T, N>,
}

pub type ReadingQueue<M> = BoundedQueue<M, Reading, QUEUE_DEPTH>;

impl<M: RawMutex, T, const N: usize> BoundedQueue<M, T, N> {
    pub const fn new() -> Self {
        Self {
            inner: Channel::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Returns `false` when the queue stayed full for the whole `timeout`.
    pub async fn try_send(&self, item: T, timeout: Duration) -> bool {
        match self.inner.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(item)) => {
                with_timeout(timeout, self.inner.send(item)).await.is_ok()
            }
        }
    }

    /// Oldest item, or `None` when nothing arrived within `timeout`.
    pub async fn try_receive(&self, timeout: Duration) -> Option<T> {
        if let Ok(item) = self.inner.try_receive() {
            return Some(item);
        }
        with_timeout(timeout, self.inner.receive()).await.ok()
    }
}

impl<M: RawMutex, T, const N: usize> Default for BoundedQueue<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the tasks share, built in a `static` by the firmware.
pub struct Channels<M: RawMutex> {
    /// Latest temperature for the LED task.
    pub temperature: Notification<M, f32>,
    /// Latest humidity for the pixel task.
    pub humidity: Notification<M, f32>,
    /// Every reading, for the display task.
    pub readings: ReadingQueue<M>,
    pub display_state: SharedDisplayState<M>,
    pub status: StatusFeed<M>,
}

impl<M: RawMutex> Channels<M> {
    pub const fn new() -> Self {
        Self {
            temperature: Notification::new(),
            humidity: Notification::new(),
            readings: BoundedQueue::new(),
            display_state: SharedDisplayState::new(),
            status: StatusFeed::new(),
        }
    }
}

impl<M: RawMutex> Default for Channels<M> {
    fn default() -> Self {
        Self::new()
    }
}
