use embassy_sync::{blocking_mutex::raw::RawMutex, mutex::Mutex};
use embassy_time::{with_timeout, Duration};

use crate::classify::DisplayState;

/// The display lock could not be taken in time; the update was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockUnavailable;

/// Current display classification behind a lock.
///
/// Only copies go in and out; the guard is never held across anything but the
/// copy itself.
pub struct SharedDisplayState<M: RawMutex> {
    current: Mutex<M, DisplayState>,
}

impl<M: RawMutex> SharedDisplayState<M> {
    pub const fn new() -> Self {
        Self {
            current: Mutex::new(DisplayState::Normal),
        }
    }

    /// Waits for the lock without a bound. Writers only hold it for a copy,
    /// so this never waits longer than one assignment.
    pub async fn read(&self) -> DisplayState {
        *self.current.lock().await
    }

    /// Like [`read`](Self::read), giving up after `timeout`.
    pub async fn read_within(&self, timeout: Duration) -> Result<DisplayState, LockUnavailable> {
        with_timeout(timeout, self.current.lock())
            .await
            .map(|state| *state)
            .map_err(|_| LockUnavailable)
    }

    /// Non-blocking read, `None` while a write holds the lock.
    pub fn try_read(&self) -> Option<DisplayState> {
        self.current.try_lock().ok().map(|state| *state)
    }

    /// Stores `state` and returns the one it replaced.
    pub async fn write(
        &self,
        state: DisplayState,
        timeout: Duration,
    ) -> Result<DisplayState, LockUnavailable> {
        let mut current = with_timeout(timeout, self.current.lock())
            .await
            .map_err(|_| LockUnavailable)?;
        let previous = *current;
        *current = state;
        Ok(previous)
    }
}

impl<M: RawMutex> Default for SharedDisplayState<M> {
    fn default() -> Self {
        Self::new()
    }
}
