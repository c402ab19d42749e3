use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    pubsub::{DynSubscriber, Error, PubSubChannel},
};
use heapless::String;
use numtoa::NumToA;

use crate::{classify::DisplayState, sensors::Reading};

const CAPACITY: usize = 4;
const SUBSCRIBERS: usize = 1;
const PUBLISHERS: usize = 1;

/// What the network side gets to see.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Status {
    pub reading: Reading,
    pub state: DisplayState,
}

/// Fan-out of status updates to network collaborators.
///
/// Broadcasting never blocks. Without subscribers the update goes nowhere;
/// a slow subscriber loses the oldest updates and sees a lag count.
pub struct StatusFeed<M: RawMutex> {
    channel: PubSubChannel<M, Status, CAPACITY, SUBSCRIBERS, PUBLISHERS>,
}

impl<M: RawMutex> StatusFeed<M> {
    pub const fn new() -> Self {
        Self {
            channel: PubSubChannel::new(),
        }
    }

    pub fn broadcast(&self, status: Status) {
        self.channel.immediate_publisher().publish_immediate(status);
    }

    pub fn subscriber(&self) -> Result<DynSubscriber<'_, Status>, Error> {
        self.channel.dyn_subscriber()
    }
}

impl<M: RawMutex> Default for StatusFeed<M> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn create_json_payload(status: &Status) -> Result<String<128>, ()> {
    let mut payload = String::new();
    let mut floats = ryu::Buffer::new();
    let mut digits = [0u8; 20];

    payload.push_str("{\"temperature\":")?;
    payload.push_str(floats.format(status.reading.temperature))?;
    payload.push_str(",\"humidity\":")?;
    payload.push_str(floats.format(status.reading.humidity))?;
    payload.push_str(",\"state\":\"")?;
    payload.push_str(status.state.as_str())?;
    payload.push_str("\",\"uptime_ms\":")?;
    payload.push_str(
        status
            .reading
            .timestamp
            .as_millis()
            .numtoa_str(10, &mut digits),
    )?;
    payload.push_str("}")?;

    Ok(payload)
}

pub fn create_http_post_request(status: &Status) -> Result<String<1024>, ()> {
    let mut request = String::new();

    let payload = create_json_payload(status)?;

    request.push_str("POST /data HTTP/1.1\r\n")?;
    request.push_str("Content-Type: application/json\r\n")?;
    request.push_str("Connection: close\r\n")?;

    request.push_str("Content-Length: ")?;
    let mut buf = [0u8; 20];
    request.push_str(payload.len().numtoa_str(10, &mut buf))?;

    request.push_str("\r\n\r\n")?;
    request.push_str(payload.as_str())?;

    Ok(request)
}
