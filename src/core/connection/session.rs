use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::transport::{InboundResponse, StreamId, TransportConnection};

/// A request issued on a particular session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle {
    pub epoch: u64,
    pub stream: StreamId,
}

/// One connection epoch.
///
/// Counters restart at zero with every new session. Identifiers embed the session
/// start time, which is strictly greater than that of every earlier session of the same
/// manager, so identifiers never repeat within one manager's lifetime.
pub(super) struct Session {
    pub epoch: u64,
    pub connection: Box<dyn TransportConnection>,
    pub start_time: u64,
    message_counter: u64,
    dialog_counter: u64,
    pub keepalive_cancel: CancellationToken,
    /// Held open for the life of the session; never read
    pub downchannel: Option<InboundResponse>,
    pub last_activity: Arc<Mutex<Instant>>,
}

/// Start time in unix milliseconds, bumped past `last` when the clock has not moved on.
pub(super) fn next_start_time(last: &AtomicU64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default();

    let previous = last
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |previous| {
            Some(now.max(previous + 1))
        })
        .unwrap_or_else(|previous| previous);
    now.max(previous + 1)
}

impl Session {
    pub fn new(
        epoch: u64,
        start_time: u64,
        connection: Box<dyn TransportConnection>,
        keepalive_cancel: CancellationToken,
    ) -> Self {
        Self {
            epoch,
            connection,
            start_time,
            message_counter: 0,
            dialog_counter: 0,
            keepalive_cancel,
            downchannel: None,
            last_activity: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn next_message_id(&mut self) -> String {
        let id = format!("message-{}-{}", self.start_time, self.message_counter);
        self.message_counter += 1;
        id
    }

    pub fn next_dialog_request_id(&mut self) -> String {
        let id = format!("dialog-{}-{}", self.start_time, self.dialog_counter);
        self.dialog_counter += 1;
        id
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn handle(&self, stream: StreamId) -> StreamHandle {
        StreamHandle {
            epoch: self.epoch,
            stream,
        }
    }

    /// Stop the keepalive and close the transport.
    pub async fn shutdown(mut self) {
        self.keepalive_cancel.cancel();
        self.downchannel.take();
        self.connection.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_time_strictly_increases() {
        let last = AtomicU64::new(0);
        let first = next_start_time(&last);
        let second = next_start_time(&last);
        let third = next_start_time(&last);

        assert!(second > first);
        assert!(third > second);
        assert_eq!(last.load(Ordering::SeqCst), third);
    }

    #[test]
    fn test_start_time_moves_past_a_clock_behind_the_last_session() {
        let ahead = u64::MAX / 2;
        let last = AtomicU64::new(ahead);

        assert_eq!(next_start_time(&last), ahead + 1);
        assert_eq!(next_start_time(&last), ahead + 2);
    }
}
