//! In-process subscription transport.
//!
//! Batches published on a `MemoryTransport` fan out to every live channel. Used for
//! embedded setups and tests; it can simulate connection drops and refused connects.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::TransportError;
use crate::query::FilterExpression;
use crate::trace::StreamMessage;

use super::transport::{Credentials, SubscriptionChannel, SubscriptionTransport};

#[derive(Debug)]
enum Delivery {
    Batch(Vec<StreamMessage>),
    Fail(TransportError),
}

#[derive(Debug, Default)]
struct Inner {
    filters: Vec<FilterExpression>,
    tokens: Vec<String>,
    connect_failures: VecDeque<TransportError>,
    live: Vec<Sender<Delivery>>,
}

/// Cloneable handle to a shared in-memory transport.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransport {
    /// Transport with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a batch to every live channel. Returns how many channels received it.
    pub fn publish(&self, batch: Vec<StreamMessage>) -> usize {
        let mut inner = self.lock();
        inner.live.retain(|tx| tx.send(Delivery::Batch(batch.clone())).is_ok());
        inner.live.len()
    }

    /// Fail every live channel with a transient `ConnectionLost`.
    pub fn drop_connections(&self) {
        self.fail_connections(TransportError::ConnectionLost {
            message: "connection dropped".to_string(),
        });
    }

    /// Fail every live channel with `error`.
    pub fn fail_connections(&self, error: TransportError) {
        let mut inner = self.lock();
        for tx in inner.live.drain(..) {
            let _ = tx.send(Delivery::Fail(error.clone()));
        }
    }

    /// Make the next `connect` call fail with `error`. Queued failures apply in order.
    pub fn fail_next_connect(&self, error: TransportError) {
        self.lock().connect_failures.push_back(error);
    }

    /// Connection attempts that succeeded so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock().filters.len()
    }

    /// Filters of every successful connection, in order.
    #[must_use]
    pub fn filters(&self) -> Vec<FilterExpression> {
        self.lock().filters.clone()
    }

    /// Tokens presented by every successful connection, in order.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.lock().tokens.clone()
    }

    /// Block until at least `count` connections have been made.
    #[must_use]
    pub fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.connection_count() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl SubscriptionTransport for MemoryTransport {
    fn connect(
        &self,
        filter: &FilterExpression,
        credentials: &Credentials,
    ) -> Result<Box<dyn SubscriptionChannel>, TransportError> {
        let mut inner = self.lock();
        if let Some(err) = inner.connect_failures.pop_front() {
            return Err(err);
        }

        let (tx, rx) = unbounded();
        inner.live.push(tx);
        inner.filters.push(filter.clone());
        inner.tokens.push(credentials.token().to_string());

        Ok(Box::new(MemoryChannel { rx }))
    }
}

struct MemoryChannel {
    rx: Receiver<Delivery>,
}

impl SubscriptionChannel for MemoryChannel {
    fn next_batch(&mut self, timeout: Duration) -> Result<Option<Vec<StreamMessage>>, TransportError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Delivery::Batch(batch)) => Ok(Some(batch)),
            Ok(Delivery::Fail(err)) => Err(err),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::ConnectionLost {
                message: "memory transport dropped channel".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TransactionTrace;

    fn creds() -> Credentials {
        Credentials::new("tok", None)
    }

    #[test]
    fn publish_reaches_connected_channel() {
        let transport = MemoryTransport::new();
        let mut channel = transport
            .connect(&FilterExpression::new("event.a:1"), &creds())
            .unwrap();

        let delivered = transport.publish(vec![StreamMessage::new(TransactionTrace::new("t", Vec::new()))]);
        assert_eq!(delivered, 1);

        let batch = channel.next_batch(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(batch[0].trace_id().as_str(), "t");
        assert_eq!(channel.next_batch(Duration::from_millis(1)).unwrap(), None);
        assert_eq!(transport.tokens(), vec!["tok".to_string()]);
    }

    #[test]
    fn dropped_channels_are_pruned() {
        let transport = MemoryTransport::new();
        let channel = transport
            .connect(&FilterExpression::new("event.a:1"), &creds())
            .unwrap();
        drop(channel);
        assert_eq!(transport.publish(Vec::new()), 0);
    }

    #[test]
    fn queued_connect_failures_apply_in_order() {
        let transport = MemoryTransport::new();
        transport.fail_next_connect(TransportError::ConnectFailed {
            message: "refused".to_string(),
        });

        let filter = FilterExpression::new("event.a:1");
        assert!(transport.connect(&filter, &creds()).is_err());
        assert!(transport.connect(&filter, &creds()).is_ok());
        assert_eq!(transport.connection_count(), 1);
    }

    #[test]
    fn drop_connections_surfaces_transient_error() {
        let transport = MemoryTransport::new();
        let mut channel = transport
            .connect(&FilterExpression::new("event.a:1"), &creds())
            .unwrap();
        transport.drop_connections();

        let err = channel.next_batch(Duration::from_millis(100)).unwrap_err();
        assert!(err.is_transient());
    }
}
