//! Pending-request queues feeding subscriber sessions.
//!
//! The server's subscriber-serving loop pulls work from a queue looked up by
//! the subscriber's identity. `None` from `dequeue` means "no work for now"
//! and becomes the null sentinel that ends the session gracefully.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::ExchangeTimeouts;
use crate::handler::BoxFuture;
use crate::message::{RequestMessage, ResponseMessage};

/// Work source for one subscription.
pub trait PendingRequestQueue: Send + Sync {
    /// Next request, or `None` once the bounded wait elapses or the queue
    /// shuts down.
    fn dequeue(&self) -> BoxFuture<'_, Option<RequestMessage>>;

    /// Deliver the response (or synthesized failure) for a request this
    /// queue handed out.
    fn apply_response(&self, response: ResponseMessage) -> BoxFuture<'_, ()>;
}

/// In-process queue backed by tokio primitives.
pub struct InMemoryRequestQueue {
    pending: Mutex<VecDeque<RequestMessage>>,
    responses: Mutex<Vec<ResponseMessage>>,
    notify: Notify,
    wait: Duration,
    closed: AtomicBool,
}

impl InMemoryRequestQueue {
    /// `wait` bounds how long a subscriber session blocks on an empty queue
    /// before the null sentinel is sent (`polling_queue_wait_timeout`).
    pub fn new(wait: Duration) -> Self {
        InMemoryRequestQueue {
            pending: Mutex::new(VecDeque::new()),
            responses: Mutex::new(Vec::new()),
            notify: Notify::new(),
            wait,
            closed: AtomicBool::new(false),
        }
    }

    /// Queue using the configured `polling_queue_wait_timeout`.
    pub fn with_timeouts(timeouts: &ExchangeTimeouts) -> Self {
        Self::new(timeouts.polling_queue_wait_timeout)
    }

    pub fn enqueue(&self, request: RequestMessage) {
        self.pending.lock().push_back(request);
        self.notify.notify_one();
    }

    /// Shut down: waiters wake and observe the sentinel immediately.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Responses applied so far, in arrival order.
    pub fn take_responses(&self) -> Vec<ResponseMessage> {
        std::mem::take(&mut *self.responses.lock())
    }
}

impl PendingRequestQueue for InMemoryRequestQueue {
    fn dequeue(&self) -> BoxFuture<'_, Option<RequestMessage>> {
        Box::pin(async move {
            let waiting = async {
                loop {
                    let notified = self.notify.notified();
                    if let Some(request) = self.pending.lock().pop_front() {
                        return Some(request);
                    }
                    if self.closed.load(Ordering::Acquire) {
                        return None;
                    }
                    notified.await;
                }
            };
            tokio::time::timeout(self.wait, waiting)
                .await
                .unwrap_or(None)
        })
    }

    fn apply_response(&self, response: ResponseMessage) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.responses.lock().push(response);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dequeue_returns_queued_requests_in_order() {
        let queue = InMemoryRequestQueue::new(Duration::from_millis(50));
        queue.enqueue(RequestMessage::new("Q1", "svc", "a"));
        queue.enqueue(RequestMessage::new("Q2", "svc", "b"));

        assert_eq!(queue.dequeue().await.unwrap().id, "Q1");
        assert_eq!(queue.dequeue().await.unwrap().id, "Q2");
    }

    #[tokio::test]
    async fn empty_queue_times_out_with_the_sentinel() {
        let queue = InMemoryRequestQueue::new(Duration::from_millis(20));
        assert!(queue.dequeue().await.is_none());
    }

    #[test]
    fn with_timeouts_uses_the_polling_queue_wait() {
        let timeouts = ExchangeTimeouts::default();
        let queue = InMemoryRequestQueue::with_timeouts(&timeouts);
        assert_eq!(queue.wait, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn close_wakes_a_blocked_dequeue() {
        let queue = std::sync::Arc::new(InMemoryRequestQueue::new(Duration::from_secs(30)));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::task::yield_now().await;
        queue.close();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enqueue_wakes_a_blocked_dequeue() {
        let queue = std::sync::Arc::new(InMemoryRequestQueue::new(Duration::from_secs(30)));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::task::yield_now().await;
        queue.enqueue(RequestMessage::new("Q9", "svc", "late"));
        assert_eq!(waiter.await.unwrap().unwrap().id, "Q9");
    }

    #[tokio::test]
    async fn responses_accumulate_in_arrival_order() {
        let queue = InMemoryRequestQueue::new(Duration::from_millis(20));
        queue
            .apply_response(ResponseMessage::success("Q1", crate::message::Value::Null))
            .await;
        queue
            .apply_response(ResponseMessage::success("Q2", crate::message::Value::Null))
            .await;

        let responses = queue.take_responses();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id, "Q1");
        assert_eq!(responses[1].id, "Q2");
    }
}
