//! Server-side role: accept an identified peer and serve it.
//!
//! The branch is picked by the remote's declared identity: clients get the
//! HELLO/PROCEED request loop, subscribers get their pending queue drained
//! one request at a time.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{MxError, Result};
use crate::handler::{invoke_and_wrap, InvocationHandler};
use crate::message::{Payload, RequestMessage, ResponseMessage};
use crate::protocol::{ExchangeStream, IdentityKind, RemoteIdentity};
use crate::queue::PendingRequestQueue;

/// Server endpoint of a connection.
pub struct ServerExchange<S> {
    stream: ExchangeStream<S>,
}

impl<S> ServerExchange<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: S) -> Self {
        ServerExchange {
            stream: ExchangeStream::new(transport),
        }
    }

    /// Serve one session on this connection: read the remote's identity,
    /// answer with ours, then run the matching serving loop.
    pub async fn run<H, L>(&mut self, handler: &H, queue_lookup: L) -> Result<()>
    where
        H: InvocationHandler + ?Sized,
        L: FnOnce(&RemoteIdentity) -> Arc<dyn PendingRequestQueue>,
    {
        let identity = self.stream.read_remote_identity().await?;
        self.stream.identify_as_server().await?;

        match identity.kind {
            IdentityKind::Client => self.serve_client(handler).await,
            IdentityKind::Subscriber => {
                let queue = queue_lookup(&identity);
                self.serve_subscriber(queue.as_ref()).await
            }
            IdentityKind::Server => Err(MxError::Protocol(
                "remote identified as a server; nothing to serve it".into(),
            )),
        }
    }

    /// Request loop for a pushing client. Ends gracefully when the peer
    /// closes the connection where the next `HELLO` would begin.
    async fn serve_client<H>(&mut self, handler: &H) -> Result<()>
    where
        H: InvocationHandler + ?Sized,
    {
        let mut served = 0u64;
        loop {
            if !self.stream.await_hello().await? {
                debug!(served, "client disconnected between exchanges");
                return Ok(());
            }
            self.stream.send_proceed().await?;

            let request = expect_request(self.stream.receive().await?)?;
            let response = invoke_and_wrap(handler, request).await;
            self.stream.send(Some(Payload::Response(response))).await?;
            served += 1;
        }
    }

    /// Drain the pending queue into a polling subscriber. The null sentinel
    /// both ends this loop and tells the subscriber its session is over.
    ///
    /// A request handed out by the queue is never left dangling: if the
    /// response cannot be read back, a synthesized failure carrying the
    /// request's correlation id is applied before the error propagates.
    async fn serve_subscriber(&mut self, queue: &dyn PendingRequestQueue) -> Result<()> {
        loop {
            let next = queue.dequeue().await;
            let correlation = next.as_ref().map(|r| r.id.clone());
            if let Err(err) = self.stream.send(next.map(Payload::Request)).await {
                if let Some(correlation) = correlation {
                    queue
                        .apply_response(ResponseMessage::from_error(&correlation, &err))
                        .await;
                }
                return Err(err);
            }

            let Some(correlation) = correlation else {
                debug!("no pending work; subscriber session closed with the null sentinel");
                return Ok(());
            };

            let outcome = match self.stream.receive().await {
                Ok(Some(Payload::Response(response))) => Ok(response),
                Ok(Some(Payload::Request(_))) => Err(MxError::Protocol(
                    "expected a response envelope, observed a request".into(),
                )),
                Ok(None) => Err(MxError::Protocol(
                    "expected a response envelope, observed the null sentinel".into(),
                )),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(response) => queue.apply_response(response).await,
                Err(err) => {
                    queue
                        .apply_response(ResponseMessage::from_error(&correlation, &err))
                        .await;
                    return Err(err);
                }
            }
        }
    }
}

fn expect_request(payload: Option<Payload>) -> Result<RequestMessage> {
    match payload {
        Some(Payload::Request(request)) => Ok(request),
        Some(Payload::Response(_)) => Err(MxError::Protocol(
            "expected a request envelope, observed a response".into(),
        )),
        None => Err(MxError::Protocol(
            "expected a request envelope, observed the null sentinel".into(),
        )),
    }
}
