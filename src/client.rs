//! Initiator-side roles: the request/response client and the polling
//! subscriber.
//!
//! Both remember whether they have identified on the current connection so a
//! reused connection never sends a second identification line.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{MxError, Result};
use crate::handler::{invoke_and_wrap, InvocationHandler};
use crate::message::{Payload, RequestMessage, ResponseMessage};
use crate::protocol::ExchangeStream;

/// Client endpoint of a connection: pushes requests and awaits responses.
pub struct ClientExchange<S> {
    stream: ExchangeStream<S>,
    identified: bool,
}

impl<S> ClientExchange<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: S) -> Self {
        ClientExchange {
            stream: ExchangeStream::new(transport),
            identified: false,
        }
    }

    /// Run one complete exchange: identify (first time only), HELLO/PROCEED,
    /// send the request, return the response.
    ///
    /// Failures before the request is sent are wrapped as
    /// connection-initialization failures, which are retryable on a fresh
    /// connection; failures after that propagate unchanged.
    pub async fn exchange(&mut self, request: RequestMessage) -> Result<ResponseMessage> {
        self.initialize()
            .await
            .map_err(|e| MxError::ConnectionInitialization(Box::new(e)))?;

        self.stream.send(Some(Payload::Request(request))).await?;
        match self.stream.receive().await? {
            Some(Payload::Response(response)) => Ok(response),
            Some(Payload::Request(_)) => Err(MxError::Protocol(
                "expected a response envelope, observed a request".into(),
            )),
            None => Err(MxError::Protocol(
                "expected a response envelope, observed the null sentinel".into(),
            )),
        }
    }

    async fn initialize(&mut self) -> Result<()> {
        if !self.identified {
            self.stream.identify_as_client().await?;
            self.identified = true;
            debug!("identified as client");
        }
        self.stream.send_hello().await?;
        self.stream.expect_proceed().await
    }
}

/// Subscriber endpoint of a connection: polls a server for queued work.
pub struct SubscriberExchange<S> {
    stream: ExchangeStream<S>,
    identified: bool,
}

impl<S> SubscriberExchange<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: S) -> Self {
        SubscriberExchange {
            stream: ExchangeStream::new(transport),
            identified: false,
        }
    }

    /// Drain one session of queued requests: receive, invoke, respond, until
    /// the server sends the null sentinel. Returns how many requests were
    /// processed.
    pub async fn poll<H>(&mut self, subscription_uri: &str, handler: &H) -> Result<usize>
    where
        H: InvocationHandler + ?Sized,
    {
        if !self.identified {
            self.stream.identify_as_subscriber(subscription_uri).await?;
            self.identified = true;
            debug!(subscription_uri, "identified as subscriber");
        }

        let mut processed = 0usize;
        loop {
            let Some(payload) = self.stream.receive().await? else {
                debug!(processed, "subscriber session ended by the null sentinel");
                return Ok(processed);
            };
            let request = match payload {
                Payload::Request(request) => request,
                Payload::Response(_) => {
                    return Err(MxError::Protocol(
                        "expected a request envelope, observed a response".into(),
                    ))
                }
            };
            let response = invoke_and_wrap(handler, request).await;
            self.stream.send(Some(Payload::Response(response))).await?;
            processed += 1;
        }
    }
}
