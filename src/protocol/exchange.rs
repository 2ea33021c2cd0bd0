//! Protocol-meaningful primitives over the frame codec.
//!
//! Identification, the HELLO/PROCEED flow control lines, and envelope
//! send/receive with the attachment-draining discipline: attachments
//! referenced by an envelope are fully on disk before the next envelope is
//! touched. Every write is followed by an explicit flush.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{MxError, Result};
use crate::message::{MessageEnvelope, Payload, StreamCapture};
use crate::protocol::frame::FrameCodec;
use crate::protocol::identity::{
    IdentityKind, RemoteIdentity, CLIENT_TOKEN, PROTOCOL_VERSION, SERVER_TOKEN, SUBSCRIBER_TOKEN,
};

const HELLO: &str = "HELLO";
const PROCEED: &str = "PROCEED";

/// One endpoint's view of a connection. Not safe for concurrent use; each
/// connection's state machine runs strictly sequentially.
pub struct ExchangeStream<S> {
    codec: FrameCodec<S>,
}

impl<S> ExchangeStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: S) -> Self {
        ExchangeStream {
            codec: FrameCodec::new(transport),
        }
    }

    /// Announce ourselves as a client and verify the remote is a server.
    pub async fn identify_as_client(&mut self) -> Result<()> {
        self.write_identity_line(&format!("{CLIENT_TOKEN} {PROTOCOL_VERSION}"))
            .await?;
        self.expect_server_identity().await
    }

    /// Announce ourselves as a subscriber for `subscription_uri` and verify
    /// the remote is a server.
    pub async fn identify_as_subscriber(&mut self, subscription_uri: &str) -> Result<()> {
        self.write_identity_line(&format!(
            "{SUBSCRIBER_TOKEN} {PROTOCOL_VERSION} {subscription_uri}"
        ))
        .await?;
        self.expect_server_identity().await
    }

    /// Announce ourselves as a server.
    pub async fn identify_as_server(&mut self) -> Result<()> {
        self.write_identity_line(&format!("{SERVER_TOKEN} {PROTOCOL_VERSION}"))
            .await
    }

    /// Read and parse the remote's identification line.
    pub async fn read_remote_identity(&mut self) -> Result<RemoteIdentity> {
        let line = self
            .codec
            .read_line()
            .await?
            .ok_or(MxError::ConnectionClosed)?;
        let identity = RemoteIdentity::parse(&line)?;
        debug!(?identity, "remote identified");
        Ok(identity)
    }

    pub async fn send_hello(&mut self) -> Result<()> {
        self.codec.write_line(HELLO).await?;
        self.codec.flush().await
    }

    pub async fn send_proceed(&mut self) -> Result<()> {
        self.codec.write_line(PROCEED).await?;
        self.codec.flush().await
    }

    /// Wait for `PROCEED`. A closed stream here is reported as the
    /// authentication-like failure rather than a generic protocol error.
    pub async fn expect_proceed(&mut self) -> Result<()> {
        match self.codec.read_line().await? {
            None => Err(MxError::AuthenticationFailed),
            Some(line) if line == PROCEED => Ok(()),
            Some(other) => Err(MxError::unexpected(PROCEED, &other)),
        }
    }

    /// Wait for the next `HELLO`. Returns `false` when the peer closed the
    /// stream instead, which is how a serving loop ends gracefully.
    pub async fn await_hello(&mut self) -> Result<bool> {
        match self.codec.read_line().await? {
            None => Ok(false),
            Some(line) if line == HELLO => Ok(true),
            Some(other) => Err(MxError::unexpected(HELLO, &other)),
        }
    }

    /// Strict form of [`await_hello`] for positions where the peer must not
    /// hang up.
    ///
    /// [`await_hello`]: ExchangeStream::await_hello
    pub async fn expect_hello(&mut self) -> Result<()> {
        if self.await_hello().await? {
            Ok(())
        } else {
            Err(MxError::ConnectionClosed)
        }
    }

    /// Send one envelope followed by every attachment it references, in the
    /// order they were discovered in the message graph.
    pub async fn send(&mut self, message: Option<Payload>) -> Result<()> {
        let envelope = MessageEnvelope { message };
        let capture = StreamCapture::of(&envelope)?;
        self.codec.write_envelope(&envelope).await?;
        for stream in capture.iter() {
            self.codec.write_attachment(stream).await?;
        }
        self.codec.flush().await?;
        Ok(())
    }

    /// Receive one envelope and drain exactly as many attachment blocks as
    /// the decoded message references. `None` is the legal null envelope.
    pub async fn receive(&mut self) -> Result<Option<Payload>> {
        let envelope = self.codec.read_envelope().await?;
        let capture = StreamCapture::of(&envelope)?;
        for _ in 0..capture.len() {
            self.codec.read_attachment(&capture).await?;
        }
        Ok(envelope.message)
    }

    async fn write_identity_line(&mut self, line: &str) -> Result<()> {
        self.codec.write_line(line).await?;
        // Blank line after the identity, for human readability of captures.
        self.codec.write_line("").await?;
        self.codec.flush().await
    }

    async fn expect_server_identity(&mut self) -> Result<()> {
        let identity = self.read_remote_identity().await?;
        if identity.kind != IdentityKind::Server {
            return Err(MxError::Protocol(format!(
                "expected the remote to identify as a server, observed {:?}",
                identity.kind
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DataStream, RequestMessage, Value};
    use bytes::Bytes;
    use tokio::io::{duplex, AsyncWriteExt};

    #[tokio::test]
    async fn identify_handshake_between_client_and_server() {
        let (client_side, server_side) = duplex(4096);
        let mut client = ExchangeStream::new(client_side);
        let mut server = ExchangeStream::new(server_side);

        let (client_result, identity) = tokio::join!(client.identify_as_client(), async {
            let identity = server.read_remote_identity().await?;
            server.identify_as_server().await?;
            Ok::<_, MxError>(identity)
        });
        client_result.unwrap();
        assert_eq!(identity.unwrap(), RemoteIdentity::client());
    }

    #[tokio::test]
    async fn subscriber_identity_carries_its_uri() {
        let (client_side, server_side) = duplex(4096);
        let mut subscriber = ExchangeStream::new(client_side);
        let mut server = ExchangeStream::new(server_side);

        let (sub_result, identity) = tokio::join!(
            subscriber.identify_as_subscriber("poll://queues/alpha"),
            async {
                let identity = server.read_remote_identity().await?;
                server.identify_as_server().await?;
                Ok::<_, MxError>(identity)
            }
        );
        sub_result.unwrap();
        assert_eq!(
            identity.unwrap().subscription_uri.as_deref(),
            Some("poll://queues/alpha")
        );
    }

    #[tokio::test]
    async fn unexpected_token_where_proceed_was_required() {
        let (mut raw, peer_side) = duplex(4096);
        raw.write_all(b"GREETINGS\r\n").await.unwrap();

        let mut peer = ExchangeStream::new(peer_side);
        let err = peer.expect_proceed().await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("PROCEED"));
        assert!(text.contains("GREETINGS"));
    }

    #[tokio::test]
    async fn closed_stream_while_awaiting_proceed_is_authentication_like() {
        let (raw, peer_side) = duplex(4096);
        drop(raw);

        let mut peer = ExchangeStream::new(peer_side);
        let err = peer.expect_proceed().await.unwrap_err();
        assert!(matches!(err, MxError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn closed_stream_while_awaiting_hello_is_graceful() {
        let (raw, peer_side) = duplex(4096);
        drop(raw);

        let mut peer = ExchangeStream::new(peer_side);
        assert!(!peer.await_hello().await.unwrap());
    }

    #[tokio::test]
    async fn send_and_receive_round_trip_with_attachments() {
        let (a_side, b_side) = duplex(256 * 1024);
        let mut a = ExchangeStream::new(a_side);
        let mut b = ExchangeStream::new(b_side);

        let empty = DataStream::from_bytes(Bytes::new());
        let big = DataStream::from_bytes(vec![3u8; 1 << 20]);
        let request = RequestMessage::new("R1", "files", "put").with_params(vec![
            Value::Stream(empty.clone()),
            Value::Stream(big.clone()),
        ]);

        let (sent, received) = tokio::join!(
            a.send(Some(Payload::Request(request.clone()))),
            b.receive()
        );
        sent.unwrap();
        let Some(Payload::Request(incoming)) = received.unwrap() else {
            panic!("expected a request");
        };
        assert_eq!(incoming.id, "R1");

        let Value::Stream(first) = &incoming.params[0] else {
            panic!()
        };
        let Value::Stream(second) = &incoming.params[1] else {
            panic!()
        };
        assert_eq!(first.id(), empty.id());
        assert_eq!(first.consume_bytes().await.unwrap().len(), 0);
        let bytes = second.consume_bytes().await.unwrap();
        assert_eq!(bytes.len(), 1 << 20);
        assert!(bytes.iter().all(|&b| b == 3));
    }

    #[tokio::test]
    async fn null_envelope_round_trips_as_none() {
        let (a_side, b_side) = duplex(4096);
        let mut a = ExchangeStream::new(a_side);
        let mut b = ExchangeStream::new(b_side);

        let (sent, received) = tokio::join!(a.send(None), b.receive());
        sent.unwrap();
        assert!(received.unwrap().is_none());
    }
}
