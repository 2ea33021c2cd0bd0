//! # mxwire
//!
//! The message exchange core of a secure, bidirectional RPC framework. Two
//! endpoints on an established, ordered byte stream (typically TLS over TCP)
//! exchange request/response envelopes, with arbitrarily large binary
//! attachment streams carried out-of-band after each envelope.
//!
//! ## Architecture
//!
//! - **Frame codec** ([`protocol::FrameCodec`]): text lines, deflate-wrapped
//!   envelope documents, length-prefixed attachment blocks.
//! - **Exchange stream** ([`ExchangeStream`]): identification, the
//!   HELLO/PROCEED flow control, envelope send/receive with attachment
//!   draining.
//! - **Exchange roles** ([`ClientExchange`], [`SubscriberExchange`],
//!   [`ServerExchange`]): the turn-taking state machines that sequence those
//!   primitives into complete exchanges.
//!
//! Each connection runs one exchange at a time in strict turn order; the
//! core is single-threaded per connection and concurrency between
//! connections belongs to the host.
//!
//! ## Example
//!
//! ```ignore
//! use mxwire::{ClientExchange, RequestMessage};
//!
//! #[tokio::main]
//! async fn main() -> mxwire::Result<()> {
//!     let transport = connect_somehow().await;
//!     let mut client = ClientExchange::new(transport);
//!     let response = client
//!         .exchange(RequestMessage::new("R1", "calculator", "add"))
//!         .await?;
//!     println!("{:?}", response.result);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod protocol;
pub mod queue;

mod client;
mod server;

pub use client::{ClientExchange, SubscriberExchange};
pub use config::ExchangeTimeouts;
pub use error::{MxError, Result};
pub use handler::{invoke_and_wrap, HandlerError, InvocationHandler};
pub use message::{
    DataStream, ErrorInfo, MessageEnvelope, Payload, RequestMessage, ResponseMessage, Value,
};
pub use protocol::{ExchangeStream, IdentityKind, RemoteIdentity, PROTOCOL_VERSION};
pub use queue::{InMemoryRequestQueue, PendingRequestQueue};
pub use server::ServerExchange;
