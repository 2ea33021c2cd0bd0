//! Message data model: envelopes, requests, responses, and payload values.
//!
//! The envelope is the outer document carried on the wire; its payload is a
//! tagged variant over a closed set of message kinds. Open type names on the
//! wire are deliberately not supported.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod capture;
mod stream;

pub use capture::StreamCapture;
pub use stream::DataStream;

use crate::error::Result;

/// An RPC invocation descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    /// Correlation id, unique within a connection.
    pub id: String,
    /// Target service name.
    pub service: String,
    /// Target method name.
    pub method: String,
    /// Positional arguments.
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RequestMessage {
    pub fn new(
        id: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        RequestMessage {
            id: id.into(),
            service: service.into(),
            method: method.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    fn collect_streams(&self, capture: &mut StreamCapture) -> Result<()> {
        for value in &self.params {
            value.collect_streams(capture)?;
        }
        Ok(())
    }
}

/// The answer to a request, carrying either a result value or a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Correlation id of the request this answers.
    pub id: String,
    pub result: Option<Value>,
    pub error: Option<ErrorInfo>,
}

impl ResponseMessage {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        ResponseMessage {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Build a fault response from an error, unpacked to its innermost cause
    /// so the peer sees the original fault rather than a wrapper chain.
    pub fn from_error(id: &str, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = vec![error.to_string()];
        let mut innermost = error;
        while let Some(source) = innermost.source() {
            chain.push(source.to_string());
            innermost = source;
        }
        let details = (chain.len() > 1).then(|| chain.join(" -> "));
        ResponseMessage {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                message: innermost.to_string(),
                details,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn collect_streams(&self, capture: &mut StreamCapture) -> Result<()> {
        if let Some(result) = &self.result {
            result.collect_streams(capture)?;
        }
        Ok(())
    }
}

/// Fault descriptor returned to the peer in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// The innermost cause.
    pub message: String,
    /// Full cause chain, outermost first, when there was more than one link.
    pub details: Option<String>,
}

/// A payload value: a closed, self-describing tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(serde_bytes::ByteBuf),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Stream(DataStream),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(serde_bytes::ByteBuf::from(b.into()))
    }

    fn collect_streams(&self, capture: &mut StreamCapture) -> Result<()> {
        match self {
            Value::Stream(stream) => capture.register(stream.clone()),
            Value::List(items) => {
                for item in items {
                    item.collect_streams(capture)?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                for value in entries.values() {
                    value.collect_streams(capture)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// The concrete message kinds an envelope may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Request(RequestMessage),
    Response(ResponseMessage),
}

/// The outer wrapper carried on the wire: exactly one payload, or the legal
/// null value that signals graceful end of a subscriber exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "Message")]
    pub message: Option<Payload>,
}

impl MessageEnvelope {
    pub(crate) fn collect_streams(&self, capture: &mut StreamCapture) -> Result<()> {
        match &self.message {
            Some(Payload::Request(request)) => request.collect_streams(capture),
            Some(Payload::Response(response)) => response.collect_streams(capture),
            None => Ok(()),
        }
    }
}
