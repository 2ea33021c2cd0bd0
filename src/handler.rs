//! Invocation dispatcher seam.
//!
//! The exchange protocol hands decoded requests to an [`InvocationHandler`]
//! and ships whatever comes back. Handler failures are never fatal to the
//! connection: they are unpacked and returned to the peer as a fault
//! response.

use std::future::Future;
use std::pin::Pin;

use tracing::warn;

use crate::message::{RequestMessage, ResponseMessage};

/// Error type handlers may raise.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Routes a decoded request to a service method.
pub trait InvocationHandler: Send + Sync {
    fn invoke(
        &self,
        request: RequestMessage,
    ) -> BoxFuture<'static, std::result::Result<ResponseMessage, HandlerError>>;
}

impl<F, Fut> InvocationHandler for F
where
    F: Fn(RequestMessage) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<ResponseMessage, HandlerError>> + Send + 'static,
{
    fn invoke(
        &self,
        request: RequestMessage,
    ) -> BoxFuture<'static, std::result::Result<ResponseMessage, HandlerError>> {
        Box::pin((self)(request))
    }
}

/// Invoke the handler; on failure, synthesize a fault response carrying the
/// request's correlation id and the innermost cause.
pub async fn invoke_and_wrap<H>(handler: &H, request: RequestMessage) -> ResponseMessage
where
    H: InvocationHandler + ?Sized,
{
    let correlation = request.id.clone();
    match handler.invoke(request).await {
        Ok(response) => response,
        Err(error) => {
            warn!(%correlation, %error, "handler failed; returning the fault to the peer");
            ResponseMessage::from_error(&correlation, error.as_ref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Value;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("service exploded")]
    struct Exploded {
        #[source]
        cause: std::io::Error,
    }

    #[tokio::test]
    async fn successful_invocation_passes_the_response_through() {
        let handler = |request: RequestMessage| async move {
            Ok::<_, HandlerError>(ResponseMessage::success(request.id, Value::Int(42)))
        };
        let response = invoke_and_wrap(&handler, RequestMessage::new("R1", "calc", "answer")).await;
        assert_eq!(response.result, Some(Value::Int(42)));
        assert!(!response.is_error());
    }

    #[tokio::test]
    async fn failure_becomes_a_fault_response_with_the_innermost_cause() {
        let handler = |_request: RequestMessage| async move {
            let cause = std::io::Error::new(std::io::ErrorKind::Other, "tape jammed");
            Err::<ResponseMessage, HandlerError>(Box::new(Exploded { cause }))
        };
        let response = invoke_and_wrap(&handler, RequestMessage::new("R9", "tape", "wind")).await;
        assert_eq!(response.id, "R9");
        let info = response.error.unwrap();
        assert_eq!(info.message, "tape jammed");
        assert!(info.details.unwrap().starts_with("service exploded"));
    }
}
