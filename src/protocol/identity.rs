//! Identification lines and protocol version.

use std::fmt;

use crate::error::{MxError, Result};

pub(crate) const CLIENT_TOKEN: &str = "MX-CLIENT";
pub(crate) const SERVER_TOKEN: &str = "MX-SERVER";
pub(crate) const SUBSCRIBER_TOKEN: &str = "MX-SUBSCRIBER";

/// Protocol revision carried on every identification line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

/// The revision this crate speaks.
pub const PROTOCOL_VERSION: Version = Version { major: 1, minor: 0 };

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Version {
    fn parse(token: &str) -> Option<Version> {
        let (major, minor) = token.split_once('.')?;
        Some(Version {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

/// What the remote endpoint declared itself to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Client,
    Server,
    Subscriber,
}

/// Parsed identification line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentity {
    pub kind: IdentityKind,
    /// Durable work-queue identifier; present exactly for subscribers.
    pub subscription_uri: Option<String>,
}

impl RemoteIdentity {
    pub fn client() -> Self {
        RemoteIdentity {
            kind: IdentityKind::Client,
            subscription_uri: None,
        }
    }

    pub fn server() -> Self {
        RemoteIdentity {
            kind: IdentityKind::Server,
            subscription_uri: None,
        }
    }

    pub fn subscriber(uri: impl Into<String>) -> Self {
        RemoteIdentity {
            kind: IdentityKind::Subscriber,
            subscription_uri: Some(uri.into()),
        }
    }

    /// Parse one identification line.
    ///
    /// Tokens are runs of non-whitespace; empty segments are discarded. A
    /// subscriber line must carry its subscription URI, and only the current
    /// protocol version is accepted.
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&first) = tokens.first() else {
            return Err(MxError::Protocol("empty identification line".into()));
        };

        let kind = match first {
            CLIENT_TOKEN => IdentityKind::Client,
            SERVER_TOKEN => IdentityKind::Server,
            SUBSCRIBER_TOKEN => IdentityKind::Subscriber,
            other => {
                return Err(MxError::Protocol(format!(
                    "unrecognized identification token `{other}`"
                )))
            }
        };

        let Some(&version_token) = tokens.get(1) else {
            return Err(MxError::Protocol(format!(
                "identification line `{first}` is missing its version"
            )));
        };
        match Version::parse(version_token) {
            Some(version) if version == PROTOCOL_VERSION => {}
            _ => {
                return Err(MxError::Protocol(format!(
                    "unsupported protocol version `{version_token}`"
                )))
            }
        }

        let subscription_uri = match kind {
            IdentityKind::Subscriber => {
                let Some(uri) = tokens.get(2) else {
                    return Err(MxError::Protocol(
                        "subscriber identification is missing its subscription uri".into(),
                    ));
                };
                Some((*uri).to_string())
            }
            _ => None,
        };

        Ok(RemoteIdentity {
            kind,
            subscription_uri,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_renders_major_dot_minor() {
        assert_eq!(PROTOCOL_VERSION.to_string(), "1.0");
    }

    #[test]
    fn parses_client_and_server_lines() {
        assert_eq!(
            RemoteIdentity::parse("MX-CLIENT 1.0").unwrap(),
            RemoteIdentity::client()
        );
        assert_eq!(
            RemoteIdentity::parse("MX-SERVER 1.0").unwrap(),
            RemoteIdentity::server()
        );
    }

    #[test]
    fn parses_subscriber_line_with_uri() {
        let identity = RemoteIdentity::parse("MX-SUBSCRIBER 1.0 poll://queues/alpha").unwrap();
        assert_eq!(identity, RemoteIdentity::subscriber("poll://queues/alpha"));
    }

    #[test]
    fn tolerates_runs_of_whitespace_between_tokens() {
        let identity = RemoteIdentity::parse("  MX-SUBSCRIBER   1.0\t poll://q ").unwrap();
        assert_eq!(identity.subscription_uri.as_deref(), Some("poll://q"));
    }

    #[test]
    fn subscriber_without_uri_is_a_protocol_error() {
        let err = RemoteIdentity::parse("MX-SUBSCRIBER 1.0").unwrap_err();
        assert!(matches!(err, MxError::Protocol(_)));
        assert!(err.to_string().contains("subscription uri"));
    }

    #[test]
    fn unknown_first_token_is_a_protocol_error() {
        let err = RemoteIdentity::parse("MX-GREETER 1.0").unwrap_err();
        assert!(err.to_string().contains("MX-GREETER"));
    }

    #[test]
    fn unknown_version_is_refused() {
        assert!(RemoteIdentity::parse("MX-CLIENT 2.0").is_err());
        assert!(RemoteIdentity::parse("MX-CLIENT banana").is_err());
        assert!(RemoteIdentity::parse("MX-CLIENT").is_err());
    }
}
