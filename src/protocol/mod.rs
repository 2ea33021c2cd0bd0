//! Wire protocol: frame codec, identification, and the exchange stream.

mod exchange;
mod frame;
mod identity;

pub use exchange::ExchangeStream;
pub use frame::FrameCodec;
pub use identity::{IdentityKind, RemoteIdentity, Version, PROTOCOL_VERSION};
