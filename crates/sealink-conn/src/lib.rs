//! Connections: encrypted transport, protocol dispatch and connection context.
//!
//! This is the layer applications use. A [`Connection`] sends and receives
//! messages tagged with a protocol id, routes received messages to registered
//! handlers, and exchanges RSA public keys on the reserved ids 1 and 2.
//! [`context`] lets code deep in a call chain find the connection it is running
//! for without threading it through every signature.

pub mod connection;
pub mod connector;
pub mod context;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod message;
pub mod registry;
pub mod transport;

mod sync;

pub use connection::{BrokeCallback, Connection, ConnectionConfig, Session, TeardownHook};
pub use connector::{connect, connect_with_config};
pub use context::{
    current_connection, has_current_connection, ConnContext, ContextError, ContextGuard,
};
pub use error::{ConnError, Result};
pub use listener::{Listener, NewConnectionCallback};
pub use message::{Message, Payload};
pub use registry::{Dispatch, Handler, HandlerRegistry};
pub use transport::{KeyMaterial, Transport};
