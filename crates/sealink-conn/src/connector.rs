use std::net::ToSocketAddrs;

use sealink_stream::TcpEndpoint;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::Result;

/// Connect to a listening peer over TCP.
///
/// The receive loop is not started; call [`Connection::listen`] or
/// [`Connection::spawn_listener`] once handlers are registered.
pub fn connect(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Connection> {
    connect_with_config(addr, ConnectionConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(
    addr: impl ToSocketAddrs + std::fmt::Debug,
    config: ConnectionConfig,
) -> Result<Connection> {
    let stream = TcpEndpoint::connect(addr)?;
    Connection::with_config(stream, config)
}
