use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, StreamError};
use crate::stream::Stream;

/// TCP listening endpoint.
///
/// Provides bind/accept/connect over TCP. On Unix the standard library sets
/// `SO_REUSEADDR` on bound listeners, so a restarted server can rebind while
/// old connections sit in `TIME_WAIT`.
pub struct TcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on `addr`.
    ///
    /// Port `0` asks the OS for an ephemeral port; see [`TcpEndpoint::local_addr`].
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|e| StreamError::Bind {
            addr: format!("{addr:?}"),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| StreamError::Bind {
            addr: format!("{addr:?}"),
            source: e,
        })?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<Stream> {
        let (stream, peer) = self.listener.accept().map_err(StreamError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(stream.into())
    }

    /// Connect to a listening endpoint (blocking).
    ///
    /// Every resolved address is tried in order; the last failure is reported.
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Stream> {
        let addrs = addr.to_socket_addrs().map_err(|e| StreamError::Connect {
            addr: format!("{addr:?}"),
            source: e,
        })?;

        let mut last_err = None;
        for candidate in addrs {
            match TcpStream::connect(candidate) {
                Ok(stream) => {
                    debug!(peer = %candidate, "connected over tcp");
                    return Ok(stream.into());
                }
                Err(err) => last_err = Some(StreamError::connect_to(candidate, err)),
            }
        }

        Err(last_err.unwrap_or_else(|| StreamError::Unresolved(format!("{addr:?}"))))
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
