use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use sealink_crypto::PrivateKey;
use sealink_frame::FrameConfig;
use sealink_stream::TcpEndpoint;
use tracing::{info, warn};

use crate::connection::{BrokeCallback, Connection};
use crate::error::{ConnError, Result};
use crate::message::Message;
use crate::registry::{Dispatch, HandlerRegistry};
use crate::transport::Transport;

/// Runs for every accepted connection before its receive loop starts.
pub type NewConnectionCallback = Arc<dyn Fn(&Connection) + Send + Sync>;

/// Accepts connections and serves each one on its own thread.
///
/// Handlers, keys and callbacks configured here apply to every accepted
/// connection. All accepted connections share one handler table; configure it
/// before calling [`serve`](Self::serve).
pub struct Listener {
    endpoint: TcpEndpoint,
    registry: Arc<HandlerRegistry>,
    private_key: Option<PrivateKey>,
    config: FrameConfig,
    on_new_connection: Option<NewConnectionCallback>,
    on_connection_broke: Option<BrokeCallback>,
    next_conn_id: AtomicU64,
}

impl Listener {
    /// Bind a TCP listener. Port `0` picks an ephemeral port.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        Ok(Self {
            endpoint: TcpEndpoint::bind(addr)?,
            registry: Arc::new(HandlerRegistry::new()),
            private_key: None,
            config: FrameConfig::default(),
            on_new_connection: None,
            on_connection_broke: None,
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Private key installed on every accepted connection.
    pub fn with_private_key(mut self, key: PrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_private_key(&mut self, key: PrivateKey) {
        self.private_key = Some(key);
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    pub fn register_handler<F>(&mut self, protocol: u16, dispatch: Dispatch, handler: F)
    where
        F: Fn(&Connection, Message) -> Result<()> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.registry).register(protocol, dispatch, handler);
    }

    pub fn set_default_handler<F>(&mut self, dispatch: Dispatch, handler: F)
    where
        F: Fn(&Connection, Message) -> Result<()> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.registry).set_fallback(dispatch, handler);
    }

    pub fn on_new_connection<F>(&mut self, callback: F)
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.on_new_connection = Some(Arc::new(callback));
    }

    pub fn on_connection_broke<F>(&mut self, callback: F)
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.on_connection_broke = Some(Arc::new(callback));
    }

    /// The handler table accepted connections start with.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    /// Accept the next connection without starting its receive loop.
    pub fn accept(&self) -> Result<Connection> {
        let stream = self.endpoint.accept()?;
        let id = format!(
            "peer-{}",
            self.next_conn_id.fetch_add(1, Ordering::Relaxed)
        );
        let transport = Transport::with_config(stream, self.config.clone())?;
        if let Some(key) = &self.private_key {
            transport.set_private_key(key.clone());
        }

        let conn = Connection::from_parts(
            id,
            transport,
            Arc::clone(&self.registry),
            self.on_connection_broke.clone(),
        );
        info!(conn = conn.id(), peer = ?conn.transport().peer_addr(), "connection accepted");
        Ok(conn)
    }

    /// Start serving `conn` on a thread named `sealink-conn-<id>`: run the
    /// new-connection callback there, then the receive loop.
    pub fn spawn(&self, conn: Connection) -> Result<JoinHandle<()>> {
        let on_new = self.on_new_connection.clone();
        thread::Builder::new()
            .name(format!("sealink-conn-{}", conn.id()))
            .spawn(move || {
                if let Some(callback) = on_new {
                    callback(&conn);
                }
                if let Err(err) = conn.listen() {
                    warn!(conn = conn.id(), error = %err, "connection ended with error");
                }
            })
            .map_err(ConnError::Spawn)
    }

    /// Accept and serve connections until accepting fails.
    pub fn serve(&self) -> Result<()> {
        info!(addr = %self.local_addr(), "serving");
        loop {
            let conn = self.accept()?;
            self.spawn(conn)?;
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("addr", &self.local_addr())
            .field("registry", &self.registry)
            .field("private_key", &self.private_key)
            .finish_non_exhaustive()
    }
}
