use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};

use sealink_crypto::{PrivateKey, PublicKey};
use sealink_frame::FrameConfig;
use sealink_stream::{Stream, StreamError};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::ConnContext;
use crate::error::{ConnError, Result};
use crate::handshake;
use crate::message::{Message, Payload};
use crate::registry::{Dispatch, HandlerRegistry};
use crate::sync::{lock, read, write};
use crate::transport::Transport;

/// Per-connection key/value state shared by all handlers of that connection.
pub type Session = HashMap<String, Value>;

/// Runs when a context for the connection is torn down. Receives the error that
/// ended the scope, if any.
pub type TeardownHook = Arc<dyn Fn(Option<&(dyn Error + 'static)>) + Send + Sync>;

/// Runs once when the receive loop ends because the stream closed or broke.
pub type BrokeCallback = Arc<dyn Fn(&Connection) + Send + Sync>;

/// Connection behavior config.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    pub frame: FrameConfig,
}

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// A message connection to one peer.
///
/// Cheap to clone; clones refer to the same connection. Handlers get the
/// connection they run for as their first argument.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    transport: Transport,
    registry: RwLock<Arc<HandlerRegistry>>,
    session: Mutex<Session>,
    teardown_hooks: Mutex<Vec<TeardownHook>>,
    on_broke: RwLock<Option<BrokeCallback>>,
    broke_fired: AtomicBool,
}

impl Connection {
    /// Wrap an established stream.
    pub fn new(stream: Stream) -> Result<Self> {
        Self::with_config(stream, ConnectionConfig::default())
    }

    pub fn with_config(stream: Stream, config: ConnectionConfig) -> Result<Self> {
        let id = format!("conn-{}", NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed));
        let transport = Transport::with_config(stream, config.frame)?;
        Ok(Self::from_parts(
            id,
            transport,
            Arc::new(HandlerRegistry::new()),
            None,
        ))
    }

    pub(crate) fn from_parts(
        id: String,
        transport: Transport,
        registry: Arc<HandlerRegistry>,
        on_broke: Option<BrokeCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                transport,
                registry: RwLock::new(registry),
                session: Mutex::new(Session::new()),
                teardown_hooks: Mutex::new(Vec::new()),
                on_broke: RwLock::new(on_broke),
                broke_fired: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// Send `payload` on `protocol`.
    ///
    /// JSON payloads are serialized with sorted object keys and flagged as JSON.
    pub fn send(&self, payload: impl Into<Payload>, protocol: u16) -> Result<()> {
        let transport = &self.inner.transport;
        match payload.into() {
            Payload::Empty => transport.send(None, false, protocol),
            Payload::Bytes(bytes) => transport.send(Some(bytes.as_ref()), false, protocol),
            Payload::Json(value) => {
                let text = serde_json::to_vec(&value)?;
                transport.send(Some(text.as_slice()), true, protocol)
            }
        }
    }

    /// Serialize `value` as JSON and send it on `protocol`.
    ///
    /// The value goes through [`serde_json::Value`] first, so struct fields are
    /// written with sorted keys like any other JSON payload.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T, protocol: u16) -> Result<()> {
        self.send(Payload::Json(serde_json::to_value(value)?), protocol)
    }

    /// Receive the next message, decoding JSON payloads.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream. Payloads that are
    /// still encrypted are left as bytes.
    pub fn recv(&self) -> Result<Option<Message>> {
        let Some(mut message) = self.inner.transport.recv()? else {
            return Ok(None);
        };
        if message.is_json && !message.encrypted {
            if let Payload::Bytes(bytes) = &message.data {
                let value: Value = serde_json::from_slice(bytes)?;
                message.data = Payload::Json(value);
            }
        }
        Ok(Some(message))
    }

    /// Ask the peer for its public key. The reply is installed as the recipient
    /// key by the built-in handler once the receive loop dispatches it.
    pub fn request_recv_pubkey(&self) -> Result<()> {
        handshake::request(self)
    }

    /// Route one received message to its handler.
    ///
    /// Inline handlers run before this returns and their error is returned.
    /// Detached handlers run on their own thread; their errors are only logged.
    pub fn dispatch(&self, message: Message) -> Result<()> {
        let entry = read(&self.inner.registry)
            .resolve(message.protocol)
            .clone();

        match entry.dispatch {
            Dispatch::Inline => (entry.handler)(self, message),
            Dispatch::Detached => {
                let conn = self.clone();
                let protocol = message.protocol;
                thread::Builder::new()
                    .name(format!("sealink-handler-{}-{protocol}", self.id()))
                    .spawn(move || {
                        if let Err(err) = (entry.handler)(&conn, message) {
                            warn!(conn = conn.id(), protocol, error = %err, "detached handler failed");
                        }
                    })
                    .map_err(ConnError::Spawn)?;
                Ok(())
            }
        }
    }

    /// Receive and dispatch until the stream closes.
    ///
    /// A clean close returns `Ok(())`; a broken stream returns its error. Both
    /// run the connection-broke callback. An inline handler error stops the
    /// loop and is returned as-is.
    pub fn listen(&self) -> Result<()> {
        debug!(conn = self.id(), "receive loop started");
        loop {
            match self.recv() {
                Ok(Some(message)) => self.dispatch(message)?,
                Ok(None) => {
                    info!(conn = self.id(), "peer closed connection");
                    self.connection_broke();
                    return Ok(());
                }
                Err(err) => {
                    warn!(conn = self.id(), error = %err, "receive loop failed");
                    self.connection_broke();
                    return Err(err);
                }
            }
        }
    }

    /// Run [`listen`](Self::listen) on a dedicated named thread.
    pub fn spawn_listener(&self) -> Result<JoinHandle<Result<()>>> {
        let conn = self.clone();
        thread::Builder::new()
            .name(format!("sealink-conn-{}", self.id()))
            .spawn(move || conn.listen())
            .map_err(ConnError::Spawn)
    }

    /// Register a handler for `protocol` on this connection only.
    ///
    /// If the handler table is shared with other connections, this connection
    /// gets its own copy first.
    pub fn register_handler<F>(&self, protocol: u16, dispatch: Dispatch, handler: F)
    where
        F: Fn(&Connection, Message) -> Result<()> + Send + Sync + 'static,
    {
        let mut registry = write(&self.inner.registry);
        Arc::make_mut(&mut *registry).register(protocol, dispatch, handler);
    }

    /// Replace the handler run for unregistered protocol ids.
    pub fn set_default_handler<F>(&self, dispatch: Dispatch, handler: F)
    where
        F: Fn(&Connection, Message) -> Result<()> + Send + Sync + 'static,
    {
        let mut registry = write(&self.inner.registry);
        Arc::make_mut(&mut *registry).set_fallback(dispatch, handler);
    }

    /// The handler table currently in use.
    pub fn registry(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&read(&self.inner.registry))
    }

    pub fn on_connection_broke<F>(&self, callback: F)
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        *write(&self.inner.on_broke) = Some(Arc::new(callback));
    }

    fn connection_broke(&self) {
        if self.inner.broke_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = read(&self.inner.on_broke).clone();
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// Locked access to this connection's session map.
    pub fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.inner.session)
    }

    pub fn set_private_key(&self, key: PrivateKey) {
        self.inner.transport.set_private_key(key);
    }

    pub fn set_private_key_pem(&self, pem: &[u8]) -> Result<()> {
        self.inner.transport.set_private_key_pem(pem)
    }

    pub fn private_key_pem(&self) -> Result<Option<Vec<u8>>> {
        self.inner.transport.private_key_pem()
    }

    pub fn public_key_pem(&self) -> Result<Option<Vec<u8>>> {
        self.inner.transport.public_key_pem()
    }

    pub fn set_recipient_key(&self, key: PublicKey) {
        self.inner.transport.set_recipient_key(key);
    }

    pub fn set_recipient_key_pem(&self, pem: &[u8]) -> Result<()> {
        self.inner.transport.set_recipient_key_pem(pem)
    }

    pub fn recipient_key_pem(&self) -> Result<Option<Vec<u8>>> {
        self.inner.transport.recipient_key_pem()
    }

    pub fn clear_recipient_key(&self) {
        self.inner.transport.clear_recipient_key();
    }

    pub fn has_recipient_key(&self) -> bool {
        self.inner.transport.has_recipient_key()
    }

    /// Shut the stream down. The receive loop, if running, ends with the
    /// closed signal. Disconnecting twice is not an error.
    pub fn disconnect(&self) -> Result<()> {
        match self.inner.transport.shutdown() {
            Err(ConnError::Stream(StreamError::Io(err))) if err.kind() == ErrorKind::NotConnected => {
                Ok(())
            }
            other => {
                debug!(conn = self.id(), "disconnected");
                other
            }
        }
    }

    /// Register a hook to run when a context for this connection is torn down.
    pub fn on_teardown<F>(&self, hook: F)
    where
        F: Fn(Option<&(dyn Error + 'static)>) + Send + Sync + 'static,
    {
        lock(&self.inner.teardown_hooks).push(Arc::new(hook));
    }

    /// Run every teardown hook in reverse registration order.
    pub fn do_teardown(&self, error: Option<&(dyn Error + 'static)>) {
        let hooks = lock(&self.inner.teardown_hooks).clone();
        for hook in hooks.iter().rev() {
            hook(error);
        }
    }

    /// A new, unpushed context for this connection.
    pub fn context(&self) -> ConnContext {
        ConnContext::new(self.clone())
    }

    /// Run `f` with this connection current on this thread.
    pub fn scope<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: Error + 'static,
    {
        self.context().run(f)
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("stream", &self.inner.transport.stream_kind())
            .field("encrypting", &self.has_recipient_key())
            .finish_non_exhaustive()
    }
}
