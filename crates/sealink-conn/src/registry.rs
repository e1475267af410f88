use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sealink_frame::{DELIVER_PUBLIC_KEY, REQUEST_PUBLIC_KEY};

use crate::connection::Connection;
use crate::error::Result;
use crate::handshake;
use crate::message::Message;

/// A message handler. Receives the connection the message arrived on.
pub type Handler = Arc<dyn Fn(&Connection, Message) -> Result<()> + Send + Sync>;

/// Where a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// On the receive-loop thread. Later messages wait until it returns.
    #[default]
    Inline,
    /// On a new thread per message; the receive loop moves on immediately.
    Detached,
}

impl Dispatch {
    /// `Detached` when `threaded` is true.
    pub fn threaded(threaded: bool) -> Self {
        if threaded {
            Self::Detached
        } else {
            Self::Inline
        }
    }
}

#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) handler: Handler,
    pub(crate) dispatch: Dispatch,
}

/// Protocol id to handler table, with a fallback for ids nobody registered.
///
/// A fresh registry already answers the public-key exchange on ids 1 and 2.
/// Registering an id again replaces the previous handler, built-ins included.
#[derive(Clone)]
pub struct HandlerRegistry {
    entries: HashMap<u16, Entry>,
    fallback: Entry,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
            fallback: Entry {
                handler: Arc::new(|_: &Connection, _: Message| -> Result<()> { Ok(()) }),
                dispatch: Dispatch::Inline,
            },
        };
        registry.register(
            REQUEST_PUBLIC_KEY,
            Dispatch::Inline,
            handshake::request_public_key,
        );
        registry.register(
            DELIVER_PUBLIC_KEY,
            Dispatch::Inline,
            handshake::deliver_public_key,
        );
        registry
    }

    pub fn register<F>(&mut self, protocol: u16, dispatch: Dispatch, handler: F)
    where
        F: Fn(&Connection, Message) -> Result<()> + Send + Sync + 'static,
    {
        self.entries.insert(
            protocol,
            Entry {
                handler: Arc::new(handler),
                dispatch,
            },
        );
    }

    /// Replace the fallback run for unregistered protocol ids (a no-op by default).
    pub fn set_fallback<F>(&mut self, dispatch: Dispatch, handler: F)
    where
        F: Fn(&Connection, Message) -> Result<()> + Send + Sync + 'static,
    {
        self.fallback = Entry {
            handler: Arc::new(handler),
            dispatch,
        };
    }

    pub fn remove(&mut self, protocol: u16) -> bool {
        self.entries.remove(&protocol).is_some()
    }

    pub fn is_registered(&self, protocol: u16) -> bool {
        self.entries.contains_key(&protocol)
    }

    /// Dispatch mode for `protocol`, falling back to the default handler's.
    pub fn dispatch_for(&self, protocol: u16) -> Dispatch {
        self.resolve(protocol).dispatch
    }

    /// Registered protocol ids in ascending order.
    pub fn protocols(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn resolve(&self, protocol: u16) -> &Entry {
        self.entries.get(&protocol).unwrap_or(&self.fallback)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<(u16, Dispatch)> = self
            .protocols()
            .into_iter()
            .map(|id| (id, self.entries[&id].dispatch))
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("entries", &entries)
            .field("fallback", &self.fallback.dispatch)
            .finish()
    }
}
