//! Per-thread "current connection" stack.
//!
//! Code that runs on behalf of a connection but cannot take it as a parameter
//! calls [`current_connection`]. A [`ConnContext`] marks a connection as current
//! on this thread while pushed. Pushes nest and are counted. When the last
//! pop brings the count to zero, the connection's teardown hooks run in
//! reverse registration order.
//!
//! ```no_run
//! # fn demo(conn: sealink_conn::Connection) -> sealink_conn::Result<()> {
//! conn.scope(|| {
//!     let current = sealink_conn::current_connection()?;
//!     current.send("inside the scope", 20)
//! })
//! # }
//! ```

use std::cell::{Cell, RefCell};
use std::error::Error;
use std::rc::Rc;

use tracing::trace;

use crate::connection::Connection;

const UNBOUND_MESSAGE: &str = "working outside of a connection context: this code needs the \
current connection, but none is active on this thread. Push one with \
`conn.context().push()`, hold a `conn.context().enter()` guard, or run the code inside \
`conn.scope(..)`";

/// Errors raised by the context stack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// No context is active on this thread.
    #[error("{}", UNBOUND_MESSAGE)]
    Unbound,

    /// Passed to teardown hooks when a scope unwinds because of a panic.
    #[error("connection scope exited by panic")]
    ScopePanicked,
}

struct ContextFrame {
    conn: Connection,
    refcount: Cell<usize>,
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Rc<ContextFrame>>> = const { RefCell::new(Vec::new()) };
}

/// A pushable marker naming one connection as current.
///
/// Cloning shares the refcount. Not `Send`: a context is pushed and popped on
/// the same thread.
#[derive(Clone)]
pub struct ConnContext {
    frame: Rc<ContextFrame>,
}

impl ConnContext {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            frame: Rc::new(ContextFrame {
                conn,
                refcount: Cell::new(0),
            }),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.frame.conn
    }

    /// Current nesting depth of this context.
    pub fn refcount(&self) -> usize {
        self.frame.refcount.get()
    }

    /// Make the connection current on this thread.
    pub fn push(&self) {
        let depth = self.frame.refcount.get() + 1;
        self.frame.refcount.set(depth);
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Rc::clone(&self.frame)));
        trace!(target: "sealink::context", conn = self.frame.conn.id(), depth, "pushed");
    }

    /// Undo one [`push`](Self::push).
    ///
    /// The pop that brings the refcount to zero runs the teardown hooks with
    /// `error` first. Panics if this context is not the top of the stack; that
    /// is a bug in the caller's push/pop pairing.
    pub fn pop(&self, error: Option<&(dyn Error + 'static)>) {
        let remaining = self.frame.refcount.get().saturating_sub(1);
        self.frame.refcount.set(remaining);

        let popped = if remaining == 0 {
            let pending = PendingPop::arm();
            trace!(
                target: "sealink::context",
                conn = self.frame.conn.id(),
                failed = error.is_some(),
                "tearing down"
            );
            self.frame.conn.do_teardown(error);
            pending.finish()
        } else {
            pop_stack()
        };

        match popped {
            Some(top) if Rc::ptr_eq(&top, &self.frame) => {
                trace!(target: "sealink::context", conn = self.frame.conn.id(), remaining, "popped");
            }
            Some(top) => panic!(
                "popped wrong connection context: top of stack is {}, expected {}",
                top.conn.id(),
                self.frame.conn.id()
            ),
            None => panic!(
                "popped wrong connection context: stack is empty, expected {}",
                self.frame.conn.id()
            ),
        }
    }

    /// Push now and pop when the returned guard drops.
    pub fn enter(&self) -> ContextGuard {
        self.push();
        ContextGuard {
            ctx: self.clone(),
            active: true,
        }
    }

    /// Run `f` with this context pushed. An `Err` returned by `f` is handed to
    /// the teardown hooks before being returned.
    pub fn run<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error + 'static,
    {
        let guard = self.enter();
        let result = f();
        guard.exit(result.as_ref().err().map(|err| err as &(dyn Error + 'static)));
        result
    }
}

impl std::fmt::Debug for ConnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnContext")
            .field("conn", &self.frame.conn.id())
            .field("refcount", &self.frame.refcount.get())
            .finish()
    }
}

/// Pops its context when dropped. If the thread is panicking, teardown hooks
/// see [`ContextError::ScopePanicked`].
#[must_use = "the context is popped as soon as the guard is dropped"]
pub struct ContextGuard {
    ctx: ConnContext,
    active: bool,
}

impl ContextGuard {
    pub fn connection(&self) -> &Connection {
        self.ctx.connection()
    }

    /// Pop now, passing `error` to the teardown hooks.
    pub fn exit(mut self, error: Option<&(dyn Error + 'static)>) {
        self.active = false;
        self.ctx.pop(error);
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if std::thread::panicking() {
            self.ctx.pop(Some(&ContextError::ScopePanicked));
        } else {
            self.ctx.pop(None);
        }
    }
}

/// Removes the top stack entry on drop unless finished, so a panicking hook
/// cannot leave a torn-down context on the stack.
struct PendingPop {
    armed: bool,
}

impl PendingPop {
    fn arm() -> Self {
        Self { armed: true }
    }

    fn finish(mut self) -> Option<Rc<ContextFrame>> {
        self.armed = false;
        pop_stack()
    }
}

impl Drop for PendingPop {
    fn drop(&mut self) {
        if self.armed {
            pop_stack();
        }
    }
}

fn pop_stack() -> Option<Rc<ContextFrame>> {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().pop())
}

/// The connection whose context is on top of this thread's stack.
///
/// Resolved on every call, so the answer follows pushes and pops.
pub fn current_connection() -> Result<Connection, ContextError> {
    CONTEXT_STACK
        .with(|stack| stack.borrow().last().map(|frame| frame.conn.clone()))
        .ok_or(ContextError::Unbound)
}

pub fn has_current_connection() -> bool {
    CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
}

/// Number of entries on this thread's stack.
pub fn depth() -> usize {
    CONTEXT_STACK.with(|stack| stack.borrow().len())
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::{Arc, Mutex};

    use sealink_stream::Stream;

    use super::*;
    use crate::error::ConnError;

    fn conn() -> (Connection, Connection) {
        let (left, right) = Stream::pair().expect("stream pair");
        (
            Connection::new(left).expect("left connection"),
            Connection::new(right).expect("right connection"),
        )
    }

    fn record(conn: &Connection, log: &Arc<Mutex<Vec<String>>>, name: &str) {
        let log = Arc::clone(log);
        let name = name.to_string();
        conn.on_teardown(move |err| {
            let entry = match err {
                Some(err) => format!("{name}:{err}"),
                None => name.clone(),
            };
            log.lock().expect("log lock").push(entry);
        });
    }

    #[test]
    fn unbound_without_push() {
        assert!(!has_current_connection());
        let err = current_connection().expect_err("no context");
        assert_eq!(err, ContextError::Unbound);
        assert!(err.to_string().contains("conn.scope"));
    }

    #[test]
    fn nested_push_tears_down_once_in_reverse_order() {
        let (a, _b) = conn();
        let log = Arc::new(Mutex::new(Vec::new()));
        record(&a, &log, "first");
        record(&a, &log, "second");

        let ctx = a.context();
        ctx.push();
        ctx.push();
        assert_eq!(ctx.refcount(), 2);
        assert_eq!(depth(), 2);

        ctx.pop(None);
        assert!(log.lock().expect("log").is_empty());
        assert_eq!(current_connection().expect("still bound"), a);

        ctx.pop(None);
        assert_eq!(*log.lock().expect("log"), vec!["second", "first"]);
        assert_eq!(depth(), 0);
        assert!(!has_current_connection());
    }

    #[test]
    fn inner_context_shadows_outer() {
        let (a, b) = conn();
        let outer = a.context();
        let inner = b.context();

        outer.push();
        inner.push();
        assert_eq!(current_connection().expect("bound"), b);
        inner.pop(None);
        assert_eq!(current_connection().expect("bound"), a);
        outer.pop(None);
    }

    #[test]
    #[should_panic(expected = "popped wrong connection context")]
    fn popping_non_top_context_panics() {
        let (a, b) = conn();
        let outer = a.context();
        let inner = b.context();
        outer.push();
        inner.push();
        outer.pop(None);
    }

    #[test]
    #[should_panic(expected = "popped wrong connection context")]
    fn popping_empty_stack_panics() {
        let (a, _b) = conn();
        a.context().pop(None);
    }

    #[test]
    fn guard_pops_on_drop() {
        let (a, _b) = conn();
        let log = Arc::new(Mutex::new(Vec::new()));
        record(&a, &log, "hook");

        {
            let guard = a.context().enter();
            assert_eq!(guard.connection(), &a);
            assert!(has_current_connection());
        }
        assert!(!has_current_connection());
        assert_eq!(*log.lock().expect("log"), vec!["hook"]);
    }

    #[test]
    fn run_forwards_returned_error_to_hooks() {
        let (a, _b) = conn();
        let log = Arc::new(Mutex::new(Vec::new()));
        record(&a, &log, "hook");

        let result: Result<(), ConnError> =
            a.context().run(|| Err(ConnError::handler("boom")));
        assert!(result.is_err());
        assert_eq!(
            *log.lock().expect("log"),
            vec!["hook:handler failed: boom"]
        );
    }

    #[test]
    fn panicking_scope_reports_panic_and_unwinds_stack() {
        let (a, _b) = conn();
        let log = Arc::new(Mutex::new(Vec::new()));
        record(&a, &log, "hook");

        let ctx = a.context();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ctx.enter();
            panic!("handler blew up");
        }));

        assert!(outcome.is_err());
        assert_eq!(depth(), 0);
        assert_eq!(
            *log.lock().expect("log"),
            vec!["hook:connection scope exited by panic"]
        );
    }

    #[test]
    fn panicking_hook_still_removes_stack_entry() {
        let (a, _b) = conn();
        a.on_teardown(|_| panic!("hook failed"));

        let ctx = a.context();
        ctx.push();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| ctx.pop(None)));

        assert!(outcome.is_err());
        assert_eq!(depth(), 0);
    }

    #[test]
    fn stacks_are_per_thread() {
        let (a, b) = conn();
        let ctx = a.context();
        ctx.push();

        let other = std::thread::spawn(move || {
            assert!(current_connection().is_err());
            b.scope(|| {
                let current = current_connection()?;
                assert_eq!(current, b);
                Ok::<_, ContextError>(())
            })
        });
        other.join().expect("thread").expect("scope");

        assert_eq!(current_connection().expect("bound"), a);
        ctx.pop(None);
    }
}
