mod common;

use std::error::Error;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use common::{tcp_pair, TIMEOUT};
use sealink_conn::{current_connection, ConnError, ContextError, Dispatch};

fn recorder(
    log: &Arc<Mutex<Vec<String>>>,
    name: &'static str,
) -> impl Fn(Option<&(dyn Error + 'static)>) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |err: Option<&(dyn Error + 'static)>| {
        let entry = match err {
            Some(err) => format!("{name} ({err})"),
            None => name.to_string(),
        };
        log.lock().expect("log lock").push(entry);
    }
}

#[test]
fn hooks_run_once_after_outermost_pop_in_reverse_order() {
    let (a, _b) = tcp_pair();
    let log = Arc::new(Mutex::new(Vec::new()));
    a.on_teardown(recorder(&log, "h1"));
    a.on_teardown(recorder(&log, "h2"));
    a.on_teardown(recorder(&log, "h3"));

    let ctx = a.context();
    ctx.push();
    ctx.push();
    ctx.pop(None);
    assert!(log.lock().expect("log").is_empty());
    ctx.pop(None);

    assert_eq!(*log.lock().expect("log"), vec!["h3", "h2", "h1"]);
}

#[test]
#[should_panic(expected = "popped wrong connection context")]
fn popping_a_buried_context_panics() {
    let (a, b) = tcp_pair();
    let first = a.context();
    let second = b.context();
    first.push();
    second.push();
    first.pop(None);
}

#[test]
fn handler_scopes_resolve_their_own_connection_per_thread() {
    let (a1, b1) = tcp_pair();
    let (a2, b2) = tcp_pair();
    let (tx, rx) = mpsc::channel();

    for server in [&b1, &b2] {
        let tx = tx.clone();
        server.register_handler(16, Dispatch::Detached, move |conn, _| {
            conn.scope(|| {
                let current = current_connection()?;
                tx.send((conn.id().to_string(), current.id().to_string())).ok();
                Ok::<_, ConnError>(())
            })
        });
    }
    let loops = [
        b1.spawn_listener().expect("loop"),
        b2.spawn_listener().expect("loop"),
    ];

    a1.send("one", 16).expect("send");
    a2.send("two", 16).expect("send");
    for _ in 0..2 {
        let (owner, resolved) = rx.recv_timeout(TIMEOUT).expect("handler ran");
        assert_eq!(owner, resolved);
    }

    assert!(matches!(current_connection(), Err(ContextError::Unbound)));
    a1.disconnect().expect("disconnect");
    a2.disconnect().expect("disconnect");
    for handle in loops {
        handle.join().expect("join").expect("clean close");
    }
}

#[test]
fn scope_error_reaches_hooks_and_caller() {
    let (a, _b) = tcp_pair();
    let log = Arc::new(Mutex::new(Vec::new()));
    a.on_teardown(recorder(&log, "cleanup"));

    let result = a.scope(|| -> Result<u32, ConnError> {
        current_connection()?;
        Err(ConnError::handler("database unavailable"))
    });

    assert!(matches!(result, Err(ConnError::Handler(_))));
    assert_eq!(
        *log.lock().expect("log"),
        vec!["cleanup (handler failed: database unavailable)"]
    );
}

#[test]
fn successful_scope_passes_no_error() {
    let (a, _b) = tcp_pair();
    let log = Arc::new(Mutex::new(Vec::new()));
    a.on_teardown(recorder(&log, "cleanup"));

    let value = a
        .scope(|| Ok::<_, ContextError>(current_connection()?.id().to_string()))
        .expect("scope");
    assert_eq!(value, a.id());
    assert_eq!(*log.lock().expect("log"), vec!["cleanup"]);
}

#[test]
fn contexts_on_other_threads_are_invisible() {
    let (a, _b) = tcp_pair();
    let ctx = a.context();
    ctx.push();

    let seen = thread::spawn(|| current_connection().is_ok())
        .join()
        .expect("thread");
    assert!(!seen);
    assert_eq!(current_connection().expect("bound here"), a);
    ctx.pop(None);
}
