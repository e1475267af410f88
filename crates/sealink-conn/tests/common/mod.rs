#![allow(dead_code)]

use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use sealink_conn::{connect, Connection, Listener};
use sealink_crypto::PrivateKey;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_key() -> &'static PrivateKey {
    static KEY: OnceLock<PrivateKey> = OnceLock::new();
    KEY.get_or_init(|| PrivateKey::generate(1024).expect("test key generation"))
}

pub fn other_test_key() -> &'static PrivateKey {
    static KEY: OnceLock<PrivateKey> = OnceLock::new();
    KEY.get_or_init(|| PrivateKey::generate(1024).expect("test key generation"))
}

/// A connected client/server pair over loopback TCP. Neither side is listening yet.
pub fn tcp_pair() -> (Connection, Connection) {
    let listener = Listener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener.local_addr();
    let server = thread::spawn(move || listener.accept().expect("listener should accept"));
    let client = connect(addr).expect("client should connect");
    let server = server.join().expect("accept thread should finish");
    (client, server)
}

/// Poll `check` until it holds or the timeout expires.
pub fn wait_until(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}
