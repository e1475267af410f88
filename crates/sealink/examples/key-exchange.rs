//! Two connections in one process: exchange public keys, then talk encrypted.
//!
//! Also shows the connection context: the handler looks up "its" connection
//! through `current_connection()` instead of taking it as a parameter, and a
//! teardown hook runs when the scope ends.
//!
//! Run with:
//!   cargo run --example key-exchange

use std::sync::mpsc;
use std::time::Duration;

use sealink::conn::{connect, current_connection, ConnError, Dispatch, Listener, Payload};
use sealink::crypto::PrivateKey;

const CHAT: u16 = 16;

fn reply_from_context(text: &str) -> sealink::conn::Result<()> {
    let conn = current_connection()?;
    conn.send(Payload::from(format!("ack: {text}").into_bytes()), CHAT)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_key = PrivateKey::generate(2048)?;
    let mut listener = Listener::bind("127.0.0.1:0")?.with_private_key(server_key);

    listener.register_handler(CHAT, Dispatch::Detached, |conn, message| {
        conn.on_teardown(|err| match err {
            Some(err) => eprintln!("scope ended with error: {err}"),
            None => eprintln!("scope ended cleanly"),
        });
        let text = String::from_utf8_lossy(message.bytes().unwrap_or_default()).into_owned();
        eprintln!("server got {text:?} (still encrypted: {})", message.encrypted);
        conn.scope(|| reply_from_context(&text))
    });
    let addr = listener.local_addr();
    std::thread::spawn(move || listener.serve());

    let client = connect(addr)?;
    let (tx, rx) = mpsc::channel();
    client.register_handler(CHAT, Dispatch::Inline, move |_, message| {
        tx.send(message).map_err(ConnError::handler)
    });
    let client_loop = client.spawn_listener()?;

    client.request_recv_pubkey()?;
    while !client.has_recipient_key() {
        std::thread::sleep(Duration::from_millis(10));
    }
    client.send("hello over rsa", CHAT)?;

    let reply = rx.recv_timeout(Duration::from_secs(5))?;
    eprintln!("client got {:?}", reply.data);

    client.disconnect()?;
    let _ = client_loop.join();
    Ok(())
}
