//! Echo server: every message is sent back on the protocol id it arrived on.
//!
//! Run with:
//!   cargo run --example echo-server -- 127.0.0.1:7878
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:7878 --json '{"hello":"world"}' --wait

use sealink::conn::{Dispatch, Listener};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7878".to_string());

    let mut listener = Listener::bind(addr.as_str())?;
    listener.set_default_handler(Dispatch::Inline, |conn, message| {
        eprintln!(
            "[{}] {:?} on protocol {}",
            conn.id(),
            message.data,
            message.protocol
        );
        conn.send(message.data, message.protocol)
    });
    listener.on_connection_broke(|conn| eprintln!("[{}] disconnected", conn.id()));

    eprintln!("Listening on {}", listener.local_addr());
    listener.serve()?;
    Ok(())
}
