use sealink_conn::{Connection, Dispatch, Listener, Message};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, load_private_key, ServeArgs};
use crate::exit::{conn_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut listener =
        Listener::bind(args.addr.as_str()).map_err(|err| conn_error("bind failed", err))?;

    if let Some(path) = &args.key {
        let key = load_private_key(path)?;
        info!(fingerprint = %key.public_key().fingerprint(), "serving with private key");
        listener.set_private_key(key);
    }

    listener.set_default_handler(Dispatch::Inline, echo);
    listener.on_new_connection(|conn| {
        info!(conn = conn.id(), peer = ?conn.transport().peer_addr(), "client connected");
    });
    listener.on_connection_broke(|conn| {
        info!(conn = conn.id(), "client disconnected");
    });

    install_ctrlc_handler()?;
    announce(&listener, format);

    listener
        .serve()
        .map_err(|err| conn_error("accept failed", err))?;
    Ok(SUCCESS)
}

/// Echo every non-built-in message back on its protocol id.
fn echo(conn: &Connection, message: Message) -> sealink_conn::Result<()> {
    info!(
        conn = conn.id(),
        protocol = message.protocol,
        encrypted = message.encrypted,
        "echoing message"
    );
    conn.send(message.data, message.protocol)
}

/// Print the bound address so callers that asked for port 0 can find it.
fn announce(listener: &Listener, format: OutputFormat) {
    let addr = listener.local_addr();
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "listening": addr.to_string() })),
        _ => println!("listening on {addr}"),
    }
}
