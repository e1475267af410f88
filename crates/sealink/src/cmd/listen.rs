use sealink_conn::Listener;
use sealink_frame::protocol::is_key_exchange;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, load_private_key, ListenArgs};
use crate::exit::{conn_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let mut listener =
        Listener::bind(args.addr.as_str()).map_err(|err| conn_error("bind failed", err))?;
    if let Some(path) = &args.key {
        listener.set_private_key(load_private_key(path)?);
    }
    install_ctrlc_handler()?;
    eprintln!("listening on {}", listener.local_addr());

    let mut printed = 0usize;

    loop {
        let conn = listener
            .accept()
            .map_err(|err| conn_error("accept failed", err))?;

        loop {
            let message = match conn.recv() {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!(conn = conn.id(), "client disconnected");
                    break;
                }
                Err(err) => return Err(conn_error("receive failed", err)),
            };

            // Answer key exchange so clients can encrypt to us.
            if is_key_exchange(message.protocol) {
                conn.dispatch(message)
                    .map_err(|err| conn_error("key exchange failed", err))?;
                continue;
            }

            if let Some(protocols) = &args.protocols {
                if !protocols.contains(&message.protocol) {
                    continue;
                }
            }

            print_message(&message, conn.id(), format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }
}
