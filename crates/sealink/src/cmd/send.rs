use std::fs;
use std::time::Duration;

use sealink_conn::{connect_with_config, Connection, ConnectionConfig, Message, Payload};
use sealink_frame::protocol::is_key_exchange;
use sealink_frame::{FrameConfig, DELIVER_PUBLIC_KEY};
use tracing::debug;

use crate::cmd::{load_private_key, SendArgs};
use crate::exit::{conn_error, crypto_error, CliError, CliResult, CRYPTO_ERROR, FAILURE, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let config = ConnectionConfig {
        frame: FrameConfig {
            read_timeout: Some(wait_timeout),
            ..FrameConfig::default()
        },
    };
    let conn = connect_with_config(args.addr.as_str(), config)
        .map_err(|err| conn_error("connect failed", err))?;

    let payload = resolve_payload(&args)?;

    if args.encrypt {
        exchange_keys(&conn)?;
    }

    if let Some(path) = &args.key {
        let key = load_private_key(path)?;
        let public_pem = key
            .public_key()
            .to_pem()
            .map_err(|err| crypto_error("key encoding failed", err))?;
        conn.set_private_key(key);
        conn.send(public_pem, DELIVER_PUBLIC_KEY)
            .map_err(|err| conn_error("key delivery failed", err))?;
    }

    conn.send(payload, args.protocol)
        .map_err(|err| conn_error("send failed", err))?;

    if args.wait {
        match wait_for_reply(&conn).map_err(|err| conn_error("receive failed", err))? {
            Some(message) => print_message(&message, conn.id(), format),
            None => {
                return Err(CliError::new(
                    FAILURE,
                    "connection closed before a reply arrived",
                ))
            }
        }
    }

    if let Err(err) = conn.disconnect() {
        debug!(error = %err, "disconnect failed");
    }
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Payload> {
    if let Some(json) = &args.json {
        let value = serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(Payload::Json(value));
    }
    if let Some(data) = &args.data {
        return Ok(Payload::from(data.as_str()));
    }
    if let Some(path) = &args.file {
        let bytes = fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        })?;
        return Ok(Payload::from(bytes));
    }
    Ok(Payload::Empty)
}

/// Ask for the peer's public key and install the answer.
fn exchange_keys(conn: &Connection) -> CliResult<()> {
    conn.request_recv_pubkey()
        .map_err(|err| conn_error("key request failed", err))?;

    wait_for(conn, |message| message.protocol == DELIVER_PUBLIC_KEY)
        .map_err(|err| conn_error("key exchange failed", err))?
        .ok_or_else(|| CliError::new(FAILURE, "connection closed during key exchange"))?;

    if !conn.has_recipient_key() {
        return Err(CliError::new(
            CRYPTO_ERROR,
            "peer has no public key; cannot encrypt",
        ));
    }
    Ok(())
}

/// Next application message. Key-exchange traffic is handled on the way.
fn wait_for_reply(source: &impl MessageSource) -> sealink_conn::Result<Option<Message>> {
    wait_for(source, |message| !is_key_exchange(message.protocol))
}

/// Receive until `done` matches. Key-exchange messages are always dispatched
/// to the built-in handlers; a matching one is returned after dispatch.
fn wait_for(
    source: &impl MessageSource,
    done: impl Fn(&Message) -> bool,
) -> sealink_conn::Result<Option<Message>> {
    loop {
        let Some(message) = source.next_message()? else {
            return Ok(None);
        };
        let matched = done(&message);
        if is_key_exchange(message.protocol) {
            source.handle(message.clone())?;
        }
        if matched {
            return Ok(Some(message));
        }
    }
}

trait MessageSource {
    fn next_message(&self) -> sealink_conn::Result<Option<Message>>;
    fn handle(&self, message: Message) -> sealink_conn::Result<()>;
}

impl MessageSource for Connection {
    fn next_message(&self) -> sealink_conn::Result<Option<Message>> {
        self.recv()
    }

    fn handle(&self, message: Message) -> sealink_conn::Result<()> {
        self.dispatch(message)
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use sealink_frame::REQUEST_PUBLIC_KEY;

    use super::*;

    #[derive(Default)]
    struct MockSource {
        queue: RefCell<VecDeque<Message>>,
        handled: RefCell<Vec<u16>>,
    }

    impl MockSource {
        fn with(protocols: &[u16]) -> Self {
            let source = Self::default();
            for &protocol in protocols {
                source.queue.borrow_mut().push_back(Message {
                    encrypted: false,
                    is_json: false,
                    protocol,
                    data: Payload::Empty,
                });
            }
            source
        }
    }

    impl MessageSource for MockSource {
        fn next_message(&self) -> sealink_conn::Result<Option<Message>> {
            Ok(self.queue.borrow_mut().pop_front())
        }

        fn handle(&self, message: Message) -> sealink_conn::Result<()> {
            self.handled.borrow_mut().push(message.protocol);
            Ok(())
        }
    }

    #[test]
    fn reply_wait_handles_key_exchange_first() {
        let source = MockSource::with(&[REQUEST_PUBLIC_KEY, DELIVER_PUBLIC_KEY, 16]);
        let reply = wait_for_reply(&source)
            .expect("wait should succeed")
            .expect("reply");

        assert_eq!(reply.protocol, 16);
        assert_eq!(
            *source.handled.borrow(),
            vec![REQUEST_PUBLIC_KEY, DELIVER_PUBLIC_KEY]
        );
    }

    #[test]
    fn closed_stream_yields_no_reply() {
        let source = MockSource::with(&[REQUEST_PUBLIC_KEY]);
        assert!(wait_for_reply(&source).expect("wait").is_none());
    }

    #[test]
    fn key_wait_stops_at_delivery_and_dispatches_it() {
        let source = MockSource::with(&[16, DELIVER_PUBLIC_KEY, 17]);
        let delivery = wait_for(&source, |m| m.protocol == DELIVER_PUBLIC_KEY)
            .expect("wait")
            .expect("delivery");

        assert_eq!(delivery.protocol, DELIVER_PUBLIC_KEY);
        assert_eq!(*source.handled.borrow(), vec![DELIVER_PUBLIC_KEY]);
        assert_eq!(source.queue.borrow().len(), 1);
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
