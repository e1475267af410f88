use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use sealink_conn::{Message, Payload};
use sealink_frame::protocol::protocol_name;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    protocol: u16,
    protocol_name: &'a str,
    encrypted: bool,
    is_json: bool,
    payload_size: usize,
    payload: serde_json::Value,
    conn_id: &'a str,
    timestamp: String,
}

pub fn print_message(message: &Message, conn_id: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                protocol: message.protocol,
                protocol_name: protocol_name(message.protocol),
                encrypted: message.encrypted,
                is_json: message.is_json,
                payload_size: payload_size(&message.data),
                payload: payload_value(message),
                conn_id,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PROTOCOL", "FLAGS", "SIZE", "CONN", "PAYLOAD"])
                .add_row(vec![
                    format!("{} ({})", message.protocol, protocol_name(message.protocol)),
                    flags_label(message),
                    payload_size(&message.data).to_string(),
                    conn_id.to_string(),
                    payload_preview(message),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "protocol={} ({}) flags={} size={} conn={} payload={}",
                message.protocol,
                protocol_name(message.protocol),
                flags_label(message),
                payload_size(&message.data),
                conn_id,
                payload_preview(message)
            );
        }
        OutputFormat::Raw => match &message.data {
            Payload::Empty => {}
            Payload::Bytes(bytes) => print_raw(bytes),
            Payload::Json(value) => {
                print_raw(value.to_string().as_bytes());
                print_raw(b"\n");
            }
        },
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn flags_label(message: &Message) -> String {
    match (message.encrypted, message.is_json) {
        (true, true) => "encrypted,json".to_string(),
        (true, false) => "encrypted".to_string(),
        (false, true) => "json".to_string(),
        (false, false) => "-".to_string(),
    }
}

fn payload_size(data: &Payload) -> usize {
    match data {
        Payload::Empty => 0,
        Payload::Bytes(bytes) => bytes.len(),
        Payload::Json(value) => value.to_string().len(),
    }
}

fn payload_value(message: &Message) -> serde_json::Value {
    match &message.data {
        Payload::Empty => serde_json::Value::Null,
        Payload::Json(value) => value.clone(),
        Payload::Bytes(_) => serde_json::Value::String(payload_preview(message)),
    }
}

fn payload_preview(message: &Message) -> String {
    match &message.data {
        Payload::Empty => String::new(),
        Payload::Json(value) => value.to_string(),
        Payload::Bytes(bytes) if message.encrypted => {
            format!("<ciphertext {} bytes>", bytes.len())
        }
        Payload::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => format!("<binary {} bytes>", bytes.len()),
        },
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn message(encrypted: bool, data: Payload) -> Message {
        Message {
            encrypted,
            is_json: matches!(data, Payload::Json(_)),
            protocol: 16,
            data,
        }
    }

    #[test]
    fn preview_hides_ciphertext() {
        let sealed = message(true, Payload::from(vec![0u8; 128]));
        assert_eq!(payload_preview(&sealed), "<ciphertext 128 bytes>");
        assert_eq!(flags_label(&sealed), "encrypted");
    }

    #[test]
    fn preview_text_binary_and_json() {
        assert_eq!(payload_preview(&message(false, Payload::from("hi"))), "hi");
        assert_eq!(
            payload_preview(&message(false, Payload::from(vec![0xff, 0xfe]))),
            "<binary 2 bytes>"
        );
        let json = message(false, Payload::from(json!({"b": 1, "a": 2})));
        assert_eq!(payload_preview(&json), r#"{"a":2,"b":1}"#);
        assert_eq!(payload_value(&json), json!({"a": 2, "b": 1}));
        assert_eq!(payload_size(&json.data), 13);
    }

    #[test]
    fn empty_payload_is_null() {
        let empty = message(false, Payload::Empty);
        assert_eq!(payload_value(&empty), serde_json::Value::Null);
        assert_eq!(payload_size(&empty.data), 0);
        assert_eq!(flags_label(&empty), "-");
    }
}
