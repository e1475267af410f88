mod common;

use bytes::Bytes;
use common::{tcp_pair, test_key};
use sealink_conn::{ConnError, Message, Payload};
use sealink_crypto::CryptoError;
use serde_json::json;

#[test]
fn plaintext_messages_arrive_as_sent() {
    let (a, b) = tcp_pair();

    a.send("raw bytes", 16).expect("send bytes");
    a.send(json!({"k": [1, 2, 3]}), 17).expect("send json");
    a.send(Payload::Empty, 0).expect("send empty");

    let cases = [
        Message {
            encrypted: false,
            is_json: false,
            protocol: 16,
            data: Payload::Bytes(Bytes::from_static(b"raw bytes")),
        },
        Message {
            encrypted: false,
            is_json: true,
            protocol: 17,
            data: Payload::Json(json!({"k": [1, 2, 3]})),
        },
        Message {
            encrypted: false,
            is_json: false,
            protocol: 0,
            data: Payload::Empty,
        },
    ];
    for expected in cases {
        let got = b.recv().expect("recv").expect("message");
        assert_eq!(got, expected);
    }
}

#[test]
fn peer_without_private_key_sees_opaque_ciphertext() {
    let (a, b) = tcp_pair();
    a.set_recipient_key(test_key().public_key().clone());

    a.send("attack at dawn", 16).expect("send");
    let message = b.recv().expect("recv").expect("message");

    assert!(message.encrypted);
    let bytes = message.bytes().expect("ciphertext stays bytes");
    assert_eq!(bytes.len(), test_key().public_key().size());
    assert!(!bytes.windows(6).any(|w| w == b"attack"));
}

#[test]
fn encrypted_json_is_decrypted_then_decoded() {
    let (a, b) = tcp_pair();
    a.set_recipient_key(test_key().public_key().clone());
    b.set_private_key(test_key().clone());

    a.send(json!({"x": 1}), 5).expect("send");
    let message = b.recv().expect("recv").expect("message");
    assert!(!message.encrypted);
    assert_eq!(message.data, Payload::Json(json!({"x": 1})));
}

#[test]
fn capacity_is_exact() {
    let (a, b) = tcp_pair();
    a.set_recipient_key(test_key().public_key().clone());
    b.set_private_key(test_key().clone());
    let capacity = test_key().public_key().max_plaintext_len();
    assert_eq!(capacity, 128 - 66);

    a.send(vec![7u8; capacity], 16).expect("capacity fits");
    assert_eq!(
        b.recv().expect("recv").expect("message").bytes(),
        Some(vec![7u8; capacity].as_slice())
    );

    for _ in 0..2 {
        let err = a.send(vec![7u8; capacity + 1], 16).expect_err("one byte over");
        assert!(matches!(
            err,
            ConnError::Crypto(CryptoError::PlaintextTooLarge { .. })
        ));
    }

    // Nothing was written for the rejected sends.
    a.send("after", 16).expect("send after rejection");
    let next = b.recv().expect("recv").expect("message");
    assert_eq!(next.bytes(), Some(b"after".as_slice()));
}

#[test]
fn peer_close_is_the_closed_signal() {
    let (a, b) = tcp_pair();
    a.send("last words", 16).expect("send");
    a.disconnect().expect("disconnect");
    drop(a);

    assert!(b.recv().expect("recv").is_some());
    assert!(b.recv().expect("recv").is_none());
}
