// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn identify_serializes_with_type_tag() {
    let msg = LookupMessage::Identify {
        msgid: "m1".into(),
        name: "node-a".into(),
        origin: "http://10.0.0.1:5000".into(),
        version: "0.1.0".into(),
    };
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["type"], "IDENTIFY");
    assert_eq!(json["msgid"], "m1");
    assert_eq!(json["origin"], "http://10.0.0.1:5000");
}

#[test]
fn register_process_round_trips() {
    let msg = LookupMessage::RegisterProcess {
        msgid: "m2".into(),
        job_name: "default.dummy".into(),
        pid: 7,
    };
    let json = serde_json::to_string(&msg).unwrap();
    let parsed: LookupMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, msg);
    assert_eq!(parsed.msgid(), "m2");
}

#[test]
fn unknown_message_type_fails() {
    let raw = r#"{"type":"SHOUT","msgid":"m3"}"#;
    assert!(serde_json::from_str::<LookupMessage>(raw).is_err());
}

#[test]
fn ok_reply_shape() {
    let reply = LookupReply::ok("m4");
    assert!(reply.is_ok());
    let json = serde_json::to_string(&reply).unwrap();
    assert_eq!(json, r#"{"msgid":"m4","ok":true}"#);
}

#[test]
fn error_reply_parses_from_server_bytes() {
    let raw = r#"{"msgid":"m5","errno":409,"reason":"identity exists"}"#;
    let reply: LookupReply = serde_json::from_str(raw).unwrap();
    assert!(!reply.is_ok());
    assert_eq!(reply.msgid(), Some("m5"));
    match reply {
        LookupReply::Err { errno, reason, .. } => {
            assert_eq!(errno, 409);
            assert_eq!(reason, "identity exists");
        }
        LookupReply::Ok { .. } => panic!("expected error reply"),
    }
}

#[test]
fn error_reply_without_msgid() {
    let raw = r#"{"errno":400,"reason":"invalid_json"}"#;
    let reply: LookupReply = serde_json::from_str(raw).unwrap();
    assert_eq!(reply.msgid(), None);
}
