// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn encode_shape() {
    let frame = Frame::message("abc", b"hello".to_vec());
    assert_eq!(frame.encode(), b"V1 message abc\0hello");
}

#[parameterized(
    message = { FrameType::Message },
    response = { FrameType::Response },
    error = { FrameType::Error },
)]
fn round_trips(frame_type: FrameType) {
    let frame = Frame::new(frame_type, "id-1", b"payload \x00 with nul".to_vec());
    let decoded = Frame::decode(&frame.encode()).unwrap();
    assert_eq!(decoded, frame);
}

#[test]
fn empty_body_is_fine() {
    let decoded = Frame::decode(b"V1 response r1\0").unwrap();
    assert_eq!(decoded.frame_type, FrameType::Response);
    assert_eq!(decoded.msgid, "r1");
    assert!(decoded.body.is_empty());
}

#[parameterized(
    no_nul = { b"V1 message abc".as_slice() },
    bad_magic = { b"V2 message abc\0x".as_slice() },
    bad_type = { b"V1 shout abc\0x".as_slice() },
    missing_msgid = { b"V1 message\0x".as_slice() },
    empty_msgid = { b"V1 message \0x".as_slice() },
    extra_field = { b"V1 message abc extra\0x".as_slice() },
)]
fn invalid_frames_are_rejected(raw: &[u8]) {
    let err = Frame::decode(raw).unwrap_err();
    assert_eq!(err.errno, 400);
    assert_eq!(err.reason, "invalid_frame");
}
