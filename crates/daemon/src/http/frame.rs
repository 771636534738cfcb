// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal framing for dedicated process byte-channels.
//!
//! A frame is `V1 <type> <msgid>\0<body>`: a space-separated header with
//! the protocol magic, the frame type and a message id, then a NUL, then
//! an arbitrary byte body. The body can be any blob while the header stays
//! parseable.

use gaffer_core::error::ProcessError;

pub const MAGIC: &[u8] = b"V1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Message,
    Response,
    Error,
}

impl FrameType {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Message => b"message",
            Self::Response => b"response",
            Self::Error => b"error",
        }
    }

    fn parse(raw: &[u8]) -> Option<Self> {
        match raw {
            b"message" => Some(Self::Message),
            b"response" => Some(Self::Response),
            b"error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub msgid: String,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: FrameType, msgid: impl Into<String>, body: Vec<u8>) -> Self {
        Self { frame_type, msgid: msgid.into(), body }
    }

    pub fn message(msgid: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(FrameType::Message, msgid, body)
    }

    pub fn response(msgid: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(FrameType::Response, msgid, body)
    }

    pub fn error(msgid: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(FrameType::Error, msgid, body)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            MAGIC.len() + self.frame_type.as_bytes().len() + self.msgid.len() + self.body.len() + 3,
        );
        out.extend_from_slice(MAGIC);
        out.push(b' ');
        out.extend_from_slice(self.frame_type.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.msgid.as_bytes());
        out.push(0);
        out.extend_from_slice(&self.body);
        out
    }

    pub fn decode(raw: &[u8]) -> Result<Self, ProcessError> {
        let bad = || ProcessError::bad_request("invalid_frame");
        let nul = raw.iter().position(|b| *b == 0).ok_or_else(bad)?;
        let (header, rest) = raw.split_at(nul);
        let body = rest[1..].to_vec();

        let mut parts = header.split(|b| *b == b' ');
        let magic = parts.next().ok_or_else(bad)?;
        if magic != MAGIC {
            return Err(bad());
        }
        let frame_type = parts.next().and_then(FrameType::parse).ok_or_else(bad)?;
        let msgid = parts.next().ok_or_else(bad)?;
        if parts.next().is_some() {
            return Err(bad());
        }
        let msgid = std::str::from_utf8(msgid).map_err(|_| bad())?.to_string();
        if msgid.is_empty() {
            return Err(bad());
        }
        Ok(Self { frame_type, msgid, body })
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
