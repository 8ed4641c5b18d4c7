//! Service message envelope.
//!
//! A [`Message`] is the unit exchanged between a service client and a
//! service server. Replies (`Return`, `Error`) echo the caller-assigned `id`;
//! pushed messages (`Next`, `Complete`, and `Error` raised by an event
//! source) carry no id and are routed by `name` alone.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::MESSAGE;
use crate::codec::Frame;
use crate::error::{FrameError, Result};

/// Envelope type, encoded on the wire as a numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum MessageKind {
    /// Invoke a method (client to server).
    Call,
    /// Subscribe to an event stream (client to server).
    Listen,
    /// Unsubscribe from an event stream (client to server).
    Mute,
    /// Pushed event value (server to client).
    Next,
    /// Pushed event stream completion (server to client).
    Complete,
    /// Successful reply to `Call`, `Listen` or `Mute`.
    Return,
    /// Failed reply, or a pushed event source failure when `id` is absent.
    Error,
}

impl MessageKind {
    /// Numeric wire code.
    pub fn code(self) -> u16 {
        match self {
            MessageKind::Call => 100,
            MessageKind::Listen => 101,
            MessageKind::Mute => 102,
            MessageKind::Next => 110,
            MessageKind::Complete => 111,
            MessageKind::Return => 200,
            MessageKind::Error => 400,
        }
    }

    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Call => "call",
            MessageKind::Listen => "listen",
            MessageKind::Mute => "mute",
            MessageKind::Next => "next",
            MessageKind::Complete => "complete",
            MessageKind::Return => "return",
            MessageKind::Error => "error",
        }
    }

    /// True for the kinds a client sends to a server.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            MessageKind::Call | MessageKind::Listen | MessageKind::Mute
        )
    }
}

impl From<MessageKind> for u16 {
    fn from(kind: MessageKind) -> Self {
        kind.code()
    }
}

impl TryFrom<u16> for MessageKind {
    type Error = FrameError;

    fn try_from(code: u16) -> Result<Self> {
        match code {
            100 => Ok(MessageKind::Call),
            101 => Ok(MessageKind::Listen),
            102 => Ok(MessageKind::Mute),
            110 => Ok(MessageKind::Next),
            111 => Ok(MessageKind::Complete),
            200 => Ok(MessageKind::Return),
            400 => Ok(MessageKind::Error),
            other => Err(FrameError::UnknownMessageKind(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable failure category carried by `Error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorCode {
    UnknownMethod,
    UnknownEvent,
    InvocationFailure,
    EventSourceFailure,
}

/// Payload of an `Error` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub code: RemoteErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown_method(name: &str) -> Self {
        Self::new(RemoteErrorCode::UnknownMethod, format!("unknown method: {name}"))
    }

    pub fn unknown_event(name: &str) -> Self {
        Self::new(RemoteErrorCode::UnknownEvent, format!("unknown event: {name}"))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One service envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Correlation token; absent on pushed messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// `"<service>.<method>"` or `"<service>.<event>"`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Message {
    pub fn call(id: u64, name: impl Into<String>, args: Value) -> Self {
        Self::correlated(MessageKind::Call, id, name, Some(args))
    }

    pub fn listen(id: u64, name: impl Into<String>) -> Self {
        Self::correlated(MessageKind::Listen, id, name, None)
    }

    pub fn mute(id: u64, name: impl Into<String>) -> Self {
        Self::correlated(MessageKind::Mute, id, name, None)
    }

    /// Successful reply echoing the request id.
    pub fn reply(id: u64, name: impl Into<String>, data: Option<Value>) -> Self {
        Self::correlated(MessageKind::Return, id, name, data)
    }

    /// Failed reply echoing the request id.
    pub fn error(id: u64, name: impl Into<String>, error: &RemoteError) -> Self {
        Self::correlated(
            MessageKind::Error,
            id,
            name,
            serde_json::to_value(error).ok(),
        )
    }

    /// Pushed event value.
    pub fn next(name: impl Into<String>, data: Value) -> Self {
        Self::pushed(MessageKind::Next, name, Some(data))
    }

    /// Pushed event completion.
    pub fn complete(name: impl Into<String>) -> Self {
        Self::pushed(MessageKind::Complete, name, None)
    }

    /// Pushed event source failure.
    pub fn source_error(name: impl Into<String>, error: &RemoteError) -> Self {
        Self::pushed(MessageKind::Error, name, serde_json::to_value(error).ok())
    }

    fn correlated(kind: MessageKind, id: u64, name: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            id: Some(id),
            kind,
            name: name.into(),
            data,
        }
    }

    fn pushed(kind: MessageKind, name: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            id: None,
            kind,
            name: name.into(),
            data,
        }
    }

    /// True when the message was not sent in reply to a specific request.
    pub fn is_pushed(&self) -> bool {
        self.id.is_none()
    }

    /// Interpret the payload of an `Error` envelope.
    ///
    /// Payloads that do not match [`RemoteError`] are reported as an
    /// invocation failure carrying the raw JSON text.
    pub fn remote_error(&self) -> RemoteError {
        match &self.data {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|_| {
                RemoteError::new(RemoteErrorCode::InvocationFailure, value.to_string())
            }),
            None => RemoteError::new(
                RemoteErrorCode::InvocationFailure,
                format!("{} failed", self.name),
            ),
        }
    }

    /// Serialize into a MESSAGE-channel frame.
    pub fn to_frame(&self) -> Result<Frame> {
        let payload = serde_json::to_vec(self)?;
        Ok(Frame::new(MESSAGE, Bytes::from(payload)))
    }

    /// Parse a MESSAGE-channel frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.channel != MESSAGE {
            return Err(FrameError::UnexpectedChannel(frame.channel));
        }
        Ok(serde_json::from_slice(&frame.payload)?)
    }
}

/// Build the `"<service>.<member>"` name used on the wire.
pub fn qualified_name(service: &str, member: &str) -> String {
    format!("{service}.{member}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn call_serializes_with_numeric_type() {
        let msg = Message::call(7, "math.add", json!([2, 3]));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({ "id": 7, "type": 100, "name": "math.add", "data": [2, 3] })
        );
    }

    #[test]
    fn pushed_messages_omit_id() {
        let msg = Message::next("clock.tick", json!(1));
        assert!(msg.is_pushed());
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["type"], 110);

        let complete = serde_json::to_value(Message::complete("clock.tick")).unwrap();
        assert_eq!(complete, json!({ "type": 111, "name": "clock.tick" }));
    }

    #[test]
    fn frame_roundtrip_preserves_message() {
        let msg = Message::error(3, "math.missing", &RemoteError::unknown_method("math.missing"));
        let frame = msg.to_frame().unwrap();
        assert_eq!(frame.channel, MESSAGE);

        let decoded = Message::from_frame(&frame).unwrap();
        assert_eq!(decoded, msg);
        let err = decoded.remote_error();
        assert_eq!(err.code, RemoteErrorCode::UnknownMethod);
        assert_eq!(err.message, "unknown method: math.missing");
    }

    #[test]
    fn unknown_type_code_is_rejected() {
        let frame = Frame::new(MESSAGE, br#"{"id":1,"type":999,"name":"x.y"}"#.to_vec());
        let err = Message::from_frame(&frame).unwrap_err();
        assert!(matches!(err, FrameError::Json(_)));
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn wrong_channel_is_rejected() {
        let frame = Frame::new(0, br#"{"type":100,"name":"x.y"}"#.to_vec());
        assert!(matches!(
            Message::from_frame(&frame),
            Err(FrameError::UnexpectedChannel(0))
        ));
    }

    #[test]
    fn null_data_decodes_as_absent() {
        let frame = Frame::new(MESSAGE, br#"{"id":4,"type":200,"name":"a.b","data":null}"#.to_vec());
        let msg = Message::from_frame(&frame).unwrap();
        assert_eq!(msg.kind, MessageKind::Return);
        assert_eq!(msg.data, None);
    }

    #[test]
    fn unstructured_error_payload_becomes_invocation_failure() {
        let msg = Message {
            id: Some(1),
            kind: MessageKind::Error,
            name: "a.b".to_string(),
            data: Some(json!("boom")),
        };
        let err = msg.remote_error();
        assert_eq!(err.code, RemoteErrorCode::InvocationFailure);
        assert_eq!(err.message, "\"boom\"");
    }

    #[test]
    fn kind_codes_roundtrip() {
        for kind in [
            MessageKind::Call,
            MessageKind::Listen,
            MessageKind::Mute,
            MessageKind::Next,
            MessageKind::Complete,
            MessageKind::Return,
            MessageKind::Error,
        ] {
            assert_eq!(MessageKind::try_from(kind.code()).unwrap(), kind);
        }
        assert!(MessageKind::Mute.is_request());
        assert!(!MessageKind::Next.is_request());
    }
}
