use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;

/// A request sent by one side of a peer expecting a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub request: bool,
    pub id: u32,
    pub method: String,
    #[serde(default = "Value::default")]
    pub data: Value,
}

impl Request {
    pub fn new(id: u32, method: impl Into<String>, data: Value) -> Self {
        Self {
            request: true,
            id,
            method: method.into(),
            data,
        }
    }
}

/// A one-way message that expects no response and carries no id correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification: bool,
    pub method: String,
    #[serde(default = "Value::default")]
    pub data: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, data: Value) -> Self {
        Self {
            notification: true,
            method: method.into(),
            data,
        }
    }
}

/// Either half of a reply to a [`Request`], correlated by `id`.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success { id: u32, data: Value },
    Error { id: u32, code: i32, reason: String },
}

impl Response {
    pub fn id(&self) -> u32 {
        match self {
            Response::Success { id, .. } => *id,
            Response::Error { id, .. } => *id,
        }
    }

    pub fn success(id: u32, data: Value) -> Self {
        Response::Success { id, data }
    }

    pub fn error(id: u32, code: i32, reason: impl Into<String>) -> Self {
        Response::Error {
            id,
            code,
            reason: reason.into(),
        }
    }

    pub fn into_result(self) -> Result<Value, (i32, String)> {
        match self {
            Response::Success { data, .. } => Ok(data),
            Response::Error { code, reason, .. } => Err((code, reason)),
        }
    }
}

/// Wire form of [`Response`] — serialized and deserialized as a flat object
/// with `response: true`, `ok` discriminating success/error, and either
/// `data` or `errorCode`/`errorReason` populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireResponse {
    response: bool,
    id: u32,
    ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(rename = "errorCode", default, skip_serializing_if = "Option::is_none")]
    error_code: Option<i32>,
    #[serde(
        rename = "errorReason",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    error_reason: Option<String>,
}

impl From<Response> for WireResponse {
    fn from(r: Response) -> Self {
        match r {
            Response::Success { id, data } => WireResponse {
                response: true,
                id,
                ok: true,
                data: Some(data),
                error_code: None,
                error_reason: None,
            },
            Response::Error { id, code, reason } => WireResponse {
                response: true,
                id,
                ok: false,
                data: None,
                error_code: Some(code),
                error_reason: Some(reason),
            },
        }
    }
}

impl TryFrom<WireResponse> for Response {
    type Error = ProtoError;

    fn try_from(w: WireResponse) -> Result<Self, Self::Error> {
        match (w.ok, w.data, w.error_code, w.error_reason) {
            (true, Some(data), None, None) => Ok(Response::Success { id: w.id, data }),
            (true, None, None, None) => Ok(Response::Success {
                id: w.id,
                data: Value::Null,
            }),
            (false, None, Some(code), Some(reason)) => Ok(Response::Error {
                id: w.id,
                code,
                reason,
            }),
            _ => Err(ProtoError::MalformedResponse),
        }
    }
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        WireResponse::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = WireResponse::deserialize(deserializer)?;
        Response::try_from(wire).map_err(serde::de::Error::custom)
    }
}

/// Any of the three message kinds that can arrive on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    pub fn to_wire_text(&self) -> Result<String, ProtoError> {
        let value = match self {
            Message::Request(r) => serde_json::to_value(r)?,
            Message::Response(r) => serde_json::to_value(r)?,
            Message::Notification(n) => serde_json::to_value(n)?,
        };
        Ok(serde_json::to_string(&value)?)
    }

    /// Classify and parse a raw inbound text frame.
    ///
    /// `"ping"` and `"pong"` are reserved liveness literals, intercepted by
    /// the transport before this is ever called; if one slips through it is
    /// rejected here too rather than treated as a malformed JSON message.
    pub fn parse(text: &str) -> Result<Message, ProtoError> {
        if text == "ping" || text == "pong" {
            return Err(ProtoError::LivenessLiteral);
        }

        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Message, ProtoError> {
        let obj = value.as_object().ok_or(ProtoError::UnknownKind)?;

        let is_request = obj.get("request").and_then(Value::as_bool).unwrap_or(false);
        let is_response = obj.get("response").and_then(Value::as_bool).unwrap_or(false);
        let is_notification = obj
            .get("notification")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let kinds = is_request as u8 + is_response as u8 + is_notification as u8;
        if kinds == 0 {
            return Err(ProtoError::UnknownKind);
        }
        if kinds > 1 {
            return Err(ProtoError::AmbiguousKind);
        }

        if is_request {
            let request: Request = serde_json::from_value(value)?;
            Ok(Message::Request(request))
        } else if is_response {
            let response: Response = serde_json::from_value(value)?;
            Ok(Message::Response(response))
        } else {
            let notification: Notification = serde_json::from_value(value)?;
            Ok(Message::Notification(notification))
        }
    }
}
