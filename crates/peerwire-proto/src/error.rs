use thiserror::Error;

/// Errors raised while decoding or encoding wire frames.
///
/// These never cross the [`peerwire_core`](../peerwire_core/index.html) Peer
/// boundary as request failures — malformed frames are logged and dropped,
/// never surfaced to request callers (see the error handling design notes).
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("frame is a reserved liveness literal, not a message")]
    LivenessLiteral,

    #[error("frame has none of request/response/notification set")]
    UnknownKind,

    #[error("frame has more than one of request/response/notification set")]
    AmbiguousKind,

    #[error("request frame missing required field `{0}`")]
    MissingField(&'static str),

    #[error("response frame has both `ok` success data and an error code, or neither")]
    MalformedResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_descriptive() {
        assert_eq!(
            ProtoError::MissingField("method").to_string(),
            "request frame missing required field `method`"
        );
        assert_eq!(
            ProtoError::LivenessLiteral.to_string(),
            "frame is a reserved liveness literal, not a message"
        );
    }
}
