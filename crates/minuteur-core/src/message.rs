//! Messages exchanged with controlled clients

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Message posted by a client page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Activate the waiting worker without waiting for a reload
    SkipWaiting,
    /// Ask for the worker version over the reply port
    GetVersion,
    #[serde(other)]
    Unknown,
}

/// Answer to [`ClientMessage::GetVersion`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
    pub version: String,
}

/// Channel a client hands over to receive a reply
pub type ReplyPort = oneshot::Sender<VersionReply>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_messages() {
        let skip: ClientMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(skip, ClientMessage::SkipWaiting);

        let version: ClientMessage = serde_json::from_str(r#"{"type":"GET_VERSION"}"#).unwrap();
        assert_eq!(version, ClientMessage::GetVersion);

        let other: ClientMessage = serde_json::from_str(r#"{"type":"START_TIMER"}"#).unwrap();
        assert_eq!(other, ClientMessage::Unknown);
    }

    #[test]
    fn test_version_reply_shape() {
        let reply = VersionReply {
            version: "4.0".to_string(),
        };
        assert_eq!(serde_json::to_string(&reply).unwrap(), r#"{"version":"4.0"}"#);
    }
}
