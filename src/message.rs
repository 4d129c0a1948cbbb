use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminates every record of the JSON hub protocol.
pub const RECORD_SEPARATOR: char = '\u{1e}';

pub const PROTOCOL_NAME: &str = "json";
pub const PROTOCOL_VERSION: u32 = 1;

const INVOCATION: u8 = 1;
const PING: u8 = 6;
const CLOSE: u8 = 7;

#[derive(Clone, Debug, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    Other(u8),
}

#[derive(Serialize, Deserialize, Default, Debug)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_reconnect: Option<bool>,
}

impl HubMessage {
    pub fn invocation(target: &str, arguments: Vec<Value>) -> Self {
        HubMessage::Invocation {
            invocation_id: None,
            target: target.to_string(),
            arguments,
        }
    }

    pub fn to_record(&self) -> Result<String, serde_json::Error> {
        let record = match self.clone() {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => Record {
                kind: INVOCATION,
                invocation_id,
                target: Some(target),
                arguments: Some(arguments),
                ..Default::default()
            },
            HubMessage::Ping => Record {
                kind: PING,
                ..Default::default()
            },
            HubMessage::Close {
                error,
                allow_reconnect,
            } => Record {
                kind: CLOSE,
                error,
                allow_reconnect: Some(allow_reconnect),
                ..Default::default()
            },
            HubMessage::Other(kind) => Record {
                kind,
                ..Default::default()
            },
        };

        let mut out = serde_json::to_string(&record)?;
        out.push(RECORD_SEPARATOR);
        Ok(out)
    }
}

impl FromStr for HubMessage {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let record: Record = serde_json::from_str(s.trim_end_matches(RECORD_SEPARATOR))?;

        let msg = match record.kind {
            INVOCATION => HubMessage::Invocation {
                invocation_id: record.invocation_id,
                target: record
                    .target
                    .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("target"))?,
                arguments: record.arguments.unwrap_or_default(),
            },
            PING => HubMessage::Ping,
            CLOSE => HubMessage::Close {
                error: record.error,
                allow_reconnect: record.allow_reconnect.unwrap_or(false),
            },
            other => HubMessage::Other(other),
        };

        Ok(msg)
    }
}

/// Splits a text frame into its records. A frame may carry several.
pub fn records(frame: &str) -> impl Iterator<Item = &str> {
    frame.split(RECORD_SEPARATOR).filter(|r| !r.trim().is_empty())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub version: u32,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            version: PROTOCOL_VERSION,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandshakeRequest {
    pub fn to_record(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string(self)?;
        out.push(RECORD_SEPARATOR);
        Ok(out)
    }
}

impl HandshakeResponse {
    pub fn to_record(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string(self)?;
        out.push(RECORD_SEPARATOR);
        Ok(out)
    }
}

impl FromStr for HandshakeRequest {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s.trim_end_matches(RECORD_SEPARATOR))
    }
}

impl FromStr for HandshakeResponse {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s.trim_end_matches(RECORD_SEPARATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invocation_record_matches_wire_format() {
        let msg = HubMessage::invocation("echo", vec![json!("id"), json!("1234")]);
        let record = msg.to_record().unwrap();

        assert!(record.ends_with(RECORD_SEPARATOR));
        let value: Value = serde_json::from_str(record.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(value, json!({"type": 1, "target": "echo", "arguments": ["id", "1234"]}));
    }

    #[test]
    fn parses_hub_records() {
        let frame = "{\"type\":1,\"target\":\"echo\",\"arguments\":[\"id\",\"42\"]}\u{1e}{\"type\":6}\u{1e}{\"type\":3,\"invocationId\":\"1\"}\u{1e}";
        let msgs: Vec<HubMessage> = records(frame).map(|r| r.parse().unwrap()).collect();

        assert_eq!(
            msgs,
            vec![
                HubMessage::invocation("echo", vec![json!("id"), json!("42")]),
                HubMessage::Ping,
                HubMessage::Other(3),
            ]
        );

        let close: HubMessage = "{\"type\":7,\"error\":\"bye\",\"allowReconnect\":true}".parse().unwrap();
        assert_eq!(
            close,
            HubMessage::Close {
                error: Some("bye".to_string()),
                allow_reconnect: true
            }
        );
    }

    #[test]
    fn invocation_without_target_is_rejected() {
        assert!("{\"type\":1,\"arguments\":[]}".parse::<HubMessage>().is_err());
        assert!("not json".parse::<HubMessage>().is_err());
    }

    #[test]
    fn handshake_records() {
        assert_eq!(
            HandshakeRequest::default().to_record().unwrap(),
            "{\"protocol\":\"json\",\"version\":1}\u{1e}"
        );
        assert_eq!(HandshakeResponse::default().to_record().unwrap(), "{}\u{1e}");

        let response: HandshakeResponse = "{\"error\":\"unsupported\"}\u{1e}".parse().unwrap();
        assert_eq!(response.error.as_deref(), Some("unsupported"));
    }
}
