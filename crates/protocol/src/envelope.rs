//! Frame header envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::{RawValue, to_raw_value};

use crate::constants::MessageType;

/// Body of an [`MessageType::Error`] reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

/// JSON header of every frame.
///
/// `payload` stays raw until the receiver has matched on `msg_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Message {
    pub fn new<T: Serialize>(
        id: impl Into<String>,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: id.into(),
            msg_type,
            payload: payload.map(to_raw_value).transpose()?,
            error: None,
        })
    }

    /// Decodes the payload as `T`. `Ok(None)` if the message carries none.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.payload
            .as_deref()
            .map(|raw| serde_json::from_str(raw.get()))
            .transpose()
    }

    pub fn error(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        let error = ErrorBody {
            code,
            message: message.into(),
        };
        Self {
            id: id.into(),
            msg_type: MessageType::Error,
            payload: None,
            error: Some(error),
        }
    }

    /// Reply to this request, carrying its id.
    pub fn reply<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Self::new(self.id.as_str(), msg_type, payload)
    }

    pub fn reply_error(&self, code: i32, message: impl Into<String>) -> Self {
        Self::error(self.id.as_str(), code, message)
    }

    pub fn is_error(&self) -> bool {
        self.msg_type == MessageType::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ObjectInfoRequest, Pong};

    #[test]
    fn payload_survives_the_envelope() {
        let req = ObjectInfoRequest {
            bucket: "photos".into(),
            name: "cat.jpg".into(),
        };
        let msg = Message::new("7", MessageType::ObjectInfo, Some(&req)).unwrap();
        let wire = serde_json::to_string(&msg).unwrap();

        let back: Message = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.msg_type, MessageType::ObjectInfo);
        assert_eq!(back.parse_payload::<ObjectInfoRequest>().unwrap(), Some(req));
    }

    #[test]
    fn empty_messages_skip_optional_fields() {
        let msg = Message::new::<()>("1", MessageType::Ping, None).unwrap();
        let wire = serde_json::to_string(&msg).unwrap();
        assert_eq!(wire, r#"{"id":"1","type":"ping"}"#);
        assert_eq!(msg.parse_payload::<Pong>().unwrap(), None);
    }

    #[test]
    fn payload_of_the_wrong_shape_fails() {
        let pong = Pong {
            protocol_version: 1,
        };
        let msg = Message::new("2", MessageType::Pong, Some(&pong)).unwrap();
        assert!(msg.parse_payload::<ObjectInfoRequest>().is_err());
    }

    #[test]
    fn replies_keep_the_request_id() {
        let request = Message::new::<()>("req-42", MessageType::Ping, None).unwrap();

        let reply = request.reply::<()>(MessageType::Pong, None).unwrap();
        assert_eq!(reply.id, "req-42");
        assert!(!reply.is_error());

        let failed = request.reply_error(404, "no such bucket");
        assert_eq!(failed.id, "req-42");
        assert!(failed.is_error());
        assert_eq!(
            failed.error,
            Some(ErrorBody {
                code: 404,
                message: "no such bucket".into()
            })
        );
    }
}
