//! Signed request envelope exchanged with the colony server.
//!
//! A request is a JSON object whose `payload` is the base64 encoding of the
//! message body; `signature` is the sr25519 signature over that base64 text.

use crate::{ClientError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use colony_core::Credential;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    AddRuntime,
    ApproveRuntime,
    DeleteRuntime,
    AssignProcess,
    AddAttribute,
    CloseSuccessful,
    CloseFailed,
    Error,
}

impl PayloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::AddRuntime => "addruntimemsg",
            PayloadType::ApproveRuntime => "approveruntimemsg",
            PayloadType::DeleteRuntime => "deleteruntimemsg",
            PayloadType::AssignProcess => "assignprocessmsg",
            PayloadType::AddAttribute => "addattributemsg",
            PayloadType::CloseSuccessful => "closesuccessfulmsg",
            PayloadType::CloseFailed => "closefailedmsg",
            PayloadType::Error => "error",
        }
    }
}

impl FromStr for PayloadType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "addruntimemsg" => Ok(PayloadType::AddRuntime),
            "approveruntimemsg" => Ok(PayloadType::ApproveRuntime),
            "deleteruntimemsg" => Ok(PayloadType::DeleteRuntime),
            "assignprocessmsg" => Ok(PayloadType::AssignProcess),
            "addattributemsg" => Ok(PayloadType::AddAttribute),
            "closesuccessfulmsg" => Ok(PayloadType::CloseSuccessful),
            "closefailedmsg" => Ok(PayloadType::CloseFailed),
            "error" => Ok(PayloadType::Error),
            other => Err(ClientError::ProtocolError(format!(
                "unknown payload type {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMessage {
    pub payloadtype: String,
    pub payload: String,
    pub signature: String,
    pub publickey: String,
}

impl RpcMessage {
    pub fn sign<T: Serialize>(
        payload_type: PayloadType,
        body: &T,
        credential: &Credential,
    ) -> Result<Self> {
        let payload = BASE64.encode(serde_json::to_vec(body)?);
        let signature = credential.sign(payload.as_bytes());

        Ok(RpcMessage {
            payloadtype: payload_type.as_str().to_string(),
            payload,
            signature,
            publickey: credential.public_key_hex(),
        })
    }

    pub fn payload_type(&self) -> Option<PayloadType> {
        self.payloadtype.parse().ok()
    }

    pub fn verify(&self) -> bool {
        Credential::verify(self.payload.as_bytes(), &self.signature, &self.publickey)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        decode_base64_json(&self.payload)
    }
}

/// Error body carried by a reply with `error: true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub status: u16,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReply {
    pub payloadtype: String,
    pub payload: String,
    #[serde(default)]
    pub error: bool,
}

impl RpcReply {
    pub fn ok<T: Serialize>(payload_type: PayloadType, body: &T) -> Result<Self> {
        Ok(RpcReply {
            payloadtype: payload_type.as_str().to_string(),
            payload: BASE64.encode(serde_json::to_vec(body)?),
            error: false,
        })
    }

    pub fn failure(status: u16, message: impl Into<String>) -> Result<Self> {
        let failure = Failure {
            status,
            message: message.into(),
        };
        Ok(RpcReply {
            payloadtype: PayloadType::Error.as_str().to_string(),
            payload: BASE64.encode(serde_json::to_vec(&failure)?),
            error: true,
        })
    }

    /// Turn an error reply into `ClientError::ServerError`.
    pub fn check(&self) -> Result<()> {
        if !self.error {
            return Ok(());
        }
        let failure: Failure = decode_base64_json(&self.payload)?;
        Err(ClientError::ServerError {
            status: failure.status,
            message: failure.message,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.check()?;
        decode_base64_json(&self.payload)
    }

    /// Like `decode`, but an empty or `null` payload yields `None`.
    pub fn decode_optional<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.check()?;
        if self.payload.trim().is_empty() {
            return Ok(None);
        }
        let value: serde_json::Value = decode_base64_json(&self.payload)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

fn decode_base64_json<T: DeserializeOwned>(payload: &str) -> Result<T> {
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| ClientError::ProtocolError(format!("payload is not base64: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credential() -> Credential {
        Credential::from_hex("0101010101010101010101010101010101010101010101010101010101010101")
            .unwrap()
    }

    #[test]
    fn test_signed_message_verifies() {
        let body = json!({ "runtimeid": "rt-1" });
        let message = RpcMessage::sign(PayloadType::ApproveRuntime, &body, &credential()).unwrap();

        assert_eq!(message.payload_type(), Some(PayloadType::ApproveRuntime));
        assert!(message.verify());

        let decoded: serde_json::Value = message.decode().unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let body = json!({ "runtimeid": "a" });
        let mut message =
            RpcMessage::sign(PayloadType::DeleteRuntime, &body, &credential()).unwrap();
        message.payload = BASE64.encode(br#"{"runtimeid":"b"}"#);
        assert!(!message.verify());
    }

    #[test]
    fn test_error_reply_becomes_server_error() {
        let reply = RpcReply::failure(403, "runtime not approved").unwrap();
        let result: Result<serde_json::Value> = reply.decode();

        match result {
            Err(ClientError::ServerError { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "runtime not approved");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_payload_is_protocol_error() {
        let reply = RpcReply {
            payloadtype: "assignprocessmsg".into(),
            payload: "%%%".into(),
            error: false,
        };
        let result: Result<serde_json::Value> = reply.decode();
        assert!(matches!(result, Err(ClientError::ProtocolError(_))));
    }

    #[test]
    fn test_payload_type_names() {
        for payload_type in [
            PayloadType::AddRuntime,
            PayloadType::ApproveRuntime,
            PayloadType::DeleteRuntime,
            PayloadType::AssignProcess,
            PayloadType::AddAttribute,
            PayloadType::CloseSuccessful,
            PayloadType::CloseFailed,
        ] {
            assert_eq!(payload_type.as_str().parse::<PayloadType>().ok(), Some(payload_type));
        }
        assert!(matches!(
            "bogus".parse::<PayloadType>(),
            Err(ClientError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_empty_or_null_payload_decodes_to_none() {
        let empty = RpcReply {
            payloadtype: "assignprocessmsg".into(),
            payload: String::new(),
            error: false,
        };
        let decoded: Option<serde_json::Value> = empty.decode_optional().unwrap();
        assert!(decoded.is_none());

        let null = RpcReply::ok(PayloadType::AssignProcess, &serde_json::Value::Null).unwrap();
        let decoded: Option<serde_json::Value> = null.decode_optional().unwrap();
        assert!(decoded.is_none());

        let body = json!({ "processid": "p-1" });
        let present = RpcReply::ok(PayloadType::AssignProcess, &body).unwrap();
        let decoded: Option<serde_json::Value> = present.decode_optional().unwrap();
        assert_eq!(decoded.unwrap()["processid"], "p-1");
    }

    #[test]
    fn test_decode_optional_still_reports_server_errors() {
        let reply = RpcReply::failure(500, "database down").unwrap();
        let result: Result<Option<serde_json::Value>> = reply.decode_optional();
        assert!(matches!(result, Err(ClientError::ServerError { status: 500, .. })));
    }
}
