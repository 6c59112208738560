//! JSON-RPC message envelopes as used by OVSDB (RFC 7047 section 4).
//!
//! OVSDB speaks JSON-RPC 1.0: requests carry `method`, `params` and `id`;
//! notifications are requests whose `id` is null; responses carry `result`,
//! `error` and the `id` of the request they answer.

use crate::error::ProtocolError;
use crate::ECHO_METHOD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Returns the correlation key of a JSON-RPC id.
///
/// The key is the id's JSON text, so `"7"` and `7` stay distinct.
pub fn id_key(id: &Value) -> String {
    id.to_string()
}

/// Request message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,

    #[serde(default)]
    pub params: Value,

    /// Request id, echoed back in the response.
    pub id: Value,
}

impl Request {
    /// Creates a request with a fresh random id.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            id: Value::String(uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id_key(&self) -> String {
        id_key(&self.id)
    }

    pub fn is_echo(&self) -> bool {
        self.method == ECHO_METHOD
    }

    /// Builds the reply to an `echo` request: the params, echoed back.
    pub fn echo_reply(&self) -> Response {
        Response::ok(self.id.clone(), self.params.clone())
    }
}

/// Notification message envelope (a request without a reply).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,

    #[serde(default)]
    pub params: Value,

    /// Always null on the wire.
    #[serde(default)]
    pub id: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            id: Value::Null,
        }
    }

    /// Returns the params as an array, if they are one.
    pub fn params_array(&self) -> Option<&[Value]> {
        self.params.as_array().map(Vec::as_slice)
    }
}

/// Error object carried in a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Short error tag, e.g. `"unknown database"`.
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl RpcError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {}", self.error, details),
            None => f.write_str(&self.error),
        }
    }
}

/// Response message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this response answers.
    pub id: Value,

    #[serde(default)]
    pub result: Value,

    /// Null on success.
    #[serde(default)]
    pub error: Value,
}

impl Response {
    pub fn ok(id: impl Into<Value>, result: Value) -> Self {
        Self {
            id: id.into(),
            result,
            error: Value::Null,
        }
    }

    pub fn error(id: impl Into<Value>, error: RpcError) -> Self {
        Self {
            id: id.into(),
            result: Value::Null,
            error: serde_json::to_value(error).unwrap_or(Value::Null),
        }
    }

    pub fn id_key(&self) -> String {
        id_key(&self.id)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_null()
    }

    pub fn is_error(&self) -> bool {
        !self.is_ok()
    }

    /// Extracts the error object. A bare string error is accepted too.
    pub fn rpc_error(&self) -> Option<RpcError> {
        match &self.error {
            Value::Null => None,
            Value::String(s) => Some(RpcError::new(s.as_str())),
            other => Some(
                serde_json::from_value(other.clone())
                    .unwrap_or_else(|_| RpcError::new(other.to_string())),
            ),
        }
    }
}

/// A classified JSON-RPC document.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Message {
    /// Classifies a decoded document by the fields it carries.
    pub fn classify(doc: Value) -> Result<Self, ProtocolError> {
        let obj = doc
            .as_object()
            .ok_or_else(|| ProtocolError::InvalidMessage("top-level value is not an object".into()))?;

        if obj.contains_key("method") {
            let has_id = obj.get("id").is_some_and(|id| !id.is_null());
            if has_id {
                Ok(Message::Request(serde_json::from_value(doc)?))
            } else {
                Ok(Message::Notification(serde_json::from_value(doc)?))
            }
        } else if obj.contains_key("result") || obj.contains_key("error") {
            if !obj.contains_key("id") {
                return Err(ProtocolError::MissingField("id"));
            }
            Ok(Message::Response(serde_json::from_value(doc)?))
        } else {
            Err(ProtocolError::InvalidMessage(
                "neither a request nor a response".into(),
            ))
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(r) => Some(&r.method),
            Message::Notification(n) => Some(&n.method),
            Message::Response(_) => None,
        }
    }
}

/// Serializes envelopes for the write path. OVSDB adds no framing bytes.
pub struct Encoder;

impl Encoder {
    pub fn encode_request(request: &Request) -> Result<Bytes, ProtocolError> {
        Self::encode_message(request)
    }

    pub fn encode_response(response: &Response) -> Result<Bytes, ProtocolError> {
        Self::encode_message(response)
    }

    /// Encodes any JSON-serializable value.
    pub fn encode_message<T: Serialize>(value: &T) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameDecoder;
    use serde_json::json;

    #[test]
    fn test_classify_request() {
        let msg = Message::classify(json!({"id": "e1", "method": "echo", "params": ["x"]})).unwrap();
        match msg {
            Message::Request(req) => {
                assert!(req.is_echo());
                assert_eq!(req.id_key(), "\"e1\"");
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_notification() {
        let msg = Message::classify(json!({
            "id": null,
            "method": "update",
            "params": ["sub1", {"Bridge": {}}]
        }))
        .unwrap();
        assert_eq!(msg.method(), Some("update"));
        match msg {
            Message::Notification(n) => assert_eq!(n.params_array().map(<[Value]>::len), Some(2)),
            other => panic!("expected notification, got {:?}", other),
        }

        // An absent id is also a notification.
        let msg = Message::classify(json!({"method": "locked", "params": ["l"]})).unwrap();
        assert!(matches!(msg, Message::Notification(_)));
    }

    #[test]
    fn test_classify_response() {
        let msg = Message::classify(json!({"id": 7, "result": ["Open_vSwitch"], "error": null})).unwrap();
        match msg {
            Message::Response(resp) => {
                assert!(resp.is_ok());
                assert_eq!(resp.id_key(), "7");
                assert_eq!(resp.result, json!(["Open_vSwitch"]));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_id_key_keeps_json_type() {
        assert_ne!(id_key(&json!("7")), id_key(&json!(7)));
        assert_eq!(id_key(&json!("7")), "\"7\"");
        assert_eq!(id_key(&json!(["mon", 1])), r#"["mon",1]"#);
        assert_ne!(id_key(&json!("null")), id_key(&Value::Null));
    }

    #[test]
    fn test_classify_rejects_unknown_shapes() {
        assert!(matches!(
            Message::classify(json!([1, 2])),
            Err(ProtocolError::InvalidMessage(_))
        ));
        assert!(matches!(
            Message::classify(json!({"foo": 1})),
            Err(ProtocolError::InvalidMessage(_))
        ));
        assert!(matches!(
            Message::classify(json!({"result": 1})),
            Err(ProtocolError::MissingField("id"))
        ));
        assert!(matches!(
            Message::classify(json!({"id": 1, "method": 5})),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_rpc_error_extraction() {
        let resp = Response::error(3, RpcError::new("unknown database").with_details("no db Foo"));
        assert!(resp.is_error());
        let err = resp.rpc_error().unwrap();
        assert_eq!(err.error, "unknown database");
        assert_eq!(err.to_string(), "unknown database: no db Foo");

        let resp: Response = serde_json::from_value(json!({"id": 1, "result": null, "error": "oops"})).unwrap();
        assert_eq!(resp.rpc_error().unwrap().error, "oops");

        let ok = Response::ok(1, json!({}));
        assert!(ok.rpc_error().is_none());
    }

    #[test]
    fn test_echo_reply() {
        let req = Request::new(ECHO_METHOD, json!(["ping"])).with_id("echo");
        let reply = req.echo_reply();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"id": "echo", "result": ["ping"], "error": null})
        );
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = Request::new("list_dbs", json!([]));
        let b = Request::new("list_dbs", json!([]));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_encoded_messages_frame_back() {
        let req = Request::new("get_schema", json!(["Open_vSwitch"])).with_id(1);
        let resp = Response::ok(1, json!({"name": "Open_vSwitch"}));

        let mut wire = Encoder::encode_request(&req).unwrap().to_vec();
        wire.extend_from_slice(&Encoder::encode_response(&resp).unwrap());

        let mut decoder = FrameDecoder::default();
        let docs = decoder.feed(&wire).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(Message::classify(docs[0].clone()).unwrap(), Message::Request(req));
        assert_eq!(Message::classify(docs[1].clone()).unwrap(), Message::Response(resp));
    }
}
