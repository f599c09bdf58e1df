//! Wire protocol shared by the runner and the debugger.
//!
//! Request and response bodies are MessagePack maps with camelCase field
//! names (`status`, `song`, `params`, `paramsConfig`, `jobId`, `resultUrl`,
//! `providerId`, `pluginId`, `pluginInfo`). Songs travel as MessagePack
//! `bin`. The debugger wraps each message in an [`Envelope`] so requests
//! and replies can flow in both directions over one socket.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use rmpv::Value;

use crate::engine::Initialized;
use crate::error::{DevkitError, Result};
use crate::plugins::{Params, ParamsConfig, PluginInfo};

/// Content type of every MessagePack body the devkit sends.
pub const CONTENT_TYPE: &str = "application/octet-stream";

/// Outcome status carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    Accepted,
    Error,
    NotFound,
    Unauthorized,
    BadRequest,
    NotReady,
    InitPluginException,
    RunPluginException,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `init-plugin-params`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPluginRequest {
    pub provider_id: String,
    pub plugin_id: String,
    #[serde(default, deserialize_with = "deserialize_song")]
    pub song: Vec<u8>,
}

/// Body of `jobs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPluginRequest {
    pub provider_id: String,
    pub plugin_id: String,
    #[serde(default, deserialize_with = "deserialize_song")]
    pub song: Vec<u8>,
    #[serde(default)]
    pub params: Params,
}

/// Payload of the debugger's `set-song` and `init-plugin` events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongPayload {
    #[serde(default, deserialize_with = "deserialize_opt_song")]
    pub song: Option<Vec<u8>>,
}

/// Payload of the debugger's `run-plugin` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunPayload {
    #[serde(default, deserialize_with = "deserialize_opt_song")]
    pub song: Option<Vec<u8>>,
    #[serde(default)]
    pub params: Params,
}

fn deserialize_song<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<u8>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Binary(bytes) => Ok(bytes),
        Value::Nil => Ok(Vec::new()),
        other => Err(D::Error::custom(format!(
            "song must be binary, got {}",
            other
        ))),
    }
}

fn deserialize_opt_song<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Vec<u8>>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Binary(bytes) => Ok(Some(bytes)),
        Value::Nil => Ok(None),
        other => Err(D::Error::custom(format!(
            "song must be binary, got {}",
            other
        ))),
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A response body. Constructors produce complete shapes only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: Status,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_bytes",
        deserialize_with = "deserialize_opt_song"
    )]
    pub song: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_config: Option<ParamsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_info: Option<PluginInfo>,

    /// Safe, human-readable summary. Never a plugin's own error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn serialize_opt_bytes<S: Serializer>(
    bytes: &Option<Vec<u8>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => serializer.serialize_bytes(bytes),
        None => serializer.serialize_none(),
    }
}

impl Response {
    /// A bare status response.
    pub fn status(status: Status) -> Self {
        Self {
            status,
            song: None,
            params_config: None,
            params: None,
            job_id: None,
            result_url: None,
            plugin_info: None,
            message: None,
        }
    }

    /// A status response with a summary message.
    pub fn failure(status: Status, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::status(status)
        }
    }

    /// A failure response for `err`, with its status from [`status_for`].
    pub fn from_error(err: &DevkitError) -> Self {
        Self::failure(status_for(err), err.to_string())
    }

    /// Successful initialization: schema plus defaults.
    pub fn initialized(init: Initialized) -> Self {
        Self {
            params_config: Some(init.params_config),
            params: Some(init.params),
            ..Self::status(Status::Ok)
        }
    }

    /// Successful run: the transformed song.
    pub fn song(song: Vec<u8>) -> Self {
        Self {
            song: Some(song),
            ..Self::status(Status::Ok)
        }
    }

    /// Async run accepted.
    pub fn accepted(job_id: &str, result_url: String) -> Self {
        Self {
            job_id: Some(job_id.to_string()),
            result_url: Some(result_url),
            ..Self::status(Status::Accepted)
        }
    }

    /// Debugger bundle info.
    pub fn plugin_info(info: PluginInfo) -> Self {
        Self {
            plugin_info: Some(info),
            ..Self::status(Status::Ok)
        }
    }

    /// Tag this response with an async job id.
    pub fn with_job_id(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }

    /// Encode as a MessagePack map.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Map an error to the status a caller sees. Plugin faults and authorizer
/// rejections never become a `DevkitError`; they are reported through
/// `ExecutionResult`.
pub fn status_for(err: &DevkitError) -> Status {
    match err {
        DevkitError::NotFound { .. } => Status::NotFound,
        DevkitError::NotReady(_) => Status::NotReady,
        DevkitError::BadRequest(_) | DevkitError::Codec(_) => Status::BadRequest,
        _ => Status::Error,
    }
}

/// Decode a MessagePack request body.
pub fn decode_request<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| DevkitError::BadRequest(format!("Malformed body: {}", e)))
}

// ---------------------------------------------------------------------------
// Duplex envelopes
// ---------------------------------------------------------------------------

/// Direction of an envelope relative to its `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Request,
    Response,
}

/// One framed message on the debugger socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub id: u64,
    /// Event name; requests only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default = "nil")]
    pub payload: Value,
}

fn nil() -> Value {
    Value::Nil
}

impl Envelope {
    pub fn request(id: u64, event: &str, payload: Value) -> Self {
        Self {
            kind: EnvelopeKind::Request,
            id,
            event: Some(event.to_string()),
            payload,
        }
    }

    pub fn response(id: u64, payload: Value) -> Self {
        Self {
            kind: EnvelopeKind::Response,
            id,
            event: None,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| DevkitError::BadRequest(format!("Malformed envelope: {}", e)))
    }
}

/// Convert a serializable value into a dynamic MessagePack value, keeping
/// structs as maps and byte buffers as `bin`.
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    let bytes = rmp_serde::to_vec_named(value)?;
    rmpv::decode::read_value(&mut bytes.as_slice())
        .map_err(|e| DevkitError::Codec(e.to_string()))
}

/// Convert a dynamic MessagePack value into a typed payload.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    let mut bytes = Vec::new();
    rmpv::encode::write_value(&mut bytes, value).map_err(|e| DevkitError::Codec(e.to_string()))?;
    decode_request(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{ParamDescriptor, WidgetDescriptor, WidgetType};

    fn map(entries: Vec<(&str, Value)>) -> Vec<u8> {
        let value = Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::from(k), v))
                .collect(),
        );
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &value).unwrap();
        buf
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&Status::Ok).unwrap(), r#""OK""#);
        assert_eq!(
            serde_json::to_string(&Status::InitPluginException).unwrap(),
            r#""INIT_PLUGIN_EXCEPTION""#
        );
        assert_eq!(
            serde_json::to_string(&Status::NotReady).unwrap(),
            r#""NOT_READY""#
        );
    }

    #[test]
    fn test_decode_run_request() {
        let body = map(vec![
            ("providerId", Value::from("andantei")),
            ("pluginId", Value::from("hello-world")),
            ("song", Value::Binary(vec![0x80])),
            (
                "params",
                Value::Map(vec![(Value::from("amount"), Value::from(3))]),
            ),
        ]);
        let request: RunPluginRequest = decode_request(&body).unwrap();
        assert_eq!(request.provider_id, "andantei");
        assert_eq!(request.song, vec![0x80]);
        assert_eq!(request.params["amount"].as_i64(), Some(3));
    }

    #[test]
    fn test_decode_request_defaults() {
        let body = map(vec![
            ("providerId", Value::from("andantei")),
            ("pluginId", Value::from("hello-world")),
        ]);
        let request: RunPluginRequest = decode_request(&body).unwrap();
        assert!(request.song.is_empty());
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_decode_rejects_text_song() {
        let body = map(vec![
            ("providerId", Value::from("a")),
            ("pluginId", Value::from("b")),
            ("song", Value::from("not bytes")),
        ]);
        let err = decode_request::<InitPluginRequest>(&body).unwrap_err();
        assert!(matches!(err, DevkitError::BadRequest(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_request::<InitPluginRequest>(b"{}").is_err());
        assert!(decode_request::<InitPluginRequest>(&[]).is_err());
    }

    #[test]
    fn test_song_response_uses_named_fields_and_bin() {
        let bytes = Response::song(vec![1, 2, 3]).encode().unwrap();
        let value = rmpv::decode::read_value(&mut bytes.as_slice()).unwrap();
        let entries = value.as_map().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.as_str(), Some("status"));
        assert_eq!(entries[0].1.as_str(), Some("OK"));
        assert_eq!(entries[1].0.as_str(), Some("song"));
        assert_eq!(entries[1].1, Value::Binary(vec![1, 2, 3]));
    }

    #[test]
    fn test_initialized_response() {
        let mut params_config = ParamsConfig::new();
        params_config.insert(
            "gain".to_string(),
            ParamDescriptor::new("Gain", 1.0, WidgetDescriptor::new(WidgetType::SliderNumber)),
        );
        let init = Initialized {
            params: crate::plugins::default_params(&params_config),
            params_config,
        };

        let bytes = Response::initialized(init).encode().unwrap();
        let decoded = Response::decode(&bytes).unwrap();
        assert_eq!(decoded.status, Status::Ok);
        assert_eq!(decoded.params.unwrap()["gain"].as_f64(), Some(1.0));
        assert!(decoded.params_config.unwrap().contains_key("gain"));
        assert!(decoded.song.is_none());
    }

    #[test]
    fn test_accepted_response() {
        let decoded = Response::decode(
            &Response::accepted("job-1", "http://download.link/job-1".to_string())
                .encode()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(decoded.status, Status::Accepted);
        assert_eq!(decoded.job_id.as_deref(), Some("job-1"));
        assert_eq!(
            decoded.result_url.as_deref(),
            Some("http://download.link/job-1")
        );
    }

    #[test]
    fn test_status_for_errors() {
        assert_eq!(
            status_for(&DevkitError::NotFound {
                provider_id: "a".into(),
                plugin_id: "b".into()
            }),
            Status::NotFound
        );
        let not_ready = DevkitError::NotReady("x".into());
        assert_eq!(status_for(&not_ready), Status::NotReady);
        let codec = DevkitError::Codec("x".into());
        assert_eq!(status_for(&codec), Status::BadRequest);
        assert_eq!(status_for(&DevkitError::Config("x".into())), Status::Error);
    }

    #[test]
    fn test_response_from_error() {
        let response = Response::from_error(&DevkitError::NotReady("song not ready".into()));
        assert_eq!(response.status, Status::NotReady);
        assert_eq!(
            response.message.as_deref(),
            Some("Not ready: song not ready")
        );
        assert!(response.song.is_none());
    }

    #[test]
    fn test_envelope_with_typed_payload() {
        let payload = to_value(&Response::song(vec![9])).unwrap();
        let envelope = Envelope::response(7, payload);
        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);

        let response: Response = from_value(&decoded.payload).unwrap();
        assert_eq!(response.song, Some(vec![9]));
    }

    #[test]
    fn test_envelope_request_payload_defaults_to_nil() {
        let body = map(vec![
            ("kind", Value::from("request")),
            ("id", Value::from(1)),
            ("event", Value::from("get-bundle-info")),
        ]);
        let envelope = Envelope::decode(&body).unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Request);
        assert_eq!(envelope.payload, Value::Nil);
    }

    #[test]
    fn test_run_payload_optional_song() {
        let run: RunPayload = from_value(&Value::Map(vec![(
            Value::from("params"),
            Value::Map(vec![]),
        )]))
        .unwrap();
        assert!(run.song.is_none());
    }
}
