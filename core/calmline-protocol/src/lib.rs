//! IPC protocol types and validation for calmline-daemon.
//!
//! Shared by the daemon and its clients so both sides agree on the schema.
//! The daemon stays the authority on validation; clients can reuse the
//! types to build requests that will pass it.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;
pub const MAX_CHAT_ID_CHARS: usize = 128;
pub const MAX_MESSAGE_BYTES: usize = 4096;

pub const CHECK_IN_RESPONSES: [&str; 3] = ["better", "same", "worse"];
pub const ESCALATION_CHOICES: [&str; 2] = ["contact_support", "continue_alone"];

/// Error codes carried in [`ErrorInfo::code`].
pub mod codes {
    pub const INVALID_JSON: &str = "invalid_json";
    pub const PROTOCOL_MISMATCH: &str = "protocol_mismatch";
    pub const INVALID_PARAMS: &str = "invalid_params";
    pub const EMPTY_MESSAGE: &str = "empty_message";
    pub const NO_ACTIVE_SESSION: &str = "no_active_session";
    pub const REQUEST_TOO_LARGE: &str = "request_too_large";
    pub const READ_TIMEOUT: &str = "read_timeout";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    Infer,
    CheckIn,
    EscalationChoice,
    EndSession,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Method Params
// ═══════════════════════════════════════════════════════════════════════════════

/// Pre-computed prosody features, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioParams {
    #[serde(default)]
    pub pitch_variance: f64,
    #[serde(default)]
    pub loudness: f64,
    #[serde(default)]
    pub speech_rate: f64,
    #[serde(default)]
    pub pause_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InferParams {
    pub chat_id: String,
    pub message: String,
    #[serde(default)]
    pub audio: Option<AudioParams>,
    /// RFC3339 time of the message. The daemon's clock is used when absent.
    #[serde(default)]
    pub sent_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckInParams {
    pub chat_id: String,
    pub response: String,
    #[serde(default)]
    pub sent_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationChoiceParams {
    pub chat_id: String,
    pub choice: String,
    #[serde(default)]
    pub sent_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndSessionParams {
    pub chat_id: String,
}

/// Params that can check themselves after deserializing.
pub trait Validate {
    fn validate(&self) -> Result<(), ErrorInfo>;
}

impl Validate for InferParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_chat_id(&self.chat_id)?;
        if self.message.len() > MAX_MESSAGE_BYTES {
            return Err(ErrorInfo::new(
                codes::INVALID_PARAMS,
                format!("message must be {} bytes or fewer", MAX_MESSAGE_BYTES),
            ));
        }
        if let Some(audio) = &self.audio {
            for (name, value) in [
                ("pitch_variance", audio.pitch_variance),
                ("loudness", audio.loudness),
                ("speech_rate", audio.speech_rate),
                ("pause_ratio", audio.pause_ratio),
            ] {
                if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                    return Err(ErrorInfo::new(
                        codes::INVALID_PARAMS,
                        format!("audio.{} must be within [0, 1]", name),
                    ));
                }
            }
        }
        parse_sent_at(self.sent_at.as_deref())?;
        Ok(())
    }
}

impl Validate for CheckInParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_chat_id(&self.chat_id)?;
        require_one_of(&self.response, "response", &CHECK_IN_RESPONSES)?;
        parse_sent_at(self.sent_at.as_deref())?;
        Ok(())
    }
}

impl Validate for EscalationChoiceParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_chat_id(&self.chat_id)?;
        require_one_of(&self.choice, "choice", &ESCALATION_CHOICES)?;
        parse_sent_at(self.sent_at.as_deref())?;
        Ok(())
    }
}

impl Validate for EndSessionParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_chat_id(&self.chat_id)
    }
}

/// Deserializes and validates method params. Missing params are an error.
pub fn parse_params<T>(params: Option<Value>) -> Result<T, ErrorInfo>
where
    T: DeserializeOwned + Validate,
{
    let params = params.ok_or_else(|| ErrorInfo::new(codes::INVALID_PARAMS, "params are required"))?;
    let parsed: T = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(codes::INVALID_PARAMS, format!("params are invalid: {}", err))
    })?;
    parsed.validate()?;
    Ok(parsed)
}

/// `None` when absent; an error when present but not RFC3339.
pub fn parse_sent_at(value: Option<&str>) -> Result<Option<DateTime<Utc>>, ErrorInfo> {
    match value {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|parsed| Some(parsed.with_timezone(&Utc)))
            .map_err(|_| ErrorInfo::new(codes::INVALID_PARAMS, "sent_at must be RFC3339")),
    }
}

fn require_chat_id(chat_id: &str) -> Result<(), ErrorInfo> {
    if chat_id.trim().is_empty() {
        return Err(ErrorInfo::new(codes::INVALID_PARAMS, "chat_id is required"));
    }
    if chat_id.chars().count() > MAX_CHAT_ID_CHARS {
        return Err(ErrorInfo::new(
            codes::INVALID_PARAMS,
            format!("chat_id must be {} characters or fewer", MAX_CHAT_ID_CHARS),
        ));
    }
    Ok(())
}

fn require_one_of(value: &str, field: &str, allowed: &[&str]) -> Result<(), ErrorInfo> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(ErrorInfo::new(
        codes::INVALID_PARAMS,
        format!("{} must be one of: {}", field, allowed.join(", ")),
    ))
}
