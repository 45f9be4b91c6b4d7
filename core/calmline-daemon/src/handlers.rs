//! Request dispatch from protocol methods to the engine.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use calmline_core::{
    AudioFeatures, CalmlineError, CheckInResponse, DistressEngine, EscalationChoice,
};
use calmline_protocol::{
    codes, parse_params, parse_sent_at, AudioParams, CheckInParams, EndSessionParams,
    EscalationChoiceParams, ErrorInfo, InferParams, Method, Request, Response, PROTOCOL_VERSION,
};

pub fn handle_request(request: Request, engine: &DistressEngine) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            codes::PROTOCOL_MISMATCH,
            "unsupported protocol version",
        );
    }

    let id = request.id;
    let result = match request.method {
        Method::GetHealth => Ok(health(engine)),
        Method::Infer => handle_infer(request.params, engine),
        Method::CheckIn => handle_check_in(request.params, engine),
        Method::EscalationChoice => handle_escalation_choice(request.params, engine),
        Method::EndSession => handle_end_session(request.params, engine),
    };

    match result {
        Ok(data) => Response::ok(id, data),
        Err(err) => Response::error_with_info(id, err),
    }
}

fn health(engine: &DistressEngine) -> Value {
    json!({
        "status": "ok",
        "pid": std::process::id(),
        "version": env!("CARGO_PKG_VERSION"),
        "protocol_version": PROTOCOL_VERSION,
        "sessions": engine.session_count(),
        "generator": engine.generator_name(),
    })
}

fn handle_infer(params: Option<Value>, engine: &DistressEngine) -> Result<Value, ErrorInfo> {
    let params: InferParams = parse_params(params)?;
    let now = parse_sent_at(params.sent_at.as_deref())?.unwrap_or_else(Utc::now);
    let audio = params.audio.map(audio_features);

    let event = engine
        .handle_message(&params.chat_id, &params.message, audio.as_ref(), now)
        .map_err(engine_error)?;
    to_data(&event)
}

fn handle_check_in(params: Option<Value>, engine: &DistressEngine) -> Result<Value, ErrorInfo> {
    let params: CheckInParams = parse_params(params)?;
    let now = parse_sent_at(params.sent_at.as_deref())?.unwrap_or_else(Utc::now);
    let response = CheckInResponse::parse(&params.response).ok_or_else(|| {
        ErrorInfo::new(codes::INVALID_PARAMS, "response must be better, same or worse")
    })?;

    let event = engine
        .handle_check_in(&params.chat_id, response, now)
        .map_err(engine_error)?;
    to_data(&event)
}

fn handle_escalation_choice(
    params: Option<Value>,
    engine: &DistressEngine,
) -> Result<Value, ErrorInfo> {
    let params: EscalationChoiceParams = parse_params(params)?;
    let now = parse_sent_at(params.sent_at.as_deref())?.unwrap_or_else(Utc::now);
    let choice = match params.choice.as_str() {
        "contact_support" => EscalationChoice::ContactSupport,
        "continue_alone" => EscalationChoice::ContinueAlone,
        _ => {
            return Err(ErrorInfo::new(
                codes::INVALID_PARAMS,
                "choice must be contact_support or continue_alone",
            ))
        }
    };

    let event = engine
        .handle_escalation_choice(&params.chat_id, choice, now)
        .map_err(engine_error)?;
    if event.support_requested {
        info!(chat_id = %params.chat_id, "Support contact requested");
    }
    to_data(&event)
}

fn handle_end_session(params: Option<Value>, engine: &DistressEngine) -> Result<Value, ErrorInfo> {
    let params: EndSessionParams = parse_params(params)?;
    let ended = engine.end_session(&params.chat_id);
    Ok(json!({ "ended": ended }))
}

fn audio_features(params: AudioParams) -> AudioFeatures {
    AudioFeatures {
        pitch_variance: params.pitch_variance,
        loudness: params.loudness,
        speech_rate: params.speech_rate,
        pause_ratio: params.pause_ratio,
    }
}

fn engine_error(err: CalmlineError) -> ErrorInfo {
    let code = match &err {
        CalmlineError::NoActiveSession(_) => codes::NO_ACTIVE_SESSION,
        CalmlineError::NoPendingEscalation(_) => codes::INVALID_PARAMS,
        CalmlineError::EmptyMessage => codes::EMPTY_MESSAGE,
        CalmlineError::Config(_) => "internal_error",
    };
    ErrorInfo::new(code, err.to_string())
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, ErrorInfo> {
    serde_json::to_value(value).map_err(|err| {
        ErrorInfo::new(
            "serialization_error",
            format!("failed to encode response: {}", err),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use calmline_core::CalmlineConfig;

    fn engine() -> DistressEngine {
        DistressEngine::new(CalmlineConfig::default()).expect("engine")
    }

    fn request(method: Method, params: Option<Value>) -> Request {
        Request {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: Some("req-1".to_string()),
            params,
        }
    }

    fn error_code(response: &Response) -> &str {
        response
            .error
            .as_ref()
            .map(|error| error.code.as_str())
            .unwrap_or("")
    }

    #[test]
    fn rejects_protocol_mismatch() {
        let mut req = request(Method::GetHealth, None);
        req.protocol_version = 99;
        let response = handle_request(req, &engine());
        assert!(!response.ok);
        assert_eq!(error_code(&response), codes::PROTOCOL_MISMATCH);
    }

    #[test]
    fn health_reports_session_count() {
        let response = handle_request(request(Method::GetHealth, None), &engine());
        let data = response.data.expect("data");
        assert_eq!(data["status"], "ok");
        assert_eq!(data["sessions"], 0);
        assert_eq!(response.id.as_deref(), Some("req-1"));
    }

    #[test]
    fn infer_returns_output_event() {
        let response = handle_request(
            request(
                Method::Infer,
                Some(json!({
                    "chat_id": "chat-1",
                    "message": "I am having a panic attack, I cannot breathe",
                    "sent_at": "2026-03-01T12:00:00Z"
                })),
            ),
            &engine(),
        );
        assert!(response.ok);
        let data = response.data.expect("data");
        assert_eq!(data["state"], "panic");
        assert_eq!(data["intervention_type"], "four_seven_eight");
        assert_eq!(data["step_index"], 0);
        assert_eq!(data["buttons"], json!(["better", "same", "worse"]));
    }

    #[test]
    fn infer_rejects_blank_message() {
        let response = handle_request(
            request(
                Method::Infer,
                Some(json!({ "chat_id": "chat-1", "message": "   " })),
            ),
            &engine(),
        );
        assert_eq!(error_code(&response), codes::EMPTY_MESSAGE);
    }

    #[test]
    fn check_in_without_session_is_reported() {
        let response = handle_request(
            request(
                Method::CheckIn,
                Some(json!({ "chat_id": "ghost", "response": "better" })),
            ),
            &engine(),
        );
        assert_eq!(error_code(&response), codes::NO_ACTIVE_SESSION);
    }

    #[test]
    fn escalation_choice_flow() {
        let engine = engine();
        handle_request(
            request(
                Method::Infer,
                Some(json!({ "chat_id": "chat-1", "message": "I want to die" })),
            ),
            &engine,
        );
        let response = handle_request(
            request(
                Method::EscalationChoice,
                Some(json!({ "chat_id": "chat-1", "choice": "contact_support" })),
            ),
            &engine,
        );
        let data = response.data.expect("data");
        assert_eq!(data["state"], "crisis_risk");
        assert_eq!(data["support_requested"], true);
    }

    #[test]
    fn escalation_choice_without_offer_is_invalid() {
        let engine = engine();
        handle_request(
            request(
                Method::Infer,
                Some(json!({ "chat_id": "chat-1", "message": "what's for dinner" })),
            ),
            &engine,
        );
        let response = handle_request(
            request(
                Method::EscalationChoice,
                Some(json!({ "chat_id": "chat-1", "choice": "continue_alone" })),
            ),
            &engine,
        );
        assert_eq!(error_code(&response), codes::INVALID_PARAMS);
        assert_eq!(
            engine.session("chat-1").expect("session").state,
            calmline_core::DistressState::Calm
        );
    }

    #[test]
    fn end_session_reports_whether_it_existed() {
        let engine = engine();
        handle_request(
            request(
                Method::Infer,
                Some(json!({ "chat_id": "chat-1", "message": "hello" })),
            ),
            &engine,
        );
        let params = Some(json!({ "chat_id": "chat-1" }));
        let first = handle_request(request(Method::EndSession, params.clone()), &engine);
        assert_eq!(first.data.expect("data")["ended"], true);
        let second = handle_request(request(Method::EndSession, params), &engine);
        assert_eq!(second.data.expect("data")["ended"], false);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let response = handle_request(
            request(Method::Infer, Some(json!({ "chat_id": "chat-1" }))),
            &engine(),
        );
        assert_eq!(error_code(&response), codes::INVALID_PARAMS);
    }
}
