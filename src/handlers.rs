use crate::consts::{
    APP_GREETING, FALLBACK_REPLY, GATHER_LANGUAGE, GREETING_LANGUAGE, GREETING_VOICE,
    HISTORY_TURNS, PROCESS_PATH, RECORDING_PATH, REPROMPT, SPEECH_MODEL, STATUS_PATH,
    UNKNOWN_CALLER, VOICE_PATH,
};
use crate::error::AppError;
use crate::store::ConversationTurn;
use crate::twilio_types::{
    GatherAction, GatherInput, GatherPayload, HttpMethod, RecordingCallbackPayload,
    RedirectAction, Response, ResponseAction, SayAction, StatusCallbackPayload, Twiml,
    VoicePayload,
};
use crate::types::AppState;

use axum::{body::Bytes, extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use time::UtcOffset;
use tracing::{debug, info, warn};

/// Listen for the caller's next utterance and POST it to the process webhook.
fn speech_gather() -> ResponseAction {
    ResponseAction::Gather(GatherAction {
        input: Some(GatherInput::Speech),
        action: Some(PROCESS_PATH.to_string()),
        method: Some(HttpMethod::Post),
        speech_timeout: Some("auto".to_string()),
        speech_model: Some(SPEECH_MODEL.to_string()),
        language: Some(GATHER_LANGUAGE.to_string()),
    })
}

fn say(text: &str) -> ResponseAction {
    ResponseAction::Say(SayAction {
        text: text.to_string(),
        ..Default::default()
    })
}

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "status": "running",
        "message": "AI Call Agent is active",
        "endpoints": {
            "voice": VOICE_PATH,
            "process": PROCESS_PATH,
            "status": STATUS_PATH,
            "recording": RECORDING_PATH,
        }
    }))
}

pub async fn twiml_voice(
    State(app_state): State<Arc<AppState>>,
    body: Bytes,
) -> axum::response::Response {
    app_state.respond("voice", greet(&body))
}

/// Greeting, then a speech gather. If the gather times out with nothing heard, Twilio falls
/// through to the redirect and the greeting starts over.
fn greet(body: &[u8]) -> Result<Twiml, AppError> {
    let payload: VoicePayload = serde_urlencoded::from_bytes(body)?;
    let from = payload.from.as_deref().unwrap_or(UNKNOWN_CALLER);
    info!(
        from=%from,
        call_sid=?payload.call_sid,
        to=?payload.to,
        answered_by=?payload.answered_by,
        "received call"
    );

    let greeting = ResponseAction::Say(SayAction {
        text: APP_GREETING.to_string(),
        voice: Some(GREETING_VOICE.to_string()),
        language: Some(GREETING_LANGUAGE.to_string()),
        ..Default::default()
    });
    let restart = ResponseAction::Redirect(RedirectAction {
        url: VOICE_PATH.to_string(),
        method: Some(HttpMethod::Post),
    });

    Ok(Twiml::from(Response {
        actions: vec![greeting, speech_gather(), restart],
    }))
}

pub async fn twiml_process(
    State(app_state): State<Arc<AppState>>,
    body: Bytes,
) -> axum::response::Response {
    let outcome = converse(&app_state, &body).await;
    app_state.respond("process", outcome)
}

async fn converse(app_state: &AppState, body: &[u8]) -> Result<Twiml, AppError> {
    let payload: GatherPayload = serde_urlencoded::from_bytes(body)?;
    let from = payload.from.as_deref().unwrap_or(UNKNOWN_CALLER);
    let speech = payload
        .speech_result
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    info!(
        from=%from,
        call_sid=?payload.call_sid,
        confidence=?payload.confidence,
        speech=%speech,
        "received speech"
    );

    if speech.is_empty() {
        return Ok(Twiml::from(Response {
            actions: vec![say(REPROMPT), speech_gather()],
        }));
    }

    let now = app_state.now();
    let today = now.to_offset(UtcOffset::UTC).date();
    let history = app_state
        .store
        .recent_turns(from, today, HISTORY_TURNS)
        .await?;
    let mut reply = app_state.responder.reply(speech, &history).await;
    if reply.trim().is_empty() {
        reply = FALLBACK_REPLY.to_string();
    }
    info!(from=%from, reply=%reply, history=history.len(), "ai response");

    app_state
        .store
        .append_turn(from, ConversationTurn::new(now, speech, reply.as_str()))
        .await?;

    Ok(Twiml::from(Response {
        actions: vec![say(&reply), speech_gather()],
    }))
}

/// Call lifecycle events. Always acknowledged so Twilio does not retry or raise alerts.
pub async fn twiml_status(body: Bytes) -> &'static str {
    match serde_urlencoded::from_bytes::<StatusCallbackPayload>(&body) {
        Ok(payload) => info!(
            call_sid=?payload.call_sid,
            status=?payload.call_status,
            from=?payload.from,
            to=?payload.to,
            duration=?payload.call_duration,
            answered_by=?payload.answered_by,
            "call status"
        ),
        Err(e) => warn!(
            error=%e,
            body=%String::from_utf8_lossy(&body),
            "failed to deserialize status callback"
        ),
    }
    "OK"
}

pub async fn twiml_recording(body: Bytes) -> &'static str {
    match serde_urlencoded::from_bytes::<RecordingCallbackPayload>(&body) {
        Ok(payload) => {
            info!(
                call_sid=?payload.call_sid,
                recording_sid=?payload.recording_sid,
                status=?payload.recording_status,
                duration=?payload.recording_duration,
                "recording status"
            );
            debug!(url=?payload.recording_url, "recording url");
        }
        Err(e) => warn!(
            error=%e,
            body=%String::from_utf8_lossy(&body),
            "failed to deserialize recording callback"
        ),
    }
    "OK"
}
