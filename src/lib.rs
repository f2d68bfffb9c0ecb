pub mod config;
pub mod error;
pub mod handlers;
pub mod openai_types;
pub mod originator;
pub mod responder;
pub mod store;
pub mod twilio_types;
pub mod types;

use crate::consts::{PROCESS_PATH, RECORDING_PATH, STATUS_PATH, VOICE_PATH};
use crate::types::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing_subscriber::prelude::*;

pub mod consts {
    pub const VOICE_PATH: &str = "/twiml/voice";
    pub const PROCESS_PATH: &str = "/twiml/process";
    pub const STATUS_PATH: &str = "/twiml/status";
    pub const RECORDING_PATH: &str = "/twiml/recording";

    pub const APP_GREETING: &str = "Hello! This is your AI Assistant. I'm here to help you \
        with any questions or tasks you have. How can I assist you today?";
    pub const GREETING_VOICE: &str = "Polly.Amy";
    pub const GREETING_LANGUAGE: &str = "en-GB";
    pub const GATHER_LANGUAGE: &str = "en-US";
    pub const SPEECH_MODEL: &str = "phone_call";
    pub const REPROMPT: &str = "I didn't catch that. Could you please repeat?";
    pub const APOLOGY: &str =
        "I'm sorry, but I'm having technical difficulties. Please try again later.";
    pub const UNKNOWN_CALLER: &str = "unknown";

    pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Keep responses concise \
        and natural for phone conversations.";
    pub const FALLBACK_REPLY: &str =
        "I apologize, but I'm having trouble processing that right now.";
    pub const HISTORY_TURNS: usize = 5;
    pub const MAX_REPLY_TOKENS: u32 = 150;
    pub const REPLY_TEMPERATURE: f32 = 0.7;
}

/// The webhook surface Twilio talks to.
pub fn app(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route(VOICE_PATH, post(handlers::twiml_voice))
        .route(PROCESS_PATH, post(handlers::twiml_process))
        .route(STATUS_PATH, post(handlers::twiml_status))
        .route(RECORDING_PATH, post(handlers::twiml_recording))
        .with_state(app_state)
}

/// Compact console logging for both binaries; this crate at DEBUG, hyper silenced.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("twilio_call_agent", tracing_subscriber::filter::LevelFilter::DEBUG),
            ("place_call", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
