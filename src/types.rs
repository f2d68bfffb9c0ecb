use crate::config::FaultPolicy;
use crate::consts::APOLOGY;
use crate::error::AppError;
use crate::responder::Responder;
use crate::store::ConversationStore;
use crate::twilio_types::{Response, ResponseAction, SayAction, Twiml};

use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::error;

pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub responder: Arc<dyn Responder>,
    pub fault_policy: FaultPolicy,
    /// Source of "now" for turn timestamps and the calendar-day key
    pub clock: fn() -> OffsetDateTime,
}

impl AppState {
    pub fn new(store: Arc<dyn ConversationStore>, responder: Arc<dyn Responder>) -> Self {
        Self {
            store,
            responder,
            fault_policy: FaultPolicy::default(),
            clock: OffsetDateTime::now_utc,
        }
    }

    pub fn with_fault_policy(mut self, fault_policy: FaultPolicy) -> Self {
        self.fault_policy = fault_policy;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> OffsetDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> OffsetDateTime {
        (self.clock)()
    }

    /// Turn a handler outcome into what Twilio receives. A fault is logged and then either
    /// spoken as an apology or surfaced as a 500, depending on the fault policy.
    pub fn respond(&self, webhook: &str, outcome: Result<Twiml, AppError>) -> axum::response::Response {
        match outcome {
            Ok(twiml) => twiml.into_response(),
            Err(e) => {
                error!(error=%e, webhook=%webhook, "webhook handler fault");
                match self.fault_policy {
                    FaultPolicy::Apologize => apology().into_response(),
                    FaultPolicy::Surface => {
                        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
                    }
                }
            }
        }
    }
}

/// Markup that ends the call politely: an apology and no further gather.
pub fn apology() -> Twiml {
    Twiml::from(Response {
        actions: vec![ResponseAction::Say(SayAction {
            text: APOLOGY.to_string(),
            ..Default::default()
        })],
    })
}
