use crate::config::{required, DEFAULT_TWILIO_API_BASE};
use crate::consts::{RECORDING_PATH, STATUS_PATH, VOICE_PATH};
use crate::error::{ConfigError, PlaceCallError};
use crate::twilio_types::{CreatedCall, TwilioRestError};

use tracing::{debug, error, info};

const STATUS_CALLBACK_EVENTS: &[&str] = &["initiated", "ringing", "answered", "completed"];
const RECORDING_STATUS_CALLBACK_EVENTS: &[&str] = &["completed"];

/// A validated outbound call: who to ring, which number to ring from, and where our
/// webhooks live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCall {
    pub to: String,
    pub from: String,
    pub base_url: String,
}

impl OutboundCall {
    pub fn new(
        to: Option<String>,
        from: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let to = required("TO_NUMBER", to)?;
        let from = required("TWILIO_PHONE_NUMBER", from)?;
        let base_url = required("PUBLIC_BASE_URL", base_url)?;
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                name: "PUBLIC_BASE_URL",
                value: base_url,
                reason: "must start with http:// or https://".to_string(),
            });
        }
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { to, from, base_url })
    }

    pub fn voice_url(&self) -> String {
        format!("{}{VOICE_PATH}", self.base_url)
    }

    pub fn status_callback_url(&self) -> String {
        format!("{}{STATUS_PATH}", self.base_url)
    }

    pub fn recording_callback_url(&self) -> String {
        format!("{}{RECORDING_PATH}", self.base_url)
    }

    /// Form fields for the Calls resource. Event lists repeat their key once per event.
    pub fn form_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("To", self.to.clone()),
            ("From", self.from.clone()),
            ("Url", self.voice_url()),
            ("Method", "POST".to_string()),
            ("StatusCallback", self.status_callback_url()),
            ("StatusCallbackMethod", "POST".to_string()),
            ("MachineDetection", "Enable".to_string()),
            ("Record", "true".to_string()),
            ("RecordingStatusCallback", self.recording_callback_url()),
            ("RecordingStatusCallbackMethod", "POST".to_string()),
        ];
        params.extend(
            STATUS_CALLBACK_EVENTS
                .iter()
                .map(|event| ("StatusCallbackEvent", event.to_string())),
        );
        params.extend(
            RECORDING_STATUS_CALLBACK_EVENTS
                .iter()
                .map(|event| ("RecordingStatusCallbackEvent", event.to_string())),
        );
        params
    }
}

pub struct TwilioClient {
    http_client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    api_base: String,
}

impl TwilioClient {
    pub fn new(
        http_client: reqwest::Client,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            api_base: DEFAULT_TWILIO_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Submit the call. One request, no retry.
    pub async fn place_call(&self, call: &OutboundCall) -> Result<String, PlaceCallError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.api_base, self.account_sid
        );
        debug!(url=%url, voice_url=%call.voice_url(), "creating call");
        let resp = self
            .http_client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&call.form_params())
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;

        if status.is_success() {
            let created = serde_json::from_str::<CreatedCall>(&body).map_err(|e| {
                error!(error=%e, "failed to deserialize created call");
                PlaceCallError::UnexpectedResponse {
                    status: status.as_u16(),
                    body: body.clone(),
                }
            })?;
            debug!(sid=%created.sid, status=?created.status, "call created");
            return Ok(created.sid);
        }

        match serde_json::from_str::<TwilioRestError>(&body) {
            Ok(rejection) => Err(PlaceCallError::Rejected {
                status: rejection.status.unwrap_or(status.as_u16()),
                code: rejection.code,
                message: rejection.message,
                more_info: rejection.more_info,
            }),
            Err(_) => Err(PlaceCallError::UnexpectedResponse {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

/// Place the call and report the outcome. Failures are logged by kind and turned into `None`.
pub async fn originate(client: &TwilioClient, call: &OutboundCall) -> Option<String> {
    info!(to=%call.to, from=%call.from, base_url=%call.base_url, "placing call");
    match client.place_call(call).await {
        Ok(sid) => {
            info!(call_sid=%sid, "call initiated");
            Some(sid)
        }
        Err(PlaceCallError::Rejected {
            status,
            code,
            message,
            more_info,
        }) => {
            error!(
                status,
                code=?code,
                more_info=?more_info,
                message=%message,
                "twilio rejected the call"
            );
            None
        }
        Err(e) => {
            error!(error=%e, "failed to place call");
            None
        }
    }
}
