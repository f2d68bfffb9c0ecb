pub fn wrap_twiml(twiml: String) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{twiml}")
}

mod twiml {
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use xmlserde::xml_serde_enum;
    use xmlserde_derives::XmlSerialize;

    #[derive(PartialEq, Eq, XmlSerialize)]
    #[xmlserde(root = b"Response")]
    pub struct Response {
        #[xmlserde(ty = "untag")]
        pub actions: Vec<ResponseAction>,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum ResponseAction {
        #[xmlserde(name = b"Say")]
        Say(SayAction),
        #[xmlserde(name = b"Gather")]
        Gather(GatherAction),
        #[xmlserde(name = b"Redirect")]
        Redirect(RedirectAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct SayAction {
        #[xmlserde(ty = "text")]
        pub text: String,
        #[xmlserde(name = b"voice", ty = "attr")]
        pub voice: Option<String>,
        #[xmlserde(name = b"language", ty = "attr")]
        pub language: Option<String>,
    }

    /// Collect caller input and POST it to `action`. Twilio moves on to the next verb when
    /// nothing was collected.
    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct GatherAction {
        #[xmlserde(name = b"input", ty = "attr")]
        pub input: Option<GatherInput>,
        #[xmlserde(name = b"action", ty = "attr")]
        pub action: Option<String>,
        #[xmlserde(name = b"method", ty = "attr")]
        pub method: Option<HttpMethod>,
        #[xmlserde(name = b"speechTimeout", ty = "attr")]
        pub speech_timeout: Option<String>,
        #[xmlserde(name = b"speechModel", ty = "attr")]
        pub speech_model: Option<String>,
        #[xmlserde(name = b"language", ty = "attr")]
        pub language: Option<String>,
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct RedirectAction {
        #[xmlserde(ty = "text")]
        pub url: String,
        #[xmlserde(name = b"method", ty = "attr")]
        pub method: Option<HttpMethod>,
    }

    xml_serde_enum! {
        #[derive(PartialEq, Eq, Debug)]
        GatherInput {
            Speech => "speech",
        }
    }

    xml_serde_enum! {
        #[derive(PartialEq, Eq, Debug)]
        HttpMethod {
            Post => "POST",
        }
    }

    /// A rendered TwiML document, served as `application/xml`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Twiml(pub String);

    impl From<Response> for Twiml {
        fn from(response: Response) -> Self {
            Twiml(super::wrap_twiml(xmlserde::xml_serialize(response)))
        }
    }

    impl Twiml {
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl IntoResponse for Twiml {
        fn into_response(self) -> axum::response::Response {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/xml"),
            );
            (StatusCode::OK, headers, self.0).into_response()
        }
    }
}
pub use twiml::*;

/// Form bodies Twilio POSTs to the webhooks. Every field is optional so that a sparse or
/// unusual payload still parses.
mod callbacks {
    use serde::{Deserialize, Deserializer};
    use std::str::FromStr;

    /// Numeric fields are informational only; a blank or garbled value reads as absent.
    fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(|value| value.trim().parse().ok()))
    }

    #[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
    #[serde(rename_all = "kebab-case")]
    pub enum CallStatus {
        Queued,
        Initiated,
        Ringing,
        Answered,
        InProgress,
        Completed,
        Busy,
        Failed,
        NoAnswer,
        Canceled,
    }

    #[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
    #[serde(rename_all = "kebab-case")]
    pub enum RecordingStatus {
        InProgress,
        Completed,
        Absent,
        Failed,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "PascalCase")]
    pub struct VoicePayload {
        pub call_sid: Option<String>,
        pub from: Option<String>,
        pub to: Option<String>,
        pub answered_by: Option<String>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "PascalCase")]
    pub struct GatherPayload {
        pub call_sid: Option<String>,
        pub from: Option<String>,
        pub speech_result: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        pub confidence: Option<f32>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "PascalCase")]
    pub struct StatusCallbackPayload {
        pub call_sid: Option<String>,
        pub call_status: Option<CallStatus>,
        pub from: Option<String>,
        pub to: Option<String>,
        #[serde(default, deserialize_with = "lenient")]
        pub call_duration: Option<u32>,
        pub answered_by: Option<String>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "PascalCase")]
    pub struct RecordingCallbackPayload {
        pub call_sid: Option<String>,
        pub recording_sid: Option<String>,
        pub recording_url: Option<String>,
        pub recording_status: Option<RecordingStatus>,
        #[serde(default, deserialize_with = "lenient")]
        pub recording_duration: Option<u32>,
    }
}
pub use callbacks::*;

/// Bodies returned by the Calls REST resource.
mod rest {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    pub struct CreatedCall {
        pub sid: String,
        #[serde(default)]
        pub status: Option<String>,
    }

    #[derive(Deserialize, Debug)]
    pub struct TwilioRestError {
        pub code: Option<i64>,
        pub message: String,
        #[serde(default)]
        pub more_info: Option<String>,
        #[serde(default)]
        pub status: Option<u16>,
    }
}
pub use rest::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_say_gather_redirect_in_order() {
        let response = Response {
            actions: vec![
                ResponseAction::Say(SayAction {
                    text: "Hi there".to_string(),
                    voice: Some("Polly.Amy".to_string()),
                    language: Some("en-GB".to_string()),
                    ..Default::default()
                }),
                ResponseAction::Gather(GatherAction {
                    input: Some(GatherInput::Speech),
                    action: Some("/twiml/process".to_string()),
                    method: Some(HttpMethod::Post),
                    speech_timeout: Some("auto".to_string()),
                    ..Default::default()
                }),
                ResponseAction::Redirect(RedirectAction {
                    url: "/twiml/voice".to_string(),
                    ..Default::default()
                }),
            ],
        };
        let twiml = Twiml::from(response);
        let xml = twiml.as_str();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>"));
        assert!(xml.ends_with("</Response>"));
        assert!(xml.contains("voice=\"Polly.Amy\""));
        assert!(xml.contains("input=\"speech\""));
        assert!(xml.contains("method=\"POST\""));
        assert!(xml.contains("speechTimeout=\"auto\""));
        assert!(!xml.contains("speechModel"));
        let say = xml.find("<Say").unwrap();
        let gather = xml.find("<Gather").unwrap();
        let redirect = xml.find("<Redirect").unwrap();
        assert!(say < gather && gather < redirect);
        assert!(xml.contains(">/twiml/voice</Redirect>"));
    }

    #[test]
    fn callback_payloads_tolerate_missing_fields() {
        let payload: VoicePayload = serde_urlencoded::from_str("").unwrap();
        assert!(payload.from.is_none());

        let payload: GatherPayload =
            serde_urlencoded::from_str("SpeechResult=hello+there&Confidence=0.91&From=%2B15551234567")
                .unwrap();
        assert_eq!(payload.speech_result.as_deref(), Some("hello there"));
        assert_eq!(payload.from.as_deref(), Some("+15551234567"));
    }

    #[test]
    fn unreadable_numbers_read_as_absent() {
        let payload: GatherPayload =
            serde_urlencoded::from_str("SpeechResult=hi&Confidence=").unwrap();
        assert_eq!(payload.speech_result.as_deref(), Some("hi"));
        assert_eq!(payload.confidence, None);

        let payload: GatherPayload =
            serde_urlencoded::from_str("SpeechResult=hi&Confidence=very").unwrap();
        assert_eq!(payload.confidence, None);

        let payload: GatherPayload = serde_urlencoded::from_str("Confidence=0.5").unwrap();
        assert_eq!(payload.confidence, Some(0.5));

        let payload: RecordingCallbackPayload =
            serde_urlencoded::from_str("RecordingDuration=forever&RecordingSid=RE1").unwrap();
        assert_eq!(payload.recording_duration, None);
        assert_eq!(payload.recording_sid.as_deref(), Some("RE1"));
    }

    #[test]
    fn status_callback_parses_kebab_case_status() {
        let payload: StatusCallbackPayload =
            serde_urlencoded::from_str("CallSid=CA123&CallStatus=no-answer&Unrelated=1").unwrap();
        assert_eq!(payload.call_sid.as_deref(), Some("CA123"));
        assert_eq!(payload.call_status, Some(CallStatus::NoAnswer));
    }
}
