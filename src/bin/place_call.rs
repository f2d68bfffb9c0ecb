use twilio_call_agent::config::{required, DEFAULT_TWILIO_API_BASE};
use twilio_call_agent::error::ConfigError;
use twilio_call_agent::init_tracing;
use twilio_call_agent::originator::{originate, OutboundCall, TwilioClient};

use clap::Parser;
use std::process::ExitCode;
use tracing::error;

/// Ring a number and hand the call to the webhook server at PUBLIC_BASE_URL.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number to call, with country code
    #[arg(long, env = "TO_NUMBER")]
    to: Option<String>,
    /// Twilio number to call from
    #[arg(long, env = "TWILIO_PHONE_NUMBER")]
    from: Option<String>,
    /// Public URL of the webhook server (e.g. an ngrok tunnel)
    #[arg(long, env = "PUBLIC_BASE_URL")]
    base_url: Option<String>,
    #[arg(long, env = "TWILIO_ACCOUNT_SID", hide_env_values = true)]
    account_sid: Option<String>,
    #[arg(long, env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,
    #[arg(long, env = "TWILIO_API_BASE", default_value = DEFAULT_TWILIO_API_BASE)]
    api_base: String,
}

/// `lookup` supplies `NGROK_URL`, accepted in place of `PUBLIC_BASE_URL`.
fn prepare(
    args: Args,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(TwilioClient, OutboundCall), ConfigError> {
    let account_sid = required("TWILIO_ACCOUNT_SID", args.account_sid)?;
    let auth_token = required("TWILIO_AUTH_TOKEN", args.auth_token)?;
    let base_url = args.base_url.or_else(|| lookup("NGROK_URL"));
    let call = OutboundCall::new(args.to, args.from, base_url)?;
    let client = TwilioClient::new(reqwest::Client::new(), account_sid, auth_token)
        .with_api_base(args.api_base);
    Ok((client, call))
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env has to be loaded before clap reads env fallbacks
    dotenvy::dotenv().ok();
    init_tracing();

    let (client, call) = match prepare(Args::parse(), |name| std::env::var(name).ok()) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!(error=%e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    println!("Making call from {} to {}", call.from, call.to);
    println!("Using voice URL: {}", call.voice_url());
    match originate(&client, &call).await {
        Some(sid) => {
            println!("Call initiated! Call SID: {sid}");
            ExitCode::SUCCESS
        }
        None => {
            println!("Failed to initiate call.");
            ExitCode::FAILURE
        }
    }
}
