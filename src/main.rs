use twilio_call_agent::config::ServerConfig;
use twilio_call_agent::responder::OpenAIResponder;
use twilio_call_agent::store::JsonFileStore;
use twilio_call_agent::types::AppState;
use twilio_call_agent::{app, init_tracing};

use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error=%e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let store = match JsonFileStore::open(&config.conversations_dir).await {
        Ok(store) => store,
        Err(e) => {
            error!(error=%e, "failed to open conversation store");
            return ExitCode::FAILURE;
        }
    };
    let http_client = reqwest::Client::new();
    let responder = OpenAIResponder::new(http_client, config.openai_api_key.clone())
        .with_api_base(config.openai_api_base.clone())
        .with_model(config.openai_model.clone())
        .with_timeout(config.generation_timeout);

    let app_state = Arc::new(
        AppState::new(Arc::new(store), Arc::new(responder))
            .with_fault_policy(config.fault_policy),
    );

    info!(
        addr=%config.bind_addr,
        conversations=%config.conversations_dir.display(),
        fault_policy=?config.fault_policy,
        "starting AI call agent"
    );
    if let Err(e) = axum::Server::bind(&config.bind_addr)
        .serve(app(app_state).into_make_service())
        .await
    {
        error!(error=%e, "server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
