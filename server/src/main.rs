use std::process::ExitCode;

use textmate_server::config::AppConfig;
use textmate_server::{run, StartupError};

#[actix_web::main]
async fn main() -> ExitCode {
    // Load .env file if it exists (for development)
    // Try loading from current directory first, then from server/ directory
    if dotenvy::dotenv().is_err() {
        dotenvy::from_filename("server/.env").ok();
    }

    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    log::info!("Starting textmate server...");

    let result = match AppConfig::load() {
        Ok(config) => {
            log::info!(
                "Loaded configuration: port {}, {} allowed origins",
                config.port,
                config.allowed_origins.len()
            );
            run(config).await
        }
        Err(err) => Err(StartupError::from(err)),
    };

    match result {
        Ok(()) => {
            log::info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("Server failed to start: {}", err);
            ExitCode::FAILURE
        }
    }
}
