use lmcli::configuration::{Configuration, ConfigurationError};
use lmcli::error::ErrorKind;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::{execute_command, CliError};

#[derive(Error, Debug)]
enum LmcliError {
    #[error(transparent)]
    ConfigurationError(#[from] ConfigurationError),
}

fn exit_code_for(error: &CliError) -> i32 {
    match error {
        CliError::ApiError(api_error) => match api_error.kind() {
            ErrorKind::Auth => exitcode::NOPERM,
            ErrorKind::Network | ErrorKind::ServerFault | ErrorKind::RateLimit => {
                exitcode::TEMPFAIL
            }
            _ => exitcode::DATAERR,
        },
        CliError::CredentialError(_) => exitcode::NOPERM,
        _ => exitcode::DATAERR,
    }
}

/// Main entry point for the program
#[tokio::main]
async fn main() -> Result<(), LmcliError> {
    // Initialize the logging subsystem
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Get the configuration
    let configuration = Configuration::load_or_create_default()?;

    // Parse and execute the CLI command
    match execute_command(configuration).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ::std::process::exit(exit_code_for(&e));
        }
    }
}
