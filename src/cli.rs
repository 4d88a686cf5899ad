use clap::ArgMatches;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lmcli::client::ApiClient;
use lmcli::commands::{
    create_cli_commands, COMMAND_ACTIVE, COMMAND_CONFIG, COMMAND_COURSE, COMMAND_DELETE,
    COMMAND_ENROLLMENT, COMMAND_FIND, COMMAND_GET, COMMAND_INSTANCE, COMMAND_LIST, COMMAND_LOGIN,
    COMMAND_LOGOUT,
    COMMAND_ME, COMMAND_PATH, COMMAND_SET, COMMAND_SHOW, COMMAND_USER, PARAMETER_AS_USER,
    PARAMETER_BASE_URL, PARAMETER_COURSE, PARAMETER_ID, PARAMETER_INSTANCE, PARAMETER_NAME,
    PARAMETER_TOKEN, PARAMETER_USER, PARAMETER_YES,
};
use lmcli::configuration::{Configuration, ConfigurationError, Instance};
use lmcli::confirm::Confirmation;
use lmcli::context::{build_client, CommandOptions, ContextError};
use lmcli::credentials::{Credential, CredentialError, CredentialStore};
use lmcli::error::ApiError;
use lmcli::services::{courses, enrollments, users};
use url::Url;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Undefined or unsupported subcommand: {0}")]
    UnsupportedSubcommand(String),
    #[error(transparent)]
    ConfigurationError(#[from] ConfigurationError),
    #[error(transparent)]
    CredentialError(#[from] CredentialError),
    #[error(transparent)]
    ContextError(#[from] ContextError),
    #[error(transparent)]
    ApiError(#[from] ApiError),
    #[error("failed to format output: {0}")]
    FormattingError(#[from] serde_json::Error),
    #[error("failed to read token: {0}")]
    PromptError(#[from] inquire::InquireError),
}

fn extract_subcommand_name(sub_matches: &ArgMatches) -> String {
    match sub_matches.subcommand() {
        Some((name, _)) => name.to_string(),
        None => "unknown".to_string(),
    }
}

fn options_from(matches: &ArgMatches) -> CommandOptions {
    CommandOptions {
        instance: matches.get_one::<String>(PARAMETER_INSTANCE).cloned(),
        as_user_id: matches.get_one::<u64>(PARAMETER_AS_USER).copied(),
        assume_yes: matches.get_flag(PARAMETER_YES),
    }
}

fn confirmation_for(options: &CommandOptions) -> Confirmation {
    if options.assume_yes {
        Confirmation::always()
    } else {
        Confirmation::interactive()
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn execute_command(mut configuration: Configuration) -> Result<(), CliError> {
    let matches = create_cli_commands();
    let options = options_from(&matches);
    let cancel = CancellationToken::new();

    match matches.subcommand() {
        // Login
        Some((COMMAND_LOGIN, sub_matches)) => {
            let instance = configuration
                .resolve_instance(options.instance.as_deref())?
                .clone();

            let token = match sub_matches.get_one::<String>(PARAMETER_TOKEN) {
                Some(token) => token.clone(),
                None => inquire::Password::new("Access token:")
                    .without_confirmation()
                    .prompt()?,
            };

            // Verify the token before persisting it.
            let client = ApiClient::builder(instance.base_url.clone(), token.clone()).build()?;
            let user = users::me(&client, &cancel).await?;

            let store = CredentialStore::detect()?;
            store.save(&Credential::new(instance.name.clone(), token))?;
            println!("Logged in to {} as {}", instance.name, user.name);
            Ok(())
        }
        // Logout
        Some((COMMAND_LOGOUT, _)) => {
            let instance = configuration
                .resolve_instance(options.instance.as_deref())?
                .clone();
            let store = CredentialStore::detect()?;
            store.delete(&instance.name)?;
            println!("Logged out of {}", instance.name);
            Ok(())
        }
        // Configuration
        Some((COMMAND_CONFIG, sub_matches)) => match sub_matches.subcommand() {
            Some((COMMAND_SHOW, _)) => print_json(&configuration),
            Some((COMMAND_PATH, _)) => {
                let path = Configuration::get_default_configuration_file_path()?;
                println!("{}", path.display());
                Ok(())
            }
            Some((COMMAND_SET, sub_matches)) => match sub_matches.subcommand() {
                Some((COMMAND_INSTANCE, sub_matches)) => {
                    // unwraps are safe: the arguments are mandatory and Clap
                    // rejects the command line before this point
                    let name = sub_matches.get_one::<String>(PARAMETER_NAME).unwrap();
                    let base_url = sub_matches.get_one::<Url>(PARAMETER_BASE_URL).unwrap();

                    configuration.add_instance(Instance {
                        name: name.clone(),
                        base_url: base_url.clone(),
                    });
                    configuration.save_to_default()?;
                    Ok(())
                }
                Some((COMMAND_ACTIVE, sub_matches)) => {
                    let name = sub_matches.get_one::<String>(PARAMETER_NAME).unwrap();
                    configuration.set_active_instance(name)?;
                    configuration.save_to_default()?;
                    println!("Active instance is now {}", name);
                    Ok(())
                }
                _ => Err(CliError::UnsupportedSubcommand(extract_subcommand_name(
                    sub_matches,
                ))),
            },
            Some((COMMAND_DELETE, sub_matches)) => match sub_matches.subcommand() {
                Some((COMMAND_INSTANCE, sub_matches)) => {
                    let name = sub_matches.get_one::<String>(PARAMETER_NAME).unwrap();
                    configuration.delete_instance(name);
                    configuration.save_to_default()?;
                    Ok(())
                }
                _ => Err(CliError::UnsupportedSubcommand(extract_subcommand_name(
                    sub_matches,
                ))),
            },
            _ => Err(CliError::UnsupportedSubcommand(extract_subcommand_name(
                sub_matches,
            ))),
        },
        // Courses
        Some((COMMAND_COURSE, sub_matches)) => {
            let client = build_client(&configuration, &options)?;
            match sub_matches.subcommand() {
                Some((COMMAND_LIST, _)) => {
                    let mut stream = courses::list(&client, cancel.clone());
                    while let Some(course) = stream.next().await {
                        print_json(&course?)?;
                    }
                    Ok(())
                }
                Some((COMMAND_GET, sub_matches)) => {
                    let course_id = sub_matches.get_one::<u64>(PARAMETER_ID).unwrap();
                    let course = courses::get(&client, *course_id, &cancel).await?;
                    print_json(&course)
                }
                Some((COMMAND_DELETE, sub_matches)) => {
                    let course_id = sub_matches.get_one::<u64>(PARAMETER_ID).unwrap();
                    let confirmation = confirmation_for(&options);
                    if courses::delete(&client, *course_id, &confirmation, &cancel).await? {
                        println!("Deleted course {}", course_id);
                    } else {
                        debug!(course_id, "deletion declined");
                    }
                    Ok(())
                }
                _ => Err(CliError::UnsupportedSubcommand(extract_subcommand_name(
                    sub_matches,
                ))),
            }
        }
        // Users
        Some((COMMAND_USER, sub_matches)) => {
            let client = build_client(&configuration, &options)?;
            match sub_matches.subcommand() {
                Some((COMMAND_ME, _)) => {
                    let user = users::me(&client, &cancel).await?;
                    print_json(&user)
                }
                Some((COMMAND_GET, sub_matches)) => {
                    let user_id = sub_matches.get_one::<u64>(PARAMETER_ID).unwrap();
                    let user = users::get(&client, *user_id, &cancel).await?;
                    print_json(&user)
                }
                _ => Err(CliError::UnsupportedSubcommand(extract_subcommand_name(
                    sub_matches,
                ))),
            }
        }
        // Enrollments
        Some((COMMAND_ENROLLMENT, sub_matches)) => {
            let client = build_client(&configuration, &options)?;
            match sub_matches.subcommand() {
                Some((COMMAND_LIST, sub_matches)) => {
                    let course_id = sub_matches.get_one::<u64>(PARAMETER_COURSE).unwrap();
                    let mut stream = enrollments::list(&client, *course_id, cancel.clone());
                    while let Some(enrollment) = stream.next().await {
                        print_json(&enrollment?)?;
                    }
                    Ok(())
                }
                Some((COMMAND_FIND, sub_matches)) => {
                    let course_id = sub_matches.get_one::<u64>(PARAMETER_COURSE).unwrap();
                    let user_id = sub_matches.get_one::<u64>(PARAMETER_USER).unwrap();
                    let enrollment =
                        enrollments::find_for_user(&client, *course_id, *user_id, cancel.clone())
                            .await?;
                    print_json(&enrollment)
                }
                _ => Err(CliError::UnsupportedSubcommand(extract_subcommand_name(
                    sub_matches,
                ))),
            }
        }
        None => Err(CliError::UnsupportedSubcommand(String::from("unknown"))),
        _ => unreachable!(),
    }
}
