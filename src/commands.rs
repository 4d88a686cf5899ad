use clap::{Arg, ArgAction, ArgMatches, Command};
use url::Url;

pub const COMMAND_LOGIN: &str = "login";
pub const COMMAND_LOGOUT: &str = "logout";
pub const COMMAND_CONFIG: &str = "config";
pub const COMMAND_SHOW: &str = "show";
pub const COMMAND_PATH: &str = "path";
pub const COMMAND_SET: &str = "set";
pub const COMMAND_DELETE: &str = "delete";
pub const COMMAND_INSTANCE: &str = "instance";
pub const COMMAND_ACTIVE: &str = "active";
pub const COMMAND_COURSE: &str = "course";
pub const COMMAND_USER: &str = "user";
pub const COMMAND_ENROLLMENT: &str = "enrollment";
pub const COMMAND_LIST: &str = "list";
pub const COMMAND_GET: &str = "get";
pub const COMMAND_ME: &str = "me";
pub const COMMAND_FIND: &str = "find";

pub const PARAMETER_INSTANCE: &str = "instance";
pub const PARAMETER_TOKEN: &str = "token";
pub const PARAMETER_NAME: &str = "name";
pub const PARAMETER_BASE_URL: &str = "base-url";
pub const PARAMETER_ID: &str = "id";
pub const PARAMETER_COURSE: &str = "course";
pub const PARAMETER_USER: &str = "user";
pub const PARAMETER_AS_USER: &str = "as-user";
pub const PARAMETER_YES: &str = "yes";

pub fn create_cli_commands() -> ArgMatches {
    let instance_parameter = Arg::new(PARAMETER_INSTANCE)
        .short('i')
        .long(PARAMETER_INSTANCE)
        .num_args(1)
        .required(false)
        .global(true)
        .help("Name of the configured instance (defaults to the active one)");

    let as_user_parameter = Arg::new(PARAMETER_AS_USER)
        .long(PARAMETER_AS_USER)
        .num_args(1)
        .required(false)
        .global(true)
        .value_parser(clap::value_parser!(u64))
        .help("Masquerade as this user ID on every request (privileged)");

    let yes_parameter = Arg::new(PARAMETER_YES)
        .short('y')
        .long(PARAMETER_YES)
        .required(false)
        .global(true)
        .action(ArgAction::SetTrue)
        .help("Do not ask for confirmation on destructive operations");

    let course_id_parameter = Arg::new(PARAMETER_ID)
        .long(PARAMETER_ID)
        .num_args(1)
        .required(true)
        .value_parser(clap::value_parser!(u64))
        .help("Course ID");

    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .propagate_version(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(instance_parameter)
        .arg(as_user_parameter)
        .arg(yes_parameter)
        .subcommand(
            Command::new(COMMAND_LOGIN)
                .about("Store an access token for an instance")
                .arg(
                    Arg::new(PARAMETER_TOKEN)
                        .short('t')
                        .long(PARAMETER_TOKEN)
                        .num_args(1)
                        .required(false)
                        .help("Access token (prompted for when omitted)"),
                ),
        )
        .subcommand(
            Command::new(COMMAND_LOGOUT).about("Delete the stored access token for an instance"),
        )
        .subcommand(
            Command::new(COMMAND_CONFIG)
                .about("Working with configuration")
                .subcommand_required(true)
                .subcommand(Command::new(COMMAND_SHOW).about("Display the configuration"))
                .subcommand(Command::new(COMMAND_PATH).about("Show the configuration file path"))
                .subcommand(
                    Command::new(COMMAND_SET)
                        .about("Set a configuration property")
                        .subcommand_required(true)
                        .subcommand(
                            Command::new(COMMAND_INSTANCE)
                                .about("Add or update an instance")
                                .arg(
                                    Arg::new(PARAMETER_NAME)
                                        .long(PARAMETER_NAME)
                                        .num_args(1)
                                        .required(true)
                                        .help("Instance name"),
                                )
                                .arg(
                                    Arg::new(PARAMETER_BASE_URL)
                                        .long(PARAMETER_BASE_URL)
                                        .num_args(1)
                                        .required(true)
                                        .value_parser(clap::value_parser!(Url))
                                        .help("API base URL, e.g. https://lms.example.edu/api/v1/"),
                                ),
                        )
                        .subcommand(
                            Command::new(COMMAND_ACTIVE)
                                .about("Switch the active instance")
                                .arg(
                                    Arg::new(PARAMETER_NAME)
                                        .long(PARAMETER_NAME)
                                        .num_args(1)
                                        .required(true)
                                        .help("Name of an already-configured instance"),
                                ),
                        ),
                )
                .subcommand(
                    Command::new(COMMAND_DELETE)
                        .about("Delete a configuration property")
                        .subcommand_required(true)
                        .subcommand(
                            Command::new(COMMAND_INSTANCE).about("Remove an instance").arg(
                                Arg::new(PARAMETER_NAME)
                                    .long(PARAMETER_NAME)
                                    .num_args(1)
                                    .required(true)
                                    .help("Instance name"),
                            ),
                        ),
                ),
        )
        .subcommand(
            Command::new(COMMAND_COURSE)
                .about("Working with courses")
                .subcommand_required(true)
                .subcommand(Command::new(COMMAND_LIST).about("List all visible courses"))
                .subcommand(
                    Command::new(COMMAND_GET)
                        .about("Get course details")
                        .arg(course_id_parameter.clone()),
                )
                .subcommand(
                    Command::new(COMMAND_DELETE)
                        .about("Delete a course")
                        .arg(course_id_parameter),
                ),
        )
        .subcommand(
            Command::new(COMMAND_USER)
                .about("Working with users")
                .subcommand_required(true)
                .subcommand(Command::new(COMMAND_ME).about("Show the calling user's profile"))
                .subcommand(
                    Command::new(COMMAND_GET).about("Get user details").arg(
                        Arg::new(PARAMETER_ID)
                            .long(PARAMETER_ID)
                            .num_args(1)
                            .required(true)
                            .value_parser(clap::value_parser!(u64))
                            .help("User ID"),
                    ),
                ),
        )
        .subcommand(
            Command::new(COMMAND_ENROLLMENT)
                .about("Working with enrollments")
                .subcommand_required(true)
                .subcommand(
                    Command::new(COMMAND_LIST)
                        .about("List the enrollments of a course")
                        .arg(
                            Arg::new(PARAMETER_COURSE)
                                .long(PARAMETER_COURSE)
                                .num_args(1)
                                .required(true)
                                .value_parser(clap::value_parser!(u64))
                                .help("Course ID"),
                        ),
                )
                .subcommand(
                    Command::new(COMMAND_FIND)
                        .about("Find a user's enrollment in a course")
                        .arg(
                            Arg::new(PARAMETER_COURSE)
                                .long(PARAMETER_COURSE)
                                .num_args(1)
                                .required(true)
                                .value_parser(clap::value_parser!(u64))
                                .help("Course ID"),
                        )
                        .arg(
                            Arg::new(PARAMETER_USER)
                                .long(PARAMETER_USER)
                                .num_args(1)
                                .required(true)
                                .value_parser(clap::value_parser!(u64))
                                .help("User ID"),
                        ),
                ),
        )
        .get_matches()
}
