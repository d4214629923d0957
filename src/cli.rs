//! This module defines the command-line interface (CLI) structure using clap's builder pattern

use clap::{Arg, ArgAction, Command, crate_name, crate_version, value_parser};
use clap_complete::Shell;
use std::path::PathBuf;

/// Builds the complete CLI command structure.
///
/// Defines all commands, arguments, and help documentation.
pub(crate) fn build_cli() -> Command {
    let cmd = Command::new(crate_name!())
        .version(crate_version!())
        .about("Modterm - Module lifecycle manager for containerized services")
        .subcommand_required(true)
        // --
        // * Main and global options
        .arg(
            Arg::new("config_file")
                .long("config-file")
                .global(true)
                .env("MODTERM_CONFIG_FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("store_path")
                .long("store-path")
                .global(true)
                .env("MODTERM_STORE_PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the module store"),
        )
        .arg(
            Arg::new("runtime_cmd")
                .long("runtime-cmd")
                .global(true)
                .env("MODTERM_RUNTIME_CMD")
                .value_parser(value_parser!(String))
                .help("Container runtime executable [default: docker]"),
        )
        .arg(
            Arg::new("image")
                .long("image")
                .global(true)
                .env("MODTERM_IMAGE")
                .value_parser(value_parser!(String))
                .help("Image every module container runs"),
        )
        .arg(
            Arg::new("network")
                .long("network")
                .global(true)
                .env("MODTERM_NETWORK")
                .value_parser(value_parser!(String))
                .help("Network every module container joins"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .global(true)
                .env("MODTERM_VERBOSE")
                .action(ArgAction::Count)
                .help("Verbosity level (-v = debug, -vv = trace)"),
        )
        .arg(
            Arg::new("logs_dir")
                .long("logs-dir")
                .global(true)
                .env("MODTERM_LOGS_DIR")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("logs_max")
                .long("logs-max")
                .global(true)
                .env("MODTERM_LOGS_MAX")
                .value_parser(value_parser!(usize)),
        );

    // --
    // * Add subcommands

    // --
    // * initialize
    cmd.subcommand(
        Command::new("initialize")
            .about("Register a new module and provision its container")
            .arg(
                Arg::new("github_url")
                    .long("github-url")
                    .required(true)
                    .value_parser(value_parser!(String))
                    .help("Repository the module is built from"),
            )
            .arg(
                Arg::new("name")
                    .long("name")
                    .value_parser(value_parser!(String))
                    .help("Display name, defaults to the repository name"),
            )
            .arg(
                Arg::new("description")
                    .long("description")
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("module_type")
                    .long("module-type")
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("port")
                    .long("port")
                    .required(true)
                    .allow_hyphen_values(true)
                    .value_parser(value_parser!(String))
                    .help("Host port to publish the module on"),
            ),
    )
    // --
    // * reconfigure
    .subcommand(
        Command::new("reconfigure")
            .about("Re-provision a module under a new name and port")
            .arg(
                Arg::new("id")
                    .value_name("ID")
                    .required(true)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("name")
                    .long("name")
                    .required(true)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("port")
                    .long("port")
                    .required(true)
                    .allow_hyphen_values(true)
                    .value_parser(value_parser!(String)),
            ),
    )
    // --
    // * delete
    .subcommand(
        Command::new("delete")
            .about("Tear down a module's container and remove its record")
            .arg(
                Arg::new("id")
                    .value_name("ID")
                    .required(true)
                    .value_parser(value_parser!(String)),
            ),
    )
    // --
    // * list
    .subcommand(Command::new("list").about("List all registered modules"))
    // --
    // * get
    .subcommand(
        Command::new("get").about("Show a single module").arg(
            Arg::new("id")
                .value_name("ID")
                .required(true)
                .value_parser(value_parser!(String)),
        ),
    )
    // --
    // * register
    .subcommand(
        Command::new("register")
            .about("Catalog a module that runs elsewhere, without provisioning it")
            .arg(
                Arg::new("id")
                    .long("id")
                    .required(true)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("name")
                    .long("name")
                    .required(true)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("service_url")
                    .long("service-url")
                    .required(true)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("description")
                    .long("description")
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("github_url")
                    .long("github-url")
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("module_type")
                    .long("module-type")
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("port")
                    .long("port")
                    .allow_hyphen_values(true)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("disabled")
                    .long("disabled")
                    .action(ArgAction::SetTrue)
                    .help("Catalog the module as disabled"),
            ),
    )
    // --
    // * metadata
    .subcommand(
        Command::new("metadata")
            .about("Ask a module to describe itself")
            .arg(
                Arg::new("id")
                    .value_name("ID")
                    .required(true)
                    .value_parser(value_parser!(String)),
            ),
    )
    // --
    // * completions
    .subcommand(
        Command::new("completions")
            .about("Generate shell completions")
            .arg(
                Arg::new("shell")
                    .required(true)
                    .long("shell")
                    .short('s')
                    .value_parser(value_parser!(Shell))
                    .help("Set the shell for generating completions [values: bash, elvish, fish, powerShell, zsh]"),
            )
            .arg(
                Arg::new("out")
                    .long("out")
                    .value_parser(value_parser!(PathBuf))
                    .help("Set the out directory for writing completions file"),
            ),
    )
}

// -------------------------------------------------------------------------------------------------
// CLI Commands
// -------------------------------------------------------------------------------------------------

/// Represents parsed command-line subcommands and their arguments
///
/// Ports are kept as given on the command line and validated by the operation itself.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Commands {
    Initialize {
        github_url: String,
        name: Option<String>,
        description: Option<String>,
        module_type: Option<String>,
        port: String,
    },
    Reconfigure {
        id: String,
        name: String,
        port: String,
    },
    Delete {
        id: String,
    },
    List,
    Get {
        id: String,
    },
    Register {
        id: String,
        name: String,
        service_url: String,
        description: Option<String>,
        github_url: Option<String>,
        module_type: Option<String>,
        port: Option<String>,
        enabled: bool,
    },
    Metadata {
        id: String,
    },
    Completions {
        shell: Shell,
        out: Option<PathBuf>,
    },
}

/// Value of a required string argument. clap rejects the call before this is reached if it is
/// missing.
fn required(matches: &clap::ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

impl Commands {
    /// Converts raw CLI matches into structured Commands enum
    ///
    /// Acts as bridge between clap's ArgMatches structure and application logic.
    pub(crate) fn parse_command(matches: &clap::ArgMatches) -> Option<Self> {
        let command = match matches.subcommand()? {
            ("initialize", m) => Commands::Initialize {
                github_url: required(m, "github_url"),
                name: m.get_one::<String>("name").cloned(),
                description: m.get_one::<String>("description").cloned(),
                module_type: m.get_one::<String>("module_type").cloned(),
                port: required(m, "port"),
            },
            ("reconfigure", m) => Commands::Reconfigure {
                id: required(m, "id"),
                name: required(m, "name"),
                port: required(m, "port"),
            },
            ("delete", m) => Commands::Delete {
                id: required(m, "id"),
            },
            ("list", _) => Commands::List,
            ("get", m) => Commands::Get {
                id: required(m, "id"),
            },
            ("register", m) => Commands::Register {
                id: required(m, "id"),
                name: required(m, "name"),
                service_url: required(m, "service_url"),
                description: m.get_one::<String>("description").cloned(),
                github_url: m.get_one::<String>("github_url").cloned(),
                module_type: m.get_one::<String>("module_type").cloned(),
                port: m.get_one::<String>("port").cloned(),
                enabled: !m.get_flag("disabled"),
            },
            ("metadata", m) => Commands::Metadata {
                id: required(m, "id"),
            },
            ("completions", m) => Commands::Completions {
                shell: *m.get_one::<Shell>("shell")?,
                out: m.get_one::<PathBuf>("out").cloned(),
            },
            _ => return None,
        };
        Some(command)
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
