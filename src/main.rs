use crate::cli::Commands;
use crate::configuration::{ConfigurationClient, TokioSleeper};
use crate::endpoint::HttpModuleEndpoint;
use crate::lifecycle::Orchestrator;
use crate::registry::{RegisterRequest, Registry};
use crate::runtime::{ContainerDriver, DockerCli};
use crate::utils::ports::TcpPortProbe;
use clap::ArgMatches;
use color_eyre::eyre::{WrapErr, eyre};
use color_eyre::{Result, Section};
use config::ModtermConfigBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

mod cli;
mod cmds;
mod config;
mod configuration;
mod endpoint;
mod errors;
mod lifecycle;
mod locks;
mod logs;
mod oplog;
mod registry;
mod runtime;
mod store;
mod utils;

fn main() {
    // Initialize color_eyre
    color_eyre::install().unwrap_or_else(|e| panic!("Failed to initialize color_eyre: {:?}", e));

    let cli_matches = cli::build_cli().get_matches();

    let modterm_config = match init_config(&cli_matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to initialize config. Exiting");
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let logger = match logs::LoggerBuilder::default()
        .with_verbosity(cli_matches.get_count("verbosity").min(2))
        .with_log_dir(&modterm_config.logs_dir)
        .with_max_logs(modterm_config.logs_max)
        .build()
    {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to setup logging. Exiting");
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    };
    let _log_guard = match logger.start() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging. Exiting");
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    };

    debug!("Config initialized:\n{:#?}", &modterm_config);

    let success = match run(modterm_config, &cli_matches) {
        Ok(success) => success,
        Err(e) => {
            eprintln!("An error occured. Exiting");
            eprintln!("{:?}", e);
            false
        }
    };

    // Flush the log file before exiting
    drop(_log_guard);
    std::process::exit(if success { 0 } else { 1 });
}

/// Initializes the modterm configuration by:
///
/// 1. Loading configuration from file (if present)
/// 2. Merging CLI arguments and environment variables with file configuration
/// 3. Returning the final configuration
///
/// # Errors
///
/// Returns an error if:
/// - Configuration file parsing fails
/// - Required paths or values are missing
fn init_config(cli: &ArgMatches) -> Result<config::ModtermConfig> {
    let modterm_config = ModtermConfigBuilder::default()
        .with_config_file(cli.get_one::<PathBuf>("config_file").cloned())
        .with_store_path(cli.get_one::<PathBuf>("store_path").cloned())
        .with_runtime_cmd(cli.get_one::<String>("runtime_cmd").cloned())
        .with_image(cli.get_one::<String>("image").cloned())
        .with_network(cli.get_one::<String>("network").cloned())
        .with_logs_dir(cli.get_one::<PathBuf>("logs_dir").cloned())
        .with_logs_max(cli.get_one::<usize>("logs_max").copied())
        .build(cli.get_count("verbosity").min(2))?;

    Ok(modterm_config)
}

#[tokio::main]
async fn run(config: config::ModtermConfig, arg_matches: &ArgMatches) -> Result<bool> {
    let command = Commands::parse_command(arg_matches)
        .ok_or_else(|| eyre!("No subcommand given"))
        .suggestion("Run 'modterm --help' to list the available commands")?;

    // Completions need neither store nor runtime
    if let Commands::Completions { shell, out } = command {
        let mut cmd = cli::build_cli();
        let name = cmd.get_name().to_string();
        if let Some(out) = out {
            clap_complete::generate_to(shell, &mut cmd, name, &out).wrap_err_with(|| {
                format!(
                    "Failed to build completions for {} and write them to {}",
                    shell,
                    out.display()
                )
            })?;
        } else {
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
        return Ok(true);
    }

    // --
    // * Setup

    let store = Arc::new(
        store::sqlite::init_sqlite_store(&config)
            .await
            .wrap_err("Failed to initialize module store")?,
    );
    debug!(store = ?store, "Store initialized");

    let endpoint = HttpModuleEndpoint::new(config.handshake_request_timeout())?;
    let registry = Registry::new(Arc::clone(&store));

    // --
    // * Execute

    let cmd_result = match command {
        Commands::List => cmds::list::list(&registry).await,
        Commands::Get { id } => cmds::list::get(&registry, id).await,
        Commands::Register {
            id,
            name,
            service_url,
            description,
            github_url,
            module_type,
            port,
            enabled,
        } => {
            let request = RegisterRequest {
                id,
                name,
                service_url,
                description,
                github_url,
                module_type,
                port: None,
                enabled,
            };
            cmds::register::register(&registry, request, port).await
        }
        Commands::Metadata { id } => cmds::metadata::metadata(&registry, &endpoint, id).await,
        command => {
            // Lifecycle operations drive the container runtime
            cmds::ensure_runtime(&command, &config.runtime_cmd)?;

            let orchestrator = Orchestrator::new(
                Arc::clone(&store),
                ContainerDriver::new(
                    DockerCli::new(config.runtime_cmd.clone(), config.runtime_timeout()),
                    config.image.clone(),
                    config.network.clone(),
                ),
                ConfigurationClient::new(
                    endpoint,
                    TokioSleeper,
                    config.handshake_attempts,
                    config.handshake_delay(),
                ),
                TcpPortProbe,
            )
            .with_locks(registry.locks());

            match command {
                Commands::Initialize {
                    github_url,
                    name,
                    description,
                    module_type,
                    port,
                } => {
                    cmds::initialize::initialize(
                        &orchestrator,
                        github_url,
                        name,
                        description,
                        module_type,
                        port,
                    )
                    .await
                }
                Commands::Reconfigure { id, name, port } => {
                    cmds::reconfigure::reconfigure(&orchestrator, id, name, port).await
                }
                Commands::Delete { id } => cmds::delete::delete(&orchestrator, id).await,
                _ => Err(eyre!("Unexpected command")),
            }
        }
    };

    // --
    // * Pool shutdown

    store.close().await?;

    cmd_result
}
