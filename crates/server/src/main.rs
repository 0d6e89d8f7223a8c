use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use toolhost_core::config::DEFAULT_CONFIG_FILE;
use toolhost_core::ToolhostError;

mod api;
mod commands;
mod context;

const EXIT_INVALID_ARGS: u8 = 1;
const EXIT_SETUP_FAILED: u8 = 2;
const EXIT_RUNTIME_FAILED: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "toolhost")]
#[command(version, about = "Serve resources and tools over MCP, with HTTP health checks", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Arguments for the default `serve` command
    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server (default)
    Serve(ServeArgs),

    /// Probe a running server's /health and /ready endpoints
    Status {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8000)]
        port: u16,
    },

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Path to configuration file (JSON, or TOML by extension)
    #[arg(short, long, env = "TOOLHOST_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory the plugin persists its data to
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Serve HTTP only, without the protocol on stdin/stdout
    #[arg(long)]
    no_stdio: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default configuration
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show {
        #[arg(short, long, env = "TOOLHOST_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_INVALID_ARGS)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let result = match cli.command.unwrap_or(Command::Serve(cli.serve)) {
        Command::Serve(args) => commands::serve(args, cli.log_json).await,
        Command::Status { host, port } => commands::status(&host, port).await,
        Command::Config(ConfigCommand::Init { path, force }) => commands::config_init(&path, force),
        Command::Config(ConfigCommand::Show { config }) => commands::config_show(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Configuration problems (including plugin setup) exit with 2, anything else with 3
fn exit_code(err: &anyhow::Error) -> u8 {
    let is_setup = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ToolhostError>(),
            Some(ToolhostError::Configuration(_))
        )
    });
    if is_setup {
        EXIT_SETUP_FAILED
    } else {
        EXIT_RUNTIME_FAILED
    }
}

/// Log to stderr; stdout carries the protocol stream. `RUST_LOG` wins over
/// the configured level.
fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| "info".into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["toolhost", "--port", "9100"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.serve.port, Some(9100));
        assert_eq!(cli.serve.config, PathBuf::from(DEFAULT_CONFIG_FILE));

        let cli = Cli::try_parse_from(["toolhost", "serve", "--port", "9000", "--no-stdio"]).unwrap();
        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(9000));
                assert!(args.no_stdio);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_invalid_arguments_are_rejected() {
        let err = Cli::try_parse_from(["toolhost", "serve", "--port", "not-a-port"]).unwrap_err();
        assert!(err.use_stderr());

        let err = Cli::try_parse_from(["toolhost", "bogus"]).unwrap_err();
        assert!(err.use_stderr());
    }

    #[test]
    fn test_exit_codes() {
        let setup: anyhow::Error = Err::<(), _>(ToolhostError::Configuration("bad".into()))
            .context("failed to start plugin")
            .unwrap_err();
        assert_eq!(exit_code(&setup), EXIT_SETUP_FAILED);

        let runtime = anyhow::anyhow!("address in use");
        assert_eq!(exit_code(&runtime), EXIT_RUNTIME_FAILED);
    }
}
