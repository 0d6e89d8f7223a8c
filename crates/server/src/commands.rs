// Subcommand implementations

use crate::context::ServerContext;
use crate::ServeArgs;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::signal;
use toolhost_core::{ConfigFormat, ServerConfig, ToolhostError};

pub async fn serve(args: ServeArgs, log_json: bool) -> Result<()> {
    let config = apply_args(load_config(&args.config), &args);
    crate::init_tracing(&config.log_level, log_json);

    tracing::info!("Starting {} {}", config.name, config.version);
    tracing::info!(
        addr = %config.bind_addr(),
        stdio = config.stdio,
        update_interval = config.plugin.update_interval,
        "Effective configuration"
    );

    let context = ServerContext::new(config)?;
    let shutdown = context.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    context.run().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

pub async fn status(host: &str, port: u16) -> Result<()> {
    let base = format!("http://{}:{}", host, port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    let health: serde_json::Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .with_context(|| format!("No server reachable at {}", base))?
        .error_for_status()
        .context("Health check failed")?
        .json()
        .await
        .context("Invalid /health response")?;

    let ready = client
        .get(format!("{}/ready", base))
        .send()
        .await
        .with_context(|| format!("No server reachable at {}", base))?;
    let is_ready = ready.status().is_success();

    println!(
        "{} {} at {}",
        health["service"].as_str().unwrap_or("unknown"),
        health["version"].as_str().unwrap_or("?"),
        base
    );
    println!("  health: {}", health["status"].as_str().unwrap_or("unknown"));
    println!("  ready:  {}", if is_ready { "ready" } else { "not ready" });

    Ok(())
}

pub fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(ToolhostError::Configuration(format!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        ))
        .into());
    }

    ServerConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

pub fn config_show(path: &Path) -> Result<()> {
    let config = load_config(path);
    println!("{}", config.to_string_pretty(ConfigFormat::Json)?);
    Ok(())
}

/// Lenient load (file, then environment). Runs before the real subscriber
/// exists, so warnings go through a temporary stderr one.
fn load_config(path: &Path) -> ServerConfig {
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .finish();

    tracing::subscriber::with_default(bootstrap, || ServerConfig::load(path))
}

/// Command-line flags beat file and environment
fn apply_args(mut config: ServerConfig, args: &ServeArgs) -> ServerConfig {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(data_dir) = &args.data_dir {
        config.plugin.data_dir = Some(data_dir.clone());
    }
    if args.no_stdio {
        config.stdio = false;
    }
    config
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn args() -> ServeArgs {
        ServeArgs {
            config: PathBuf::from("unused.json"),
            host: None,
            port: None,
            data_dir: None,
            no_stdio: false,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let config = ServerConfig::default();

        let unchanged = apply_args(config.clone(), &args());
        assert_eq!(unchanged, config);

        let overridden = apply_args(
            config,
            &ServeArgs {
                host: Some("0.0.0.0".to_string()),
                port: Some(9000),
                data_dir: Some(PathBuf::from("/var/lib/toolhost")),
                no_stdio: true,
                ..args()
            },
        );
        assert_eq!(overridden.bind_addr(), "0.0.0.0:9000");
        assert_eq!(overridden.plugin.data_dir, Some(PathBuf::from("/var/lib/toolhost")));
        assert!(!overridden.stdio);
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("toolhost.json");

        config_init(&path, false).unwrap();
        let written = ServerConfig::from_file(&path).unwrap();
        assert_eq!(written, ServerConfig::default());

        let err = config_init(&path, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ToolhostError>(),
            Some(ToolhostError::Configuration(_))
        ));

        config_init(&path, true).unwrap();
    }

    #[test]
    fn test_load_config_falls_back_on_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("toolhost.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = load_config(&path);
        assert_eq!(config.name, "toolhost");
    }
}
