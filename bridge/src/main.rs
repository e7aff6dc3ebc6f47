//! Keychain Bridge host
//!
//! Speaks a line-delimited JSON protocol on stdin/stdout so a runtime that
//! cannot link the library directly can still reach the keychain:
//!
//! ```text
//! -> {"id":1,"method":"setUsername","args":["alice"]}
//! <- {"id":1,"resolved":true,"args":[true]}
//! ```
//!
//! Calls are handled one at a time, in arrival order. Logs go to stderr (or
//! journald when running under systemd).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use keychain_bridge::bridge::Call;
use keychain_bridge::{AuthenticationListener, BridgeConfig, CredentialBridge, Dispatcher};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Initialize structured logging with tracing
fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    #[cfg(target_os = "linux")]
    {
        // Prefer the journal when systemd started us
        if systemd_journal_logger::connected_to_journal()
            && let Ok(journal) = systemd_journal_logger::JournalLog::new()
            && journal.install().is_ok()
        {
            log::set_max_level(log::LevelFilter::Info);
            return;
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// `--config <path>` is the only flag.
fn config_path() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => Ok(None),
        Some("--config") => {
            let path = args.next().context("--config needs a path")?;
            Ok(Some(PathBuf::from(path)))
        }
        Some(other) => {
            anyhow::bail!("unexpected argument '{other}', usage: keychain-bridge [--config <path>]")
        }
    }
}

fn load_config() -> Result<BridgeConfig> {
    let base = match config_path()? {
        Some(path) => BridgeConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    Ok(base.with_overrides(|name| std::env::var(name).ok())?)
}

async fn serve<S>(dispatcher: Dispatcher<S>) -> Result<()>
where
    S: keychain_bridge::SecretStore,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Call>(&line) {
            Ok(call) => {
                tracing::debug!(id = call.id, method = %call.method, "call received");
                dispatcher.handle(call).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed call line");
                continue;
            }
        };

        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    tracing::info!("stdin closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = load_config()?;
    let store = config.open_store().await?;
    tracing::info!(service = %config.service, backend = ?config.backend, "Keychain Bridge starting");

    let listener = AuthenticationListener::new();
    let bridge = CredentialBridge::new(store, config.service.clone()).with_listener(listener);
    let dispatcher = Dispatcher::new(Arc::new(bridge));

    tokio::select! {
        result = serve(dispatcher) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            tracing::info!("Received Ctrl+C, shutting down...");
        }
    }

    tracing::info!("Keychain Bridge stopped");
    Ok(())
}
