//! sso-sentinel - keeps AWS SSO credentials fresh without a central server.
//!
//! Three entry points share the same on-disk state:
//! - `watch` (default): long-running loop answering signal files and
//!   proactively refreshing the watched profile's token
//! - `check`: one evaluation pass (or a periodic loop) that raises or
//!   clears the login-required signal
//! - `refresh` / `mode`: one-shot operator commands

mod aws;
mod checker;
mod config;
mod error;
mod oidc;
mod refresh;
mod state;
mod token;
mod util;
mod watcher;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use checker::{ExpiryChecker, TokenStatus};
use config::Settings;
use oidc::HttpSsoOidc;
use refresh::TokenRefresher;
use state::{Mode, ModeStore, SignalChannel};
use token::TokenStore;
use watcher::{CliLogin, HeadlessNotify, Watcher};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr (filtered by RUST_LOG, default info) and to a daily
/// rolling file in the state directory so overnight watcher behavior can
/// be reconstructed. The guard must stay alive for the process lifetime.
fn init_tracing(settings: &Settings) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::daily(settings.log_dir(), "sentinel.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(filter)
        .init();
    guard
}

fn build_refresher(settings: &Settings) -> Result<TokenRefresher> {
    Ok(TokenRefresher::new(
        settings.aws_config_file.clone(),
        TokenStore::new(settings.sso_cache_dir.clone()),
        Arc::new(HttpSsoOidc::new(settings.request_timeout)?),
    ))
}

fn build_checker(settings: &Settings) -> Result<ExpiryChecker> {
    Ok(ExpiryChecker::new(
        settings.aws_config_file.clone(),
        build_refresher(settings)?,
        SignalChannel::new(settings.signal_file.clone()),
        chrono::Duration::seconds(settings.renewal_threshold.as_secs() as i64),
    ))
}

fn usage() -> ! {
    eprintln!("usage: sso-sentinel [watch | check [--loop] | refresh | mode [<mode>]]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let settings = Settings::from_env()?;
    let _guard = init_tracing(&settings);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("watch");

    match command {
        "watch" => {
            let watcher = Watcher::new(
                &settings,
                build_refresher(&settings)?,
                Arc::new(HeadlessNotify),
                Arc::new(CliLogin::new(settings.login_timeout)),
            );
            watcher.run().await;
            Ok(())
        }
        "check" => {
            let checker = build_checker(&settings)?;
            if args.iter().any(|a| a == "--loop") {
                info!(interval_secs = settings.check_interval.as_secs(), "checker loop started");
                loop {
                    checker.evaluate(&settings.profile).await;
                    tokio::time::sleep(settings.check_interval).await;
                }
            }
            match checker.evaluate(&settings.profile).await {
                TokenStatus::Healthy => Ok(()),
                _ => std::process::exit(1),
            }
        }
        "refresh" => {
            let refresher = build_refresher(&settings)?;
            match refresher.try_refresh(&settings.profile).await {
                Ok(()) => {
                    println!("token refreshed for profile {}", settings.profile);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("refresh failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        "mode" => {
            let modes = ModeStore::new(settings.mode_file(), settings.mode_env_default.clone());
            match args.get(1) {
                None => {
                    println!("{}", modes.read());
                    Ok(())
                }
                Some(value) => {
                    let mode: Mode = match value.parse() {
                        Ok(mode) => mode,
                        Err(e) => {
                            eprintln!("{}", e);
                            eprintln!(
                                "valid modes: {}",
                                Mode::ALL.map(|m| m.to_string()).join(", ")
                            );
                            std::process::exit(2);
                        }
                    };
                    modes.write(mode)?;
                    println!("mode set to {}", mode);
                    Ok(())
                }
            }
        }
        _ => usage(),
    }
}
