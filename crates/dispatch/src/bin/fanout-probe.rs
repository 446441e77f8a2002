//! Fan-out probe entry point
//!
//! Probes every endpoint given on the command line concurrently with a TCP
//! connect and prints one line per endpoint once all have reported.
//!
//! Usage: `fanout-probe [name=]host:port...`
//! Set `FANOUT_CONFIG` to a JSON config file to override the defaults.

use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dispatch::{DispatchRuntime, Endpoint, FanoutConfig, TcpProbeTransport};

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanout_probe=info,dispatch=info,fanout_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "Probe failed");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every endpoint answered
fn run() -> fanout_core::Result<bool> {
    let config = match std::env::var("FANOUT_CONFIG") {
        Ok(path) => {
            tracing::info!(%path, "Loading configuration");
            FanoutConfig::from_file(path)?
        }
        Err(_) => FanoutConfig::default(),
    };

    let endpoints = std::env::args()
        .skip(1)
        .map(|arg| arg.parse::<Endpoint>())
        .collect::<fanout_core::Result<Vec<_>>>()?;

    if endpoints.is_empty() {
        return Err(fanout_core::Error::InvalidConfig {
            message: "usage: fanout-probe [name=]host:port...".to_string(),
        });
    }

    let wait_timeout = config.wait.default_timeout;
    let runtime = DispatchRuntime::new(config)?;
    let dispatcher = runtime.dispatcher(TcpProbeTransport::new());

    let fanout = dispatcher.dispatch(endpoints, ())?;
    if !fanout.wait_timeout(wait_timeout) {
        tracing::warn!(
            operation_id = %fanout.id(),
            timeout_ms = wait_timeout.as_millis() as u64,
            "Probe did not complete in time"
        );
        dispatcher.cancel_all();
        fanout.wait();
    }

    let mut all_ok = true;
    for response in fanout.results().unwrap_or_default() {
        match &response.outcome {
            Ok(probe) => println!(
                "{:<24} ok    {:>8.2}ms  {}",
                response.endpoint.name,
                probe.connect_time.as_secs_f64() * 1000.0,
                probe.peer
            ),
            Err(e) => {
                all_ok = false;
                println!("{:<24} FAIL  {}", response.endpoint.name, e);
            }
        }
    }

    if let Ok(status) = serde_json::to_string(&fanout.status()) {
        tracing::debug!(%status, "Probe finished");
    }

    Ok(all_ok)
}
