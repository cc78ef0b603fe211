use std::time::Duration;

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use paywatch::cli::{
    handle_version_command, parse_args, CliCommand, RunOptions, SimulatedOutcome, USAGE,
};
use paywatch::config::ClientConfig;
use paywatch::connection::ConnectionState;
use paywatch::models::PaymentStatus;
use paywatch::session::{PaymentSession, SessionSnapshot};

/// How long `--simulate` waits for the stream before triggering the outcome.
const SIMULATE_CONNECT_WAIT: Duration = Duration::from_secs(5);

/// Initialize the tracing subscriber with environment-based filtering.
///
/// Logs go to stderr so stdout only carries the payment URL and result.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paywatch=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let options = match parse_args(std::env::args()) {
        CliCommand::Version => handle_version_command(),
        CliCommand::Help => {
            println!("{}", USAGE);
            return Ok(());
        }
        CliCommand::Invalid(message) => {
            eprintln!("Error: {}\n\n{}", message, USAGE);
            std::process::exit(2);
        }
        CliCommand::Run(options) => options,
    };

    init_tracing();

    let mut config = ClientConfig::from_env();
    if options.trace {
        config = config.with_trace_enabled(true);
    }
    if let Some(base_url) = &options.base_url {
        config = config.with_base_url(base_url.clone());
    }
    let base_url = config.base_url.trim_end_matches('/').to_string();

    let session = PaymentSession::from_config(config);
    let payment_url = session
        .initialize(options.amount)
        .await
        .wrap_err("Failed to initialize payment")?;

    if let Some(order_id) = session.order_id() {
        println!("Order:       {}", order_id);
    }
    if payment_url.starts_with('/') {
        println!("Payment URL: {}{}", base_url, payment_url);
    } else {
        println!("Payment URL: {}", payment_url);
    }

    if let Some(outcome) = options.simulate {
        simulate(&session, outcome, &options).await;
    }

    let snapshot = wait_for_outcome(&session, options.timeout).await;

    if session.trace_enabled() {
        print_trace(&session);
    }
    session.reset();

    match snapshot.status {
        Some(PaymentStatus::Success) => {
            println!("Payment succeeded: {}", snapshot.message);
            Ok(())
        }
        Some(PaymentStatus::Failure) => {
            println!("Payment failed: {}", snapshot.message);
            std::process::exit(1);
        }
        _ => {
            match snapshot.last_error {
                Some(err) => println!("Payment still pending ({})", err),
                None => println!("Payment still pending after {:?}", options.timeout),
            }
            std::process::exit(1);
        }
    }
}

async fn simulate(session: &PaymentSession, outcome: SimulatedOutcome, options: &RunOptions) {
    let mut state = session.manager().state_receiver();
    let connected = matches!(
        tokio::time::timeout(
            SIMULATE_CONNECT_WAIT,
            state.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await,
        Ok(Ok(_))
    );
    if !connected {
        warn!("Event stream not connected, simulating anyway");
    }

    let result = match outcome {
        SimulatedOutcome::Success => session.simulate_success().await,
        SimulatedOutcome::Failure => session.simulate_failure(&options.reason).await,
    };
    match result {
        Ok(reply) => info!("Backend: {}", reply),
        Err(err) => warn!("Simulation request failed: {}", err),
    }
}

/// Wait until the order is terminal, the stream is given up, or `timeout`.
///
/// When the stream is lost for good, the status is polled once instead.
async fn wait_for_outcome(session: &PaymentSession, timeout: Duration) -> SessionSnapshot {
    let mut updates = session.status_receiver();
    let _ = tokio::time::timeout(
        timeout,
        updates.wait_for(|s| s.is_terminal() || s.connectivity_lost),
    )
    .await;

    let snapshot = session.snapshot();
    if snapshot.is_terminal() || !snapshot.connectivity_lost {
        return snapshot;
    }

    warn!("Event stream lost, polling order status");
    match session.refresh_status().await {
        Ok(status) => info!("Polled status: {}", status),
        Err(err) => warn!("Status poll failed: {}", err),
    }
    session.snapshot()
}

fn print_trace(session: &PaymentSession) {
    println!("Event trace:");
    for entry in session.trace() {
        println!(
            "  {} {:<16} {}",
            entry.received_at.format("%H:%M:%S%.3f"),
            entry.event_type,
            entry.payload.as_deref().unwrap_or("")
        );
    }
}
