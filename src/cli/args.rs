//! Command-line argument parsing for the paywatch CLI.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::api::DEFAULT_FAILURE_REASON;

pub const DEFAULT_AMOUNT: i64 = 1000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

pub const USAGE: &str = "\
Usage: paywatch [OPTIONS]

Options:
  --amount N                 Order amount (default: 1000)
  --base-url URL             Payment backend (default: $PAYWATCH_BASE_URL or http://localhost:8080)
  --simulate success|failure Trigger a simulated outcome once the stream is open
  --reason TEXT              Failure reason sent with --simulate failure
  --trace                    Print the received event trace at exit
  --timeout SECS             Give up waiting after SECS seconds (default: 300)
  -V, --version              Print version
  -h, --help                 Print this help";

/// Outcome to request from the backend's simulate endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedOutcome {
    Success,
    Failure,
}

impl FromStr for SimulatedOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "success" => Ok(SimulatedOutcome::Success),
            "failure" | "fail" => Ok(SimulatedOutcome::Failure),
            other => Err(format!(
                "invalid --simulate value '{}' (expected success or failure)",
                other
            )),
        }
    }
}

/// Options for following a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub amount: Decimal,
    /// Overrides the configured base URL
    pub base_url: Option<String>,
    pub simulate: Option<SimulatedOutcome>,
    pub reason: String,
    pub trace: bool,
    pub timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            amount: Decimal::from(DEFAULT_AMOUNT),
            base_url: None,
            simulate: None,
            reason: DEFAULT_FAILURE_REASON.to_string(),
            trace: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Show version information
    Version,
    /// Show usage
    Help,
    /// Follow a payment (default)
    Run(RunOptions),
    /// Arguments could not be parsed
    Invalid(String),
}

/// Parse command-line arguments and return the appropriate command.
///
/// # Examples
///
/// ```
/// use paywatch::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["paywatch".to_string(), "--version".to_string()];
/// assert_eq!(parse_args(args.into_iter()), CliCommand::Version);
/// ```
pub fn parse_args<I>(args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    let mut options = RunOptions::default();
    // Skip the program name
    let mut args = args.skip(1);

    while let Some(arg) = args.next() {
        let result = match arg.as_str() {
            "--version" | "-V" => return CliCommand::Version,
            "--help" | "-h" => return CliCommand::Help,
            "--trace" => {
                options.trace = true;
                Ok(())
            }
            "--amount" => value(&mut args, &arg).and_then(|v| {
                let amount = Decimal::from_str(&v)
                    .map_err(|_| format!("invalid --amount value '{}'", v))?;
                if amount <= Decimal::ZERO {
                    return Err(format!("--amount must be positive, got {}", v));
                }
                options.amount = amount;
                Ok(())
            }),
            "--base-url" => value(&mut args, &arg).map(|v| {
                options.base_url = Some(v);
            }),
            "--simulate" => value(&mut args, &arg).and_then(|v| {
                options.simulate = Some(v.parse::<SimulatedOutcome>()?);
                Ok(())
            }),
            "--reason" => value(&mut args, &arg).map(|v| {
                options.reason = v;
            }),
            "--timeout" => value(&mut args, &arg).and_then(|v| {
                let secs: u64 = v
                    .parse()
                    .map_err(|_| format!("invalid --timeout value '{}'", v))?;
                options.timeout = Duration::from_secs(secs);
                Ok(())
            }),
            other => Err(format!("unknown argument '{}'", other)),
        };

        if let Err(message) = result {
            return CliCommand::Invalid(message);
        }
    }

    CliCommand::Run(options)
}

fn value<I>(args: &mut I, flag: &str) -> Result<String, String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| format!("{} requires a value", flag))
}
