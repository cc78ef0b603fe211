//! CLI module for paywatch.
//!
//! The binary creates one order, follows it over the event stream until it
//! reaches a terminal status, and can trigger a simulated outcome on the
//! backend along the way.
//!
//! ```ignore
//! use paywatch::cli::{parse_args, CliCommand};
//!
//! match parse_args(std::env::args()) {
//!     CliCommand::Version => paywatch::cli::handle_version_command(),
//!     CliCommand::Help => println!("{}", paywatch::cli::USAGE),
//!     CliCommand::Invalid(message) => eprintln!("{}", message),
//!     CliCommand::Run(options) => { /* ... */ }
//! }
//! ```

pub mod args;
pub mod version;

pub use args::{parse_args, CliCommand, RunOptions, SimulatedOutcome, USAGE};
pub use version::{handle_version_command, VERSION};
