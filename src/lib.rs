pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliArgs;

pub use adapters::{NatpmpcMapper, OpnsenseFirewall, TokioSleeper, TransmissionRemote};
pub use config::RelayConfig;
pub use crate::core::{CycleOutcome, PortRelay, RelaySettings, RelayState, Termination};
pub use utils::error::{RelayError, Result};
