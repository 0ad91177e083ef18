pub mod relay;

pub use crate::domain::model::{AliasId, PortAssignment, Protocol};
pub use crate::domain::ports::{Firewall, PeerApplication, PortMapper, Sleeper};
pub use crate::utils::error::Result;
pub use relay::{CycleOutcome, PortRelay, RelaySettings, RelayState, Termination};
