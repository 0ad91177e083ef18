// Adapters layer: concrete implementations of the domain ports for external systems.

pub mod clock;
pub mod command;
pub mod natpmpc;
pub mod opnsense;
pub mod transmission;

pub use clock::TokioSleeper;
pub use natpmpc::NatpmpcMapper;
pub use opnsense::OpnsenseFirewall;
pub use transmission::TransmissionRemote;
