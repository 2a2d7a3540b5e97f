//! Risk Gate: threshold, exposure, trap-cooldown and session checks, then
//! position sizing and mode gating.

pub mod gate;
pub mod session;

pub use gate::{loss_at_stop, RiskGate, RiskInput, RiskParams};
pub use session::{SessionCheck, SessionRules};
