//! Concrete role handlers wired into the running system. The spec excludes
//! the language-model reasoning inside an agent (Non-goals), so these are
//! deliberately thin: each does exactly the bookkeeping the control plane
//! depends on and nothing that models actual task competence.

pub mod climate;
pub mod stub;
pub mod supervisor;

pub use climate::ClimateAgent;
pub use stub::StubAgent;
pub use supervisor::SupervisorAgent;
