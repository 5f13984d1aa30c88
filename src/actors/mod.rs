//! Actor-based scheduling
//!
//! The periodic health cycle runs inside an actor: an independent tokio task
//! owning its timer and receiving commands through an mpsc channel. Callers
//! hold a cloneable handle.
//!
//! ```text
//! Timer tick ──┐
//!              ├──> PulseService::run_cycle ──> overview broadcast ──> [SSE streams]
//! RunNow ──────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: mpsc command channel for control messages
//! 2. **Events**: overviews and alert transitions go out on broadcast channels
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod pulse;

pub use messages::PulseCommand;
pub use pulse::{PulseActor, PulseHandle};
