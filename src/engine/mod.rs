//! Execution engine.
//!
//! Interprets a [`Task`](crate::task::Task) against a
//! [`Target`](crate::target::Target), one step at a time. References are
//! resolved from the supplied inputs or from the outputs of steps that
//! already completed; there is no reordering, so declaration order must
//! already be a valid dependency order.

pub mod context;
pub mod resolve;
pub mod runner;
pub mod state;
pub mod stream;

pub use context::{StepCommand, StepContext};
pub use resolve::{resolve_args, resolve_ref};
pub use runner::{run_cleanup, run_step, run_task};
pub use state::RunState;
pub use stream::{copy_streams, Captured};
