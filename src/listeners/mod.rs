//! Shared live-query listeners.
//!
//! The pool keeps at most one underlying live query per channel key and
//! counts the callers using it. Callers hold a [`ListenerHandle`]; the
//! query is detached when the last handle is released.

mod handle;
mod pool;
mod types;

pub use handle::ListenerHandle;
pub use pool::ListenerPool;
pub use types::{ListenerState, ListenerStatus};
