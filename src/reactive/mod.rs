//! Reactive primitives (§4.5): `Signal`, `Edge` (observable ordered
//! collection), `derive`/`from`, and scoped subscriptions.
//!
//! No direct teacher equivalent — the teacher holds per-session state behind
//! a plain `RwLock<SessionState>` (`debug/state.rs`) and polls it. This crate
//! needs synchronous, ordered notification instead (§4.5's invariant:
//! "subscribers are never notified of a no-op change... delivered
//! synchronously... in registration order"), so it uses `parking_lot::Mutex`
//! the way the `oddjobs` pack entries hold cross-task state next to their
//! `tokio` async code, rather than `tokio::sync::RwLock`.

mod edge;
mod derived;
mod scope;
mod signal;

pub use derived::{derive, from};
pub use edge::{Edge, Keyed};
pub use scope::{current_scope, Scope, ScopeGuard};
pub use signal::Signal;
