//! `dapcore` is the runtime core of a Debug Adapter Protocol client: transport
//! and session machinery, a lazy breakpoint-binding engine, and a reactive
//! entity graph addressed by a small URL query language.
//!
//! This crate has no editor bindings and no CLI of its own — it is linked
//! into a host (an editor plugin, a headless test driver) the way `tokio` or
//! `tracing` are. Host integration (buffers, signs, pickers, `launch.json`
//! parsing) lives outside this crate; see `session_runtime::hooks` for the
//! seams a host fills in.

pub mod adapter;
pub mod breakpoints;
pub mod error;
pub mod graph;
pub mod presentation;
pub mod protocol;
pub mod query;
pub mod reactive;
pub mod scheduler;
pub mod session_runtime;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_util;

pub use adapter::AdapterConfig;
pub use breakpoints::BreakpointEngine;
pub use error::{Error, Result};
pub use graph::Debugger;
pub use presentation::Registry as PresentationRegistry;
pub use query::{query, query_all, watch};
pub use session_runtime::{SessionHooks, SessionRuntime};
