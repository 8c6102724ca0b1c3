#![forbid(unsafe_code)]
//! A dependency injection container driven by types.
//!
//! Providers are plain Rust functions. Their parameter types are what they
//! need, their return types are what they produce. The container keeps a
//! graph of these relations and calls providers in dependency order to build
//! the arguments of whatever function you ask it to run.
//!
//! ```rust
//! use tsunagi::{Container, TypeKey};
//!
//! #[derive(Clone)]
//! struct Settings {
//!     greeting: &'static str,
//! }
//!
//! #[derive(Clone)]
//! struct Greeter {
//!     greeting: &'static str,
//! }
//!
//! tsunagi::injectable!(Settings, Greeter);
//!
//! let mut container = Container::new();
//! container
//!     .provide_value(Settings { greeting: "hello" })
//!     .provide(|settings: Settings| Greeter { greeting: settings.greeting })?;
//!
//! // compiled once, executed per request with the request's own values
//! let plan = container.create_plan(
//!     |greeter: Greeter, name: String| format!("{}, {}", greeter.greeting, name),
//!     &[TypeKey::of::<String>()],
//! )?;
//!
//! let reply = container.run_plan(&plan, String::from("world"))?;
//! assert_eq!(reply, "hello, world");
//! # Ok::<(), tsunagi::Error>(())
//! ```
//!
//! Two ways of executing are offered:
//!
//! * [`Container::run`] and [`Container::create`] resolve arguments lazily by
//!   walking the graph on every call.
//! * [`Container::create_plan`] does the walk once and validates everything
//!   up front. The returned [`Plan`] is then executed with
//!   [`Container::run_plan`], from as many threads as needed.
//!
//! In both cases every provider is invoked at most once per call, and values
//! passed as overrides replace their providers for that call.

mod container;
mod core;
mod engine;
mod error;
mod graph;
mod hooks;
#[cfg(feature = "logging")]
mod utils;

pub use crate::container::Container;
pub use crate::core::{Context, Injectable, TypeKey};
pub use crate::engine::{
    Arguments, Handler, Outcome, Overrides, Plan, ProviderId, ProviderNode, Values,
};
pub use crate::error::{Error, HOOK_CAUSED_FAILURE, HookFailure, RuntimeError};
pub use crate::graph::{Graph, Node, Snapshot, SnapshotNode, VertexKey};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
