//! Lua plugin host for muxbuf.
//!
//! Third-party scripts extend the REPL through a curated, capability-gated
//! API. Each script runs in its own interpreter with an opaque identity
//! handle; the [`Manager`] owns the collection of instances and is the single
//! entry point the host uses:
//!
//! - lifecycle: [`Manager::load_all`], [`Manager::load`], [`Manager::unload`],
//!   [`Manager::reload`]
//! - extension points: [`Manager::run_hook`] folds a value through every
//!   registered callback at a named hook
//! - commands: plugin functions dispatched by their `<plugin>.<name>`
//!   qualified names
//!
//! A script's contract: define `init(handle)`, call `plugin.register(handle,
//! descriptor_json [, capabilities])` inside it, optionally register hooks and
//! commands there too, and optionally define `shutdown(handle)`.

mod api;
mod convert;
mod error;
mod instance;
mod manager;

pub mod hooks;

pub use error::PluginError;
pub use instance::Descriptor;
pub use manager::Manager;
