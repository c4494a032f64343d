//! muxbuf - scriptable terminal buffer host
//!
//! muxbuf glues terminal-multiplexer panes, shell commands, and a hosted
//! language-model API together behind named text buffers. This crate
//! implements its plugin host: Lua scripts loaded into isolated
//! interpreters, each with an opaque identity handle, a capability-gated
//! Host API, hook points where multiple plugins transform host data, and
//! namespaced plugin commands.
//!
//! The surrounding REPL (line editing, pane capture, the model client,
//! encrypted sessions) talks to this crate through the collaborator traits
//! in [`host`] and the [`buffer::BufferStore`] seam.

pub mod buffer;
pub mod commands;
pub mod config;
pub mod host;
pub mod plugin;
