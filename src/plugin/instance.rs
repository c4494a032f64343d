//! Per-instance runtime state: descriptor, identity handle, registrations.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;

use mlua::{Function, Lua};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Plugin metadata, parsed from the JSON a script passes to
/// `plugin.register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    /// Unique plugin name; also the command and buffer namespace prefix.
    pub name: String,
    /// Host compatibility marker. Carried but not validated here.
    #[serde(default)]
    pub muxbuf: String,
    #[serde(default)]
    pub version: String,
}

/// Why a load was aborted from inside a guest call, so the manager can
/// report something more specific than "script failed".
///
/// Raised as an external `mlua` error, it travels inside the error chain; a
/// guest `pcall` that swallows the error discards the reason with it.
#[derive(Debug, Clone, Error)]
pub(crate) enum LoadAbort {
    #[error("{subject} denied")]
    ConsentDenied { plugin: String, subject: String },
    #[error("plugin {0:?} is already loaded")]
    DuplicateName(String),
}

/// Mutable state shared between the manager and the Host API closures
/// installed in the instance's interpreter.
pub(crate) struct PluginState {
    /// Opaque identity token, minted per load, never exposed across
    /// instances.
    pub handle: String,
    pub descriptor: Option<Descriptor>,
    /// `None` means legacy unrestricted access; otherwise an allow-list of
    /// Host API function names.
    pub allowed: Option<HashSet<String>>,
    /// Hook name -> callbacks in registration order, deduplicated by
    /// function identity.
    pub hooks: HashMap<String, Vec<Function>>,
    /// Local command name -> guest function bound at registration time.
    pub commands: HashMap<String, Function>,
    /// Set once load completes; registration calls are rejected afterwards.
    pub sealed: bool,
}

impl PluginState {
    pub fn new(handle: String) -> Self {
        Self {
            handle,
            descriptor: None,
            allowed: None,
            hooks: HashMap::new(),
            commands: HashMap::new(),
            sealed: false,
        }
    }

    /// Every Host API call starts here: a forged or stale handle is a fatal,
    /// guest-visible error for that call.
    pub fn check_handle(&self, handle: &str) -> mlua::Result<()> {
        if handle != self.handle {
            return Err(mlua::Error::RuntimeError("invalid handle".into()));
        }
        Ok(())
    }

    pub fn check_allowed(&self, func: &str) -> mlua::Result<()> {
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(func) {
                return Err(mlua::Error::RuntimeError(format!("{func} not allowed")));
            }
        }
        Ok(())
    }

    /// Registration calls are only valid while the instance's `init` runs.
    pub fn check_open(&self, func: &str) -> mlua::Result<()> {
        if self.sealed {
            return Err(mlua::Error::RuntimeError(format!(
                "{func} is only available during init"
            )));
        }
        Ok(())
    }

    pub fn plugin_name(&self) -> String {
        self.descriptor
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_default()
    }

    pub fn require_registered(&self, func: &str) -> mlua::Result<String> {
        self.descriptor
            .as_ref()
            .map(|d| d.name.clone())
            .ok_or_else(|| {
                mlua::Error::RuntimeError(format!("{func}: plugin is not registered yet"))
            })
    }
}

/// One loaded plugin: its interpreter, shared state, and reload path.
///
/// Dropping the instance tears the interpreter down immediately; there is no
/// deferred cleanup, so a reload never races a lingering predecessor.
pub(crate) struct PluginInstance {
    /// Owns the interpreter; the guest functions held in `state` are only
    /// valid while it lives.
    #[allow(dead_code)]
    pub lua: Lua,
    pub state: Rc<RefCell<PluginState>>,
    pub path: PathBuf,
    pub shutdown: Option<Function>,
}
