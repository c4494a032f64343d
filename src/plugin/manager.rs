//! Plugin manager: lifecycle, hook pipeline, and command registry.
//!
//! The manager owns every loaded instance and is the sole entry point the
//! host uses. It is single-threaded by design: host and guest execution
//! happen on the calling thread, no guest callback runs concurrently, and
//! teardown on unload is synchronous so an immediate reload never races a
//! lingering predecessor.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::{Function, Lua, LuaOptions, StdLib, Value, Variadic};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::buffer::expand_buffer_tokens;
use crate::host::HostEnv;

use super::api;
use super::convert::display_value;
use super::error::PluginError;
use super::instance::{Descriptor, LoadAbort, PluginInstance, PluginState};

/// Registry state shared between the manager and the Host API closures:
/// loaded plugin names (for duplicate rejection), the qualified command
/// table, and the mute set consulted by `plugin.print`.
#[derive(Default)]
pub(crate) struct SharedRegistry {
    pub plugin_names: HashSet<String>,
    /// Qualified command name -> owning plugin name.
    pub commands: HashMap<String, String>,
    pub muted: HashSet<String>,
}

pub struct Manager {
    env: HostEnv,
    plugins: HashMap<String, PluginInstance>,
    registry: Rc<RefCell<SharedRegistry>>,
}

impl Manager {
    pub fn new(env: HostEnv) -> Self {
        Self {
            env,
            plugins: HashMap::new(),
            registry: Rc::new(RefCell::new(SharedRegistry::default())),
        }
    }

    /// Load every `*.lua` file in `dir` (non-recursive). A failing script is
    /// logged and skipped, never aborting the batch. A missing directory is
    /// not an error. Returns the number of plugins loaded.
    pub fn load_all(&mut self, dir: &Path) -> Result<usize, PluginError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                return Err(PluginError::ReadScript {
                    path: dir.to_path_buf(),
                    source: err,
                });
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().is_some_and(|ext| ext == "lua")
            })
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match self.load(&path) {
                Ok(descriptor) => {
                    debug!(plugin = %descriptor.name, path = %path.display(), "plugin loaded");
                    loaded += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "plugin load failed");
                }
            }
        }
        Ok(loaded)
    }

    /// Load one plugin: fresh interpreter, Host API bound to a newly minted
    /// handle, execute the script, then call `init(handle)` if present.
    ///
    /// Fails with nothing registered if the script errors, `init` raises, or
    /// no descriptor was registered by completion.
    pub fn load(&mut self, path: &Path) -> Result<Descriptor, PluginError> {
        let source = fs::read_to_string(path).map_err(|err| PluginError::ReadScript {
            path: path.to_path_buf(),
            source: err,
        })?;

        // No io/os/package for guests; string/table/math stay available.
        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH,
            LuaOptions::default(),
        )?;
        let state = Rc::new(RefCell::new(PluginState::new(
            Uuid::new_v4().to_string(),
        )));
        api::install(&lua, &state, &self.registry, &self.env)?;

        let executed = (|| -> mlua::Result<()> {
            lua.load(&source)
                .set_name(path.display().to_string())
                .exec()?;
            if let Value::Function(init) = lua.globals().get::<Value>("init")? {
                let handle = state.borrow().handle.clone();
                init.call::<()>(handle)?;
            }
            Ok(())
        })();
        if let Err(err) = executed {
            return Err(load_failure(err));
        }

        let descriptor = state
            .borrow()
            .descriptor
            .clone()
            .ok_or(PluginError::MissingDescriptor)?;
        let shutdown = match lua.globals().get::<Value>("shutdown")? {
            Value::Function(f) => Some(f),
            _ => None,
        };
        state.borrow_mut().sealed = true;

        // Commit: only now do the plugin's registrations become visible.
        let name = descriptor.name.clone();
        let mut qualified: Vec<String> = state
            .borrow()
            .commands
            .keys()
            .map(|local| format!("{name}.{local}"))
            .collect();
        qualified.sort();
        {
            let mut registry = self.registry.borrow_mut();
            registry.plugin_names.insert(name.clone());
            for command in &qualified {
                registry.commands.insert(command.clone(), name.clone());
            }
        }
        for command in &qualified {
            self.env.observer.command_added(command);
        }
        self.plugins.insert(
            name,
            PluginInstance {
                lua,
                state,
                path: path.to_path_buf(),
                shutdown,
            },
        );
        Ok(descriptor)
    }

    /// Unload a plugin: run `shutdown(handle)` if present (its errors are
    /// swallowed), detach its commands, and drop the interpreter.
    pub fn unload(&mut self, name: &str) -> Result<(), PluginError> {
        let instance = self
            .plugins
            .remove(name)
            .ok_or_else(|| PluginError::NotLoaded(name.to_string()))?;

        if let Some(shutdown) = &instance.shutdown {
            let handle = instance.state.borrow().handle.clone();
            if let Err(err) = shutdown.call::<()>(handle) {
                debug!(plugin = name, error = %err, "shutdown callback failed");
            }
        }

        let removed: Vec<String> = {
            let mut registry = self.registry.borrow_mut();
            registry.plugin_names.remove(name);
            let mut removed: Vec<String> = registry
                .commands
                .iter()
                .filter(|(_, owner)| owner.as_str() == name)
                .map(|(command, _)| command.clone())
                .collect();
            removed.sort();
            for command in &removed {
                registry.commands.remove(command);
            }
            removed
        };
        for command in &removed {
            self.env.observer.command_removed(command);
        }
        Ok(())
    }

    /// Unload then load the same path again. If the second load fails the
    /// plugin stays unloaded; it is never restored to its previous state.
    pub fn reload(&mut self, name: &str) -> Result<Descriptor, PluginError> {
        let path = self
            .plugins
            .get(name)
            .map(|instance| instance.path.clone())
            .ok_or_else(|| PluginError::NotLoaded(name.to_string()))?;
        self.unload(name)?;
        self.load(&path)
    }

    /// Snapshot of loaded descriptors, sorted by name.
    pub fn list(&self) -> Vec<Descriptor> {
        let mut descriptors: Vec<Descriptor> = self
            .plugins
            .values()
            .filter_map(|instance| instance.state.borrow().descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Flip print suppression for a plugin and return the new state. Muting
    /// survives reloads; it keys on the plugin name, not the instance.
    pub fn toggle_mute(&mut self, name: &str) -> bool {
        let mut registry = self.registry.borrow_mut();
        if registry.muted.remove(name) {
            false
        } else {
            registry.muted.insert(name.to_string());
            true
        }
    }

    pub fn muted(&self, name: &str) -> bool {
        self.registry.borrow().muted.contains(name)
    }

    /// True if any loaded instance has at least one callback for `hook`,
    /// letting the host skip optimizations that would race hook side
    /// effects.
    pub fn has_hook(&self, hook: &str) -> bool {
        self.plugins.values().any(|instance| {
            instance
                .state
                .borrow()
                .hooks
                .get(hook)
                .is_some_and(|callbacks| !callbacks.is_empty())
        })
    }

    /// Sorted hook names one plugin has registered.
    pub fn hook_names(&self, name: &str) -> Result<Vec<String>, PluginError> {
        let instance = self
            .plugins
            .get(name)
            .ok_or_else(|| PluginError::NotLoaded(name.to_string()))?;
        let mut names: Vec<String> = instance.state.borrow().hooks.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Fold `value` through every callback registered under `hook`.
    ///
    /// Within one instance callbacks fire in registration order; across
    /// instances the order is unspecified and must not be relied on. A
    /// failing callback leaves the value unchanged for that step and never
    /// aborts the chain.
    pub fn run_hook(&self, hook: &str, buffer: &str, value: &str) -> String {
        let mut value = value.to_string();
        for instance in self.plugins.values() {
            let callbacks: Vec<Function> = match instance.state.borrow().hooks.get(hook) {
                Some(callbacks) => callbacks.clone(),
                None => continue,
            };
            for callback in callbacks {
                match callback.call::<Value>((buffer, value.as_str())) {
                    Ok(result) => value = display_value(&result),
                    Err(err) => debug!(hook, error = %err, "hook callback failed"),
                }
            }
        }
        value
    }

    pub fn is_command(&self, name: &str) -> bool {
        self.registry.borrow().commands.contains_key(name)
    }

    /// Sorted qualified command names, for completers and help output.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.borrow().commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch a qualified command. `%token` references in string arguments
    /// are expanded against the buffer store before the guest sees them.
    pub fn run_command(&self, name: &str, args: &[String]) -> Result<(), PluginError> {
        let owner = self
            .registry
            .borrow()
            .commands
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::UnknownCommand(name.to_string()))?;
        let instance = self
            .plugins
            .get(&owner)
            .ok_or_else(|| PluginError::UnknownCommand(name.to_string()))?;
        let local = name
            .strip_prefix(&format!("{owner}."))
            .unwrap_or(name)
            .to_string();
        let (handle, callback) = {
            let state = instance.state.borrow();
            let callback = state.commands.get(&local).cloned().ok_or_else(|| {
                PluginError::UnboundCommand {
                    plugin: owner.clone(),
                    command: local.clone(),
                }
            })?;
            (state.handle.clone(), callback)
        };
        let expanded: Vec<String> = args
            .iter()
            .map(|arg| expand_buffer_tokens(arg, self.env.buffers.as_ref()))
            .collect();
        callback
            .call::<()>((handle, Variadic::from_iter(expanded)))
            .map_err(|err| PluginError::CommandFailed {
                command: name.to_string(),
                source: err,
            })
    }

    /// Unload every plugin, running shutdown callbacks.
    pub fn shutdown_all(&mut self) {
        let names: Vec<String> = self.plugins.keys().cloned().collect();
        for name in names {
            if let Err(err) = self.unload(&name) {
                debug!(plugin = %name, error = %err, "unload during shutdown failed");
            }
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

/// Map a guest failure during load onto the error taxonomy, preferring a
/// specific abort reason still carried in the error chain over a generic
/// script error. An abort the guest swallowed with `pcall` never reaches
/// here and is not misattributed.
fn load_failure(err: mlua::Error) -> PluginError {
    match err.downcast_ref::<LoadAbort>() {
        Some(LoadAbort::ConsentDenied { plugin, subject }) => PluginError::ConsentDenied {
            plugin: plugin.clone(),
            subject: subject.clone(),
        },
        Some(LoadAbort::DuplicateName(name)) => PluginError::DuplicateName(name.clone()),
        None => PluginError::Script(err),
    }
}
