//! Error taxonomy for the plugin subsystem.
//!
//! Faults raised *inside* a guest call (identity mismatch, capability denial,
//! duplicate registration) surface as `mlua` errors confined to that call;
//! this enum covers the host-facing side. A plugin fault must
//! never crash the host: `load_all` logs and skips, hook callback errors are
//! swallowed by the pipeline, and command failures come back as values.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    /// The script file could not be read.
    #[error("failed to read plugin script {path}: {source}")]
    ReadScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The script failed to execute or its `init` raised.
    #[error("plugin script failed: {0}")]
    Script(#[from] mlua::Error),

    /// The script completed without calling `plugin.register`.
    #[error("plugin never registered a descriptor")]
    MissingDescriptor,

    /// A descriptor name collided with an already loaded instance.
    #[error("plugin {0:?} is already loaded")]
    DuplicateName(String),

    /// The user declined a capability or hook request during load.
    #[error("plugin {plugin}: {subject} denied by user")]
    ConsentDenied { plugin: String, subject: String },

    /// Unload/reload/introspection against a name that is not loaded.
    #[error("no plugin named {0:?} is loaded")]
    NotLoaded(String),

    /// `run_command` against a qualified name nobody registered.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// A registered command whose bound guest function is gone.
    #[error("plugin {plugin} has no function bound for {command:?}")]
    UnboundCommand { plugin: String, command: String },

    /// The guest raised while running a command.
    #[error("command {command} failed: {source}")]
    CommandFailed {
        command: String,
        #[source]
        source: mlua::Error,
    },
}
