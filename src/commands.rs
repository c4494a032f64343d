//! CLI command definitions for muxbuf.

use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Load the plugin directory and list loaded plugins
    List,

    /// Load a single plugin file and report what it registered
    Check {
        /// Path to the .lua plugin file
        path: PathBuf,
    },

    /// Run a plugin command (qualified as <plugin>.<name>)
    Run {
        /// Qualified command name, e.g. "demo.doit"
        command: String,
        /// Arguments; %buffer references are expanded before dispatch
        args: Vec<String>,
    },

    /// Show the hooks a loaded plugin has registered
    Hooks {
        /// Plugin name
        name: String,
    },
}
