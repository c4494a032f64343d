//! Collaborator seams between the plugin host and the surrounding REPL.
//!
//! The plugin subsystem never talks to the terminal, the network (apart from
//! `plugin.http`), the model backend, or external processes directly. Each of
//! those concerns is a small trait the hosting layer implements; the manager
//! receives them bundled in a [`HostEnv`]. Tests inject deterministic fakes
//! through the same seams.

mod console;
mod pipes;

use std::rc::Rc;

use anyhow::{bail, Result};

pub use console::{ConsoleOutput, LinePrompter, PromptConsent, TrustAll};
pub use pipes::{ShellPipes, PIPE_OUTPUT_BUFFER};

use crate::buffer::BufferStore;

/// Interactive line prompt shown to the operator.
pub trait Prompter {
    fn prompt(&self, message: &str) -> Result<String>;
}

/// Yes/no confirmation for capability and hook requests.
///
/// Grants are trust-on-first-use: nothing persists, every load asks again.
pub trait Consent {
    fn confirm(&self, plugin: &str, subject: &str) -> bool;
}

/// Destination for `plugin.print` output.
pub trait PluginOutput {
    fn print(&self, plugin: &str, message: &str);
}

/// Language-model generation backend used by `plugin.gen`.
pub trait Generator {
    fn generate(&self, buffer: &str, prompt: &str) -> Result<String>;
}

/// Streams a buffer's bytes through an external process.
pub trait ProcessPipes {
    fn socat(&self, buffer: &str, args: &[String]) -> Result<String>;
    fn pipe(&self, buffer: &str, command: &str, args: &[String]) -> Result<String>;
}

/// Notified when plugin commands appear or disappear, so the REPL can keep
/// its completer in sync.
pub trait CommandObserver {
    fn command_added(&self, name: &str);
    fn command_removed(&self, name: &str);
}

/// Everything the plugin manager needs from its hosting layer.
#[derive(Clone)]
pub struct HostEnv {
    pub buffers: Rc<dyn BufferStore>,
    pub prompter: Rc<dyn Prompter>,
    pub consent: Rc<dyn Consent>,
    pub output: Rc<dyn PluginOutput>,
    pub generator: Rc<dyn Generator>,
    pub pipes: Rc<dyn ProcessPipes>,
    pub observer: Rc<dyn CommandObserver>,
}

/// Placeholder generator for hosts without a model backend wired up.
pub struct NullGenerator;

impl Generator for NullGenerator {
    fn generate(&self, _buffer: &str, _prompt: &str) -> Result<String> {
        bail!("no generation backend configured")
    }
}

/// Command-registry observer that only logs.
pub struct LogObserver;

impl CommandObserver for LogObserver {
    fn command_added(&self, name: &str) {
        tracing::debug!(command = name, "plugin command added");
    }

    fn command_removed(&self, name: &str) {
        tracing::debug!(command = name, "plugin command removed");
    }
}
