//! Terminal-backed collaborator implementations for the standalone CLI.

use std::io::{self, BufRead, Write};
use std::rc::Rc;

use anyhow::{Context, Result};

use super::{Consent, PluginOutput, Prompter};

/// Writes plugin output to stdout, prefixed with the plugin name.
pub struct ConsoleOutput;

impl PluginOutput for ConsoleOutput {
    fn print(&self, plugin: &str, message: &str) {
        println!("[{plugin}] {message}");
    }
}

/// Reads one line from stdin in response to a prompt.
pub struct LinePrompter;

impl Prompter for LinePrompter {
    fn prompt(&self, message: &str) -> Result<String> {
        print!("{message}");
        io::stdout().flush().context("flush prompt")?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read prompt response")?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Asks the operator to confirm a capability or hook request.
///
/// Only a case-insensitive "yes" counts as approval; anything else, including
/// a failed prompt, is a decline.
pub struct PromptConsent {
    prompter: Rc<dyn Prompter>,
}

impl PromptConsent {
    pub fn new(prompter: Rc<dyn Prompter>) -> Self {
        Self { prompter }
    }
}

impl Consent for PromptConsent {
    fn confirm(&self, plugin: &str, subject: &str) -> bool {
        let message = format!("Plugin {plugin} requests {subject}. Allow? [yes/No] ");
        match self.prompter.prompt(&message) {
            Ok(response) => response.trim().eq_ignore_ascii_case("yes"),
            Err(_) => false,
        }
    }
}

/// Approves every request without prompting. Used by `muxbuf --trust`.
pub struct TrustAll;

impl Consent for TrustAll {
    fn confirm(&self, _plugin: &str, _subject: &str) -> bool {
        true
    }
}
