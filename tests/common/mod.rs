//! Shared fakes and fixtures for plugin host integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Result};
use tempfile::TempDir;

use muxbuf::buffer::{BufferStore, MemoryBufferStore};
use muxbuf::host::{
    CommandObserver, Consent, Generator, HostEnv, PluginOutput, ProcessPipes, Prompter,
};
use muxbuf::plugin::Manager;

/// Records plugin print output for assertions.
#[derive(Default)]
pub struct RecordingOutput {
    pub lines: RefCell<Vec<(String, String)>>,
}

impl RecordingOutput {
    pub fn messages_for(&self, plugin: &str) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(name, _)| name == plugin)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl PluginOutput for RecordingOutput {
    fn print(&self, plugin: &str, message: &str) {
        self.lines
            .borrow_mut()
            .push((plugin.to_string(), message.to_string()));
    }
}

/// Returns canned responses in order, recording every prompt shown.
#[derive(Default)]
pub struct ScriptedPrompter {
    pub responses: RefCell<Vec<String>>,
    pub seen: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn with_responses(responses: &[&str]) -> Self {
        Self {
            responses: RefCell::new(responses.iter().map(|r| r.to_string()).collect()),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt(&self, message: &str) -> Result<String> {
        self.seen.borrow_mut().push(message.to_string());
        let mut responses = self.responses.borrow_mut();
        if responses.is_empty() {
            bail!("no scripted response left");
        }
        Ok(responses.remove(0))
    }
}

/// Consent gate with a fixed answer and a record of every request.
pub struct FixedConsent {
    pub answer: bool,
    pub requests: RefCell<Vec<(String, String)>>,
}

impl FixedConsent {
    pub fn allowing() -> Self {
        Self {
            answer: true,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn denying() -> Self {
        Self {
            answer: false,
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl Consent for FixedConsent {
    fn confirm(&self, plugin: &str, subject: &str) -> bool {
        self.requests
            .borrow_mut()
            .push((plugin.to_string(), subject.to_string()));
        self.answer
    }
}

/// Generator that always returns the same reply.
pub struct StaticGenerator {
    pub reply: String,
}

impl Generator for StaticGenerator {
    fn generate(&self, _buffer: &str, _prompt: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}

/// Deterministic stand-in for external processes: `socat` uppercases the
/// buffer contents, `pipe` prefixes them with the command name.
pub struct FakePipes {
    pub buffers: Rc<MemoryBufferStore>,
}

impl ProcessPipes for FakePipes {
    fn socat(&self, buffer: &str, _args: &[String]) -> Result<String> {
        Ok(self.buffers.read(buffer).unwrap_or_default().to_uppercase())
    }

    fn pipe(&self, buffer: &str, command: &str, _args: &[String]) -> Result<String> {
        Ok(format!(
            "{command}:{}",
            self.buffers.read(buffer).unwrap_or_default()
        ))
    }
}

/// Records command-registry notifications.
#[derive(Default)]
pub struct RecordingObserver {
    pub added: RefCell<Vec<String>>,
    pub removed: RefCell<Vec<String>>,
}

impl CommandObserver for RecordingObserver {
    fn command_added(&self, name: &str) {
        self.added.borrow_mut().push(name.to_string());
    }

    fn command_removed(&self, name: &str) {
        self.removed.borrow_mut().push(name.to_string());
    }
}

/// A fully faked hosting layer plus the handles the tests assert through.
pub struct TestHost {
    pub buffers: Rc<MemoryBufferStore>,
    pub output: Rc<RecordingOutput>,
    pub prompter: Rc<ScriptedPrompter>,
    pub consent: Rc<FixedConsent>,
    pub observer: Rc<RecordingObserver>,
    pub env: HostEnv,
}

impl TestHost {
    pub fn manager(&self) -> Manager {
        Manager::new(self.env.clone())
    }
}

pub fn test_host() -> TestHost {
    host_with(FixedConsent::allowing(), ScriptedPrompter::default())
}

pub fn host_with(consent: FixedConsent, prompter: ScriptedPrompter) -> TestHost {
    let buffers = Rc::new(MemoryBufferStore::new());
    let output = Rc::new(RecordingOutput::default());
    let prompter = Rc::new(prompter);
    let consent = Rc::new(consent);
    let observer = Rc::new(RecordingObserver::default());
    let env = HostEnv {
        buffers: Rc::clone(&buffers) as Rc<dyn BufferStore>,
        prompter: Rc::clone(&prompter) as Rc<dyn Prompter>,
        consent: Rc::clone(&consent) as Rc<dyn Consent>,
        output: Rc::clone(&output) as Rc<dyn PluginOutput>,
        generator: Rc::new(StaticGenerator {
            reply: "generated".to_string(),
        }),
        pipes: Rc::new(FakePipes {
            buffers: Rc::clone(&buffers),
        }),
        observer: Rc::clone(&observer) as Rc<dyn CommandObserver>,
    };
    TestHost {
        buffers,
        output,
        prompter,
        consent,
        observer,
        env,
    }
}

/// Write a plugin script into the directory and return its path.
pub fn write_plugin(dir: &TempDir, file: &str, body: &str) -> PathBuf {
    let path = dir.path().join(file);
    fs::write(&path, body).expect("write plugin script");
    path
}

/// Descriptor JSON literal for use inside Lua source.
pub fn descriptor_json(name: &str) -> String {
    format!(r#"{{"name":"{name}","muxbuf":"0.6.0","version":"0.1.0"}}"#)
}
