//! Shared buffer store and plugin buffer naming.
//!
//! Buffers are the host's named key-value slots (`%scratch`, `%@`, ...).
//! Plugins see them through two conventions:
//!
//! 1. A name without the `%` sigil is rewritten to `%<plugin>_<name>` before
//!    it reaches the store, so plugins get a private namespace by default.
//! 2. A name that already carries the sigil passes through unchanged, which
//!    is the explicit opt-in to shared state.
//!
//! `%token` references embedded in prompt responses and command arguments are
//! expanded against the store before they reach guest code.

use std::cell::RefCell;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches `%name` buffer and pane reference tokens.
static BUFFER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%[@a-zA-Z0-9_]+").expect("buffer token pattern"));

/// Read/write access to the host's shared buffer store.
///
/// Implementations use interior mutability; the plugin host is
/// single-threaded by design and shares the store via `Rc`.
pub trait BufferStore {
    fn read(&self, name: &str) -> Option<String>;
    fn write(&self, name: &str, value: &str);
}

/// Rewrite a plugin-relative buffer name into the shared store's namespace.
pub fn plugin_buffer_name(plugin: &str, name: &str) -> String {
    if name.starts_with('%') {
        name.to_string()
    } else {
        format!("%{plugin}_{name}")
    }
}

/// Replace every `%token` in `input` with the named buffer's contents.
/// Tokens that do not resolve to a buffer are left as-is.
pub fn expand_buffer_tokens(input: &str, buffers: &dyn BufferStore) -> String {
    BUFFER_TOKEN
        .replace_all(input, |caps: &regex::Captures| {
            let token = &caps[0];
            buffers.read(token).unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}

/// In-memory buffer store backing the standalone CLI and the test suite.
///
/// The real REPL keeps its buffers in an encrypted session file; that store
/// satisfies the same trait.
#[derive(Default)]
pub struct MemoryBufferStore {
    slots: RefCell<HashMap<String, String>>,
}

impl MemoryBufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current buffer contents, mainly for assertions and dumps.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.slots.borrow().clone()
    }
}

impl BufferStore for MemoryBufferStore {
    fn read(&self, name: &str) -> Option<String> {
        self.slots.borrow().get(name).cloned()
    }

    fn write(&self, name: &str, value: &str) {
        self.slots
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_names_are_namespaced() {
        assert_eq!(plugin_buffer_name("demo", "foo"), "%demo_foo");
    }

    #[test]
    fn test_sigil_names_pass_through() {
        assert_eq!(plugin_buffer_name("demo", "%global"), "%global");
        assert_eq!(plugin_buffer_name("demo", "%@"), "%@");
    }

    #[test]
    fn test_expand_tokens_replaces_known_buffers() {
        let store = MemoryBufferStore::new();
        store.write("%data", "42");
        let out = expand_buffer_tokens("value is %data now", &store);
        assert_eq!(out, "value is 42 now");
    }

    #[test]
    fn test_expand_tokens_keeps_unknown_tokens() {
        let store = MemoryBufferStore::new();
        let out = expand_buffer_tokens("no %such buffer", &store);
        assert_eq!(out, "no %such buffer");
    }

    #[test]
    fn test_expand_tokens_handles_at_buffer() {
        let store = MemoryBufferStore::new();
        store.write("%@", "last output");
        assert_eq!(expand_buffer_tokens("%@", &store), "last output");
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryBufferStore::new();
        assert!(store.read("%x").is_none());
        store.write("%x", "1");
        assert_eq!(store.read("%x").as_deref(), Some("1"));
        store.write("%x", "2");
        assert_eq!(store.read("%x").as_deref(), Some("2"));
    }
}
