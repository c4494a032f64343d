//! Hook names fired by the host at its extension points.
//!
//! The pipeline itself treats hook names as opaque strings; these constants
//! are the vocabulary the muxbuf REPL fires. For every hook the callback
//! signature is `(buffer_name, value) -> value`.

/// Fired before a value is written into a buffer.
pub const BEFORE_WRITE: &str = "before_write";

/// Fired after a buffer is read, before the value reaches its consumer.
pub const AFTER_READ: &str = "after_read";

/// Fired on the raw command line before dispatch.
pub const BEFORE_COMMAND: &str = "before_command";

/// Fired on markdown source before rendering.
pub const BEFORE_MARKDOWN: &str = "before_markdown";

/// Fired on the prompt before it is sent to the model backend.
pub const BEFORE_GEN: &str = "before_gen";

/// Fired on the model reply before it is stored.
pub const AFTER_GEN: &str = "after_gen";
