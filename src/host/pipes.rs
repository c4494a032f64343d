//! External process piping for plugin buffers.
//!
//! `plugin.socat` and `plugin.pipe` both stream a buffer's bytes into a child
//! process's stdin and return the combined stdout+stderr. The combined output
//! is also mirrored into the `%@` buffer, the host's "last output" slot.

use std::io::Write;
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::thread;

use anyhow::{bail, Context, Result};

use crate::buffer::BufferStore;

use super::ProcessPipes;

/// Buffer that receives the combined output of every pipe invocation.
pub const PIPE_OUTPUT_BUFFER: &str = "%@";

/// Runs real child processes, feeding them buffer contents on stdin.
pub struct ShellPipes {
    buffers: Rc<dyn BufferStore>,
}

impl ShellPipes {
    pub fn new(buffers: Rc<dyn BufferStore>) -> Self {
        Self { buffers }
    }

    fn run(&self, buffer: &str, command: &str, args: &[String]) -> Result<String> {
        let input = self.buffers.read(buffer).unwrap_or_default();
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {command}"))?;

        // Feed stdin from a separate thread; writing it all up front
        // deadlocks once the child fills its stdout pipe while waiting for
        // stdin space. A child that exits without draining stdin closes the
        // pipe, which is not a failure.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                let _ = stdin.write_all(input.as_bytes());
            })
        });

        let output = child
            .wait_with_output()
            .with_context(|| format!("wait for {command}"))?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        self.buffers.write(PIPE_OUTPUT_BUFFER, &combined);

        if !output.status.success() {
            bail!("{command} exited with {}", output.status);
        }
        Ok(combined)
    }
}

impl ProcessPipes for ShellPipes {
    fn socat(&self, buffer: &str, args: &[String]) -> Result<String> {
        self.run(buffer, "socat", args)
    }

    fn pipe(&self, buffer: &str, command: &str, args: &[String]) -> Result<String> {
        self.run(buffer, command, args)
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use crate::buffer::MemoryBufferStore;

    use super::*;

    fn pipes() -> (Rc<MemoryBufferStore>, ShellPipes) {
        let buffers = Rc::new(MemoryBufferStore::new());
        let pipes = ShellPipes::new(Rc::clone(&buffers) as Rc<dyn BufferStore>);
        (buffers, pipes)
    }

    #[test]
    fn test_pipe_streams_buffer_through_cat() {
        let (buffers, pipes) = pipes();
        buffers.write("%in", "hello");
        let out = pipes.pipe("%in", "cat", &[]).expect("cat");
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_pipe_mirrors_output_into_at_buffer() {
        let (buffers, pipes) = pipes();
        buffers.write("%in", "mirrored");
        pipes.pipe("%in", "cat", &[]).expect("cat");
        assert_eq!(buffers.read(PIPE_OUTPUT_BUFFER).as_deref(), Some("mirrored"));
    }

    #[test]
    fn test_missing_buffer_feeds_empty_stdin() {
        let (_buffers, pipes) = pipes();
        let out = pipes.pipe("%nope", "cat", &[]).expect("cat");
        assert_eq!(out, "");
    }

    #[test]
    fn test_pipe_streams_large_buffer_without_stalling() {
        let (buffers, pipes) = pipes();
        let big = "x".repeat(1 << 20);
        buffers.write("%in", &big);
        let out = pipes.pipe("%in", "cat", &[]).expect("cat");
        assert_eq!(out.len(), big.len());
    }

    #[test]
    fn test_child_that_ignores_stdin_succeeds() {
        let (buffers, pipes) = pipes();
        buffers.write("%in", &"y".repeat(1 << 20));
        let out = pipes.pipe("%in", "true", &[]).expect("true");
        assert_eq!(out, "");
    }

    #[test]
    fn test_nonzero_exit_is_an_error() {
        let (_buffers, pipes) = pipes();
        let err = pipes
            .pipe("%in", "sh", &["-c".to_string(), "exit 3".to_string()])
            .expect_err("exit 3");
        assert!(err.to_string().contains("sh exited"));
    }
}
