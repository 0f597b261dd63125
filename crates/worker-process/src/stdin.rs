//! Stdin handling for the worker
//!
//! The worker reads one command token per line, so the only operation the
//! supervisor needs is a flushed line write.

use futures::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Handle for writing to the worker's stdin
pub struct StdinHandle {
    stdin: Option<async_process::ChildStdin>,
}

impl StdinHandle {
    /// Wrap the child's stdin pipe
    pub fn new(stdin: Option<async_process::ChildStdin>) -> Self {
        Self { stdin }
    }

    /// Write `line` followed by a newline and flush
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let Some(stdin) = &mut self.stdin else {
            return Err(Error::ProcessExited);
        };
        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');

        let written = async {
            stdin.write_all(&framed).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            // A broken pipe never heals; stop trying.
            self.stdin = None;
            return Err(Error::StreamWrite(e));
        }
        Ok(())
    }
}
