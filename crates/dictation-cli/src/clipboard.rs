//! Clipboard through the platform's command-line utilities

use anyhow::{Context, Result, bail};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use dictation_supervisor::Clipboard;
use futures::io::AsyncWriteExt;
use std::io::ErrorKind;
use tracing::debug;

/// A clipboard utility that reads the new contents from stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardTool {
    program: String,
    args: Vec<String>,
}

impl ClipboardTool {
    /// Tool invoked as `program args...`
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Tries each tool in order until one accepts the text
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    tools: Vec<ClipboardTool>,
}

impl Default for CommandClipboard {
    fn default() -> Self {
        Self::with_tools(platform_tools())
    }
}

impl CommandClipboard {
    /// Use `tools`, in order of preference
    pub fn with_tools(tools: Vec<ClipboardTool>) -> Self {
        Self { tools }
    }

    async fn pipe_to(tool: &ClipboardTool, text: &str) -> std::io::Result<bool> {
        let mut child = Command::new(&tool.program)
            .args(&tool.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            let written = async {
                stdin.write_all(text.as_bytes()).await?;
                stdin.close().await
            }
            .await;
            // A tool that exits early is judged by its status below.
            match written {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(e),
                _ => {}
            }
        }
        Ok(child.status().await?.success())
    }
}

#[async_trait]
impl Clipboard for CommandClipboard {
    async fn write_text(&self, text: &str) -> Result<()> {
        for tool in &self.tools {
            match Self::pipe_to(tool, text).await {
                Ok(true) => {
                    debug!(tool = tool.program(), "copied to clipboard");
                    return Ok(());
                }
                Ok(false) => debug!(tool = tool.program(), "clipboard tool failed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to run {}", tool.program()));
                }
            }
        }
        bail!("no clipboard utility available")
    }
}

fn platform_tools() -> Vec<ClipboardTool> {
    if cfg!(target_os = "macos") {
        vec![ClipboardTool::new("pbcopy", &[])]
    } else if cfg!(windows) {
        vec![ClipboardTool::new("clip", &[])]
    } else {
        vec![
            ClipboardTool::new("wl-copy", &[]),
            ClipboardTool::new("xclip", &["-selection", "clipboard"]),
            ClipboardTool::new("xsel", &["--clipboard", "--input"]),
        ]
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_first_available_tool_wins() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clipboard.txt");
        let script = format!("cat > '{}'", out.display());

        let clipboard = CommandClipboard::with_tools(vec![
            ClipboardTool::new("/nonexistent/clipboard-tool", &[]),
            ClipboardTool::new("sh", &["-c", &script]),
            ClipboardTool::new("sh", &["-c", "exit 1"]),
        ]);
        clipboard.write_text("hola mundo").await.unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hola mundo");
    }

    #[smol_potat::test]
    async fn test_failing_tools_are_skipped() {
        let clipboard = CommandClipboard::with_tools(vec![
            ClipboardTool::new("sh", &["-c", "exit 1"]),
            ClipboardTool::new("/nonexistent/clipboard-tool", &[]),
        ]);
        let err = clipboard.write_text("x").await.unwrap_err();
        assert!(err.to_string().contains("no clipboard utility"));
    }
}
