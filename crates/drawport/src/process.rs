//! The bridge-process engine: a child process that hosts the embeddable surface (typically a
//! headless browser driver) and relays its messages as newline-delimited JSON over stdio.
//!
//! The bridge receives the path of a generated host page as its last argument. The page frames
//! the embed URL, forwards every message from the frame to `window.drawportSend`, and exposes
//! `window.drawportPost` for commands going the other way.

use std::path::PathBuf;
use std::process::Stdio;

use futures::future::BoxFuture;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use drawport_core::{BackendKind, EmbedConfig, Error, Result, config::ENV_EMBED_BRIDGE};

use crate::engine::{EngineLauncher, EngineSession};
use crate::group::{self, ProcessGroup};
use crate::scratch;

const HOST_PAGE_NAME: &str = "embed-host.html";

const HOST_PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<title>drawport embed host</title>
<style>
  body { margin: 0; padding: 0; }
  #drawport-frame { width: 100vw; height: 100vh; border: none; }
</style>
</head>
<body>
<iframe id="drawport-frame" src="{{URL}}"></iframe>
<script>
  const frame = document.getElementById('drawport-frame');
  window.addEventListener('message', function (evt) {
    if (evt.source !== frame.contentWindow || typeof window.drawportSend !== 'function') {
      return;
    }
    window.drawportSend(typeof evt.data === 'string' ? evt.data : JSON.stringify(evt.data));
  });
  window.drawportPost = function (line) {
    frame.contentWindow.postMessage(line, '*');
  };
</script>
</body>
</html>
"#;

/// Renders the host page for `url`.
pub fn host_page(url: &str) -> String {
    HOST_PAGE_TEMPLATE.replace("{{URL}}", &escape_attr(url))
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct BridgeLauncher {
    command: Option<String>,
    args: Vec<String>,
    url: String,
    temp_root: Option<PathBuf>,
}

impl BridgeLauncher {
    pub fn new(config: &EmbedConfig, temp_root: Option<PathBuf>) -> Self {
        Self {
            command: config.command.clone().filter(|c| !c.trim().is_empty()),
            args: config.args.clone(),
            url: config.url.clone(),
            temp_root,
        }
    }

    async fn spawn(&self) -> Result<Box<dyn EngineSession>> {
        let Some(command) = self.command.as_deref() else {
            return Err(Error::unavailable(
                BackendKind::Embed,
                "no embed bridge configured",
                bridge_hint(),
            ));
        };

        let scratch = scratch::scoped_dir(self.temp_root.as_deref())
            .map_err(|e| Error::render(format!("failed to create scratch directory: {e}")))?;
        let page = scratch.path().join(HOST_PAGE_NAME);
        tokio::fs::write(&page, host_page(&self.url))
            .await
            .map_err(|e| Error::render(format!("failed to write embed host page: {e}")))?;

        let mut bridge = Command::new(command);
        bridge
            .args(&self.args)
            .arg(&page)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = group::isolate(&mut bridge)
            .spawn()
            .map_err(|e| launch_error(command, &e))?;
        let group = ProcessGroup::of(&child);
        tracing::info!(bridge = command, pid = child.id(), "embed bridge started");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::protocol("embed bridge stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::protocol("embed bridge stdout was not captured"))?;
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(target: "drawport::bridge", "{line}");
                }
            })
        });

        Ok(Box::new(BridgeSession {
            child,
            group,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            stderr_task,
            scratch,
        }))
    }
}

impl EngineLauncher for BridgeLauncher {
    fn launch(&self) -> BoxFuture<'_, Result<Box<dyn EngineSession>>> {
        Box::pin(self.spawn())
    }
}

fn bridge_hint() -> String {
    format!("set `embed.command` in the config or {ENV_EMBED_BRIDGE} to a bridge program")
}

fn launch_error(command: &str, err: &std::io::Error) -> Error {
    let detail = if err.kind() == std::io::ErrorKind::NotFound {
        format!("bridge `{command}` not found")
    } else {
        format!("failed to launch bridge `{command}`: {err}")
    };
    Error::unavailable(BackendKind::Embed, detail, bridge_hint())
}

struct BridgeSession {
    child: Child,
    /// Kills the bridge and its helpers when the session is dropped.
    group: ProcessGroup,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<()>>,
    /// Holds the host page; removed when the session is dropped.
    scratch: TempDir,
}

impl BridgeSession {
    async fn write_line(&mut self, message: String) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::protocol("embed bridge input is closed"))?;
        let mut line = message;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::protocol(format!("failed to write to embed bridge: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| Error::protocol(format!("failed to write to embed bridge: {e}")))
    }

    async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| Error::protocol(format!("failed to read from embed bridge: {e}")))?;
            match line {
                Some(line) if line.trim().is_empty() => continue,
                other => return Ok(other),
            }
        }
    }

    async fn shutdown(mut self) {
        drop(self.stdin.take());
        self.group.kill();
        if let Err(e) = self.child.start_kill() {
            tracing::debug!("embed bridge already exited: {e}");
        }
        match self.child.wait().await {
            Ok(status) => tracing::debug!(%status, "embed bridge reaped"),
            Err(e) => tracing::warn!("failed to reap embed bridge: {e}"),
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        scratch::remove(self.scratch);
    }
}

impl EngineSession for BridgeSession {
    fn send(&mut self, message: String) -> BoxFuture<'_, Result<()>> {
        tracing::debug!(bytes = message.len(), "-> embed bridge");
        Box::pin(self.write_line(message))
    }

    fn next_message(&mut self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(self.read_line())
    }

    fn terminate(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(self.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_page_frames_the_escaped_url() {
        let page = host_page("https://embed.diagrams.net/?embed=1&proto=json");
        assert!(page.contains(r#"src="https://embed.diagrams.net/?embed=1&amp;proto=json""#));
        assert!(page.contains("window.drawportSend"));
        assert!(page.contains("window.drawportPost"));
    }

    #[tokio::test]
    async fn missing_command_is_unavailable() {
        let launcher = BridgeLauncher::new(&EmbedConfig::default(), None);
        let err = launcher.launch().await.err().expect("launch should fail");
        assert_eq!(err.kind(), drawport_core::ErrorKind::BackendUnavailable);
        assert!(err.to_string().contains(ENV_EMBED_BRIDGE));
    }
}
