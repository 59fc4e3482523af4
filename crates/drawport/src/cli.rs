//! The desktop-CLI backend: writes the document to a scoped temp dir, runs the draw.io desktop
//! executable in export mode and reads the image it wrote.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use drawport_core::{
    BackendKind, CliConfig, DiagramDocument, Error, RenderOptions, RenderResult, Result,
    config::ENV_DRAWIO,
};

use crate::group::{self, ProcessGroup};
use crate::scratch;

const INPUT_NAME: &str = "diagram.drawio";

#[derive(Debug, Clone)]
pub struct CliBackend {
    executable: PathBuf,
    prefix_args: Vec<String>,
    extra_args: Vec<String>,
    temp_root: Option<PathBuf>,
}

impl CliBackend {
    pub fn new(config: &CliConfig, temp_root: Option<PathBuf>) -> Self {
        Self {
            executable: config.resolved_executable(),
            prefix_args: config.prefix_args.clone(),
            extra_args: config.extra_args.clone(),
            temp_root,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// The full argument list passed to the executable.
    pub fn export_args(&self, input: &Path, output: &Path, options: &RenderOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.prefix_args.iter().map(OsString::from).collect();
        args.extend(
            [
                "--export".to_string(),
                "--format".to_string(),
                options.format.as_str().to_string(),
                "--scale".to_string(),
                options.effective_scale().to_string(),
                "--border".to_string(),
                options.border.to_string(),
                "--output".to_string(),
            ]
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(input.as_os_str().to_owned());
        args
    }

    pub async fn render(
        &self,
        document: &DiagramDocument,
        options: &RenderOptions,
    ) -> Result<RenderResult> {
        let deadline = Instant::now() + options.timeout;
        let scratch = scratch::scoped_dir(self.temp_root.as_deref())
            .map_err(|e| Error::render(format!("failed to create scratch directory: {e}")))?;
        let input = scratch.path().join(INPUT_NAME);
        let output = scratch
            .path()
            .join(format!("diagram.{}", options.format.extension()));

        let outcome = self.export(&input, &output, document, options, deadline).await;
        scratch::remove(scratch);
        outcome
    }

    async fn export(
        &self,
        input: &Path,
        output: &Path,
        document: &DiagramDocument,
        options: &RenderOptions,
        deadline: Instant,
    ) -> Result<RenderResult> {
        tokio::fs::write(input, document.as_str())
            .await
            .map_err(|e| Error::render(format!("failed to write diagram to scratch file: {e}")))?;

        let mut command = Command::new(&self.executable);
        command
            .args(self.export_args(input, output, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = group::isolate(&mut command)
            .spawn()
            .map_err(|e| self.launch_error(&e))?;
        let mut group = ProcessGroup::of(&child);
        tracing::info!(
            executable = %self.executable.display(),
            pid = child.id(),
            "desktop exporter started"
        );

        let mut stdout_task = child.stdout.take().map(drain);
        let mut stderr_task = child.stderr.take().map(drain);

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => {
                status.map_err(|e| Error::render(format!("failed to wait for exporter: {e}")))?
            }
            Err(_) => {
                group.kill();
                // `kill` also reaps the child.
                if let Err(e) = child.kill().await {
                    tracing::warn!("failed to kill desktop exporter: {e}");
                }
                abort(&stdout_task);
                abort(&stderr_task);
                return Err(Error::timeout(
                    options.timeout,
                    "waiting for the desktop exporter to exit",
                ));
            }
        };

        // Anything the exporter left running would keep its output pipes open.
        group.kill();
        let collected = tokio::time::timeout_at(deadline, async {
            (collect(&mut stdout_task).await, collect(&mut stderr_task).await)
        })
        .await;
        let (stdout, stderr) = match collected {
            Ok(output) => output,
            Err(_) => {
                abort(&stdout_task);
                abort(&stderr_task);
                return Err(Error::timeout(
                    options.timeout,
                    "collecting the desktop exporter's output",
                ));
            }
        };
        if !status.success() {
            return Err(Error::render(exit_message(status, &stderr, &stdout)));
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim(), "desktop exporter diagnostics");
        }

        let bytes = match tokio::fs::read(output).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::protocol(
                    "desktop exporter exited successfully but wrote no output file",
                ));
            }
            Err(e) => {
                return Err(Error::protocol(format!(
                    "failed to read exporter output: {e}"
                )));
            }
        };
        if bytes.is_empty() {
            return Err(Error::protocol("desktop exporter wrote an empty output file"));
        }
        if !options.format.matches_signature(&bytes) {
            return Err(Error::protocol(format!(
                "desktop exporter output is not a {} image",
                options.format.as_str().to_ascii_uppercase()
            )));
        }
        Ok(RenderResult::new(bytes, options.format))
    }

    fn launch_error(&self, err: &std::io::Error) -> Error {
        let exe = self.executable.display();
        let detail = match err.kind() {
            std::io::ErrorKind::NotFound => format!("`{exe}` not found"),
            std::io::ErrorKind::PermissionDenied => format!("`{exe}` is not executable"),
            _ => format!("failed to launch `{exe}`: {err}"),
        };
        Error::unavailable(
            BackendKind::Cli,
            detail,
            format!("install the draw.io desktop app or set `cli.executable` / {ENV_DRAWIO}"),
        )
    }
}

fn drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        buf
    })
}

/// Awaits a drain in place, so a caller that gives up can still abort it.
async fn collect(task: &mut Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(handle) = task.as_mut() else {
        return String::new();
    };
    let joined = handle.await;
    *task = None;
    joined
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn abort(task: &Option<JoinHandle<Vec<u8>>>) {
    if let Some(task) = task {
        task.abort();
    }
}

fn exit_message(status: ExitStatus, stderr: &str, stdout: &str) -> String {
    let detail = [stderr.trim(), stdout.trim()]
        .into_iter()
        .find(|s| !s.is_empty());
    match detail {
        Some(detail) => format!("desktop exporter exited with {status}: {detail}"),
        None => format!("desktop exporter exited with {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_args_wrap_the_required_flags() {
        let backend = CliBackend::new(
            &CliConfig {
                executable: Some(PathBuf::from("drawio")),
                prefix_args: vec!["--no-sandbox".to_string()],
                extra_args: vec!["--crop".to_string()],
            },
            None,
        );
        let options = RenderOptions::default().with_scale(2.0).with_border(5.0);
        let args = backend.export_args(Path::new("in.drawio"), Path::new("out.png"), &options);
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "--no-sandbox",
                "--export",
                "--format",
                "png",
                "--scale",
                "2",
                "--border",
                "5",
                "--output",
                "out.png",
                "--crop",
                "in.drawio",
            ]
        );
    }

    #[test]
    fn exit_message_prefers_stderr() {
        let status = std::process::Command::new("false").status();
        let Ok(status) = status else {
            return;
        };
        let msg = exit_message(status, "  Error: bad file\n", "ignored");
        assert!(msg.ends_with(": Error: bad file"), "{msg}");
        let msg = exit_message(status, "", "");
        assert!(msg.starts_with("desktop exporter exited with"));
    }
}
