//! The embed-mode message protocol and its driver.
//!
//! The exchange is strictly event driven: `init` (optionally preceded by a `configure` request),
//! then `load` → readiness `load` event, then `export` → `export` payload or `error`. One deadline
//! covers the whole exchange, session launch included.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use drawport_core::{
    DiagramDocument, Error, ImageFormat, RenderOptions, RenderResult, Result, envelope,
};

use crate::engine::{EngineLauncher, EngineSession};

/// How long the driver waits for a session to shut down before giving up on it.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Commands sent to the embeddable surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum EmbedCommand {
    Configure {
        config: Value,
    },
    Load {
        xml: String,
        autosave: u8,
    },
    Export {
        format: ImageFormat,
        scale: f32,
        border: f32,
    },
}

impl EmbedCommand {
    pub fn load(document: &DiagramDocument) -> Self {
        EmbedCommand::Load {
            xml: document.as_str().to_string(),
            autosave: 0,
        }
    }

    pub fn export(options: &RenderOptions) -> Self {
        EmbedCommand::Export {
            format: options.format,
            scale: options.effective_scale(),
            border: options.border,
        }
    }

    pub fn to_json(&self) -> String {
        // Plain data with string keys always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Events emitted by the embeddable surface. Unknown event names decode as [`EmbedEvent::Other`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum EmbedEvent {
    Configure,
    Init,
    Load,
    Export {
        data: String,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl EmbedEvent {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("malformed message from embed surface: {e}")))
    }

    fn name(&self) -> &'static str {
        match self {
            EmbedEvent::Configure => "configure",
            EmbedEvent::Init => "init",
            EmbedEvent::Load => "load",
            EmbedEvent::Export { .. } => "export",
            EmbedEvent::Error { .. } => "error",
            EmbedEvent::Other => "unknown",
        }
    }
}

/// Where the exchange currently is; reported in timeout errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Launching,
    AwaitingInit,
    AwaitingLoad,
    AwaitingExport,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Launching => "launching the embed engine",
            Stage::AwaitingInit => "waiting for init",
            Stage::AwaitingLoad => "waiting for the load acknowledgement",
            Stage::AwaitingExport => "waiting for the export payload",
        })
    }
}

/// Runs one complete embed-protocol render on a freshly launched session.
pub async fn render_embedded(
    launcher: &dyn EngineLauncher,
    document: &DiagramDocument,
    options: &RenderOptions,
) -> Result<RenderResult> {
    let deadline = Instant::now() + options.timeout;

    let mut session = match tokio::time::timeout_at(deadline, launcher.launch()).await {
        Ok(launched) => launched?,
        Err(_) => return Err(Error::timeout(options.timeout, Stage::Launching.to_string())),
    };
    tracing::debug!("embed session launched");

    let mut stage = Stage::AwaitingInit;
    let outcome = tokio::time::timeout_at(
        deadline,
        exchange(session.as_mut(), document, options, &mut stage),
    )
    .await;

    if tokio::time::timeout(TERMINATE_GRACE, session.terminate())
        .await
        .is_err()
    {
        tracing::warn!("embed session did not shut down within {TERMINATE_GRACE:?}");
    }

    let bytes = match outcome {
        Ok(result) => result?,
        Err(_) => return Err(Error::timeout(options.timeout, stage.to_string())),
    };
    Ok(RenderResult::new(bytes, options.format))
}

async fn exchange(
    session: &mut dyn EngineSession,
    document: &DiagramDocument,
    options: &RenderOptions,
    stage: &mut Stage,
) -> Result<Vec<u8>> {
    loop {
        match next_event(session, *stage).await? {
            EmbedEvent::Configure => {
                let reply = EmbedCommand::Configure {
                    config: Value::Object(Default::default()),
                };
                session.send(reply.to_json()).await?;
            }
            EmbedEvent::Init => break,
            event => unexpected(event, *stage)?,
        }
    }

    session.send(EmbedCommand::load(document).to_json()).await?;
    *stage = Stage::AwaitingLoad;
    loop {
        match next_event(session, *stage).await? {
            EmbedEvent::Load => break,
            event => unexpected(event, *stage)?,
        }
    }

    session.send(EmbedCommand::export(options).to_json()).await?;
    *stage = Stage::AwaitingExport;
    loop {
        match next_event(session, *stage).await? {
            EmbedEvent::Export { data } => return decode_export(&data, options.format),
            event => unexpected(event, *stage)?,
        }
    }
}

/// Turns an out-of-sequence event into the matching failure. Unknown events are skipped.
fn unexpected(event: EmbedEvent, stage: Stage) -> Result<()> {
    match event {
        EmbedEvent::Other => Ok(()),
        EmbedEvent::Error { message } => Err(Error::render(
            message.unwrap_or_else(|| "embed surface reported an error".to_string()),
        )),
        event => Err(Error::protocol(format!(
            "unexpected `{}` event while {stage}",
            event.name()
        ))),
    }
}

async fn next_event(session: &mut dyn EngineSession, stage: Stage) -> Result<EmbedEvent> {
    let Some(raw) = session.next_message().await? else {
        return Err(Error::protocol(format!(
            "embed surface closed the channel while {stage}"
        )));
    };
    let event = EmbedEvent::parse(&raw)?;
    if event == EmbedEvent::Other {
        tracing::debug!(message = %raw, "ignoring unknown embed event");
    } else {
        tracing::debug!(event = event.name(), %stage, "embed event");
    }
    Ok(event)
}

fn decode_export(data: &str, format: ImageFormat) -> Result<Vec<u8>> {
    let bytes = envelope::decode_payload(data, format.mime_type())?;
    if !format.matches_signature(&bytes) {
        return Err(Error::protocol(format!(
            "export payload is not a {} image",
            format.as_str().to_ascii_uppercase()
        )));
    }
    Ok(bytes)
}
