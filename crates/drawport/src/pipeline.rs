use std::path::PathBuf;
use std::sync::Arc;

use tracing::Instrument;

use drawport_core::{
    BackendKind, DiagramDocument, ExportConfig, RenderOptions, RenderRequest, RenderResult,
    Result,
};

use crate::cli::CliBackend;
use crate::engine::EngineLauncher;
use crate::local::render_local;
use crate::process::BridgeLauncher;
use crate::protocol::render_embedded;

/// The export pipeline: routes each request to the backend the caller selected.
///
/// A pipeline holds configuration only. Every call to [`Pipeline::render`] opens and tears down
/// its own session, so one pipeline can serve any number of concurrent requests.
#[derive(Clone)]
pub struct Pipeline {
    embed: Arc<dyn EngineLauncher>,
    cli: CliBackend,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("cli", &self.cli)
            .finish_non_exhaustive()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

impl Pipeline {
    pub fn from_config(config: &ExportConfig) -> Self {
        let temp_root: Option<PathBuf> = config.temp_root.clone();
        Self {
            embed: Arc::new(BridgeLauncher::new(&config.embed, temp_root.clone())),
            cli: CliBackend::new(&config.cli, temp_root),
        }
    }

    /// Replaces the engine behind the `embed` backend.
    pub fn with_embed_engine(mut self, launcher: impl EngineLauncher + 'static) -> Self {
        self.embed = Arc::new(launcher);
        self
    }

    pub fn with_cli_backend(mut self, cli: CliBackend) -> Self {
        self.cli = cli;
        self
    }

    /// Renders `document` with the backend named in `options`.
    ///
    /// Yields exactly one result or one terminal error; nothing is retried and no other backend
    /// is tried on failure.
    pub async fn render(
        &self,
        document: &DiagramDocument,
        options: &RenderOptions,
    ) -> Result<RenderResult> {
        options.validate()?;
        let session = uuid::Uuid::new_v4();
        let span = tracing::info_span!("render", backend = %options.backend, %session);
        async {
            tracing::info!(bytes = document.len(), "render started");
            let started = std::time::Instant::now();
            let outcome = match options.backend {
                BackendKind::Embed => render_embedded(self.embed.as_ref(), document, options).await,
                BackendKind::Local => render_local(document, options).await,
                BackendKind::Cli => self.cli.render(document, options).await,
            };
            match &outcome {
                Ok(result) => tracing::info!(
                    bytes = result.encoded_image.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "render finished"
                ),
                Err(err) => tracing::warn!(kind = ?err.kind(), "render failed: {err}"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    pub async fn render_request(&self, request: &RenderRequest) -> Result<RenderResult> {
        self.render(request.document(), request.options()).await
    }
}
