//! The state machine that sequences ingestion, preview, configuration edits,
//! transformation and packaging for one session.
//!
//! Every engine call is split in three steps so that several calls may be in
//! flight at once without sharing mutable state:
//!
//! 1. `begin_*` captures what the call is for (a generation, or a generation
//!    plus configuration) and returns a ticket;
//! 2. the ticket is run against the [`EngineGateway`] with no access to the
//!    controller;
//! 3. `complete_*` hands the result back, and the controller applies it only
//!    if the captured snapshot still matches the session. Anything else is
//!    dropped without touching the session or the message slot.
//!
//! The async wrappers (`ingest`, `refresh_preview`, `process`) run all three
//! steps in order.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::Configuration;
use crate::engine::{Engine, EngineGateway, EngineHandle};
use crate::error::{PipelineError, Result};
use crate::packager::{Downloadable, ResultPackager};
use crate::session::{Generation, PreviewResult, SessionState, Snapshot, TransformedArtifact};
use crate::settings::{ReprocessPolicy, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStatus {
    Idle,
    Previewing,
    ReadyForTransform,
    Transforming,
    TransformReady,
    Error,
}

/// What happened to a result handed back to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The result belonged to a superseded snapshot and was dropped.
    Discarded,
}

/// A preview call dispatched for one generation.
#[derive(Debug, Clone)]
pub struct PreviewTicket {
    generation: Generation,
    bytes: Arc<[u8]>,
    row_limit: u32,
}

impl PreviewTicket {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub async fn run(&self, gateway: &EngineGateway) -> Result<PreviewResult> {
        gateway
            .extract_preview(Arc::clone(&self.bytes), self.row_limit)
            .await
    }
}

/// A transform call dispatched for one `(generation, configuration)` pair.
///
/// The controller stays `Transforming` until the ticket is completed.
#[must_use = "the controller stays Transforming until the ticket is completed"]
#[derive(Debug, Clone)]
pub struct TransformTicket {
    snapshot: Snapshot,
    bytes: Arc<[u8]>,
}

impl TransformTicket {
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub async fn run(&self, gateway: &EngineGateway) -> Result<Vec<u8>> {
        gateway
            .transform(Arc::clone(&self.bytes), self.snapshot.configuration.clone())
            .await
    }
}

pub struct PipelineController {
    gateway: Arc<EngineGateway>,
    packager: ResultPackager,
    session: SessionState,
    status: PipelineStatus,
    message: Option<String>,
    policy: ReprocessPolicy,
    row_limit: u32,
}

impl PipelineController {
    pub fn new(gateway: Arc<EngineGateway>, settings: &Settings) -> Self {
        Self {
            gateway,
            packager: ResultPackager::new(),
            session: SessionState::new(Configuration::default()),
            status: PipelineStatus::Idle,
            message: None,
            policy: settings.policy,
            row_limit: settings.row_limit,
        }
    }

    /// Wrap `engine` in a gateway configured from `settings`.
    pub fn with_engine(engine: Arc<dyn Engine>, settings: &Settings) -> Self {
        let gateway = EngineGateway::new(engine).with_timeout(settings.engine_timeout);
        Self::new(Arc::new(gateway), settings)
    }

    pub fn gateway(&self) -> &Arc<EngineGateway> {
        &self.gateway
    }

    pub fn packager(&self) -> &ResultPackager {
        &self.packager
    }

    pub fn engine_state(&self) -> EngineHandle {
        self.gateway.state()
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn policy(&self) -> ReprocessPolicy {
        self.policy
    }

    pub fn generation(&self) -> Generation {
        self.session.generation()
    }

    pub fn configuration(&self) -> &Configuration {
        self.session.configuration()
    }

    pub fn preview(&self) -> Option<&PreviewResult> {
        self.session.preview()
    }

    /// The single user-visible message slot.
    pub fn error_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// The transformed artifact, if one matches the current snapshot.
    pub fn visible_artifact(&self) -> Option<&TransformedArtifact> {
        self.session.visible_artifact()
    }

    /// Record an error raised outside the controller (a malformed request,
    /// for instance) in the message slot and hand it back.
    pub fn reject_input(&mut self, e: PipelineError) -> PipelineError {
        self.surface(e)
    }

    fn surface(&mut self, e: PipelineError) -> PipelineError {
        warn!("{}", e);
        self.message = Some(e.to_string());
        e
    }

    // ---- ingestion and preview ----

    /// Accept a new file and dispatch its preview.
    ///
    /// Waits for the engine to initialize on first use. If initialization
    /// fails the file is rejected and the session is left as it was.
    pub async fn begin_ingest(&mut self, bytes: impl Into<Arc<[u8]>>) -> Result<PreviewTicket> {
        if let Err(e) = self.gateway.initialize().await {
            return Err(self.surface(e));
        }

        let raw = self.session.ingest(bytes);
        info!("ingested {} bytes as generation {}", raw.len(), raw.generation());
        let ticket = PreviewTicket {
            generation: raw.generation(),
            bytes: Arc::clone(raw.bytes()),
            row_limit: self.row_limit,
        };

        self.status = PipelineStatus::Previewing;
        self.message = None;
        Ok(ticket)
    }

    /// Re-dispatch the preview of the current file.
    pub fn begin_preview(&mut self) -> Result<PreviewTicket> {
        let raw = match self.session.raw() {
            Some(raw) => raw,
            None => return Err(self.surface(PipelineError::NotReady("no file has been uploaded"))),
        };
        let ticket = PreviewTicket {
            generation: raw.generation(),
            bytes: Arc::clone(raw.bytes()),
            row_limit: self.row_limit,
        };

        self.status = PipelineStatus::Previewing;
        self.message = None;
        Ok(ticket)
    }

    /// Apply a preview result if it is still for the current generation.
    ///
    /// A failure for the current generation is surfaced and returned.
    pub fn complete_preview(
        &mut self,
        ticket: PreviewTicket,
        result: Result<PreviewResult>,
    ) -> Result<Outcome> {
        if ticket.generation != self.session.generation() {
            debug!(
                "discarding preview for generation {} (current {})",
                ticket.generation,
                self.session.generation()
            );
            return Ok(Outcome::Discarded);
        }

        match result {
            Ok(preview) => {
                debug!(
                    "preview for generation {}: {} headers, {} rows",
                    ticket.generation,
                    preview.headers.len(),
                    preview.rows.len()
                );
                self.session.store_preview(ticket.generation, preview);
                self.message = None;
                self.status = if self.session.visible_artifact().is_some() {
                    PipelineStatus::TransformReady
                } else {
                    PipelineStatus::ReadyForTransform
                };
                Ok(Outcome::Applied)
            }
            Err(e) => {
                self.status = PipelineStatus::Error;
                Err(self.surface(e))
            }
        }
    }

    pub async fn ingest(&mut self, bytes: impl Into<Arc<[u8]>>) -> Result<Outcome> {
        let ticket = self.begin_ingest(bytes).await?;
        let result = ticket.run(&self.gateway).await;
        self.complete_preview(ticket, result)
    }

    /// Read `path` and ingest its contents.
    pub async fn ingest_file(&mut self, path: impl AsRef<Path>) -> Result<Outcome> {
        let bytes = match tokio::fs::read(path.as_ref()).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.surface(PipelineError::Io(e))),
        };
        self.ingest(bytes).await
    }

    pub async fn refresh_preview(&mut self) -> Result<Outcome> {
        let ticket = self.begin_preview()?;
        let result = ticket.run(&self.gateway).await;
        self.complete_preview(ticket, result)
    }

    // ---- configuration ----

    /// Apply `edit` to the configuration.
    ///
    /// A change discards the current transformed artifact. Under the
    /// automatic policy it also returns a ticket for a fresh transform, or
    /// `None` when the new configuration is invalid or nothing is ready to
    /// transform.
    pub fn edit_configuration<F>(&mut self, edit: F) -> Option<TransformTicket>
    where
        F: FnOnce(&mut Configuration),
    {
        if !self.session.edit_configuration(edit) {
            return None;
        }
        debug!("configuration changed to {:?}", self.session.configuration());

        if matches!(
            self.status,
            PipelineStatus::Transforming | PipelineStatus::TransformReady
        ) {
            self.status = PipelineStatus::ReadyForTransform;
        }

        match self.policy {
            ReprocessPolicy::Explicit => None,
            ReprocessPolicy::Automatic => {
                if self.session.preview().is_none() || self.status == PipelineStatus::Previewing {
                    return None;
                }
                self.begin_transform().ok()
            }
        }
    }

    pub fn set_header_color(&mut self, color: impl Into<String>) -> Option<TransformTicket> {
        let color = color.into();
        self.edit_configuration(|config| config.header_color = color)
    }

    pub fn set_bold_headers(&mut self, bold: bool) -> Option<TransformTicket> {
        self.edit_configuration(|config| config.bold_headers = bold)
    }

    pub fn set_auto_fit_columns(&mut self, auto_fit: bool) -> Option<TransformTicket> {
        self.edit_configuration(|config| config.auto_fit_columns = auto_fit)
    }

    pub fn set_apply_styling(&mut self, apply: bool) -> Option<TransformTicket> {
        self.edit_configuration(|config| config.apply_styling = apply)
    }

    pub fn replace_configuration(&mut self, configuration: Configuration) -> Option<TransformTicket> {
        self.edit_configuration(|config| *config = configuration)
    }

    // ---- transform ----

    /// Validate the configuration and dispatch a transform of the current
    /// file with it.
    pub fn begin_transform(&mut self) -> Result<TransformTicket> {
        let bytes = match self.session.raw() {
            Some(raw) => Arc::clone(raw.bytes()),
            None => return Err(self.surface(PipelineError::NotReady("no file has been uploaded"))),
        };
        if self.status == PipelineStatus::Previewing || self.session.preview().is_none() {
            return Err(self.surface(PipelineError::NotReady("the preview is not ready yet")));
        }
        if let Err(e) = self.session.configuration().validate() {
            return Err(self.surface(e));
        }

        let snapshot = self.session.snapshot();
        info!(
            "dispatching transform for generation {} with {:?}",
            snapshot.generation, snapshot.configuration
        );

        self.status = PipelineStatus::Transforming;
        self.message = None;
        Ok(TransformTicket { snapshot, bytes })
    }

    /// Apply a transform result if its snapshot still matches the session.
    ///
    /// A failure for the current snapshot is surfaced and returned; a result
    /// of either kind for a superseded snapshot is dropped.
    pub fn complete_transform(
        &mut self,
        ticket: TransformTicket,
        result: Result<Vec<u8>>,
    ) -> Result<Outcome> {
        if !self.session.is_current(&ticket.snapshot) {
            debug!(
                "discarding transform for generation {} with {:?}",
                ticket.snapshot.generation, ticket.snapshot.configuration
            );
            return Ok(Outcome::Discarded);
        }

        match result {
            Ok(bytes) => {
                info!(
                    "transform ready: {} bytes for generation {}",
                    bytes.len(),
                    ticket.snapshot.generation
                );
                let artifact = self.packager.package(bytes, ticket.snapshot);
                self.session.store_artifact(artifact);
                self.message = None;
                self.status = PipelineStatus::TransformReady;
                Ok(Outcome::Applied)
            }
            Err(e) => {
                self.status = PipelineStatus::Error;
                Err(self.surface(e))
            }
        }
    }

    /// Run a ticket obtained from `begin_transform` or a configuration edit.
    pub async fn run_transform(&mut self, ticket: TransformTicket) -> Result<Outcome> {
        let result = ticket.run(&self.gateway).await;
        self.complete_transform(ticket, result)
    }

    /// The explicit "process" action.
    pub async fn process(&mut self) -> Result<Outcome> {
        let ticket = self.begin_transform()?;
        self.run_transform(ticket).await
    }

    // ---- delivery ----

    /// A transient download of the visible artifact.
    pub fn download(&self) -> Result<Downloadable> {
        let artifact = self
            .visible_artifact()
            .ok_or(PipelineError::NotReady("there is no processed file to download"))?;
        self.packager.to_downloadable(artifact)
    }
}
