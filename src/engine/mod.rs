//! Boundary to the computation engine that reads, restyles and writes
//! spreadsheets.
//!
//! The [`Engine`] trait is the collaborator contract. [`EngineGateway`]
//! wraps one engine for the lifetime of a session: it initializes it at most
//! once, refuses calls until it is ready, bounds calls with an optional
//! timeout and validates every response before handing it on.

pub mod xlsx;

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::Configuration;
use crate::error::{PipelineError, Result};
use crate::session::PreviewResult;

pub use xlsx::XlsxEngine;

/// Local-file header signature every OOXML (zip) container starts with.
pub const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Failure reported by an engine implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineFault(pub String);

impl EngineFault {
    pub fn new(message: impl Into<String>) -> Self {
        EngineFault(message.into())
    }
}

/// Operations the engine exposes. Every call is pure in its inputs and
/// deterministic for identical inputs.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn initialize(&self) -> std::result::Result<(), EngineFault>;

    async fn extract_preview(
        &self,
        bytes: Arc<[u8]>,
        row_limit: u32,
    ) -> std::result::Result<PreviewResult, EngineFault>;

    async fn transform(
        &self,
        bytes: Arc<[u8]>,
        config: Configuration,
    ) -> std::result::Result<Vec<u8>, EngineFault>;
}

/// Lifecycle of the engine. `Ready` and `Failed` are sticky.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum EngineHandle {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

pub struct EngineGateway {
    engine: Arc<dyn Engine>,
    handle: RwLock<EngineHandle>,
    // Held for the whole initialization attempt so concurrent callers queue
    // behind it and then observe its outcome.
    init_lock: Mutex<()>,
    timeout: Option<Duration>,
}

impl EngineGateway {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            handle: RwLock::new(EngineHandle::Uninitialized),
            init_lock: Mutex::new(()),
            timeout: None,
        }
    }

    /// Bound every engine call (initialization included) by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> EngineHandle {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineHandle::Ready
    }

    fn set_state(&self, next: EngineHandle) {
        debug!("engine state -> {:?}", next);
        *self.handle.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn settled(&self) -> Option<Result<()>> {
        match self.state() {
            EngineHandle::Ready => Some(Ok(())),
            EngineHandle::Failed(reason) => Some(Err(PipelineError::EngineInit(reason))),
            EngineHandle::Uninitialized | EngineHandle::Initializing => None,
        }
    }

    /// Initialize the engine once.
    ///
    /// Callers arriving while an attempt is running wait for it and share its
    /// outcome. A failure is final for the session: every later call gets
    /// the same `EngineInit` error and the engine is never asked again.
    pub async fn initialize(&self) -> Result<()> {
        if let Some(result) = self.settled() {
            return result;
        }

        let _attempt = self.init_lock.lock().await;
        if let Some(result) = self.settled() {
            return result;
        }

        self.set_state(EngineHandle::Initializing);
        info!("initializing spreadsheet engine");

        let outcome = match self.within(self.engine.initialize()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(fault)) => Err(fault.0),
            Err(timeout) => Err(timeout.to_string()),
        };

        match outcome {
            Ok(()) => {
                info!("spreadsheet engine ready");
                self.set_state(EngineHandle::Ready);
                Ok(())
            }
            Err(reason) => {
                error!("spreadsheet engine failed to initialize: {}", reason);
                self.set_state(EngineHandle::Failed(reason.clone()));
                Err(PipelineError::EngineInit(reason))
            }
        }
    }

    /// Extract at most `row_limit` data rows from the first worksheet.
    pub async fn extract_preview(&self, bytes: Arc<[u8]>, row_limit: u32) -> Result<PreviewResult> {
        self.ensure_ready()?;
        debug!("extract_preview: {} bytes, row limit {}", bytes.len(), row_limit);

        let preview = self
            .within(self.engine.extract_preview(bytes, row_limit))
            .await?
            .map_err(|fault| PipelineError::EngineCall(fault.0))?;

        check_preview(preview, row_limit)
    }

    /// Produce the restyled workbook for `config`.
    ///
    /// The caller is responsible for validating `config` first.
    pub async fn transform(&self, bytes: Arc<[u8]>, config: Configuration) -> Result<Vec<u8>> {
        self.ensure_ready()?;
        debug!("transform: {} bytes with {:?}", bytes.len(), config);

        let output = self
            .within(self.engine.transform(bytes, config))
            .await?
            .map_err(|fault| PipelineError::EngineCall(fault.0))?;

        check_transform_output(output)
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            EngineHandle::Ready => Ok(()),
            other => Err(PipelineError::EngineCall(format!(
                "engine is not ready ({:?})",
                other
            ))),
        }
    }

    async fn within<F: Future>(&self, call: F) -> Result<F::Output> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| PipelineError::Timeout(millis(limit))),
            None => Ok(call.await),
        }
    }
}

// Saturates instead of truncating for limits beyond u64 milliseconds.
fn millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

fn check_preview(mut preview: PreviewResult, row_limit: u32) -> Result<PreviewResult> {
    let width = preview.headers.len();
    if width > 0 {
        if let Some(index) = preview.rows.iter().position(|row| row.len() != width) {
            return Err(PipelineError::EngineCall(format!(
                "malformed preview: row {} has {} cells, header has {}",
                index,
                preview.rows[index].len(),
                width
            )));
        }
    } else if !preview.rows.is_empty() {
        return Err(PipelineError::EngineCall(
            "malformed preview: rows without a header row".to_string(),
        ));
    }

    preview.rows.truncate(row_limit as usize);
    Ok(preview)
}

fn check_transform_output(output: Vec<u8>) -> Result<Vec<u8>> {
    if output.is_empty() {
        return Err(PipelineError::EngineCall(
            "engine returned an empty workbook".to_string(),
        ));
    }
    if !output.starts_with(ZIP_SIGNATURE) {
        return Err(PipelineError::EngineCall(
            "engine output is not an xlsx container".to_string(),
        ));
    }
    Ok(output)
}
