//! Session data owned by the pipeline controller.
//!
//! `SessionState` is the only place pipeline data lives. It enforces the
//! invalidation rules on its own so they can be checked without an engine:
//!
//! - ingesting a file advances the generation by exactly one and drops the
//!   preview and transformed artifact of the previous generation;
//! - a configuration change drops the transformed artifact;
//! - a preview or artifact is stored only if it was produced for the
//!   current generation (and, for artifacts, the current configuration).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Configuration;

/// Monotonic counter tagging each ingested file.
pub type Generation = u64;

/// The uploaded file, immutable once ingested.
#[derive(Debug, Clone)]
pub struct RawArtifact {
    bytes: Arc<[u8]>,
    generation: Generation,
}

impl RawArtifact {
    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Row-limited rendering of the first worksheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// The `(generation, configuration)` pair captured when a call is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snapshot {
    pub generation: Generation,
    pub configuration: Configuration,
}

/// Transformed output ready to be offered for download.
#[derive(Debug, Clone)]
pub struct TransformedArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: &'static str,
    pub snapshot: Snapshot,
}

impl TransformedArtifact {
    pub fn generation(&self) -> Generation {
        self.snapshot.generation
    }

    pub fn configuration(&self) -> &Configuration {
        &self.snapshot.configuration
    }
}

/// Everything the pipeline knows about the current session.
///
/// Previews and artifacts are kept together with the generation (and
/// configuration) they were produced for, and are only returned while those
/// still match.
#[derive(Debug, Default)]
pub struct SessionState {
    generation: Generation,
    raw: Option<RawArtifact>,
    configuration: Configuration,
    preview: Option<(Generation, PreviewResult)>,
    transformed: Option<TransformedArtifact>,
}

impl SessionState {
    /// Create an empty session, generation 0, starting from `configuration`.
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            ..Self::default()
        }
    }

    /// Generation of the current file; 0 before the first ingest.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn raw(&self) -> Option<&RawArtifact> {
        self.raw.as_ref()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Replace the raw artifact with `bytes` under a fresh generation.
    ///
    /// The preview and transformed artifact of the previous file are dropped.
    ///
    /// # Arguments
    /// * `bytes` - Contents of the uploaded file
    ///
    /// # Returns
    /// * `&RawArtifact` - The stored file, tagged with the new generation
    ///
    /// # Examples
    /// ```
    /// use prettysheet::{Configuration, SessionState};
    ///
    /// let mut state = SessionState::new(Configuration::default());
    /// assert_eq!(state.ingest(vec![1u8, 2, 3]).generation(), 1);
    /// assert_eq!(state.ingest(vec![4u8]).generation(), 2);
    /// assert!(state.preview().is_none());
    /// ```
    pub fn ingest(&mut self, bytes: impl Into<Arc<[u8]>>) -> &RawArtifact {
        self.generation += 1;
        self.preview = None;
        self.transformed = None;
        self.raw.insert(RawArtifact {
            bytes: bytes.into(),
            generation: self.generation,
        })
    }

    /// Apply `edit` to the configuration. A change discards the transformed
    /// artifact; setting a field to its current value is not a change.
    ///
    /// # Arguments
    /// * `edit` - Closure mutating the configuration in place
    ///
    /// # Returns
    /// * `bool` - Whether the configuration differs from before
    ///
    /// # Examples
    /// ```
    /// use prettysheet::{Configuration, SessionState};
    ///
    /// let mut state = SessionState::new(Configuration::default());
    /// assert!(state.edit_configuration(|c| c.auto_fit_columns = true));
    /// assert!(!state.edit_configuration(|c| c.auto_fit_columns = true));
    /// ```
    pub fn edit_configuration<F>(&mut self, edit: F) -> bool
    where
        F: FnOnce(&mut Configuration),
    {
        let before = self.configuration.clone();
        edit(&mut self.configuration);
        let changed = before != self.configuration;
        if changed {
            self.transformed = None;
        }
        changed
    }

    /// Capture the current `(generation, configuration)` pair for a dispatch.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            generation: self.generation,
            configuration: self.configuration.clone(),
        }
    }

    /// Whether `snapshot` still describes this session.
    pub fn is_current(&self, snapshot: &Snapshot) -> bool {
        snapshot.generation == self.generation && snapshot.configuration == self.configuration
    }

    /// The preview of the current file, if it has arrived.
    pub fn preview(&self) -> Option<&PreviewResult> {
        match &self.preview {
            Some((generation, preview)) if *generation == self.generation => Some(preview),
            _ => None,
        }
    }

    /// Store a preview produced for `generation`. Ignored unless that is
    /// still the current generation.
    ///
    /// # Returns
    /// * `bool` - Whether the preview was stored
    pub fn store_preview(&mut self, generation: Generation, preview: PreviewResult) -> bool {
        if generation != self.generation {
            return false;
        }
        self.preview = Some((generation, preview));
        true
    }

    /// Store a transformed artifact. Ignored unless its snapshot still
    /// matches the current state; a stored artifact replaces any older one.
    ///
    /// # Returns
    /// * `bool` - Whether the artifact was stored
    pub fn store_artifact(&mut self, artifact: TransformedArtifact) -> bool {
        if !self.is_current(&artifact.snapshot) {
            return false;
        }
        self.transformed = Some(artifact);
        true
    }

    /// The transformed artifact, if one exists and is not stale.
    pub fn visible_artifact(&self) -> Option<&TransformedArtifact> {
        self.transformed
            .as_ref()
            .filter(|artifact| self.is_current(&artifact.snapshot))
    }
}
