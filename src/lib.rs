/*!
# PrettySheet

Upload a spreadsheet, preview its first rows, pick a header color and a few
toggles, and download a restyled copy.

## Overview

This crate is the orchestration layer of the application. It sequences
engine initialization, ingestion, preview extraction, configuration edits,
transformation and packaging, and it makes sure a result that arrives late
for a file or configuration the user has already moved away from is never
shown.

## Architecture

### Engine Layer
- **Engine** - trait for the computation module (`initialize`,
  `extract_preview`, `transform`)
- **XlsxEngine** - production engine built on calamine and rust_xlsxwriter
- **EngineGateway** - initializes the engine once per session, bounds calls
  with an optional timeout and validates responses at the boundary

### Session Layer
- **SessionState** - raw file, configuration, preview, transformed artifact
  and the generation counter
- **PipelineController** - state machine
  (`Idle → Previewing → ReadyForTransform → Transforming → TransformReady`,
  plus `Error`) that applies a result only when the snapshot captured at
  dispatch still matches the session
- **ResultPackager** - tags output with its MIME type and file name and
  hands out transient download files that are removed when released

### Surfaces
- `website` binary - HTTP API over a single session (axum)
- `prettysheet` binary - one-shot command line conversion

## Modules

- **config**: presentation options and their validation
- **settings**: process settings read from the environment
- **error**: error taxonomy shared by every layer
- **engine**: engine trait, gateway and the XLSX engine
- **session**: session data model and invalidation rules
- **pipeline**: the pipeline controller
- **packager**: result packaging and downloads
- **app**: HTTP routes (feature `web`)
*/

pub mod config;
pub mod engine;
pub mod error;
pub mod packager;
pub mod pipeline;
pub mod session;
pub mod settings;

#[cfg(feature = "web")]
pub mod app;

pub use config::Configuration;
pub use engine::{Engine, EngineFault, EngineGateway, EngineHandle, XlsxEngine};
pub use error::{PipelineError, Result};
pub use packager::{Downloadable, ResultPackager};
pub use pipeline::{Outcome, PipelineController, PipelineStatus, PreviewTicket, TransformTicket};
pub use session::{Generation, PreviewResult, RawArtifact, SessionState, Snapshot, TransformedArtifact};
pub use settings::{ReprocessPolicy, Settings};
