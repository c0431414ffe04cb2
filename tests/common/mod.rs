#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use prettysheet::engine::ZIP_SIGNATURE;
use prettysheet::{Configuration, Engine, EngineFault, PreviewResult};

type DelayFn = dyn Fn(&Configuration) -> Duration + Send + Sync;

/// In-memory engine for driving the pipeline in tests.
///
/// Input is comma separated text: the first line is the header row, every
/// other line a data row. Transform output is the zip signature followed by
/// the JSON of the configuration it was produced with, so a test can tell
/// which dispatch an artifact came from.
pub struct ScriptedEngine {
    pub init_calls: AtomicUsize,
    pub preview_calls: AtomicUsize,
    pub transform_calls: AtomicUsize,
    pub fail_init: AtomicBool,
    pub fail_preview: AtomicBool,
    pub fail_transform: AtomicBool,
    pub garbage_output: AtomicBool,
    init_delay: Duration,
    transform_delay: Box<DelayFn>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            init_calls: AtomicUsize::new(0),
            preview_calls: AtomicUsize::new(0),
            transform_calls: AtomicUsize::new(0),
            fail_init: AtomicBool::new(false),
            fail_preview: AtomicBool::new(false),
            fail_transform: AtomicBool::new(false),
            garbage_output: AtomicBool::new(false),
            init_delay: Duration::ZERO,
            transform_delay: Box::new(|_| Duration::ZERO),
        }
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_init() -> Self {
        let engine = Self::default();
        engine.fail_init.store(true, Ordering::SeqCst);
        engine
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn with_transform_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&Configuration) -> Duration + Send + Sync + 'static,
    {
        self.transform_delay = Box::new(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn inits(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn previews(&self) -> usize {
        self.preview_calls.load(Ordering::SeqCst)
    }

    pub fn transforms(&self) -> usize {
        self.transform_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn initialize(&self) -> Result<(), EngineFault> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(EngineFault::new("module failed to load"));
        }
        Ok(())
    }

    // Returns every row regardless of `row_limit`; truncation is the
    // gateway's job.
    async fn extract_preview(
        &self,
        bytes: Arc<[u8]>,
        _row_limit: u32,
    ) -> Result<PreviewResult, EngineFault> {
        self.preview_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_preview.load(Ordering::SeqCst) {
            return Err(EngineFault::new("unreadable workbook"));
        }
        let text = std::str::from_utf8(&bytes).map_err(|e| EngineFault::new(e.to_string()))?;
        let mut lines = text.lines().map(|line| {
            line.split(',')
                .map(|cell| cell.trim().to_string())
                .collect::<Vec<_>>()
        });
        let headers = lines.next().unwrap_or_default();
        Ok(PreviewResult {
            headers,
            rows: lines.collect(),
        })
    }

    async fn transform(
        &self,
        bytes: Arc<[u8]>,
        config: Configuration,
    ) -> Result<Vec<u8>, EngineFault> {
        self.transform_calls.fetch_add(1, Ordering::SeqCst);
        let delay = (self.transform_delay)(&config);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_transform.load(Ordering::SeqCst) {
            return Err(EngineFault::new("writer crashed"));
        }
        if self.garbage_output.load(Ordering::SeqCst) {
            return Ok(b"<html>oops</html>".to_vec());
        }
        let mut out = ZIP_SIGNATURE.to_vec();
        out.extend(serde_json::to_vec(&config).map_err(|e| EngineFault::new(e.to_string()))?);
        out.extend(format!("|{}", bytes.len()).into_bytes());
        Ok(out)
    }
}

/// Configuration an artifact produced by [`ScriptedEngine`] was made with.
pub fn produced_with(bytes: &[u8]) -> Configuration {
    let body = &bytes[ZIP_SIGNATURE.len()..];
    let end = body
        .iter()
        .rposition(|b| *b == b'|')
        .expect("scripted output has a length suffix");
    serde_json::from_slice(&body[..end]).expect("scripted output carries the configuration")
}

/// A small workbook in the scripted engine's text format: one header row
/// and `rows` data rows.
pub fn sheet(rows: usize) -> Vec<u8> {
    let mut text = String::from("name,score\n");
    for i in 0..rows {
        text.push_str(&format!("row{},{}\n", i, i * 10));
    }
    text.into_bytes()
}

pub fn config_with_color(color: &str) -> Configuration {
    Configuration {
        header_color: color.to_string(),
        ..Configuration::default()
    }
}
