use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use calamine::{Data, Range, Reader, Xlsx};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};

use super::{Engine, EngineFault};
use crate::config::Configuration;
use crate::session::PreviewResult;

/// Engine backed by calamine for reading and rust_xlsxwriter for writing.
///
/// Only the first worksheet of a workbook is looked at. Work runs on the
/// blocking pool so a large file never stalls the async runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxEngine;

impl XlsxEngine {
    pub fn new() -> Self {
        XlsxEngine
    }
}

#[async_trait]
impl Engine for XlsxEngine {
    async fn initialize(&self) -> Result<(), EngineFault> {
        Ok(())
    }

    async fn extract_preview(
        &self,
        bytes: Arc<[u8]>,
        row_limit: u32,
    ) -> Result<PreviewResult, EngineFault> {
        run_blocking(move || read_preview(&bytes, row_limit)).await
    }

    async fn transform(
        &self,
        bytes: Arc<[u8]>,
        config: Configuration,
    ) -> Result<Vec<u8>, EngineFault> {
        run_blocking(move || restyle(&bytes, &config)).await
    }
}

async fn run_blocking<T, F>(job: F) -> Result<T, EngineFault>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EngineFault> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| EngineFault::new(format!("engine task aborted: {}", e)))?
}

/// Read the header row and up to `row_limit` data rows of the first sheet.
///
/// Every cell is rendered as its display string; a sheet with no rows gives
/// an empty preview.
pub fn read_preview(bytes: &[u8], row_limit: u32) -> Result<PreviewResult, EngineFault> {
    let range = first_sheet(bytes)?;
    let mut rows = range.rows();

    let headers = rows.next().map(render_row).unwrap_or_default();
    let rows = rows.take(row_limit as usize).map(render_row).collect();

    Ok(PreviewResult { headers, rows })
}

/// Rewrite the first sheet into a new workbook with the header row styled
/// according to `config`.
pub fn restyle(bytes: &[u8], config: &Configuration) -> Result<Vec<u8>, EngineFault> {
    if bytes.is_empty() {
        return Err(EngineFault::new("input data is empty"));
    }
    let rgb = config
        .header_rgb()
        .map_err(|e| EngineFault::new(e.to_string()))?;

    let range = first_sheet(bytes)?;
    let format = header_format(config, rgb);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (r, row) in range.rows().enumerate() {
        let row_num = u32::try_from(r).map_err(|_| EngineFault::new("too many rows"))?;
        for (c, cell) in row.iter().enumerate() {
            let col_num = u16::try_from(c).map_err(|_| EngineFault::new("too many columns"))?;
            if row_num == 0 {
                worksheet
                    .write_string_with_format(row_num, col_num, &cell.to_string(), &format)
                    .map_err(write_fault)?;
            } else {
                write_cell(worksheet, row_num, col_num, cell).map_err(write_fault)?;
            }
        }
    }

    if config.auto_fit_columns {
        worksheet.autofit();
    }

    workbook.save_to_buffer().map_err(write_fault)
}

fn first_sheet(bytes: &[u8]) -> Result<Range<Data>, EngineFault> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| EngineFault::new(format!("could not open workbook: {}", e)))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| EngineFault::new("no sheets found"))?;

    workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| EngineFault::new(format!("could not read sheet {:?}: {}", sheet_name, e)))
}

fn render_row(row: &[Data]) -> Vec<String> {
    row.iter().map(|cell| cell.to_string()).collect()
}

fn header_format(config: &Configuration, rgb: u32) -> Format {
    let mut format = Format::new();
    if config.bold_headers {
        format = format.set_bold();
    }
    if config.apply_styling {
        format = format
            .set_background_color(Color::RGB(rgb))
            .set_font_color(Color::White);
    }
    format
}

// Numbers and booleans keep their type, everything else goes in as text.
fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &Data) -> Result<(), XlsxError> {
    match cell {
        Data::Empty => {}
        Data::Int(i) => {
            worksheet.write_number(row, col, *i as f64)?;
        }
        Data::Float(f) => {
            worksheet.write_number(row, col, *f)?;
        }
        Data::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        Data::String(s) => {
            worksheet.write_string(row, col, s.as_str())?;
        }
        other => {
            worksheet.write_string(row, col, &other.to_string())?;
        }
    }
    Ok(())
}

fn write_fault(e: XlsxError) -> EngineFault {
    EngineFault::new(format!("xlsx writer error: {}", e))
}
