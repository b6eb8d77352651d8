//! Rendering boundary.
//!
//! The processor treats rendering as an atomic request/response call that
//! either returns a complete document or errors; swapping a native PDF
//! library for a subprocess-based renderer never touches the processor.

use serde::Serialize;
use thiserror::Error;

use crate::repository::EntityRow;
use crate::template::ResolvedTemplate;
use crate::types::OutputFormat;

/// One render request: tabular data plus an optional template.
#[derive(Debug, Clone, Serialize)]
pub struct RenderRequest {
    pub format: OutputFormat,
    pub title: String,
    /// Columns to emit; empty means every field present in the rows.
    pub columns: Vec<String>,
    pub rows: Vec<EntityRow>,
    /// Present for print jobs and pdf exports.
    pub template: Option<ResolvedTemplate>,
    pub options: serde_json::Value,
}

/// A complete rendered document.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    /// Page count for paginated formats.
    pub pages: Option<u32>,
    pub mime_type: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// This renderer implementation cannot produce the requested format.
    #[error("unsupported render target: {0}")]
    Unsupported(String),

    /// The render itself failed (treated as unrecoverable by the processor).
    #[error("render failed: {0}")]
    Failed(String),
}

/// Injected rendering capability.
pub trait Renderer: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<RenderedDocument, RenderError>;
}

/// Built-in renderer for development and tests.
///
/// Produces real CSV for csv exports and simple paginated plain-text
/// documents for print/pdf requests (template placeholders bound per row).
/// Spreadsheet (xlsx) output requires an injected engine.
#[derive(Debug, Default)]
pub struct BasicRenderer {
    /// Lines per page for paginated plain-text output.
    pub page_lines: usize,
}

impl BasicRenderer {
    pub fn new() -> Self {
        Self { page_lines: 40 }
    }

    fn effective_columns(request: &RenderRequest) -> Vec<String> {
        if !request.columns.is_empty() {
            return request.columns.clone();
        }
        let mut cols: Vec<String> = request
            .rows
            .iter()
            .flat_map(|r| r.fields.keys().cloned())
            .collect();
        cols.sort();
        cols.dedup();
        cols
    }

    fn csv_escape(value: &str) -> String {
        if value.contains([',', '"', '\n']) {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    fn field_text(row: &EntityRow, column: &str) -> String {
        match row.fields.get(column) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => String::new(),
        }
    }

    fn render_csv(&self, request: &RenderRequest) -> RenderedDocument {
        let columns = Self::effective_columns(request);
        let mut out = String::new();
        out.push_str("id");
        for c in &columns {
            out.push(',');
            out.push_str(&Self::csv_escape(c));
        }
        out.push('\n');
        for row in &request.rows {
            out.push_str(&Self::csv_escape(&row.id));
            for c in &columns {
                out.push(',');
                out.push_str(&Self::csv_escape(&Self::field_text(row, c)));
            }
            out.push('\n');
        }
        RenderedDocument {
            bytes: out.into_bytes(),
            pages: None,
            mime_type: OutputFormat::Csv.mime_type().to_string(),
        }
    }

    fn bind_template(content: &str, row: &EntityRow) -> String {
        let mut bound = content.replace("{{id}}", &row.id);
        for (field, _) in &row.fields {
            let placeholder = format!("{{{{{field}}}}}");
            if bound.contains(&placeholder) {
                bound = bound.replace(&placeholder, &Self::field_text(row, field));
            }
        }
        bound
    }

    fn render_document(&self, request: &RenderRequest) -> Result<RenderedDocument, RenderError> {
        let template = request
            .template
            .as_ref()
            .ok_or_else(|| RenderError::Failed("document render requires a template".to_string()))?;

        let mut lines: Vec<String> = Vec::new();
        if let Some(header) = &template.layout.header {
            lines.push(header.clone());
        }
        for row in &request.rows {
            for line in Self::bind_template(&template.content, row).lines() {
                lines.push(line.to_string());
            }
            // Page break between bound entities.
            lines.push(String::new());
        }
        if let Some(footer) = &template.layout.footer {
            lines.push(footer.clone());
        }

        let page_lines = self.page_lines.max(1);
        let pages = lines.len().div_ceil(page_lines).max(1) as u32;

        Ok(RenderedDocument {
            bytes: lines.join("\n").into_bytes(),
            pages: Some(pages),
            mime_type: "text/plain".to_string(),
        })
    }
}

impl Renderer for BasicRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RenderedDocument, RenderError> {
        match request.format {
            OutputFormat::Csv => Ok(self.render_csv(request)),
            OutputFormat::Pdf => self.render_document(request),
            OutputFormat::Xlsx => Err(RenderError::Unsupported(
                "xlsx output requires an injected spreadsheet renderer".to_string(),
            )),
        }
    }
}
