//! Text extraction for non-markdown corpus files.
//!
//! Corpus files arrive as raw bytes tagged with a [`DocumentKind`]. This
//! module turns them into the UTF-8 text the chunker consumes:
//!
//! | Kind | Conversion |
//! |------|------------|
//! | Markdown, PlainText | strict UTF-8 decode |
//! | PdfExtracted | `pdf-extract`, form feeds become paragraph breaks |
//! | CsvConverted | markdown table, header repeated every [`CSV_ROWS_PER_BLOCK`] rows |
//!
//! Extraction failures are per-file errors; the indexer records them and
//! moves on.

use thiserror::Error;

use crate::models::DocumentKind;

/// Rows per table block in CSV output. Blocks are separated by blank lines
/// so the chunker can split large tables on paragraph boundaries.
pub const CSV_ROWS_PER_BLOCK: usize = 25;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Convert raw file bytes into chunkable text.
pub fn document_text(bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractError> {
    match kind {
        DocumentKind::Markdown | DocumentKind::PlainText => Ok(String::from_utf8(bytes.to_vec())?),
        DocumentKind::PdfExtracted => extract_pdf(bytes),
        DocumentKind::CsvConverted => {
            let text = String::from_utf8(bytes.to_vec())?;
            Ok(csv_to_markdown(&text))
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(text.replace('\u{c}', "\n\n"))
}

/// Render CSV text as markdown table blocks.
///
/// The first record is the header. Quoted fields may contain commas,
/// escaped quotes (`""`), and newlines. Pipes in cell values are escaped.
pub fn csv_to_markdown(text: &str) -> String {
    let records = parse_csv(text);
    let mut rows = records.into_iter().filter(|r| r.iter().any(|c| !c.is_empty()));

    let Some(header) = rows.next() else {
        return String::new();
    };
    let header_line = render_row(&header);
    let divider = render_row(&vec!["---".to_string(); header.len()]);

    let body: Vec<Vec<String>> = rows.collect();
    if body.is_empty() {
        return format!("{}\n{}", header_line, divider);
    }

    body.chunks(CSV_ROWS_PER_BLOCK)
        .map(|block| {
            let mut lines = vec![header_line.clone(), divider.clone()];
            lines.extend(block.iter().map(|r| render_row(r)));
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_row(cells: &[String]) -> String {
    let escaped: Vec<String> = cells
        .iter()
        .map(|c| c.replace('|', "\\|").replace('\n', " "))
        .collect();
    format!("| {} |", escaped.join(" | "))
}

fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field).trim().to_string()),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field).trim().to_string());
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field.trim().to_string());
        records.push(record);
    }

    records
}
