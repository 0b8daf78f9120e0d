//! Document loaders (C4, §4.4): per-format extraction into
//! `{page_content, metadata}` records, dispatched by [`DocumentFormat`].
//!
//! CSV and plain text loaders auto-detect encoding: a UTF-8 decode is tried
//! first, and only on failure does [`chardetng`] sniff the byte
//! distribution and [`encoding_rs`] decode with the guessed codec, so a
//! mislabeled legacy-encoded export still yields readable text instead of
//! a hard failure.

use std::collections::HashMap;
use std::path::Path;

use crate::document::{DocumentFormat, LoadedRecord};
use crate::error::{RagError, Result};

/// Decode raw bytes to a `String`, auto-detecting encoding on UTF-8 failure.
fn decode_bytes(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

/// Extracts `{page_content, metadata}` records from one file format.
pub trait DocumentLoader: Send + Sync {
    fn format(&self) -> DocumentFormat;
    fn load(&self, bytes: &[u8]) -> Result<Vec<LoadedRecord>>;
}

struct TxtLoader;

impl DocumentLoader for TxtLoader {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Txt
    }

    fn load(&self, bytes: &[u8]) -> Result<Vec<LoadedRecord>> {
        let text = decode_bytes(bytes);
        Ok(vec![LoadedRecord { page_content: text, metadata: HashMap::new() }])
    }
}

struct JsonLoader;

impl DocumentLoader for JsonLoader {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Json
    }

    fn load(&self, bytes: &[u8]) -> Result<Vec<LoadedRecord>> {
        let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| RagError::Loader {
            format: "json".to_string(),
            message: format!("invalid JSON: {e}"),
        })?;

        match value {
            serde_json::Value::Array(items) => Ok(items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    let mut metadata = HashMap::new();
                    metadata.insert("array_index".to_string(), i.to_string());
                    LoadedRecord { page_content: item.to_string(), metadata }
                })
                .collect()),
            other => Ok(vec![LoadedRecord { page_content: other.to_string(), metadata: HashMap::new() }]),
        }
    }
}

#[cfg(feature = "loaders")]
struct CsvLoader;

#[cfg(feature = "loaders")]
impl DocumentLoader for CsvLoader {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Csv
    }

    fn load(&self, bytes: &[u8]) -> Result<Vec<LoadedRecord>> {
        let text = decode_bytes(bytes);
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(text.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| RagError::Loader { format: "csv".to_string(), message: e.to_string() })?
            .clone();

        let mut records = Vec::new();
        for (row_index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| RagError::Loader { format: "csv".to_string(), message: e.to_string() })?;
            let page_content = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| format!("{h}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut metadata = HashMap::new();
            metadata.insert("row_index".to_string(), row_index.to_string());
            records.push(LoadedRecord { page_content, metadata });
        }
        Ok(records)
    }
}

#[cfg(feature = "loaders")]
struct PdfLoader;

#[cfg(feature = "loaders")]
impl DocumentLoader for PdfLoader {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn load(&self, bytes: &[u8]) -> Result<Vec<LoadedRecord>> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| RagError::Loader { format: "pdf".to_string(), message: e.to_string() })?;
        Ok(vec![LoadedRecord { page_content: text, metadata: HashMap::new() }])
    }
}

#[cfg(feature = "loaders")]
struct SpreadsheetLoader {
    format: DocumentFormat,
}

#[cfg(feature = "loaders")]
impl DocumentLoader for SpreadsheetLoader {
    fn format(&self) -> DocumentFormat {
        self.format
    }

    fn load(&self, bytes: &[u8]) -> Result<Vec<LoadedRecord>> {
        use calamine::Reader;
        let cursor = std::io::Cursor::new(bytes);
        let mut workbook: calamine::Sheets<_> = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| RagError::Loader { format: self.format.as_str().to_string(), message: e.to_string() })?;

        let mut records = Vec::new();
        for sheet_name in workbook.sheet_names().to_owned() {
            let range = match workbook.worksheet_range(&sheet_name) {
                Ok(range) => range,
                Err(_) => continue,
            };
            for (row_index, row) in range.rows().enumerate() {
                let page_content =
                    row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>().join(", ");
                let mut metadata = HashMap::new();
                metadata.insert("sheet".to_string(), sheet_name.clone());
                metadata.insert("row_index".to_string(), row_index.to_string());
                records.push(LoadedRecord { page_content, metadata });
            }
        }
        Ok(records)
    }
}

#[cfg(feature = "loaders")]
struct DocxLoader;

#[cfg(feature = "loaders")]
impl DocumentLoader for DocxLoader {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn load(&self, bytes: &[u8]) -> Result<Vec<LoadedRecord>> {
        let cursor = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| RagError::Loader { format: "docx".to_string(), message: e.to_string() })?;
        let mut xml = String::new();
        {
            use std::io::Read;
            let mut entry = archive
                .by_name("word/document.xml")
                .map_err(|e| RagError::Loader { format: "docx".to_string(), message: e.to_string() })?;
            entry
                .read_to_string(&mut xml)
                .map_err(|e| RagError::Loader { format: "docx".to_string(), message: e.to_string() })?;
        }

        let mut reader = quick_xml::Reader::from_str(&xml);
        let mut paragraphs: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut in_text = false;
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(quick_xml::events::Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                    in_text = true;
                }
                Ok(quick_xml::events::Event::End(e)) if e.local_name().as_ref() == b"t" => {
                    in_text = false;
                }
                Ok(quick_xml::events::Event::End(e)) if e.local_name().as_ref() == b"p" => {
                    if !current.is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                }
                Ok(quick_xml::events::Event::Text(t)) if in_text => {
                    current.push_str(&t.unescape().unwrap_or_default());
                }
                Ok(quick_xml::events::Event::Eof) => break,
                Err(e) => {
                    return Err(RagError::Loader { format: "docx".to_string(), message: e.to_string() })
                }
                _ => {}
            }
            buf.clear();
        }
        if !current.is_empty() {
            paragraphs.push(current);
        }

        Ok(paragraphs
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let mut metadata = HashMap::new();
                metadata.insert("paragraph_index".to_string(), i.to_string());
                LoadedRecord { page_content: text, metadata }
            })
            .collect())
    }
}

/// Dispatches loading to a per-format [`DocumentLoader`].
pub struct LoaderRegistry {
    loaders: HashMap<DocumentFormat, Box<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    /// Build a registry with every loader this build was compiled with.
    /// PPT, PPTX, and OCR extraction are out of scope and always report
    /// [`RagError::Loader`] rather than silently returning empty text.
    pub fn with_default_loaders() -> Self {
        let mut loaders: HashMap<DocumentFormat, Box<dyn DocumentLoader>> = HashMap::new();
        loaders.insert(DocumentFormat::Txt, Box::new(TxtLoader));
        loaders.insert(DocumentFormat::Json, Box::new(JsonLoader));

        #[cfg(feature = "loaders")]
        {
            loaders.insert(DocumentFormat::Csv, Box::new(CsvLoader));
            loaders.insert(DocumentFormat::Pdf, Box::new(PdfLoader));
            loaders.insert(DocumentFormat::Xlsx, Box::new(SpreadsheetLoader { format: DocumentFormat::Xlsx }));
            loaders.insert(DocumentFormat::Xls, Box::new(SpreadsheetLoader { format: DocumentFormat::Xls }));
            loaders.insert(DocumentFormat::Docx, Box::new(DocxLoader));
        }

        Self { loaders }
    }

    pub fn load_path(&self, path: &Path) -> Result<Vec<LoadedRecord>> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let format = DocumentFormat::from_extension(ext)
            .ok_or_else(|| RagError::Loader { format: ext.to_string(), message: "unrecognized file extension".to_string() })?;
        let bytes = std::fs::read(path)?;
        self.load_bytes(format, &bytes)
    }

    pub fn load_bytes(&self, format: DocumentFormat, bytes: &[u8]) -> Result<Vec<LoadedRecord>> {
        match self.loaders.get(&format) {
            Some(loader) => loader.load(bytes),
            None => Err(RagError::Loader {
                format: format.as_str().to_string(),
                message: "format is not supported in this build".to_string(),
            }),
        }
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_default_loaders()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_loader_decodes_utf8() {
        let registry = LoaderRegistry::with_default_loaders();
        let records = registry.load_bytes(DocumentFormat::Txt, "hello world".as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].page_content, "hello world");
    }

    #[test]
    fn json_array_yields_one_record_per_item() {
        let registry = LoaderRegistry::with_default_loaders();
        let bytes = br#"[{"a":1},{"a":2}]"#;
        let records = registry.load_bytes(DocumentFormat::Json, bytes).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata.get("array_index").unwrap(), "0");
    }

    #[test]
    fn json_object_yields_single_record() {
        let registry = LoaderRegistry::with_default_loaders();
        let records = registry.load_bytes(DocumentFormat::Json, br#"{"a":1}"#).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[cfg(feature = "loaders")]
    #[test]
    fn csv_loader_joins_header_and_value() {
        let registry = LoaderRegistry::with_default_loaders();
        let bytes = b"name,age\nAlice,30\n";
        let records = registry.load_bytes(DocumentFormat::Csv, bytes).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].page_content, "name: Alice, age: 30");
    }

    #[test]
    fn ppt_format_reports_unsupported() {
        let registry = LoaderRegistry::with_default_loaders();
        let err = registry.load_bytes(DocumentFormat::Ppt, b"").unwrap_err();
        assert!(matches!(err, RagError::Loader { .. }));
    }
}
