use super::OutputHandler;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fs::File;
use std::path::Path;

/// Writes flat JSON objects as CSV rows. The header comes from the keys of
/// the first object; nested values are written as JSON text.
pub struct CsvOutput {
    writer: csv::Writer<File>,
    headers: Option<Vec<String>>,
}

impl CsvOutput {
    pub fn new(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
            headers: None,
        })
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl OutputHandler for CsvOutput {
    async fn write(&mut self, item: Value) -> Result<()> {
        let Value::Object(map) = item else {
            log::warn!("Skipping non-object value in CSV output");
            return Ok(());
        };

        if self.headers.is_none() {
            let headers: Vec<String> = map.keys().cloned().collect();
            self.writer.write_record(&headers)?;
            self.headers = Some(headers);
        }

        let row: Vec<String> = self
            .headers
            .iter()
            .flatten()
            .map(|h| cell(map.get(h)))
            .collect();
        self.writer.write_record(&row)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
