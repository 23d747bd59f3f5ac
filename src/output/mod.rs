use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

pub mod console;
pub mod csv;
pub mod json;
pub mod notice;
pub mod render;

pub use console::ConsoleOutput;
pub use notice::Notice;

#[async_trait]
pub trait OutputHandler: Send + Sync {
    async fn write(&mut self, item: Value) -> Result<()>;
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Picks a file writer from the extension of `path` (`.json` or `.csv`).
pub fn file_handler(path: &Path) -> Result<Box<dyn OutputHandler>> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("json") => Ok(Box::new(json::JsonOutput::new(path)?)),
        Some("csv") => Ok(Box::new(csv::CsvOutput::new(path)?)),
        _ => Err(Error::InvalidInput(format!(
            "cannot export to {}: use a .json or .csv file",
            path.display()
        ))),
    }
}

/// Writes every item and closes the handler. Returns the number written.
pub async fn write_all<T: Serialize>(
    handler: &mut dyn OutputHandler,
    items: impl IntoIterator<Item = T>,
) -> Result<usize> {
    let mut count = 0;
    for item in items {
        handler.write(serde_json::to_value(item)?).await?;
        count += 1;
    }
    handler.close().await?;
    Ok(count)
}
