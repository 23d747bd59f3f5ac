use super::OutputHandler;
use crate::error::{Error, Result};
use async_trait::async_trait;
use indicatif::MultiProgress;
use serde_json::Value;

/// Pretty-printed JSON on stdout, one document per item. When progress bars
/// are on screen the lines go through them instead.
pub struct ConsoleOutput {
    multi: Option<MultiProgress>,
}

impl ConsoleOutput {
    pub fn new(multi: Option<MultiProgress>) -> Self {
        Self { multi }
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl OutputHandler for ConsoleOutput {
    async fn write(&mut self, item: Value) -> Result<()> {
        let output = serde_json::to_string_pretty(&item)?;

        if let Some(multi) = &self.multi {
            for line in output.lines() {
                multi.println(line).map_err(|e| Error::Internal(e.to_string()))?;
            }
        } else {
            println!("{}", output);
        }
        Ok(())
    }
}
