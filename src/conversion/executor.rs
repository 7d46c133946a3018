use std::path::{Path, PathBuf};

use super::{lookup, ConversionError};
use crate::config::ToolsConfig;

/// Converts a file on disk into a new file next to it.
///
/// Implementations own no state about who uploaded the input; they take a
/// path and hand back the path they produced.
pub trait Converter: Send + Sync {
    fn convert(&self, input: &Path, identifier: &str) -> Result<PathBuf, ConversionError>;
}

/// The registry-backed converter used by the service.
pub struct Executor {
    tools: ToolsConfig,
}

impl Executor {
    pub fn new(tools: ToolsConfig) -> Self {
        Self { tools }
    }
}

impl Converter for Executor {
    fn convert(&self, input: &Path, identifier: &str) -> Result<PathBuf, ConversionError> {
        let conversion = lookup(identifier)?;
        if !conversion.is_implemented() {
            return Err(ConversionError::NotImplemented(identifier.to_string()));
        }

        let output = raw_output_path(input, conversion.output_extension);
        let mut causes = Vec::with_capacity(conversion.strategies.len());

        for strategy in conversion.strategies {
            let result = (strategy.run)(&self.tools, input, &output).and_then(|()| {
                match std::fs::metadata(&output) {
                    Ok(m) if m.is_file() && m.len() > 0 => Ok(()),
                    Ok(_) => Err(anyhow::anyhow!("produced an empty file")),
                    Err(_) => Err(anyhow::anyhow!("produced no output file")),
                }
            });

            match result {
                Ok(()) => {
                    tracing::debug!(
                        conversion = identifier,
                        strategy = strategy.name,
                        output = %output.display(),
                        "Conversion succeeded"
                    );
                    return Ok(output);
                }
                Err(e) => {
                    tracing::debug!(
                        conversion = identifier,
                        strategy = strategy.name,
                        error = %format!("{e:#}"),
                        "Conversion strategy failed"
                    );
                    // A failed strategy must not leave a file that looks valid
                    discard(&output);
                    causes.push(format!("{}: {e:#}", strategy.name));
                }
            }
        }

        Err(ConversionError::Failed {
            identifier: identifier.to_string(),
            cause: causes.join("; "),
        })
    }
}

/// Path for the executor's raw output: alongside the input, same stem, new
/// extension, with a random infix so concurrent conversions of one input
/// never share a file.
fn raw_output_path(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let token = uuid::Uuid::new_v4().simple().to_string();
    input.with_file_name(format!("{stem}.{}{extension}", &token[..12]))
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output")
        }
    }
}
