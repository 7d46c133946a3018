//! Conversion registry and executor.
//!
//! The set of conversions is closed: every identifier is a [`ConversionKind`]
//! with a fixed output extension and an ordered list of strategies. The
//! executor tries the strategies in order and reports the aggregated causes
//! when none of them produce a file.

mod audio;
mod document;
mod executor;
mod raster;

pub use executor::{Converter, Executor};

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ToolsConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Unsupported conversion type: {0}")]
    UnknownConversion(String),
    #[error("Conversion {0} is not implemented")]
    NotImplemented(String),
    #[error("Conversion {identifier} failed: {cause}")]
    Failed { identifier: String, cause: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionKind {
    PdfToWord,
    PdfToPng,
    WordToPdf,
    JpegToPng,
    JpegToSvg,
    PngToJpeg,
    PngToSvg,
    SvgToPng,
    SvgToJpeg,
    Mp3ToWav,
    Mp3ToM4a,
    WavToMp3,
    WavToM4a,
    M4aToMp3,
    M4aToWav,
}

impl ConversionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionKind::PdfToWord => "pdf_to_word",
            ConversionKind::PdfToPng => "pdf_to_png",
            ConversionKind::WordToPdf => "word_to_pdf",
            ConversionKind::JpegToPng => "jpeg_to_png",
            ConversionKind::JpegToSvg => "jpeg_to_svg",
            ConversionKind::PngToJpeg => "png_to_jpeg",
            ConversionKind::PngToSvg => "png_to_svg",
            ConversionKind::SvgToPng => "svg_to_png",
            ConversionKind::SvgToJpeg => "svg_to_jpeg",
            ConversionKind::Mp3ToWav => "mp3_to_wav",
            ConversionKind::Mp3ToM4a => "mp3_to_m4a",
            ConversionKind::WavToMp3 => "wav_to_mp3",
            ConversionKind::WavToM4a => "wav_to_m4a",
            ConversionKind::M4aToMp3 => "m4a_to_mp3",
            ConversionKind::M4aToWav => "m4a_to_wav",
        }
    }
}

impl std::fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One way of performing a conversion: reads `input`, writes `output`.
pub type Operation = fn(&ToolsConfig, &Path, &Path) -> anyhow::Result<()>;

pub struct Strategy {
    pub name: &'static str,
    pub run: Operation,
}

/// A registry entry. An empty strategy list marks a placeholder.
pub struct Conversion {
    pub kind: ConversionKind,
    /// Extension of the produced file, including the leading dot.
    pub output_extension: &'static str,
    pub strategies: &'static [Strategy],
}

impl Conversion {
    pub fn is_implemented(&self) -> bool {
        !self.strategies.is_empty()
    }
}

static REGISTRY: &[Conversion] = &[
    Conversion {
        kind: ConversionKind::PdfToWord,
        output_extension: ".docx",
        strategies: &[Strategy {
            name: "soffice",
            run: document::pdf_to_docx_soffice,
        }],
    },
    Conversion {
        kind: ConversionKind::PdfToPng,
        output_extension: ".png",
        strategies: &[
            Strategy {
                name: "pdftoppm",
                run: document::pdf_to_png_pdftoppm,
            },
            Strategy {
                name: "mutool",
                run: document::pdf_to_png_mutool,
            },
        ],
    },
    Conversion {
        kind: ConversionKind::WordToPdf,
        output_extension: ".pdf",
        strategies: &[
            Strategy {
                name: "text-layout",
                run: document::docx_to_pdf_text,
            },
            Strategy {
                name: "soffice",
                run: document::docx_to_pdf_soffice,
            },
        ],
    },
    Conversion {
        kind: ConversionKind::JpegToPng,
        output_extension: ".png",
        strategies: &[Strategy {
            name: "image",
            run: raster::to_png,
        }],
    },
    Conversion {
        kind: ConversionKind::JpegToSvg,
        output_extension: ".svg",
        strategies: &[Strategy {
            name: "svg-embed",
            run: raster::to_svg,
        }],
    },
    Conversion {
        kind: ConversionKind::PngToJpeg,
        output_extension: ".jpg",
        strategies: &[Strategy {
            name: "image",
            run: raster::to_jpeg,
        }],
    },
    Conversion {
        kind: ConversionKind::PngToSvg,
        output_extension: ".svg",
        strategies: &[Strategy {
            name: "svg-embed",
            run: raster::to_svg,
        }],
    },
    // SVG rasterization is not supported
    Conversion {
        kind: ConversionKind::SvgToPng,
        output_extension: ".png",
        strategies: &[],
    },
    Conversion {
        kind: ConversionKind::SvgToJpeg,
        output_extension: ".jpg",
        strategies: &[],
    },
    Conversion {
        kind: ConversionKind::Mp3ToWav,
        output_extension: ".wav",
        strategies: &[Strategy {
            name: "ffmpeg",
            run: audio::to_wav,
        }],
    },
    Conversion {
        kind: ConversionKind::Mp3ToM4a,
        output_extension: ".m4a",
        strategies: &[Strategy {
            name: "ffmpeg",
            run: audio::to_m4a,
        }],
    },
    Conversion {
        kind: ConversionKind::WavToMp3,
        output_extension: ".mp3",
        strategies: &[Strategy {
            name: "ffmpeg",
            run: audio::to_mp3,
        }],
    },
    Conversion {
        kind: ConversionKind::WavToM4a,
        output_extension: ".m4a",
        strategies: &[Strategy {
            name: "ffmpeg",
            run: audio::to_m4a,
        }],
    },
    Conversion {
        kind: ConversionKind::M4aToMp3,
        output_extension: ".mp3",
        strategies: &[Strategy {
            name: "ffmpeg",
            run: audio::to_mp3,
        }],
    },
    Conversion {
        kind: ConversionKind::M4aToWav,
        output_extension: ".wav",
        strategies: &[Strategy {
            name: "ffmpeg",
            run: audio::to_wav,
        }],
    },
];

/// Look up a conversion by its identifier.
pub fn lookup(identifier: &str) -> Result<&'static Conversion, ConversionError> {
    REGISTRY
        .iter()
        .find(|c| c.kind.as_str() == identifier)
        .ok_or_else(|| ConversionError::UnknownConversion(identifier.to_string()))
}

/// All registered conversions, placeholders included.
pub fn all() -> &'static [Conversion] {
    REGISTRY
}

/// Conversions offered for a file with the given extension (leading dot
/// optional, case-insensitive). Unknown extensions offer nothing.
pub fn available_conversions(extension: &str) -> &'static [ConversionKind] {
    use ConversionKind::*;

    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => &[PdfToWord, PdfToPng],
        "docx" => &[WordToPdf],
        "jpg" | "jpeg" => &[JpegToPng, JpegToSvg],
        "png" => &[PngToJpeg, PngToSvg],
        "svg" => &[SvgToPng, SvgToJpeg],
        "mp3" => &[Mp3ToWav, Mp3ToM4a],
        "wav" => &[WavToMp3, WavToM4a],
        "m4a" => &[M4aToMp3, M4aToWav],
        _ => &[],
    }
}

/// Run an external tool to completion, folding a spawn failure or a non-zero
/// exit into an error that names the tool.
fn run_tool(command: &mut Command) -> anyhow::Result<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    let output = command
        .output()
        .map_err(|e| anyhow::anyhow!("'{program}' could not be started: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("'{program}' failed ({}): {}", output.status, stderr.trim());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_identifier_looks_up_its_own_entry() {
        for conversion in all() {
            let found = lookup(conversion.kind.as_str()).unwrap();
            assert_eq!(found.kind, conversion.kind);
        }
    }

    #[test]
    fn test_every_kind_has_one_entry() {
        let mut seen = std::collections::HashSet::new();
        for conversion in all() {
            assert!(seen.insert(conversion.kind), "duplicate {}", conversion.kind);
            assert!(conversion.output_extension.starts_with('.'));
        }
        assert_eq!(seen.len(), 15);
    }

    #[test]
    fn test_serde_uses_identifiers() {
        let json = serde_json::to_string(&ConversionKind::Mp3ToM4a).unwrap();
        assert_eq!(json, "\"mp3_to_m4a\"");
    }
}
