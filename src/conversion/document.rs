//! PDF and Word document conversions.
//!
//! Rendering and import go through external tools (poppler, MuPDF,
//! LibreOffice). Word to PDF first tries a built-in text layout that needs
//! nothing installed on the host.

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use anyhow::Context;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use regex::Regex;

use super::run_tool;
use crate::config::ToolsConfig;

/// Render resolution for the first PDF page: 2x the PDF's 72 dpi.
const RENDER_DPI: &str = "144";

// US Letter
const PAGE_WIDTH_MM: f32 = 215.9;
const PAGE_HEIGHT_MM: f32 = 279.4;
const MARGIN_MM: f32 = 25.4;
const FONT_SIZE_PT: f32 = 11.0;
const LINE_HEIGHT_MM: f32 = 5.0;
const PARAGRAPH_GAP_MM: f32 = 4.2;
/// Helvetica at 11pt fits roughly this many characters between the margins.
const LINE_WIDTH_CHARS: usize = 88;

static PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:p[ >].*?</w:p>").expect("valid regex"));
static TEXT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").expect("valid regex"));

pub(super) fn pdf_to_png_pdftoppm(
    tools: &ToolsConfig,
    input: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    // pdftoppm appends the extension itself
    let prefix = output.with_extension("");
    run_tool(
        Command::new(&tools.pdftoppm)
            .args(["-png", "-r", RENDER_DPI, "-f", "1", "-l", "1", "-singlefile"])
            .arg(input)
            .arg(&prefix),
    )
}

pub(super) fn pdf_to_png_mutool(
    tools: &ToolsConfig,
    input: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    run_tool(
        Command::new(&tools.mutool)
            .args(["draw", "-q", "-r", RENDER_DPI, "-F", "png", "-o"])
            .arg(output)
            .arg(input)
            .arg("1"),
    )
}

pub(super) fn pdf_to_docx_soffice(
    tools: &ToolsConfig,
    input: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    soffice_convert(
        tools,
        input,
        output,
        "docx:MS Word 2007 XML",
        Some("writer_pdf_import"),
    )
}

pub(super) fn docx_to_pdf_soffice(
    tools: &ToolsConfig,
    input: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    soffice_convert(tools, input, output, "pdf", None)
}

/// Lay out the document's paragraph text on plain pages. Formatting, images
/// and tables are not carried over.
pub(super) fn docx_to_pdf_text(
    _tools: &ToolsConfig,
    input: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    let paragraphs = docx_paragraphs(input)?;
    let title = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    write_text_pdf(&title, &paragraphs, output)
}

/// Run LibreOffice headless into a scratch directory, then move its output
/// to `output`. LibreOffice picks the output name itself and needs a private
/// profile directory to run concurrently with other instances.
fn soffice_convert(
    tools: &ToolsConfig,
    input: &Path,
    output: &Path,
    convert_to: &str,
    infilter: Option<&str>,
) -> anyhow::Result<()> {
    let scratch_parent = output.parent().unwrap_or_else(|| Path::new("."));
    let scratch = tempfile::tempdir_in(scratch_parent)?;
    let profile = scratch.path().join("profile");

    let mut command = Command::new(&tools.soffice);
    command
        .arg(format!("-env:UserInstallation=file://{}", profile.display()))
        .arg("--headless");
    if let Some(filter) = infilter {
        command.arg(format!("--infilter={filter}"));
    }
    command
        .arg("--convert-to")
        .arg(convert_to)
        .arg("--outdir")
        .arg(scratch.path())
        .arg(input);
    run_tool(&mut command)?;

    let extension = convert_to.split(':').next().unwrap_or(convert_to);
    let stem = input.file_stem().context("input has no file name")?;
    let produced = scratch
        .path()
        .join(format!("{}.{extension}", stem.to_string_lossy()));
    std::fs::rename(&produced, output)
        .with_context(|| format!("soffice produced no {extension} file"))?;
    Ok(())
}

/// Extract the text of every non-empty paragraph in a DOCX package.
fn docx_paragraphs(input: &Path) -> anyhow::Result<Vec<String>> {
    let mut archive =
        zip::ZipArchive::new(File::open(input)?).context("not a DOCX (zip) package")?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("DOCX package has no word/document.xml")?
        .read_to_string(&mut xml)?;

    Ok(paragraphs_from_xml(&xml))
}

fn paragraphs_from_xml(xml: &str) -> Vec<String> {
    PARAGRAPH
        .find_iter(xml)
        .map(|paragraph| {
            TEXT_RUN
                .captures_iter(paragraph.as_str())
                .filter_map(|c| c.get(1))
                .map(|m| unescape_xml(m.as_str()))
                .collect::<String>()
        })
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn write_text_pdf(title: &str, paragraphs: &[String], output: &Path) -> anyhow::Result<()> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        title,
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "text",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow::anyhow!("failed to load font: {e:?}"))?;

    let mut layer = doc.get_page(first_page).get_layer(first_layer);
    let mut y = PAGE_HEIGHT_MM - MARGIN_MM;

    for paragraph in paragraphs {
        for line in wrap(paragraph, LINE_WIDTH_CHARS) {
            if y < MARGIN_MM {
                let (page, page_layer) =
                    doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "text");
                layer = doc.get_page(page).get_layer(page_layer);
                y = PAGE_HEIGHT_MM - MARGIN_MM;
            }
            layer.use_text(line, FONT_SIZE_PT, Mm(MARGIN_MM), Mm(y), &font);
            y -= LINE_HEIGHT_MM;
        }
        y -= PARAGRAPH_GAP_MM;
    }

    let mut writer = BufWriter::new(File::create(output)?);
    doc.save(&mut writer)
        .map_err(|e| anyhow::anyhow!("failed to write PDF: {e:?}"))?;
    Ok(())
}

/// Greedy word wrap. Words longer than `width` get a line of their own.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
