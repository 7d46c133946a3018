//! Raster image conversions backed by the `image` crate.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::config::ToolsConfig;

const JPEG_QUALITY: u8 = 95;

pub(super) fn to_png(_tools: &ToolsConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    let image = decode(input)?;
    image
        .save_with_format(output, ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(())
}

pub(super) fn to_jpeg(_tools: &ToolsConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    let image = flatten_onto_white(&decode(input)?);

    let mut writer = BufWriter::new(File::create(output)?);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode_image(&image)
        .context("failed to encode JPEG")?;
    writer.flush()?;
    Ok(())
}

/// Wrap the raster in an SVG document of the same pixel size. The pixels are
/// embedded as a data URI so the result stands on its own.
pub(super) fn to_svg(_tools: &ToolsConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    let (width, height) =
        image::image_dimensions(input).context("failed to read image dimensions")?;
    let data = std::fs::read(input)?;
    let mime = mime_guess::from_path(input).first_or_octet_stream();
    let encoded = base64::engine::general_purpose::STANDARD.encode(&data);

    let svg = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg width="{width}" height="{height}" viewBox="0 0 {width} {height}" xmlns="http://www.w3.org/2000/svg">
  <image href="data:{mime};base64,{encoded}" width="{width}" height="{height}"/>
</svg>
"#
    );
    std::fs::write(output, svg)?;
    Ok(())
}

fn decode(input: &Path) -> anyhow::Result<DynamicImage> {
    image::open(input).with_context(|| format!("failed to decode {}", input.display()))
}

/// JPEG has no alpha channel; composite transparent pixels onto white.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    RgbImage::from_fn(width, height, |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_flatten_transparent_pixel_becomes_white() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([10, 20, 30, 0]));
        rgba.put_pixel(1, 0, Rgba([10, 20, 30, 255]));

        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([10, 20, 30]));
    }
}
