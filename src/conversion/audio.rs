//! Audio transcoding through an `ffmpeg` subprocess.

use std::path::Path;
use std::process::Command;

use super::run_tool;
use crate::config::ToolsConfig;

pub(super) fn to_wav(tools: &ToolsConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    ffmpeg(tools, input, output, &["-c:a", "pcm_s16le", "-f", "wav"])
}

pub(super) fn to_mp3(tools: &ToolsConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    ffmpeg(tools, input, output, &["-c:a", "libmp3lame", "-q:a", "2", "-f", "mp3"])
}

/// AAC in an MPEG-4 audio container.
pub(super) fn to_m4a(tools: &ToolsConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    ffmpeg(tools, input, output, &["-c:a", "aac", "-b:a", "192k", "-f", "ipod"])
}

fn ffmpeg(
    tools: &ToolsConfig,
    input: &Path,
    output: &Path,
    codec_args: &[&str],
) -> anyhow::Result<()> {
    run_tool(
        Command::new(&tools.ffmpeg)
            .args(["-nostdin", "-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .arg("-vn")
            .args(codec_args)
            .arg(output),
    )
}
