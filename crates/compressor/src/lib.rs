//! Video compression for uploaded pitches
//!
//! Reduces raw uploads to a bounded-bitrate, bounded-resolution MP4
//! before they reach the media store, keeping downstream transfer and
//! storage cost predictable. The actual codec work is delegated to the
//! `ffmpeg` CLI; this crate owns parameterization, temp-file plumbing,
//! and the size-reduction accounting.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

/// Fixed audio bitrate for re-encoded output
const AUDIO_BITRATE: &str = "128k";

/// Compression errors
#[derive(Debug, Error)]
pub enum CompressorError {
    /// The codec invocation failed; the caller's input bytes are still
    /// valid and may be uploaded uncompressed
    #[error("encoding failure: {0}")]
    EncodingFailure(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for compression operations
pub type Result<T> = std::result::Result<T, CompressorError>;

/// H.264 encoder preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Fastest encode, largest output
    Ultrafast,
    /// Fast-path profile default
    Fast,
    /// Default balance of speed and size
    Medium,
    /// Smallest output, slowest encode
    Slow,
}

impl Preset {
    /// Get the `FFmpeg` preset name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone)]
pub struct CompressionOptions {
    /// Constant rate factor (lower = higher quality)
    pub crf: u8,
    /// Encoder preset
    pub preset: Preset,
    /// Width cap; smaller inputs are never upscaled
    pub max_width: u32,
    /// Height cap; smaller inputs are never upscaled
    pub max_height: u32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            crf: 28,
            preset: Preset::Medium,
            max_width: 1280,
            max_height: 720,
        }
    }
}

impl CompressionOptions {
    /// Fast-path profile for latency-sensitive uploads
    #[must_use]
    pub fn fast() -> Self {
        Self {
            crf: 32,
            preset: Preset::Fast,
            max_width: 854,
            max_height: 480,
        }
    }

    /// Scale filter capping resolution while preserving aspect ratio
    fn scale_filter(&self) -> String {
        format!(
            "scale='min({w},iw)':'min({h},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2",
            w = self.max_width,
            h = self.max_height
        )
    }
}

/// Outcome of a compression run
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// Compressed MP4 bytes
    pub bytes: Vec<u8>,
    /// Input size in bytes
    pub input_size: u64,
    /// Output size in bytes
    pub output_size: u64,
    /// `(input_size - output_size) / input_size`
    pub reduction_ratio: f64,
}

/// Compute the size-reduction ratio from measured byte counts
///
/// Negative when the output grew; zero for an empty input.
#[must_use]
pub fn reduction_ratio(input_size: u64, output_size: u64) -> f64 {
    if input_size == 0 {
        return 0.0;
    }
    (input_size as f64 - output_size as f64) / input_size as f64
}

/// Build the `FFmpeg` argument list for a compression run
///
/// Pure function so the invocation is testable without ffmpeg.
#[must_use]
pub fn build_ffmpeg_args(
    input_path: &Path,
    output_path: &Path,
    options: &CompressionOptions,
) -> Vec<String> {
    vec![
        "-i".to_string(),
        input_path.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        options.crf.to_string(),
        "-preset".to_string(),
        options.preset.name().to_string(),
        "-vf".to_string(),
        options.scale_filter(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        AUDIO_BITRATE.to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-y".to_string(),
        output_path.display().to_string(),
    ]
}

/// Compress raw video bytes into a single bounded MP4
///
/// Never mutates the input. On `EncodingFailure` the caller must treat
/// the original bytes as still valid and may upload them uncompressed.
///
/// # Errors
/// Returns `EncodingFailure` when ffmpeg cannot be spawned, exits with
/// a non-zero status, or produces no output file.
pub fn compress(raw_bytes: &[u8], options: &CompressionOptions) -> Result<CompressionOutcome> {
    let work_dir = TempDir::new()?;
    let input_path = work_dir.path().join("input");
    let output_path = work_dir.path().join("output.mp4");

    std::fs::write(&input_path, raw_bytes)?;

    let args = build_ffmpeg_args(&input_path, &output_path, options);
    debug!("Running ffmpeg with args: {:?}", args);

    let output = Command::new("ffmpeg")
        .args(&args)
        .output()
        .map_err(|e| CompressorError::EncodingFailure(format!("failed to execute ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CompressorError::EncodingFailure(format!(
            "ffmpeg failed: {stderr}"
        )));
    }

    if !output_path.exists() {
        return Err(CompressorError::EncodingFailure(
            "output file was not created".to_string(),
        ));
    }

    let bytes = std::fs::read(&output_path)?;
    let input_size = raw_bytes.len() as u64;
    let output_size = bytes.len() as u64;

    Ok(CompressionOutcome {
        bytes,
        input_size,
        output_size,
        reduction_ratio: reduction_ratio(input_size, output_size),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_options() {
        let options = CompressionOptions::default();
        assert_eq!(options.crf, 28);
        assert_eq!(options.preset, Preset::Medium);
        assert_eq!(options.max_width, 1280);
        assert_eq!(options.max_height, 720);
    }

    #[test]
    fn test_fast_profile() {
        let options = CompressionOptions::fast();
        assert_eq!(options.crf, 32);
        assert_eq!(options.preset, Preset::Fast);
        assert_eq!(options.max_width, 854);
        assert_eq!(options.max_height, 480);
    }

    #[test]
    fn test_reduction_ratio_matches_byte_delta() {
        assert_eq!(reduction_ratio(1000, 600), 0.4);
        assert_eq!(reduction_ratio(1000, 1000), 0.0);
        // Output growth is reported, not hidden
        assert_eq!(reduction_ratio(1000, 1500), -0.5);
        // Empty input cannot divide
        assert_eq!(reduction_ratio(0, 0), 0.0);
    }

    #[test]
    fn test_ffmpeg_args_carry_options() {
        let options = CompressionOptions::default();
        let args = build_ffmpeg_args(
            &PathBuf::from("/tmp/in"),
            &PathBuf::from("/tmp/out.mp4"),
            &options,
        );

        let crf_pos = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf_pos + 1], "28");

        let preset_pos = args.iter().position(|a| a == "-preset").unwrap();
        assert_eq!(args[preset_pos + 1], "medium");

        let vf_pos = args.iter().position(|a| a == "-vf").unwrap();
        assert!(args[vf_pos + 1].contains("min(1280,iw)"));
        assert!(args[vf_pos + 1].contains("min(720,ih)"));

        // Audio is always re-encoded at a fixed bitrate
        let audio_pos = args.iter().position(|a| a == "-b:a").unwrap();
        assert_eq!(args[audio_pos + 1], "128k");

        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn test_preset_names() {
        assert_eq!(Preset::Ultrafast.name(), "ultrafast");
        assert_eq!(Preset::Fast.name(), "fast");
        assert_eq!(Preset::Medium.name(), "medium");
        assert_eq!(Preset::Slow.name(), "slow");
    }

    #[test]
    #[ignore = "requires ffmpeg on PATH"]
    fn test_compress_rejects_garbage_input() {
        let result = compress(b"not a video", &CompressionOptions::fast());
        assert!(matches!(result, Err(CompressorError::EncodingFailure(_))));
    }
}
