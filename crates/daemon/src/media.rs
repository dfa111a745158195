//! Media inspection module for convertd
//!
//! Probes source files with ffprobe and condenses the result into the
//! read-only facts the conversion pipeline needs: dimensions, duration,
//! codec names, audio track layout, stream indices, and a scan-type
//! classification (progressive/interlaced/telecine).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe command failed to execute.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error during probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the source material was scanned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Progressive,
    Interlaced,
    Telecine,
    Unknown,
}

/// Crop rectangle in source pixels (region to keep).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

/// One audio track of the source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioTrack {
    /// Codec name (e.g. "ac3", "aac").
    pub codec_name: String,
    /// Number of channels.
    pub channels: u32,
    /// ISO language tag, empty when untagged.
    pub language: String,
    /// Stream index within the container.
    pub stream_index: u32,
}

/// Read-only source facts consumed by the conversion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoStreamInfo {
    /// Container short name (first token of ffprobe format_name).
    pub container: String,
    /// Video codec name.
    pub video_codec: String,
    /// Video stream index within the container.
    pub video_stream_index: u32,
    /// Source width in pixels.
    pub width: u32,
    /// Source height in pixels.
    pub height: u32,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Detected scan type.
    pub scan_type: ScanType,
    /// Crop rectangle detected by the crop-scan collaborator, if any.
    pub crop: Option<CropRect>,
    /// Residual audio/video delay in seconds (positive = audio late).
    pub audio_delay_secs: f64,
    /// Audio tracks in container order.
    pub audio_tracks: Vec<AudioTrack>,
    /// Subtitle stream indices.
    pub subtitle_stream_indices: Vec<u32>,
}

impl VideoStreamInfo {
    /// Pick the audio track to convert when several exist: a language match
    /// wins, otherwise the track with the most channels, earliest first.
    pub fn select_audio_track(&self, language: Option<&str>) -> Option<&AudioTrack> {
        if let Some(lang) = language {
            if let Some(track) = self
                .audio_tracks
                .iter()
                .find(|t| t.language.eq_ignore_ascii_case(lang))
            {
                return Some(track);
            }
        }
        self.audio_tracks.iter().max_by(|a, b| {
            a.channels
                .cmp(&b.channels)
                .then(b.stream_index.cmp(&a.stream_index))
        })
    }

    /// Source width after cropping (full width when no crop applies).
    pub fn cropped_width(&self) -> u32 {
        self.crop.map(|c| c.width).unwrap_or(self.width)
    }

    /// Source height after cropping.
    pub fn cropped_height(&self) -> u32 {
        self.crop.map(|c| c.height).unwrap_or(self.height)
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub index: Option<u32>,
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub channels: Option<u32>,
        pub field_order: Option<String>,
        pub r_frame_rate: Option<String>,
        pub avg_frame_rate: Option<String>,
        pub tags: Option<Tags>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Tags {
        pub language: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub format_name: Option<String>,
        pub duration: Option<String>,
    }
}

/// Probes a source file with ffprobe and builds a [`VideoStreamInfo`].
///
/// Runs `ffprobe -v quiet -print_format json -show_streams -show_format`.
/// The crop rectangle and audio delay are left for their collaborators to
/// fill in afterwards.
pub fn probe_file(path: &Path) -> Result<VideoStreamInfo, ProbeError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_output(&stdout)
}

/// Parses ffprobe JSON output into a [`VideoStreamInfo`].
pub fn parse_ffprobe_output(json_str: &str) -> Result<VideoStreamInfo, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let streams = ffprobe.streams.unwrap_or_default();
    let format = ffprobe.format.ok_or_else(|| {
        ProbeError::ParseError("Missing format information in ffprobe output".to_string())
    })?;

    let mut info = VideoStreamInfo {
        container: format
            .format_name
            .as_deref()
            .and_then(|n| n.split(',').next())
            .unwrap_or("")
            .to_string(),
        video_codec: String::new(),
        video_stream_index: 0,
        width: 0,
        height: 0,
        duration_secs: format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0),
        scan_type: ScanType::Unknown,
        crop: None,
        audio_delay_secs: 0.0,
        audio_tracks: Vec::new(),
        subtitle_stream_indices: Vec::new(),
    };

    let mut seen_video = false;
    for stream in streams {
        let codec_type = stream.codec_type.as_deref().unwrap_or("");
        let codec_name = stream.codec_name.clone().unwrap_or_default();
        let index = stream.index.unwrap_or(0);

        match codec_type {
            "video" if !seen_video => {
                seen_video = true;
                info.video_codec = codec_name;
                info.video_stream_index = index;
                info.width = stream.width.unwrap_or(0);
                info.height = stream.height.unwrap_or(0);
                info.scan_type = classify_scan_type(
                    stream.field_order.as_deref(),
                    stream.r_frame_rate.as_deref(),
                    stream.avg_frame_rate.as_deref(),
                );
            }
            "audio" => {
                info.audio_tracks.push(AudioTrack {
                    codec_name,
                    channels: stream.channels.unwrap_or(0),
                    language: stream
                        .tags
                        .and_then(|t| t.language)
                        .unwrap_or_default(),
                    stream_index: index,
                });
            }
            "subtitle" => {
                info.subtitle_stream_indices.push(index);
            }
            _ => {}
        }
    }

    Ok(info)
}

/// Classifies the scan type from stream metadata.
///
/// Field order decides progressive vs interlaced. Telecined material shows
/// up as an interlaced-or-unknown stream whose container rate is ~30000/1001
/// while the average rate is ~24000/1001.
pub fn classify_scan_type(
    field_order: Option<&str>,
    r_frame_rate: Option<&str>,
    avg_frame_rate: Option<&str>,
) -> ScanType {
    let container_fps = r_frame_rate.and_then(parse_rate);
    let average_fps = avg_frame_rate.and_then(parse_rate);

    if let (Some(container), Some(average)) = (container_fps, average_fps) {
        if (container - 29.97).abs() < 0.05 && (average - 23.976).abs() < 0.05 {
            return ScanType::Telecine;
        }
    }

    match field_order {
        Some("progressive") => ScanType::Progressive,
        Some("tt") | Some("bb") | Some("tb") | Some("bt") => ScanType::Interlaced,
        _ => ScanType::Unknown,
    }
}

/// Parses an ffprobe rational frame rate string ("30000/1001") to fps.
fn parse_rate(rate: &str) -> Option<f64> {
    let mut parts = rate.splitn(2, '/');
    let num: f64 = parts.next()?.parse().ok()?;
    let den: f64 = parts.next().unwrap_or("1").parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}
