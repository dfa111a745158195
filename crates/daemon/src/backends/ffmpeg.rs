//! ffmpeg backend hooks.

use crate::classify::{FfmpegClassifier, OutputClassifier};
use crate::media::{AudioTrack, CropRect, ScanType, VideoStreamInfo};
use crate::params::{FilterChainSpec, ParameterModel};
use crate::pipeline::{
    rescale_constant_quality, scale_bitrate_value, BackendHooks, DrcPlacement, PassSpec,
};
use crate::status::SharedJobStatus;
use std::path::Path;

const CHAINS: &[FilterChainSpec] = &[
    FilterChainSpec {
        key: "-vf",
        separator: ',',
    },
    FilterChainSpec {
        key: "-af",
        separator: ',',
    },
];

/// ffmpeg: filter chains on `-vf`/`-af`, bitrate on `-b:v`, constant quality
/// on `-crf`, DRC as a decoder option before the input, two passes as two
/// invocations sharing a pass log.
pub struct FfmpegBackend;

impl BackendHooks for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn executable(&self) -> &'static str {
        "ffmpeg"
    }

    fn chains(&self) -> &'static [FilterChainSpec] {
        CHAINS
    }

    fn constant_quality(&self, model: &ParameterModel) -> bool {
        model.has_parameter("-crf")
    }

    fn drc_placement(&self) -> DrcPlacement {
        DrcPlacement::PreInput
    }

    fn pass_count(&self, two_pass: bool) -> u32 {
        if two_pass {
            2
        } else {
            1
        }
    }

    fn set_input(&self, model: &mut ParameterModel, source: &Path) {
        model.append_pair("-i", source.to_string_lossy());
    }

    fn set_trim(&self, model: &mut ParameterModel, start: Option<f64>, duration: Option<f64>) {
        if let Some(start) = start {
            // Input seek: placed before -i for fast, keyframe-accurate seek.
            model.parameter_insert_before("-i", "-ss", Some(&format_secs(start)));
        }
        if let Some(duration) = duration {
            model.parameter_replace_or_insert("-t", &format_secs(duration));
        }
    }

    fn set_deinterlace(&self, model: &mut ParameterModel, scan: ScanType) {
        match scan {
            ScanType::Telecine => {
                model.subparam_replace_or_insert("-vf", "fieldmatch", None);
                model.subparam_replace_or_insert("-vf", "decimate", None);
            }
            _ => {
                model.subparam_replace_or_insert("-vf", "yadif", None);
            }
        }
    }

    fn set_crop(&self, model: &mut ParameterModel, crop: &CropRect, _src_w: u32, _src_h: u32) {
        model.subparam_replace_or_insert(
            "-vf",
            "crop",
            Some(&format!(
                "{}:{}:{}:{}",
                crop.width, crop.height, crop.x, crop.y
            )),
        );
    }

    fn set_resize(&self, model: &mut ParameterModel, width: u32, height: u32) {
        model.subparam_replace_or_insert("-vf", "scale", Some(&format!("{}:{}", width, height)));
    }

    fn set_aspect_fix(&self, model: &mut ParameterModel, width: u32, height: u32) {
        model.subparam_replace_or_insert("-vf", "setdar", Some(&format!("{}/{}", width, height)));
    }

    fn preset_width(&self, model: &ParameterModel) -> bool {
        model.has_parameter("-s") || model.has_subparam("-vf", "scale")
    }

    fn adjust_quality(
        &self,
        model: &mut ParameterModel,
        resolution_factor: f64,
        user_multiplier: f64,
    ) {
        if self.constant_quality(model) {
            if let Some(current) = model
                .parameter_value("-crf")
                .and_then(|v| v.parse::<f64>().ok())
            {
                let (worst, best) = self.quality_bounds();
                let adjusted = rescale_constant_quality(current, worst, best, user_multiplier);
                model.parameter_replace("-crf", &format!("{}", adjusted.round() as i64));
            }
            return;
        }

        let factor = resolution_factor * user_multiplier;
        for key in ["-b:v", "-b"] {
            if let Some(value) = model.parameter_value(key) {
                if let Some(scaled) = scale_bitrate_value(value, factor) {
                    model.parameter_replace(key, &scaled);
                }
                return;
            }
        }
    }

    fn frame_rate_set(&self, model: &ParameterModel) -> bool {
        model.has_parameter("-r")
    }

    fn set_frame_rate(&self, model: &mut ParameterModel, fps: &str) {
        model.parameter_replace_or_insert("-r", fps);
    }

    fn select_audio_track(
        &self,
        model: &mut ParameterModel,
        track: &AudioTrack,
        info: &VideoStreamInfo,
    ) {
        // Explicit mappings only when the fragments did not bring their own.
        if !model.has_parameter("-map") {
            model.append_pair("-map", format!("0:{}", info.video_stream_index));
            model.append_pair("-map", format!("0:{}", track.stream_index));
        }
    }

    fn set_volume(&self, model: &mut ParameterModel, db: f64) {
        model.subparam_replace_or_insert("-af", "volume", Some(&format!("{}dB", db)));
    }

    fn set_drc(&self, model: &mut ParameterModel) {
        // AC-3 decoder option, valid only before the input clause.
        model.append_pair("-drc_scale", "2.0");
    }

    fn set_audio_channels(&self, model: &mut ParameterModel, channels: u32) {
        model.parameter_replace_or_insert("-ac", &channels.to_string());
    }

    fn max_audio_channels(&self, model: &ParameterModel) -> Option<u32> {
        let codec = model
            .parameter_value("-c:a")
            .or_else(|| model.parameter_value("-acodec"))?;
        match codec {
            "libmp3lame" | "mp3" => Some(2),
            "aac" | "libfdk_aac" | "ac3" => Some(6),
            _ => None,
        }
    }

    fn configure_pass(
        &self,
        model: &mut ParameterModel,
        pass: &PassSpec,
        two_pass: bool,
        output: &Path,
    ) {
        if two_pass && pass.total > 1 {
            model.parameter_replace_or_insert("-pass", &pass.number.to_string());
            model.parameter_replace_or_insert("-passlogfile", &pass.log_file.to_string_lossy());
            if pass.number < pass.total {
                // Analysis pass: no audio, discard output.
                if !model.has_parameter("-an") {
                    model.append_token("-an");
                }
                model.append_pair("-f", "null");
                model.append_token("/dev/null");
                return;
            }
        }
        model.append_token(output.to_string_lossy());
    }

    fn classifier(
        &self,
        status: SharedJobStatus,
        duration_secs: f64,
    ) -> Box<dyn OutputClassifier + Send> {
        Box::new(FfmpegClassifier::new(status, duration_secs))
    }
}

fn format_secs(secs: f64) -> String {
    if (secs - secs.round()).abs() < 1e-9 {
        format!("{}", secs as u64)
    } else {
        format!("{:.3}", secs)
    }
}
