//! HandBrakeCLI backend hooks.

use crate::classify::{HandbrakeClassifier, OutputClassifier};
use crate::media::{AudioTrack, CropRect, ScanType, VideoStreamInfo};
use crate::params::{FilterChainSpec, ParameterModel};
use crate::pipeline::{
    rescale_constant_quality, scale_bitrate_value, BackendHooks, DrcPlacement, PassSpec,
};
use crate::status::SharedJobStatus;
use std::path::Path;

/// HandBrakeCLI: no filter chains, everything is a long option. Constant
/// quality on `-q`, DRC after the audio parameters, both passes of a
/// two-pass encode inside a single invocation.
pub struct HandbrakeBackend;

impl BackendHooks for HandbrakeBackend {
    fn name(&self) -> &'static str {
        "handbrake"
    }

    fn executable(&self) -> &'static str {
        "HandBrakeCLI"
    }

    fn chains(&self) -> &'static [FilterChainSpec] {
        &[]
    }

    fn constant_quality(&self, model: &ParameterModel) -> bool {
        model.has_parameter("-q")
    }

    fn height_divisor(&self) -> u32 {
        2
    }

    fn drc_placement(&self) -> DrcPlacement {
        DrcPlacement::PostParams
    }

    fn set_input(&self, model: &mut ParameterModel, source: &Path) {
        model.append_pair("-i", source.to_string_lossy());
    }

    fn set_trim(&self, model: &mut ParameterModel, start: Option<f64>, duration: Option<f64>) {
        if let Some(start) = start {
            model.parameter_replace_or_insert("--start-at", &format!("seconds:{}", start));
        }
        if let Some(duration) = duration {
            // stop-at counts from the start point.
            model.parameter_replace_or_insert("--stop-at", &format!("seconds:{}", duration));
        }
    }

    fn set_deinterlace(&self, model: &mut ParameterModel, scan: ScanType) {
        match scan {
            ScanType::Telecine => {
                if !model.has_parameter("--detelecine") {
                    model.append_token("--detelecine");
                }
            }
            _ => {
                if !model.has_parameter("--comb-detect") {
                    model.append_token("--comb-detect");
                }
                if !model.has_parameter("--decomb") {
                    model.append_token("--decomb");
                }
            }
        }
    }

    fn set_crop(&self, model: &mut ParameterModel, crop: &CropRect, src_w: u32, src_h: u32) {
        // HandBrake wants margins, not a rectangle.
        let top = crop.y;
        let bottom = src_h.saturating_sub(crop.height + crop.y);
        let left = crop.x;
        let right = src_w.saturating_sub(crop.width + crop.x);
        model.parameter_replace_or_insert(
            "--crop",
            &format!("{}:{}:{}:{}", top, bottom, left, right),
        );
    }

    fn set_resize(&self, model: &mut ParameterModel, width: u32, height: u32) {
        model.parameter_replace_or_insert("-w", &width.to_string());
        model.parameter_replace_or_insert("-l", &height.to_string());
    }

    fn set_aspect_fix(&self, model: &mut ParameterModel, _width: u32, _height: u32) {
        if !model.has_parameter("--loose-anamorphic") {
            model.append_token("--loose-anamorphic");
        }
    }

    fn preset_width(&self, model: &ParameterModel) -> bool {
        model.has_parameter("-w") || model.has_parameter("--width")
    }

    fn adjust_quality(
        &self,
        model: &mut ParameterModel,
        resolution_factor: f64,
        user_multiplier: f64,
    ) {
        if self.constant_quality(model) {
            if let Some(current) = model
                .parameter_value("-q")
                .and_then(|v| v.parse::<f64>().ok())
            {
                let (worst, best) = self.quality_bounds();
                let adjusted = rescale_constant_quality(current, worst, best, user_multiplier);
                model.parameter_replace("-q", &format!("{}", adjusted.round() as i64));
            }
            return;
        }

        if let Some(value) = model.parameter_value("-b") {
            if let Some(scaled) = scale_bitrate_value(value, resolution_factor * user_multiplier) {
                model.parameter_replace("-b", &scaled);
            }
        }
    }

    fn frame_rate_set(&self, model: &ParameterModel) -> bool {
        model.has_parameter("-r") || model.has_parameter("--rate")
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
        // HandBrake numbers audio tracks 1..N in container order.
        let position = info
            .audio_tracks
            .iter()
            .position(|t| t.stream_index == track.stream_index)
            .map(|i| i + 1)
            .unwrap_or(1);
        model.parameter_replace_or_insert("-a", &position.to_string());
    }

    fn set_volume(&self, model: &mut ParameterModel, db: f64) {
        model.parameter_replace_or_insert("--gain", &format!("{}", db));
    }

    fn set_drc(&self, model: &mut ParameterModel) {
        model.parameter_replace_or_insert("--drc", "2.5");
    }

    fn set_audio_channels(&self, model: &mut ParameterModel, channels: u32) {
        let mixdown = match channels {
            1 => "mono",
            2 => "stereo",
            6 => "5point1",
            _ => return,
        };
        model.parameter_replace_or_insert("--mixdown", mixdown);
    }

    fn max_audio_channels(&self, model: &ParameterModel) -> Option<u32> {
        match model.parameter_value("-E")? {
            "mp3" | "lame" => Some(2),
            _ => None,
        }
    }

    fn configure_pass(
        &self,
        model: &mut ParameterModel,
        _pass: &PassSpec,
        two_pass: bool,
        output: &Path,
    ) {
        if two_pass && !model.has_parameter("--two-pass") {
            // Both passes run inside this single invocation.
            model.append_token("--two-pass");
        }
        model.parameter_replace_or_insert("-o", &output.to_string_lossy());
    }

    fn classifier(
        &self,
        status: SharedJobStatus,
        _duration_secs: f64,
    ) -> Box<dyn OutputClassifier + Send> {
        Box::new(HandbrakeClassifier::new(status))
    }
}
