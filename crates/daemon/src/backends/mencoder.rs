//! mencoder backend hooks.

use crate::classify::{MencoderClassifier, OutputClassifier};
use crate::media::{AudioTrack, CropRect, ScanType, VideoStreamInfo};
use crate::params::{FilterChainSpec, ParameterModel};
use crate::pipeline::{BackendHooks, DrcPlacement, PassSpec};
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
    FilterChainSpec {
        key: "-lavcopts",
        separator: ':',
    },
];

/// mencoder: positional input, filter chains on `-vf`/`-af`, codec options
/// as a `:`-separated chain on `-lavcopts`, DRC via the AC-3 decoder option
/// before the input, two passes as two invocations with `vpass` bumped.
pub struct MencoderBackend;

impl BackendHooks for MencoderBackend {
    fn name(&self) -> &'static str {
        "mencoder"
    }

    fn executable(&self) -> &'static str {
        "mencoder"
    }

    fn chains(&self) -> &'static [FilterChainSpec] {
        CHAINS
    }

    fn width_divisor(&self) -> u32 {
        16
    }

    fn height_divisor(&self) -> u32 {
        16
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
        model.append_token(source.to_string_lossy());
    }

    fn set_trim(&self, model: &mut ParameterModel, start: Option<f64>, duration: Option<f64>) {
        if let Some(start) = start {
            model.parameter_replace_or_insert("-ss", &format!("{}", start));
        }
        if let Some(duration) = duration {
            model.parameter_replace_or_insert("-endpos", &format!("{}", duration));
        }
    }

    fn set_deinterlace(&self, model: &mut ParameterModel, scan: ScanType) {
        match scan {
            ScanType::Telecine => {
                model.subparam_replace_or_insert("-vf", "pullup", None);
                model.subparam_replace_or_insert("-vf", "softskip", None);
            }
            _ => {
                model.subparam_replace_or_insert("-vf", "pp", Some("lb"));
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
        model.subparam_replace_or_insert("-vf", "dsize", Some(&format!("{}:{}", width, height)));
    }

    fn preset_width(&self, model: &ParameterModel) -> bool {
        model.has_subparam("-vf", "scale") || model.has_parameter("-x")
    }

    fn adjust_quality(
        &self,
        model: &mut ParameterModel,
        resolution_factor: f64,
        user_multiplier: f64,
    ) {
        // lavc bitrate is a bare kbps number inside the option chain.
        if let Some(current) = model
            .subparam_value("-lavcopts", "vbitrate")
            .and_then(|v| v.parse::<f64>().ok())
        {
            let scaled = (current * resolution_factor * user_multiplier).round().max(1.0);
            model.subparam_replace_or_insert(
                "-lavcopts",
                "vbitrate",
                Some(&format!("{}", scaled as u64)),
            );
        }
    }

    fn frame_rate_set(&self, model: &ParameterModel) -> bool {
        model.has_parameter("-ofps")
    }

    fn set_frame_rate(&self, model: &mut ParameterModel, fps: &str) {
        model.parameter_replace_or_insert("-ofps", fps);
    }

    fn select_audio_track(
        &self,
        model: &mut ParameterModel,
        track: &AudioTrack,
        _info: &VideoStreamInfo,
    ) {
        model.parameter_replace_or_insert("-aid", &track.stream_index.to_string());
    }

    fn set_volume(&self, model: &mut ParameterModel, db: f64) {
        model.subparam_replace_or_insert("-af", "volume", Some(&format!("{}", db)));
    }

    fn set_drc(&self, model: &mut ParameterModel) {
        model.parameter_replace_or_insert("-a52drc", "1");
    }

    fn set_audio_channels(&self, model: &mut ParameterModel, channels: u32) {
        model.parameter_replace_or_insert("-channels", &channels.to_string());
    }

    fn max_audio_channels(&self, model: &ParameterModel) -> Option<u32> {
        match model.parameter_value("-oac")? {
            "mp3lame" => Some(2),
            "faac" => Some(6),
            _ => None,
        }
    }

    fn set_edl(&self, model: &mut ParameterModel, edl: &Path) {
        model.parameter_replace_or_insert("-edl", &edl.to_string_lossy());
    }

    fn configure_pass(
        &self,
        model: &mut ParameterModel,
        pass: &PassSpec,
        two_pass: bool,
        output: &Path,
    ) {
        if two_pass && pass.total > 1 {
            model.subparam_replace_or_insert(
                "-lavcopts",
                "vpass",
                Some(&pass.number.to_string()),
            );
            model.parameter_replace_or_insert("-passlogfile", &pass.log_file.to_string_lossy());
        }
        model.parameter_replace_or_insert("-o", &output.to_string_lossy());
    }

    fn classifier(
        &self,
        status: SharedJobStatus,
        _duration_secs: f64,
    ) -> Box<dyn OutputClassifier + Send> {
        Box::new(MencoderClassifier::new(status))
    }
}
