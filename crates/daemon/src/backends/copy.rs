//! Stream-copy backend hooks.

use crate::classify::{CopyClassifier, OutputClassifier};
use crate::media::{AudioTrack, CropRect, ScanType, VideoStreamInfo};
use crate::params::{FilterChainSpec, ParameterModel};
use crate::pipeline::{BackendHooks, PassSpec};
use crate::status::SharedJobStatus;
use std::path::Path;

/// Remux-only backend: ffmpeg with `-c copy`. Every filter, quality, and
/// audio-shaping step is skipped by the pipeline; only trim, track mapping,
/// and the container change apply.
pub struct CopyBackend;

impl BackendHooks for CopyBackend {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn executable(&self) -> &'static str {
        "ffmpeg"
    }

    fn chains(&self) -> &'static [FilterChainSpec] {
        &[]
    }

    fn stream_copy(&self) -> bool {
        true
    }

    fn set_input(&self, model: &mut ParameterModel, source: &Path) {
        model.append_pair("-i", source.to_string_lossy());
    }

    fn set_trim(&self, model: &mut ParameterModel, start: Option<f64>, duration: Option<f64>) {
        if let Some(start) = start {
            model.parameter_insert_before("-i", "-ss", Some(&format!("{}", start)));
        }
        if let Some(duration) = duration {
            model.parameter_replace_or_insert("-t", &format!("{}", duration));
        }
    }

    fn set_deinterlace(&self, _model: &mut ParameterModel, _scan: ScanType) {}

    fn set_crop(&self, _model: &mut ParameterModel, _crop: &CropRect, _w: u32, _h: u32) {}

    fn set_resize(&self, _model: &mut ParameterModel, _width: u32, _height: u32) {}

    fn set_aspect_fix(&self, _model: &mut ParameterModel, _width: u32, _height: u32) {}

    fn preset_width(&self, _model: &ParameterModel) -> bool {
        false
    }

    fn adjust_quality(&self, _model: &mut ParameterModel, _rf: f64, _um: f64) {}

    fn frame_rate_set(&self, _model: &ParameterModel) -> bool {
        // A stream copy cannot change the frame rate.
        true
    }

    fn set_frame_rate(&self, _model: &mut ParameterModel, _fps: &str) {}

    fn select_audio_track(
        &self,
        model: &mut ParameterModel,
        track: &AudioTrack,
        info: &VideoStreamInfo,
    ) {
        if !model.has_parameter("-map") {
            model.append_pair("-map", format!("0:{}", info.video_stream_index));
            model.append_pair("-map", format!("0:{}", track.stream_index));
        }
    }

    fn set_volume(&self, _model: &mut ParameterModel, _db: f64) {}

    fn set_drc(&self, _model: &mut ParameterModel) {}

    fn set_audio_channels(&self, _model: &mut ParameterModel, _channels: u32) {}

    fn configure_pass(
        &self,
        model: &mut ParameterModel,
        _pass: &PassSpec,
        _two_pass: bool,
        output: &Path,
    ) {
        if !model.has_parameter("-c") {
            model.append_pair("-c", "copy");
        }
        model.append_token(output.to_string_lossy());
    }

    fn classifier(
        &self,
        status: SharedJobStatus,
        duration_secs: f64,
    ) -> Box<dyn OutputClassifier + Send> {
        Box::new(CopyClassifier::new(status, duration_secs))
    }
}
