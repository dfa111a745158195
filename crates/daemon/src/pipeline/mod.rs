//! Conversion pipeline module for convertd
//!
//! Drives one backend attempt through the fixed mutation step order: trim,
//! deinterlace, crop, resize, aspect fix, quality compensation, audio
//! selection, volume, channel handling, output, and post-processing. The
//! step order is part of the external contract; reordering it changes
//! observable output. Backends plug in through the small [`BackendHooks`]
//! trait and share one [`ParameterModel`] and one process supervisor.

use crate::classify::OutputClassifier;
use crate::job::JobRequest;
use crate::media::{AudioTrack, CropRect, ScanType, VideoStreamInfo};
use crate::orchestrate::is_format_supported;
use crate::params::{FilterChainSpec, ParameterModel};
use crate::postproc;
use crate::sched::SharedScheduling;
use crate::status::SharedJobStatus;
use crate::supervise::{ProcessState, ProcessSupervisor, SupervisorError};
use convertd_config::{BackendFragments, ConversionConfig, Profile};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for conversion attempts
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Source format matches the backend's unsupported list.
    #[error("Source format unsupported by this backend: {0}")]
    UnsupportedFormat(String),

    /// Backend executable missing; nothing was spawned.
    #[error("Application not found: {0}")]
    ApplicationNotFound(PathBuf),

    /// OS failed to spawn the encoder.
    #[error("Failed to launch encoder: {0}")]
    LaunchFailure(String),

    /// No output within the hang budget.
    #[error("process hung")]
    ProcessHung,

    /// External cancellation; fatal to the whole job.
    #[error("conversion cancelled")]
    ProcessCancelled,

    /// The tool reported failure or never confirmed success.
    #[error("Tool reported failure: {0}")]
    ToolReportedFailure(String),

    /// Remux to the target container failed after a successful encode.
    #[error("Remux failed: {0}")]
    RemuxFailure(String),

    /// Audio delay correction failed after a successful encode.
    #[error("Audio delay fix failed: {0}")]
    AudioDelayFixFailure(String),

    /// IO error around the conversion (temp dirs, output validation).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SupervisorError> for ConvertError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::ApplicationNotFound(p) => ConvertError::ApplicationNotFound(p),
            SupervisorError::Launch(e) => ConvertError::LaunchFailure(e.to_string()),
        }
    }
}

/// Where a backend wants the DRC setting placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrcPlacement {
    /// Before the input clause.
    PreInput,
    /// After the main audio parameters.
    PostParams,
    /// Backend has no DRC control.
    Off,
}

/// One encoder pass of a possibly multi-pass invocation.
#[derive(Debug, Clone)]
pub struct PassSpec {
    pub number: u32,
    pub total: u32,
    pub log_file: PathBuf,
}

/// Per-backend hook set consumed by the shared pipeline driver.
///
/// Each hook performs one structural mutation on the shared parameter model
/// in the backend's own vocabulary; the driver owns ordering, gating, and
/// the math.
pub trait BackendHooks: Send + Sync {
    fn name(&self) -> &'static str;
    fn executable(&self) -> &'static str;
    /// Filter-chain keys of this tool's command line.
    fn chains(&self) -> &'static [FilterChainSpec];

    /// True for the remux-only backend: filter and quality steps are skipped.
    fn stream_copy(&self) -> bool {
        false
    }

    /// Whether the profile fragments put this invocation in constant-quality
    /// mode (resolution-independent, no bitrate compensation).
    fn constant_quality(&self, _model: &ParameterModel) -> bool {
        false
    }

    /// (worst, best) ends of the constant-quality scale.
    fn quality_bounds(&self) -> (f64, f64) {
        (51.0, 0.0)
    }

    /// Output width must be divisible by this.
    fn width_divisor(&self) -> u32 {
        16
    }

    /// Output height must be divisible by this.
    fn height_divisor(&self) -> u32 {
        8
    }

    fn drc_placement(&self) -> DrcPlacement {
        DrcPlacement::Off
    }

    /// Number of sequential encoder invocations for a two-pass profile.
    /// Tools that handle both passes in one invocation return 1.
    fn pass_count(&self, _two_pass: bool) -> u32 {
        1
    }

    fn set_input(&self, model: &mut ParameterModel, source: &Path);
    fn set_trim(&self, model: &mut ParameterModel, start: Option<f64>, duration: Option<f64>);
    fn set_deinterlace(&self, model: &mut ParameterModel, scan: ScanType);
    fn set_crop(&self, model: &mut ParameterModel, crop: &CropRect, src_w: u32, src_h: u32);
    fn set_resize(&self, model: &mut ParameterModel, width: u32, height: u32);
    fn set_aspect_fix(&self, model: &mut ParameterModel, width: u32, height: u32);

    /// Whether the profile already hard-codes an output width.
    fn preset_width(&self, model: &ParameterModel) -> bool;

    /// Scale bitrate (or rescale constant quality) to compensate for crop,
    /// resize, and the user's quality preference.
    fn adjust_quality(
        &self,
        model: &mut ParameterModel,
        resolution_factor: f64,
        user_multiplier: f64,
    );

    fn frame_rate_set(&self, model: &ParameterModel) -> bool;
    fn set_frame_rate(&self, model: &mut ParameterModel, fps: &str);

    fn select_audio_track(
        &self,
        model: &mut ParameterModel,
        track: &AudioTrack,
        info: &VideoStreamInfo,
    );
    fn set_volume(&self, model: &mut ParameterModel, db: f64);
    fn set_drc(&self, model: &mut ParameterModel);
    fn set_audio_channels(&self, model: &mut ParameterModel, channels: u32);

    /// Per-codec channel cap for the audio codec the fragments select.
    fn max_audio_channels(&self, _model: &ParameterModel) -> Option<u32> {
        None
    }

    /// Append the commercial cut list; tools without EDL support ignore it.
    fn set_edl(&self, _model: &mut ParameterModel, _edl: &Path) {}

    /// Wire output target and pass bookkeeping for one invocation.
    fn configure_pass(
        &self,
        model: &mut ParameterModel,
        pass: &PassSpec,
        two_pass: bool,
        output: &Path,
    );

    fn classifier(
        &self,
        status: SharedJobStatus,
        duration_secs: f64,
    ) -> Box<dyn OutputClassifier + Send>;

    /// Video codecs known to distort pixel aspect ratio after cropping.
    fn aspect_sensitive_codecs(&self) -> &'static [&'static str] {
        &["mpeg4", "xvid", "divx", "msmpeg4"]
    }
}

/// Shared pipeline driver: one instance per backend attempt.
pub struct ConversionPipeline<'a> {
    pub backend: &'a dyn BackendHooks,
    pub profile: &'a Profile,
    pub fragments: &'a BackendFragments,
    pub conversion: &'a ConversionConfig,
    pub output_dir: &'a Path,
    pub temp_dir: &'a Path,
    pub status: SharedJobStatus,
    pub control: SharedScheduling,
}

impl<'a> ConversionPipeline<'a> {
    /// Runs the full fixed-order conversion for one backend.
    ///
    /// Returns the final output path, or the error that aborted the attempt;
    /// the fallback orchestrator decides whether another backend gets a try.
    pub async fn convert(
        &self,
        job: &JobRequest,
        info: &VideoStreamInfo,
    ) -> Result<PathBuf, ConvertError> {
        let backend = self.backend;

        // Source-format compatibility comes first: reject before any work.
        if !is_format_supported(info, &self.fragments.unsupported) {
            return Err(ConvertError::UnsupportedFormat(format!(
                "{}+{} in {}",
                info.video_codec,
                info.audio_tracks
                    .first()
                    .map(|t| t.codec_name.as_str())
                    .unwrap_or("none"),
                info.container
            )));
        }

        let mut model = ParameterModel::new(backend.chains());
        model.append_fragment(&self.fragments.general);

        if self.profile.drc && backend.drc_placement() == DrcPlacement::PreInput {
            backend.set_drc(&mut model);
        }

        backend.set_input(&mut model, &job.source);
        model.append_fragment(&self.fragments.video);

        let preset_width = self.profile.fixed_resolution || backend.preset_width(&model);

        // Trim, sanity-checked against the source duration.
        let (trim_start, trim_duration) =
            sanitize_trim(
                job.options.trim_start_secs,
                job.options.trim_duration_secs,
                info.duration_secs,
            );
        if trim_start.is_some() || trim_duration.is_some() {
            backend.set_trim(&mut model, trim_start, trim_duration);
        }

        if !backend.stream_copy() {
            if matches!(info.scan_type, ScanType::Interlaced | ScanType::Telecine) {
                backend.set_deinterlace(&mut model, info.scan_type);
            }

            if !self.profile.skip_cropping {
                if let Some(crop) = info.crop {
                    if crop.width < info.width || crop.height < info.height {
                        backend.set_crop(&mut model, &crop, info.width, info.height);
                    }
                }
            }
        }

        let cropped_width = if self.profile.skip_cropping || backend.stream_copy() {
            info.width
        } else {
            info.cropped_width()
        };
        let cropped_height = if self.profile.skip_cropping || backend.stream_copy() {
            info.height
        } else {
            info.cropped_height()
        };

        let mut final_width = cropped_width;
        let mut final_height = cropped_height;
        if !backend.stream_copy() && !preset_width && cropped_width > self.conversion.max_width {
            let (w, h) = compute_resize(
                cropped_width,
                cropped_height,
                self.conversion.max_width,
                backend.width_divisor(),
                backend.height_divisor(),
            );
            backend.set_resize(&mut model, w, h);
            final_width = w;
            final_height = h;
        }

        if !backend.stream_copy() && fragment_mentions_codec(
            &self.fragments.video,
            backend.aspect_sensitive_codecs(),
        ) && info.crop.is_some()
        {
            backend.set_aspect_fix(&mut model, final_width, final_height);
        }

        if !backend.stream_copy() {
            let factor = resolution_factor(cropped_width, self.conversion.max_width);
            backend.adjust_quality(&mut model, factor, self.conversion.quality_multiplier);
        }

        if let Some(fps) = &job.options.frame_rate {
            if !backend.frame_rate_set(&model) {
                backend.set_frame_rate(&mut model, fps);
            }
        }

        model.append_fragment(&self.fragments.audio);

        let selected_track = if info.audio_tracks.len() > 1
            && (job.options.audio_language.is_some() || job.options.select_best_audio)
        {
            info.select_audio_track(job.options.audio_language.as_deref())
        } else {
            None
        };
        if let Some(track) = selected_track {
            backend.select_audio_track(&mut model, track, info);
        }

        if job.options.volume_db.abs() > 0.01 && !backend.stream_copy() {
            backend.set_volume(&mut model, job.options.volume_db);
        }

        if self.profile.drc && backend.drc_placement() == DrcPlacement::PostParams {
            backend.set_drc(&mut model);
        }

        if !backend.stream_copy() {
            if job.options.stereo {
                backend.set_audio_channels(&mut model, 2);
            } else {
                let source_channels = selected_track
                    .or_else(|| info.audio_tracks.first())
                    .map(|t| t.channels)
                    .unwrap_or(0);
                if let Some(cap) = backend.max_audio_channels(&model) {
                    if source_channels > cap {
                        backend.set_audio_channels(&mut model, cap);
                    }
                }
            }
        }

        if job.options.commercials_found {
            if let Some(edl) = &job.options.edl_path {
                backend.set_edl(&mut model, edl);
            }
        }

        std::fs::create_dir_all(self.temp_dir)?;
        let work_path = self.work_path(&job.source);

        substitute_templates(&mut model, &job.source, &work_path);
        fixup_stream_maps(&mut model, info, selected_track);

        let duration = trim_duration.unwrap_or(info.duration_secs);
        let supervisor = ProcessSupervisor::new(self.status.clone(), self.control.clone());

        let passes = backend.pass_count(self.profile.two_pass);
        for pass_number in 1..=passes {
            let mut pass_model = model.clone();
            let pass = PassSpec {
                number: pass_number,
                total: passes,
                log_file: self.temp_dir.join(format!("{}.passlog", job.id)),
            };
            backend.configure_pass(&mut pass_model, &pass, self.profile.two_pass, &work_path);

            if passes > 1 {
                self.status.set_action(format!(
                    "Converting with {} (pass {} of {})",
                    backend.name(),
                    pass_number,
                    passes
                ));
            } else {
                self.status
                    .set_action(format!("Converting with {}", backend.name()));
            }

            let arg_string = pass_model.to_arg_string();
            debug!(backend = backend.name(), pass = pass_number, args = %arg_string, "encoder invocation");

            let classifier = backend.classifier(self.status.clone(), duration);
            let outcome = supervisor
                .run(
                    backend.executable(),
                    &arg_string,
                    self.conversion.hang_period_secs,
                    false,
                    classifier,
                )
                .await?;

            if !outcome.success {
                return Err(match outcome.terminal {
                    ProcessState::Hung => ConvertError::ProcessHung,
                    ProcessState::Cancelled => ConvertError::ProcessCancelled,
                    _ => ConvertError::ToolReportedFailure(self.status.snapshot().error_msg),
                });
            }
        }

        // The encoder exited happily; make sure it actually wrote something.
        let metadata = std::fs::metadata(&work_path).map_err(|_| {
            ConvertError::ToolReportedFailure("output file missing after encode".to_string())
        })?;
        if metadata.len() == 0 {
            let _ = std::fs::remove_file(&work_path);
            return Err(ConvertError::ToolReportedFailure(
                "output file empty after encode".to_string(),
            ));
        }

        // Post-processing: audio delay correction, then remux to the target
        // container. Both still fail the attempt after a successful encode.
        let mut current = work_path;
        if info.audio_delay_secs.abs() > 0.01 && !backend.stream_copy() {
            self.status.set_action("Correcting audio delay");
            current = postproc::fix_audio_delay(
                &current,
                info.audio_delay_secs,
                &self.status,
                &self.control,
            )
            .await?;
        }

        if !self.fragments.remux_to.is_empty() {
            self.status
                .set_action(format!("Remuxing to {}", self.fragments.remux_to));
            current = postproc::remux_to_container(
                &current,
                &self.fragments.remux_to,
                &self.status,
                &self.control,
            )
            .await?;
        }

        let final_path = postproc::place_final(&current, self.output_dir)?;
        info!(backend = backend.name(), output = %final_path.display(), "conversion finished");
        Ok(final_path)
    }

    fn work_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let ext = if self.fragments.ext.is_empty() {
            source
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default()
        } else {
            self.fragments.ext.clone()
        };
        self.temp_dir.join(format!("{}{}", stem, ext))
    }
}

/// Drops trim values that exceed the source duration.
pub fn sanitize_trim(
    start: Option<f64>,
    duration: Option<f64>,
    source_duration: f64,
) -> (Option<f64>, Option<f64>) {
    let start = match start {
        Some(s) if s > 0.0 && (source_duration <= 0.0 || s < source_duration) => Some(s),
        Some(s) if s > 0.0 => {
            warn!(start = s, source_duration, "trim start exceeds source duration, ignoring");
            None
        }
        _ => None,
    };

    let duration = match duration {
        Some(d) if d > 0.0 => {
            let offset = start.unwrap_or(0.0);
            if source_duration > 0.0 && offset + d > source_duration {
                warn!(duration = d, source_duration, "trim end exceeds source duration, ignoring");
                None
            } else {
                Some(d)
            }
        }
        _ => None,
    };

    (start, duration)
}

/// Rounds output dimensions down to the backend's block alignment while
/// preserving aspect ratio against the post-crop source.
pub fn compute_resize(
    src_width: u32,
    src_height: u32,
    max_width: u32,
    width_divisor: u32,
    height_divisor: u32,
) -> (u32, u32) {
    let width_divisor = width_divisor.max(1);
    let height_divisor = height_divisor.max(1);

    let width = round_down_to(max_width, width_divisor).max(width_divisor);
    let scaled_height = (src_height as u64 * width as u64 / src_width.max(1) as u64) as u32;
    let height = round_down_to(scaled_height, height_divisor).max(height_divisor);
    (width, height)
}

fn round_down_to(value: u32, divisor: u32) -> u32 {
    value / divisor * divisor
}

/// Resolution part of the bitrate compensation:
/// `finalWidth / referenceWidth`, where finalWidth is the narrower of the
/// post-crop width and the configured maximum, and the reference is the
/// configured maximum.
pub fn resolution_factor(cropped_width: u32, max_width: u32) -> f64 {
    if max_width == 0 {
        return 1.0;
    }
    let final_width = cropped_width.min(max_width);
    final_width as f64 / max_width as f64
}

/// Rescales a constant-quality value toward the scale's best or worst end,
/// proportional to how far the multiplier deviates from 1.0, clamped to the
/// scale.
pub fn rescale_constant_quality(quality: f64, worst: f64, best: f64, multiplier: f64) -> f64 {
    let moved = if multiplier >= 1.0 {
        quality + (multiplier - 1.0) * (best - quality)
    } else {
        quality + (1.0 - multiplier) * (worst - quality)
    };
    let (lo, hi) = if worst <= best {
        (worst, best)
    } else {
        (best, worst)
    };
    moved.clamp(lo, hi)
}

/// Scales a bitrate value string ("1800k", "2500000") by a factor, keeping
/// the suffix.
pub fn scale_bitrate_value(value: &str, factor: f64) -> Option<String> {
    let split = value
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    let parsed: f64 = number.parse().ok()?;
    let scaled = (parsed * factor).round().max(1.0);
    Some(format!("{}{}", scaled as u64, suffix))
}

fn fragment_mentions_codec(fragment: &str, codecs: &[&str]) -> bool {
    let lower = fragment.to_lowercase();
    codecs.iter().any(|codec| lower.contains(codec))
}

/// Substitutes user template tokens into every parameter value.
fn substitute_templates(model: &mut ParameterModel, source: &Path, output: &Path) {
    let source_str = source.to_string_lossy().to_string();
    let output_str = output.to_string_lossy().to_string();
    let source_noext = source.with_extension("").to_string_lossy().to_string();
    let output_noext = output.with_extension("").to_string_lossy().to_string();

    model.substitute_tokens(&[
        ("<source>", source_str.as_str()),
        ("<output>", output_str.as_str()),
        ("<source_noext>", source_noext.as_str()),
        ("<output_noext>", output_noext.as_str()),
    ]);
}

/// Replaces stream-mapping placeholders with concrete indices and drops
/// mappings whose stream does not exist in the source.
fn fixup_stream_maps(
    model: &mut ParameterModel,
    info: &VideoStreamInfo,
    selected_track: Option<&AudioTrack>,
) {
    let video = format!("0:{}", info.video_stream_index);
    let audio = selected_track
        .map(|t| t.stream_index)
        .or_else(|| info.audio_tracks.first().map(|t| t.stream_index))
        .map(|idx| format!("0:{}", idx));
    let subtitle = info
        .subtitle_stream_indices
        .first()
        .map(|idx| format!("0:{}", idx));

    model.map_pair_values("-map", |value| match value {
        "<video>" => video.clone(),
        "<audio>" => audio.clone().unwrap_or_else(|| value.to_string()),
        "<subtitle>" => subtitle.clone().unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    });
    model.retain_pairs("-map", |value| {
        value != "<audio>" && value != "<subtitle>" && value != "<video>"
    });
}
