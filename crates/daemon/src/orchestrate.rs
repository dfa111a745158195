//! Fallback orchestration module for convertd
//!
//! Tries a configured, ordered list of encoder backends until one converts
//! the job. A profile can blacklist source format combinations per backend
//! ("mpeg2video+ac3+ts"); the pre-filter expands the source's
//! container/codec tokens into every subset and ordering so one blacklist
//! entry matches however it was written. Cancellation stops the whole loop;
//! any other failure moves on to the next backend, keeping only the most
//! recent error message.

use crate::job::JobRequest;
use crate::media::VideoStreamInfo;
use crate::pipeline::{BackendHooks, ConversionPipeline, ConvertError};
use crate::sched::SharedScheduling;
use crate::status::SharedJobStatus;
use convertd_config::{ConversionConfig, Profile};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Expands the source's format tokens (container, video codec, audio codecs)
/// into every non-empty combination: all subsets, all orderings, joined with
/// `+`, lowercased.
pub fn format_combinations(info: &VideoStreamInfo) -> HashSet<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in std::iter::once(info.container.as_str())
        .chain(std::iter::once(info.video_codec.as_str()))
        .chain(info.audio_tracks.iter().map(|t| t.codec_name.as_str()))
    {
        let token = raw.trim().to_lowercase();
        if !token.is_empty() && !tokens.contains(&token) {
            tokens.push(token);
        }
    }

    let mut combinations = HashSet::new();
    let mut used = vec![false; tokens.len()];
    let mut current: Vec<&str> = Vec::new();
    permute(&tokens, &mut used, &mut current, &mut combinations);
    combinations
}

fn permute<'a>(
    tokens: &'a [String],
    used: &mut Vec<bool>,
    current: &mut Vec<&'a str>,
    out: &mut HashSet<String>,
) {
    for i in 0..tokens.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        current.push(tokens[i].as_str());
        out.insert(current.join("+"));
        permute(tokens, used, current, out);
        current.pop();
        used[i] = false;
    }
}

/// Whether a backend may be used for this source, given its profile-declared
/// unsupported list.
pub fn is_format_supported(info: &VideoStreamInfo, unsupported: &[String]) -> bool {
    if unsupported.is_empty() {
        return true;
    }
    let combinations = format_combinations(info);
    !unsupported
        .iter()
        .any(|entry| combinations.contains(&entry.trim().to_lowercase()))
}

/// Iterates backends in order until one succeeds.
pub struct FallbackOrchestrator<'a> {
    pub profile: &'a Profile,
    pub conversion: &'a ConversionConfig,
    pub output_dir: &'a Path,
    pub temp_dir: &'a Path,
    pub status: SharedJobStatus,
    pub control: SharedScheduling,
}

impl<'a> FallbackOrchestrator<'a> {
    /// Runs the job against the ordered backend list, returning the first
    /// successful output path.
    ///
    /// Backends whose profile declares the source unsupported are skipped
    /// without an attempt. Cancellation aborts immediately with no further
    /// attempts. When every backend fails, the last error is returned (and
    /// left on the job status); earlier failures are expected and only
    /// logged.
    pub async fn run(
        &self,
        job: &JobRequest,
        info: &VideoStreamInfo,
        backends: &[&dyn BackendHooks],
    ) -> Result<PathBuf, ConvertError> {
        let mut last_error: Option<ConvertError> = None;

        for backend in backends {
            if self.status.is_cancelled() {
                self.status.set_error("conversion cancelled");
                return Err(ConvertError::ProcessCancelled);
            }

            let fragments = match self.profile.fragments(backend.name()) {
                Some(f) => f,
                None => {
                    debug!(
                        backend = backend.name(),
                        profile = %self.profile.name,
                        "no fragments configured, skipping backend"
                    );
                    continue;
                }
            };

            if !is_format_supported(info, &fragments.unsupported) {
                info!(
                    backend = backend.name(),
                    container = %info.container,
                    video_codec = %info.video_codec,
                    "source format blacklisted for backend, skipping"
                );
                last_error = Some(ConvertError::UnsupportedFormat(format!(
                    "{} cannot handle {}/{}",
                    backend.name(),
                    info.container,
                    info.video_codec
                )));
                continue;
            }

            // Fresh attempt: earlier errors are benign.
            self.status.clear_error();

            let pipeline = ConversionPipeline {
                backend: *backend,
                profile: self.profile,
                fragments,
                conversion: self.conversion,
                output_dir: self.output_dir,
                temp_dir: self.temp_dir,
                status: self.status.clone(),
                control: self.control.clone(),
            };

            match pipeline.convert(job, info).await {
                Ok(path) => {
                    info!(backend = backend.name(), job = %job.id, "backend succeeded");
                    return Ok(path);
                }
                Err(ConvertError::ProcessCancelled) => {
                    return Err(ConvertError::ProcessCancelled);
                }
                Err(e) => {
                    warn!(backend = backend.name(), job = %job.id, error = %e, "backend failed, trying next");
                    self.status.set_error(e.to_string());
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            ConvertError::UnsupportedFormat("no usable backend for this source".to_string())
        });
        self.status.set_error(error.to_string());
        Err(error)
    }
}
