//! Encoder backend implementations for convertd
//!
//! One [`BackendHooks`] implementation per wrapped tool. The registry maps
//! configured backend names to their singleton instances in the order the
//! configuration asks for.

mod copy;
mod ffmpeg;
mod handbrake;
mod mencoder;

pub use copy::CopyBackend;
pub use ffmpeg::FfmpegBackend;
pub use handbrake::HandbrakeBackend;
pub use mencoder::MencoderBackend;

use crate::pipeline::BackendHooks;
use tracing::warn;

pub static COPY: CopyBackend = CopyBackend;
pub static FFMPEG: FfmpegBackend = FfmpegBackend;
pub static MENCODER: MencoderBackend = MencoderBackend;
pub static HANDBRAKE: HandbrakeBackend = HandbrakeBackend;

/// Looks up a backend by its configuration name.
pub fn by_name(name: &str) -> Option<&'static dyn BackendHooks> {
    match name {
        "copy" => Some(&COPY),
        "ffmpeg" => Some(&FFMPEG),
        "mencoder" => Some(&MENCODER),
        "handbrake" => Some(&HANDBRAKE),
        _ => None,
    }
}

/// Resolves a configured backend order into instances, dropping (and
/// logging) unknown names.
pub fn resolve_order(order: &[String]) -> Vec<&'static dyn BackendHooks> {
    order
        .iter()
        .filter_map(|name| {
            let backend = by_name(name);
            if backend.is_none() {
                warn!(backend = name.as_str(), "unknown backend name in configuration");
            }
            backend
        })
        .collect()
}
