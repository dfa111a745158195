//! Post-processing module for convertd
//!
//! Steps that run after a technically successful encode: correcting residual
//! audio/video delay, remuxing to the profile's target container, and moving
//! the finished file into the output directory. Failures here still fail
//! the backend attempt.

use crate::classify::CopyClassifier;
use crate::pipeline::ConvertError;
use crate::sched::SharedScheduling;
use crate::status::SharedJobStatus;
use crate::supervise::ProcessSupervisor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Containers that can carry a per-stream offset through a plain remux.
const OFFSET_CAPABLE_CONTAINERS: &[&str] = &["mp4", "m4v", "mkv", "mov"];

/// Builds the argument line that corrects audio delay on `file`, writing to
/// `shifted`.
///
/// Offset-capable containers get a pure stream remux with the audio input
/// offset; anything else re-encodes the audio to absorb the shift. Positive
/// delay means the audio runs late, so the audio input is advanced.
pub fn build_delay_fix_args(file: &Path, shifted: &Path, delay_secs: f64) -> String {
    let ext = extension_of(file);
    let offset = -delay_secs;

    let codec = if OFFSET_CAPABLE_CONTAINERS.contains(&ext.as_str()) {
        "-c copy"
    } else {
        "-c:v copy -c:a aac"
    };

    format!(
        "-y -i {} -itsoffset {:.3} -i {} -map 0:v:0 -map 1:a:0 {} {}",
        file.display(),
        offset,
        file.display(),
        codec,
        shifted.display()
    )
}

/// Builds the argument line that remuxes `file` into `target`.
pub fn build_remux_args(file: &Path, target: &Path) -> String {
    format!("-y -i {} -c copy {}", file.display(), target.display())
}

/// Corrects residual audio/video delay in place.
///
/// The shifted copy replaces the original file; the returned path equals the
/// input path. Runs ffmpeg under supervision with the suspend signal
/// ignored: housekeeping should finish even while encoding is paused.
pub async fn fix_audio_delay(
    file: &Path,
    delay_secs: f64,
    status: &SharedJobStatus,
    control: &SharedScheduling,
) -> Result<PathBuf, ConvertError> {
    let shifted = sibling_with_tag(file, "sync");
    let args = build_delay_fix_args(file, &shifted, delay_secs);
    debug!(file = %file.display(), delay_secs, "correcting audio delay");

    let supervisor = ProcessSupervisor::new(status.clone(), control.clone());
    let classifier = Box::new(CopyClassifier::new(status.clone(), 0.0));
    let outcome = supervisor
        .run("ffmpeg", &args, 0, true, classifier)
        .await
        .map_err(|e| ConvertError::AudioDelayFixFailure(e.to_string()))?;

    if !outcome.success {
        let _ = std::fs::remove_file(&shifted);
        return Err(ConvertError::AudioDelayFixFailure(
            status.snapshot().error_msg,
        ));
    }

    std::fs::rename(&shifted, file)
        .map_err(|e| ConvertError::AudioDelayFixFailure(e.to_string()))?;
    Ok(file.to_path_buf())
}

/// Remuxes the encoded file into the profile's target container.
///
/// The original file is removed on success; the returned path carries the
/// new extension.
pub async fn remux_to_container(
    file: &Path,
    target_container: &str,
    status: &SharedJobStatus,
    control: &SharedScheduling,
) -> Result<PathBuf, ConvertError> {
    let target_ext = target_container.trim_start_matches('.');
    if extension_of(file) == target_ext {
        return Ok(file.to_path_buf());
    }

    let target = file.with_extension(target_ext);
    let args = build_remux_args(file, &target);
    debug!(file = %file.display(), target = %target.display(), "remuxing to target container");

    let supervisor = ProcessSupervisor::new(status.clone(), control.clone());
    let classifier = Box::new(CopyClassifier::new(status.clone(), 0.0));
    let outcome = supervisor
        .run("ffmpeg", &args, 0, true, classifier)
        .await
        .map_err(|e| ConvertError::RemuxFailure(e.to_string()))?;

    if !outcome.success {
        let _ = std::fs::remove_file(&target);
        return Err(ConvertError::RemuxFailure(status.snapshot().error_msg));
    }

    let _ = std::fs::remove_file(file);
    Ok(target)
}

/// Moves the finished file into the output directory.
///
/// Rename first (fast, same filesystem), copy-and-delete as the fallback for
/// cross-filesystem moves.
pub fn place_final(work_file: &Path, output_dir: &Path) -> Result<PathBuf, ConvertError> {
    std::fs::create_dir_all(output_dir)?;
    let file_name = work_file
        .file_name()
        .ok_or_else(|| ConvertError::Io(std::io::Error::other("work file has no name")))?;
    let destination = output_dir.join(file_name);

    if std::fs::rename(work_file, &destination).is_err() {
        std::fs::copy(work_file, &destination)?;
        std::fs::remove_file(work_file)?;
    }

    info!(output = %destination.display(), "output placed");
    Ok(destination)
}

fn extension_of(file: &Path) -> String {
    file.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn sibling_with_tag(file: &Path, tag: &str) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = extension_of(file);
    let name = if ext.is_empty() {
        format!("{}.{}", stem, tag)
    } else {
        format!("{}.{}.{}", stem, tag, ext)
    };
    file.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_fix_args_remux_for_mp4() {
        let args = build_delay_fix_args(
            Path::new("/tmp/show.mp4"),
            Path::new("/tmp/show.sync.mp4"),
            0.5,
        );
        assert!(args.contains("-itsoffset -0.500"));
        assert!(args.contains("-map 0:v:0"));
        assert!(args.contains("-map 1:a:0"));
        assert!(args.contains("-c copy"));
        assert!(!args.contains("-c:a aac"));
    }

    #[test]
    fn test_delay_fix_args_reencode_for_other_containers() {
        let args = build_delay_fix_args(
            Path::new("/tmp/show.avi"),
            Path::new("/tmp/show.sync.avi"),
            -0.25,
        );
        // Audio early: the offset delays it.
        assert!(args.contains("-itsoffset 0.250"));
        assert!(args.contains("-c:v copy -c:a aac"));
    }

    #[test]
    fn test_remux_args() {
        let args = build_remux_args(Path::new("/tmp/show.mkv"), Path::new("/tmp/show.mp4"));
        assert_eq!(args, "-y -i /tmp/show.mkv -c copy /tmp/show.mp4");
    }

    #[test]
    fn test_sibling_with_tag() {
        assert_eq!(
            sibling_with_tag(Path::new("/tmp/show.mp4"), "sync"),
            PathBuf::from("/tmp/show.sync.mp4")
        );
        assert_eq!(
            sibling_with_tag(Path::new("/tmp/show"), "sync"),
            PathBuf::from("/tmp/show.sync")
        );
    }

    #[test]
    fn test_place_final_moves_file() {
        let work_dir = tempfile::tempdir().expect("tempdir");
        let out_dir = tempfile::tempdir().expect("tempdir");

        let work_file = work_dir.path().join("show.mp4");
        std::fs::write(&work_file, b"encoded data").expect("write");

        let placed = place_final(&work_file, out_dir.path()).expect("place");

        assert_eq!(placed, out_dir.path().join("show.mp4"));
        assert!(!work_file.exists());
        assert_eq!(std::fs::read(&placed).expect("read"), b"encoded data");
    }

    #[test]
    fn test_place_final_creates_output_dir() {
        let work_dir = tempfile::tempdir().expect("tempdir");
        let out_root = tempfile::tempdir().expect("tempdir");
        let nested = out_root.path().join("a/b");

        let work_file = work_dir.path().join("show.mp4");
        std::fs::write(&work_file, b"x").expect("write");

        let placed = place_final(&work_file, &nested).expect("place");
        assert!(placed.exists());
        assert_eq!(placed.parent(), Some(nested.as_path()));
    }
}
