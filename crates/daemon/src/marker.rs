//! Sidecar marker module for convertd
//!
//! Converted sources get a `.converted` sidecar so rescans leave them alone;
//! jobs that exhaust every backend can leave a `.why.txt` sidecar naming the
//! final error.

use std::io;
use std::path::{Path, PathBuf};

/// Constructs the converted-marker path for a source file:
/// `/media/show.ts` -> `/media/show.ts.converted`.
pub fn converted_marker_path(source: &Path) -> PathBuf {
    let mut marker = source.as_os_str().to_owned();
    marker.push(".converted");
    PathBuf::from(marker)
}

/// Whether the source already carries a converted marker.
pub fn has_converted_marker(source: &Path) -> bool {
    converted_marker_path(source).exists()
}

/// Writes the converted marker next to the source file.
pub fn write_converted_marker(source: &Path) -> io::Result<()> {
    std::fs::write(converted_marker_path(source), b"")
}

/// Writes a `.why.txt` sidecar explaining why conversion failed, when
/// enabled.
pub fn write_why_sidecar(source: &Path, reason: &str, enabled: bool) -> io::Result<()> {
    if !enabled {
        return Ok(());
    }
    let mut sidecar = source.as_os_str().to_owned();
    sidecar.push(".why.txt");
    std::fs::write(PathBuf::from(sidecar), reason.as_bytes())
}
