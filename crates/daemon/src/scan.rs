//! Watch-folder scanner module for convertd
//!
//! Recursively walks the configured watch roots for recordings to convert,
//! filtering by video extension and skipping anything already carrying a
//! `.converted` sidecar. Hidden directories are ignored wholesale.

use crate::marker::has_converted_marker;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Source file extensions the scanner picks up (case-insensitive).
pub const SOURCE_EXTENSIONS: &[&str] = &[
    ".ts", ".m2ts", ".mpg", ".mpeg", ".wtv", ".mkv", ".mp4", ".avi", ".mov",
];

/// A source recording discovered during a scan.
#[derive(Debug, Clone)]
pub struct ScanCandidate {
    /// Full path to the source file.
    pub path: PathBuf,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
    /// Last modified time of the file.
    pub modified_time: SystemTime,
}

/// Whether a file has a convertible source extension (case-insensitive).
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let dotted = format!(".{}", ext.to_lowercase());
            SOURCE_EXTENSIONS.contains(&dotted.as_str())
        })
        .unwrap_or(false)
}

/// Scans the watch roots for convertible recordings.
///
/// Hidden directories (leading `.`) are skipped below the root; files with
/// a `.converted` marker are excluded. Size and mtime are captured for the
/// stability check.
pub fn scan_watch_roots(roots: &[PathBuf]) -> Vec<ScanCandidate> {
    let mut candidates = Vec::new();

    for root in roots {
        if !root.exists() {
            continue;
        }

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            if entry.file_type().is_dir() && entry.depth() > 0 {
                if let Some(name) = entry.file_name().to_str() {
                    if name.starts_with('.') {
                        return false;
                    }
                }
            }
            true
        });

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !is_source_file(path) || has_converted_marker(path) {
                continue;
            }

            if let Ok(metadata) = entry.metadata() {
                candidates.push(ScanCandidate {
                    path: path.to_path_buf(),
                    size_bytes: metadata.len(),
                    modified_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                });
            }
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::write_converted_marker;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_is_source_file() {
        assert!(is_source_file(Path::new("/rec/show.ts")));
        assert!(is_source_file(Path::new("/rec/show.TS")));
        assert!(is_source_file(Path::new("/rec/show.WtV")));
        assert!(is_source_file(Path::new("/rec/show.mkv")));
        assert!(!is_source_file(Path::new("/rec/show.srt")));
        assert!(!is_source_file(Path::new("/rec/show.edl")));
        assert!(!is_source_file(Path::new("/rec/show")));
    }

    #[test]
    fn test_scan_skips_marked_and_hidden() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();

        let fresh = root.join("fresh.ts");
        File::create(&fresh).expect("create");

        let converted = root.join("done.ts");
        File::create(&converted).expect("create");
        write_converted_marker(&converted).expect("marker");

        let hidden_dir = root.join(".cache");
        fs::create_dir(&hidden_dir).expect("mkdir");
        let hidden = hidden_dir.join("hidden.ts");
        File::create(&hidden).expect("create");

        let not_video = root.join("notes.txt");
        File::create(&not_video).expect("create");

        let candidates = scan_watch_roots(&[root.to_path_buf()]);
        let paths: Vec<_> = candidates.iter().map(|c| c.path.clone()).collect();

        assert_eq!(paths, vec![fresh]);
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let candidates = scan_watch_roots(&[PathBuf::from("/no/such/watch/root")]);
        assert!(candidates.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        // Files under hidden directories are never returned; visible ones
        // always are.
        #[test]
        fn prop_hidden_directory_exclusion(
            visible_dir in "[a-zA-Z0-9]{1,10}",
            hidden_dir in "\\.[a-zA-Z0-9]{1,10}",
            name in "[a-zA-Z0-9]{1,10}",
        ) {
            let tmp = TempDir::new().unwrap();
            let root = tmp.path();

            let visible_path = root.join(&visible_dir);
            fs::create_dir_all(&visible_path).unwrap();
            let visible_file = visible_path.join(format!("{}.ts", name));
            File::create(&visible_file).unwrap();

            let hidden_path = root.join(&hidden_dir);
            fs::create_dir_all(&hidden_path).unwrap();
            let hidden_file = hidden_path.join(format!("{}.ts", name));
            File::create(&hidden_file).unwrap();

            let candidates = scan_watch_roots(&[root.to_path_buf()]);

            prop_assert!(candidates.iter().any(|c| c.path == visible_file));
            prop_assert!(!candidates.iter().any(|c| c.path == hidden_file));
        }

        // A converted marker always excludes its file from the scan.
        #[test]
        fn prop_converted_marker_exclusion(
            marked in "[a-zA-Z0-9]{1,10}",
            unmarked in "[a-zA-Z0-9]{1,10}",
        ) {
            prop_assume!(marked != unmarked);

            let tmp = TempDir::new().unwrap();
            let root = tmp.path();

            let marked_file = root.join(format!("{}.ts", marked));
            File::create(&marked_file).unwrap();
            write_converted_marker(&marked_file).unwrap();

            let unmarked_file = root.join(format!("{}.ts", unmarked));
            File::create(&unmarked_file).unwrap();

            let candidates = scan_watch_roots(&[root.to_path_buf()]);

            prop_assert!(!candidates.iter().any(|c| c.path == marked_file));
            prop_assert!(candidates.iter().any(|c| c.path == unmarked_file));
        }
    }
}
