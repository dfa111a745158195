//! File stability checking module for convertd
//!
//! A recording still being written must not be picked up. A file counts as
//! stable once its size is unchanged across a configurable wait window.

use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

/// Result of a stability check on a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityResult {
    /// File size remained unchanged during the wait window.
    Stable,
    /// File size changed during the wait window; still being written.
    Growing {
        /// Size when first checked.
        initial_size: u64,
        /// Size after waiting.
        current_size: u64,
    },
}

/// Waits `wait_secs`, then compares the file's size against the size
/// captured at discovery time.
pub async fn check_stability(
    path: &Path,
    initial_size: u64,
    wait_secs: u64,
) -> Result<StabilityResult, std::io::Error> {
    sleep(Duration::from_secs(wait_secs)).await;

    let metadata = tokio::fs::metadata(path).await?;
    Ok(compare_sizes(initial_size, metadata.len()))
}

/// Pure size comparison behind [`check_stability`].
#[inline]
pub fn compare_sizes(initial_size: u64, current_size: u64) -> StabilityResult {
    if initial_size == current_size {
        StabilityResult::Stable
    } else {
        StabilityResult::Growing {
            initial_size,
            current_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_stability_size_comparison(initial_size: u64, current_size: u64) {
            let result = compare_sizes(initial_size, current_size);

            if initial_size == current_size {
                prop_assert_eq!(result, StabilityResult::Stable);
            } else {
                match result {
                    StabilityResult::Growing { initial_size: i, current_size: c } => {
                        prop_assert_eq!(i, initial_size);
                        prop_assert_eq!(c, current_size);
                    }
                    StabilityResult::Stable => {
                        prop_assert!(false, "expected Growing when sizes differ");
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_check_stability_on_static_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("rec.ts");
        std::fs::write(&file, b"recording data").expect("write");

        let size = std::fs::metadata(&file).expect("meta").len();
        let result = check_stability(&file, size, 0).await.expect("check");
        assert_eq!(result, StabilityResult::Stable);
    }

    #[tokio::test]
    async fn test_check_stability_detects_growth() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("rec.ts");
        std::fs::write(&file, b"grown well past the original size").expect("write");

        let result = check_stability(&file, 4, 0).await.expect("check");
        assert!(matches!(result, StabilityResult::Growing { initial_size: 4, .. }));
    }

    #[tokio::test]
    async fn test_check_stability_missing_file_errors() {
        let result = check_stability(Path::new("/no/such/rec.ts"), 100, 0).await;
        assert!(result.is_err());
    }
}
