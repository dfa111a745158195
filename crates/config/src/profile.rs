//! Conversion profile definitions
//!
//! A profile names a target format and carries one opaque command-line
//! fragment set per encoder backend. The daemon treats fragment strings as
//! opaque except where it must locate or replace a known parameter inside
//! them.

use serde::{Deserialize, Serialize};

/// Per-backend command-line fragments and format lists
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BackendFragments {
    /// General parameters appended before the input clause
    #[serde(default)]
    pub general: String,
    /// Video parameters appended verbatim
    #[serde(default)]
    pub video: String,
    /// Audio parameters appended verbatim
    #[serde(default)]
    pub audio: String,
    /// Output file extension this backend produces (e.g. ".mp4")
    #[serde(default)]
    pub ext: String,
    /// Container to remux to after encoding ("" = keep native container)
    #[serde(default)]
    pub remux_to: String,
    /// Source format combinations this backend must not be used for,
    /// written as "container+vcodec+acodec" tokens in any order
    #[serde(default)]
    pub unsupported: Vec<String>,
}

/// A named conversion target with per-backend fragments
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Profile {
    /// Profile name referenced by jobs
    pub name: String,
    /// Backend attempt order override (falls back to the global order)
    #[serde(default)]
    pub backend_order: Option<Vec<String>>,
    /// Profile hard-codes the output resolution; automatic resize is skipped
    #[serde(default)]
    pub fixed_resolution: bool,
    /// Run two encoding passes where the backend supports it
    #[serde(default)]
    pub two_pass: bool,
    /// Never insert a crop filter for this profile
    #[serde(default)]
    pub skip_cropping: bool,
    /// Apply audio dynamic range compression
    #[serde(default)]
    pub drc: bool,
    #[serde(default)]
    pub copy: Option<BackendFragments>,
    #[serde(default)]
    pub ffmpeg: Option<BackendFragments>,
    #[serde(default)]
    pub mencoder: Option<BackendFragments>,
    #[serde(default)]
    pub handbrake: Option<BackendFragments>,
}

impl Profile {
    /// Fragments for the named backend, if the profile configures it
    pub fn fragments(&self, backend: &str) -> Option<&BackendFragments> {
        match backend {
            "copy" => self.copy.as_ref(),
            "ffmpeg" => self.ffmpeg.as_ref(),
            "mencoder" => self.mencoder.as_ref(),
            "handbrake" => self.handbrake.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_parses_fragments() {
        let toml_str = r#"
name = "mp4-normal"
two_pass = true
skip_cropping = false

[ffmpeg]
general = "-y -threads 0"
video = "-c:v libx264 -b:v 1800k"
audio = "-c:a aac -b:a 160k"
ext = ".mp4"
remux_to = ""
unsupported = ["mpeg2video+ac3+ts"]

[handbrake]
general = ""
video = "-e x264 -q 21"
audio = "-E av_aac"
ext = ".mp4"
"#;
        let profile: Profile = toml::from_str(toml_str).expect("profile should parse");

        assert_eq!(profile.name, "mp4-normal");
        assert!(profile.two_pass);
        assert!(!profile.skip_cropping);
        assert!(!profile.fixed_resolution);

        let ffmpeg = profile.fragments("ffmpeg").expect("ffmpeg fragments");
        assert_eq!(ffmpeg.general, "-y -threads 0");
        assert_eq!(ffmpeg.video, "-c:v libx264 -b:v 1800k");
        assert_eq!(ffmpeg.ext, ".mp4");
        assert_eq!(ffmpeg.unsupported, vec!["mpeg2video+ac3+ts"]);

        assert!(profile.fragments("handbrake").is_some());
        assert!(profile.fragments("mencoder").is_none());
        assert!(profile.fragments("copy").is_none());
        assert!(profile.fragments("unknown").is_none());
    }

    #[test]
    fn test_profile_defaults() {
        let profile: Profile = toml::from_str(r#"name = "bare""#).expect("should parse");

        assert_eq!(profile.name, "bare");
        assert!(profile.backend_order.is_none());
        assert!(!profile.two_pass);
        assert!(!profile.drc);
        assert!(profile.ffmpeg.is_none());
    }
}
