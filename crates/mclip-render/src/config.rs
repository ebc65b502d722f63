//! Render configuration.

use std::path::PathBuf;
use std::time::Duration;

use mclip_media::CompositeConfig;

/// Render pipeline configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Root directory for per-request scratch arenas
    pub work_dir: PathBuf,
    /// FFmpeg binary name or path
    pub ffmpeg_path: PathBuf,
    /// FFprobe binary name or path
    pub ffprobe_path: PathBuf,
    /// Timeout for extract, subtitle and audio stages
    pub stage_timeout: Duration,
    /// Timeout for the composite stage
    pub composite_timeout: Duration,
    /// Floor for disk-space pre-flight checks, in bytes
    pub min_free_bytes: u64,
    /// Minimum percent advance between composite progress events
    pub progress_step: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("mclip"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            stage_timeout: Duration::from_secs(3600), // 1 hour
            composite_timeout: Duration::from_secs(7200), // 2 hours
            min_free_bytes: 500 * 1024 * 1024,
            progress_step: 0.5,
        }
    }
}

impl RenderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            work_dir: lookup("MCLIP_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ffmpeg_path: lookup("MCLIP_FFMPEG")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: lookup("MCLIP_FFPROBE")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffprobe_path),
            stage_timeout: parsed("MCLIP_STAGE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stage_timeout),
            composite_timeout: parsed("MCLIP_COMPOSITE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.composite_timeout),
            min_free_bytes: parsed("MCLIP_MIN_FREE_MB")
                .map(|mb| mb.saturating_mul(1024 * 1024))
                .unwrap_or(defaults.min_free_bytes),
            progress_step: lookup("MCLIP_PROGRESS_STEP")
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|step| step.is_finite() && *step >= 0.0)
                .unwrap_or(defaults.progress_step),
        }
    }

    /// Settings for the composite stage.
    pub fn composite_config(&self) -> CompositeConfig {
        CompositeConfig {
            timeout: self.composite_timeout,
            min_free_bytes: self.min_free_bytes,
            progress_step: self.progress_step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> RenderConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RenderConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = from_map(&[]);
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.stage_timeout, Duration::from_secs(3600));
        assert_eq!(config.composite_timeout, Duration::from_secs(7200));
        assert_eq!(config.min_free_bytes, 500 * 1024 * 1024);
        assert!(config.work_dir.ends_with("mclip"));
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("MCLIP_WORK_DIR", "/data/scratch"),
            ("MCLIP_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
            ("MCLIP_STAGE_TIMEOUT_SECS", "90"),
            ("MCLIP_MIN_FREE_MB", "0"),
            ("MCLIP_PROGRESS_STEP", "2.5"),
        ]);
        assert_eq!(config.work_dir, PathBuf::from("/data/scratch"));
        assert_eq!(config.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.stage_timeout, Duration::from_secs(90));
        assert_eq!(config.min_free_bytes, 0);
        assert_eq!(config.composite_config().progress_step, 2.5);
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let config = from_map(&[
            ("MCLIP_COMPOSITE_TIMEOUT_SECS", "soon"),
            ("MCLIP_PROGRESS_STEP", "-1"),
        ]);
        assert_eq!(config.composite_timeout, Duration::from_secs(7200));
        assert_eq!(config.progress_step, 0.5);
    }
}
