use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration for fieldctl
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionSettings,
    #[serde(default)]
    pub detector_service: DetectorServiceSettings,
}

/// Tunables for image detection and element matching.
///
/// The rotation and aspect-ratio tolerances are empirically chosen; the
/// defaults are kept as-is and exposed here rather than hard-coded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionSettings {
    /// Maximum descriptor distance for a feature match to count as "good".
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,
    /// How far (degrees) an edge angle may sit from a multiple of 90
    /// before the detected zone is rejected.
    #[serde(default = "default_rotation_tolerance")]
    pub rotation_tolerance_degrees: f64,
    /// Maximum absolute difference between width and height scale ratios.
    #[serde(default = "default_aspect_ratio_tolerance")]
    pub aspect_ratio_tolerance: f64,
    /// Minimum normalized cross-correlation score for template matching.
    #[serde(default = "default_template_acceptance")]
    pub template_acceptance_threshold: f32,
    /// Sleep between attempts when polling for element presence.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pixel tolerance when comparing detected rectangles for equality.
    #[serde(default = "default_position_tolerance")]
    pub position_tolerance: i32,
}

fn default_detection_threshold() -> f64 {
    0.05
}

fn default_rotation_tolerance() -> f64 {
    1.0
}

fn default_aspect_ratio_tolerance() -> f64 {
    0.1
}

fn default_template_acceptance() -> f32 {
    0.9
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_position_tolerance() -> i32 {
    10
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            detection_threshold: default_detection_threshold(),
            rotation_tolerance_degrees: default_rotation_tolerance(),
            aspect_ratio_tolerance: default_aspect_ratio_tolerance(),
            template_acceptance_threshold: default_template_acceptance(),
            poll_interval_ms: default_poll_interval_ms(),
            position_tolerance: default_position_tolerance(),
        }
    }
}

/// Field detection service endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorServiceSettings {
    #[serde(default = "default_service_url")]
    pub url: String,
}

fn default_service_url() -> String {
    "http://localhost:5000/detect".to_string()
}

impl Default for DetectorServiceSettings {
    fn default() -> Self {
        Self {
            url: default_service_url(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config/fieldctl/config.toml")
    }

    /// Load config from file, returning defaults if file doesn't exist
    pub fn load() -> Self {
        let path = Self::path();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => eprintln!("Warning: Failed to parse config: {}", e),
                },
                Err(e) => eprintln!("Warning: Failed to read config: {}", e),
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        fs::write(path, contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_preserved() {
        let settings = DetectionSettings::default();
        assert_eq!(settings.detection_threshold, 0.05);
        assert_eq!(settings.rotation_tolerance_degrees, 1.0);
        assert_eq!(settings.aspect_ratio_tolerance, 0.1);
        assert_eq!(settings.poll_interval_ms, 200);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [detection]
            detection_threshold = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.detection.detection_threshold, 0.2);
        assert_eq!(config.detection.rotation_tolerance_degrees, 1.0);
        assert_eq!(config.detector_service.url, "http://localhost:5000/detect");
    }
}
