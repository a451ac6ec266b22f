// src/config.rs - Analyzer configuration loaded from TOML

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{RetinopathyError, Result};

/// Configuration for the retinopathy analyzer
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub input_path: String,
    pub output_base_dir: String,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    #[serde(default)]
    pub mode: AnalysisMode,

    /// ONNX weights for the learned classifier. Absent means heuristic only.
    #[serde(default)]
    pub weights_path: Option<String>,

    #[serde(default = "default_overlay_prefix")]
    pub overlay_prefix: String,

    // Vessel segmentation parameters
    #[serde(default = "default_clahe_tile_grid")]
    pub clahe_tile_grid: [u32; 2],

    #[serde(default = "default_clahe_clip_limit")]
    pub clahe_clip_limit: f64,

    #[serde(default = "default_adaptive_block_size")]
    pub adaptive_block_size: u32,

    #[serde(default = "default_adaptive_offset")]
    pub adaptive_offset: i32,

    #[serde(default = "default_opening_kernel_size")]
    pub opening_kernel_size: u32,

    // Lesion detection parameters
    #[serde(default = "default_dark_lesion_threshold")]
    pub dark_lesion_threshold: u8,

    #[serde(default = "default_bright_lesion_threshold")]
    pub bright_lesion_threshold: u8,

    #[serde(default = "default_count_min_area")]
    pub count_min_area: f64,

    #[serde(default = "default_annotation_min_area")]
    pub annotation_min_area: f64,

    #[serde(default = "default_max_hemorrhage_annotations")]
    pub max_hemorrhage_annotations: usize,

    #[serde(default = "default_max_exudate_annotations")]
    pub max_exudate_annotations: usize,

    // Learned model input edge length
    #[serde(default = "default_model_input_size")]
    pub model_input_size: u32,

    /// Per-request processing deadline, checked between pipeline stages
    #[serde(default)]
    pub max_processing_ms: Option<u64>,
}

/// How a diagnosis is produced
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Real image analysis (segmentation, lesions, classifier)
    #[default]
    Pipeline,
    /// Filename-seeded stub, no image inspection
    Simulation,
}

fn default_parallel() -> bool {
    true
}

fn default_overlay_prefix() -> String {
    "segmented_".to_string()
}

fn default_clahe_tile_grid() -> [u32; 2] {
    [8, 8]
}

fn default_clahe_clip_limit() -> f64 {
    2.0
}

fn default_adaptive_block_size() -> u32 {
    11
}

fn default_adaptive_offset() -> i32 {
    2
}

fn default_opening_kernel_size() -> u32 {
    2
}

fn default_dark_lesion_threshold() -> u8 {
    20
}

fn default_bright_lesion_threshold() -> u8 {
    220
}

fn default_count_min_area() -> f64 {
    5.0
}

fn default_annotation_min_area() -> f64 {
    10.0
}

fn default_max_hemorrhage_annotations() -> usize {
    15
}

fn default_max_exudate_annotations() -> usize {
    10
}

fn default_model_input_size() -> u32 {
    224 // ImageNet backbone input
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: "./input".to_string(),
            output_base_dir: "./output".to_string(),
            use_parallel: default_parallel(),
            mode: AnalysisMode::Pipeline,
            weights_path: None,
            overlay_prefix: default_overlay_prefix(),
            clahe_tile_grid: default_clahe_tile_grid(),
            clahe_clip_limit: default_clahe_clip_limit(),
            adaptive_block_size: default_adaptive_block_size(),
            adaptive_offset: default_adaptive_offset(),
            opening_kernel_size: default_opening_kernel_size(),
            dark_lesion_threshold: default_dark_lesion_threshold(),
            bright_lesion_threshold: default_bright_lesion_threshold(),
            count_min_area: default_count_min_area(),
            annotation_min_area: default_annotation_min_area(),
            max_hemorrhage_annotations: default_max_hemorrhage_annotations(),
            max_exudate_annotations: default_max_exudate_annotations(),
            model_input_size: default_model_input_size(),
            max_processing_ms: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RetinopathyError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| RetinopathyError::ConfigLoad {
            source: e,
            path: path.to_path_buf(),
        })?;

        Ok(config)
    }

    /// Validate configuration values that the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.clahe_tile_grid[0] == 0 || self.clahe_tile_grid[1] == 0 {
            return Err(RetinopathyError::Config(
                "clahe_tile_grid entries must be > 0".to_string(),
            ));
        }

        if self.clahe_clip_limit <= 0.0 {
            return Err(RetinopathyError::Config(
                "clahe_clip_limit must be > 0.0".to_string(),
            ));
        }

        // Local neighborhood must have a center pixel
        if self.adaptive_block_size < 3 || self.adaptive_block_size % 2 == 0 {
            return Err(RetinopathyError::Config(
                "adaptive_block_size must be odd and >= 3".to_string(),
            ));
        }

        if self.opening_kernel_size == 0 {
            return Err(RetinopathyError::Config(
                "opening_kernel_size must be > 0".to_string(),
            ));
        }

        if self.dark_lesion_threshold >= self.bright_lesion_threshold {
            return Err(RetinopathyError::Config(
                "dark_lesion_threshold must be < bright_lesion_threshold".to_string(),
            ));
        }

        if self.count_min_area < 0.0 || self.annotation_min_area < 0.0 {
            return Err(RetinopathyError::Config(
                "lesion area thresholds must be >= 0.0".to_string(),
            ));
        }

        if self.model_input_size == 0 {
            return Err(RetinopathyError::Config(
                "model_input_size must be > 0".to_string(),
            ));
        }

        if self.overlay_prefix.is_empty() || self.overlay_prefix.contains(['/', '\\']) {
            return Err(RetinopathyError::Config(
                "overlay_prefix must be a non-empty file name prefix".to_string(),
            ));
        }

        if let Some(weights) = &self.weights_path {
            if weights.trim().is_empty() {
                return Err(RetinopathyError::Config(
                    "weights_path must not be empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Input path as a `PathBuf`
    pub fn input(&self) -> PathBuf {
        PathBuf::from(&self.input_path)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            RetinopathyError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            input_path = "./fundus"
            output_base_dir = "./out"
            weights_path = "model.onnx"
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, AnalysisMode::Pipeline);
        assert_eq!(config.weights_path.as_deref(), Some("model.onnx"));
        assert_eq!(config.clahe_tile_grid, [8, 8]);
        assert_eq!(config.adaptive_block_size, 11);
        assert_eq!(config.max_hemorrhage_annotations, 15);
        assert_eq!(config.overlay_prefix, "segmented_");
    }

    #[test]
    fn simulation_mode_parses_lowercase() {
        let config: Config = toml::from_str(
            r#"
            input_path = "a"
            output_base_dir = "b"
            mode = "simulation"
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, AnalysisMode::Simulation);
    }

    #[test]
    fn even_block_size_is_rejected() {
        let config = Config {
            adaptive_block_size: 10,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(RetinopathyError::Config(_))));
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            weights_path: Some("weights/dr.onnx".to_string()),
            max_processing_ms: Some(5_000),
            ..Config::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.weights_path, config.weights_path);
        assert_eq!(loaded.max_processing_ms, Some(5_000));
    }
}
