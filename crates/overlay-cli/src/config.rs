use anyhow::{Context, Result};
use serde::Deserialize;

use overlay_vision::{ClassColorEntry, ClassColorTable, Rgba, DEFAULT_MAX_ANNOTATIONS};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub classifier: ClassifierCfg,
    pub overlay: OverlayCfg,
    #[serde(default)]
    pub raycast: RaycastCfg,
}

#[derive(Debug, Deserialize)]
pub struct ClassifierCfg {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Treat scores as logits and normalize before thresholding.
    #[serde(default = "default_true")]
    pub softmax: bool,
}

impl Default for ClassifierCfg {
    fn default() -> Self {
        Self { threshold: default_threshold(), softmax: true }
    }
}

#[derive(Debug, Deserialize)]
pub struct OverlayCfg {
    pub labels_path: String,
    #[serde(default = "default_max_annotations")]
    pub max_annotations: usize,
    pub display_w: f32,
    pub display_h: f32,
    pub camera_res_w: i32,
    pub camera_res_h: i32,
    #[serde(default = "default_color")]
    pub default_color: Rgba,
    #[serde(default)]
    pub class_colors: Vec<ClassColorEntry>,
}

impl OverlayCfg {
    pub fn color_table(&self) -> ClassColorTable {
        ClassColorTable::new(self.class_colors.clone(), self.default_color)
    }
}

#[derive(Debug, Deserialize)]
pub struct RaycastCfg {
    #[serde(default = "default_depth")]
    pub depth_m: f32,
}

impl Default for RaycastCfg {
    fn default() -> Self {
        Self { depth_m: default_depth() }
    }
}

fn default_threshold() -> f32 { 0.5 }
fn default_true() -> bool { true }
fn default_max_annotations() -> usize { DEFAULT_MAX_ANNOTATIONS }
fn default_color() -> Rgba { Rgba::WHITE }
fn default_depth() -> f32 { 1.5 }

impl Config {
    /// Static sanity checks; does not touch the filesystem.
    pub fn check(&self) -> Result<()> {
        anyhow::ensure!(self.classifier.threshold.is_finite(), "classifier.threshold must be finite");
        let o = &self.overlay;
        anyhow::ensure!(o.display_w.is_finite() && o.display_w > 0.0, "overlay.display_w invalid: {}", o.display_w);
        anyhow::ensure!(o.display_h.is_finite() && o.display_h > 0.0, "overlay.display_h invalid: {}", o.display_h);
        anyhow::ensure!(o.camera_res_w > 0 && o.camera_res_h > 0, "overlay.camera_res invalid: {}x{}", o.camera_res_w, o.camera_res_h);
        anyhow::ensure!(o.max_annotations >= 1, "overlay.max_annotations must be >= 1");
        anyhow::ensure!(!o.labels_path.trim().is_empty(), "overlay.labels_path missing");
        anyhow::ensure!(self.raycast.depth_m.is_finite() && self.raycast.depth_m > 0.0, "raycast.depth_m invalid: {}", self.raycast.depth_m);
        Ok(())
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}
