use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Default quality applied when a request carries no `q` parameter.
pub const DEFAULT_QUALITY: u8 = 85;

/// Cache-Control header attached to every served image. Renditions are
/// content-addressed by their parameters, so browsers may cache aggressively.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000";

/// Output formats the gateway can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    /// Progressive JPEG. Encoded as baseline JPEG; kept as a distinct
    /// format name so URLs using `fm=pjpg` stay valid.
    Pjpg,
    Png,
    Webp,
    Avif,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg => write!(f, "jpg"),
            OutputFormat::Pjpg => write!(f, "pjpg"),
            OutputFormat::Png => write!(f, "png"),
            OutputFormat::Webp => write!(f, "webp"),
            OutputFormat::Avif => write!(f, "avif"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "pjpg" => Ok(OutputFormat::Pjpg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "avif" => Ok(OutputFormat::Avif),
            _ => Err(format!("Invalid format: {}", s)),
        }
    }
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg | OutputFormat::Pjpg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Avif => "image/avif",
        }
    }

    /// True for the JPEG family, which gets a default quality when a preset
    /// selects it without specifying one.
    pub fn is_jpeg_family(&self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::Pjpg)
    }
}

/// Policy for reconciling requested dimensions with the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Shrink to fit within the requested box, never upscaling.
    Max,
    /// Fill the requested box exactly, cropping overflow.
    Crop,
    /// Fit within the requested box, padding the remainder.
    Fill,
    /// Resize to the exact dimensions, ignoring aspect ratio.
    Stretch,
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMode::Max => write!(f, "max"),
            FitMode::Crop => write!(f, "crop"),
            FitMode::Fill => write!(f, "fill"),
            FitMode::Stretch => write!(f, "stretch"),
        }
    }
}

impl FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "max" => Ok(FitMode::Max),
            "crop" => Ok(FitMode::Crop),
            "fill" => Ok(FitMode::Fill),
            "stretch" => Ok(FitMode::Stretch),
            _ => Err(format!("Invalid fit mode: {}", s)),
        }
    }
}

/// A named bundle of transformation parameters.
///
/// `dimensions` is either a bare width (`"400"`) or `WxH` (`"150x150"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub dimensions: String,
    pub format: Option<OutputFormat>,
    pub fit: Option<FitMode>,
}

impl Preset {
    pub fn new(dimensions: &str, format: Option<OutputFormat>, fit: Option<FitMode>) -> Self {
        Self {
            dimensions: dimensions.to_string(),
            format,
            fit,
        }
    }

    /// Split `dimensions` into width and optional height.
    pub fn parse_dimensions(&self) -> Option<(u32, Option<u32>)> {
        match self.dimensions.split_once('x') {
            Some((w, h)) => {
                let w = w.trim().parse().ok()?;
                let h = h.trim().parse().ok()?;
                Some((w, Some(h)))
            }
            None => Some((self.dimensions.trim().parse().ok()?, None)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageGateConfig {
    /// URL prefix the image route is mounted under.
    pub route_prefix: String,
    /// Root directory of the public storage backend.
    pub public_root: PathBuf,
    /// Root directory of the private storage backend.
    pub private_root: PathBuf,
    /// Root directory of the rendition cache.
    pub cache_root: PathBuf,
    /// Entries older than this are removed by the sweep tool, not by the
    /// gateway itself.
    pub cache_lifetime_days: u32,
    pub default_quality: u8,
    pub default_fit: FitMode,
    pub default_format: OutputFormat,
    /// Category (first path segment) to default image path. The `default`
    /// entry is the catch-all.
    pub fallback_images: BTreeMap<String, String>,
    pub presets: BTreeMap<String, Preset>,
}

impl Default for ImageGateConfig {
    fn default() -> Self {
        let mut fallback_images = BTreeMap::new();
        fallback_images.insert("default".into(), "defaults/no-image.jpg".into());
        fallback_images.insert("documents".into(), "defaults/document.jpg".into());
        fallback_images.insert("evidence".into(), "defaults/evidence.jpg".into());
        fallback_images.insert("products".into(), "defaults/product.jpg".into());
        fallback_images.insert("users".into(), "defaults/user.jpg".into());

        let mut presets = BTreeMap::new();
        presets.insert(
            "large".into(),
            Preset::new("800", Some(OutputFormat::Webp), Some(FitMode::Max)),
        );
        presets.insert(
            "medium".into(),
            Preset::new("400", Some(OutputFormat::Webp), Some(FitMode::Max)),
        );
        presets.insert(
            "social".into(),
            Preset::new("1200x630", Some(OutputFormat::Jpeg), Some(FitMode::Crop)),
        );
        presets.insert(
            "thumbnail".into(),
            Preset::new("150x150", Some(OutputFormat::Webp), Some(FitMode::Crop)),
        );

        Self {
            route_prefix: "img".into(),
            public_root: PathBuf::from("./storage/public"),
            private_root: PathBuf::from("./storage/private"),
            cache_root: PathBuf::from("./cache/img"),
            cache_lifetime_days: 30,
            default_quality: DEFAULT_QUALITY,
            default_fit: FitMode::Max,
            default_format: OutputFormat::Webp,
            fallback_images,
            presets,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Route prefix cannot be empty")]
    EmptyRoutePrefix,
    #[error("Default quality must be between 1 and 100")]
    InvalidQuality,
    #[error("Cache root cannot be empty")]
    EmptyCacheRoot,
    #[error("Fallback mapping must contain a 'default' entry")]
    MissingDefaultFallback,
    #[error("Preset '{0}' has invalid dimensions '{1}'")]
    InvalidPresetDimensions(String, String),
}

impl ImageGateConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults. Recognized variables:
    /// - `IMAGEGATE_PREFIX`: route prefix (default: "img")
    /// - `IMAGEGATE_PUBLIC_ROOT` / `IMAGEGATE_PRIVATE_ROOT`: backend roots
    /// - `IMAGEGATE_CACHE_ROOT`: rendition cache directory
    /// - `IMAGEGATE_CACHE_DAYS`: cache lifetime consumed by the sweep tool
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(prefix) = std::env::var("IMAGEGATE_PREFIX") {
            cfg.route_prefix = prefix;
        }
        if let Ok(root) = std::env::var("IMAGEGATE_PUBLIC_ROOT") {
            cfg.public_root = PathBuf::from(root);
        }
        if let Ok(root) = std::env::var("IMAGEGATE_PRIVATE_ROOT") {
            cfg.private_root = PathBuf::from(root);
        }
        if let Ok(root) = std::env::var("IMAGEGATE_CACHE_ROOT") {
            cfg.cache_root = PathBuf::from(root);
        }
        if let Ok(days) = std::env::var("IMAGEGATE_CACHE_DAYS") {
            if let Ok(days) = days.parse() {
                cfg.cache_lifetime_days = days;
            }
        }
        cfg
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.route_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyRoutePrefix);
        }
        if self.default_quality == 0 || self.default_quality > 100 {
            return Err(ConfigError::InvalidQuality);
        }
        if self.cache_root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyCacheRoot);
        }
        if !self.fallback_images.contains_key("default") {
            return Err(ConfigError::MissingDefaultFallback);
        }
        for (name, preset) in &self.presets {
            if preset.parse_dimensions().is_none() {
                return Err(ConfigError::InvalidPresetDimensions(
                    name.clone(),
                    preset.dimensions.clone(),
                ));
            }
        }
        Ok(())
    }
}
