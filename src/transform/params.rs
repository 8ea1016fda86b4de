use crate::config::{FitMode, ImageGateConfig, OutputFormat};
use crate::storage::{Backend, Storage};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Normalized transformation parameters for one request.
///
/// Parameters are user-supplied and unordered; this wrapper keeps them in a
/// sorted map with canonicalized values so that two requests carrying the
/// same set of key-value pairs always produce the same serialization, and
/// therefore the same cache key. Unrecognized keys are kept and passed
/// through to the transform engine verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionParams {
    map: BTreeMap<String, String>,
}

impl RenditionParams {
    pub fn new<I, K, V>(raw: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let map = raw
            .into_iter()
            .map(|(k, v)| (k.into(), canonical_value(v.as_ref())))
            .collect();
        Self { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Key-value pairs in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.map.insert(key.to_string(), canonical_value(value));
    }

    /// Replace a `preset` parameter with the parameter bundle it names.
    ///
    /// Unknown preset names fall back to `thumbnail`, mirroring the URL
    /// builder. Explicitly supplied parameters win over preset-derived ones.
    pub fn expand_preset(&mut self, config: &ImageGateConfig) {
        let Some(name) = self.map.remove("preset") else {
            return;
        };
        let preset = config
            .presets
            .get(&name)
            .or_else(|| config.presets.get("thumbnail"));
        let Some(preset) = preset else {
            return;
        };

        let fit = preset.fit.unwrap_or(config.default_fit);
        self.insert_if_absent("fit", &fit.to_string());

        if let Some(format) = preset.format {
            self.insert_if_absent("fm", &format.to_string());
            if format.is_jpeg_family() {
                self.insert_if_absent("q", &config.default_quality.to_string());
            }
        }

        if let Some((w, h)) = preset.parse_dimensions() {
            self.insert_if_absent("w", &w.to_string());
            if let Some(h) = h {
                self.insert_if_absent("h", &h.to_string());
            }
        }
    }

    /// Rewrite a relative `mark` (watermark) path to the public backend's
    /// absolute path before hashing, so identical logical requests collide
    /// on the same cache key no matter which backend served the base image
    /// or which process derived the key.
    pub fn rewrite_watermark(&mut self, storage: &dyn Storage) {
        if let Some(mark) = self.map.get("mark") {
            if !mark.starts_with('/') {
                let absolute = storage.absolute_path(Backend::Public, mark);
                self.map
                    .insert("mark".into(), absolute.to_string_lossy().into_owned());
            }
        }
    }

    /// Canonical serialization for hashing: sorted `k=v` pairs joined by `&`.
    pub fn canonical(&self) -> String {
        self.map
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn insert_if_absent(&mut self, key: &str, value: &str) {
        if !self.map.contains_key(key) {
            self.insert(key, value);
        }
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    // Typed accessors for the parameters the engine special-cases. All of
    // them tolerate absent or malformed values by returning None.

    pub fn width(&self) -> Option<u32> {
        self.parsed("w")
    }

    pub fn height(&self) -> Option<u32> {
        self.parsed("h")
    }

    /// Device-pixel-ratio multiplier, clamped to a sane range.
    pub fn dpr(&self) -> Option<f64> {
        self.parsed::<f64>("dpr").map(|d| d.clamp(1.0, 8.0))
    }

    pub fn quality(&self) -> Option<u8> {
        self.parsed::<u8>("q").map(|q| q.clamp(1, 100))
    }

    pub fn fit(&self) -> Option<FitMode> {
        self.parsed("fit")
    }

    pub fn format(&self) -> Option<OutputFormat> {
        self.parsed("fm")
    }

    /// Rotation in degrees. The engine only honors multiples of 90.
    pub fn rotation(&self) -> Option<i64> {
        self.parsed("rot")
    }

    pub fn blur(&self) -> Option<f32> {
        self.parsed("blur")
    }

    /// Brightness adjustment in percent, -100..100.
    pub fn brightness(&self) -> Option<i32> {
        self.parsed::<i32>("bri").map(|b| b.clamp(-100, 100))
    }

    /// Contrast adjustment in percent, -100..100.
    pub fn contrast(&self) -> Option<f32> {
        self.parsed::<f32>("con").map(|c| c.clamp(-100.0, 100.0))
    }

    pub fn gamma(&self) -> Option<f32> {
        self.parsed::<f32>("gam").filter(|g| *g > 0.0)
    }

    pub fn sharpen(&self) -> Option<f32> {
        self.parsed::<f32>("sharp").filter(|s| *s > 0.0)
    }

    pub fn filter(&self) -> Option<&str> {
        self.get("filt")
    }

    /// Explicit crop rectangle `crop=w,h,x,y`.
    pub fn crop(&self) -> Option<CropRect> {
        self.parsed("crop")
    }

    pub fn mark(&self) -> Option<&str> {
        self.get("mark")
    }

    pub fn mark_width(&self) -> Option<u32> {
        self.parsed("markw")
    }

    /// Watermark opacity in percent, 0..100.
    pub fn mark_alpha(&self) -> Option<u8> {
        self.parsed::<u8>("markalpha").map(|a| a.min(100))
    }

    pub fn mark_position(&self) -> MarkPosition {
        self.get("markpos")
            .and_then(|p| p.parse().ok())
            .unwrap_or(MarkPosition::BottomRight)
    }
}

/// Explicit crop rectangle, Glide-style `w,h,x,y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl FromStr for CropRect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("Invalid crop rectangle: {}", e))?;
        match parts.as_slice() {
            [width, height, x, y] => Ok(CropRect {
                width: *width,
                height: *height,
                x: *x,
                y: *y,
            }),
            _ => Err(format!("Invalid crop rectangle: {}", s)),
        }
    }
}

/// Anchor for watermark placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPosition {
    TopLeft,
    Top,
    TopRight,
    Left,
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl FromStr for MarkPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "top-left" => Ok(MarkPosition::TopLeft),
            "top" => Ok(MarkPosition::Top),
            "top-right" => Ok(MarkPosition::TopRight),
            "left" => Ok(MarkPosition::Left),
            "center" => Ok(MarkPosition::Center),
            "right" => Ok(MarkPosition::Right),
            "bottom-left" => Ok(MarkPosition::BottomLeft),
            "bottom" => Ok(MarkPosition::Bottom),
            "bottom-right" => Ok(MarkPosition::BottomRight),
            _ => Err(format!("Invalid position: {}", s)),
        }
    }
}

impl fmt::Display for MarkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarkPosition::TopLeft => "top-left",
            MarkPosition::Top => "top",
            MarkPosition::TopRight => "top-right",
            MarkPosition::Left => "left",
            MarkPosition::Center => "center",
            MarkPosition::Right => "right",
            MarkPosition::BottomLeft => "bottom-left",
            MarkPosition::Bottom => "bottom",
            MarkPosition::BottomRight => "bottom-right",
        };
        f.write_str(s)
    }
}

/// Canonical rendering of a parameter value.
///
/// Numeric values that are semantically equal must serialize identically:
/// `600`, `"600"`, `"0600"` and `"600.0"` all become `600`. Non-numeric
/// values are kept as-is, minus surrounding whitespace.
fn canonical_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return int.to_string();
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() {
            if float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
                return (float as i64).to_string();
            }
            return float.to_string();
        }
    }
    trimmed.to_string()
}
