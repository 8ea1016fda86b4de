use crate::config::{ImageGateConfig, OutputFormat};
use crate::resolve::LAST_RESORT_FALLBACK;
use crate::transform::params::RenditionParams;
use std::collections::BTreeMap;

/// Builds gateway URLs for processed images.
///
/// Pure string formatting over the configured route prefix; the heavy
/// lifting happens when the generated URL is requested.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    base_url: String,
    config: ImageGateConfig,
}

impl UrlBuilder {
    pub fn new(base_url: impl Into<String>, config: ImageGateConfig) -> Self {
        Self {
            base_url: base_url.into(),
            config,
        }
    }

    /// URL for `path` with explicit transformation parameters.
    pub fn url(&self, path: &str, params: &BTreeMap<String, String>) -> String {
        let mut url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.config.route_prefix.trim_matches('/'),
            path.trim_start_matches('/')
        );
        if !params.is_empty() {
            if let Ok(query) = serde_urlencoded::to_string(params) {
                url.push('?');
                url.push_str(&query);
            }
        }
        url
    }

    /// URL forcing WebP output with the configured default quality and fit
    /// filled in when absent.
    pub fn webp_url(&self, path: &str, params: &BTreeMap<String, String>) -> String {
        let mut params = params.clone();
        params.insert("fm".into(), OutputFormat::Webp.to_string());
        params
            .entry("q".into())
            .or_insert_with(|| self.config.default_quality.to_string());
        params
            .entry("fit".into())
            .or_insert_with(|| self.config.default_fit.to_string());
        self.url(path, &params)
    }

    /// URL applying a named preset. Unknown presets degrade to `thumbnail`,
    /// the same way the gateway expands the `preset` parameter.
    pub fn preset_url(&self, path: &str, preset: &str) -> String {
        let mut params = RenditionParams::new([("preset", preset)]);
        params.expand_preset(&self.config);
        let map: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.url(path, &map)
    }

    /// `srcset` attribute value with pixel-density variants from 1x up to
    /// `max_factor` (clamped to 1..=5).
    pub fn srcset(&self, path: &str, params: &BTreeMap<String, String>, max_factor: u32) -> String {
        let max_factor = max_factor.clamp(1, 5);
        let base_width: Option<u64> = params.get("w").and_then(|w| w.parse().ok());
        let base_height: Option<u64> = params.get("h").and_then(|h| h.parse().ok());

        let mut parts = Vec::new();
        for factor in 1..=max_factor {
            let mut variant = params.clone();
            if let Some(w) = base_width {
                variant.insert("w".into(), (w * u64::from(factor)).to_string());
            }
            if let Some(h) = base_height {
                variant.insert("h".into(), (h * u64::from(factor)).to_string());
            }
            parts.push(format!("{} {}x", self.url(path, &variant), factor));
        }
        parts.join(", ")
    }

    /// URL of the default image for a category, for entities with no image.
    pub fn fallback_url(&self, category: &str) -> String {
        let path = self
            .config
            .fallback_images
            .get(category)
            .or_else(|| self.config.fallback_images.get("default"))
            .map(String::as_str)
            .unwrap_or(LAST_RESORT_FALLBACK);
        self.url(path, &BTreeMap::new())
    }
}

/// Capability interface for entities that carry images. Implemented
/// explicitly by each entity type; `kind` distinguishes multiple images on
/// one entity ("default", "cover", ...).
pub trait HasImagePath {
    fn image_path(&self, kind: &str) -> Option<&str>;
}

/// URL helpers for anything implementing [`HasImagePath`]. Entities without
/// an image for the requested kind get the category fallback URL.
pub trait HasImageUrls: HasImagePath {
    fn image_url(
        &self,
        builder: &UrlBuilder,
        kind: &str,
        params: &BTreeMap<String, String>,
    ) -> String {
        match self.image_path(kind) {
            Some(path) => builder.url(path, params),
            None => builder.fallback_url(kind),
        }
    }

    fn image_preset_url(&self, builder: &UrlBuilder, kind: &str, preset: &str) -> String {
        match self.image_path(kind) {
            Some(path) => builder.preset_url(path, preset),
            None => builder.fallback_url(kind),
        }
    }
}

impl<T: HasImagePath> HasImageUrls for T {}
