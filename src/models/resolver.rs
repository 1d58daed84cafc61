//! Preferred-model resolution over a cached discovery list.

use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{ModelBackend, ModelInfo};
use crate::metrics;

/// Vendor tokens recognised in model names.
pub const KNOWN_VENDORS: &[&str] = &[
    "claude", "gpt", "gemini", "llama", "mistral", "phi", "deepseek",
];

/// How a preferred name was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchTier {
    /// Family tag equals the preferred name.
    Exact,
    /// Equal after stripping punctuation and case.
    Normalized,
    /// Normalized family starts with the first three name tokens.
    Prefix,
    /// Same vendor, different model.
    VendorFamily,
    /// Nothing related; the first advertised model.
    FirstAvailable,
}

impl MatchTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Normalized => "normalized",
            Self::Prefix => "prefix",
            Self::VendorFamily => "vendor",
            Self::FirstAvailable => "first-available",
        }
    }

    /// Whether the chosen model is the one that was asked for.
    #[must_use]
    pub const fn is_preferred(self) -> bool {
        matches!(self, Self::Exact | Self::Normalized)
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved model and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub model: ModelInfo,
    pub tier: MatchTier,
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '.' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn name_prefix(name: &str) -> String {
    let joined: String = name
        .split(['-', '.', '_'])
        .filter(|t| !t.is_empty())
        .take(3)
        .collect();
    normalize(&joined)
}

fn vendor_of(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    KNOWN_VENDORS.iter().copied().find(|vendor| {
        lower.starts_with(vendor) || lower.split(['-', '.', '_', '/']).any(|t| t == *vendor)
    })
}

/// Pick the best model for `preferred` out of `available`.
///
/// Tiers are tried in order: exact family, normalized family, three-token
/// prefix, same vendor, first advertised. Returns `None` only when
/// `available` is empty.
#[must_use]
pub fn match_model(available: &[ModelInfo], preferred: &str) -> Option<Resolution> {
    let first = available.first()?;
    let found = |model: &ModelInfo, tier| {
        Some(Resolution {
            model: model.clone(),
            tier,
        })
    };

    if let Some(model) = available.iter().find(|m| m.family == preferred) {
        return found(model, MatchTier::Exact);
    }

    let wanted = normalize(preferred);
    if !wanted.is_empty() {
        if let Some(model) = available.iter().find(|m| normalize(&m.family) == wanted) {
            return found(model, MatchTier::Normalized);
        }
    }

    let prefix = name_prefix(preferred);
    if !prefix.is_empty() {
        if let Some(model) = available
            .iter()
            .find(|m| normalize(&m.family).starts_with(&prefix))
        {
            return found(model, MatchTier::Prefix);
        }
    }

    if let Some(vendor) = vendor_of(preferred) {
        if let Some(model) = available.iter().find(|m| {
            m.family.to_lowercase().contains(vendor) || m.name.to_lowercase().contains(vendor)
        }) {
            return found(model, MatchTier::VendorFamily);
        }
    }

    found(first, MatchTier::FirstAvailable)
}

/// Resolves preferred model names against the backend's advertised models.
///
/// The first non-empty discovery is cached for the life of the resolver
/// (or until [`ModelResolver::invalidate`]); empty or failed discoveries are
/// not cached.
pub struct ModelResolver {
    backend: Arc<dyn ModelBackend>,
    vendor_filter: Option<String>,
    cache: RwLock<Option<Vec<ModelInfo>>>,
}

impl ModelResolver {
    pub fn new(backend: Arc<dyn ModelBackend>, vendor_filter: Option<String>) -> Self {
        Self {
            backend,
            vendor_filter,
            cache: RwLock::new(None),
        }
    }

    /// Advertised models, discovering them on first use.
    pub async fn available_models(&self) -> Vec<ModelInfo> {
        if let Some(models) = self.cache.read().await.as_ref() {
            return models.clone();
        }

        let mut cache = self.cache.write().await;
        if let Some(models) = cache.as_ref() {
            return models.clone();
        }

        metrics::MODEL_DISCOVERIES.inc();
        match self.backend.list_models(self.vendor_filter.as_deref()).await {
            Ok(models) if !models.is_empty() => {
                tracing::info!(count = models.len(), "Discovered language models");
                *cache = Some(models.clone());
                models
            }
            Ok(_) => {
                tracing::warn!(vendor = ?self.vendor_filter, "Backend advertised no models");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Model discovery failed");
                Vec::new()
            }
        }
    }

    /// Resolve `preferred` to an advertised model.
    pub async fn resolve(&self, preferred: &str) -> Option<Resolution> {
        let available = self.available_models().await;
        let resolution = match_model(&available, preferred)?;

        if resolution.tier.is_preferred() {
            tracing::debug!(preferred, model = %resolution.model.family, "Resolved model");
        } else {
            tracing::warn!(
                preferred,
                model = %resolution.model.family,
                tier = %resolution.tier,
                "Preferred model unavailable, using fallback"
            );
        }
        Some(resolution)
    }

    /// Forget the cached model list.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        tracing::info!("Model cache invalidated");
    }

    /// Whether a model list is cached.
    pub async fn is_cached(&self) -> bool {
        self.cache.read().await.is_some()
    }
}
