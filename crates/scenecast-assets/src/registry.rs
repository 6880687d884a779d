//! Pluggable asset codecs and the cache that uses them.
//!
//! The transfer machinery only moves bytes. What those bytes mean (a
//! texture, a mesh, a font) is decided by an [`AssetCodec`] registered for
//! the entry's short type tag. [`RegistryCache`] materializes a received
//! bundle by running every entry through its codec, and is the
//! [`AssetCache`] endpoints use unless the application brings its own.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use scenecast_protocol::BundleInfo;
use tracing::{debug, info};

use crate::{AssetError, bundle};

/// A decoded asset, shared and type-erased.
pub type DecodedAsset = Arc<dyn Any + Send + Sync>;

/// Turns the serialized form of one asset type into a usable value.
pub trait AssetCodec: Send + Sync + 'static {
    /// Short tag identifying the asset type in a bundle (`"blob"`, `"tex"`).
    fn type_tag(&self) -> &'static str;

    /// Decodes one entry.
    ///
    /// # Errors
    /// Returns [`AssetError::Decode`] if the bytes are not a valid asset.
    fn decode(&self, asset_id: &str, data: &[u8]) -> Result<DecodedAsset, AssetError>;
}

/// Keeps an entry's bytes as-is (`Vec<u8>`). Accepts anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobCodec;

impl AssetCodec for BlobCodec {
    fn type_tag(&self) -> &'static str {
        "blob"
    }

    fn decode(&self, _asset_id: &str, data: &[u8]) -> Result<DecodedAsset, AssetError> {
        Ok(Arc::new(data.to_vec()))
    }
}

/// Decodes an entry as UTF-8 text (`String`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl AssetCodec for TextCodec {
    fn type_tag(&self) -> &'static str {
        "text"
    }

    fn decode(&self, asset_id: &str, data: &[u8]) -> Result<DecodedAsset, AssetError> {
        let text = std::str::from_utf8(data).map_err(|e| AssetError::Decode {
            tag: self.type_tag().to_owned(),
            id: asset_id.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(text.to_owned()))
    }
}

/// Codecs by type tag.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<&'static str, Arc<dyn AssetCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with [`BlobCodec`] and [`TextCodec`].
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.codecs.insert(BlobCodec.type_tag(), Arc::new(BlobCodec));
        registry.codecs.insert(TextCodec.type_tag(), Arc::new(TextCodec));
        registry
    }

    /// # Errors
    /// Returns [`AssetError::DuplicateCodec`] if the tag is taken.
    pub fn register<C: AssetCodec>(&mut self, codec: C) -> Result<(), AssetError> {
        let tag = codec.type_tag();
        if self.codecs.contains_key(tag) {
            return Err(AssetError::DuplicateCodec(tag.to_owned()));
        }
        self.codecs.insert(tag, Arc::new(codec));
        Ok(())
    }

    pub fn get(&self, type_tag: &str) -> Option<&dyn AssetCodec> {
        self.codecs.get(type_tag).map(|c| c.as_ref())
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.codecs.contains_key(type_tag)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.codecs.keys().collect();
        tags.sort_unstable();
        f.debug_struct("CodecRegistry").field("tags", &tags).finish()
    }
}

/// What the receiver needs from the local asset store.
pub trait AssetCache: Send + 'static {
    /// Returns `true` if the cache holds a loaded bundle, even one with no
    /// entries.
    fn is_populated(&self) -> bool;

    /// Identity of the bundle the cache was loaded from, if known.
    fn identity(&self) -> Option<&str>;

    /// Replaces the cache contents with the assets in `data`.
    ///
    /// On error the cache is left empty.
    fn load_bundle(&mut self, info: &BundleInfo, data: &[u8]) -> Result<(), AssetError>;

    /// Drops every asset.
    fn clear(&mut self);
}

/// An [`AssetCache`] that decodes bundles through a [`CodecRegistry`].
#[derive(Debug)]
pub struct RegistryCache {
    registry: CodecRegistry,
    loaded: Option<BundleInfo>,
    assets: HashMap<(String, String), DecodedAsset>,
}

impl RegistryCache {
    pub fn new(registry: CodecRegistry) -> Self {
        Self {
            registry,
            loaded: None,
            assets: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// The bundle currently loaded.
    pub fn bundle(&self) -> Option<&BundleInfo> {
        self.loaded.as_ref()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Looks up a decoded asset and downcasts it.
    pub fn get<T: Any + Send + Sync>(&self, type_tag: &str, asset_id: &str) -> Option<Arc<T>> {
        let asset = self
            .assets
            .get(&(type_tag.to_owned(), asset_id.to_owned()))?;
        Arc::clone(asset).downcast::<T>().ok()
    }

    fn decode_all(&self, data: &[u8]) -> Result<HashMap<(String, String), DecodedAsset>, AssetError> {
        let mut assets = HashMap::new();
        // A zero-byte bundle carries no container at all.
        if data.is_empty() {
            return Ok(assets);
        }
        for entry in bundle::read_entries(data)? {
            let codec = self
                .registry
                .get(entry.type_tag)
                .ok_or_else(|| AssetError::UnknownType(entry.type_tag.to_owned()))?;
            let decoded = codec.decode(entry.asset_id, entry.data)?;
            assets.insert(
                (entry.type_tag.to_owned(), entry.asset_id.to_owned()),
                decoded,
            );
        }
        Ok(assets)
    }
}

impl AssetCache for RegistryCache {
    fn is_populated(&self) -> bool {
        self.loaded.is_some() || !self.assets.is_empty()
    }

    fn identity(&self) -> Option<&str> {
        self.loaded.as_ref().map(|b| b.identity.as_str())
    }

    fn load_bundle(&mut self, info: &BundleInfo, data: &[u8]) -> Result<(), AssetError> {
        self.clear();
        let assets = self.decode_all(data)?;
        info!(
            bundle = %info.display_name,
            identity = %info.identity,
            assets = assets.len(),
            "bundle materialized"
        );
        self.assets = assets;
        self.loaded = Some(info.clone());
        Ok(())
    }

    fn clear(&mut self) {
        if self.loaded.is_some() || !self.assets.is_empty() {
            debug!(assets = self.assets.len(), "asset cache cleared");
        }
        self.assets.clear();
        self.loaded = None;
    }
}
