//! Asset-bundle negotiation and transfer.
//!
//! A spectator needs the same shared assets as the host to render the
//! mirrored scene. On every connection the two sides negotiate:
//!
//! ```text
//! spectator                                   host
//!   RequestAssetBundleInfo(platform)   ──→
//!                                      ←──   ReportAssetBundleInfo(identity?)
//!   (identity matches local cache → done)
//!   RequestAssetBundleDownload         ──→
//!                                      ←──   ReportAssetBundleDownloadStart(size)
//!                                      ←──   ReportAssetBundleDownloadData × N   (one per tick)
//!   AssetLoadCompleted                 ──→
//! ```
//!
//! - [`AssetReceiver`] drives the spectator side and owns the
//!   [`AssetState`] machine observers subscribe to.
//! - [`AssetSender`] serves bundles from a [`BundleCatalog`].
//! - [`AssetCache`] is what the receiver loads into; [`RegistryCache`]
//!   implements it on top of a [`CodecRegistry`] of per-type
//!   [`AssetCodec`]s.

mod bundle;
mod error;
mod receiver;
mod registry;
mod sender;
mod state;

pub use bundle::{Bundle, BundleEntry, BundleWriter, content_identity, read_entries};
pub use error::AssetError;
pub use receiver::AssetReceiver;
pub use registry::{
    AssetCache, AssetCodec, BlobCodec, CodecRegistry, DecodedAsset, RegistryCache, TextCodec,
};
pub use sender::{AssetSender, BundleCatalog, TransferProgress};
pub use state::{AssetState, AssetStatus, Progress};
