//! Observer side of bundle negotiation.
//!
//! The receiver never sends anything itself. Each handler returns the
//! message (if any) the endpoint should send back to the host, so the
//! receiver stays independent of the connection type.

use bytes::Bytes;
use scenecast_protocol::{
    BundleInfo, BundleInfoReport, CommandPayload, DownloadStart, Platform, RequestBundleDownload,
    RequestBundleInfo, asset_load_completed_message,
};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::state::StateCell;
use crate::{AssetCache, AssetState, AssetStatus, Progress};

/// Upper bound on the buffer reserved up front; the declared total comes
/// from the peer.
const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

/// A transfer being filled.
#[derive(Debug)]
struct IncomingTransfer {
    info: BundleInfo,
    total: usize,
    buffer: Vec<u8>,
}

impl IncomingTransfer {
    fn remaining(&self) -> usize {
        self.total - self.buffer.len()
    }

    fn progress(&self) -> Progress {
        Progress {
            received: self.buffer.len(),
            total: self.total,
        }
    }
}

/// Negotiates, receives, and loads bundles for one connection at a time.
#[derive(Debug)]
pub struct AssetReceiver<A> {
    platform: Platform,
    cache: A,
    state: StateCell,
    transfer: Option<IncomingTransfer>,
}

impl<A: AssetCache> AssetReceiver<A> {
    /// Starts in `Preloaded` if `cache` already holds assets, `None`
    /// otherwise.
    pub fn new(platform: Platform, cache: A) -> Self {
        let initial = if cache.is_populated() {
            AssetStatus::Preloaded
        } else {
            AssetStatus::None
        };
        Self {
            platform,
            cache,
            state: StateCell::new(AssetState::new(initial)),
            transfer: None,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn cache(&self) -> &A {
        &self.cache
    }

    /// Current state snapshot.
    pub fn state(&self) -> AssetState {
        self.state.get()
    }

    pub fn status(&self) -> AssetStatus {
        self.state.status()
    }

    /// A receiver woken on every state replacement.
    pub fn subscribe(&self) -> watch::Receiver<AssetState> {
        self.state.subscribe()
    }

    /// Progress of the transfer in flight.
    pub fn progress(&self) -> Option<Progress> {
        self.transfer.as_ref().map(IncomingTransfer::progress)
    }

    /// Lets the application mutate the cache outside a negotiation (local
    /// import, editor tooling). Re-evaluates `None`/`Preloaded` afterwards.
    pub fn update_cache(&mut self, f: impl FnOnce(&mut A)) {
        f(&mut self.cache);
        self.on_cache_changed();
    }

    /// Re-evaluates the idle state after the cache changed.
    pub fn on_cache_changed(&mut self) {
        let status = self.status();
        if status == AssetStatus::None && self.cache.is_populated() {
            self.state.set(AssetState::new(AssetStatus::Preloaded));
        } else if status == AssetStatus::Preloaded && !self.cache.is_populated() {
            debug!("cache emptied while preloaded; state kept until next negotiation");
        }
    }

    /// A connection came up: start a negotiation.
    ///
    /// Returns the info request to send.
    pub fn on_connected(&mut self) -> Option<Bytes> {
        if self.status().is_negotiating() {
            // A new link replaces one we never saw close.
            self.abandon();
        }
        self.state
            .set(AssetState::new(AssetStatus::RequestingAssetBundle));
        info!(platform = %self.platform, "requesting asset bundle info");
        encode_or_log(&RequestBundleInfo {
            platform: self.platform,
        })
    }

    /// The connection went down: drop any transfer in flight.
    pub fn on_disconnected(&mut self) {
        if self.status().is_negotiating() {
            self.abandon();
        } else {
            self.transfer = None;
        }
    }

    fn abandon(&mut self) {
        if let Some(t) = self.transfer.take() {
            debug!(
                bundle = %t.info.display_name,
                received = t.buffer.len(),
                total = t.total,
                "transfer abandoned"
            );
            // The cache was cleared when the download started.
            self.cache.clear();
        }
        self.state.set(self.idle_state());
    }

    fn idle_state(&self) -> AssetState {
        if self.cache.is_populated() {
            AssetState::new(AssetStatus::Preloaded)
        } else {
            AssetState::new(AssetStatus::None)
        }
    }

    /// The host answered the info request.
    ///
    /// Returns a download request if the host's bundle differs from what
    /// is loaded here.
    pub fn handle_info_report(&mut self, report: BundleInfoReport) -> Option<Bytes> {
        if self.status() != AssetStatus::RequestingAssetBundle {
            warn!(state = %self.status(), "bundle info report outside negotiation, dropping");
            return None;
        }
        match report.bundle {
            Some(remote) => {
                if self.cache.identity() == Some(remote.identity.as_str()) {
                    info!(bundle = %remote.display_name, "bundle already loaded, skipping download");
                    self.state.set(AssetState::loaded(remote.display_name));
                    None
                } else {
                    debug!(bundle = %remote.display_name, identity = %remote.identity, "requesting bundle download");
                    encode_or_log(&RequestBundleDownload {
                        platform: self.platform,
                    })
                }
            }
            None => {
                self.no_asset_available();
                None
            }
        }
    }

    fn no_asset_available(&mut self) {
        if self.cache.is_populated() {
            info!("host has no bundle, keeping local cache");
            self.state.set(AssetState::new(AssetStatus::Preloaded));
        } else {
            info!(platform = %self.platform, "no asset bundle available");
            self.state.set(AssetState::new(
                AssetStatus::NonePreloadedAndNoAssetBundleAvailable,
            ));
        }
    }

    /// The host is starting a transfer.
    ///
    /// Returns the load-completed notice if the bundle is empty and loads
    /// immediately.
    pub fn handle_download_start(&mut self, start: DownloadStart) -> Option<Bytes> {
        if self.status() != AssetStatus::RequestingAssetBundle {
            warn!(state = %self.status(), "download start outside negotiation, dropping");
            return None;
        }
        let Some((info, total)) = start.bundle else {
            self.no_asset_available();
            return None;
        };

        // No two bundle versions coexist.
        self.cache.clear();
        let total = total as usize;
        info!(bundle = %info.display_name, total, "bundle download started");
        self.state
            .set(AssetState::downloading(info.display_name.clone(), 0, total));
        self.transfer = Some(IncomingTransfer {
            info,
            total,
            buffer: Vec::with_capacity(total.min(MAX_PREALLOCATION)),
        });
        self.finish_if_complete()
    }

    /// One chunk of the bundle arrived.
    ///
    /// Returns the load-completed notice once the bundle has loaded.
    pub fn handle_chunk(&mut self, chunk: &[u8]) -> Option<Bytes> {
        let Some(transfer) = self.transfer.as_mut() else {
            warn!(bytes = chunk.len(), "bundle chunk with no transfer pending, dropping");
            return None;
        };

        if chunk.len() > transfer.remaining() {
            let error = format!(
                "chunk of {} bytes overflows transfer: {} of {} bytes remaining",
                chunk.len(),
                transfer.remaining(),
                transfer.total
            );
            warn!(bundle = %transfer.info.display_name, "{error}");
            self.transfer = None;
            self.cache.clear();
            self.state.set(AssetState::failed(
                AssetStatus::ErrorDownloadingAssetBundle,
                error,
            ));
            return None;
        }

        transfer.buffer.extend_from_slice(chunk);
        trace!(
            bytes = chunk.len(),
            received = transfer.buffer.len(),
            total = transfer.total,
            "bundle chunk received"
        );
        let progress = transfer.progress();
        let name = transfer.info.display_name.clone();
        self.state.set(AssetState::downloading(
            name,
            progress.received,
            progress.total,
        ));
        self.finish_if_complete()
    }

    fn finish_if_complete(&mut self) -> Option<Bytes> {
        if self.transfer.as_ref()?.remaining() > 0 {
            return None;
        }
        let transfer = self.transfer.take()?;
        match self.cache.load_bundle(&transfer.info, &transfer.buffer) {
            Ok(()) => {
                info!(bundle = %transfer.info.display_name, bytes = transfer.total, "bundle loaded");
                self.state
                    .set(AssetState::loaded(transfer.info.display_name));
                Some(asset_load_completed_message())
            }
            Err(e) => {
                warn!(bundle = %transfer.info.display_name, error = %e, "bundle failed to load");
                self.cache.clear();
                self.state.set(AssetState::failed(
                    AssetStatus::ErrorLoadingAssetBundle,
                    e.to_string(),
                ));
                None
            }
        }
    }
}

fn encode_or_log<P: CommandPayload>(payload: &P) -> Option<Bytes> {
    payload
        .to_message()
        .inspect_err(|e| warn!(command = P::COMMAND, error = %e, "failed to encode request"))
        .ok()
}

#[cfg(test)]
mod tests {
    use scenecast_protocol::{CommandFrame, command};

    use super::*;
    use crate::{BundleWriter, CodecRegistry, RegistryCache};

    fn empty_cache() -> RegistryCache {
        RegistryCache::new(CodecRegistry::with_builtin())
    }

    fn receiver() -> AssetReceiver<RegistryCache> {
        AssetReceiver::new(Platform::Android, empty_cache())
    }

    fn sample_bundle() -> crate::Bundle {
        let mut writer = BundleWriter::new();
        writer.add("text", "title", b"Mirror").add("blob", "mesh", &[7; 64]);
        writer.finish("Demo Scene")
    }

    fn start_for(bundle: &crate::Bundle) -> DownloadStart {
        DownloadStart {
            bundle: Some((bundle.info.clone(), bundle.data.len() as u32)),
        }
    }

    fn command_of(msg: &Bytes) -> &str {
        CommandFrame::parse(msg).unwrap().command
    }

    #[test]
    fn test_initial_state_follows_cache() {
        assert_eq!(receiver().status(), AssetStatus::None);

        let bundle = sample_bundle();
        let mut cache = empty_cache();
        cache.load_bundle(&bundle.info, &bundle.data).unwrap();
        let receiver = AssetReceiver::new(Platform::Ios, cache);
        assert_eq!(receiver.status(), AssetStatus::Preloaded);
    }

    #[test]
    fn test_connect_sends_info_request_for_platform() {
        let mut rx = receiver();
        let msg = rx.on_connected().unwrap();
        let frame = CommandFrame::parse(&msg).unwrap();
        assert_eq!(frame.command, command::REQUEST_ASSET_BUNDLE_INFO);
        assert_eq!(frame.payload, &[Platform::Android as u8]);
        assert_eq!(rx.status(), AssetStatus::RequestingAssetBundle);
    }

    #[test]
    fn test_matching_identity_skips_download() {
        let bundle = sample_bundle();
        let mut cache = empty_cache();
        cache.load_bundle(&bundle.info, &bundle.data).unwrap();
        let mut rx = AssetReceiver::new(Platform::Android, cache);

        rx.on_connected();
        let reply = rx.handle_info_report(BundleInfoReport {
            bundle: Some(bundle.info.clone()),
        });

        assert!(reply.is_none());
        assert_eq!(rx.state(), AssetState::loaded("Demo Scene"));
    }

    #[test]
    fn test_different_identity_requests_download() {
        let mut rx = receiver();
        rx.on_connected();
        let reply = rx
            .handle_info_report(BundleInfoReport {
                bundle: Some(sample_bundle().info),
            })
            .unwrap();
        assert_eq!(command_of(&reply), command::REQUEST_ASSET_BUNDLE_DOWNLOAD);
        assert_eq!(rx.status(), AssetStatus::RequestingAssetBundle);
    }

    #[test]
    fn test_no_asset_without_cache_is_unavailable() {
        let mut rx = receiver();
        rx.on_connected();
        assert!(rx.handle_info_report(BundleInfoReport { bundle: None }).is_none());
        assert_eq!(
            rx.status(),
            AssetStatus::NonePreloadedAndNoAssetBundleAvailable
        );
    }

    #[test]
    fn test_no_asset_with_cache_stays_preloaded() {
        let bundle = sample_bundle();
        let mut cache = empty_cache();
        cache.load_bundle(&bundle.info, &bundle.data).unwrap();
        let mut rx = AssetReceiver::new(Platform::Android, cache);

        rx.on_connected();
        rx.handle_info_report(BundleInfoReport { bundle: None });
        assert_eq!(rx.status(), AssetStatus::Preloaded);
    }

    #[test]
    fn test_full_download_loads_and_notifies_host() {
        let bundle = sample_bundle();
        let mut rx = receiver();
        rx.on_connected();

        assert!(rx.handle_download_start(start_for(&bundle)).is_none());
        assert_eq!(rx.status(), AssetStatus::DownloadingAssetBundle);

        let (head, tail) = bundle.data.split_at(10);
        assert!(rx.handle_chunk(head).is_none());
        assert_eq!(
            rx.state().progress,
            Some(Progress {
                received: 10,
                total: bundle.len()
            })
        );

        let done = rx.handle_chunk(tail).unwrap();
        assert_eq!(command_of(&done), command::ASSET_LOAD_COMPLETED);
        assert_eq!(rx.state(), AssetState::loaded("Demo Scene"));
        assert_eq!(rx.cache().identity(), Some(bundle.info.identity.as_str()));
        assert!(rx.progress().is_none());
    }

    #[test]
    fn test_overflowing_chunk_fails_and_clears() {
        let mut rx = receiver();
        rx.on_connected();
        rx.handle_download_start(DownloadStart {
            bundle: Some((sample_bundle().info, 8)),
        });
        rx.handle_chunk(&[0; 4]);

        assert!(rx.handle_chunk(&[0; 10]).is_none());

        let state = rx.state();
        assert_eq!(state.status, AssetStatus::ErrorDownloadingAssetBundle);
        assert!(state.display_name.is_none());
        assert!(state.progress.is_none());
        assert!(state.error.is_some());
        assert!(rx.progress().is_none());
        assert!(!rx.cache().is_populated());
    }

    #[test]
    fn test_corrupt_bundle_is_a_load_error() {
        let garbage = b"definitely not a bundle";
        let mut rx = receiver();
        rx.on_connected();
        rx.handle_download_start(DownloadStart {
            bundle: Some((sample_bundle().info, garbage.len() as u32)),
        });

        assert!(rx.handle_chunk(garbage).is_none());
        let state = rx.state();
        assert_eq!(state.status, AssetStatus::ErrorLoadingAssetBundle);
        assert!(state.error.unwrap().contains("bad header"));
        assert!(!rx.cache().is_populated());
    }

    #[test]
    fn test_chunk_without_transfer_is_dropped() {
        let mut rx = receiver();
        rx.on_connected();
        assert!(rx.handle_chunk(b"stray").is_none());
        assert_eq!(rx.status(), AssetStatus::RequestingAssetBundle);
    }

    #[test]
    fn test_second_download_start_is_dropped() {
        let bundle = sample_bundle();
        let mut rx = receiver();
        rx.on_connected();
        rx.handle_download_start(start_for(&bundle));
        rx.handle_chunk(&bundle.data[..5]);

        rx.handle_download_start(start_for(&bundle));
        assert_eq!(rx.progress().unwrap().received, 5);
    }

    #[test]
    fn test_start_clears_previous_bundle() {
        let bundle = sample_bundle();
        let mut cache = empty_cache();
        cache.load_bundle(&bundle.info, &bundle.data).unwrap();
        let mut rx = AssetReceiver::new(Platform::Android, cache);

        rx.on_connected();
        rx.handle_download_start(DownloadStart {
            bundle: Some((sample_bundle().info, 100)),
        });
        assert!(!rx.cache().is_populated());
    }

    #[test]
    fn test_disconnect_mid_download_resets_and_reconnect_renegotiates() {
        let bundle = sample_bundle();
        let mut rx = receiver();
        rx.on_connected();
        rx.handle_download_start(start_for(&bundle));
        rx.handle_chunk(&bundle.data[..5]);

        rx.on_disconnected();
        assert_eq!(rx.status(), AssetStatus::None);
        assert!(rx.progress().is_none());

        rx.on_connected();
        assert_eq!(rx.status(), AssetStatus::RequestingAssetBundle);
    }

    #[test]
    fn test_empty_bundle_completes_on_start() {
        let empty = BundleWriter::new().finish("Empty");
        let mut rx = receiver();
        rx.on_connected();
        let done = rx
            .handle_download_start(DownloadStart {
                bundle: Some((empty.info.clone(), 0)),
            })
            .unwrap();
        assert_eq!(command_of(&done), command::ASSET_LOAD_COMPLETED);
        assert_eq!(rx.state(), AssetState::loaded("Empty"));
        assert_eq!(rx.cache().identity(), Some(empty.info.identity.as_str()));
    }

    #[test]
    fn test_loaded_bundle_without_entries_is_not_downloaded_again() {
        let empty = BundleWriter::new().finish("Empty scene");
        let mut rx = receiver();
        rx.on_connected();
        rx.handle_download_start(start_for(&empty));
        rx.handle_chunk(&empty.data);
        assert_eq!(rx.status(), AssetStatus::AssetBundleLoaded);

        rx.on_disconnected();
        rx.on_connected();
        let reply = rx.handle_info_report(BundleInfoReport {
            bundle: Some(empty.info.clone()),
        });

        assert!(reply.is_none());
        assert_eq!(rx.state(), AssetState::loaded("Empty scene"));
    }

    #[test]
    fn test_subscribers_see_each_transition() {
        let mut rx = receiver();
        let mut watch = rx.subscribe();

        rx.on_connected();
        assert!(watch.has_changed().unwrap());
        assert_eq!(
            watch.borrow_and_update().status,
            AssetStatus::RequestingAssetBundle
        );

        rx.handle_info_report(BundleInfoReport { bundle: None });
        assert_eq!(
            watch.borrow_and_update().status,
            AssetStatus::NonePreloadedAndNoAssetBundleAvailable
        );
    }

    #[test]
    fn test_cache_change_while_idle_enters_preloaded() {
        let bundle = sample_bundle();
        let mut rx = receiver();
        rx.update_cache(|cache| cache.load_bundle(&bundle.info, &bundle.data).unwrap());
        assert_eq!(rx.status(), AssetStatus::Preloaded);
    }
}
