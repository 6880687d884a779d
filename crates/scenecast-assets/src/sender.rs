//! Broadcaster side of bundle negotiation.
//!
//! The sender answers info and download requests from any number of
//! recipients and streams each accepted download one bounded chunk per
//! tick, so a large transfer never crowds out the live scene stream.

use std::collections::{BTreeMap, HashMap, HashSet};

use bytes::Bytes;
use scenecast_protocol::{
    BundleInfoReport, CommandPayload, DownloadStart, MAX_CHUNK_SIZE, Platform, ProtocolError,
    RequestBundleDownload, RequestBundleInfo, download_chunk_message,
};
use scenecast_transport::ConnectionId;
use tracing::{debug, info, trace, warn};

use crate::{AssetError, Bundle};

/// Built bundles, one per target platform.
#[derive(Debug, Default)]
pub struct BundleCatalog {
    bundles: HashMap<Platform, Bundle>,
}

impl BundleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the bundle for `platform`.
    ///
    /// # Errors
    /// Returns [`AssetError::TooLarge`] if the bundle's size does not fit
    /// the transfer header.
    pub fn insert(&mut self, platform: Platform, bundle: Bundle) -> Result<(), AssetError> {
        if u32::try_from(bundle.len()).is_err() {
            return Err(AssetError::TooLarge(bundle.len()));
        }
        info!(
            %platform,
            bundle = %bundle.info.display_name,
            identity = %bundle.info.identity,
            bytes = bundle.len(),
            "bundle published"
        );
        self.bundles.insert(platform, bundle);
        Ok(())
    }

    pub fn remove(&mut self, platform: Platform) -> Option<Bundle> {
        self.bundles.remove(&platform)
    }

    pub fn get(&self, platform: Platform) -> Option<&Bundle> {
        self.bundles.get(&platform)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Bytes held across every platform's bundle.
    pub fn total_bytes(&self) -> usize {
        self.bundles.values().map(Bundle::len).sum()
    }
}

/// Bytes sent so far to one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub sent: usize,
    pub total: usize,
}

#[derive(Debug)]
struct OutgoingTransfer {
    display_name: String,
    data: Bytes,
    cursor: usize,
}

/// Serves bundles to recipients.
#[derive(Debug)]
pub struct AssetSender {
    catalog: BundleCatalog,
    max_chunk: usize,
    /// Ordered so chunk emission order is stable across ticks.
    transfers: BTreeMap<ConnectionId, OutgoingTransfer>,
    loaded: HashSet<ConnectionId>,
}

impl AssetSender {
    /// `max_chunk` is clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn new(catalog: BundleCatalog, max_chunk: usize) -> Self {
        let clamped = max_chunk.clamp(1, MAX_CHUNK_SIZE);
        if clamped != max_chunk {
            warn!(max_chunk, clamped, "chunk size out of range, clamping");
        }
        Self {
            catalog,
            max_chunk: clamped,
            transfers: BTreeMap::new(),
            loaded: HashSet::new(),
        }
    }

    pub fn catalog(&self) -> &BundleCatalog {
        &self.catalog
    }

    /// Mutable catalog access. Transfers already in flight keep streaming
    /// the bundle they started with.
    pub fn catalog_mut(&mut self) -> &mut BundleCatalog {
        &mut self.catalog
    }

    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    /// Answers an info request.
    ///
    /// # Errors
    /// Fails only if the reply cannot be encoded.
    pub fn handle_info_request(
        &self,
        from: ConnectionId,
        request: RequestBundleInfo,
    ) -> Result<Bytes, ProtocolError> {
        let bundle = self.catalog.get(request.platform).map(|b| b.info.clone());
        debug!(%from, platform = %request.platform, found = bundle.is_some(), "bundle info requested");
        BundleInfoReport { bundle }.to_message()
    }

    /// Answers a download request and queues the transfer.
    ///
    /// Returns `Ok(None)` if a transfer to `from` is already in flight;
    /// only one transfer per connection is allowed and the request is
    /// ignored.
    ///
    /// # Errors
    /// Fails only if the reply cannot be encoded.
    pub fn handle_download_request(
        &mut self,
        from: ConnectionId,
        request: RequestBundleDownload,
    ) -> Result<Option<Bytes>, ProtocolError> {
        if self.transfers.contains_key(&from) {
            warn!(%from, "download requested while a transfer is in flight, ignoring");
            return Ok(None);
        }
        let Some(bundle) = self.catalog.get(request.platform) else {
            info!(%from, platform = %request.platform, "download requested but no bundle for platform");
            return DownloadStart { bundle: None }.to_message().map(Some);
        };

        let total = u32::try_from(bundle.len())
            .map_err(|_| ProtocolError::InvalidMessage(format!("bundle of {} bytes", bundle.len())))?;
        let start = DownloadStart {
            bundle: Some((bundle.info.clone(), total)),
        }
        .to_message()?;

        info!(
            %from,
            bundle = %bundle.info.display_name,
            bytes = bundle.len(),
            "bundle transfer queued"
        );
        self.loaded.remove(&from);
        if !bundle.is_empty() {
            self.transfers.insert(
                from,
                OutgoingTransfer {
                    display_name: bundle.info.display_name.clone(),
                    data: bundle.data.clone(),
                    cursor: 0,
                },
            );
        }
        Ok(Some(start))
    }

    /// Takes the next chunk for every active transfer: at most one per
    /// recipient. Finished transfers are dropped.
    pub fn next_chunks(&mut self) -> Vec<(ConnectionId, Bytes)> {
        let mut out = Vec::with_capacity(self.transfers.len());
        let max_chunk = self.max_chunk;
        self.transfers.retain(|&to, transfer| {
            let end = (transfer.cursor + max_chunk).min(transfer.data.len());
            let chunk = transfer.data.slice(transfer.cursor..end);
            transfer.cursor = end;
            trace!(%to, bytes = chunk.len(), sent = end, total = transfer.data.len(), "bundle chunk");
            out.push((to, download_chunk_message(&chunk)));

            let done = transfer.cursor >= transfer.data.len();
            if done {
                debug!(%to, bundle = %transfer.display_name, "bundle transfer fully sent");
            }
            !done
        });
        out
    }

    /// Drops everything queued for `conn`.
    pub fn on_disconnected(&mut self, conn: ConnectionId) {
        if let Some(t) = self.transfers.remove(&conn) {
            debug!(
                %conn,
                sent = t.cursor,
                total = t.data.len(),
                "recipient left mid-transfer, abandoning"
            );
        }
        self.loaded.remove(&conn);
    }

    /// The recipient reported a successful load.
    pub fn handle_load_completed(&mut self, from: ConnectionId) {
        info!(%from, "recipient finished loading bundle");
        self.loaded.insert(from);
    }

    pub fn progress(&self, conn: ConnectionId) -> Option<TransferProgress> {
        self.transfers.get(&conn).map(|t| TransferProgress {
            sent: t.cursor,
            total: t.data.len(),
        })
    }

    /// Returns `true` if `conn` reported loading the bundle it was sent.
    pub fn has_loaded(&self, conn: ConnectionId) -> bool {
        self.loaded.contains(&conn)
    }

    pub fn active_transfers(&self) -> usize {
        self.transfers.len()
    }
}

#[cfg(test)]
mod tests {
    use scenecast_protocol::{CommandFrame, command};

    use super::*;

    fn catalog_with(platform: Platform, len: usize) -> BundleCatalog {
        let mut catalog = BundleCatalog::new();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        catalog
            .insert(platform, Bundle::from_bytes("Scene", Bytes::from(data)))
            .unwrap();
        catalog
    }

    fn payload(msg: &Bytes) -> (&str, &[u8]) {
        let frame = CommandFrame::parse(msg).unwrap();
        (frame.command, frame.payload)
    }

    #[test]
    fn test_catalog_counts_bytes_across_platforms() {
        let mut catalog = catalog_with(Platform::Android, 100);
        catalog
            .insert(Platform::Ios, Bundle::from_bytes("Other", Bytes::from(vec![0; 50])))
            .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.total_bytes(), 150);
        catalog.remove(Platform::Android);
        assert_eq!(catalog.total_bytes(), 50);
    }

    #[test]
    fn test_info_request_reports_bundle_for_platform() {
        let sender = AssetSender::new(catalog_with(Platform::Android, 10), MAX_CHUNK_SIZE);
        let conn = ConnectionId::new(1);

        let msg = sender
            .handle_info_request(conn, RequestBundleInfo { platform: Platform::Android })
            .unwrap();
        let (cmd, body) = payload(&msg);
        assert_eq!(cmd, command::REPORT_ASSET_BUNDLE_INFO);
        let report = BundleInfoReport::read(body).unwrap();
        assert_eq!(report.bundle.unwrap().display_name, "Scene");

        let msg = sender
            .handle_info_request(conn, RequestBundleInfo { platform: Platform::Ios })
            .unwrap();
        let report = BundleInfoReport::read(payload(&msg).1).unwrap();
        assert!(report.bundle.is_none());
    }

    #[test]
    fn test_one_chunk_per_recipient_per_call() {
        let mut sender = AssetSender::new(catalog_with(Platform::Android, 25), 10);
        let a = ConnectionId::new(1);
        let b = ConnectionId::new(2);
        let req = RequestBundleDownload { platform: Platform::Android };
        sender.handle_download_request(a, req).unwrap().unwrap();
        sender.handle_download_request(b, req).unwrap().unwrap();

        let sizes = |chunks: Vec<(ConnectionId, Bytes)>| -> Vec<(ConnectionId, usize)> {
            chunks
                .iter()
                .map(|(c, m)| (*c, payload(m).1.len()))
                .collect()
        };
        assert_eq!(sizes(sender.next_chunks()), vec![(a, 10), (b, 10)]);
        assert_eq!(sender.progress(a), Some(TransferProgress { sent: 10, total: 25 }));
        assert_eq!(sizes(sender.next_chunks()), vec![(a, 10), (b, 10)]);
        assert_eq!(sizes(sender.next_chunks()), vec![(a, 5), (b, 5)]);
        assert!(sender.next_chunks().is_empty());
        assert_eq!(sender.active_transfers(), 0);
    }

    #[test]
    fn test_second_request_while_in_flight_is_ignored() {
        let mut sender = AssetSender::new(catalog_with(Platform::Android, 25), 10);
        let conn = ConnectionId::new(1);
        let req = RequestBundleDownload { platform: Platform::Android };
        assert!(sender.handle_download_request(conn, req).unwrap().is_some());
        sender.next_chunks();

        assert!(sender.handle_download_request(conn, req).unwrap().is_none());
        assert_eq!(sender.progress(conn).unwrap().sent, 10);
    }

    #[test]
    fn test_download_without_bundle_reports_no_asset() {
        let mut sender = AssetSender::new(BundleCatalog::new(), MAX_CHUNK_SIZE);
        let msg = sender
            .handle_download_request(
                ConnectionId::new(1),
                RequestBundleDownload { platform: Platform::Android },
            )
            .unwrap()
            .unwrap();
        let start = DownloadStart::read(payload(&msg).1).unwrap();
        assert!(start.bundle.is_none());
        assert_eq!(sender.active_transfers(), 0);
    }

    #[test]
    fn test_disconnect_abandons_transfer() {
        let mut sender = AssetSender::new(catalog_with(Platform::Android, 25), 10);
        let conn = ConnectionId::new(1);
        sender
            .handle_download_request(conn, RequestBundleDownload { platform: Platform::Android })
            .unwrap();
        sender.next_chunks();

        sender.on_disconnected(conn);
        assert!(sender.next_chunks().is_empty());
        assert!(sender.progress(conn).is_none());
    }

    #[test]
    fn test_load_completed_is_tracked_per_recipient() {
        let mut sender = AssetSender::new(catalog_with(Platform::Android, 5), 10);
        let conn = ConnectionId::new(3);
        sender.handle_load_completed(conn);
        assert!(sender.has_loaded(conn));

        // A fresh download resets the flag until the recipient reports again.
        sender
            .handle_download_request(conn, RequestBundleDownload { platform: Platform::Android })
            .unwrap();
        assert!(!sender.has_loaded(conn));
    }

    #[test]
    fn test_chunk_size_is_clamped() {
        assert_eq!(AssetSender::new(BundleCatalog::new(), 0).max_chunk(), 1);
        assert_eq!(
            AssetSender::new(BundleCatalog::new(), 10 * MAX_CHUNK_SIZE).max_chunk(),
            MAX_CHUNK_SIZE
        );
    }
}
