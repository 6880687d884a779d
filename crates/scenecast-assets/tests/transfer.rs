//! Sender ↔ receiver transfer tests, wired message by message.

use bytes::Bytes;
use rand::Rng;
use scenecast_assets::{
    AssetCache, AssetError, AssetReceiver, AssetSender, AssetStatus, Bundle, BundleCatalog,
    BundleWriter, CodecRegistry, RegistryCache,
};
use scenecast_protocol::{
    BundleInfo, BundleInfoReport, CommandFrame, CommandPayload, DownloadStart, MAX_CHUNK_SIZE,
    Platform, RequestBundleDownload, RequestBundleInfo, command,
};
use scenecast_transport::ConnectionId;

/// Keeps the raw bytes it was given.
#[derive(Default)]
struct RawCache {
    info: Option<BundleInfo>,
    bytes: Vec<u8>,
}

impl AssetCache for RawCache {
    fn is_populated(&self) -> bool {
        self.info.is_some()
    }

    fn identity(&self) -> Option<&str> {
        self.info.as_ref().map(|i| i.identity.as_str())
    }

    fn load_bundle(&mut self, info: &BundleInfo, data: &[u8]) -> Result<(), AssetError> {
        self.info = Some(info.clone());
        self.bytes = data.to_vec();
        Ok(())
    }

    fn clear(&mut self) {
        self.info = None;
        self.bytes.clear();
    }
}

struct Harness<A> {
    conn: ConnectionId,
    sender: AssetSender,
    receiver: AssetReceiver<A>,
    statuses: Vec<AssetStatus>,
    chunk_sizes: Vec<usize>,
    load_completed: bool,
}

impl<A: AssetCache> Harness<A> {
    fn new(bundle: Bundle, max_chunk: usize, cache: A) -> Self {
        let mut catalog = BundleCatalog::new();
        catalog.insert(Platform::Android, bundle).unwrap();
        let receiver = AssetReceiver::new(Platform::Android, cache);
        let statuses = vec![receiver.status()];
        Self {
            conn: ConnectionId::new(1),
            sender: AssetSender::new(catalog, max_chunk),
            receiver,
            statuses,
            chunk_sizes: Vec::new(),
            load_completed: false,
        }
    }

    fn note_status(&mut self) {
        let status = self.receiver.status();
        if self.statuses.last() != Some(&status) {
            self.statuses.push(status);
        }
    }

    /// Delivers a spectator → host message and returns the host's replies.
    fn to_host(&mut self, msg: &Bytes) -> Vec<Bytes> {
        let frame = CommandFrame::parse(msg).unwrap();
        match frame.command {
            command::REQUEST_ASSET_BUNDLE_INFO => {
                let req = RequestBundleInfo::read(frame.payload).unwrap();
                vec![self.sender.handle_info_request(self.conn, req).unwrap()]
            }
            command::REQUEST_ASSET_BUNDLE_DOWNLOAD => {
                let req = RequestBundleDownload::read(frame.payload).unwrap();
                self.sender
                    .handle_download_request(self.conn, req)
                    .unwrap()
                    .into_iter()
                    .collect()
            }
            command::ASSET_LOAD_COMPLETED => {
                self.sender.handle_load_completed(self.conn);
                self.load_completed = true;
                Vec::new()
            }
            other => panic!("unexpected command to host: {other}"),
        }
    }

    /// Delivers a host → spectator message and returns the replies.
    fn to_spectator(&mut self, msg: &Bytes) -> Option<Bytes> {
        let frame = CommandFrame::parse(msg).unwrap();
        let reply = match frame.command {
            command::REPORT_ASSET_BUNDLE_INFO => self
                .receiver
                .handle_info_report(BundleInfoReport::read(frame.payload).unwrap()),
            command::REPORT_ASSET_BUNDLE_DOWNLOAD_START => self
                .receiver
                .handle_download_start(DownloadStart::read(frame.payload).unwrap()),
            command::REPORT_ASSET_BUNDLE_DOWNLOAD_DATA => {
                self.chunk_sizes.push(frame.payload.len());
                self.receiver.handle_chunk(frame.payload)
            }
            other => panic!("unexpected command to spectator: {other}"),
        };
        self.note_status();
        reply
    }

    fn exchange(&mut self, msg: Bytes) {
        for reply in self.to_host(&msg) {
            if let Some(back) = self.to_spectator(&reply) {
                self.exchange(back);
            }
        }
    }

    /// Connects, then runs host ticks until no transfer remains.
    fn run(&mut self) {
        let request = self.receiver.on_connected().unwrap();
        self.note_status();
        self.exchange(request);

        let mut ticks = 0;
        loop {
            let chunks = self.sender.next_chunks();
            if chunks.is_empty() {
                break;
            }
            assert_eq!(chunks.len(), 1, "one chunk per recipient per tick");
            for (_, msg) in chunks {
                if let Some(back) = self.to_spectator(&msg) {
                    self.exchange(back);
                }
            }
            ticks += 1;
            assert!(ticks < 10_000, "transfer did not finish");
        }
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    data
}

#[test]
fn test_600k_bundle_arrives_in_three_chunks() {
    let data = random_bytes(600_000);
    let bundle = Bundle::from_bytes("Big", Bytes::from(data.clone()));
    let mut h = Harness::new(bundle, MAX_CHUNK_SIZE, RawCache::default());

    h.run();

    assert_eq!(h.chunk_sizes, vec![262_144, 262_144, 75_712]);
    assert_eq!(
        h.statuses,
        vec![
            AssetStatus::None,
            AssetStatus::RequestingAssetBundle,
            AssetStatus::DownloadingAssetBundle,
            AssetStatus::AssetBundleLoaded,
        ]
    );
    assert_eq!(h.receiver.cache().bytes, data);
    assert!(h.load_completed);
    assert!(h.sender.has_loaded(h.conn));
}

#[test]
fn test_random_bundles_reconstruct_exactly() {
    let mut rng = rand::rng();
    for _ in 0..8 {
        let len = rng.random_range(1..200_000);
        let max_chunk = rng.random_range(1..=65_536);
        let data = random_bytes(len);
        let bundle = Bundle::from_bytes("Random", Bytes::from(data.clone()));
        let mut h = Harness::new(bundle, max_chunk, RawCache::default());

        h.run();

        assert_eq!(h.receiver.status(), AssetStatus::AssetBundleLoaded);
        assert_eq!(h.receiver.cache().bytes, data, "len {len} chunk {max_chunk}");
        assert_eq!(h.chunk_sizes.iter().sum::<usize>(), len);
        assert_eq!(h.chunk_sizes.len(), len.div_ceil(max_chunk));
        assert!(h.chunk_sizes.iter().all(|&n| n <= max_chunk));
    }
}

#[test]
fn test_registry_cache_materializes_streamed_bundle() {
    let mut writer = BundleWriter::new();
    writer
        .add("text", "title", b"Living Room")
        .add("blob", "mesh/sofa", &random_bytes(50_000));
    let bundle = writer.finish("Living Room");
    let identity = bundle.info.identity.clone();

    let cache = RegistryCache::new(CodecRegistry::with_builtin());
    let mut h = Harness::new(bundle, 4_096, cache);
    h.run();

    assert_eq!(h.receiver.status(), AssetStatus::AssetBundleLoaded);
    let cache = h.receiver.cache();
    assert_eq!(cache.identity(), Some(identity.as_str()));
    assert_eq!(
        cache.get::<String>("text", "title").as_deref().map(String::as_str),
        Some("Living Room")
    );
}

#[test]
fn test_matching_identity_never_requests_download() {
    let data = random_bytes(1_000);
    let bundle = Bundle::from_bytes("Cached", Bytes::from(data.clone()));
    let mut cache = RawCache::default();
    cache.load_bundle(&bundle.info, &data).unwrap();

    let mut h = Harness::new(bundle, MAX_CHUNK_SIZE, cache);
    h.run();

    assert!(h.chunk_sizes.is_empty());
    assert_eq!(h.sender.active_transfers(), 0);
    assert_eq!(
        h.statuses,
        vec![
            AssetStatus::Preloaded,
            AssetStatus::RequestingAssetBundle,
            AssetStatus::AssetBundleLoaded,
        ]
    );
}

#[test]
fn test_chunk_overflowing_declared_size_fails_transfer() {
    let mut receiver = AssetReceiver::new(Platform::Android, RawCache::default());
    receiver.on_connected();
    receiver.handle_download_start(DownloadStart {
        bundle: Some((
            BundleInfo {
                identity: "abc".into(),
                display_name: "Short".into(),
            },
            14,
        )),
    });
    receiver.handle_chunk(&[1; 10]);
    assert_eq!(receiver.progress().unwrap().received, 10);

    // 10 bytes claimed when only 4 remain.
    receiver.handle_chunk(&[2; 10]);

    let state = receiver.state();
    assert_eq!(state.status, AssetStatus::ErrorDownloadingAssetBundle);
    assert!(state.display_name.is_none());
    assert!(state.progress.is_none());
    assert!(receiver.progress().is_none());
    assert!(!receiver.cache().is_populated());

    // Recoverable on the next connection.
    receiver.on_connected();
    assert_eq!(receiver.status(), AssetStatus::RequestingAssetBundle);
}
