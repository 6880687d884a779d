//! The observer-side asset state machine.
//!
//! [`AssetStatus`] is the tag, [`AssetState`] the full value observers see.
//! Every change replaces the value wholesale through a `watch` channel, so
//! a subscriber always reads a consistent snapshot and is woken once per
//! transition.

use std::fmt;

use tokio::sync::watch;
use tracing::{debug, warn};

/// Where the observer is in bundle negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetStatus {
    /// No local cache and no bundle.
    None,
    /// The local cache holds assets; nothing is being negotiated.
    Preloaded,
    /// Connected and asked the host what it has.
    RequestingAssetBundle,
    /// Receiving chunks; size is known.
    DownloadingAssetBundle,
    /// A bundle is loaded and usable.
    AssetBundleLoaded,
    /// The host has nothing and there is no local cache.
    NonePreloadedAndNoAssetBundleAvailable,
    /// The transfer broke protocol (a chunk overran the declared size).
    ErrorDownloadingAssetBundle,
    /// All bytes arrived but the bundle would not load.
    ErrorLoadingAssetBundle,
}

impl AssetStatus {
    /// Returns `true` if `self → next` is a legal transition.
    ///
    /// Besides the negotiation edges, an interrupted negotiation
    /// (`Requesting`/`Downloading` on disconnect) falls back to `Preloaded`
    /// or `None`, and a host with nothing to offer leaves a populated cache
    /// in `Preloaded`.
    pub fn can_transition_to(self, next: AssetStatus) -> bool {
        use AssetStatus as S;
        match self {
            S::None => matches!(next, S::Preloaded | S::RequestingAssetBundle),
            S::Preloaded => matches!(next, S::RequestingAssetBundle),
            S::RequestingAssetBundle => matches!(
                next,
                S::AssetBundleLoaded
                    | S::DownloadingAssetBundle
                    | S::NonePreloadedAndNoAssetBundleAvailable
                    | S::Preloaded
                    | S::None
            ),
            S::DownloadingAssetBundle => matches!(
                next,
                S::AssetBundleLoaded
                    | S::ErrorDownloadingAssetBundle
                    | S::ErrorLoadingAssetBundle
                    | S::Preloaded
                    | S::None
            ),
            S::AssetBundleLoaded
            | S::NonePreloadedAndNoAssetBundleAvailable
            | S::ErrorDownloadingAssetBundle
            | S::ErrorLoadingAssetBundle => matches!(next, S::RequestingAssetBundle),
        }
    }

    /// Returns `true` while a negotiation with the host is under way.
    pub fn is_negotiating(self) -> bool {
        matches!(
            self,
            AssetStatus::RequestingAssetBundle | AssetStatus::DownloadingAssetBundle
        )
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            AssetStatus::ErrorDownloadingAssetBundle | AssetStatus::ErrorLoadingAssetBundle
        )
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Bytes received so far out of the declared total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub received: usize,
    pub total: usize,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`. An empty transfer is complete.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.received as f32 / self.total as f32
        }
    }
}

/// A snapshot of the observer's asset situation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetState {
    pub status: AssetStatus,
    /// Bundle display name, when one is known for this status.
    pub display_name: Option<String>,
    /// Set only while downloading.
    pub progress: Option<Progress>,
    /// Set only for error statuses.
    pub error: Option<String>,
}

impl AssetState {
    /// A state carrying only a status.
    pub fn new(status: AssetStatus) -> Self {
        Self {
            status,
            display_name: None,
            progress: None,
            error: None,
        }
    }

    pub fn loaded(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            ..Self::new(AssetStatus::AssetBundleLoaded)
        }
    }

    pub fn downloading(display_name: impl Into<String>, received: usize, total: usize) -> Self {
        Self {
            display_name: Some(display_name.into()),
            progress: Some(Progress { received, total }),
            ..Self::new(AssetStatus::DownloadingAssetBundle)
        }
    }

    pub fn failed(status: AssetStatus, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(status)
        }
    }
}

impl Default for AssetState {
    fn default() -> Self {
        Self::new(AssetStatus::None)
    }
}

/// Owner of the current [`AssetState`]; refuses illegal transitions.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<AssetState>,
}

impl StateCell {
    pub(crate) fn new(initial: AssetState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub(crate) fn status(&self) -> AssetStatus {
        self.tx.borrow().status
    }

    pub(crate) fn get(&self) -> AssetState {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<AssetState> {
        self.tx.subscribe()
    }

    /// Replaces the state if the transition is legal.
    ///
    /// Replacing a downloading state with a newer downloading state (a
    /// progress update) is always allowed.
    pub(crate) fn set(&self, next: AssetState) -> bool {
        let current = self.status();
        let progress_update = current == AssetStatus::DownloadingAssetBundle
            && next.status == AssetStatus::DownloadingAssetBundle;
        if !progress_update && !current.can_transition_to(next.status) {
            warn!(from = %current, to = %next.status, "illegal asset state transition refused");
            return false;
        }
        if !progress_update {
            debug!(from = %current, to = %next.status, "asset state changed");
        }
        self.tx.send_replace(next);
        true
    }
}
