mod catalog;
mod snapshot;
mod sort;
mod source;

use std::sync::Arc;
use std::time::Instant;

use common::{Album, Artist, EntityId, Track};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

pub use catalog::{Catalog, CatalogError, ImportStats};
pub use snapshot::{build_snapshot, CollectionSnapshot, CollectionStats};
pub use sort::{compare_albums, compare_artists, sort_albums, sort_artists, sort_tracks, TrackSort};
pub use source::{AlbumDetailSource, MemoryCatalog, RowSource, Rows, Selection, SourceError};

/// The listing surface a media-player UI reads a collection through.
pub trait Collection {
    fn get_artists(&self) -> Vec<Artist>;

    fn get_albums(&self) -> Vec<Album>;

    fn get_tracks(&self) -> Vec<Track> {
        self.get_tracks_sorted(TrackSort::Alphabetical)
    }

    fn get_tracks_sorted(&self, mode: TrackSort) -> Vec<Track>;

    /// Whether the collection lives on this device.
    fn is_local(&self) -> bool;

    /// Re-reads the collection from wherever it comes from.
    fn update(&self) -> Result<CollectionStats, CollectionError>;
}

#[derive(Debug)]
pub enum CollectionError {
    SourceUnavailable(SourceError),
    Background(String),
}

impl std::fmt::Display for CollectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionError::SourceUnavailable(err) => write!(f, "rebuild aborted: {}", err),
            CollectionError::Background(reason) => {
                write!(f, "background rebuild failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for CollectionError {}

impl From<SourceError> for CollectionError {
    fn from(err: SourceError) -> Self {
        CollectionError::SourceUnavailable(err)
    }
}

/// The collection of tracks in the device's own media catalog.
///
/// Readers always see the snapshot published by the last successful rebuild.
/// A rebuild builds its snapshot off to the side and swaps it in only once the
/// whole catalog has been read, so a failed rebuild leaves the previous
/// snapshot in place.
pub struct LocalCollection<R, D> {
    rows: R,
    details: D,
    selection: Selection,
    current: RwLock<Arc<CollectionSnapshot>>,
    rebuild_lock: Mutex<()>,
}

impl<R, D> LocalCollection<R, D>
where
    R: RowSource,
    D: AlbumDetailSource,
{
    /// Creates an empty collection; nothing is read until [`rebuild`](Self::rebuild).
    pub fn new(rows: R, details: D) -> Self {
        Self {
            rows,
            details,
            selection: Selection::PlayableAudio,
            current: RwLock::new(Arc::new(CollectionSnapshot::empty())),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Creates the collection and runs the first rebuild.
    pub fn load(rows: R, details: D) -> Result<Self, CollectionError> {
        let collection = Self::new(rows, details);
        collection.rebuild()?;
        Ok(collection)
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Discards the current graph and indexes the whole catalog again.
    pub fn rebuild(&self) -> Result<CollectionStats, CollectionError> {
        let _guard = self.rebuild_lock.lock();
        let started = Instant::now();

        let snapshot = match build_snapshot(&self.rows, &self.details, self.selection) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Collection rebuild failed, keeping previous snapshot: {}", err);
                return Err(err.into());
            }
        };

        let stats = snapshot.stats();
        *self.current.write() = Arc::new(snapshot);
        info!(
            "Collection rebuilt in {:?}: {} artists, {} albums, {} tracks \
             ({} orphaned, {} rows skipped)",
            started.elapsed(),
            stats.artists,
            stats.albums,
            stats.tracks,
            stats.orphaned_tracks,
            stats.skipped_rows
        );
        Ok(stats)
    }

    /// The snapshot published by the last successful rebuild.
    pub fn snapshot(&self) -> Arc<CollectionSnapshot> {
        self.current.read().clone()
    }

    pub fn stats(&self) -> CollectionStats {
        self.snapshot().stats()
    }

    pub fn get_artist(&self, artist_id: EntityId) -> Option<Artist> {
        self.snapshot().get_artist(artist_id).cloned()
    }

    pub fn get_album(&self, album_id: EntityId) -> Option<Album> {
        self.snapshot().get_album(album_id).cloned()
    }

    pub fn get_track(&self, track_id: EntityId) -> Option<Track> {
        self.snapshot().get_track(track_id).cloned()
    }

    pub fn artist_albums(&self, artist_id: EntityId) -> Vec<Album> {
        self.snapshot().artist_albums(artist_id)
    }

    pub fn artist_tracks(&self, artist_id: EntityId) -> Vec<Track> {
        self.snapshot().artist_tracks(artist_id)
    }

    pub fn album_tracks(&self, album_id: EntityId) -> Vec<Track> {
        self.snapshot().album_tracks(album_id)
    }
}

impl<R, D> Collection for LocalCollection<R, D>
where
    R: RowSource,
    D: AlbumDetailSource,
{
    fn get_artists(&self) -> Vec<Artist> {
        self.snapshot().artists()
    }

    fn get_albums(&self) -> Vec<Album> {
        self.snapshot().albums()
    }

    fn get_tracks_sorted(&self, mode: TrackSort) -> Vec<Track> {
        self.snapshot().tracks(mode)
    }

    fn is_local(&self) -> bool {
        true
    }

    fn update(&self) -> Result<CollectionStats, CollectionError> {
        self.rebuild()
    }
}

/// Runs one rebuild on tokio's blocking pool. Readers keep seeing the previous
/// snapshot until it completes.
pub async fn rebuild_in_background<R, D>(
    collection: Arc<LocalCollection<R, D>>,
) -> Result<CollectionStats, CollectionError>
where
    R: RowSource + Send + Sync + 'static,
    D: AlbumDetailSource + Send + Sync + 'static,
{
    match tokio::task::spawn_blocking(move || collection.rebuild()).await {
        Ok(result) => result,
        Err(err) => Err(CollectionError::Background(err.to_string())),
    }
}
