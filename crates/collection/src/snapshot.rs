use std::collections::{HashMap, HashSet};

use common::{Album, Artist, CatalogRow, EntityId, Track, UNKNOWN_ALBUM, UNKNOWN_ARTIST};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::sort::{sort_albums, sort_artists, sort_tracks, TrackSort};
use crate::source::{AlbumDetailSource, RowSource, Selection, SourceError};

/// One fully linked collection graph. Entities own nothing of each other;
/// every relationship is an id resolved through the maps below.
#[derive(Clone, Debug, Default)]
pub struct CollectionSnapshot {
    artists: HashMap<EntityId, Artist>,
    albums: HashMap<EntityId, Album>,
    tracks: HashMap<EntityId, Track>,
    rows_read: usize,
    skipped_rows: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
    pub orphaned_tracks: usize,
    pub rows_read: usize,
    pub skipped_rows: usize,
}

impl CollectionSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.artists.is_empty() && self.albums.is_empty() && self.tracks.is_empty()
    }

    pub fn get_artist(&self, id: EntityId) -> Option<&Artist> {
        self.artists.get(&id)
    }

    pub fn get_album(&self, id: EntityId) -> Option<&Album> {
        self.albums.get(&id)
    }

    pub fn get_track(&self, id: EntityId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn artists(&self) -> Vec<Artist> {
        let mut artists: Vec<Artist> = self.artists.values().cloned().collect();
        sort_artists(&mut artists);
        artists
    }

    pub fn albums(&self) -> Vec<Album> {
        let mut albums: Vec<Album> = self.albums.values().cloned().collect();
        sort_albums(&mut albums);
        albums
    }

    pub fn tracks(&self, mode: TrackSort) -> Vec<Track> {
        let mut tracks: Vec<Track> = self.tracks.values().cloned().collect();
        sort_tracks(&mut tracks, mode);
        tracks
    }

    pub fn artist_albums(&self, artist_id: EntityId) -> Vec<Album> {
        let mut albums: Vec<Album> = match self.artists.get(&artist_id) {
            Some(artist) => artist
                .album_ids
                .iter()
                .filter_map(|id| self.albums.get(id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        sort_albums(&mut albums);
        albums
    }

    pub fn artist_tracks(&self, artist_id: EntityId) -> Vec<Track> {
        let mut tracks: Vec<Track> = match self.artists.get(&artist_id) {
            Some(artist) => artist
                .track_ids
                .iter()
                .filter_map(|id| self.tracks.get(id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        sort_tracks(&mut tracks, TrackSort::Alphabetical);
        tracks
    }

    pub fn album_tracks(&self, album_id: EntityId) -> Vec<Track> {
        let mut tracks: Vec<Track> = match self.albums.get(&album_id) {
            Some(album) => album
                .track_ids
                .iter()
                .filter_map(|id| self.tracks.get(id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        sort_tracks(&mut tracks, TrackSort::TrackNumber);
        tracks
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            artists: self.artists.len(),
            albums: self.albums.len(),
            tracks: self.tracks.len(),
            orphaned_tracks: self.tracks.values().filter(|t| t.is_orphaned()).count(),
            rows_read: self.rows_read,
            skipped_rows: self.skipped_rows,
        }
    }

    /// Content digest of the graph: equal for snapshots holding the same
    /// entities, attributes and links, whatever order they were built in.
    pub fn fingerprint(&self) -> Result<String, bincode::Error> {
        let mut artists: Vec<&Artist> = self.artists.values().collect();
        artists.sort_by_key(|artist| artist.id);
        let mut albums: Vec<&Album> = self.albums.values().collect();
        albums.sort_by_key(|album| album.id);
        let mut tracks: Vec<&Track> = self.tracks.values().collect();
        tracks.sort_by_key(|track| track.id);

        let bytes = bincode::serialize(&(artists, albums, tracks))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

/// Reads every row of `rows` and builds a new snapshot from them. Nothing is
/// returned unless the whole pass succeeds.
pub fn build_snapshot<R, D>(
    rows: &R,
    details: &D,
    selection: Selection,
) -> Result<CollectionSnapshot, SourceError>
where
    R: RowSource + ?Sized,
    D: AlbumDetailSource + ?Sized,
{
    let mut builder = SnapshotBuilder::new(details);
    for row in rows.query_tracks(selection)? {
        builder.apply_row(row?)?;
    }
    Ok(builder.finish())
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct MalformedRow {
    track_id: Option<EntityId>,
    missing: &'static str,
}

impl std::fmt::Display for MalformedRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.track_id {
            Some(id) => write!(f, "row for track {} has no {}", id, self.missing),
            None => write!(f, "row has no {}", self.missing),
        }
    }
}

/// A catalog row with every column the indexer depends on.
#[derive(Debug)]
struct TrackRow {
    track_id: EntityId,
    path: String,
    title: String,
    duration_ms: u64,
    track_number: Option<u32>,
    artist_id: EntityId,
    artist_name: String,
    album_id: EntityId,
    album_name: String,
}

impl TryFrom<CatalogRow> for TrackRow {
    type Error = MalformedRow;

    fn try_from(row: CatalogRow) -> Result<Self, Self::Error> {
        let track_id = row.track_id;
        let missing = |column: &'static str| MalformedRow {
            track_id,
            missing: column,
        };
        Ok(TrackRow {
            track_id: row.track_id.ok_or_else(|| missing("track_id"))?,
            path: row.path.ok_or_else(|| missing("path"))?,
            title: row.title.ok_or_else(|| missing("title"))?,
            duration_ms: row.duration.unwrap_or(0),
            track_number: row.track_number.filter(|number| *number > 0),
            artist_id: row.artist_id.ok_or_else(|| missing("artist_id"))?,
            artist_name: row.artist.unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            album_id: row.album_id.ok_or_else(|| missing("album_id"))?,
            album_name: row.album.unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
        })
    }
}

struct SnapshotBuilder<'a, D: ?Sized> {
    details: &'a D,
    snapshot: CollectionSnapshot,
    // Albums whose detail lookup came back empty during this pass.
    missing_albums: HashSet<EntityId>,
}

impl<'a, D: AlbumDetailSource + ?Sized> SnapshotBuilder<'a, D> {
    fn new(details: &'a D) -> Self {
        Self {
            details,
            snapshot: CollectionSnapshot::empty(),
            missing_albums: HashSet::new(),
        }
    }

    fn apply_row(&mut self, row: CatalogRow) -> Result<(), SourceError> {
        self.snapshot.rows_read += 1;
        let row = match TrackRow::try_from(row) {
            Ok(row) => row,
            Err(err) => {
                warn!("Skipping catalog row: {}", err);
                self.snapshot.skipped_rows += 1;
                return Ok(());
            }
        };

        self.resolve_artist(&row);
        let album_resolved = self.resolve_album(&row)?;
        self.resolve_track(&row);
        if album_resolved {
            self.link(&row);
        }
        Ok(())
    }

    fn resolve_artist(&mut self, row: &TrackRow) {
        if self.snapshot.artists.contains_key(&row.artist_id) {
            return;
        }
        let artist = Artist::new(row.artist_id, row.artist_name.clone());
        debug!("New artist {}: {}", artist.id, artist.name);
        self.snapshot.artists.insert(artist.id, artist);
    }

    fn resolve_album(&mut self, row: &TrackRow) -> Result<bool, SourceError> {
        if self.snapshot.albums.contains_key(&row.album_id) {
            return Ok(true);
        }
        if self.missing_albums.contains(&row.album_id) {
            return Ok(false);
        }

        match self.details.album_detail(row.album_id)? {
            Some(detail) => {
                let album = Album::new(row.album_id, row.album_name.clone(), row.artist_id, detail);
                debug!("New album {}: {}", album.id, album.name);
                self.snapshot.albums.insert(album.id, album);
                Ok(true)
            }
            None => {
                debug!(
                    "No detail record for album {}; tracks referencing it stay unlinked",
                    row.album_id
                );
                self.missing_albums.insert(row.album_id);
                Ok(false)
            }
        }
    }

    fn resolve_track(&mut self, row: &TrackRow) {
        if self.snapshot.tracks.contains_key(&row.track_id) {
            return;
        }
        let track = Track {
            id: row.track_id,
            path: row.path.clone(),
            title: row.title.clone(),
            duration_ms: row.duration_ms,
            track_number: row.track_number,
            album_id: None,
            artist_id: None,
        };
        debug!("New track {}: {}", track.id, track.title);
        self.snapshot.tracks.insert(track.id, track);
    }

    fn link(&mut self, row: &TrackRow) {
        let snapshot = &mut self.snapshot;
        if let Some(artist) = snapshot.artists.get_mut(&row.artist_id) {
            artist.album_ids.insert(row.album_id);
            artist.track_ids.insert(row.track_id);
        }
        if let Some(album) = snapshot.albums.get_mut(&row.album_id) {
            album.track_ids.insert(row.track_id);
            album.artist_id = row.artist_id;
        }
        if let Some(track) = snapshot.tracks.get_mut(&row.track_id) {
            track.album_id = Some(row.album_id);
            track.artist_id = Some(row.artist_id);
        }
    }

    fn finish(self) -> CollectionSnapshot {
        self.snapshot
    }
}
