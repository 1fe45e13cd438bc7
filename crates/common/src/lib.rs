use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Opaque identifier handed out by the media catalog.
pub type EntityId = i64;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub album_ids: BTreeSet<EntityId>,
    #[serde(default)]
    pub track_ids: BTreeSet<EntityId>,
}

impl Artist {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            album_ids: BTreeSet::new(),
            track_ids: BTreeSet::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: EntityId,
    pub name: String,
    pub artist_id: EntityId,
    pub album_art: Option<String>,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    #[serde(default)]
    pub track_ids: BTreeSet<EntityId>,
}

impl Album {
    /// Builds an album from its row name and the detail record fetched for it.
    pub fn new(
        id: EntityId,
        name: impl Into<String>,
        artist_id: EntityId,
        detail: AlbumDetail,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            artist_id,
            album_art: detail.album_art,
            first_year: detail.first_year,
            last_year: detail.last_year,
            track_ids: BTreeSet::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: EntityId,
    pub path: String,
    pub title: String,
    pub duration_ms: u64,
    pub track_number: Option<u32>,
    /// Unset while no row for this track resolved its album.
    pub album_id: Option<EntityId>,
    pub artist_id: Option<EntityId>,
}

impl Track {
    pub fn is_orphaned(&self) -> bool {
        self.album_id.is_none()
    }
}

/// Per-album metadata that track rows do not carry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumDetail {
    pub album_art: Option<String>,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
}

/// One flat catalog row. Field names match the catalog's column names; every
/// column may be null, the indexer decides which ones it can live without.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRow {
    pub track_id: Option<EntityId>,
    pub path: Option<String>,
    pub title: Option<String>,
    pub duration: Option<u64>,
    pub track_number: Option<u32>,
    pub artist_id: Option<EntityId>,
    pub artist: Option<String>,
    pub album_id: Option<EntityId>,
    pub album: Option<String>,
}

impl CatalogRow {
    /// Convenience constructor for a row with every column present.
    #[allow(clippy::too_many_arguments)]
    pub fn complete(
        track_id: EntityId,
        path: &str,
        title: &str,
        duration: u64,
        track_number: u32,
        artist_id: EntityId,
        artist: &str,
        album_id: EntityId,
        album: &str,
    ) -> Self {
        Self {
            track_id: Some(track_id),
            path: Some(path.to_string()),
            title: Some(title.to_string()),
            duration: Some(duration),
            track_number: Some(track_number),
            artist_id: Some(artist_id),
            artist: Some(artist.to_string()),
            album_id: Some(album_id),
            album: Some(album.to_string()),
        }
    }
}

/// A catalog entry as stored by a catalog: the row plus the attributes the
/// catalog filters on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub is_music: bool,
    pub row: CatalogRow,
}

impl MediaEntry {
    pub fn music(row: CatalogRow) -> Self {
        Self { is_music: true, row }
    }
}
