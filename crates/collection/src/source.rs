use std::collections::HashMap;
use std::sync::Arc;

use common::{AlbumDetail, CatalogRow, EntityId, MediaEntry};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Which catalog entries a track query returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Only entries the catalog flags as music.
    #[default]
    PlayableAudio,
    All,
}

impl Selection {
    pub fn matches(self, entry: &MediaEntry) -> bool {
        match self {
            Selection::PlayableAudio => entry.is_music,
            Selection::All => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceError {
    Unavailable(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unavailable(reason) => write!(f, "source unavailable: {}", reason),
        }
    }
}

impl std::error::Error for SourceError {}

pub type Rows<'a> = Box<dyn Iterator<Item = Result<CatalogRow, SourceError>> + 'a>;

/// The flat track catalog a collection is indexed from.
pub trait RowSource {
    /// Returns the catalog's rows in catalog order. An error here, or from any
    /// yielded item, means the catalog cannot be read.
    fn query_tracks(&self, selection: Selection) -> Result<Rows<'_>, SourceError>;
}

/// Secondary per-album lookup for metadata the track rows don't carry.
pub trait AlbumDetailSource {
    /// `Ok(None)` means the catalog has no record for `album_id`.
    fn album_detail(&self, album_id: EntityId) -> Result<Option<AlbumDetail>, SourceError>;
}

impl<T: RowSource + ?Sized> RowSource for Arc<T> {
    fn query_tracks(&self, selection: Selection) -> Result<Rows<'_>, SourceError> {
        (**self).query_tracks(selection)
    }
}

impl<T: AlbumDetailSource + ?Sized> AlbumDetailSource for Arc<T> {
    fn album_detail(&self, album_id: EntityId) -> Result<Option<AlbumDetail>, SourceError> {
        (**self).album_detail(album_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Availability {
    Available,
    Unavailable,
    /// Yields this many rows, then fails the iteration.
    FailAfter(usize),
    /// Rows are served but every album detail lookup fails.
    DetailsUnavailable,
}

#[derive(Debug)]
struct MemoryState {
    entries: Vec<MediaEntry>,
    details: HashMap<EntityId, AlbumDetail>,
    availability: Availability,
    detail_queries: usize,
}

/// Catalog held entirely in memory, in insertion order.
///
/// Mutable through `&self` so one catalog can be shared with a collection and
/// edited between rebuilds.
#[derive(Debug)]
pub struct MemoryCatalog {
    state: RwLock<MemoryState>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                entries: Vec::new(),
                details: HashMap::new(),
                availability: Availability::Available,
                detail_queries: 0,
            }),
        }
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row(&self, row: CatalogRow) {
        self.push_entry(MediaEntry::music(row));
    }

    pub fn push_entry(&self, entry: MediaEntry) {
        self.state.write().entries.push(entry);
    }

    pub fn put_album_detail(&self, album_id: EntityId, detail: AlbumDetail) {
        self.state.write().details.insert(album_id, detail);
    }

    pub fn remove_album_detail(&self, album_id: EntityId) -> Option<AlbumDetail> {
        self.state.write().details.remove(&album_id)
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.details.clear();
    }

    pub fn set_available(&self) {
        self.state.write().availability = Availability::Available;
    }

    pub fn set_unavailable(&self) {
        self.state.write().availability = Availability::Unavailable;
    }

    /// Makes the next queries yield `rows` rows and then fail.
    pub fn fail_after(&self, rows: usize) {
        self.state.write().availability = Availability::FailAfter(rows);
    }

    /// Keeps serving rows while album detail lookups fail.
    pub fn fail_album_details(&self) {
        self.state.write().availability = Availability::DetailsUnavailable;
    }

    /// Number of album detail lookups served so far.
    pub fn detail_queries(&self) -> usize {
        self.state.read().detail_queries
    }
}

impl RowSource for MemoryCatalog {
    fn query_tracks(&self, selection: Selection) -> Result<Rows<'_>, SourceError> {
        let state = self.state.read();
        let rows: Vec<CatalogRow> = state
            .entries
            .iter()
            .filter(|entry| selection.matches(entry))
            .map(|entry| entry.row.clone())
            .collect();

        match state.availability {
            Availability::Available | Availability::DetailsUnavailable => {
                Ok(Box::new(rows.into_iter().map(Ok::<CatalogRow, SourceError>)))
            }
            Availability::Unavailable => Err(unavailable()),
            Availability::FailAfter(count) => Ok(Box::new(
                rows.into_iter()
                    .take(count)
                    .map(Ok::<CatalogRow, SourceError>)
                    .chain(std::iter::once(Err(unavailable()))),
            )),
        }
    }
}

impl AlbumDetailSource for MemoryCatalog {
    fn album_detail(&self, album_id: EntityId) -> Result<Option<AlbumDetail>, SourceError> {
        let mut state = self.state.write();
        match state.availability {
            Availability::Unavailable | Availability::DetailsUnavailable => {
                return Err(unavailable())
            }
            Availability::Available | Availability::FailAfter(_) => {}
        }
        state.detail_queries += 1;
        Ok(state.details.get(&album_id).cloned())
    }
}

fn unavailable() -> SourceError {
    SourceError::Unavailable("memory catalog closed".to_string())
}
