use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{AlbumDetail, CatalogRow, EntityId, MediaEntry};
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, Table, TableDefinition,
    TableError, TableHandle, TransactionError, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::source::{AlbumDetailSource, RowSource, Rows, Selection, SourceError};

// Keyed by insertion sequence so repeated track ids and dump order survive.
const MEDIA_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("media");
const ALBUM_DETAILS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("album_details");

/// Track catalog persisted in a redb database: entries in the order they were
/// written, plus one detail record per album id.
#[derive(Clone)]
pub struct Catalog {
    db: Arc<Database>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub entries: usize,
    pub album_details: usize,
    pub rejected: usize,
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    MissingTrackId,
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "io error: {}", err),
            CatalogError::Redb(err) => write!(f, "db error: {}", err),
            CatalogError::Bincode(err) => write!(f, "bincode error: {}", err),
            CatalogError::MissingTrackId => write!(f, "catalog entry has no track id"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

impl From<redb::Error> for CatalogError {
    fn from(err: redb::Error) -> Self {
        CatalogError::Redb(err)
    }
}

impl From<DatabaseError> for CatalogError {
    fn from(err: DatabaseError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TableError> for CatalogError {
    fn from(err: TableError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TransactionError> for CatalogError {
    fn from(err: TransactionError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<StorageError> for CatalogError {
    fn from(err: StorageError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<CommitError> for CatalogError {
    fn from(err: CommitError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for CatalogError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        CatalogError::Bincode(err)
    }
}

impl From<CatalogError> for SourceError {
    fn from(err: CatalogError) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let db = open_or_create_db(path)?;
        info!("Opened catalog at {:?}", path);
        Ok(Self { db: Arc::new(db) })
    }

    /// Appends one entry after everything already in the catalog.
    pub fn put_media(&self, entry: &MediaEntry) -> Result<(), CatalogError> {
        if entry.row.track_id.is_none() {
            return Err(CatalogError::MissingTrackId);
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MEDIA_TABLE)?;
            let sequence = next_sequence(&table)?;
            let bytes = encode_value(entry)?;
            table.insert(sequence, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn put_album_detail(
        &self,
        album_id: EntityId,
        detail: &AlbumDetail,
    ) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ALBUM_DETAILS_TABLE)?;
            let bytes = encode_value(detail)?;
            table.insert(album_id, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Writes a batch in one transaction, appending entries in slice order.
    /// With `replace` the existing contents are dropped in that same
    /// transaction, so a failed import leaves the catalog as it was. Entries
    /// without a track id are counted as rejected.
    pub fn import(
        &self,
        entries: &[MediaEntry],
        album_details: &[(EntityId, AlbumDetail)],
        replace: bool,
    ) -> Result<ImportStats, CatalogError> {
        let mut stats = ImportStats::default();
        let write_txn = self.db.begin_write()?;
        if replace {
            clear_table(&write_txn, MEDIA_TABLE)?;
            clear_table(&write_txn, ALBUM_DETAILS_TABLE)?;
        }
        {
            let mut media_table = write_txn.open_table(MEDIA_TABLE)?;
            let mut sequence = next_sequence(&media_table)?;
            for entry in entries {
                if entry.row.track_id.is_none() {
                    warn!("Rejecting catalog entry without track id: {:?}", entry.row.title);
                    stats.rejected += 1;
                    continue;
                }
                let bytes = encode_value(entry)?;
                media_table.insert(sequence, bytes.as_slice())?;
                sequence += 1;
                stats.entries += 1;
            }

            let mut detail_table = write_txn.open_table(ALBUM_DETAILS_TABLE)?;
            for (album_id, detail) in album_details {
                let bytes = encode_value(detail)?;
                detail_table.insert(*album_id, bytes.as_slice())?;
                stats.album_details += 1;
            }
        }
        write_txn.commit()?;
        info!(
            "Imported {} catalog entries and {} album details ({} rejected)",
            stats.entries, stats.album_details, stats.rejected
        );
        Ok(stats)
    }

    pub fn clear(&self) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        clear_table(&write_txn, MEDIA_TABLE)?;
        clear_table(&write_txn, ALBUM_DETAILS_TABLE)?;
        write_txn.commit()?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(MEDIA_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        Ok(table.len()? as usize)
    }

    pub fn is_empty(&self) -> Result<bool, CatalogError> {
        Ok(self.len()? == 0)
    }

    fn read_rows(&self, selection: Selection) -> Result<Vec<CatalogRow>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(MEDIA_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut rows = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let media: MediaEntry = decode_value(entry.1.value())?;
            if selection.matches(&media) {
                rows.push(media.row);
            }
        }
        Ok(rows)
    }

    fn read_album_detail(&self, album_id: EntityId) -> Result<Option<AlbumDetail>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(ALBUM_DETAILS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let detail = match table.get(album_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(detail)
    }
}

impl RowSource for Catalog {
    fn query_tracks(&self, selection: Selection) -> Result<Rows<'_>, SourceError> {
        let rows = self.read_rows(selection)?;
        Ok(Box::new(rows.into_iter().map(Ok::<CatalogRow, SourceError>)))
    }
}

impl AlbumDetailSource for Catalog {
    fn album_detail(&self, album_id: EntityId) -> Result<Option<AlbumDetail>, SourceError> {
        Ok(self.read_album_detail(album_id)?)
    }
}

fn open_or_create_db(path: &Path) -> Result<Database, CatalogError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn clear_table(txn: &WriteTransaction, table: impl TableHandle) -> Result<(), CatalogError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn next_sequence(table: &Table<u64, &[u8]>) -> Result<u64, CatalogError> {
    let next = match table.last()? {
        Some((key, _)) => key.value() + 1,
        None => 0,
    };
    Ok(next)
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, CatalogError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CatalogError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::Catalog;
    use crate::source::{AlbumDetailSource, RowSource, Selection};
    use crate::{Collection, LocalCollection};
    use common::{AlbumDetail, CatalogRow, MediaEntry};

    fn temp_db_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!(
            "collection-{}-{}-{}.redb",
            name,
            std::process::id(),
            nanos
        ))
    }

    fn row(track_id: i64) -> CatalogRow {
        CatalogRow::complete(
            track_id,
            &format!("/music/{}.flac", track_id),
            "Title",
            200_000,
            1,
            10,
            "Alice",
            100,
            "Greatest",
        )
    }

    #[test]
    fn empty_catalog_yields_no_rows() {
        let path = temp_db_path("empty");
        let catalog = Catalog::open(&path).unwrap();
        assert_eq!(catalog.query_tracks(Selection::All).unwrap().count(), 0);
        assert!(catalog.album_detail(100).unwrap().is_none());
        assert!(catalog.is_empty().unwrap());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn rows_come_back_in_insertion_order() {
        let path = temp_db_path("order");
        let catalog = Catalog::open(&path).unwrap();
        catalog.put_media(&MediaEntry::music(row(3))).unwrap();
        catalog.put_media(&MediaEntry::music(row(1))).unwrap();
        catalog
            .put_media(&MediaEntry {
                is_music: false,
                row: row(2),
            })
            .unwrap();

        let ids: Vec<i64> = catalog
            .query_tracks(Selection::PlayableAudio)
            .unwrap()
            .map(|row| row.unwrap().track_id.unwrap())
            .collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(catalog.query_tracks(Selection::All).unwrap().count(), 3);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn import_rejects_unkeyed_entries_and_stores_details() {
        let path = temp_db_path("import");
        let catalog = Catalog::open(&path).unwrap();
        let detail = AlbumDetail {
            album_art: Some("/art/100.jpg".to_string()),
            first_year: Some(1999),
            last_year: None,
        };
        let stats = catalog
            .import(
                &[MediaEntry::music(row(1)), MediaEntry::music(CatalogRow::default())],
                &[(100, detail.clone())],
                false,
            )
            .unwrap();

        assert_eq!(stats.entries, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.album_details, 1);
        assert_eq!(catalog.len().unwrap(), 1);
        assert_eq!(catalog.album_detail(100).unwrap(), Some(detail));

        catalog.clear().unwrap();
        assert!(catalog.is_empty().unwrap());
        assert!(catalog.album_detail(100).unwrap().is_none());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn repeated_track_ids_are_all_kept() {
        let path = temp_db_path("repeat");
        let catalog = Catalog::open(&path).unwrap();
        let first = CatalogRow::complete(1, "/m/1.mp3", "One", 1000, 1, 10, "Alice", 100, "A");
        let second = CatalogRow::complete(1, "/m/1.mp3", "One", 1000, 1, 20, "Bob", 200, "B");
        let stats = catalog
            .import(
                &[MediaEntry::music(first), MediaEntry::music(second)],
                &[(100, AlbumDetail::default()), (200, AlbumDetail::default())],
                false,
            )
            .unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(catalog.len().unwrap(), 2);

        let artists: Vec<i64> = catalog
            .query_tracks(Selection::All)
            .unwrap()
            .map(|row| row.unwrap().artist_id.unwrap())
            .collect();
        assert_eq!(artists, vec![10, 20]);

        let collection = LocalCollection::load(catalog.clone(), catalog).unwrap();
        assert_eq!(collection.get_artists().len(), 2);
        assert_eq!(collection.get_albums().len(), 2);
        assert_eq!(collection.get_artist(10).unwrap().name, "Alice");
        assert_eq!(collection.get_track(1).unwrap().album_id, Some(200));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn replacing_import_swaps_contents_and_appending_keeps_them() {
        let path = temp_db_path("replace");
        let catalog = Catalog::open(&path).unwrap();
        catalog.put_media(&MediaEntry::music(row(1))).unwrap();
        catalog.put_album_detail(100, &AlbumDetail::default()).unwrap();

        catalog.import(&[MediaEntry::music(row(2))], &[], false).unwrap();
        assert_eq!(catalog.len().unwrap(), 2);

        let stats = catalog.import(&[MediaEntry::music(row(5))], &[], true).unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(catalog.len().unwrap(), 1);
        assert!(catalog.album_detail(100).unwrap().is_none());

        catalog.put_media(&MediaEntry::music(row(4))).unwrap();
        let ids: Vec<i64> = catalog
            .query_tracks(Selection::All)
            .unwrap()
            .map(|row| row.unwrap().track_id.unwrap())
            .collect();
        assert_eq!(ids, vec![5, 4]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn collection_indexes_a_stored_catalog() {
        let path = temp_db_path("indexed");
        let catalog = Catalog::open(&path).unwrap();
        let entries = vec![
            MediaEntry::music(CatalogRow::complete(
                1, "/m/1.mp3", "Morning", 1000, 1, 10, "Alice", 100, "Greatest",
            )),
            MediaEntry::music(CatalogRow::complete(
                2, "/m/2.mp3", "Evening", 2000, 2, 10, "Alice", 100, "Greatest",
            )),
            MediaEntry::music(CatalogRow::complete(
                3, "/m/3.mp3", "Noon", 3000, 1, 20, "Bob", 200, "Lost",
            )),
            MediaEntry {
                is_music: false,
                row: CatalogRow::complete(
                    4, "/m/4.ogg", "Ping", 500, 1, 10, "Alice", 100, "Greatest",
                ),
            },
        ];
        let detail = AlbumDetail {
            album_art: Some("/art/100.jpg".to_string()),
            first_year: Some(2004),
            last_year: Some(2006),
        };
        catalog.import(&entries, &[(100, detail)], true).unwrap();

        let collection = LocalCollection::load(catalog.clone(), catalog).unwrap();
        let stats = collection.stats();
        assert_eq!(stats.artists, 2);
        assert_eq!(stats.albums, 1);
        assert_eq!(stats.tracks, 3);
        assert_eq!(stats.orphaned_tracks, 1);

        let alice = collection.get_artist(10).unwrap();
        assert_eq!(alice.album_ids.iter().copied().collect::<Vec<_>>(), vec![100]);
        assert_eq!(alice.track_ids.len(), 2);
        let album = collection.get_album(100).unwrap();
        assert_eq!(album.artist_id, 10);
        assert_eq!(album.last_year, Some(2006));
        let titles: Vec<String> = collection
            .album_tracks(100)
            .into_iter()
            .map(|track| track.title)
            .collect();
        assert_eq!(titles, vec!["Morning".to_string(), "Evening".to_string()]);

        let orphan = collection.get_track(3).unwrap();
        assert!(orphan.is_orphaned());
        assert!(collection.get_artist(20).unwrap().track_ids.is_empty());
        assert!(collection.get_track(4).is_none());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn put_media_requires_track_id() {
        let path = temp_db_path("unkeyed");
        let catalog = Catalog::open(&path).unwrap();
        assert!(catalog
            .put_media(&MediaEntry::music(CatalogRow::default()))
            .is_err());
        let _ = std::fs::remove_file(path);
    }
}
