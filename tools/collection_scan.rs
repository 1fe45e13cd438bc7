mod config;

use std::env;
use std::fs;
use std::path::Path;

use collection::{Catalog, Collection, CollectionStats, ImportStats, LocalCollection, TrackSort};
use common::{AlbumDetail, CatalogRow, EntityId, MediaEntry};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{load_or_create_config, locate_config};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Stats,
    Artists,
    Albums,
    Tracks,
}

impl Command {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "stats" => Some(Self::Stats),
            "artists" => Some(Self::Artists),
            "albums" => Some(Self::Albums),
            "tracks" => Some(Self::Tracks),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImportFile {
    tracks: Vec<ImportTrack>,
    albums: Vec<ImportAlbum>,
}

#[derive(Debug, Deserialize)]
struct ImportTrack {
    #[serde(default = "default_is_music")]
    is_music: bool,
    #[serde(flatten)]
    row: CatalogRow,
}

#[derive(Debug, Deserialize)]
struct ImportAlbum {
    album_id: EntityId,
    #[serde(flatten)]
    detail: AlbumDetail,
}

fn default_is_music() -> bool {
    true
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut command = Command::Stats;
    let mut sort = None;
    let mut config_arg = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config_arg = Some(args.next().ok_or("--config needs a path")?);
        } else if arg == "--sort" {
            let value = args.next().ok_or("--sort needs a value")?;
            let mode = TrackSort::parse(&value).ok_or_else(|| format!("unknown sort: {}", value))?;
            sort = Some(mode);
        } else {
            command = Command::parse(&arg).ok_or_else(|| format!("unknown command: {}", arg))?;
        }
    }

    let config_path = locate_config(config_arg);
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let catalog = Catalog::open(&config.catalog_file(&config_path))?;
    if let Some(import_path) = config.import_file(&config_path) {
        import_into(&catalog, &import_path)?;
    }

    let collection =
        LocalCollection::new(catalog.clone(), catalog).with_selection(config.selection());
    let stats = collection.rebuild()?;

    match command {
        Command::Stats => print_stats(&stats, &collection.snapshot().fingerprint()?),
        Command::Artists => {
            for artist in collection.get_artists() {
                println!(
                    "{}\t{}\t{} albums\t{} tracks",
                    artist.id,
                    artist.name,
                    artist.album_ids.len(),
                    artist.track_ids.len()
                );
            }
        }
        Command::Albums => {
            for album in collection.get_albums() {
                let years = match (album.first_year, album.last_year) {
                    (Some(first), Some(last)) if first != last => format!("{}-{}", first, last),
                    (Some(year), _) | (None, Some(year)) => year.to_string(),
                    (None, None) => "-".to_string(),
                };
                println!(
                    "{}\t{}\t{}\t{} tracks",
                    album.id,
                    album.name,
                    years,
                    album.track_ids.len()
                );
            }
        }
        Command::Tracks => {
            let mode = sort.unwrap_or(config.track_sort);
            for track in collection.get_tracks_sorted(mode) {
                let number = track
                    .track_number
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    track.id,
                    number,
                    track.title,
                    format_duration(track.duration_ms),
                    track.path
                );
            }
        }
    }

    Ok(())
}

fn import_into(catalog: &Catalog, path: &Path) -> Result<ImportStats, Box<dyn std::error::Error>> {
    let data = fs::read(path)?;
    let file = parse_import(&data)?;
    let entries: Vec<MediaEntry> = file
        .tracks
        .into_iter()
        .map(|track| MediaEntry {
            is_music: track.is_music,
            row: track.row,
        })
        .collect();
    let details: Vec<(EntityId, AlbumDetail)> = file
        .albums
        .into_iter()
        .map(|album| (album.album_id, album.detail))
        .collect();

    let stats = catalog.import(&entries, &details, true)?;
    info!("Imported catalog dump {:?}", path);
    Ok(stats)
}

fn parse_import(data: &[u8]) -> Result<ImportFile, serde_json::Error> {
    serde_json::from_slice(data)
}

fn print_stats(stats: &CollectionStats, fingerprint: &str) {
    println!(
        "Indexed: {} artists, {} albums, {} tracks",
        stats.artists, stats.albums, stats.tracks
    );
    println!(
        "Rows read: {}, skipped: {}, orphaned tracks: {}",
        stats.rows_read, stats.skipped_rows, stats.orphaned_tracks
    );
    println!("Fingerprint: {}", fingerprint);
}

fn format_duration(duration_ms: u64) -> String {
    let secs = duration_ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::{format_duration, parse_import, Command};

    #[test]
    fn parses_catalog_dump() {
        let json = br#"{
            "tracks": [
                {"track_id": 1, "path": "/m/1.mp3", "title": "One", "duration": 1000,
                 "track_number": 1, "artist_id": 10, "artist": "Alice",
                 "album_id": 100, "album": "Greatest"},
                {"is_music": false, "track_id": 2, "title": "Ping"}
            ],
            "albums": [{"album_id": 100, "album_art": "/art.jpg", "first_year": 1999}]
        }"#;
        let file = parse_import(json).unwrap();
        assert_eq!(file.tracks.len(), 2);
        assert!(file.tracks[0].is_music);
        assert_eq!(file.tracks[0].row.album_id, Some(100));
        assert!(!file.tracks[1].is_music);
        assert!(file.tracks[1].row.path.is_none());
        assert_eq!(file.albums[0].album_id, 100);
        assert_eq!(file.albums[0].detail.first_year, Some(1999));
        assert_eq!(file.albums[0].detail.last_year, None);
    }

    #[test]
    fn empty_dump_is_valid() {
        let file = parse_import(b"{}").unwrap();
        assert!(file.tracks.is_empty());
        assert!(file.albums.is_empty());
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(245_000), "4:05");
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("tracks"), Some(Command::Tracks));
        assert_eq!(Command::parse("genres"), None);
    }
}
