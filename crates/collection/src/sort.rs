//! Orderings for the collection's listing views.
//!
//! Names and titles compare by their lowercase form first, then by the exact
//! string, then by id, so every ordering is total and independent of the
//! order entities were inserted in.

use std::cmp::Ordering;

use common::{Album, Artist, Track};
use serde::{Deserialize, Serialize};

/// Track listing orders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSort {
    /// By title.
    #[default]
    Alphabetical,
    /// Grouped by album, then by position within the album.
    TrackNumber,
    /// Shortest first.
    Duration,
}

impl TrackSort {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "alpha" | "alphabetical" | "title" => Some(Self::Alphabetical),
            "track" | "track_number" | "number" => Some(Self::TrackNumber),
            "duration" | "length" => Some(Self::Duration),
            _ => None,
        }
    }

    pub fn compare(self, a: &Track, b: &Track) -> Ordering {
        match self {
            TrackSort::Alphabetical => {
                compare_text(&a.title, &b.title).then_with(|| a.id.cmp(&b.id))
            }
            TrackSort::TrackNumber => compare_missing_last(a.album_id, b.album_id)
                .then_with(|| compare_missing_last(a.track_number, b.track_number))
                .then_with(|| compare_text(&a.title, &b.title))
                .then_with(|| a.id.cmp(&b.id)),
            TrackSort::Duration => a
                .duration_ms
                .cmp(&b.duration_ms)
                .then_with(|| compare_text(&a.title, &b.title))
                .then_with(|| a.id.cmp(&b.id)),
        }
    }
}

pub fn compare_artists(a: &Artist, b: &Artist) -> Ordering {
    compare_text(&a.name, &b.name).then_with(|| a.id.cmp(&b.id))
}

pub fn compare_albums(a: &Album, b: &Album) -> Ordering {
    compare_text(&a.name, &b.name).then_with(|| a.id.cmp(&b.id))
}

pub fn sort_artists(artists: &mut [Artist]) {
    artists.sort_by(compare_artists);
}

pub fn sort_albums(albums: &mut [Album]) {
    albums.sort_by(compare_albums);
}

pub fn sort_tracks(tracks: &mut [Track], mode: TrackSort) {
    tracks.sort_by(|a, b| mode.compare(a, b));
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn compare_missing_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
