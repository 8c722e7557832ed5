//! Sources of playable tracks.

use std::{collections::HashSet, path::PathBuf};

use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::state::match_state::Card;

/// Upper bound on the number of cards a source returns.
pub const MAX_TRACKS: usize = 300;
/// Descriptor of the catalog compiled into the binary.
pub const BUILTIN_SOURCE: &str = "builtin";

/// Failures while fetching tracks.
#[derive(Debug, Error)]
pub enum SupplyError {
    /// The descriptor does not name a usable catalog.
    #[error("invalid track source `{0}`")]
    InvalidSource(String),
    /// The catalog file could not be read.
    #[error("failed to read catalog `{path}`")]
    Read {
        /// Catalog path.
        path: String,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The catalog is not a JSON list of tracks.
    #[error("catalog `{path}` is not a track list")]
    Format {
        /// Catalog path.
        path: String,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Provider of a bounded, shuffled list of playable cards.
pub trait TrackSource: Send + Sync {
    /// Fetch the tracks named by `descriptor`. Malformed entries are skipped.
    fn fetch_tracks(&self, descriptor: &str) -> BoxFuture<'static, Result<Vec<Card>, SupplyError>>;
}

/// Track entry as found in a catalog file.
#[derive(Debug, Deserialize)]
struct RawTrack {
    artist: String,
    #[serde(alias = "name")]
    title: String,
    #[serde(alias = "release_date")]
    year: Value,
    #[serde(alias = "spotify_id", alias = "id", alias = "uri")]
    media_ref: String,
    #[serde(default, alias = "image", alias = "cover")]
    image_ref: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Tracks { tracks: Vec<Value> },
    List(Vec<Value>),
}

impl RawTrack {
    fn into_card(self) -> Option<Card> {
        let year = match &self.year {
            Value::Number(number) => number.as_i64().and_then(|y| i32::try_from(y).ok()),
            Value::String(text) => text.get(..4).and_then(|prefix| prefix.parse().ok()),
            _ => None,
        }?;
        let media_ref = self.media_ref.trim();
        if media_ref.is_empty() || year <= 0 {
            return None;
        }
        Some(Card {
            artist: self.artist.trim().to_owned(),
            title: self.title.trim().to_owned(),
            year,
            media_ref: media_ref.to_owned(),
            image_ref: self.image_ref.unwrap_or_default(),
            ai_corrected: false,
        })
    }
}

/// Turn raw entries into unique cards, capped and shuffled.
fn collect_cards(entries: Vec<Value>) -> Vec<Card> {
    let total = entries.len();
    let mut seen = HashSet::new();
    let mut cards: Vec<Card> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawTrack>(entry).ok())
        .filter_map(RawTrack::into_card)
        .filter(|card| seen.insert(card.media_ref.clone()))
        .collect();

    if cards.len() < total {
        debug!(skipped = total - cards.len(), "skipped malformed or duplicate tracks");
    }

    cards.shuffle(&mut rand::rng());
    cards.truncate(MAX_TRACKS);
    cards
}

/// Tracks shipped with the binary.
pub fn builtin_tracks() -> Vec<Card> {
    const TRACKS: [(&str, &str, i32, &str); 10] = [
        ("Queen", "Bohemian Rhapsody", 1975, "7tFiyTwD0nx5a1eklYtX2J"),
        ("Britney Spears", "Toxic", 2003, "6I9VzXrHxO9rA9A5euc8Ak"),
        ("Michael Jackson", "Billie Jean", 1982, "5ChkMS8OtdzJeqyybCc9R5"),
        ("The Beatles", "Hey Jude", 1968, "0aym2LBJBk9WA64cWCL9F7"),
        ("Adele", "Rolling in the Deep", 2010, "1CkvWZme3pRgbzaxZnTlFW"),
        ("Nirvana", "Smells Like Teen Spirit", 1991, "1f3yAtsJtY87CTmM8RLnxf"),
        ("Eminem", "Lose Yourself", 2002, "5Z01UMHmPV4Nas8XRbLrRn"),
        ("Abba", "Dancing Queen", 1976, "0GjEhVFGZW8afUYGk4Lu1Y"),
        ("Elvis Presley", "Jailhouse Rock", 1957, "4gphxUgq0JSFv2BCLhNDiE"),
        ("Dua Lipa", "Levitating", 2020, "39LLxExYz6ewLAcYrzQQyP"),
    ];

    TRACKS
        .iter()
        .map(|(artist, title, year, media_ref)| Card {
            artist: (*artist).to_owned(),
            title: (*title).to_owned(),
            year: *year,
            media_ref: (*media_ref).to_owned(),
            image_ref: String::new(),
            ai_corrected: false,
        })
        .collect()
}

/// Serves the builtin tracks or `<catalog_dir>/<name>.json` files.
#[derive(Debug, Clone)]
pub struct CatalogTrackSource {
    catalog_dir: PathBuf,
}

impl CatalogTrackSource {
    /// Source reading catalogs from `catalog_dir`.
    pub fn new(catalog_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog_dir: catalog_dir.into(),
        }
    }

    fn catalog_path(&self, name: &str) -> Result<PathBuf, SupplyError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SupplyError::InvalidSource(name.to_owned()));
        }
        Ok(self.catalog_dir.join(format!("{name}.json")))
    }
}

impl TrackSource for CatalogTrackSource {
    fn fetch_tracks(&self, descriptor: &str) -> BoxFuture<'static, Result<Vec<Card>, SupplyError>> {
        let descriptor = descriptor.trim().to_owned();
        if descriptor == BUILTIN_SOURCE {
            let entries = builtin_tracks()
                .into_iter()
                .map(|card| {
                    serde_json::json!({
                        "artist": card.artist,
                        "title": card.title,
                        "year": card.year,
                        "media_ref": card.media_ref,
                    })
                })
                .collect();
            let cards = collect_cards(entries);
            return Box::pin(async move { Ok(cards) });
        }

        let path = self.catalog_path(&descriptor);
        Box::pin(async move {
            let path = path?;
            let path_display = path.display().to_string();
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| SupplyError::Read {
                    path: path_display.clone(),
                    source,
                })?;
            let entries = match serde_json::from_str::<CatalogFile>(&contents) {
                Ok(CatalogFile::Tracks { tracks }) | Ok(CatalogFile::List(tracks)) => tracks,
                Err(source) => {
                    warn!(path = %path_display, error = %source, "catalog is not a track list");
                    return Err(SupplyError::Format {
                        path: path_display,
                        source,
                    });
                }
            };
            let cards = collect_cards(entries);
            info!(path = %path_display, count = cards.len(), "loaded track catalog");
            Ok(cards)
        })
    }
}
