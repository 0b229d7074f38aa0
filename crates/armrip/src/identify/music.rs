//! Audio CD lookup against MusicBrainz and the Cover Art Archive.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::IdentifyError;
use crate::http::{create_http_client, truncate_body, DEFAULT_REQUEST_TIMEOUT};
use crate::job::track::SOURCE_MUSICBRAINZ;
use crate::job::{Identification, Track};
use crate::tools::music::DiscToc;

pub const MUSICBRAINZ_URL: &str = "https://musicbrainz.org/ws/2/discid/-";
pub const COVER_ART_URL: &str = "https://coverartarchive.org/release";

#[derive(Debug, Clone, PartialEq)]
pub struct AlbumTrack {
    pub number: u32,
    pub title: String,
    /// Seconds. Zero when MusicBrainz has no length.
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub release_id: String,
    pub title: String,
    pub artist: String,
    pub year: Option<String>,
    pub cover_url: Option<String>,
    pub tracks: Vec<AlbumTrack>,
}

impl Album {
    /// `Artist - Album` as the job title.
    pub fn identification(&self) -> Identification {
        let title = if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.artist, self.title)
        };
        Identification {
            title,
            year: self.year.clone(),
            video_type: Some("music".to_string()),
            imdb_id: None,
            poster_url: self.cover_url.clone(),
            source: SOURCE_MUSICBRAINZ.to_string(),
        }
    }

    /// One track row per disc track. Lengths MusicBrainz lacks come from the TOC.
    pub fn to_tracks(&self, job_id: i64, toc: &DiscToc) -> Vec<Track> {
        let toc_lengths = toc.track_lengths();
        (0..toc.track_count())
            .map(|i| {
                let number = i as u32 + 1;
                let listed = self.tracks.iter().find(|t| t.number == number);
                let mut track = Track::new(job_id, number, SOURCE_MUSICBRAINZ);
                track.length = listed
                    .map(|t| t.length)
                    .filter(|l| *l > 0)
                    .or_else(|| toc_lengths.get(i).copied())
                    .unwrap_or(0);
                track.filename = listed.map(|t| t.title.clone());
                track.process = true;
                track
            })
            .collect()
    }
}

/// Resolves a disc TOC to an album.
#[async_trait]
pub trait AlbumLookup: Send + Sync {
    /// `Ok(None)` when no release matches.
    async fn lookup(&self, toc: &DiscToc) -> Result<Option<Album>, IdentifyError>;
}

#[derive(Clone)]
pub struct MusicBrainz {
    client: Client,
    lookup_url: String,
    cover_art_url: String,
}

impl MusicBrainz {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: create_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            lookup_url: MUSICBRAINZ_URL.to_string(),
            cover_art_url: COVER_ART_URL.to_string(),
        })
    }

    pub fn with_urls(
        mut self,
        lookup_url: impl Into<String>,
        cover_art_url: impl Into<String>,
    ) -> Self {
        self.lookup_url = lookup_url.into();
        self.cover_art_url = cover_art_url.into();
        self
    }

    /// Front cover URL. Missing artwork is common and not an error.
    async fn cover_art(&self, release_id: &str) -> Option<String> {
        let url = format!("{}/{}", self.cover_art_url, release_id);
        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(release_id, status = r.status().as_u16(), "No cover art");
                return None;
            }
            Err(e) => {
                debug!(release_id, error = %e, "Cover art request failed");
                return None;
            }
        };
        let body: serde_json::Value = response.json().await.ok()?;
        parse_cover_art(&body)
    }
}

#[async_trait]
impl AlbumLookup for MusicBrainz {
    /// Fuzzy TOC lookup, then the cover art for the first release.
    async fn lookup(&self, toc: &DiscToc) -> Result<Option<Album>, IdentifyError> {
        let query = [
            ("toc", toc.to_query()),
            ("fmt", "json".to_string()),
            ("inc", "recordings artist-credits".to_string()),
        ];
        debug!(toc = %query[0].1, "MusicBrainz lookup");

        let response = self
            .client
            .get(&self.lookup_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| IdentifyError::Http {
                provider: "MusicBrainz",
                source: e,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdentifyError::Status {
                provider: "MusicBrainz",
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| IdentifyError::Http {
            provider: "MusicBrainz",
            source: e,
        })?;

        let Some(mut album) = parse_release(&body, toc.track_count()) else {
            return Ok(None);
        };
        album.cover_url = self.cover_art(&album.release_id).await;
        info!(artist = %album.artist, album = %album.title, "MusicBrainz match");
        Ok(Some(album))
    }
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Deserialize)]
struct Release {
    id: String,
    title: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    media: Vec<Medium>,
}

#[derive(Deserialize)]
struct ArtistCredit {
    name: String,
    #[serde(default)]
    joinphrase: String,
}

#[derive(Deserialize)]
struct Medium {
    #[serde(rename = "track-count", default)]
    track_count: usize,
    #[serde(default)]
    tracks: Vec<MediumTrack>,
}

#[derive(Deserialize)]
struct MediumTrack {
    #[serde(default)]
    position: Option<u32>,
    #[serde(default)]
    title: String,
    /// Milliseconds.
    #[serde(default)]
    length: Option<u64>,
}

/// First release, with the medium whose track count matches the disc.
pub fn parse_release(body: &serde_json::Value, track_count: usize) -> Option<Album> {
    let parsed = LookupResponse::deserialize(body).ok()?;
    let release = parsed.releases.into_iter().next()?;

    let artist: String = release
        .artist_credit
        .iter()
        .map(|c| format!("{}{}", c.name, c.joinphrase))
        .collect::<String>()
        .trim()
        .to_string();

    let medium = release
        .media
        .iter()
        .find(|m| m.track_count == track_count)
        .or_else(|| release.media.first());

    let tracks = medium
        .map(|m| {
            m.tracks
                .iter()
                .enumerate()
                .map(|(i, t)| AlbumTrack {
                    number: t.position.unwrap_or(i as u32 + 1),
                    title: t.title.clone(),
                    length: t.length.unwrap_or(0) / 1000,
                })
                .collect()
        })
        .unwrap_or_default();

    Some(Album {
        release_id: release.id,
        title: release.title,
        artist,
        year: release
            .date
            .as_deref()
            .and_then(|d| d.get(..4))
            .map(str::to_string),
        cover_url: None,
        tracks,
    })
}

pub fn parse_cover_art(body: &serde_json::Value) -> Option<String> {
    let images = body.get("images")?.as_array()?;
    let front = images
        .iter()
        .find(|i| i.get("front").and_then(|f| f.as_bool()) == Some(true))
        .or_else(|| images.first())?;
    front.get("image")?.as_str().map(str::to_string)
}
