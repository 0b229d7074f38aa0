//! Title lookups against OMDb (primary) and TMDb (secondary).

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::IdentifyError;
use crate::http::{create_http_client, truncate_body, DEFAULT_REQUEST_TIMEOUT};
use crate::job::Identification;
use crate::secrets::{resolve_secret_optional, SecretError};

pub const OMDB_URL: &str = "http://www.omdbapi.com/";
pub const TMDB_URL: &str = "https://api.themoviedb.org/3/search/movie";
const TMDB_POSTER_BASE: &str = "https://image.tmdb.org/t/p/original";

pub const OMDB_KEY_ENV_VAR: &str = "ARM_OMDB_API_KEY";
pub const TMDB_KEY_ENV_VAR: &str = "ARM_TMDB_API_KEY";

/// A title search service. Candidates come back best-first.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        title: &str,
        year: Option<&str>,
    ) -> Result<Vec<Identification>, IdentifyError>;
}

/// Builds the configured providers in lookup order. A provider without a key
/// is left out.
pub fn configured_providers(
    config: &Config,
) -> Result<Vec<Box<dyn MetadataProvider>>, SecretError> {
    let mut providers: Vec<Box<dyn MetadataProvider>> = Vec::new();

    if let Some(key) = resolve_secret_optional(
        config.omdb_api_key.as_deref(),
        config.omdb_api_key_file.as_deref(),
        Some(OMDB_KEY_ENV_VAR),
    )? {
        match Omdb::new(key) {
            Ok(p) => providers.push(Box::new(p)),
            Err(e) => tracing::warn!(error = %e, "OMDb client unavailable"),
        }
    }

    if let Some(key) = resolve_secret_optional(
        config.tmdb_api_key.as_deref(),
        config.tmdb_api_key_file.as_deref(),
        Some(TMDB_KEY_ENV_VAR),
    )? {
        match Tmdb::new(key) {
            Ok(p) => providers.push(Box::new(p)),
            Err(e) => tracing::warn!(error = %e, "TMDb client unavailable"),
        }
    }

    Ok(providers)
}

async fn get_json(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, IdentifyError> {
    let response = request
        .send()
        .await
        .map_err(|e| IdentifyError::Http { provider, source: e })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IdentifyError::Status {
            provider,
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }

    response
        .json()
        .await
        .map_err(|e| IdentifyError::Http { provider, source: e })
}

pub struct Omdb {
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl Omdb {
    pub fn new(api_key: SecretString) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: create_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            api_key,
            base_url: OMDB_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MetadataProvider for Omdb {
    fn name(&self) -> &'static str {
        "omdb"
    }

    async fn search(
        &self,
        title: &str,
        year: Option<&str>,
    ) -> Result<Vec<Identification>, IdentifyError> {
        let mut query = vec![
            ("s", title.to_string()),
            ("apikey", self.api_key.expose_secret().to_string()),
        ];
        if let Some(year) = year.filter(|y| !y.is_empty()) {
            query.push(("y", year.to_string()));
        }

        debug!(title, year, "OMDb search");
        let body = get_json("OMDb", self.client.get(&self.base_url).query(&query)).await?;
        Ok(parse_omdb_search(&body))
    }
}

#[derive(Deserialize)]
struct OmdbSearch {
    #[serde(rename = "Response", default)]
    response: String,
    #[serde(rename = "Search", default)]
    search: Vec<OmdbItem>,
}

#[derive(Deserialize)]
struct OmdbItem {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Year", default)]
    year: Option<String>,
    #[serde(rename = "imdbID", default)]
    imdb_id: Option<String>,
    #[serde(rename = "Type", default)]
    kind: Option<String>,
    #[serde(rename = "Poster", default)]
    poster: Option<String>,
}

/// `Response: "False"` (no match, bad key) is an empty result.
pub fn parse_omdb_search(body: &serde_json::Value) -> Vec<Identification> {
    let Ok(parsed) = OmdbSearch::deserialize(body) else {
        return Vec::new();
    };
    if parsed.response != "True" {
        return Vec::new();
    }
    parsed
        .search
        .into_iter()
        .map(|item| Identification {
            title: item.title,
            // Series report ranges like "2005–2013".
            year: item.year.map(|y| y.chars().take(4).collect()),
            video_type: Some(
                match item.kind.as_deref() {
                    Some("series") => "series",
                    _ => "movie",
                }
                .to_string(),
            ),
            imdb_id: item.imdb_id,
            poster_url: item.poster.filter(|p| p != "N/A" && !p.is_empty()),
            source: "omdb".to_string(),
        })
        .collect()
}

pub struct Tmdb {
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl Tmdb {
    pub fn new(api_key: SecretString) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: create_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            api_key,
            base_url: TMDB_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MetadataProvider for Tmdb {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    async fn search(
        &self,
        title: &str,
        year: Option<&str>,
    ) -> Result<Vec<Identification>, IdentifyError> {
        let mut query = vec![
            ("query", title.to_string()),
            ("api_key", self.api_key.expose_secret().to_string()),
        ];
        if let Some(year) = year.filter(|y| !y.is_empty()) {
            query.push(("year", year.to_string()));
        }

        debug!(title, year, "TMDb search");
        let body = get_json("TMDb", self.client.get(&self.base_url).query(&query)).await?;
        Ok(parse_tmdb_search(&body))
    }
}

#[derive(Deserialize)]
struct TmdbSearch {
    #[serde(default)]
    results: Vec<TmdbItem>,
}

#[derive(Deserialize)]
struct TmdbItem {
    title: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
}

pub fn parse_tmdb_search(body: &serde_json::Value) -> Vec<Identification> {
    let Ok(parsed) = TmdbSearch::deserialize(body) else {
        return Vec::new();
    };
    parsed
        .results
        .into_iter()
        .map(|item| Identification {
            title: item.title,
            year: item
                .release_date
                .as_deref()
                .and_then(|d| d.get(..4))
                .map(str::to_string),
            video_type: Some("movie".to_string()),
            imdb_id: None,
            poster_url: item
                .poster_path
                .filter(|p| !p.is_empty())
                .map(|p| format!("{}{}", TMDB_POSTER_BASE, p)),
            source: "tmdb".to_string(),
        })
        .collect()
}
