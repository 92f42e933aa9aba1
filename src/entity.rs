//! Entity builders: stable identifiers and default fields for scraped records.
//!
//! Identity rules, shared by every record shape:
//! - with a forced id, an existing record stored under that id (for the same
//!   languages) keeps its id; otherwise a fresh id is minted from the forced id.
//! - without one, an existing record for (source, languages, url) keeps its
//!   id; otherwise a fresh id is minted from (source, languages, url).
//!
//! Minting is deterministic, so importing the same remote entity twice yields
//! the same id.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A record already present in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRecord {
    pub id: String,
    pub source: String,
    pub url: String,
    pub langs: Vec<String>,
}

/// Read access to the user's library.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn has(&self, source: &str, langs: &[String], url: &str) -> bool;

    async fn get_by_id(&self, id: &str, langs: &[String]) -> Option<LibraryRecord>;

    async fn get_by_url(&self, source: &str, langs: &[String], url: &str) -> Option<LibraryRecord>;
}

/// Library with nothing in it. Every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyLibrary;

#[async_trait]
impl LibraryStore for EmptyLibrary {
    async fn has(&self, _source: &str, _langs: &[String], _url: &str) -> bool {
        false
    }

    async fn get_by_id(&self, _id: &str, _langs: &[String]) -> Option<LibraryRecord> {
        None
    }

    async fn get_by_url(&self, _source: &str, _langs: &[String], _url: &str) -> Option<LibraryRecord> {
        None
    }
}

/// Mints identifiers. Must be a pure function of its inputs.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, source: &str, langs: &[String], url: &str, forced_id: Option<&str>) -> String;
}

/// SHA-256 over the source, the sorted language set and the url (or forced id).
#[derive(Debug, Clone, Copy, Default)]
pub struct HashIdGenerator;

impl IdGenerator for HashIdGenerator {
    fn generate(&self, source: &str, langs: &[String], url: &str, forced_id: Option<&str>) -> String {
        let mut langs: Vec<&str> = langs.iter().map(String::as_str).collect();
        langs.sort_unstable();
        langs.dedup();

        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(b"\0");
        hasher.update(langs.join(",").as_bytes());
        hasher.update(b"\0");
        match forced_id {
            Some(forced) => {
                hasher.update(b"forced:");
                hasher.update(forced.as_bytes());
            }
            None => hasher.update(url.as_bytes()),
        }
        hex::encode(hasher.finalize())
    }
}

/// One chapter, episode or other ordered unit of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: String,
    pub source: String,
    pub url: String,
    pub lang: String,
    /// Ordering key within the page.
    pub number: f64,
    pub name: Option<String>,
    pub volume: Option<f64>,
    pub group: Option<String>,
    pub date: DateTime<Utc>,
    pub read: bool,
}

/// A content page (series, gallery...) with its units sorted by number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPage {
    pub id: String,
    pub source: String,
    pub url: String,
    pub langs: Vec<String>,
    pub name: String,
    pub covers: Vec<String>,
    pub synopsis: Option<String>,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub units: Vec<ContentUnit>,
    pub in_library: bool,
    pub updated_at: DateTime<Utc>,
}

/// One hit of a source search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub source: String,
    pub url: String,
    pub langs: Vec<String>,
    pub name: String,
    pub covers: Vec<String>,
    pub last_release: Option<f64>,
    pub in_library: bool,
}

/// Raw unit fields as scraped.
#[derive(Debug, Clone, Default)]
pub struct UnitInput {
    pub url: String,
    pub lang: String,
    pub number: f64,
    pub name: Option<String>,
    pub volume: Option<f64>,
    pub group: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub read: Option<bool>,
}

/// Raw page fields as scraped.
#[derive(Debug, Clone, Default)]
pub struct PageInput {
    pub url: String,
    pub langs: Vec<String>,
    pub name: String,
    pub covers: Vec<String>,
    pub synopsis: Option<String>,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub units: Vec<UnitInput>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Raw search hit fields as scraped.
#[derive(Debug, Clone, Default)]
pub struct SearchInput {
    pub url: String,
    pub langs: Vec<String>,
    pub name: String,
    pub covers: Vec<String>,
    pub last_release: Option<f64>,
}

/// Stamps identity and defaults onto records of one source.
#[derive(Clone)]
pub struct EntityBuilder {
    source: String,
    store: Arc<dyn LibraryStore>,
    ids: Arc<dyn IdGenerator>,
}

impl EntityBuilder {
    pub fn new(source: &str, store: Arc<dyn LibraryStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            source: source.to_string(),
            store,
            ids,
        }
    }

    /// Resolve the identifier of a record.
    pub async fn resolve_id(&self, langs: &[String], url: &str, forced_id: Option<&str>) -> String {
        if let Some(forced) = forced_id {
            if let Some(existing) = self.store.get_by_id(forced, langs).await {
                return existing.id;
            }
            return self.ids.generate(&self.source, langs, url, Some(forced));
        }

        if let Some(existing) = self.store.get_by_url(&self.source, langs, url).await {
            return existing.id;
        }
        self.ids.generate(&self.source, langs, url, None)
    }

    pub async fn unit(&self, input: UnitInput, forced_id: Option<&str>) -> ContentUnit {
        let langs = vec![input.lang.clone()];
        let id = self.resolve_id(&langs, &input.url, forced_id).await;
        ContentUnit {
            id,
            source: self.source.clone(),
            url: input.url,
            lang: input.lang,
            number: input.number,
            name: input.name,
            volume: input.volume,
            group: input.group,
            date: input.date.unwrap_or_else(Utc::now),
            read: input.read.unwrap_or(false),
        }
    }

    pub async fn page(&self, input: PageInput, forced_id: Option<&str>) -> ContentPage {
        let id = self.resolve_id(&input.langs, &input.url, forced_id).await;
        let in_library = self.store.has(&self.source, &input.langs, &input.url).await;

        let mut units = Vec::with_capacity(input.units.len());
        for unit in input.units {
            units.push(self.unit(unit, None).await);
        }
        units.sort_by(|a, b| a.number.total_cmp(&b.number));

        ContentPage {
            id,
            source: self.source.clone(),
            url: input.url,
            langs: input.langs,
            name: input.name,
            covers: input.covers,
            synopsis: input.synopsis,
            authors: input.authors,
            tags: input.tags,
            units,
            in_library,
            updated_at: input.updated_at.unwrap_or_else(Utc::now),
        }
    }

    pub async fn search_result(&self, input: SearchInput, forced_id: Option<&str>) -> SearchResult {
        let id = self.resolve_id(&input.langs, &input.url, forced_id).await;
        let in_library = self.store.has(&self.source, &input.langs, &input.url).await;
        SearchResult {
            id,
            source: self.source.clone(),
            url: input.url,
            langs: input.langs,
            name: input.name,
            covers: input.covers,
            last_release: input.last_release,
            in_library,
        }
    }
}
