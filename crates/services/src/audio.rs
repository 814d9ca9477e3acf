use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::AudioError;

/// Maps a phrase key to a playable URL.
///
/// `Ok(None)` means the phrase has no audio, which is a normal outcome.
#[async_trait]
pub trait AudioResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns `AudioError` when the lookup itself fails.
    async fn resolve(&self, key: &str) -> Result<Option<Url>, AudioError>;
}

//
// ─── STATIC ────────────────────────────────────────────────────────────────────
//

/// Fixed key → URL table. Unknown keys have no audio.
#[derive(Clone, Debug, Default)]
pub struct StaticAudioResolver {
    entries: HashMap<String, Url>,
}

impl StaticAudioResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, url: Url) -> Self {
        self.entries.insert(key.into(), url);
        self
    }
}

#[async_trait]
impl AudioResolver for StaticAudioResolver {
    async fn resolve(&self, key: &str) -> Result<Option<Url>, AudioError> {
        Ok(self.entries.get(key).cloned())
    }
}

//
// ─── HTTP ──────────────────────────────────────────────────────────────────────
//

/// Resolves audio through `GET {base}/audio/{key}`.
///
/// The service answers `{ "url": "..." }`, or 404 when the phrase has no audio.
#[derive(Clone)]
pub struct HttpAudioResolver {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct AudioLocation {
    url: String,
}

impl HttpAudioResolver {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, key: &str) -> Result<Url, AudioError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AudioError::InvalidBase)?
            .pop_if_empty()
            .push("audio")
            .push(key);
        Ok(url)
    }
}

#[async_trait]
impl AudioResolver for HttpAudioResolver {
    async fn resolve(&self, key: &str) -> Result<Option<Url>, AudioError> {
        let response = self.client.get(self.endpoint(key)?).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AudioError::HttpStatus(response.status()));
        }

        let body: AudioLocation = response.json().await?;
        Ok(Some(Url::parse(&body.url)?))
    }
}

//
// ─── CACHE ─────────────────────────────────────────────────────────────────────
//

/// Per-session memo over a resolver.
///
/// Successful lookups (including "no audio") are cached for the cache's lifetime.
/// Failures are logged, reported as unavailable, and retried on the next request.
#[derive(Clone)]
pub struct AudioCache {
    resolver: Arc<dyn AudioResolver>,
    entries: Arc<Mutex<HashMap<String, Option<Url>>>>,
}

impl AudioCache {
    #[must_use]
    pub fn new(resolver: Arc<dyn AudioResolver>) -> Self {
        Self {
            resolver,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cached(&self, key: &str) -> Option<Option<Url>> {
        match self.entries.lock() {
            Ok(guard) => guard.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn store(&self, key: &str, value: Option<Url>) {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(key.to_owned(), value);
    }

    pub async fn resolve(&self, key: &str) -> Option<Url> {
        if let Some(hit) = self.cached(key) {
            return hit;
        }
        match self.resolver.resolve(key).await {
            Ok(found) => {
                if found.is_none() {
                    tracing::debug!(key, "no audio for phrase");
                }
                self.store(key, found.clone());
                found
            }
            Err(error) => {
                tracing::warn!(key, %error, "audio lookup failed");
                None
            }
        }
    }

    /// Resolve several keys in order.
    pub async fn resolve_all<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<Option<Url>> {
        let mut out = Vec::new();
        for key in keys {
            out.push(self.resolve(key).await);
        }
        out
    }
}
