//! Year correction and trivia lookups against an external text-generation
//! service. Every failure is absorbed here: callers always get a usable year
//! and a trivia string.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::future::BoxFuture;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{config::EnrichmentConfig, state::match_state::Card};

/// Earliest release year accepted from the oracle.
pub const MIN_YEAR: i32 = 1900;
/// Trivia shown when the oracle has nothing to say.
pub const FALLBACK_TRIVIA: &str = "No trivia available for this track right now.";

/// Failures of a single oracle call.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// No oracle is configured.
    #[error("no text-generation service configured")]
    Disabled,
    /// The call did not finish within the configured timeout.
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    /// The service could not be reached or answered with an error.
    #[error("oracle request failed: {0}")]
    Request(String),
    /// The answer did not contain a usable value.
    #[error("unusable oracle answer: {0:?}")]
    Unusable(String),
}

/// External text-generation service. Answers are raw text; parsing and
/// validation happen in [`Enrichment`].
pub trait CardOracle: Send + Sync {
    /// Ask for the original release year of a track.
    fn original_year(
        &self,
        artist: &str,
        title: &str,
    ) -> BoxFuture<'static, Result<String, EnrichmentError>>;
    /// Ask for a short trivia text about a track.
    fn trivia(&self, artist: &str, title: &str)
    -> BoxFuture<'static, Result<String, EnrichmentError>>;
}

/// Oracle that never answers; every lookup falls back.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOracle;

impl CardOracle for NoopOracle {
    fn original_year(&self, _: &str, _: &str) -> BoxFuture<'static, Result<String, EnrichmentError>> {
        Box::pin(async { Err(EnrichmentError::Disabled) })
    }

    fn trivia(&self, _: &str, _: &str) -> BoxFuture<'static, Result<String, EnrichmentError>> {
        Box::pin(async { Err(EnrichmentError::Disabled) })
    }
}

type TrackKey = (String, String);

fn track_key(artist: &str, title: &str) -> TrackKey {
    (
        artist.trim().to_lowercase(),
        title.trim().to_lowercase(),
    )
}

/// Memoizing, time-bounded facade over a [`CardOracle`].
pub struct Enrichment {
    oracle: Arc<dyn CardOracle>,
    config: EnrichmentConfig,
    years: DashMap<TrackKey, i32>,
    trivia: DashMap<TrackKey, String>,
}

impl Enrichment {
    /// Wrap `oracle` with the given limits.
    pub fn new(oracle: Arc<dyn CardOracle>, config: EnrichmentConfig) -> Self {
        Self {
            oracle,
            config,
            years: DashMap::new(),
            trivia: DashMap::new(),
        }
    }

    async fn ask<F>(&self, mut call: F) -> Result<String, EnrichmentError>
    where
        F: FnMut() -> BoxFuture<'static, Result<String, EnrichmentError>>,
    {
        let mut last = EnrichmentError::Disabled;
        for attempt in 1..=self.config.max_attempts.max(1) {
            let outcome = match timeout(self.config.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(EnrichmentError::Timeout(self.config.timeout)),
            };
            match outcome {
                Ok(text) => return Ok(text),
                Err(EnrichmentError::Disabled) => return Err(EnrichmentError::Disabled),
                Err(err) => {
                    debug!(attempt, error = %err, "oracle call failed");
                    last = err;
                }
            }
        }
        Err(last)
    }

    /// Original release year of a track, or `observed` when the oracle fails
    /// or answers something outside `1900..=current year`.
    pub async fn correct_year(&self, artist: &str, title: &str, observed: i32) -> i32 {
        let key = track_key(artist, title);
        if let Some(year) = self.years.get(&key) {
            return *year;
        }

        let answer = self
            .ask(|| self.oracle.original_year(artist, title))
            .await
            .and_then(|text| parse_year(&text));

        match answer {
            Ok(year) => {
                self.years.insert(key, year);
                year
            }
            Err(EnrichmentError::Disabled) => observed,
            Err(err) => {
                warn!(artist, title, observed, error = %err, "year correction failed; keeping catalog year");
                observed
            }
        }
    }

    /// Trivia text for a track, or [`FALLBACK_TRIVIA`].
    pub async fn trivia(&self, artist: &str, title: &str) -> String {
        let key = track_key(artist, title);
        if let Some(text) = self.trivia.get(&key) {
            return text.clone();
        }

        let answer = self
            .ask(|| self.oracle.trivia(artist, title))
            .await
            .and_then(|text| {
                let text = text.trim().to_owned();
                if text.is_empty() {
                    Err(EnrichmentError::Unusable(text))
                } else {
                    Ok(text)
                }
            });

        match answer {
            Ok(text) => {
                self.trivia.insert(key, text.clone());
                text
            }
            Err(EnrichmentError::Disabled) => FALLBACK_TRIVIA.to_owned(),
            Err(err) => {
                warn!(artist, title, error = %err, "trivia lookup failed; using fallback");
                FALLBACK_TRIVIA.to_owned()
            }
        }
    }

    /// Correct the year of a card that has not entered play yet. A card is
    /// corrected at most once.
    pub async fn enrich_card(&self, mut card: Card) -> Card {
        if card.ai_corrected {
            return card;
        }
        let year = self.correct_year(&card.artist, &card.title, card.year).await;
        if year != card.year {
            debug!(media_ref = %card.media_ref, from = card.year, to = year, "corrected card year");
            card.year = year;
            card.ai_corrected = true;
        }
        card
    }
}

/// Extract the first plausible four-digit year from an oracle answer.
fn parse_year(text: &str) -> Result<i32, EnrichmentError> {
    let max_year = OffsetDateTime::now_utc().year();
    let bytes = text.as_bytes();
    let mut start = 0;
    while start + 4 <= bytes.len() {
        let window = &bytes[start..start + 4];
        let bounded_left = start == 0 || !bytes[start - 1].is_ascii_digit();
        let bounded_right = start + 4 == bytes.len() || !bytes[start + 4].is_ascii_digit();
        if bounded_left && bounded_right && window.iter().all(u8::is_ascii_digit) {
            let year = window
                .iter()
                .fold(0i32, |acc, digit| acc * 10 + i32::from(digit - b'0'));
            return if (MIN_YEAR..=max_year).contains(&year) {
                Ok(year)
            } else {
                Err(EnrichmentError::Unusable(text.to_owned()))
            };
        }
        start += 1;
    }
    Err(EnrichmentError::Unusable(text.to_owned()))
}

#[cfg(feature = "http-oracle")]
pub use self::http::HttpOracle;

#[cfg(feature = "http-oracle")]
mod http {
    use futures::future::BoxFuture;
    use reqwest::Client;
    use serde::{Deserialize, Serialize};

    use super::{CardOracle, EnrichmentError};

    #[derive(Serialize)]
    struct PromptRequest {
        prompt: String,
    }

    #[derive(Deserialize)]
    struct PromptResponse {
        text: String,
    }

    /// Oracle posting `{"prompt": ...}` to a JSON endpoint answering `{"text": ...}`.
    #[derive(Clone)]
    pub struct HttpOracle {
        client: Client,
        url: String,
        api_key: Option<String>,
    }

    impl HttpOracle {
        /// Oracle for `url`, authenticating with `ORACLE_API_KEY` when set.
        pub fn new(url: impl Into<String>) -> Self {
            Self {
                client: Client::new(),
                url: url.into(),
                api_key: std::env::var("ORACLE_API_KEY").ok(),
            }
        }

        fn ask(&self, prompt: String) -> BoxFuture<'static, Result<String, EnrichmentError>> {
            let oracle = self.clone();
            Box::pin(async move {
                let mut request = oracle.client.post(&oracle.url).json(&PromptRequest { prompt });
                if let Some(key) = &oracle.api_key {
                    request = request.bearer_auth(key);
                }
                let response = request
                    .send()
                    .await
                    .map_err(|err| EnrichmentError::Request(err.to_string()))?;
                if !response.status().is_success() {
                    return Err(EnrichmentError::Request(format!(
                        "status {}",
                        response.status()
                    )));
                }
                let body = response
                    .json::<PromptResponse>()
                    .await
                    .map_err(|err| EnrichmentError::Request(err.to_string()))?;
                Ok(body.text)
            })
        }
    }

    impl CardOracle for HttpOracle {
        fn original_year(
            &self,
            artist: &str,
            title: &str,
        ) -> BoxFuture<'static, Result<String, EnrichmentError>> {
            self.ask(format!(
                "In which year was the song \"{title}\" by {artist} originally released? \
                 Answer with the year only."
            ))
        }

        fn trivia(
            &self,
            artist: &str,
            title: &str,
        ) -> BoxFuture<'static, Result<String, EnrichmentError>> {
            self.ask(format!(
                "Tell one short, surprising fact about the song \"{title}\" by {artist}. \
                 Two sentences at most."
            ))
        }
    }
}
