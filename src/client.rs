//! VetStat client: sign, send and interpret, one fresh envelope per attempt.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::VetStatConfig;
use crate::credential::{Credential, CredentialError, CredentialProvider};
use crate::request::{AntibioticsQuery, DEFAULT_CLIENT_ID};
use crate::response::{self, QueryOutcome, ResponseError};
use crate::transport::{Transport, TransportError};
use crate::wsse;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Signing failed: {0}")]
    Signing(#[from] wsse::Error),

    #[error("Transport failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("Worker task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub client_id: String,
    /// Retries after the first attempt, transport errors only
    pub max_retries: u32,
    /// Delay before the first retry, doubled on every further retry
    pub retry_backoff: Duration,
    /// Queries in flight at once in [`VetStatClient::fetch_all`]
    pub workers: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            workers: 4,
        }
    }
}

impl ClientSettings {
    pub fn from_config(config: &VetStatConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            workers: config.workers.max(1),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(1 << attempt.min(16))
    }
}

struct Inner<T> {
    transport: T,
    credential: Credential,
    settings: ClientSettings,
}

/// Cheap to clone; clones share the transport and credential.
pub struct VetStatClient<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for VetStatClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> VetStatClient<T> {
    pub fn new(transport: T, credential: Credential, settings: ClientSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                credential,
                settings,
            }),
        }
    }

    /// Build a client with a credential obtained from `provider`.
    pub async fn from_provider<P: CredentialProvider>(
        transport: T,
        provider: &P,
        settings: ClientSettings,
    ) -> Result<Self, ClientError> {
        let credential = provider.credential().await?;
        Ok(Self::new(transport, credential, settings))
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    /// Run one query.
    ///
    /// Every attempt signs a new envelope with fresh identifiers, nonce and
    /// timestamps. Only transport errors are retried.
    #[instrument(skip_all, fields(chr = query.chr_number, species = query.species_code))]
    pub async fn fetch(&self, query: &AntibioticsQuery) -> Result<QueryOutcome, ClientError> {
        let settings = &self.inner.settings;
        let mut attempt = 0;
        loop {
            let signed = wsse::sign_envelope(&self.inner.credential, query, &settings.client_id)?;
            debug!(attempt, "Sending signed envelope");

            match self.inner.transport.send(signed.into_bytes()).await {
                Ok(response) => {
                    return Ok(response::interpret(response.status, &response.body, query)?);
                }
                Err(source) if attempt >= settings.max_retries => {
                    error!(attempts = attempt + 1, "Giving up on VetStat request: {source}");
                    return Err(ClientError::Transport {
                        attempts: attempt + 1,
                        source,
                    });
                }
                Err(e) => {
                    let delay = settings.backoff(attempt);
                    warn!(attempt, ?delay, "Transport error, retrying: {e}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run many queries with at most `workers` in flight.
    ///
    /// Results come back in the order of `queries`.
    pub async fn fetch_all(
        &self,
        queries: Vec<AntibioticsQuery>,
    ) -> Vec<(AntibioticsQuery, Result<QueryOutcome, ClientError>)> {
        let semaphore = Arc::new(Semaphore::new(self.inner.settings.workers.max(1)));
        let mut join_set = JoinSet::new();

        for (index, query) in queries.iter().copied().enumerate() {
            let client = self.clone();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => client.fetch(&query).await,
                    Err(e) => Err(ClientError::Task(e.to_string())),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<QueryOutcome, ClientError>>> =
            queries.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("Query task failed to complete: {e}"),
            }
        }

        let completed = slots.iter().filter(|s| s.is_some()).count();
        info!(queries = queries.len(), completed, "Finished VetStat queries");

        queries
            .into_iter()
            .zip(slots)
            .map(|(query, slot)| {
                let result = slot
                    .unwrap_or_else(|| Err(ClientError::Task("query task did not complete".into())));
                (query, result)
            })
            .collect()
    }
}
