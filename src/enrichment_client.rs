//! Company lookups against the Harmonic GraphQL API.
//!
//! Every HTTP request first takes a permit from a semaphore shared by all
//! clones of the client, so the provider sees at most `max_concurrent_requests`
//! in-flight calls no matter how many workers drive the client.

use crate::config::Config;
use crate::constants::{
    HARMONIC_BATCH_SIZE, HARMONIC_COMPANY_ENRICHMENT_QUERY,
    HARMONIC_DEFAULT_MAX_CONCURRENT_REQUESTS, HARMONIC_RATE_LIMIT_ATTEMPTS,
    HARMONIC_RATE_LIMIT_INITIAL_DELAY, HARMONIC_RATE_LIMIT_MAX_DELAY, HARMONIC_REQUEST_TIMEOUT,
};
use crate::domain::lookup_candidates;
use crate::errors::AppError;
use crate::models::{Account, AccountEnrichment, CompanyProfile, EnrichmentResult};
use crate::provider_models::{GraphqlRequest, GraphqlResponse};
use crate::task_queue::RetryPolicy;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Results for a list of identifiers.
#[derive(Debug, Default)]
pub struct EnrichmentBatch {
    /// One entry per distinct input identifier.
    pub results: HashMap<String, EnrichmentResult>,
    /// Identifiers whose request never completed. They also appear in `results`
    /// as `NotFound`.
    pub transport_errors: HashMap<String, String>,
}

impl EnrichmentBatch {
    pub fn found_count(&self) -> usize {
        self.results.values().filter(|r| r.is_found()).count()
    }
}

#[derive(Clone)]
pub struct EnrichmentClient {
    client: Client,
    base_url: String,
    api_key: String,
    batch_size: usize,
    gate: Arc<Semaphore>,
    rate_limit_retry: RetryPolicy,
}

impl EnrichmentClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        max_concurrent_requests: usize,
    ) -> Result<Self, AppError> {
        Self::with_timeout(
            base_url,
            api_key,
            max_concurrent_requests,
            HARMONIC_REQUEST_TIMEOUT,
        )
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        max_concurrent_requests: usize,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(format!("Failed to create Harmonic client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            batch_size: HARMONIC_BATCH_SIZE,
            gate: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            rate_limit_retry: RetryPolicy {
                max_attempts: HARMONIC_RATE_LIMIT_ATTEMPTS,
                initial_interval: HARMONIC_RATE_LIMIT_INITIAL_DELAY,
                max_interval: HARMONIC_RATE_LIMIT_MAX_DELAY,
            },
        })
    }

    /// Replaces the backoff used when the provider answers 429.
    pub fn with_rate_limit_retry(mut self, policy: RetryPolicy) -> Self {
        self.rate_limit_retry = policy;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.harmonic_base_url.clone(),
            config.harmonic_api_key.clone(),
            if config.harmonic_max_concurrent_requests == 0 {
                HARMONIC_DEFAULT_MAX_CONCURRENT_REQUESTS
            } else {
                config.harmonic_max_concurrent_requests
            },
        )
    }

    /// Permits not currently held by an in-flight request.
    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    /// Looks up one domain.
    ///
    /// `Err` only for transport failures (connect, timeout, unreadable body);
    /// provider errors come back as `EnrichmentResult::ProviderError`. A 429 is
    /// retried with backoff while the permit is held, so throttling slows every
    /// worker sharing the gate; it becomes a `ProviderError` only once the
    /// attempts run out.
    pub async fn lookup_domain(&self, domain: &str) -> Result<EnrichmentResult, AppError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| AppError::InternalError(format!("enrichment gate closed: {}", e)))?;

        tracing::debug!("Harmonic lookup for {}", domain);

        let request = GraphqlRequest {
            query: HARMONIC_COMPANY_ENRICHMENT_QUERY,
            variables: json!({ "identifiers": { "websiteDomain": domain } }),
        };

        let mut delays = self.rate_limit_retry.delays().into_iter();
        let response = loop {
            let response = self
                .client
                .post(format!("{}/graphql", self.base_url))
                .header("apikey", &self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    AppError::TransportError(format!("Harmonic request failed: {}", e))
                })?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                break response;
            }
            match delays.next() {
                Some(delay) => {
                    let delay = retry_after(&response)
                        .map_or(delay, |d| d.min(self.rate_limit_retry.max_interval));
                    tracing::warn!(
                        "Harmonic throttled lookup for {}, retrying in {:?}",
                        domain,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => break response,
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(EnrichmentResult::NotFound);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!("Harmonic returned {} for {}: {}", status, domain, body);
            return Ok(EnrichmentResult::ProviderError {
                message: format!("status {}: {}", status.as_u16(), body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::TransportError(format!("Harmonic body read failed: {}", e)))?;

        Ok(interpret_response(domain, &body))
    }

    /// Enriches a list of domain identifiers, at most `HARMONIC_BATCH_SIZE` per batch.
    ///
    /// One failing identifier never aborts the batch.
    pub async fn enrich_domains(&self, domains: &[String]) -> EnrichmentBatch {
        let mut seen = HashSet::new();
        let unique: Vec<String> = domains
            .iter()
            .filter(|d| seen.insert(d.as_str()))
            .cloned()
            .collect();

        let mut batch = EnrichmentBatch::default();

        for (index, chunk) in unique.chunks(self.batch_size).enumerate() {
            tracing::info!(
                "Harmonic batch {}: {} identifier(s)",
                index + 1,
                chunk.len()
            );

            let mut tasks = JoinSet::new();
            for domain in chunk {
                let client = self.clone();
                let domain = domain.clone();
                tasks.spawn(async move {
                    let result = client.lookup_domain(&domain).await;
                    (domain, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((domain, Ok(result))) => {
                        batch.results.insert(domain, result);
                    }
                    Ok((domain, Err(e))) => {
                        tracing::warn!("Harmonic lookup for {} failed: {}", domain, e);
                        batch.results.insert(domain.clone(), EnrichmentResult::NotFound);
                        batch.transport_errors.insert(domain, e.to_string());
                    }
                    Err(e) => tracing::error!("Harmonic lookup task aborted: {}", e),
                }
            }

            for domain in chunk {
                if !batch.results.contains_key(domain) {
                    batch
                        .results
                        .insert(domain.clone(), EnrichmentResult::NotFound);
                    batch
                        .transport_errors
                        .insert(domain.clone(), "lookup task aborted".to_string());
                }
            }
        }

        tracing::info!(
            "Harmonic enrichment: {}/{} found, {} transport error(s)",
            batch.found_count(),
            batch.results.len(),
            batch.transport_errors.len()
        );
        batch
    }

    /// Tries the account's domain variations in order; the first found wins.
    pub async fn enrich_account(&self, account: &Account) -> AccountEnrichment {
        let candidates = match lookup_candidates(account.website.as_deref()) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::debug!("Account {} is not enrichable: {}", account.id, e);
                return AccountEnrichment::NotEnrichable {
                    account_id: account.id.clone(),
                    reason: e.to_string(),
                };
            }
        };

        let mut transport_errors = Vec::new();
        let mut provider_error: Option<(String, EnrichmentResult)> = None;

        for candidate in &candidates {
            match self.lookup_domain(candidate).await {
                Ok(result @ EnrichmentResult::Found { .. }) => {
                    return AccountEnrichment::Resolved {
                        account_id: account.id.clone(),
                        domain: candidate.clone(),
                        result,
                        transport_errors,
                    };
                }
                Ok(EnrichmentResult::NotFound) => {}
                Ok(result @ EnrichmentResult::ProviderError { .. }) => {
                    if provider_error.is_none() {
                        provider_error = Some((candidate.clone(), result));
                    }
                }
                Err(e) => transport_errors.push((candidate.clone(), e.to_string())),
            }
        }

        let (domain, result) = provider_error
            .unwrap_or_else(|| (candidates[0].clone(), EnrichmentResult::NotFound));

        AccountEnrichment::Resolved {
            account_id: account.id.clone(),
            domain,
            result,
            transport_errors,
        }
    }

    /// Enriches accounts in batches; results come back in input order.
    pub async fn enrich_accounts(&self, accounts: &[Account]) -> Vec<AccountEnrichment> {
        let mut out = Vec::with_capacity(accounts.len());

        for chunk in accounts.chunks(self.batch_size) {
            let mut tasks = JoinSet::new();
            for (index, account) in chunk.iter().enumerate() {
                let client = self.clone();
                let account = account.clone();
                tasks.spawn(async move { (index, client.enrich_account(&account).await) });
            }

            let mut slots: Vec<Option<AccountEnrichment>> = vec![None; chunk.len()];
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, enrichment)) => slots[index] = Some(enrichment),
                    Err(e) => tracing::error!("Account enrichment task aborted: {}", e),
                }
            }

            for (slot, account) in slots.into_iter().zip(chunk) {
                out.push(slot.unwrap_or_else(|| AccountEnrichment::Resolved {
                    account_id: account.id.clone(),
                    domain: String::new(),
                    result: EnrichmentResult::ProviderError {
                        message: "enrichment task aborted".to_string(),
                    },
                    transport_errors: Vec::new(),
                }));
            }
        }

        out
    }
}

/// Seconds form of a `Retry-After` header.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Turns a 200 response body into a result for `domain`.
fn interpret_response(domain: &str, body: &str) -> EnrichmentResult {
    let parsed: GraphqlResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            return EnrichmentResult::ProviderError {
                message: format!("unparseable response: {}", e),
            }
        }
    };

    let payload = parsed.data.and_then(|d| d.enrich_company_by_identifiers);

    if !parsed.errors.is_empty() && payload.is_none() {
        let message = parsed
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        if message.to_lowercase().contains("not found") {
            return EnrichmentResult::NotFound;
        }
        tracing::warn!("Harmonic GraphQL errors for {}: {}", domain, message);
        return EnrichmentResult::ProviderError { message };
    }

    match payload {
        Some(payload) if payload.company_found => match payload.company {
            Some(company) => EnrichmentResult::Found {
                company: Box::new(CompanyProfile::from(company)),
            },
            None => EnrichmentResult::NotFound,
        },
        _ => EnrichmentResult::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_found() {
        let body = json!({
            "data": {"enrichCompanyByIdentifiers": {
                "companyFound": true,
                "company": {"name": "PostHog", "headcount": 50}
            }}
        })
        .to_string();
        let result = interpret_response("posthog.com", &body);
        assert_eq!(result.company().unwrap().name.as_deref(), Some("PostHog"));
    }

    #[test]
    fn test_interpret_not_found_variants() {
        let not_found = json!({"data": {"enrichCompanyByIdentifiers": {"companyFound": false, "company": null}}});
        assert_eq!(
            interpret_response("x.com", &not_found.to_string()),
            EnrichmentResult::NotFound
        );

        let graphql_not_found = json!({"data": null, "errors": [{"message": "Company not found"}]});
        assert_eq!(
            interpret_response("x.com", &graphql_not_found.to_string()),
            EnrichmentResult::NotFound
        );
    }

    #[test]
    fn test_interpret_provider_errors() {
        let errors = json!({"data": null, "errors": [{"message": "Internal server error"}]});
        assert!(interpret_response("x.com", &errors.to_string()).is_retryable());
        assert!(interpret_response("x.com", "<html>").is_retryable());
    }

    #[test]
    fn test_gate_never_below_one_permit() {
        let client = EnrichmentClient::new("http://localhost", "key", 0).unwrap();
        assert_eq!(client.available_permits(), 1);
    }
}
