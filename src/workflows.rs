//! The two end-to-end enrichment runs.
//!
//! Both follow the same shape: load a CRM snapshot through the mapper, derive
//! update records in batches, and hand them to the batch engine. Inputs are
//! parsed up front so a malformed payload fails before anything is scheduled.

use crate::batch_update::{BatchUpdateEngine, RunSummary};
use crate::constants::{
    DEFAULT_CHUNK_SIZE, POSTHOG_USAGE_ENRICHMENT_BATCH_SIZE, SALESFORCE_UPDATE_BATCH_SIZE,
};
use crate::enrichment_client::EnrichmentClient;
use crate::errors::{AppError, ResultExt};
use crate::field_mapper::{prepare_company_update_record, prepare_update_record};
use crate::models::{Account, AccountEnrichment, EnrichmentResult, OrgMapping, UpdateRecord};
use crate::org_mapper::{distinct_org_ids, select_mappings, OrgAccountMapper};
use crate::task_queue::TaskQueue;
use crate::usage_repository::{UsageRepository, UsageSource};
use crate::usage_signals::{compute_usage_signals, OrgUsage, UsageSignals};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parses the first element of a workflow's argument list.
///
/// An empty list means "all defaults". Anything that is not a JSON object of
/// the expected shape is a `ParseError`.
fn parse_first<T: DeserializeOwned + Default>(inputs: &[String]) -> Result<T, AppError> {
    match inputs.first() {
        None => Ok(T::default()),
        Some(raw) => serde_json::from_str(raw).map_err(AppError::from),
    }
}

// ============ Inputs ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UsageEnrichmentInputs {
    pub batch_size: usize,
    pub max_orgs: Option<usize>,
    pub specific_org_id: Option<String>,
}

impl Default for UsageEnrichmentInputs {
    fn default() -> Self {
        Self {
            batch_size: POSTHOG_USAGE_ENRICHMENT_BATCH_SIZE,
            max_orgs: None,
            specific_org_id: None,
        }
    }
}

impl UsageEnrichmentInputs {
    pub fn parse_inputs(inputs: &[String]) -> Result<Self, AppError> {
        parse_first(inputs)
    }

    /// Orgs aggregated per usage query, and records per CRM upsert on this path.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, POSTHOG_USAGE_ENRICHMENT_BATCH_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompanyEnrichmentInputs {
    pub chunk_size: usize,
    pub max_accounts: Option<usize>,
    pub specific_account_id: Option<String>,
}

impl Default for CompanyEnrichmentInputs {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_accounts: None,
            specific_account_id: None,
        }
    }
}

impl CompanyEnrichmentInputs {
    pub fn parse_inputs(inputs: &[String]) -> Result<Self, AppError> {
        parse_first(inputs)
    }

    /// Restricts the account snapshot per the run's filters, keeping fetch order.
    pub fn select_accounts(&self, accounts: Vec<Account>) -> Vec<Account> {
        let filtered = accounts.into_iter().filter(|a| {
            self.specific_account_id
                .as_deref()
                .map_or(true, |id| a.id == id)
        });
        match self.max_accounts {
            Some(max) => filtered.take(max).collect(),
            None => filtered.collect(),
        }
    }
}

// ============ Usage enrichment ============

/// Signals destined for one CRM account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageUpdate {
    pub salesforce_account_id: String,
    pub signals: UsageSignals,
}

/// Pairs each mapping with its org's signals.
///
/// Accounts whose org has no usage data, or whose signals are all absent,
/// produce no update.
pub fn build_usage_updates(
    mappings: &[OrgMapping],
    usage: &HashMap<String, OrgUsage>,
    now: DateTime<Utc>,
) -> Vec<UsageUpdate> {
    let mut signals_by_org: HashMap<&str, UsageSignals> = HashMap::new();
    let mut updates = Vec::new();

    for mapping in mappings {
        let org_id = mapping.posthog_org_id.as_str();
        let Some(org_usage) = usage.get(org_id) else {
            continue;
        };
        let signals = signals_by_org
            .entry(org_id)
            .or_insert_with(|| compute_usage_signals(org_usage, now));
        if signals.is_empty() {
            continue;
        }
        updates.push(UsageUpdate {
            salesforce_account_id: mapping.salesforce_account_id.clone(),
            signals: signals.clone(),
        });
    }
    updates
}

#[derive(Clone)]
pub struct UsageEnrichmentWorkflow<U = UsageRepository> {
    mapper: OrgAccountMapper,
    usage: U,
    engine: BatchUpdateEngine,
}

impl<U: UsageSource> UsageEnrichmentWorkflow<U> {
    pub fn new(mapper: OrgAccountMapper, usage: U, engine: BatchUpdateEngine) -> Self {
        Self {
            mapper,
            usage,
            engine,
        }
    }

    pub async fn run(
        &self,
        inputs: &UsageEnrichmentInputs,
        queue: &TaskQueue,
    ) -> Result<RunSummary, AppError> {
        let mappings = queue
            .execute("load org mappings", || self.mapper.get_org_mappings())
            .await?;
        let selected = select_mappings(mappings, inputs);
        let org_ids = distinct_org_ids(&selected);

        tracing::info!(
            "Usage enrichment: {} org(s), {} account(s)",
            org_ids.len(),
            selected.len()
        );

        let mut accounts_by_org: HashMap<&str, Vec<&OrgMapping>> = HashMap::new();
        for mapping in &selected {
            accounts_by_org
                .entry(mapping.posthog_org_id.as_str())
                .or_default()
                .push(mapping);
        }

        let mut summary = RunSummary::default();
        let batch_size = inputs.effective_batch_size();
        let batches: Vec<&[String]> = org_ids.chunks(batch_size).collect();
        let total_batches = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            let batch_mappings: Vec<OrgMapping> = batch
                .iter()
                .flat_map(|org| accounts_by_org.get(org.as_str()).into_iter().flatten())
                .map(|m| (*m).clone())
                .collect();

            if queue.is_cancelled() {
                summary.cancelled = true;
                summary.skipped += batch_mappings.len();
                continue;
            }

            let name = format!("usage batch {}/{}", index + 1, total_batches);
            let now = Utc::now();
            let usage = match queue
                .execute(&name, || self.usage.fetch_org_usage(batch, now))
                .await
                .with_context(|| format!("{} ({} org(s))", name, batch.len()))
            {
                Ok(usage) => usage,
                Err(e) => {
                    let message = e.to_string();
                    for mapping in &batch_mappings {
                        summary.record_failure(mapping.salesforce_account_id.clone(), message.clone());
                    }
                    continue;
                }
            };

            let updates = build_usage_updates(&batch_mappings, &usage, now);
            summary.skipped += batch_mappings.len() - updates.len();

            let records: Vec<UpdateRecord> = updates
                .iter()
                .map(|u| prepare_update_record(&u.salesforce_account_id, &u.signals))
                .collect();
            summary.merge(self.engine.submit_all(records, batch_size, queue).await);
        }

        tracing::info!(
            "Usage enrichment complete: {} updated, {} failed, {} skipped",
            summary.succeeded,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }
}

// ============ Company enrichment ============

/// Sorts enrichment outcomes into update records and summary counts.
///
/// Unusable domains and not-found companies are skipped; provider errors are
/// failures. Every lost lookup is counted in `transport_errors`, and a
/// not-found that had one is a failure: the lost variation may have matched.
pub fn build_company_updates(
    enrichments: &[AccountEnrichment],
    summary: &mut RunSummary,
) -> Vec<UpdateRecord> {
    let mut records = Vec::new();
    for enrichment in enrichments {
        match enrichment {
            AccountEnrichment::NotEnrichable { account_id, reason } => {
                tracing::warn!("Skipping account {}: {}", account_id, reason);
                summary.skipped += 1;
            }
            AccountEnrichment::Resolved {
                account_id,
                result,
                transport_errors,
                ..
            } => {
                summary.transport_errors += transport_errors.len();
                match result {
                    EnrichmentResult::Found { company } => {
                        records.push(prepare_company_update_record(account_id, company));
                    }
                    EnrichmentResult::NotFound => match transport_errors.first() {
                        Some((domain, error)) => {
                            tracing::warn!("Lookup for account {} lost: {}", account_id, error);
                            summary.record_failure(
                                account_id.clone(),
                                format!("{}: {}", domain, error),
                            );
                        }
                        None => summary.skipped += 1,
                    },
                    EnrichmentResult::ProviderError { message } => {
                        summary.record_failure(account_id.clone(), message.clone());
                    }
                }
            }
        }
    }
    records
}

#[derive(Clone)]
pub struct CompanyEnrichmentWorkflow {
    mapper: OrgAccountMapper,
    client: EnrichmentClient,
    engine: BatchUpdateEngine,
}

impl CompanyEnrichmentWorkflow {
    pub fn new(mapper: OrgAccountMapper, client: EnrichmentClient, engine: BatchUpdateEngine) -> Self {
        Self {
            mapper,
            client,
            engine,
        }
    }

    pub async fn run(
        &self,
        inputs: &CompanyEnrichmentInputs,
        queue: &TaskQueue,
    ) -> Result<RunSummary, AppError> {
        let accounts = queue
            .execute("load accounts", || self.mapper.get_accounts())
            .await?;
        let accounts = inputs.select_accounts(accounts);
        let chunk_size = inputs.chunk_size.max(1);

        tracing::info!(
            "Company enrichment: {} account(s) in chunks of {}",
            accounts.len(),
            chunk_size
        );

        let mut summary = RunSummary::default();

        for (index, chunk) in accounts.chunks(chunk_size).enumerate() {
            if queue.is_cancelled() {
                summary.cancelled = true;
                summary.skipped += chunk.len();
                continue;
            }

            tracing::info!("Enriching account chunk {} ({} accounts)", index + 1, chunk.len());
            let enrichments = self.client.enrich_accounts(chunk).await;
            let records = build_company_updates(&enrichments, &mut summary);

            summary.merge(
                self.engine
                    .submit_all(records, SALESFORCE_UPDATE_BATCH_SIZE, queue)
                    .await,
            );
        }

        tracing::info!(
            "Company enrichment complete: {} updated, {} failed, {} skipped",
            summary.succeeded,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }
}
