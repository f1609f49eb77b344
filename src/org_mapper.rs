//! Cached views of the CRM account list and org mappings.

use crate::cache::CacheService;
use crate::constants::{ACCOUNTS_CACHE_KEY, ORG_MAPPINGS_CACHE_KEY};
use crate::crm_client::CrmClient;
use crate::errors::{AppError, ResultExt};
use crate::models::{Account, OrgMapping};
use crate::workflows::UsageEnrichmentInputs;
use std::collections::HashSet;

#[derive(Clone)]
pub struct OrgAccountMapper {
    crm: CrmClient,
    cache: CacheService,
}

impl OrgAccountMapper {
    pub fn new(crm: CrmClient, cache: CacheService) -> Self {
        Self { crm, cache }
    }

    /// Org mappings, served from cache when present.
    pub async fn get_org_mappings(&self) -> Result<Vec<OrgMapping>, AppError> {
        if let Some(mappings) = self
            .cache
            .get_json::<Vec<OrgMapping>>(ORG_MAPPINGS_CACHE_KEY)
            .await
        {
            tracing::debug!("Org mappings cache hit ({} entries)", mappings.len());
            return Ok(mappings);
        }
        self.refresh_org_mappings().await
    }

    /// Refetches org mappings from the CRM and overwrites the cache entry.
    pub async fn refresh_org_mappings(&self) -> Result<Vec<OrgMapping>, AppError> {
        let mappings = self
            .crm
            .fetch_org_mappings()
            .await
            .context("fetching org mappings")?;
        tracing::info!("Fetched {} org mapping(s) from Salesforce", mappings.len());
        self.cache.set_json(ORG_MAPPINGS_CACHE_KEY, &mappings).await;
        Ok(mappings)
    }

    /// Accounts with a website, served from cache when present.
    pub async fn get_accounts(&self) -> Result<Vec<Account>, AppError> {
        if let Some(accounts) = self.cache.get_json::<Vec<Account>>(ACCOUNTS_CACHE_KEY).await {
            tracing::debug!("Accounts cache hit ({} entries)", accounts.len());
            return Ok(accounts);
        }
        self.refresh_accounts().await
    }

    pub async fn refresh_accounts(&self) -> Result<Vec<Account>, AppError> {
        let accounts = self
            .crm
            .fetch_accounts()
            .await
            .context("fetching accounts")?;
        tracing::info!("Fetched {} account(s) from Salesforce", accounts.len());
        self.cache.set_json(ACCOUNTS_CACHE_KEY, &accounts).await;
        Ok(accounts)
    }
}

/// Applies the run's org filters.
///
/// `specific_org_id` wins over `max_orgs`. The cap counts distinct orgs in
/// fetch order and keeps every account mapped to a selected org.
pub fn select_mappings(
    mappings: Vec<OrgMapping>,
    inputs: &UsageEnrichmentInputs,
) -> Vec<OrgMapping> {
    if let Some(org_id) = inputs.specific_org_id.as_deref() {
        return mappings
            .into_iter()
            .filter(|m| m.posthog_org_id == org_id)
            .collect();
    }

    let Some(max_orgs) = inputs.max_orgs else {
        return mappings;
    };

    let mut selected: HashSet<String> = HashSet::new();
    mappings
        .into_iter()
        .filter(|m| {
            if selected.contains(&m.posthog_org_id) {
                return true;
            }
            if selected.len() < max_orgs {
                selected.insert(m.posthog_org_id.clone());
                return true;
            }
            false
        })
        .collect()
}

/// Distinct org ids in first-seen order.
pub fn distinct_org_ids(mappings: &[OrgMapping]) -> Vec<String> {
    let mut seen = HashSet::new();
    mappings
        .iter()
        .filter(|m| seen.insert(m.posthog_org_id.as_str()))
        .map(|m| m.posthog_org_id.clone())
        .collect()
}
