use crate::constants::YC_INVESTOR_NAME;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============ CRM Models ============

/// Snapshot of a CRM account taken at the start of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// CRM record id.
    pub id: String,
    pub name: String,
    /// Website as entered in the CRM; may be anything from a bare domain to a full URL.
    pub website: Option<String>,
    pub created_date: DateTime<Utc>,
}

/// Association between a CRM account and a product organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgMapping {
    pub salesforce_account_id: String,
    pub posthog_org_id: String,
}

/// Field name → value payload for one CRM record, always carrying `Id`.
pub type UpdateRecord = serde_json::Map<String, serde_json::Value>;

// ============ Company Profile ============

/// Company attributes returned by the enrichment provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: Option<String>,
    pub company_type: Option<String>,
    pub domain: Option<String>,
    pub website_url: Option<String>,
    pub headcount: Option<i64>,
    pub description: Option<String>,
    pub location: Option<Location>,
    pub founding_date: Option<FoundingDate>,
    pub funding: Option<Funding>,
    pub traction: TractionMetrics,
    pub tags: Vec<CompanyTag>,
}

impl CompanyProfile {
    /// True when any investor is Y Combinator (case-insensitive exact name match).
    pub fn is_yc_backed(&self) -> bool {
        self.funding
            .as_ref()
            .map(|f| {
                f.investors
                    .iter()
                    .any(|i| i.display_name().trim().to_lowercase() == YC_INVESTOR_NAME)
            })
            .unwrap_or(false)
    }

    pub fn primary_tag(&self) -> Option<&CompanyTag> {
        self.tags.iter().find(|t| t.is_primary)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundingDate {
    pub date: Option<NaiveDate>,
    /// Provider precision marker, e.g. "YEAR", "MONTH", "DAY".
    pub granularity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Funding {
    pub funding_total: Option<f64>,
    pub num_funding_rounds: Option<i64>,
    pub last_funding_at: Option<DateTime<Utc>>,
    pub last_funding_type: Option<String>,
    pub last_funding_total: Option<f64>,
    pub funding_stage: Option<String>,
    pub investors: Vec<Investor>,
}

/// An investor is either an organization or an individual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Investor {
    Company { name: String },
    Person { full_name: String },
}

impl Investor {
    pub fn display_name(&self) -> &str {
        match self {
            Investor::Company { name } => name,
            Investor::Person { full_name } => full_name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TractionMetrics {
    pub web_traffic: Option<MetricSeries>,
    pub linkedin_followers: Option<MetricSeries>,
    pub twitter_followers: Option<MetricSeries>,
    pub headcount: Option<MetricSeries>,
    pub headcount_engineering: Option<MetricSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Latest value plus the dated history behind it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub latest: Option<f64>,
    /// Sorted by timestamp ascending.
    pub points: Vec<MetricPoint>,
}

impl MetricSeries {
    pub fn new(latest: Option<f64>, mut points: Vec<MetricPoint>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self { latest, points }
    }

    /// Most recent value: the provider's latest, else the newest point.
    pub fn latest_value(&self) -> Option<f64> {
        self.latest.or_else(|| self.points.last().map(|p| p.value))
    }

    /// Percentage change between the newest point and the newest point at least
    /// `days` older than it. `None` without such a point or when that base is zero.
    pub fn change_over_days(&self, days: i64) -> Option<f64> {
        let newest = self.points.last()?;
        let current = self.latest.unwrap_or(newest.value);
        let cutoff = newest.timestamp - chrono::Duration::days(days);
        let base = self.points.iter().rev().find(|p| p.timestamp <= cutoff)?;
        if base.value == 0.0 {
            return None;
        }
        Some((current - base.value) / base.value * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyTag {
    pub tag_type: Option<String>,
    pub display_value: String,
    pub date_added: Option<DateTime<Utc>>,
    pub is_primary: bool,
}

// ============ Enrichment Outcomes ============

/// Outcome of looking up one identifier with the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentResult {
    Found { company: Box<CompanyProfile> },
    /// Terminal for this identifier.
    NotFound,
    /// Provider answered with an error; the lookup may be retried.
    ProviderError { message: String },
}

impl EnrichmentResult {
    pub fn is_found(&self) -> bool {
        matches!(self, EnrichmentResult::Found { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EnrichmentResult::ProviderError { .. })
    }

    pub fn company(&self) -> Option<&CompanyProfile> {
        match self {
            EnrichmentResult::Found { company } => Some(company),
            _ => None,
        }
    }
}

/// Per-account result of the company-enrichment path.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountEnrichment {
    /// The account's website yields no usable domain.
    NotEnrichable { account_id: String, reason: String },
    Resolved {
        account_id: String,
        /// The variation that produced the final result.
        domain: String,
        result: EnrichmentResult,
        /// Transport failures seen along the way, by variation.
        transport_errors: Vec<(String, String)>,
    },
}

impl AccountEnrichment {
    pub fn account_id(&self) -> &str {
        match self {
            AccountEnrichment::NotEnrichable { account_id, .. } => account_id,
            AccountEnrichment::Resolved { account_id, .. } => account_id,
        }
    }
}
