//! Harmonic GraphQL wire format.
//!
//! Every field is optional on the wire; conversion into [`CompanyProfile`] drops
//! what cannot be parsed instead of failing the whole company.

use crate::models::{
    CompanyProfile, CompanyTag, FoundingDate, Funding, Investor, Location, MetricPoint,
    MetricSeries, TractionMetrics,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct GraphqlRequest<'a> {
    pub query: &'a str,
    pub variables: Value,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<EnrichmentData>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentData {
    pub enrich_company_by_identifiers: Option<EnrichmentPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentPayload {
    #[serde(default)]
    pub company_found: bool,
    pub company: Option<HarmonicCompany>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarmonicCompany {
    pub name: Option<String>,
    pub company_type: Option<String>,
    pub website: Option<HarmonicWebsite>,
    pub headcount: Option<i64>,
    pub description: Option<String>,
    pub location: Option<HarmonicLocation>,
    pub founding_date: Option<HarmonicFoundingDate>,
    pub funding: Option<HarmonicFunding>,
    pub traction_metrics: Option<HarmonicTraction>,
    #[serde(default)]
    pub tags: Option<Vec<HarmonicTag>>,
    #[serde(default, rename = "tagsV2")]
    pub tags_v2: Option<Vec<HarmonicTag>>,
}

#[derive(Debug, Deserialize)]
pub struct HarmonicWebsite {
    pub url: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HarmonicLocation {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HarmonicFoundingDate {
    pub date: Option<String>,
    pub granularity: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarmonicFunding {
    pub funding_total: Option<f64>,
    pub num_funding_rounds: Option<i64>,
    pub last_funding_at: Option<String>,
    pub last_funding_type: Option<String>,
    pub last_funding_total: Option<f64>,
    pub funding_stage: Option<String>,
    #[serde(default)]
    pub investors: Option<Vec<HarmonicInvestor>>,
}

/// Union member as returned by the `... on Company` / `... on Person` fragments.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum HarmonicInvestor {
    Company { name: String },
    Person {
        #[serde(rename = "fullName")]
        full_name: String,
    },
    /// A union member we did not select fields for.
    Other(Value),
}

impl HarmonicInvestor {
    fn into_investor(self) -> Option<Investor> {
        match self {
            HarmonicInvestor::Company { name } if !name.trim().is_empty() => {
                Some(Investor::Company { name })
            }
            HarmonicInvestor::Person { full_name } if !full_name.trim().is_empty() => {
                Some(Investor::Person { full_name })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarmonicTraction {
    pub web_traffic: Option<HarmonicMetric>,
    pub linkedin_follower_count: Option<HarmonicMetric>,
    pub twitter_follower_count: Option<HarmonicMetric>,
    pub headcount: Option<HarmonicMetric>,
    pub headcount_engineering: Option<HarmonicMetric>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarmonicMetric {
    pub latest_metric_value: Option<f64>,
    #[serde(default)]
    pub metrics: Option<Vec<HarmonicMetricPoint>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarmonicMetricPoint {
    pub timestamp: Option<String>,
    pub metric_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarmonicTag {
    #[serde(rename = "type")]
    pub tag_type: Option<String>,
    pub display_value: Option<String>,
    pub date_added: Option<String>,
    #[serde(default)]
    pub is_primary_tag: Option<bool>,
}

/// Parse the provider's timestamps: RFC3339, naive datetime, or bare date.
pub fn parse_provider_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
}

fn parse_provider_date(raw: &str) -> Option<NaiveDate> {
    parse_provider_timestamp(raw).map(|dt| dt.date_naive())
}

impl HarmonicMetric {
    fn into_series(self) -> MetricSeries {
        let points = self
            .metrics
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| {
                Some(MetricPoint {
                    timestamp: parse_provider_timestamp(p.timestamp.as_deref()?)?,
                    value: p.metric_value?,
                })
            })
            .collect();
        MetricSeries::new(self.latest_metric_value, points)
    }
}

impl HarmonicTag {
    fn into_tag(self, schema_has_primary: bool) -> Option<CompanyTag> {
        let display_value = self.display_value.filter(|v| !v.trim().is_empty())?;
        Some(CompanyTag {
            tag_type: self.tag_type,
            display_value,
            date_added: self.date_added.as_deref().and_then(parse_provider_timestamp),
            is_primary: schema_has_primary && self.is_primary_tag.unwrap_or(false),
        })
    }
}

/// v1 tags first, then v2 tags not already present by (type, value).
fn merge_tags(v1: Vec<HarmonicTag>, v2: Vec<HarmonicTag>) -> Vec<CompanyTag> {
    let mut merged: Vec<CompanyTag> = v1.into_iter().filter_map(|t| t.into_tag(true)).collect();
    for tag in v2.into_iter().filter_map(|t| t.into_tag(false)) {
        let duplicate = merged.iter().any(|existing| {
            existing.tag_type == tag.tag_type
                && existing.display_value.eq_ignore_ascii_case(&tag.display_value)
        });
        if !duplicate {
            merged.push(tag);
        }
    }
    merged
}

impl From<HarmonicCompany> for CompanyProfile {
    fn from(company: HarmonicCompany) -> Self {
        let (website_url, domain) = company
            .website
            .map(|w| (w.url, w.domain))
            .unwrap_or((None, None));

        let funding = company.funding.map(|f| Funding {
            funding_total: f.funding_total,
            num_funding_rounds: f.num_funding_rounds,
            last_funding_at: f.last_funding_at.as_deref().and_then(parse_provider_timestamp),
            last_funding_type: f.last_funding_type,
            last_funding_total: f.last_funding_total,
            funding_stage: f.funding_stage,
            investors: f
                .investors
                .unwrap_or_default()
                .into_iter()
                .filter_map(HarmonicInvestor::into_investor)
                .collect(),
        });

        let traction = company
            .traction_metrics
            .map(|t| TractionMetrics {
                web_traffic: t.web_traffic.map(HarmonicMetric::into_series),
                linkedin_followers: t.linkedin_follower_count.map(HarmonicMetric::into_series),
                twitter_followers: t.twitter_follower_count.map(HarmonicMetric::into_series),
                headcount: t.headcount.map(HarmonicMetric::into_series),
                headcount_engineering: t.headcount_engineering.map(HarmonicMetric::into_series),
            })
            .unwrap_or_default();

        CompanyProfile {
            name: company.name,
            company_type: company.company_type,
            domain,
            website_url,
            headcount: company.headcount,
            description: company.description,
            location: company.location.map(|l| Location {
                city: l.city,
                state: l.state,
                country: l.country,
            }),
            founding_date: company.founding_date.map(|fd| FoundingDate {
                date: fd.date.as_deref().and_then(parse_provider_date),
                granularity: fd.granularity,
            }),
            funding,
            traction,
            tags: merge_tags(
                company.tags.unwrap_or_default(),
                company.tags_v2.unwrap_or_default(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_investor_union_flattens_to_display_names() {
        let raw = json!([
            {"__typename": "Company", "name": "Y Combinator"},
            {"__typename": "Person", "fullName": "Jane Doe"},
            {"__typename": "Company"},
            {}
        ]);
        let investors: Vec<HarmonicInvestor> = serde_json::from_value(raw).unwrap();
        let names: Vec<String> = investors
            .into_iter()
            .filter_map(HarmonicInvestor::into_investor)
            .map(|i| i.display_name().to_string())
            .collect();
        assert_eq!(names, vec!["Y Combinator", "Jane Doe"]);
    }

    #[test]
    fn test_tags_from_both_schema_versions_merge() {
        let company: HarmonicCompany = serde_json::from_value(json!({
            "tags": [
                {"type": "INDUSTRY", "displayValue": "Analytics", "dateAdded": "2023-05-01T00:00:00Z", "isPrimaryTag": true}
            ],
            "tagsV2": [
                {"type": "INDUSTRY", "displayValue": "analytics", "dateAdded": "2023-05-01"},
                {"type": "TECHNOLOGY", "displayValue": "Open Source", "dateAdded": null}
            ]
        }))
        .unwrap();
        let profile = CompanyProfile::from(company);
        assert_eq!(profile.tags.len(), 2);
        assert_eq!(profile.tags[0].display_value, "Analytics");
        assert!(profile.tags[0].is_primary);
        assert_eq!(profile.tags[1].display_value, "Open Source");
        assert!(!profile.tags[1].is_primary);
        assert_eq!(profile.primary_tag().unwrap().display_value, "Analytics");
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_provider_timestamp("2024-01-15T10:30:00Z").is_some());
        assert!(parse_provider_timestamp("2024-01-15T10:30:00.123").is_some());
        assert!(parse_provider_timestamp("2024-01-15").is_some());
        assert!(parse_provider_timestamp("January 2024").is_none());
    }
}
