//! Builds CRM update payloads from computed signals and enrichment profiles.
//!
//! A field is written only when we actually know its value; absent keys leave
//! the CRM field untouched rather than blanking it.

use crate::constants::*;
use crate::models::{CompanyProfile, MetricSeries, UpdateRecord};
use crate::usage_signals::{render_list, UsageSignals};
use serde_json::Value;

fn new_record(record_id: &str) -> UpdateRecord {
    let mut record = UpdateRecord::new();
    record.insert(
        SALESFORCE_ID_FIELD.to_string(),
        Value::String(record_id.to_string()),
    );
    record
}

fn put(record: &mut UpdateRecord, field: &str, value: Option<Value>) {
    if let Some(value) = value {
        record.insert(field.to_string(), value);
    }
}

/// Usage signals -> CRM update record.
///
/// Every key from `POSTHOG_USAGE_FIELD_MAPPINGS` whose signal is present is
/// written; product lists are rendered sorted, deduplicated and comma-joined.
pub fn prepare_update_record(record_id: &str, signals: &UsageSignals) -> UpdateRecord {
    let mut record = new_record(record_id);
    for (signal, field) in POSTHOG_USAGE_FIELD_MAPPINGS {
        put(
            &mut record,
            field,
            signals.get(signal).map(|value| value.to_field_value()),
        );
    }
    record
}

/// `harmonic_<metric>_<label>_change__c`
pub fn change_field(metric: &str, label: &str) -> String {
    format!("harmonic_{}_{}_change__c", metric, label)
}

fn text(value: &Option<String>) -> Option<Value> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Value::String(s.to_string()))
}

fn latest(series: &Option<MetricSeries>) -> Option<Value> {
    series.as_ref().and_then(MetricSeries::latest_value).map(Value::from)
}

/// Company profile -> CRM update record.
pub fn prepare_company_update_record(record_id: &str, company: &CompanyProfile) -> UpdateRecord {
    let mut record = new_record(record_id);

    put(&mut record, HARMONIC_NAME_FIELD, text(&company.name));
    put(&mut record, HARMONIC_TYPE_FIELD, text(&company.company_type));
    put(
        &mut record,
        HARMONIC_HEADCOUNT_FIELD,
        company
            .headcount
            .map(Value::from)
            .or_else(|| latest(&company.traction.headcount)),
    );
    put(
        &mut record,
        HARMONIC_ENGINEERING_HEADCOUNT_FIELD,
        latest(&company.traction.headcount_engineering),
    );
    put(
        &mut record,
        HARMONIC_FOUNDED_FIELD,
        company
            .founding_date
            .as_ref()
            .and_then(|f| f.date)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
    );

    if let Some(location) = &company.location {
        put(&mut record, HARMONIC_CITY_FIELD, text(&location.city));
        put(&mut record, HARMONIC_STATE_FIELD, text(&location.state));
        put(&mut record, HARMONIC_COUNTRY_FIELD, text(&location.country));
    }

    if let Some(funding) = &company.funding {
        put(
            &mut record,
            HARMONIC_FUNDING_TOTAL_FIELD,
            funding.funding_total.map(Value::from),
        );
        put(
            &mut record,
            HARMONIC_FUNDING_ROUNDS_FIELD,
            funding.num_funding_rounds.map(Value::from),
        );
        put(
            &mut record,
            HARMONIC_FUNDING_STAGE_FIELD,
            text(&funding.funding_stage),
        );
        put(
            &mut record,
            HARMONIC_LAST_FUNDING_TYPE_FIELD,
            text(&funding.last_funding_type),
        );
        put(
            &mut record,
            HARMONIC_LAST_FUNDING_TOTAL_FIELD,
            funding.last_funding_total.map(Value::from),
        );
        put(
            &mut record,
            HARMONIC_LAST_FUNDING_DATE_FIELD,
            funding
                .last_funding_at
                .map(|at| Value::String(at.format("%Y-%m-%d").to_string())),
        );
    }
    // Always known once a profile came back.
    record.insert(
        HARMONIC_IS_YC_FIELD.to_string(),
        Value::Bool(company.is_yc_backed()),
    );

    let traction = &company.traction;
    put(&mut record, HARMONIC_WEB_TRAFFIC_FIELD, latest(&traction.web_traffic));
    put(
        &mut record,
        HARMONIC_LINKEDIN_FOLLOWERS_FIELD,
        latest(&traction.linkedin_followers),
    );
    put(
        &mut record,
        HARMONIC_TWITTER_FOLLOWERS_FIELD,
        latest(&traction.twitter_followers),
    );

    for (metric, series) in [
        ("headcount", &traction.headcount),
        ("web_traffic", &traction.web_traffic),
    ] {
        let Some(series) = series else { continue };
        for (label, days) in METRIC_PERIODS {
            put(
                &mut record,
                &change_field(metric, label),
                series.change_over_days(days).map(Value::from),
            );
        }
    }

    put(
        &mut record,
        HARMONIC_PRIMARY_TAG_FIELD,
        company
            .primary_tag()
            .map(|t| Value::String(t.display_value.clone())),
    );
    if !company.tags.is_empty() {
        let values: Vec<String> = company
            .tags
            .iter()
            .map(|t| t.display_value.clone())
            .collect();
        record.insert(
            HARMONIC_TAGS_FIELD.to_string(),
            Value::String(render_list(&values)),
        );
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompanyTag, Funding, Investor, Location, MetricPoint, TractionMetrics};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_only_id_for_empty_signals() {
        let record = prepare_update_record("001ABC", &UsageSignals::default());
        assert_eq!(record.len(), 1);
        assert_eq!(record["Id"], json!("001ABC"));
    }

    #[test]
    fn test_numbers_pass_through_unchanged() {
        let signals = UsageSignals {
            active_users_7d: Some(100),
            events_per_session_7d_momentum: Some(-12.5),
            ..Default::default()
        };
        let record = prepare_update_record("001", &signals);
        assert_eq!(record["posthog_active_users_7d__c"], json!(100));
        assert_eq!(record["posthog_eps_7d_momentum__c"], json!(-12.5));
        assert!(!record.contains_key("posthog_events_per_session_7d__c"));
    }

    #[test]
    fn test_company_record_omits_unknown_fields() {
        let company = CompanyProfile {
            name: Some("Acme".into()),
            company_type: Some("  ".into()),
            location: Some(Location {
                city: Some("Berlin".into()),
                state: None,
                country: Some("Germany".into()),
            }),
            ..Default::default()
        };
        let record = prepare_company_update_record("001", &company);

        assert_eq!(record[HARMONIC_NAME_FIELD], json!("Acme"));
        assert_eq!(record[HARMONIC_CITY_FIELD], json!("Berlin"));
        assert_eq!(record[HARMONIC_IS_YC_FIELD], json!(false));
        assert!(!record.contains_key(HARMONIC_TYPE_FIELD));
        assert!(!record.contains_key(HARMONIC_STATE_FIELD));
        assert!(!record.contains_key(HARMONIC_FUNDING_TOTAL_FIELD));
        assert!(!record.contains_key(HARMONIC_TAGS_FIELD));
    }

    #[test]
    fn test_company_record_full_profile() {
        let at = |m: u32| Utc.with_ymd_and_hms(2024, m, 1, 0, 0, 0).unwrap();
        let company = CompanyProfile {
            name: Some("PostHog".into()),
            headcount: Some(60),
            funding: Some(Funding {
                funding_total: Some(27_000_000.0),
                num_funding_rounds: Some(3),
                last_funding_at: Some(at(2)),
                investors: vec![Investor::Company {
                    name: "Y Combinator".into(),
                }],
                ..Default::default()
            }),
            traction: TractionMetrics {
                headcount: Some(MetricSeries::new(
                    Some(60.0),
                    vec![
                        MetricPoint { timestamp: at(1), value: 40.0 },
                        MetricPoint { timestamp: at(6), value: 60.0 },
                    ],
                )),
                ..Default::default()
            },
            tags: vec![
                CompanyTag {
                    tag_type: Some("INDUSTRY".into()),
                    display_value: "Analytics".into(),
                    date_added: None,
                    is_primary: true,
                },
                CompanyTag {
                    tag_type: Some("MARKET".into()),
                    display_value: "Developer Tools".into(),
                    date_added: None,
                    is_primary: false,
                },
            ],
            ..Default::default()
        };

        let record = prepare_company_update_record("001", &company);

        assert_eq!(record[HARMONIC_HEADCOUNT_FIELD], json!(60));
        assert_eq!(record[HARMONIC_IS_YC_FIELD], json!(true));
        assert_eq!(record[HARMONIC_FUNDING_ROUNDS_FIELD], json!(3));
        assert_eq!(record[HARMONIC_LAST_FUNDING_DATE_FIELD], json!("2024-02-01"));
        assert_eq!(record[HARMONIC_PRIMARY_TAG_FIELD], json!("Analytics"));
        assert_eq!(record[HARMONIC_TAGS_FIELD], json!("Analytics,Developer Tools"));
        assert_eq!(record[&change_field("headcount", "90d")], json!(50.0));
        assert!(!record.contains_key(&change_field("headcount", "180d")));
        assert!(!record.contains_key(&change_field("web_traffic", "90d")));
    }
}
