/// Update-record mapping and workflow input parsing
use crm_enrichment::errors::AppError;
use crm_enrichment::field_mapper::prepare_update_record;
use crm_enrichment::models::OrgMapping;
use crm_enrichment::usage_signals::UsageSignals;
use crm_enrichment::workflows::{CompanyEnrichmentInputs, UsageEnrichmentInputs, UsageUpdate};
use serde_json::json;

#[test]
fn test_create_mapping() {
    let mapping = OrgMapping {
        salesforce_account_id: "001ABC123".to_string(),
        posthog_org_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
    };

    assert_eq!(mapping.salesforce_account_id, "001ABC123");
    assert_eq!(mapping.posthog_org_id, "550e8400-e29b-41d4-a716-446655440000");
}

#[test]
fn test_create_update() {
    let update = UsageUpdate {
        salesforce_account_id: "001ABC123".to_string(),
        signals: UsageSignals {
            active_users_7d: Some(100),
            active_users_30d: Some(500),
            sessions_7d: Some(200),
            ..Default::default()
        },
    };

    assert_eq!(update.salesforce_account_id, "001ABC123");
    assert_eq!(update.signals.active_users_7d, Some(100));
}

#[test]
fn test_basic_signals() {
    let signals = UsageSignals {
        active_users_7d: Some(100),
        active_users_30d: Some(500),
        sessions_7d: Some(200),
        sessions_30d: Some(800),
        events_per_session_7d: Some(10.5),
        events_per_session_30d: Some(9.8),
        products_activated_7d: Some(vec!["analytics".into(), "recordings".into()]),
        products_activated_30d: Some(vec![
            "analytics".into(),
            "recordings".into(),
            "feature_flags".into(),
        ]),
        days_since_last_login: Some(3),
        ..Default::default()
    };

    let record = prepare_update_record("001ABC123", &signals);

    assert_eq!(record["Id"], json!("001ABC123"));
    assert_eq!(record["posthog_active_users_7d__c"], json!(100));
    assert_eq!(record["posthog_active_users_30d__c"], json!(500));
    assert_eq!(record["posthog_sessions_7d__c"], json!(200));
    assert_eq!(record["posthog_sessions_30d__c"], json!(800));
    assert_eq!(record["posthog_events_per_session_7d__c"], json!(10.5));
    assert_eq!(record["posthog_events_per_session_30d__c"], json!(9.8));
    assert_eq!(record["posthog_products_7d__c"], json!("analytics,recordings"));
    assert_eq!(
        record["posthog_products_30d__c"],
        json!("analytics,feature_flags,recordings")
    );
    assert_eq!(record["posthog_last_login_days__c"], json!(3));
}

#[test]
fn test_with_momentum() {
    let signals = UsageSignals {
        active_users_7d: Some(100),
        active_users_30d: Some(500),
        active_users_7d_momentum: Some(25.5),
        active_users_30d_momentum: Some(-10.2),
        sessions_7d_momentum: Some(15.0),
        sessions_30d_momentum: Some(5.0),
        events_per_session_7d_momentum: Some(2.5),
        events_per_session_30d_momentum: Some(-1.5),
        ..Default::default()
    };

    let record = prepare_update_record("001ABC123", &signals);

    assert_eq!(record["posthog_active_users_7d_momentum__c"], json!(25.5));
    assert_eq!(record["posthog_active_users_30d_momentum__c"], json!(-10.2));
    assert_eq!(record["posthog_sessions_7d_momentum__c"], json!(15.0));
    assert_eq!(record["posthog_sessions_30d_momentum__c"], json!(5.0));
    assert_eq!(record["posthog_eps_7d_momentum__c"], json!(2.5));
    assert_eq!(record["posthog_eps_30d_momentum__c"], json!(-1.5));
}

#[test]
fn test_none_values_excluded() {
    let signals = UsageSignals {
        active_users_7d: Some(100),
        ..Default::default()
    };

    let record = prepare_update_record("001ABC123", &signals);

    assert_eq!(record["Id"], json!("001ABC123"));
    assert_eq!(record["posthog_active_users_7d__c"], json!(100));
    assert!(!record.contains_key("posthog_events_per_session_7d__c"));
    assert!(!record.contains_key("posthog_last_login_days__c"));
    assert!(!record.contains_key("posthog_active_users_7d_momentum__c"));
}

#[test]
fn test_per_user_metrics() {
    let signals = UsageSignals {
        insights_per_user_7d: Some(2.5),
        insights_per_user_30d: Some(3.2),
        dashboards_per_user_7d: Some(1.0),
        dashboards_per_user_30d: Some(1.5),
        ..Default::default()
    };

    let record = prepare_update_record("001ABC123", &signals);

    assert_eq!(record["posthog_insights_per_user_7d__c"], json!(2.5));
    assert_eq!(record["posthog_insights_per_user_30d__c"], json!(3.2));
    assert_eq!(record["posthog_dashboards_per_user_7d__c"], json!(1.0));
    assert_eq!(record["posthog_dashboards_per_user_30d__c"], json!(1.5));
}

#[test]
fn test_empty_products_list() {
    let signals = UsageSignals {
        products_activated_7d: Some(vec![]),
        products_activated_30d: Some(vec![]),
        ..Default::default()
    };

    let record = prepare_update_record("001ABC123", &signals);

    assert_eq!(record["posthog_products_7d__c"], json!(""));
    assert_eq!(record["posthog_products_30d__c"], json!(""));
}

#[test]
fn test_parse_inputs_valid_json() {
    let inputs = UsageEnrichmentInputs::parse_inputs(&[r#"{"batch_size": 50}"#.to_string()]).unwrap();

    assert_eq!(inputs.batch_size, 50);
    assert_eq!(inputs.max_orgs, None);
    assert_eq!(inputs.specific_org_id, None);
}

#[test]
fn test_parse_inputs_all_fields() {
    let inputs = UsageEnrichmentInputs::parse_inputs(&[
        r#"{"batch_size": 25, "max_orgs": 100, "specific_org_id": "org-123"}"#.to_string(),
    ])
    .unwrap();

    assert_eq!(inputs.batch_size, 25);
    assert_eq!(inputs.max_orgs, Some(100));
    assert_eq!(inputs.specific_org_id.as_deref(), Some("org-123"));
}

#[test]
fn test_parse_inputs_empty_json() {
    let inputs = UsageEnrichmentInputs::parse_inputs(&["{}".to_string()]).unwrap();
    assert_eq!(inputs, UsageEnrichmentInputs::default());
}

#[test]
fn test_parse_inputs_invalid_json_fails() {
    let err = UsageEnrichmentInputs::parse_inputs(&["invalid".to_string()]).unwrap_err();
    assert!(matches!(err, AppError::ParseError(_)));

    let err = CompanyEnrichmentInputs::parse_inputs(&[r#"{"chunk_size": "big"}"#.to_string()])
        .unwrap_err();
    assert!(matches!(err, AppError::ParseError(_)));
}

#[test]
fn test_company_inputs_defaults() {
    let inputs = CompanyEnrichmentInputs::parse_inputs(&[]).unwrap();
    assert_eq!(inputs.chunk_size, 5000);
    assert_eq!(inputs.max_accounts, None);
    assert_eq!(inputs.specific_account_id, None);
}
