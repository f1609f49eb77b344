/// Property-based tests using proptest
/// Invariants of signal mapping, momentum, domain normalization and chunking
use crm_enrichment::batch_update::chunk_records;
use crm_enrichment::domain::{is_personal_email_domain, lookup_candidates, normalize_domain};
use crm_enrichment::field_mapper::prepare_update_record;
use crm_enrichment::usage_signals::{momentum, render_list, UsageSignals};
use proptest::prelude::*;

// Property: a signal that is absent never produces a key
proptest! {
    #[test]
    fn absent_signals_never_map_to_keys(
        active_users in proptest::option::of(0i64..1_000_000),
        eps in proptest::option::of(0.0f64..1000.0),
        login in proptest::option::of(0i64..3650),
    ) {
        let signals = UsageSignals {
            active_users_7d: active_users,
            events_per_session_7d: eps,
            days_since_last_login: login,
            ..Default::default()
        };
        let record = prepare_update_record("001", &signals);

        prop_assert_eq!(record.contains_key("posthog_active_users_7d__c"), active_users.is_some());
        prop_assert_eq!(record.contains_key("posthog_events_per_session_7d__c"), eps.is_some());
        prop_assert_eq!(record.contains_key("posthog_last_login_days__c"), login.is_some());
        prop_assert_eq!(
            record.len(),
            1 + [active_users.is_some(), eps.is_some(), login.is_some()]
                .iter()
                .filter(|p| **p)
                .count()
        );
    }
}

// Property: list rendering ignores input order and duplicates
proptest! {
    #[test]
    fn list_rendering_is_order_independent(
        mut products in proptest::collection::vec("[a-z_]{1,12}", 0..8)
    ) {
        let rendered = render_list(&products);
        products.reverse();
        let doubled: Vec<String> = products.iter().chain(products.iter()).cloned().collect();
        prop_assert_eq!(&render_list(&doubled), &rendered);

        let parts: Vec<&str> = if rendered.is_empty() { vec![] } else { rendered.split(',').collect() };
        let mut sorted = parts.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(parts, sorted);
    }
}

// Property: momentum formula and its omissions
proptest! {
    #[test]
    fn momentum_matches_formula(current in 0.0f64..1e6, prior in 0.001f64..1e6) {
        let value = momentum(Some(current), Some(prior)).unwrap();
        let expected = (current - prior) / prior * 100.0;
        prop_assert!((value - expected).abs() <= 1e-9 * expected.abs().max(1.0));
    }

    #[test]
    fn momentum_omitted_without_prior(current in proptest::option::of(0.0f64..1e6)) {
        prop_assert_eq!(momentum(current, Some(0.0)), None);
        prop_assert_eq!(momentum(current, None), None);
        prop_assert_eq!(momentum(None, Some(10.0)), None);
    }
}

// Property: normalization never panics and is stable under scheme/www/case/path noise
proptest! {
    #[test]
    fn normalize_never_panics(website in "\\PC*") {
        let _ = normalize_domain(Some(&website));
    }

    #[test]
    fn url_noise_normalizes_to_bare_domain(
        name in "[a-z][a-z0-9]{0,15}",
        tld in "(com|io|dev|co\\.uk)",
        scheme in "(|http://|https://)",
        www in "(|www\\.|WWW\\.)",
        path in "(|/|/pricing|/a/b\\?x=1)",
    ) {
        // "www.com" has nothing left once the www label is stripped
        prop_assume!(name != "www");
        let bare = format!("{}.{}", name, tld);
        prop_assume!(!is_personal_email_domain(&bare));
        let noisy = format!("{}{}{}{}", scheme, www, bare.to_uppercase(), path);

        prop_assert_eq!(normalize_domain(Some(&noisy)).unwrap(), bare.clone());
        prop_assert_eq!(
            lookup_candidates(Some(&noisy)).unwrap(),
            vec![bare.clone(), format!("www.{}", bare)]
        );
    }
}

// Property: chunking preserves every record exactly once, in order
proptest! {
    #[test]
    fn chunking_preserves_records(len in 0usize..1000, size in 1usize..250) {
        let records: Vec<usize> = (0..len).collect();
        let chunks = chunk_records(records.clone(), size);

        prop_assert_eq!(chunks.len(), len.div_ceil(size));
        prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
        prop_assert_eq!(chunks.concat(), records);
    }
}
