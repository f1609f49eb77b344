//! Windowed product-usage signals per organization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sparse usage signals for one org. `None` means "unknown, leave the CRM field alone".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSignals {
    pub active_users_7d: Option<i64>,
    pub sessions_7d: Option<i64>,
    pub events_per_session_7d: Option<f64>,
    pub insights_per_user_7d: Option<f64>,
    pub dashboards_per_user_7d: Option<f64>,
    pub products_activated_7d: Option<Vec<String>>,

    pub active_users_30d: Option<i64>,
    pub sessions_30d: Option<i64>,
    pub events_per_session_30d: Option<f64>,
    pub insights_per_user_30d: Option<f64>,
    pub dashboards_per_user_30d: Option<f64>,
    pub products_activated_30d: Option<Vec<String>>,

    pub days_since_last_login: Option<i64>,

    pub active_users_7d_momentum: Option<f64>,
    pub sessions_7d_momentum: Option<f64>,
    pub events_per_session_7d_momentum: Option<f64>,
    pub active_users_30d_momentum: Option<f64>,
    pub sessions_30d_momentum: Option<f64>,
    pub events_per_session_30d_momentum: Option<f64>,
}

/// A single signal value, typed the way the CRM field expects it.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    Count(i64),
    Ratio(f64),
    Products(Vec<String>),
}

impl SignalValue {
    /// CRM representation. Product lists become a sorted, deduplicated,
    /// comma-joined string; numbers pass through.
    pub fn to_field_value(&self) -> Value {
        match self {
            SignalValue::Count(n) => Value::from(*n),
            SignalValue::Ratio(x) => Value::from(*x),
            SignalValue::Products(products) => Value::from(render_list(products)),
        }
    }
}

/// `",".join(sorted(set(values)))`
pub fn render_list(values: &[String]) -> String {
    let mut unique: Vec<&str> = values.iter().map(String::as_str).collect();
    unique.sort_unstable();
    unique.dedup();
    unique.join(",")
}

impl UsageSignals {
    /// Looks a signal up by its internal name. Unknown names yield `None`.
    pub fn get(&self, name: &str) -> Option<SignalValue> {
        let count = |v: Option<i64>| v.map(SignalValue::Count);
        let ratio = |v: Option<f64>| v.map(SignalValue::Ratio);
        let products = |v: &Option<Vec<String>>| v.clone().map(SignalValue::Products);

        match name {
            "active_users_7d" => count(self.active_users_7d),
            "sessions_7d" => count(self.sessions_7d),
            "events_per_session_7d" => ratio(self.events_per_session_7d),
            "insights_per_user_7d" => ratio(self.insights_per_user_7d),
            "dashboards_per_user_7d" => ratio(self.dashboards_per_user_7d),
            "products_activated_7d" => products(&self.products_activated_7d),
            "active_users_30d" => count(self.active_users_30d),
            "sessions_30d" => count(self.sessions_30d),
            "events_per_session_30d" => ratio(self.events_per_session_30d),
            "insights_per_user_30d" => ratio(self.insights_per_user_30d),
            "dashboards_per_user_30d" => ratio(self.dashboards_per_user_30d),
            "products_activated_30d" => products(&self.products_activated_30d),
            "days_since_last_login" => count(self.days_since_last_login),
            "active_users_7d_momentum" => ratio(self.active_users_7d_momentum),
            "sessions_7d_momentum" => ratio(self.sessions_7d_momentum),
            "events_per_session_7d_momentum" => ratio(self.events_per_session_7d_momentum),
            "active_users_30d_momentum" => ratio(self.active_users_30d_momentum),
            "sessions_30d_momentum" => ratio(self.sessions_30d_momentum),
            "events_per_session_30d_momentum" => ratio(self.events_per_session_30d_momentum),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == UsageSignals::default()
    }
}

/// Raw counts for one org over one time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowUsage {
    pub active_users: i64,
    pub sessions: i64,
    pub events: i64,
    pub insights_created: i64,
    pub dashboards_created: i64,
    pub products: Vec<String>,
}

impl WindowUsage {
    pub fn events_per_session(&self) -> Option<f64> {
        per(self.events, self.sessions)
    }

    pub fn insights_per_user(&self) -> Option<f64> {
        per(self.insights_created, self.active_users)
    }

    pub fn dashboards_per_user(&self) -> Option<f64> {
        per(self.dashboards_created, self.active_users)
    }
}

fn per(numerator: i64, denominator: i64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Everything the aggregator needs for one org. A window is `None` when the org
/// had no data at all in it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrgUsage {
    pub current_7d: Option<WindowUsage>,
    pub prior_7d: Option<WindowUsage>,
    pub current_30d: Option<WindowUsage>,
    pub prior_30d: Option<WindowUsage>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Percentage change between two equal-length windows.
///
/// `None` when either side is missing or the prior value is zero.
pub fn momentum(current: Option<f64>, prior: Option<f64>) -> Option<f64> {
    match (current, prior) {
        (Some(current), Some(prior)) if prior != 0.0 => {
            let pct = (current - prior) / prior * 100.0;
            pct.is_finite().then_some(pct)
        }
        _ => None,
    }
}

struct WindowSignals {
    active_users: Option<i64>,
    sessions: Option<i64>,
    events_per_session: Option<f64>,
    insights_per_user: Option<f64>,
    dashboards_per_user: Option<f64>,
    products: Option<Vec<String>>,
    active_users_momentum: Option<f64>,
    sessions_momentum: Option<f64>,
    events_per_session_momentum: Option<f64>,
}

fn window_signals(current: Option<&WindowUsage>, prior: Option<&WindowUsage>) -> WindowSignals {
    let as_f64 = |v: Option<i64>| v.map(|n| n as f64);

    let active_users = current.map(|w| w.active_users);
    let sessions = current.map(|w| w.sessions);
    let events_per_session = current.and_then(WindowUsage::events_per_session);

    WindowSignals {
        active_users,
        sessions,
        events_per_session,
        insights_per_user: current.and_then(WindowUsage::insights_per_user),
        dashboards_per_user: current.and_then(WindowUsage::dashboards_per_user),
        products: current.map(|w| {
            let mut products = w.products.clone();
            products.sort();
            products.dedup();
            products
        }),
        active_users_momentum: momentum(
            as_f64(active_users),
            as_f64(prior.map(|w| w.active_users)),
        ),
        sessions_momentum: momentum(as_f64(sessions), as_f64(prior.map(|w| w.sessions))),
        events_per_session_momentum: momentum(
            events_per_session,
            prior.and_then(WindowUsage::events_per_session),
        ),
    }
}

/// Builds the signal set for one org from its raw window counts.
pub fn compute_usage_signals(usage: &OrgUsage, now: DateTime<Utc>) -> UsageSignals {
    let week = window_signals(usage.current_7d.as_ref(), usage.prior_7d.as_ref());
    let month = window_signals(usage.current_30d.as_ref(), usage.prior_30d.as_ref());

    UsageSignals {
        active_users_7d: week.active_users,
        sessions_7d: week.sessions,
        events_per_session_7d: week.events_per_session,
        insights_per_user_7d: week.insights_per_user,
        dashboards_per_user_7d: week.dashboards_per_user,
        products_activated_7d: week.products,

        active_users_30d: month.active_users,
        sessions_30d: month.sessions,
        events_per_session_30d: month.events_per_session,
        insights_per_user_30d: month.insights_per_user,
        dashboards_per_user_30d: month.dashboards_per_user,
        products_activated_30d: month.products,

        days_since_last_login: usage
            .last_login_at
            .map(|at| (now - at).num_days().max(0)),

        active_users_7d_momentum: week.active_users_momentum,
        sessions_7d_momentum: week.sessions_momentum,
        events_per_session_7d_momentum: week.events_per_session_momentum,
        active_users_30d_momentum: month.active_users_momentum,
        sessions_30d_momentum: month.sessions_momentum,
        events_per_session_30d_momentum: month.events_per_session_momentum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(active_users: i64, sessions: i64, events: i64) -> WindowUsage {
        WindowUsage {
            active_users,
            sessions,
            events,
            insights_created: active_users * 2,
            dashboards_created: active_users,
            products: vec!["recordings".into(), "analytics".into(), "analytics".into()],
        }
    }

    #[test]
    fn test_momentum_formula() {
        assert_eq!(momentum(Some(150.0), Some(100.0)), Some(50.0));
        assert_eq!(momentum(Some(50.0), Some(100.0)), Some(-50.0));
        assert_eq!(momentum(Some(10.0), Some(0.0)), None);
        assert_eq!(momentum(None, Some(10.0)), None);
        assert_eq!(momentum(Some(10.0), None), None);
    }

    #[test]
    fn test_full_windows_produce_all_signals() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let usage = OrgUsage {
            current_7d: Some(window(10, 40, 400)),
            prior_7d: Some(window(8, 50, 250)),
            current_30d: Some(window(30, 100, 900)),
            prior_30d: Some(window(0, 0, 0)),
            last_login_at: Some(Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap()),
        };

        let signals = compute_usage_signals(&usage, now);

        assert_eq!(signals.active_users_7d, Some(10));
        assert_eq!(signals.sessions_7d, Some(40));
        assert_eq!(signals.events_per_session_7d, Some(10.0));
        assert_eq!(signals.insights_per_user_7d, Some(2.0));
        assert_eq!(signals.dashboards_per_user_7d, Some(1.0));
        assert_eq!(
            signals.products_activated_7d,
            Some(vec!["analytics".to_string(), "recordings".to_string()])
        );
        assert_eq!(signals.active_users_7d_momentum, Some(25.0));
        assert_eq!(signals.sessions_7d_momentum, Some(-20.0));
        assert_eq!(signals.events_per_session_7d_momentum, Some(100.0));

        // Prior 30d window exists but is all zeros: no momentum, no division.
        assert_eq!(signals.active_users_30d, Some(30));
        assert_eq!(signals.active_users_30d_momentum, None);
        assert_eq!(signals.sessions_30d_momentum, None);
        assert_eq!(signals.events_per_session_30d_momentum, None);

        assert_eq!(signals.days_since_last_login, Some(3));
    }

    #[test]
    fn test_missing_windows_are_absent_not_zero() {
        let now = Utc::now();
        let signals = compute_usage_signals(&OrgUsage::default(), now);
        assert!(signals.is_empty());

        let usage = OrgUsage {
            current_7d: Some(WindowUsage::default()),
            ..Default::default()
        };
        let signals = compute_usage_signals(&usage, now);
        assert_eq!(signals.active_users_7d, Some(0));
        assert_eq!(signals.events_per_session_7d, None);
        assert_eq!(signals.insights_per_user_7d, None);
        assert_eq!(signals.products_activated_7d, Some(vec![]));
        assert_eq!(signals.active_users_7d_momentum, None);
        assert_eq!(signals.active_users_30d, None);
    }

    #[test]
    fn test_render_list_sorts_and_dedupes() {
        let values = vec![
            "recordings".to_string(),
            "analytics".to_string(),
            "recordings".to_string(),
        ];
        assert_eq!(render_list(&values), "analytics,recordings");
        assert_eq!(render_list(&[]), "");
    }
}
