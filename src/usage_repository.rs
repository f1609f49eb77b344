//! Raw per-org usage counts from the `usage_events` table.

use crate::errors::{AppError, ResultExt};
use crate::usage_signals::{OrgUsage, WindowUsage};
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::future::Future;

/// Where the usage run reads raw per-org counts from.
pub trait UsageSource: Clone + Send + Sync + 'static {
    /// Raw usage for every requested org. Orgs without any events are absent.
    fn fetch_org_usage(
        &self,
        org_ids: &[String],
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<HashMap<String, OrgUsage>, AppError>> + Send;
}

#[derive(Debug, FromRow)]
struct WindowRow {
    org_id: String,
    active_users: i64,
    sessions: i64,
    events: i64,
    insights_created: i64,
    dashboards_created: i64,
    products: Vec<String>,
}

#[derive(Debug, FromRow)]
struct LoginRow {
    org_id: String,
    last_login_at: DateTime<Utc>,
}

const WINDOW_QUERY: &str = r#"
    SELECT
        org_id,
        COUNT(DISTINCT person_id)::BIGINT AS active_users,
        COUNT(DISTINCT session_id)::BIGINT AS sessions,
        COUNT(*)::BIGINT AS events,
        COUNT(*) FILTER (WHERE event = 'insight created')::BIGINT AS insights_created,
        COUNT(*) FILTER (WHERE event = 'dashboard created')::BIGINT AS dashboards_created,
        COALESCE(
            ARRAY_AGG(DISTINCT product) FILTER (WHERE product IS NOT NULL),
            ARRAY[]::TEXT[]
        ) AS products
    FROM usage_events
    WHERE org_id = ANY($1)
      AND occurred_at >= $2
      AND occurred_at < $3
    GROUP BY org_id
"#;

const LAST_LOGIN_QUERY: &str = r#"
    SELECT org_id, MAX(occurred_at) AS last_login_at
    FROM usage_events
    WHERE org_id = ANY($1)
      AND event = 'user logged in'
    GROUP BY org_id
"#;

/// Half-open `[start, end)` time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Current and prior windows of `days` length ending at `now`.
pub fn window_pair(now: DateTime<Utc>, days: i64) -> (Window, Window) {
    let length = Duration::days(days);
    let current = Window {
        start: now - length,
        end: now,
    };
    let prior = Window {
        start: now - length - length,
        end: now - length,
    };
    (current, prior)
}

#[derive(Clone)]
pub struct UsageRepository {
    pool: PgPool,
}

impl UsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_window(
        &self,
        org_ids: &[String],
        window: Window,
    ) -> Result<HashMap<String, WindowUsage>, AppError> {
        let rows = sqlx::query_as::<_, WindowRow>(WINDOW_QUERY)
            .bind(org_ids)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("usage window {} .. {}", window.start, window.end))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.org_id,
                    WindowUsage {
                        active_users: row.active_users,
                        sessions: row.sessions,
                        events: row.events,
                        insights_created: row.insights_created,
                        dashboards_created: row.dashboards_created,
                        products: row.products,
                    },
                )
            })
            .collect())
    }

    async fn fetch_last_logins(
        &self,
        org_ids: &[String],
    ) -> Result<HashMap<String, DateTime<Utc>>, AppError> {
        let rows = sqlx::query_as::<_, LoginRow>(LAST_LOGIN_QUERY)
            .bind(org_ids)
            .fetch_all(&self.pool)
            .await
            .context("last login lookup")?;

        Ok(rows
            .into_iter()
            .map(|row| (row.org_id, row.last_login_at))
            .collect())
    }

}

impl UsageSource for UsageRepository {
    async fn fetch_org_usage(
        &self,
        org_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, OrgUsage>, AppError> {
        if org_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let (current_7d, prior_7d) = window_pair(now, 7);
        let (current_30d, prior_30d) = window_pair(now, 30);

        tracing::info!("Fetching usage windows for {} org(s)", org_ids.len());

        let (c7, p7, c30, p30, logins) = tokio::try_join!(
            self.fetch_window(org_ids, current_7d),
            self.fetch_window(org_ids, prior_7d),
            self.fetch_window(org_ids, current_30d),
            self.fetch_window(org_ids, prior_30d),
            self.fetch_last_logins(org_ids),
        )?;

        Ok(assemble_org_usage(c7, p7, c30, p30, logins))
    }
}

fn assemble_org_usage(
    mut current_7d: HashMap<String, WindowUsage>,
    mut prior_7d: HashMap<String, WindowUsage>,
    mut current_30d: HashMap<String, WindowUsage>,
    mut prior_30d: HashMap<String, WindowUsage>,
    mut logins: HashMap<String, DateTime<Utc>>,
) -> HashMap<String, OrgUsage> {
    let mut org_ids: Vec<String> = current_7d
        .keys()
        .chain(prior_7d.keys())
        .chain(current_30d.keys())
        .chain(prior_30d.keys())
        .chain(logins.keys())
        .cloned()
        .collect();
    org_ids.sort();
    org_ids.dedup();

    org_ids
        .into_iter()
        .map(|org_id| {
            let usage = OrgUsage {
                current_7d: current_7d.remove(&org_id),
                prior_7d: prior_7d.remove(&org_id),
                current_30d: current_30d.remove(&org_id),
                prior_30d: prior_30d.remove(&org_id),
                last_login_at: logins.remove(&org_id),
            };
            (org_id, usage)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_pairs_are_adjacent_and_equal_length() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap();
        let (current, prior) = window_pair(now, 7);
        assert_eq!(current.end, now);
        assert_eq!(prior.end, current.start);
        assert_eq!(current.end - current.start, prior.end - prior.start);
        assert_eq!(
            prior.start,
            Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_assemble_keeps_windows_independent() {
        let mut c7 = HashMap::new();
        c7.insert(
            "org-a".to_string(),
            WindowUsage {
                active_users: 3,
                ..Default::default()
            },
        );
        let mut logins = HashMap::new();
        let login = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        logins.insert("org-b".to_string(), login);

        let usage = assemble_org_usage(c7, HashMap::new(), HashMap::new(), HashMap::new(), logins);

        assert_eq!(usage.len(), 2);
        assert_eq!(usage["org-a"].current_7d.as_ref().unwrap().active_users, 3);
        assert!(usage["org-a"].prior_7d.is_none());
        assert!(usage["org-a"].last_login_at.is_none());
        assert!(usage["org-b"].current_7d.is_none());
        assert_eq!(usage["org-b"].last_login_at, Some(login));
    }
}
