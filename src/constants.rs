//! Provider limits, cache keys and CRM field names.

use std::time::Duration;

// ============ Cache ============

pub const CACHE_TTL: Duration = Duration::from_secs(12 * 60 * 60);
pub const CACHE_NAMESPACE: &str = "salesforce-enrichment:global";
pub const ACCOUNTS_CACHE_KEY: &str = "all_accounts";
pub const ORG_MAPPINGS_CACHE_KEY: &str = "org_mappings";

// ============ Harmonic ============

pub const HARMONIC_BASE_URL: &str = "https://api.harmonic.ai";
pub const YC_INVESTOR_NAME: &str = "y combinator";
/// Provider allows ~10 req/s; five in flight keeps us under it.
pub const HARMONIC_DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 5;
pub const HARMONIC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const HARMONIC_BATCH_SIZE: usize = 100;
/// Attempts per lookup when the provider answers 429, and the backoff bounds between them.
pub const HARMONIC_RATE_LIMIT_ATTEMPTS: u32 = 4;
pub const HARMONIC_RATE_LIMIT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const HARMONIC_RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(10);
/// Exact domain first, then with the www prefix.
pub const HARMONIC_DOMAIN_VARIATIONS: [&str; 2] = ["", "www."];

/// Webmail providers. A website on one of these says nothing about the company.
pub const PERSONAL_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
    "icloud.com",
    "protonmail.com",
    "zoho.com",
    "yandex.com",
    "live.com",
    "msn.com",
    "me.com",
    "mac.com",
    "gmx.com",
    "yahoo.co.uk",
    "yahoo.co.jp",
    "yahoo.co.in",
    "yahoo.com.au",
    "yahoo.com.sg",
    "yahoo.com.ph",
    "yahoo.com.my",
    "yahoo.com.hk",
    "yahoo.com.tw",
    "yahoo.com.vn",
    "yahoo.com.br",
    "yahoo.com.ar",
    "yahoo.com.mx",
    "yahoo.com.tr",
    "yahoo.com.ua",
    "yahoo.com.eg",
    "yahoo.com.sa",
    "yahoo.com.ae",
    "yahoo.com.kr",
    "yahoo.com.cn",
    "yahoo.com.ru",
    "yahoo.com.id",
    "yahoo.com.th",
    "yahoo.com.ve",
    "yahoo.com.pe",
    "yahoo.com.cl",
    "yahoo.com.co",
    "yahoo.com.ec",
    "yahoo.com.uy",
    "yahoo.com.py",
    "yahoo.com.bo",
    "yahoo.com.do",
    "yahoo.com.pr",
    "yahoo.com.gt",
    "yahoo.com.sv",
    "yahoo.com.hn",
    "yahoo.com.ni",
    "yahoo.com.cr",
    "yahoo.com.pa",
];

pub const HARMONIC_COMPANY_ENRICHMENT_QUERY: &str = r#"
mutation($identifiers: CompanyEnrichmentIdentifiersInput!) {
    enrichCompanyByIdentifiers(identifiers: $identifiers) {
        companyFound
        company {
            name
            companyType
            website { url domain }
            headcount
            description
            location { city country state }
            foundingDate { date granularity }
            funding {
                fundingTotal
                numFundingRounds
                lastFundingAt
                lastFundingType
                lastFundingTotal
                fundingStage
                investors {
                    __typename
                    ... on Company { name }
                    ... on Person { fullName }
                }
            }
            tractionMetrics {
                webTraffic { latestMetricValue metrics { timestamp metricValue } }
                linkedinFollowerCount { latestMetricValue metrics { timestamp metricValue } }
                twitterFollowerCount { latestMetricValue metrics { timestamp metricValue } }
                headcount { latestMetricValue metrics { timestamp metricValue } }
                headcountEngineering { latestMetricValue metrics { timestamp metricValue } }
            }
            tags { type displayValue dateAdded isPrimaryTag }
            tagsV2 { type displayValue dateAdded }
        }
    }
}
"#;

/// Lookback periods (label, days) used for traction-metric change fields.
pub const METRIC_PERIODS: [(&str, i64); 2] = [("90d", 90), ("180d", 180)];

// ============ Salesforce ============

pub const SALESFORCE_DEFAULT_API_VERSION: &str = "v59.0";
/// Max records per sObject Collections API call.
pub const SALESFORCE_UPDATE_BATCH_SIZE: usize = 200;
/// Accounts handled per company-enrichment chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;
pub const SALESFORCE_ID_FIELD: &str = "Id";
pub const SALESFORCE_OBJECT_TYPE: &str = "Account";

pub const SALESFORCE_ACCOUNTS_QUERY: &str = "SELECT Id, Name, Website, CreatedDate \
     FROM Account \
     WHERE Website != null \
     ORDER BY CreatedDate DESC";

pub const POSTHOG_ORG_ID_FIELD: &str = "Posthog_Org_ID__c";
pub const SALESFORCE_ORG_MAPPINGS_QUERY: &str = "SELECT Id, Posthog_Org_ID__c \
     FROM Account \
     WHERE Posthog_Org_ID__c != null \
     ORDER BY CreatedDate DESC";

/// Failure details kept in a run summary.
pub const MAX_FAILURE_DETAILS: usize = 10;

// ============ Usage signals ============

pub const POSTHOG_USAGE_ENRICHMENT_BATCH_SIZE: usize = 100;

/// Internal signal name -> Salesforce custom field.
pub const POSTHOG_USAGE_FIELD_MAPPINGS: [(&str, &str); 19] = [
    // 7-day window
    ("active_users_7d", "posthog_active_users_7d__c"),
    ("sessions_7d", "posthog_sessions_7d__c"),
    ("events_per_session_7d", "posthog_events_per_session_7d__c"),
    ("insights_per_user_7d", "posthog_insights_per_user_7d__c"),
    ("dashboards_per_user_7d", "posthog_dashboards_per_user_7d__c"),
    ("products_activated_7d", "posthog_products_7d__c"),
    // 30-day window
    ("active_users_30d", "posthog_active_users_30d__c"),
    ("sessions_30d", "posthog_sessions_30d__c"),
    ("events_per_session_30d", "posthog_events_per_session_30d__c"),
    ("insights_per_user_30d", "posthog_insights_per_user_30d__c"),
    ("dashboards_per_user_30d", "posthog_dashboards_per_user_30d__c"),
    ("products_activated_30d", "posthog_products_30d__c"),
    // Login recency
    ("days_since_last_login", "posthog_last_login_days__c"),
    // Momentum (7-day)
    ("active_users_7d_momentum", "posthog_active_users_7d_momentum__c"),
    ("sessions_7d_momentum", "posthog_sessions_7d_momentum__c"),
    ("events_per_session_7d_momentum", "posthog_eps_7d_momentum__c"),
    // Momentum (30-day)
    ("active_users_30d_momentum", "posthog_active_users_30d_momentum__c"),
    ("sessions_30d_momentum", "posthog_sessions_30d_momentum__c"),
    ("events_per_session_30d_momentum", "posthog_eps_30d_momentum__c"),
];

// ============ Company fields ============

pub const HARMONIC_NAME_FIELD: &str = "harmonic_company_name__c";
pub const HARMONIC_TYPE_FIELD: &str = "harmonic_company_type__c";
pub const HARMONIC_HEADCOUNT_FIELD: &str = "harmonic_headcount__c";
pub const HARMONIC_ENGINEERING_HEADCOUNT_FIELD: &str = "harmonic_headcount_engineering__c";
pub const HARMONIC_FOUNDED_FIELD: &str = "harmonic_founding_date__c";
pub const HARMONIC_CITY_FIELD: &str = "harmonic_city__c";
pub const HARMONIC_STATE_FIELD: &str = "harmonic_state__c";
pub const HARMONIC_COUNTRY_FIELD: &str = "harmonic_country__c";
pub const HARMONIC_FUNDING_TOTAL_FIELD: &str = "harmonic_funding_total__c";
pub const HARMONIC_FUNDING_ROUNDS_FIELD: &str = "harmonic_funding_rounds__c";
pub const HARMONIC_FUNDING_STAGE_FIELD: &str = "harmonic_funding_stage__c";
pub const HARMONIC_LAST_FUNDING_TYPE_FIELD: &str = "harmonic_last_funding_type__c";
pub const HARMONIC_LAST_FUNDING_TOTAL_FIELD: &str = "harmonic_last_funding_total__c";
pub const HARMONIC_LAST_FUNDING_DATE_FIELD: &str = "harmonic_last_funding_date__c";
pub const HARMONIC_IS_YC_FIELD: &str = "harmonic_is_yc__c";
pub const HARMONIC_WEB_TRAFFIC_FIELD: &str = "harmonic_web_traffic__c";
pub const HARMONIC_LINKEDIN_FOLLOWERS_FIELD: &str = "harmonic_linkedin_followers__c";
pub const HARMONIC_TWITTER_FOLLOWERS_FIELD: &str = "harmonic_twitter_followers__c";
pub const HARMONIC_PRIMARY_TAG_FIELD: &str = "harmonic_primary_tag__c";
pub const HARMONIC_TAGS_FIELD: &str = "harmonic_tags__c";
