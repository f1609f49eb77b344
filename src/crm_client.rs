use crate::config::Config;
use crate::constants::{
    POSTHOG_ORG_ID_FIELD, SALESFORCE_ACCOUNTS_QUERY, SALESFORCE_ID_FIELD, SALESFORCE_OBJECT_TYPE,
    SALESFORCE_ORG_MAPPINGS_QUERY, SALESFORCE_UPDATE_BATCH_SIZE,
};
use crate::errors::AppError;
use crate::models::{Account, OrgMapping, UpdateRecord};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

// ============ Salesforce wire types ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse<T> {
    #[serde(default)]
    total_size: Option<u64>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    next_records_url: Option<String>,
    records: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Website", default)]
    website: Option<String>,
    #[serde(rename = "CreatedDate")]
    created_date: String,
}

#[derive(Debug, Deserialize)]
struct OrgMappingRow {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Posthog_Org_ID__c", default)]
    org_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaveResult {
    #[serde(default)]
    id: Option<String>,
    success: bool,
    #[serde(default)]
    errors: Vec<SaveError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveError {
    #[serde(default)]
    status_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    fields: Vec<String>,
}

impl SaveError {
    fn describe(&self) -> String {
        let mut out = format!(
            "{}: {}",
            self.status_code.as_deref().unwrap_or("UNKNOWN"),
            self.message.as_deref().unwrap_or("no message")
        );
        if !self.fields.is_empty() {
            out.push_str(&format!(" ({})", self.fields.join(", ")));
        }
        out
    }
}

/// Per-record result of a collection upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub record_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Salesforce timestamps look like `2024-01-15T10:30:00.000+0000`.
pub fn parse_salesforce_datetime(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            AppError::ExternalApiError(format!("Invalid Salesforce datetime '{}': {}", raw, e))
        })
}

/// Client for the Salesforce REST API (SOQL query + sObject Collections).
#[derive(Clone)]
pub struct CrmClient {
    client: Client,
    instance_url: String,
    api_version: String,
    access_token: String,
}

impl CrmClient {
    pub fn new(
        instance_url: impl Into<String>,
        api_version: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create Salesforce client: {}", e))
            })?;

        Ok(Self {
            client,
            instance_url: instance_url.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
            access_token: access_token.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.salesforce_instance_url.clone(),
            config.salesforce_api_version.clone(),
            config.salesforce_access_token.clone(),
        )
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/{}/{}",
            self.instance_url, self.api_version, path
        )
    }

    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::error!("Salesforce returned error {}: {}", status, body);
        Err(AppError::UpstreamStatus {
            service: "salesforce",
            status,
            body,
        })
    }

    /// Runs a SOQL query and follows `nextRecordsUrl` until every page is read.
    pub async fn query_all<T: DeserializeOwned>(&self, soql: &str) -> Result<Vec<T>, AppError> {
        let first_url = reqwest::Url::parse_with_params(&self.data_url("query"), &[("q", soql)])
            .map_err(|e| AppError::InternalError(format!("Failed to build URL: {}", e)))?;

        let mut next_url = Some(first_url.to_string());
        let mut records = Vec::new();
        let mut pages = 0usize;

        while let Some(url) = next_url.take() {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await?;
            let page: QueryResponse<T> = Self::error_for_status(response).await?.json().await?;

            pages += 1;
            if pages == 1 {
                tracing::debug!("Salesforce query reports {:?} total records", page.total_size);
            }
            records.extend(page.records);

            if !page.done {
                next_url = page
                    .next_records_url
                    .map(|path| format!("{}{}", self.instance_url, path));
            }
        }

        tracing::info!(
            "Salesforce query returned {} records over {} page(s)",
            records.len(),
            pages
        );
        Ok(records)
    }

    /// All accounts with a website, newest first.
    pub async fn fetch_accounts(&self) -> Result<Vec<Account>, AppError> {
        let rows: Vec<AccountRow> = self.query_all(SALESFORCE_ACCOUNTS_QUERY).await?;
        rows.into_iter()
            .map(|row| {
                Ok(Account {
                    created_date: parse_salesforce_datetime(&row.created_date)?,
                    id: row.id,
                    name: row.name.unwrap_or_default(),
                    website: row.website,
                })
            })
            .collect()
    }

    /// Every account carrying a product org id, newest first.
    pub async fn fetch_org_mappings(&self) -> Result<Vec<OrgMapping>, AppError> {
        let rows: Vec<OrgMappingRow> = self.query_all(SALESFORCE_ORG_MAPPINGS_QUERY).await?;
        let total = rows.len();
        let mappings: Vec<OrgMapping> = rows
            .into_iter()
            .filter_map(|row| {
                let org_id = row.org_id?.trim().to_string();
                (!org_id.is_empty()).then_some(OrgMapping {
                    salesforce_account_id: row.id,
                    posthog_org_id: org_id,
                })
            })
            .collect();
        if mappings.len() != total {
            tracing::warn!(
                "Dropped {} account(s) with a blank {}",
                total - mappings.len(),
                POSTHOG_ORG_ID_FIELD
            );
        }
        Ok(mappings)
    }

    /// Updates up to 200 accounts in one sObject Collections call with
    /// `allOrNone = false`, so each record succeeds or fails on its own.
    ///
    /// Returns one outcome per input record, in input order. A transport or
    /// HTTP-level failure fails the whole call and is left to the caller to retry.
    pub async fn upsert_records(
        &self,
        records: &[UpdateRecord],
    ) -> Result<Vec<RecordOutcome>, AppError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if records.len() > SALESFORCE_UPDATE_BATCH_SIZE {
            return Err(AppError::BadRequest(format!(
                "{} records exceed the {} record collection limit",
                records.len(),
                SALESFORCE_UPDATE_BATCH_SIZE
            )));
        }

        let mut ids = Vec::with_capacity(records.len());
        let mut payload = Vec::with_capacity(records.len());
        for record in records {
            let id = record
                .get(SALESFORCE_ID_FIELD)
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::BadRequest("update record without Id".to_string()))?;
            ids.push(id.to_string());

            let mut body = record.clone();
            body.insert(
                "attributes".to_string(),
                json!({ "type": SALESFORCE_OBJECT_TYPE }),
            );
            payload.push(Value::Object(body));
        }

        let response = self
            .client
            .patch(self.data_url("composite/sobjects"))
            .bearer_auth(&self.access_token)
            .json(&json!({ "allOrNone": false, "records": payload }))
            .send()
            .await?;
        let results: Vec<SaveResult> = Self::error_for_status(response).await?.json().await?;

        if results.len() != ids.len() {
            return Err(AppError::ExternalApiError(format!(
                "Salesforce returned {} results for {} records",
                results.len(),
                ids.len()
            )));
        }

        Ok(ids
            .into_iter()
            .zip(results)
            .map(|(id, result)| RecordOutcome {
                record_id: result.id.unwrap_or(id),
                success: result.success,
                error: (!result.success).then(|| {
                    if result.errors.is_empty() {
                        "unknown error".to_string()
                    } else {
                        result
                            .errors
                            .iter()
                            .map(SaveError::describe)
                            .collect::<Vec<_>>()
                            .join("; ")
                    }
                }),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_salesforce_datetime() {
        let dt = parse_salesforce_datetime("2024-01-15T10:30:00.000+0000").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-15T10:30:00+00:00");
        assert!(parse_salesforce_datetime("2024-01-15T10:30:00Z").is_ok());
        assert!(parse_salesforce_datetime("yesterday").is_err());
    }

    #[tokio::test]
    async fn test_oversized_chunk_is_rejected_before_sending() {
        let client = CrmClient::new("http://127.0.0.1:9", "v59.0", "token").unwrap();
        let records: Vec<UpdateRecord> = (0..201)
            .map(|i| {
                let mut record = UpdateRecord::new();
                record.insert("Id".into(), json!(format!("001{}", i)));
                record
            })
            .collect();
        let err = client.upsert_records(&records).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
