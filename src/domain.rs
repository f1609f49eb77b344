//! Website → root domain normalization and lookup candidates.

use crate::constants::{HARMONIC_DOMAIN_VARIATIONS, PERSONAL_EMAIL_DOMAINS};
use crate::errors::AppError;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

fn label_regex() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    LABEL.get_or_init(|| {
        Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("static label regex")
    })
}

/// Derive the comparable root domain of a website.
///
/// `https://www.Example.com/path`, `WWW.example.com` and `example.com` all
/// normalize to `example.com`. Anything without a dotted hostname fails with
/// `AppError::InvalidDomain`; callers skip such accounts instead of aborting.
pub fn normalize_domain(website: Option<&str>) -> Result<String, AppError> {
    let raw = website
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .ok_or_else(|| AppError::InvalidDomain("website is empty".to_string()))?;

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw.trim_start_matches("//"))
    };

    let parsed = Url::parse(&with_scheme)
        .map_err(|e| AppError::InvalidDomain(format!("'{}': {}", raw, e)))?;

    // Url lowercases the host and drops port/path/query for us.
    let host = parsed
        .host_str()
        .map(|h| h.trim_end_matches('.').to_lowercase())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AppError::InvalidDomain(format!("'{}' has no host", raw)))?;

    let root = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let labels: Vec<&str> = root.split('.').collect();
    if labels.len() < 2 || !labels.iter().all(|l| label_regex().is_match(l)) {
        return Err(AppError::InvalidDomain(format!(
            "'{}' is not a hostname",
            raw
        )));
    }
    if labels.iter().all(|l| l.chars().all(|c| c.is_ascii_digit())) {
        return Err(AppError::InvalidDomain(format!(
            "'{}' is an IP address",
            raw
        )));
    }

    Ok(root)
}

/// Lookup candidates for a root domain, in the order they must be tried.
pub fn domain_variations(root_domain: &str) -> Vec<String> {
    HARMONIC_DOMAIN_VARIATIONS
        .iter()
        .map(|prefix| format!("{}{}", prefix, root_domain))
        .collect()
}

/// Whether `root_domain` belongs to a webmail provider such as gmail.com.
pub fn is_personal_email_domain(root_domain: &str) -> bool {
    PERSONAL_EMAIL_DOMAINS.contains(&root_domain)
}

/// Normalize and expand in one step.
///
/// Webmail domains normalize fine but are not enrichable: a lookup would
/// return the provider's own company profile.
pub fn lookup_candidates(website: Option<&str>) -> Result<Vec<String>, AppError> {
    let root = normalize_domain(website)?;
    if is_personal_email_domain(&root) {
        return Err(AppError::InvalidDomain(format!(
            "'{}' is a personal email provider",
            root
        )));
    }
    Ok(domain_variations(&root))
}
