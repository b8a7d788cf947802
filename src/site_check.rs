//! Availability checks for the configured sites.
//!
//! One GET per site; any response other than 200, and any transport error,
//! raises an operator alert through the notification sink.

use crate::notify::NotificationSink;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the availability alert subject: `{site} - Site Check {timestamp}`.
pub fn check_subject(site: &str) -> String {
    format!(
        "{} - Site Check {}",
        site,
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    )
}

/// Bare hostnames are checked over HTTPS; explicit URLs are used as-is.
fn site_url(site: &str) -> String {
    if site.contains("://") {
        site.to_string()
    } else {
        format!("https://{site}")
    }
}

/// Pings each configured site and escalates failures.
pub struct SiteChecker {
    client: reqwest::Client,
    notifier: Arc<dyn NotificationSink>,
}

impl SiteChecker {
    pub fn new(notifier: Arc<dyn NotificationSink>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, notifier }
    }

    /// Check every site in turn. Returns how many failed.
    pub async fn check_sites(&self, sites: &[String]) -> usize {
        let mut failed = 0;
        for site in sites {
            let site = site.trim();
            if site.is_empty() {
                continue;
            }
            if !self.check_site(site).await {
                failed += 1;
            }
        }
        failed
    }

    async fn check_site(&self, site: &str) -> bool {
        let outcome = match self.client.get(site_url(site)).send().await {
            Ok(response) if response.status().as_u16() == 200 => {
                info!("site {site} is up");
                return true;
            }
            Ok(response) => response.status().as_u16().to_string(),
            Err(e) => e.to_string(),
        };

        warn!("site {site} failed availability check: {outcome}");
        let body = format!("The site {site} returned status code or error {outcome}.");
        if let Err(e) = self.notifier.notify(&check_subject(site), &body).await {
            warn!("failed to deliver failure notification: {e}");
        }
        false
    }
}
