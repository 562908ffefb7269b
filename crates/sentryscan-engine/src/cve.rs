//! CVE Enricher — evidence gate, cache-first lookup, one live NVD 2.0
//! call on miss. Keeps the top 5 matches by CVSS descending, preferring
//! CVSS v3.1, then v3.0, then v2, and buckets results into severity
//! bands. Cache eviction reuses [`crate::cache::ScanCache`].

use crate::cache::ScanCache;
use sentryscan_core::types::{CveRecord, CveStatus, Severity};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const NVD_BASE_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";
const MIN_CONFIDENCE: f32 = 0.3;
const MIN_BANNER_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub cve_ids: Vec<String>,
    pub max_cvss: f32,
    pub status: CveStatus,
    pub severity: Severity,
}

impl EnrichmentOutcome {
    fn skipped(status: CveStatus) -> Self {
        Self {
            cve_ids: Vec::new(),
            max_cvss: 0.0,
            status,
            severity: Severity::Info,
        }
    }
}

fn is_unknown_service(service: &str) -> bool {
    service.is_empty() || service.eq_ignore_ascii_case("unknown")
}

/// Evidence gate, evaluated in order. Returns `Some(status)` when the
/// lookup should be skipped without ever reaching the CVE store.
fn evidence_gate(
    service: &str,
    version: Option<&str>,
    banner: Option<&str>,
    confidence: f32,
) -> Option<CveStatus> {
    let has_version = version.map(|v| !v.is_empty()).unwrap_or(false);
    let banner_len = banner.map(|b| b.len()).unwrap_or(0);
    let has_substantial_banner = banner_len >= MIN_BANNER_LEN;
    let has_any_banner = banner_len > 0;

    if is_unknown_service(service) && !has_version && !has_any_banner {
        return Some(CveStatus::SkippedNoEvidence);
    }
    if is_unknown_service(service) && !has_version && !has_substantial_banner {
        return Some(CveStatus::SkippedUnknownService);
    }
    if confidence < MIN_CONFIDENCE && !has_version && !has_any_banner {
        return Some(CveStatus::SkippedLowConfidence);
    }
    None
}

pub struct CveEnricher {
    cache: Arc<ScanCache>,
    client: reqwest::Client,
    cache_ttl_secs: u64,
}

impl CveEnricher {
    pub fn new(cache: Arc<ScanCache>, cache_ttl_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("SentryScan/0.1")
            .build()
            .expect("reqwest client config is static and known-valid");
        Self {
            cache,
            client,
            cache_ttl_secs,
        }
    }

    pub async fn enrich(
        &self,
        service: &str,
        version: Option<&str>,
        banner: Option<&str>,
        confidence: f32,
    ) -> EnrichmentOutcome {
        if let Some(status) = evidence_gate(service, version, banner, confidence) {
            return EnrichmentOutcome::skipped(status);
        }

        let key = match version {
            Some(v) if !v.is_empty() => format!("{}:{v}", service.to_lowercase()),
            _ => service.to_lowercase(),
        };

        let cached: Option<Vec<CveRecord>> = self.cache.get(&key);
        let (records, from_cache) = if let Some(records) = cached {
            (records, true)
        } else {
            let records = self.fetch_live(service, version).await;
            self.cache.set(&key, &records, self.cache_ttl_secs);
            (records, false)
        };

        if records.is_empty() {
            return EnrichmentOutcome {
                cve_ids: Vec::new(),
                max_cvss: 0.0,
                status: CveStatus::NoCvesFound,
                severity: Severity::Info,
            };
        }

        let max_cvss = records.iter().map(|r| r.cvss).fold(0.0f32, f32::max);
        EnrichmentOutcome {
            cve_ids: records.into_iter().map(|r| r.id).collect(),
            max_cvss,
            status: if from_cache {
                CveStatus::SuccessCached
            } else {
                CveStatus::SuccessLive
            },
            severity: Severity::from_cvss(max_cvss),
        }
    }

    async fn fetch_live(&self, service: &str, version: Option<&str>) -> Vec<CveRecord> {
        let mut results = self.do_fetch(service, version).await;
        if results.is_empty() && version.is_some() {
            results = self.do_fetch(service, None).await;
        }
        results
    }

    async fn do_fetch(&self, service: &str, version: Option<&str>) -> Vec<CveRecord> {
        let search_term = match version {
            Some(v) if !v.is_empty() && v != "-" => format!("{service} {v}"),
            _ => service.to_string(),
        };

        let response = match self
            .client
            .get(NVD_BASE_URL)
            .query(&[("keywordSearch", search_term.as_str()), ("resultsPerPage", "10")])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "NVD request failed");
                return Vec::new();
            }
        };

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            warn!("NVD API returned 403 (rate limited?)");
            return Vec::new();
        }
        if !response.status().is_success() {
            warn!(status = %response.status(), "NVD API returned non-success status");
            return Vec::new();
        }

        let body: NvdResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "NVD response body was not the expected shape");
                return Vec::new();
            }
        };

        let mut records: Vec<CveRecord> = body
            .vulnerabilities
            .into_iter()
            .filter_map(|item| item.cve.into_record())
            .collect();

        records.sort_by(|a, b| b.cvss.partial_cmp(&a.cvss).unwrap_or(std::cmp::Ordering::Equal));
        records.truncate(5);
        records
    }
}

#[derive(Debug, Deserialize)]
struct NvdResponse {
    #[serde(default)]
    vulnerabilities: Vec<NvdVulnerability>,
}

#[derive(Debug, Deserialize)]
struct NvdVulnerability {
    cve: NvdCve,
}

#[derive(Debug, Deserialize)]
struct NvdCve {
    id: Option<String>,
    #[serde(default)]
    metrics: NvdMetrics,
    #[serde(default)]
    descriptions: Vec<NvdDescription>,
}

impl NvdCve {
    fn into_record(self) -> Option<CveRecord> {
        let id = self.id?;
        let cvss = self
            .metrics
            .cvss_metric_v31
            .or(self.metrics.cvss_metric_v30)
            .or(self.metrics.cvss_metric_v2)
            .and_then(|list| list.into_iter().next())
            .map(|m| m.cvss_data.base_score)
            .unwrap_or(0.0);
        let description = self
            .descriptions
            .into_iter()
            .find(|d| d.lang == "en")
            .map(|d| d.value)
            .unwrap_or_else(|| "No description available".to_string());
        Some(CveRecord {
            id,
            cvss,
            description,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct NvdMetrics {
    #[serde(rename = "cvssMetricV31")]
    cvss_metric_v31: Option<Vec<NvdCvssMetric>>,
    #[serde(rename = "cvssMetricV30")]
    cvss_metric_v30: Option<Vec<NvdCvssMetric>>,
    #[serde(rename = "cvssMetricV2")]
    cvss_metric_v2: Option<Vec<NvdCvssMetric>>,
}

#[derive(Debug, Deserialize)]
struct NvdCvssMetric {
    #[serde(rename = "cvssData")]
    cvss_data: NvdCvssData,
}

#[derive(Debug, Deserialize)]
struct NvdCvssData {
    #[serde(rename = "baseScore")]
    base_score: f32,
}

#[derive(Debug, Deserialize)]
struct NvdDescription {
    lang: String,
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_service_with_no_banner_at_all_is_no_evidence() {
        let gate = evidence_gate("unknown", None, None, 0.0);
        assert_eq!(gate, Some(CveStatus::SkippedNoEvidence));
    }

    #[test]
    fn empty_service_with_no_banner_at_all_is_no_evidence() {
        let gate = evidence_gate("", None, None, 0.0);
        assert_eq!(gate, Some(CveStatus::SkippedNoEvidence));
    }

    #[test]
    fn unknown_service_with_short_banner_is_unknown_service() {
        let gate = evidence_gate("unknown", None, Some("hi"), 0.0);
        assert_eq!(gate, Some(CveStatus::SkippedUnknownService));
    }

    #[test]
    fn low_confidence_without_version_or_banner_is_skipped() {
        let gate = evidence_gate("http", None, None, 0.1);
        assert_eq!(gate, Some(CveStatus::SkippedLowConfidence));
    }

    #[test]
    fn known_service_with_version_passes_gate() {
        let gate = evidence_gate("ssh", Some("9.7"), None, 0.5);
        assert_eq!(gate, None);
    }

    #[test]
    fn substantial_banner_passes_gate_even_at_low_confidence() {
        let gate = evidence_gate("http", None, Some("Apache/2.4.41 (Ubuntu)"), 0.1);
        assert_eq!(gate, None);
    }
}
