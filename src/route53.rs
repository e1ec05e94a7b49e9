//! Route53 API Client
//!
//! Talks to the Route53 REST API (2013-04-01) with SigV4-signed requests and
//! XML bodies. Implements [`DnsProvider`] for zone listing, change batch
//! submission, change status polling and TXT lookups.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::credentials::AwsCredentials;
use crate::error::{HookError, HookResult, Stage};
use crate::provider::DnsProvider;
use crate::sigv4::{self, canonical_query, SignableRequest};
use crate::types::{ChangeBatch, ChangeInfo, ChangeStatus, Zone};

const ROUTE53_API: &str = "https://route53.amazonaws.com";
const API_VERSION: &str = "2013-04-01";
const XMLNS: &str = "https://route53.amazonaws.com/doc/2013-04-01/";
const SERVICE: &str = "route53";

/// Error codes Route53 returns for requests worth retrying
const RETRYABLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "PriorRequestNotComplete",
    "ServiceUnavailable",
    "InternalFailure",
];

/// Route53 API client
pub struct Route53Client {
    http_client: Client,
    credentials: AwsCredentials,
    region: String,
    endpoint: String,
    host: String,
}

// ============================================================
// API Response Types
// ============================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListHostedZonesResponse {
    #[serde(default)]
    hosted_zones: HostedZones,
    #[serde(default)]
    is_truncated: bool,
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HostedZones {
    #[serde(rename = "HostedZone", default)]
    items: Vec<HostedZone>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HostedZone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeInfoResponse {
    change_info: ChangeInfoXml,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeInfoXml {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListRecordSetsResponse {
    #[serde(default)]
    resource_record_sets: RecordSets,
}

#[derive(Debug, Default, Deserialize)]
struct RecordSets {
    #[serde(rename = "ResourceRecordSet", default)]
    items: Vec<RecordSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecordSet {
    name: String,
    #[serde(rename = "Type")]
    record_type: String,
    #[serde(default)]
    resource_records: ResourceRecords,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceRecords {
    #[serde(rename = "ResourceRecord", default)]
    items: Vec<ResourceRecordValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResourceRecordValue {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InvalidChangeBatch {
    #[serde(default)]
    messages: Messages,
}

#[derive(Debug, Default, Deserialize)]
struct Messages {
    #[serde(rename = "Message", default)]
    items: Vec<String>,
}

// ============================================================
// API Request Types
// ============================================================

#[derive(Debug, Serialize)]
#[serde(rename = "ChangeResourceRecordSetsRequest")]
struct ChangeRecordSetsRequest<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'a str,
    #[serde(rename = "ChangeBatch")]
    change_batch: ChangeBatchXml<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeBatchXml<'a> {
    comment: &'a str,
    changes: ChangesXml<'a>,
}

#[derive(Debug, Serialize)]
struct ChangesXml<'a> {
    #[serde(rename = "Change")]
    items: Vec<ChangeXml<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeXml<'a> {
    action: String,
    resource_record_set: RecordSetXml<'a>,
}

#[derive(Debug, Serialize)]
struct RecordSetXml<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Type")]
    record_type: &'a str,
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "ResourceRecords")]
    resource_records: ResourceRecordsXml<'a>,
}

#[derive(Debug, Serialize)]
struct ResourceRecordsXml<'a> {
    #[serde(rename = "ResourceRecord")]
    items: Vec<ResourceRecordXml<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResourceRecordXml<'a> {
    value: &'a str,
}

// ============================================================
// Wire Helpers
// ============================================================

fn parse_error(message: String) -> HookError {
    HookError::Transport {
        stage: Stage::Submission,
        message,
        retryable: false,
    }
}

/// Signing never succeeds on a second try with the same credentials
fn signing_error(err: anyhow::Error) -> HookError {
    HookError::Transport {
        stage: Stage::Submission,
        message: format!("Failed to sign Route53 request: {:#}", err),
        retryable: false,
    }
}

fn transport_error(err: reqwest::Error) -> HookError {
    HookError::Transport {
        stage: Stage::Submission,
        message: format!("Route53 request failed: {}", err),
        retryable: err.is_timeout() || err.is_connect() || err.is_request(),
    }
}

/// Classify a non-2xx Route53 response
fn api_error(status: StatusCode, body: &str) -> HookError {
    if let Ok(resp) = quick_xml::de::from_str::<ErrorResponse>(body) {
        let code = resp.error.code;
        let retryable = status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || RETRYABLE_CODES.contains(&code.as_str());
        return HookError::Transport {
            stage: Stage::Submission,
            message: format!(
                "Route53 API error ({}): {}: {}",
                status, code, resp.error.message
            ),
            retryable,
        };
    }

    if let Ok(resp) = quick_xml::de::from_str::<InvalidChangeBatch>(body) {
        if !resp.messages.items.is_empty() {
            return HookError::Transport {
                stage: Stage::Submission,
                message: format!(
                    "Route53 rejected change batch: {}",
                    resp.messages.items.join("; ")
                ),
                retryable: false,
            };
        }
    }

    HookError::Transport {
        stage: Stage::Submission,
        message: format!("Route53 API error ({}): {}", status, body.trim()),
        retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
    }
}

/// `/hostedzone/Z123` -> `Z123`
fn short_id<'a>(id: &'a str, prefix: &str) -> &'a str {
    id.strip_prefix(prefix).unwrap_or(id)
}

fn render_change_batch(batch: &ChangeBatch) -> Result<String> {
    let request = ChangeRecordSetsRequest {
        xmlns: XMLNS,
        change_batch: ChangeBatchXml {
            comment: &batch.comment,
            changes: ChangesXml {
                items: batch
                    .changes
                    .iter()
                    .map(|change| ChangeXml {
                        action: change.action.to_string(),
                        resource_record_set: RecordSetXml {
                            name: &change.record.name,
                            record_type: "TXT",
                            ttl: change.record.ttl,
                            resource_records: ResourceRecordsXml {
                                items: vec![ResourceRecordXml {
                                    value: &change.record.value,
                                }],
                            },
                        },
                    })
                    .collect(),
            },
        },
    };

    let body = quick_xml::se::to_string(&request).context("Failed to serialize change batch")?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", body))
}

fn parse_zone_page(body: &str) -> HookResult<(Vec<Zone>, Option<String>)> {
    let page: ListHostedZonesResponse = quick_xml::de::from_str(body)
        .map_err(|e| parse_error(format!("Failed to parse hosted zones response: {}", e)))?;

    let zones = page
        .hosted_zones
        .items
        .into_iter()
        .map(|z| Zone::new(z.name, z.id))
        .collect();
    let next = if page.is_truncated { page.next_marker } else { None };

    Ok((zones, next))
}

fn parse_change_info(body: &str) -> HookResult<ChangeInfo> {
    let resp: ChangeInfoResponse = quick_xml::de::from_str(body)
        .map_err(|e| parse_error(format!("Failed to parse change info: {}", e)))?;

    let status = ChangeStatus::parse(&resp.change_info.status).ok_or_else(|| {
        parse_error(format!("Unknown change status: {}", resp.change_info.status))
    })?;

    Ok(ChangeInfo {
        id: resp.change_info.id,
        status,
    })
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

fn parse_txt_values(body: &str, record_name: &str) -> HookResult<Vec<String>> {
    let resp: ListRecordSetsResponse = quick_xml::de::from_str(body)
        .map_err(|e| parse_error(format!("Failed to parse record sets: {}", e)))?;

    Ok(resp
        .resource_record_sets
        .items
        .into_iter()
        .filter(|set| set.record_type == "TXT" && same_name(&set.name, record_name))
        .flat_map(|set| set.resource_records.items.into_iter().map(|r| r.value))
        .collect())
}

// ============================================================
// Client Implementation
// ============================================================

impl Route53Client {
    /// Create a client for the public Route53 endpoint
    pub fn new(credentials: AwsCredentials, region: &str) -> Result<Self> {
        Self::with_endpoint(credentials, region, ROUTE53_API)
    }

    /// Create a client for a custom endpoint (no path component)
    pub fn with_endpoint(
        credentials: AwsCredentials,
        region: &str,
        endpoint: &str,
    ) -> Result<Self> {
        let url = Url::parse(endpoint)
            .with_context(|| format!("Invalid Route53 endpoint: {}", endpoint))?;
        let host = url
            .host_str()
            .context(format!("Route53 endpoint has no host: {}", endpoint))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let http_client = Client::builder()
            .user_agent(concat!("route53-acme-hook/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            credentials,
            region: region.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            host,
        })
    }

    /// Send a signed request and return the response body
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> HookResult<String> {
        let payload = body.as_deref().unwrap_or_default();
        let signed = sigv4::sign(
            &self.credentials,
            &self.region,
            SERVICE,
            Utc::now(),
            &SignableRequest {
                method: method.as_str(),
                host: &self.host,
                path,
                query,
                payload: payload.as_bytes(),
            },
        )
        .map_err(signing_error)?;

        let mut url = format!("{}{}", self.endpoint, path);
        let query_string = canonical_query(query);
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }

        debug!("Route53 {} {}", method, url);

        let mut request = self.http_client.request(method, &url);
        for (name, value) in signed.into_pairs() {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.header("Content-Type", "application/xml").body(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(api_error(status, &text));
        }

        Ok(text)
    }
}

#[async_trait]
impl DnsProvider for Route53Client {
    async fn list_zones(&self) -> HookResult<Vec<Zone>> {
        let path = format!("/{}/hostedzone", API_VERSION);
        let mut zones = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = match marker.as_deref() {
                Some(m) => vec![("marker", m)],
                None => Vec::new(),
            };
            let body = self.send(Method::GET, &path, &query, None).await?;
            let (page, next) = parse_zone_page(&body)?;

            debug!("Fetched {} hosted zones", page.len());
            zones.extend(page);

            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(zones)
    }

    async fn submit_change_batch(
        &self,
        zone_id: &str,
        batch: &ChangeBatch,
    ) -> HookResult<ChangeInfo> {
        let path = format!(
            "/{}/hostedzone/{}/rrset",
            API_VERSION,
            short_id(zone_id, "/hostedzone/")
        );
        let body = render_change_batch(batch)
            .map_err(|e| HookError::MalformedInput(e.to_string()))?;

        let response = self.send(Method::POST, &path, &[], Some(body)).await?;
        parse_change_info(&response)
    }

    async fn get_change_status(&self, change_id: &str) -> HookResult<ChangeStatus> {
        let path = format!("/{}/change/{}", API_VERSION, short_id(change_id, "/change/"));
        let response = self.send(Method::GET, &path, &[], None).await?;

        Ok(parse_change_info(&response)?.status)
    }

    async fn find_txt_values(
        &self,
        zone_id: &str,
        record_name: &str,
    ) -> HookResult<Vec<String>> {
        let path = format!(
            "/{}/hostedzone/{}/rrset",
            API_VERSION,
            short_id(zone_id, "/hostedzone/")
        );
        let query = [("name", record_name), ("type", "TXT"), ("maxitems", "1")];
        let response = self.send(Method::GET, &path, &query, None).await?;

        parse_txt_values(&response, record_name)
    }

    fn provider_name(&self) -> &str {
        "route53"
    }
}
