//! reqwest-backed client for the IBM Cloud APIs
//!
//! Authenticates with an IAM API key, caches the bearer token until shortly
//! before it expires, and implements [`VpcApi`], [`TaggingApi`] and
//! [`CisApi`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::client::{ApiError, ApiResult, CisApi, TaggingApi, VpcApi};
use crate::config::{ConfigError, ProviderConfig};
use crate::models::{
    BareMetalServer, BareMetalServerCollection, BareMetalServerPatch, BareMetalServerProfile,
    BareMetalServerProfileCollection, BareMetalServerPrototype, CisEnvelope, InstanceTemplate,
    InstanceTemplateCollection, Page, PageLink, StopType, TagList, TagOperation, TagResource,
    WafRule,
};

/// Refresh the token this long before IAM says it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const PAGE_LIMIT: &str = "50";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct HttpClient {
    http: reqwest::Client,
    config: ProviderConfig,
    api_key: String,
    token: Mutex<Option<CachedToken>>,
}

impl HttpClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let api_key = config.api_key.clone().ok_or(ConfigError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("ibmform/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            http,
            config,
            api_key,
            token: Mutex::new(None),
        })
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    async fn token(&self) -> ApiResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.value.clone());
        }

        debug!("Requesting IAM token from {}", self.config.iam_endpoint);
        let url = format!(
            "{}/identity/token",
            self.config.iam_endpoint.trim_end_matches('/')
        );
        let request = self.http.post(url).form(&[
            ("grant_type", "urn:ibm:params:oauth:grant-type:apikey"),
            ("apikey", self.api_key.as_str()),
        ]);
        let response: TokenResponse = send_json(request).await?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }

    /// VPC request for the path built from `segments`, each percent-encoded
    async fn vpc_request(&self, method: Method, segments: &[&str]) -> ApiResult<RequestBuilder> {
        let token = self.token().await?;
        let mut url = Url::parse(&self.config.vpc_base_url())
            .map_err(|e| ApiError::new(None, format!("Invalid VPC endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::new(None, "VPC endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .query(&[
                ("version", self.config.api_version.as_str()),
                ("generation", "2"),
            ]))
    }

    async fn tagging_request(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        let token = self.token().await?;
        let url = format!(
            "{}/v3/tags{}",
            self.config.tagging_endpoint.trim_end_matches('/'),
            path
        );
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn cis_request(
        &self,
        method: Method,
        cis_id: &str,
        domain_id: &str,
        package_id: &str,
        rule_id: &str,
    ) -> ApiResult<RequestBuilder> {
        let token = self.token().await?;
        let mut url = Url::parse(&self.config.cis_endpoint)
            .map_err(|e| ApiError::new(None, format!("Invalid CIS endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::new(None, "CIS endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend([
                "v1",
                cis_id,
                "zones",
                domain_id,
                "firewall",
                "waf",
                "packages",
                package_id,
                "rules",
                rule_id,
            ]);
        Ok(self
            .http
            .request(method, url)
            .header("X-Auth-User-Token", format!("Bearer {}", token)))
    }

    async fn list_page<C: DeserializeOwned>(
        &self,
        segments: &[&str],
        start: Option<&str>,
    ) -> ApiResult<C> {
        let mut request = self
            .vpc_request(Method::GET, segments)
            .await?
            .query(&[("limit", PAGE_LIMIT)]);
        if let Some(start) = start {
            request = request.query(&[("start", start)]);
        }
        send_json(request).await
    }
}

/// Send a request and decode a JSON body, mapping failures to [`ApiError`]
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> ApiResult<T> {
    let response = send(request).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::new(None, format!("Failed to decode response: {}", e)))
}

async fn send(request: RequestBuilder) -> ApiResult<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| ApiError::new(e.status().map(|s| s.as_u16()), e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::new(Some(status.as_u16()), error_message(status, &body)))
}

/// Best-effort extraction of the API's error message from a response body
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|json| {
        json.get("errors")
            .and_then(|errors| errors.get(0))
            .and_then(|e| e.get("message"))
            .or_else(|| json.get("errorMessage"))
            .or_else(|| json.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });

    match message {
        Some(m) => m,
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        None => body.trim().to_string(),
    }
}

/// `start` query parameter of a collection's `next.href`
fn next_start(next: Option<PageLink>) -> Option<String> {
    let href = next?.href;
    let url = Url::parse(&href).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "start")
        .map(|(_, v)| v.into_owned())
}

#[async_trait]
impl VpcApi for HttpClient {
    async fn get_bare_metal_server(&self, id: &str) -> ApiResult<BareMetalServer> {
        let request = self
            .vpc_request(Method::GET, &["bare_metal_servers", id])
            .await?;
        send_json(request).await
    }

    async fn create_bare_metal_server(
        &self,
        prototype: &BareMetalServerPrototype,
    ) -> ApiResult<BareMetalServer> {
        let request = self
            .vpc_request(Method::POST, &["bare_metal_servers"])
            .await?
            .json(prototype);
        send_json(request).await
    }

    async fn update_bare_metal_server(
        &self,
        id: &str,
        patch: &BareMetalServerPatch,
    ) -> ApiResult<BareMetalServer> {
        let request = self
            .vpc_request(Method::PATCH, &["bare_metal_servers", id])
            .await?
            .header("Content-Type", "application/merge-patch+json")
            .body(
                serde_json::to_vec(patch)
                    .map_err(|e| ApiError::new(None, format!("Failed to encode patch: {}", e)))?,
            );
        send_json(request).await
    }

    async fn delete_bare_metal_server(&self, id: &str) -> ApiResult<()> {
        let request = self
            .vpc_request(Method::DELETE, &["bare_metal_servers", id])
            .await?;
        send(request).await.map(|_| ())
    }

    async fn stop_bare_metal_server(&self, id: &str, stop_type: StopType) -> ApiResult<()> {
        let request = self
            .vpc_request(Method::POST, &["bare_metal_servers", id, "stop"])
            .await?
            .json(&serde_json::json!({ "type": stop_type }));
        send(request).await.map(|_| ())
    }

    async fn list_bare_metal_servers(&self, start: Option<&str>) -> ApiResult<Page<BareMetalServer>> {
        let collection: BareMetalServerCollection =
            self.list_page(&["bare_metal_servers"], start).await?;
        Ok(Page {
            items: collection.bare_metal_servers,
            next_start: next_start(collection.next),
        })
    }

    async fn get_bare_metal_server_profile(&self, name: &str) -> ApiResult<BareMetalServerProfile> {
        let request = self
            .vpc_request(Method::GET, &["bare_metal_server", "profiles", name])
            .await?;
        send_json(request).await
    }

    async fn list_bare_metal_server_profiles(
        &self,
        start: Option<&str>,
    ) -> ApiResult<Page<BareMetalServerProfile>> {
        let collection: BareMetalServerProfileCollection =
            self.list_page(&["bare_metal_server", "profiles"], start).await?;
        Ok(Page {
            items: collection.profiles,
            next_start: next_start(collection.next),
        })
    }

    async fn get_instance_template(&self, id: &str) -> ApiResult<InstanceTemplate> {
        let request = self
            .vpc_request(Method::GET, &["instance", "templates", id])
            .await?;
        send_json(request).await
    }

    async fn list_instance_templates(&self, start: Option<&str>) -> ApiResult<Page<InstanceTemplate>> {
        let collection: InstanceTemplateCollection =
            self.list_page(&["instance", "templates"], start).await?;
        Ok(Page {
            items: collection.templates,
            next_start: next_start(collection.next),
        })
    }
}

#[async_trait]
impl TaggingApi for HttpClient {
    async fn get_tags(&self, crn: &str) -> ApiResult<Vec<String>> {
        let request = self
            .tagging_request(Method::GET, "")
            .await?
            .query(&[("attached_to", crn), ("tag_type", "user")]);
        let tags: TagList = send_json(request).await?;
        Ok(tags.items.into_iter().map(|t| t.name).collect())
    }

    async fn attach_tags(&self, crn: &str, tags: &[String]) -> ApiResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let request = self
            .tagging_request(Method::POST, "/attach")
            .await?
            .json(&tag_operation(crn, tags));
        send(request).await.map(|_| ())
    }

    async fn detach_tags(&self, crn: &str, tags: &[String]) -> ApiResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let request = self
            .tagging_request(Method::POST, "/detach")
            .await?
            .json(&tag_operation(crn, tags));
        send(request).await.map(|_| ())
    }
}

fn tag_operation(crn: &str, tags: &[String]) -> TagOperation {
    TagOperation {
        resources: vec![TagResource {
            resource_id: crn.to_string(),
        }],
        tag_names: tags.to_vec(),
    }
}

#[async_trait]
impl CisApi for HttpClient {
    async fn get_waf_rule(
        &self,
        cis_id: &str,
        domain_id: &str,
        package_id: &str,
        rule_id: &str,
    ) -> ApiResult<WafRule> {
        let request = self
            .cis_request(Method::GET, cis_id, domain_id, package_id, rule_id)
            .await?;
        unwrap_envelope(send_json(request).await?)
    }

    async fn set_waf_rule_mode(
        &self,
        cis_id: &str,
        domain_id: &str,
        package_id: &str,
        rule_id: &str,
        mode: &str,
    ) -> ApiResult<WafRule> {
        let request = self
            .cis_request(Method::PATCH, cis_id, domain_id, package_id, rule_id)
            .await?
            .json(&serde_json::json!({ "mode": mode }));
        unwrap_envelope(send_json(request).await?)
    }
}

fn unwrap_envelope<T>(envelope: CisEnvelope<T>) -> ApiResult<T> {
    if !envelope.success {
        let message = envelope
            .errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ApiError::new(None, message));
    }
    envelope
        .result
        .ok_or_else(|| ApiError::new(None, "CIS response has no result"))
}
