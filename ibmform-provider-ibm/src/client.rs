//! API client abstraction
//!
//! Handlers talk to IBM Cloud only through these traits so they can be
//! exercised against in-memory fakes. [`crate::http::HttpClient`] is the
//! production implementation.

use std::future::Future;

use async_trait::async_trait;

use crate::models::{
    BareMetalServer, BareMetalServerPatch, BareMetalServerProfile, BareMetalServerPrototype,
    InstanceTemplate, Page, StopType, WafRule,
};

/// Transport or HTTP error from an IBM Cloud API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}{message}", status.map(|s| format!("HTTP {}: ", s)).unwrap_or_default())]
pub struct ApiError {
    /// HTTP status code; `None` for transport failures
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Some(404), message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[async_trait]
pub trait VpcApi: Send + Sync {
    async fn get_bare_metal_server(&self, id: &str) -> ApiResult<BareMetalServer>;

    async fn create_bare_metal_server(
        &self,
        prototype: &BareMetalServerPrototype,
    ) -> ApiResult<BareMetalServer>;

    async fn update_bare_metal_server(
        &self,
        id: &str,
        patch: &BareMetalServerPatch,
    ) -> ApiResult<BareMetalServer>;

    async fn delete_bare_metal_server(&self, id: &str) -> ApiResult<()>;

    async fn stop_bare_metal_server(&self, id: &str, stop_type: StopType) -> ApiResult<()>;

    async fn list_bare_metal_servers(&self, start: Option<&str>) -> ApiResult<Page<BareMetalServer>>;

    async fn get_bare_metal_server_profile(&self, name: &str) -> ApiResult<BareMetalServerProfile>;

    async fn list_bare_metal_server_profiles(
        &self,
        start: Option<&str>,
    ) -> ApiResult<Page<BareMetalServerProfile>>;

    async fn get_instance_template(&self, id: &str) -> ApiResult<InstanceTemplate>;

    async fn list_instance_templates(&self, start: Option<&str>) -> ApiResult<Page<InstanceTemplate>>;
}

#[async_trait]
pub trait TaggingApi: Send + Sync {
    /// User tags attached to the resource with the given CRN
    async fn get_tags(&self, crn: &str) -> ApiResult<Vec<String>>;

    async fn attach_tags(&self, crn: &str, tags: &[String]) -> ApiResult<()>;

    async fn detach_tags(&self, crn: &str, tags: &[String]) -> ApiResult<()>;
}

#[async_trait]
pub trait CisApi: Send + Sync {
    async fn get_waf_rule(
        &self,
        cis_id: &str,
        domain_id: &str,
        package_id: &str,
        rule_id: &str,
    ) -> ApiResult<WafRule>;

    async fn set_waf_rule_mode(
        &self,
        cis_id: &str,
        domain_id: &str,
        package_id: &str,
        rule_id: &str,
        mode: &str,
    ) -> ApiResult<WafRule>;
}

/// Drain a paginated listing, following `start` tokens until exhausted
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> ApiResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = ApiResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut start = None;
    loop {
        let page = fetch(start.take()).await?;
        items.extend(page.items);
        match page.next_start {
            Some(next) if !next.is_empty() => start = Some(next),
            _ => return Ok(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        assert_eq!(
            ApiError::new(Some(404), "Bare metal server not found").to_string(),
            "HTTP 404: Bare metal server not found"
        );
        assert_eq!(
            ApiError::new(None, "connection refused").to_string(),
            "connection refused"
        );
        assert!(ApiError::not_found("gone").is_not_found());
    }

    #[tokio::test]
    async fn collect_pages_follows_tokens() {
        let items = collect_pages(|start| async move {
            Ok(match start.as_deref() {
                None => Page {
                    items: vec![1, 2],
                    next_start: Some("p2".to_string()),
                },
                Some("p2") => Page {
                    items: vec![3],
                    next_start: Some("p3".to_string()),
                },
                _ => Page {
                    items: vec![4],
                    next_start: None,
                },
            })
        })
        .await
        .unwrap();
        assert_eq!(items, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn collect_pages_stops_on_error() {
        let result: ApiResult<Vec<i32>> =
            collect_pages(|_| async { Err(ApiError::new(Some(500), "boom")) }).await;
        assert_eq!(result.unwrap_err().status, Some(500));
    }
}
