//! IBM Cloud provider
//!
//! Holds the API clients and the settings shared by all handlers. The
//! handlers themselves live next to their resource type
//! (`bare_metal_server`, `cis_waf_rule`, `data_sources`).

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use ibmform_core::provider::ProviderError;
use ibmform_core::resource::{Resource, Timeouts};
use ibmform_core::waiter::{DEFAULT_DELAY, DEFAULT_POLL_INTERVAL, EscalationPolicy};

use crate::client::{ApiError, CisApi, TaggingApi, VpcApi};
use crate::config::{ConfigError, ProviderConfig};
use crate::http::HttpClient;
use crate::resources::find_type;

/// IBM Cloud VPC and CIS provider
pub struct IbmProvider {
    pub(crate) vpc: Arc<dyn VpcApi>,
    pub(crate) tagging: Arc<dyn TaggingApi>,
    pub(crate) cis: Arc<dyn CisApi>,
    /// Merged into the tags of every created bare metal server
    pub(crate) env_tags: Vec<String>,
    /// Used when a bare metal server declares no resource group
    pub(crate) resource_group: Option<String>,
    pub(crate) poll_interval: Duration,
    pub(crate) delay: Duration,
    pub(crate) escalation_policy: EscalationPolicy,
}

impl IbmProvider {
    /// Create a provider talking to IBM Cloud over HTTPS
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        let env_tags = config.env_tags.clone();
        let resource_group = config.resource_group.clone();
        let client = Arc::new(HttpClient::new(config)?);

        Ok(Self::with_clients(client.clone(), client.clone(), client)
            .with_env_tags(env_tags)
            .with_resource_group(resource_group))
    }

    /// Create with specific clients (for testing)
    pub fn with_clients(
        vpc: Arc<dyn VpcApi>,
        tagging: Arc<dyn TaggingApi>,
        cis: Arc<dyn CisApi>,
    ) -> Self {
        Self {
            vpc,
            tagging,
            cis,
            env_tags: Vec::new(),
            resource_group: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            delay: DEFAULT_DELAY,
            escalation_policy: EscalationPolicy::default(),
        }
    }

    pub fn with_env_tags(mut self, env_tags: Vec<String>) -> Self {
        self.env_tags = env_tags;
        self
    }

    pub fn with_resource_group(mut self, resource_group: Option<String>) -> Self {
        self.resource_group = resource_group;
        self
    }

    /// Cadence of every status wait
    pub fn with_polling(mut self, delay: Duration, poll_interval: Duration) -> Self {
        self.delay = delay;
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_escalation_policy(mut self, policy: EscalationPolicy) -> Self {
        self.escalation_policy = policy;
        self
    }

    /// Declared timeouts filled in with the resource type's defaults
    pub(crate) fn timeouts(&self, resource: &Resource) -> Timeouts {
        let defaults = find_type(&resource.id.resource_type, false)
            .map(|t| t.default_timeouts())
            .unwrap_or_default();
        resource.timeouts.or(&defaults)
    }
}

/// Wrap an API error with context, keeping it as the cause
pub(crate) fn api_error(context: impl Display, err: ApiError) -> ProviderError {
    ProviderError::new(format!("{}: {}", context, err)).with_cause(err)
}

/// Error for an attribute the handler needs but the declaration lacks
pub(crate) fn missing_attribute(name: &str) -> ProviderError {
    ProviderError::new(format!("Missing required attribute '{}'", name))
}
