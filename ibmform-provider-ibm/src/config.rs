//! Provider configuration
//!
//! Credentials, region and endpoints for the IBM Cloud APIs. The process
//! environment is read in exactly one place, [`ProviderConfig::from_env`];
//! everything downstream receives the resolved values explicitly.

pub const DEFAULT_REGION: &str = "us-south";
pub const DEFAULT_API_VERSION: &str = "2021-11-09";
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.cloud.ibm.com";
pub const DEFAULT_TAGGING_ENDPOINT: &str = "https://tags.global-search-tagging.cloud.ibm.com";
pub const DEFAULT_CIS_ENDPOINT: &str = "https://api.cis.cloud.ibm.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IBM Cloud API key is not set (use IC_API_KEY or IBMCLOUD_API_KEY)")]
    MissingApiKey,

    #[error("Invalid region '{0}'")]
    InvalidRegion(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub region: String,
    /// Default resource group for created resources
    pub resource_group: Option<String>,
    /// Tags attached to every taggable resource in addition to declared ones
    pub env_tags: Vec<String>,
    pub vpc_endpoint: Option<String>,
    pub iam_endpoint: String,
    pub tagging_endpoint: String,
    pub cis_endpoint: String,
    /// VPC API `version` query parameter
    pub api_version: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            region: DEFAULT_REGION.to_string(),
            resource_group: None,
            env_tags: Vec::new(),
            vpc_endpoint: None,
            iam_endpoint: DEFAULT_IAM_ENDPOINT.to_string(),
            tagging_endpoint: DEFAULT_TAGGING_ENDPOINT.to_string(),
            cis_endpoint: DEFAULT_CIS_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl ProviderConfig {
    /// Build a configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self {
            api_key: get("IC_API_KEY").or_else(|| get("IBMCLOUD_API_KEY")),
            region: get("IC_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            resource_group: get("IC_RESOURCE_GROUP"),
            env_tags: get("IC_ENV_TAGS")
                .map(|v| parse_tag_list(&v))
                .unwrap_or_default(),
            ..Self::default()
        };
        if let Some(endpoint) = get("IBMCLOUD_IS_NG_API_ENDPOINT") {
            config.vpc_endpoint = Some(endpoint);
        }
        if let Some(endpoint) = get("IBMCLOUD_IAM_API_ENDPOINT") {
            config.iam_endpoint = endpoint;
        }
        config
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_resource_group(mut self, resource_group: impl Into<String>) -> Self {
        self.resource_group = Some(resource_group.into());
        self
    }

    pub fn with_env_tags(mut self, tags: Vec<String>) -> Self {
        self.env_tags = tags;
        self
    }

    pub fn with_vpc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.vpc_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_iam_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.iam_endpoint = endpoint.into();
        self
    }

    pub fn with_tagging_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.tagging_endpoint = endpoint.into();
        self
    }

    pub fn with_cis_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.cis_endpoint = endpoint.into();
        self
    }

    /// VPC API base URL, e.g. `https://us-south.iaas.cloud.ibm.com/v1`
    pub fn vpc_base_url(&self) -> String {
        match &self.vpc_endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.iaas.cloud.ibm.com/v1", self.region),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        let region_ok = !self.region.is_empty()
            && self
                .region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !region_ok {
            return Err(ConfigError::InvalidRegion(self.region.clone()));
        }
        Ok(())
    }
}

/// Split a comma separated tag list, dropping blanks
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
