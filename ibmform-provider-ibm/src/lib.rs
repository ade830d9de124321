//! ibmform IBM Cloud Provider
//!
//! Manages IBM Cloud VPC bare metal servers and CIS WAF rules, and exposes
//! read-only lookups of servers, server profiles and instance templates.
//!
//! ## Module Structure
//!
//! - `config` - Provider settings, read from the environment or the CLI
//! - `client` - API traits the handlers are written against
//! - `http` - reqwest implementation of the API traits
//! - `models` - Wire types of the VPC, Global Tagging and CIS APIs
//! - `provider` - IbmProvider and shared handler helpers
//! - `bare_metal_server`, `cis_waf_rule`, `data_sources` - Handlers
//! - `resources` / `schemas` - Resource type definitions and schemas
//! - `utils` - Identifier parsing and tag set helpers

pub mod bare_metal_server;
pub mod cis_waf_rule;
pub mod client;
pub mod config;
pub mod data_sources;
pub mod http;
pub mod models;
pub mod provider;
pub mod resources;
pub mod schemas;
pub mod utils;

#[cfg(test)]
mod fakes;

// Re-export main types
pub use config::{ConfigError, ProviderConfig};
pub use provider::IbmProvider;
pub use utils::{WafRuleId, merge_tags};

use ibmform_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use ibmform_core::resource::{Resource, ResourceId, State};

use resources::{
    BARE_METAL_SERVER, BARE_METAL_SERVER_PROFILE, BARE_METAL_SERVER_PROFILES, BARE_METAL_SERVERS,
    CIS_WAF_RULE, INSTANCE_TEMPLATE, INSTANCE_TEMPLATES,
};

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for IbmProvider {
    fn name(&self) -> &'static str {
        "ibm"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let result = match id.resource_type.as_str() {
                BARE_METAL_SERVER => self.read_bare_metal_server(&id, &identifier).await,
                CIS_WAF_RULE => self.read_waf_rule(&id, &identifier).await,
                _ => return Err(unknown_type(&id)),
            };
            result.map_err(|e| e.for_resource(id.clone()))
        })
    }

    fn exists(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<bool>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            match id.resource_type.as_str() {
                BARE_METAL_SERVER => self
                    .bare_metal_server_exists(&identifier)
                    .await
                    .map_err(|e| e.for_resource(id.clone())),
                _ => Ok(self.read(&id, &identifier).await?.exists),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            let id = resource.id.clone();
            let result = match id.resource_type.as_str() {
                BARE_METAL_SERVER => self.create_bare_metal_server(resource).await,
                CIS_WAF_RULE => self.apply_waf_rule(resource).await,
                _ => return Err(unknown_type(&id)),
            };
            result.map_err(|e| e.for_resource(id))
        })
    }

    fn update(
        &self,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            let id = to.id.clone();
            let result = match id.resource_type.as_str() {
                BARE_METAL_SERVER => self.update_bare_metal_server(identifier, from, to).await,
                CIS_WAF_RULE => self.apply_waf_rule(to).await,
                _ => return Err(unknown_type(&id)),
            };
            result.map_err(|e| e.for_resource(id))
        })
    }

    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let resource = resource.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let id = resource.id.clone();
            let result = match id.resource_type.as_str() {
                BARE_METAL_SERVER => self.delete_bare_metal_server(resource, identifier).await,
                CIS_WAF_RULE => self.delete_waf_rule(identifier).await,
                _ => return Err(unknown_type(&id)),
            };
            result.map_err(|e| e.for_resource(id))
        })
    }

    fn read_data_source(&self, source: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let source = source.clone();
        Box::pin(async move {
            let result = match source.id.resource_type.as_str() {
                BARE_METAL_SERVER => self.read_bare_metal_server_data_source(&source).await,
                BARE_METAL_SERVERS => self.read_bare_metal_servers(&source).await,
                BARE_METAL_SERVER_PROFILE => self.read_bare_metal_server_profile(&source).await,
                BARE_METAL_SERVER_PROFILES => self.read_bare_metal_server_profiles(&source).await,
                INSTANCE_TEMPLATE => self.read_instance_template(&source).await,
                INSTANCE_TEMPLATES => self.read_instance_templates(&source).await,
                _ => return Err(unknown_type(&source.id)),
            };
            result.map_err(|e| e.for_resource(source.id.clone()))
        })
    }
}
