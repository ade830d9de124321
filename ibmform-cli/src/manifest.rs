//! Configuration file
//!
//! Resources and data sources are declared in a JSON file:
//!
//! ```json
//! {
//!   "resources": [
//!     { "type": "ibm_is_bare_metal_server", "name": "web",
//!       "attributes": { "name": "web-1", ... },
//!       "timeouts": { "create": "20m" } }
//!   ],
//!   "data": [
//!     { "type": "ibm_is_instance_template", "name": "tmpl",
//!       "attributes": { "name": "tmpl-1" } }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use ibmform_core::resource::{Resource, ResourceId, Timeouts, Value};
use ibmform_core::schema::ResourceSchema;
use ibmform_provider_ibm::resources::{BARE_METAL_SERVER, find_type};
use ibmform_provider_ibm::merge_tags;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    resources: Vec<Entry>,
    #[serde(default)]
    data: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Entry {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    timeouts: HashMap<String, String>,
}

impl Entry {
    fn into_resource(self, read_only: bool) -> Result<Resource, String> {
        let address = format!("{}.{}", self.resource_type, self.name);
        if read_only && !self.timeouts.is_empty() {
            return Err(format!("{}: data sources do not take timeouts", address));
        }

        let timeouts = Timeouts::from_value(&Value::Map(
            self.timeouts
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        ))
        .map_err(|e| format!("{}: {}", address, e))?;

        let mut resource = Resource::new(self.resource_type, self.name)
            .with_read_only(read_only)
            .with_timeouts(timeouts);
        for (key, json) in self.attributes {
            if let Some(value) = Value::from_json(&json) {
                resource.attributes.insert(key, value);
            }
        }
        Ok(resource)
    }
}

/// Declared resources and data sources, in file order
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub resources: Vec<Resource>,
    pub data: Vec<Resource>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let file: ManifestFile =
            serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;

        let resources = file
            .resources
            .into_iter()
            .map(|e| e.into_resource(false))
            .collect::<Result<Vec<_>, _>>()?;
        let data = file
            .data
            .into_iter()
            .map(|e| e.into_resource(true))
            .collect::<Result<Vec<_>, _>>()?;

        for list in [&resources, &data] {
            let mut seen = HashSet::new();
            for resource in list {
                if !seen.insert(&resource.id) {
                    return Err(format!("Duplicate declaration of {}", resource.id));
                }
            }
        }

        Ok(Self { resources, data })
    }

    pub fn all(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().chain(self.data.iter())
    }

    /// Find a managed resource by its `type.name` address
    pub fn find_resource(&self, address: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id.to_string() == address)
    }

    /// Check every declaration against its type's schema
    pub fn validate(&self) -> Result<(), String> {
        let mut all_errors = Vec::new();

        for resource in self.all() {
            match find_type(&resource.id.resource_type, resource.is_data_source()) {
                Some(t) => {
                    if let Err(errors) = t.schema().validate(&resource.attributes) {
                        for error in errors {
                            all_errors.push(format!("{}: {}", resource.id, error));
                        }
                    }
                }
                None => all_errors.push(format!(
                    "{}: unknown {} type",
                    resource.id,
                    if resource.is_data_source() {
                        "data source"
                    } else {
                        "resource"
                    }
                )),
            }
        }

        if all_errors.is_empty() {
            Ok(())
        } else {
            Err(all_errors.join("\n"))
        }
    }
}

/// Schemas of all managed resource types, keyed by type name
pub fn resource_schemas() -> HashMap<String, ResourceSchema> {
    ibmform_provider_ibm::resources::resource_types()
        .into_iter()
        .filter(|t| !t.is_data_source())
        .map(|t| (t.name().to_string(), t.schema()))
        .collect()
}

/// Fold environment tags into the declared tags of every bare metal server,
/// so they do not show up as drift on the next plan
pub fn with_env_tags(resources: &[Resource], env_tags: &[String]) -> Vec<Resource> {
    resources
        .iter()
        .cloned()
        .map(|mut resource| {
            if resource.id.resource_type == BARE_METAL_SERVER && !env_tags.is_empty() {
                let tags = merge_tags(&resource.get_strings("tags"), env_tags);
                resource
                    .attributes
                    .insert("tags".to_string(), Value::from_strings(tags));
            }
            resource
        })
        .collect()
}

/// Resource to hand to `delete` for a state entry no longer declared
pub fn orphan_resource(id: &ResourceId, attributes: HashMap<String, Value>) -> Resource {
    let mut resource = Resource::new(id.resource_type.clone(), id.name.clone());
    resource.attributes = attributes;
    resource
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MANIFEST: &str = r#"{
        "resources": [
            {
                "type": "ibm_is_bare_metal_server",
                "name": "web",
                "attributes": {
                    "name": "web-1",
                    "profile": "bx2-metal-192x768",
                    "image": "r006-image",
                    "zone": "us-south-3",
                    "keys": ["r006-key"],
                    "primary_network_interface": { "subnet": "0717-subnet" },
                    "tags": ["web"]
                },
                "timeouts": { "create": "20m" }
            }
        ],
        "data": [
            {
                "type": "ibm_is_instance_template",
                "name": "tmpl",
                "attributes": { "name": "tmpl-1" }
            }
        ]
    }"#;

    #[test]
    fn parse_resources_and_data() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.resources.len(), 1);
        assert_eq!(manifest.data.len(), 1);

        let web = manifest.find_resource("ibm_is_bare_metal_server.web").unwrap();
        assert_eq!(web.get_str("name"), Some("web-1"));
        assert_eq!(web.timeouts.create, Some(Duration::from_secs(1200)));
        assert!(manifest.data[0].is_data_source());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn validation_reports_every_error() {
        let manifest = Manifest::parse(
            r#"{ "resources": [
                { "type": "ibm_is_bare_metal_server", "name": "web",
                  "attributes": { "name": "Web" } },
                { "type": "ibm_is_vpc", "name": "main" }
            ] }"#,
        )
        .unwrap();

        let err = manifest.validate().unwrap_err();
        assert!(err.contains("ibm_is_bare_metal_server.web"));
        assert!(err.contains("ibm_is_vpc.main: unknown resource type"));
    }

    #[test]
    fn rejects_duplicates_and_bad_timeouts() {
        let duplicate = r#"{ "resources": [
            { "type": "ibm_cis_waf_rule", "name": "a" },
            { "type": "ibm_cis_waf_rule", "name": "a" }
        ] }"#;
        assert!(Manifest::parse(duplicate).unwrap_err().contains("Duplicate"));

        let bad_timeout = r#"{ "resources": [
            { "type": "ibm_cis_waf_rule", "name": "a", "timeouts": { "read": "1m" } }
        ] }"#;
        assert!(Manifest::parse(bad_timeout).is_err());
    }

    #[test]
    fn env_tags_are_folded_into_servers_only() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let waf = Resource::new("ibm_cis_waf_rule", "sqli");
        let mut resources = manifest.resources.clone();
        resources.push(waf);

        let folded = with_env_tags(&resources, &["env:prod".to_string()]);
        assert_eq!(folded[0].get_strings("tags"), vec!["env:prod", "web"]);
        assert!(folded[1].get("tags").is_none());
    }

    #[test]
    fn schemas_cover_managed_types() {
        let schemas = resource_schemas();
        assert!(schemas.contains_key("ibm_is_bare_metal_server"));
        assert!(schemas.contains_key("ibm_cis_waf_rule"));
        assert_eq!(schemas.len(), 2);
    }
}
