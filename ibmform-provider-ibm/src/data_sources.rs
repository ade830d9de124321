//! Data source handlers
//!
//! Read-only lookups of bare metal servers, bare metal server profiles and
//! instance templates. List lookups drain every page.

use std::collections::HashMap;

use ibmform_core::provider::{ProviderError, ProviderResult};
use ibmform_core::resource::{Resource, State, Value};

use crate::bare_metal_server::server_attributes;
use crate::client::{VpcApi, collect_pages};
use crate::models::{
    BareMetalServerProfile, InstanceTemplate, ProfileField, Reference, TemplateNetworkInterface,
    TemplateVolumeAttachment,
};
use crate::provider::{IbmProvider, api_error, missing_attribute};

fn insert_opt(map: &mut HashMap<String, Value>, key: &str, value: Option<impl Into<Value>>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v.into());
    }
}

fn json_value(json: &Option<serde_json::Value>) -> Option<Value> {
    json.as_ref().and_then(Value::from_json)
}

/// `{ type, value, values, default }`, keeping only what the API returned
fn profile_field(field: &ProfileField) -> Value {
    let mut map = HashMap::new();
    insert_opt(&mut map, "type", field.kind.clone());
    insert_opt(&mut map, "value", json_value(&field.value));
    insert_opt(&mut map, "default", json_value(&field.default_value));
    if !field.values.is_empty() {
        map.insert(
            "values".to_string(),
            Value::List(field.values.iter().filter_map(Value::from_json).collect()),
        );
    }
    Value::Map(map)
}

fn profile_attributes(profile: &BareMetalServerProfile) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert("name".to_string(), Value::from(profile.name.as_str()));
    attrs.insert("href".to_string(), Value::from(profile.href.as_str()));
    insert_opt(&mut attrs, "family", profile.family.clone());
    insert_opt(&mut attrs, "resource_type", profile.resource_type.clone());
    for (key, field) in [
        ("bandwidth", &profile.bandwidth),
        ("cpu_architecture", &profile.cpu_architecture),
        ("cpu_core_count", &profile.cpu_core_count),
        ("cpu_socket_count", &profile.cpu_socket_count),
        ("memory", &profile.memory),
        ("os_architecture", &profile.os_architecture),
    ] {
        attrs.insert(key.to_string(), profile_field(field));
    }
    attrs.insert(
        "disks".to_string(),
        Value::List(
            profile
                .disks
                .iter()
                .map(|disk| {
                    let mut map = HashMap::new();
                    map.insert("quantity".to_string(), profile_field(&disk.quantity));
                    map.insert("size".to_string(), profile_field(&disk.size));
                    map.insert(
                        "supported_interface_types".to_string(),
                        profile_field(&disk.supported_interface_types),
                    );
                    Value::Map(map)
                })
                .collect(),
        ),
    );
    attrs.insert(
        "supported_image_flags".to_string(),
        Value::from_strings(profile.supported_image_flags.iter().cloned()),
    );
    let tpm_modes = &profile.supported_trusted_platform_module_modes;
    attrs.insert(
        "supported_trusted_platform_module_modes".to_string(),
        Value::from_strings(
            tpm_modes
                .values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string)),
        ),
    );
    attrs
}

fn reference_id(reference: &Option<Reference>) -> Option<String> {
    reference.as_ref().and_then(|r| r.id.clone())
}

fn reference_name(reference: &Option<Reference>) -> Option<String> {
    reference.as_ref().and_then(|r| r.name.clone())
}

fn template_interface(nic: &TemplateNetworkInterface) -> Value {
    let mut map = HashMap::new();
    insert_opt(&mut map, "name", nic.name.clone());
    insert_opt(&mut map, "primary_ipv4_address", nic.primary_ipv4_address.clone());
    insert_opt(&mut map, "subnet", reference_id(&nic.subnet));
    if !nic.security_groups.is_empty() {
        map.insert(
            "security_groups".to_string(),
            Value::from_strings(nic.security_groups.iter().filter_map(|g| g.id.clone())),
        );
    }
    Value::Map(map)
}

fn template_volume_attachment(attachment: &TemplateVolumeAttachment) -> Value {
    let mut map = HashMap::new();
    insert_opt(&mut map, "name", attachment.name.clone());
    insert_opt(
        &mut map,
        "delete_volume_on_instance_delete",
        attachment.delete_volume_on_instance_delete,
    );
    if let Some(volume) = &attachment.volume {
        insert_opt(&mut map, "volume", volume.name.clone());
        insert_opt(&mut map, "size", volume.capacity);
        insert_opt(&mut map, "profile", reference_name(&volume.profile));
    }
    Value::Map(map)
}

fn template_attributes(template: &InstanceTemplate) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert("identifier".to_string(), Value::from(template.id.as_str()));
    attrs.insert("name".to_string(), Value::from(template.name.as_str()));
    attrs.insert("href".to_string(), Value::from(template.href.as_str()));
    attrs.insert("crn".to_string(), Value::from(template.crn.as_str()));
    insert_opt(&mut attrs, "user_data", template.user_data.clone());
    attrs.insert(
        "keys".to_string(),
        Value::from_strings(template.keys.iter().filter_map(|k| k.id.clone())),
    );
    insert_opt(&mut attrs, "profile", reference_name(&template.profile));
    insert_opt(&mut attrs, "vpc", reference_id(&template.vpc));
    insert_opt(&mut attrs, "zone", reference_name(&template.zone));
    insert_opt(&mut attrs, "image", reference_id(&template.image));
    insert_opt(&mut attrs, "resource_group", reference_id(&template.resource_group));
    if let Some(primary) = &template.primary_network_interface {
        attrs.insert(
            "primary_network_interface".to_string(),
            template_interface(primary),
        );
    }
    attrs.insert(
        "network_interfaces".to_string(),
        Value::List(
            template
                .network_interfaces
                .iter()
                .map(template_interface)
                .collect(),
        ),
    );
    attrs.insert(
        "volume_attachments".to_string(),
        Value::List(
            template
                .volume_attachments
                .iter()
                .map(template_volume_attachment)
                .collect(),
        ),
    );
    if let Some(boot) = &template.boot_volume_attachment {
        attrs.insert(
            "boot_volume_attachment".to_string(),
            template_volume_attachment(boot),
        );
    }
    attrs
}

/// Attribute map turned into one list element
fn with_id(mut attrs: HashMap<String, Value>, id: &str) -> Value {
    attrs.insert("id".to_string(), Value::from(id));
    Value::Map(attrs)
}

impl IbmProvider {
    pub(crate) async fn read_bare_metal_server_data_source(
        &self,
        source: &Resource,
    ) -> ProviderResult<State> {
        let identifier = source
            .get_str("identifier")
            .ok_or_else(|| missing_attribute("identifier"))?;
        let mut state = self.read_bare_metal_server(&source.id, identifier).await?;
        if state.exists {
            state
                .attributes
                .insert("identifier".to_string(), Value::from(identifier));
        }
        Ok(state)
    }

    pub(crate) async fn read_bare_metal_servers(&self, source: &Resource) -> ProviderResult<State> {
        let vpc: &dyn VpcApi = self.vpc.as_ref();
        let servers = collect_pages(move |start: Option<String>| async move {
            vpc.list_bare_metal_servers(start.as_deref()).await
        })
        .await
        .map_err(|e| api_error("Failed to list bare metal servers", e))?;

        let list = servers
            .iter()
            .map(|server| with_id(server_attributes(server), &server.id))
            .collect();
        let mut attrs = HashMap::new();
        attrs.insert("servers".to_string(), Value::List(list));
        Ok(State::existing(source.id.clone(), attrs))
    }

    pub(crate) async fn read_bare_metal_server_profile(
        &self,
        source: &Resource,
    ) -> ProviderResult<State> {
        let name = source
            .get_str("name")
            .ok_or_else(|| missing_attribute("name"))?;
        match self.vpc.get_bare_metal_server_profile(name).await {
            Ok(profile) => Ok(State::existing(source.id.clone(), profile_attributes(&profile))
                .with_identifier(profile.name)),
            Err(e) if e.is_not_found() => Ok(State::not_found(source.id.clone())),
            Err(e) => Err(api_error(
                format!("Failed to read bare metal server profile {}", name),
                e,
            )),
        }
    }

    pub(crate) async fn read_bare_metal_server_profiles(
        &self,
        source: &Resource,
    ) -> ProviderResult<State> {
        let vpc: &dyn VpcApi = self.vpc.as_ref();
        let profiles = collect_pages(move |start: Option<String>| async move {
            vpc.list_bare_metal_server_profiles(start.as_deref()).await
        })
        .await
        .map_err(|e| api_error("Failed to list bare metal server profiles", e))?;

        let mut attrs = HashMap::new();
        attrs.insert(
            "profiles".to_string(),
            Value::List(
                profiles
                    .iter()
                    .map(|p| Value::Map(profile_attributes(p)))
                    .collect(),
            ),
        );
        Ok(State::existing(source.id.clone(), attrs))
    }

    async fn list_instance_templates(&self) -> ProviderResult<Vec<InstanceTemplate>> {
        let vpc: &dyn VpcApi = self.vpc.as_ref();
        collect_pages(move |start: Option<String>| async move {
            vpc.list_instance_templates(start.as_deref()).await
        })
        .await
        .map_err(|e| api_error("Failed to list instance templates", e))
    }

    pub(crate) async fn read_instance_template(&self, source: &Resource) -> ProviderResult<State> {
        let template = match (source.get_str("identifier"), source.get_str("name")) {
            (Some(id), None) => match self.vpc.get_instance_template(id).await {
                Ok(template) => template,
                Err(e) if e.is_not_found() => {
                    return Err(ProviderError::new(format!(
                        "No instance template found with identifier {}",
                        id
                    )));
                }
                Err(e) => {
                    return Err(api_error(
                        format!("Failed to read instance template {}", id),
                        e,
                    ));
                }
            },
            (None, Some(name)) => self
                .list_instance_templates()
                .await?
                .into_iter()
                .find(|t| t.name == name)
                .ok_or_else(|| {
                    ProviderError::new(format!("No instance template found with name {}", name))
                })?,
            _ => {
                return Err(ProviderError::new(
                    "Exactly one of 'identifier' or 'name' must be set",
                ));
            }
        };

        Ok(State::existing(source.id.clone(), template_attributes(&template))
            .with_identifier(template.id))
    }

    pub(crate) async fn read_instance_templates(&self, source: &Resource) -> ProviderResult<State> {
        let templates = self.list_instance_templates().await?;
        let mut attrs = HashMap::new();
        attrs.insert(
            "templates".to_string(),
            Value::List(
                templates
                    .iter()
                    .map(|t| Value::Map(template_attributes(t)))
                    .collect(),
            ),
        );
        Ok(State::existing(source.id.clone(), attrs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::fake_provider;
    use serde_json::json;

    fn template(id: &str, name: &str) -> InstanceTemplate {
        InstanceTemplate {
            id: id.to_string(),
            name: name.to_string(),
            keys: vec![Reference {
                id: Some("r006-key".to_string()),
                ..Default::default()
            }],
            zone: Some(Reference {
                name: Some("us-south-1".to_string()),
                ..Default::default()
            }),
            primary_network_interface: Some(TemplateNetworkInterface {
                name: Some("eth0".to_string()),
                subnet: Some(Reference {
                    id: Some("0717-subnet".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn servers_listing_follows_pages() {
        let (provider, vpc, ..) = fake_provider();
        for id in ["bms-1", "bms-2", "bms-3"] {
            vpc.insert_server(id, "running");
        }
        let source = Resource::new("ibm_is_bare_metal_servers", "all").with_read_only(true);

        let state = provider.read_bare_metal_servers(&source).await.unwrap();

        let servers = state.get("servers").unwrap().as_list().unwrap();
        assert_eq!(servers.len(), 3);
        assert_eq!(
            servers[2].as_map().unwrap().get("id"),
            Some(&Value::from("bms-3"))
        );
    }

    #[tokio::test]
    async fn server_by_identifier() {
        let (provider, vpc, ..) = fake_provider();
        vpc.insert_server("bms-1", "running");
        let source = Resource::new("ibm_is_bare_metal_server", "one")
            .with_read_only(true)
            .with_attribute("identifier", "bms-1");

        let state = provider
            .read_bare_metal_server_data_source(&source)
            .await
            .unwrap();
        assert_eq!(state.get("zone"), Some(&Value::from("us-south-3")));
        assert_eq!(state.get("identifier"), Some(&Value::from("bms-1")));

        let missing = source.with_attribute("identifier", "bms-9");
        let state = provider
            .read_bare_metal_server_data_source(&missing)
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn profile_fields_are_kept_as_maps() {
        let (provider, vpc, ..) = fake_provider();
        vpc.profiles.lock().unwrap().push(BareMetalServerProfile {
            name: "bx2-metal-192x768".to_string(),
            family: Some("balanced".to_string()),
            bandwidth: ProfileField {
                kind: Some("enum".to_string()),
                values: vec![json!(100000), json!(200000)],
                default_value: Some(json!(100000)),
                ..Default::default()
            },
            supported_trusted_platform_module_modes: ProfileField {
                kind: Some("enum".to_string()),
                values: vec![json!("disabled"), json!("tpm_2")],
                ..Default::default()
            },
            ..Default::default()
        });
        let source = Resource::new("ibm_is_bare_metal_server_profile", "p")
            .with_read_only(true)
            .with_attribute("name", "bx2-metal-192x768");

        let state = provider.read_bare_metal_server_profile(&source).await.unwrap();

        let bandwidth = state.get("bandwidth").unwrap().as_map().unwrap();
        assert_eq!(bandwidth.get("type"), Some(&Value::from("enum")));
        assert_eq!(bandwidth.get("default"), Some(&Value::Int(100000)));
        assert_eq!(
            state
                .get("supported_trusted_platform_module_modes")
                .unwrap()
                .string_list(),
            vec!["disabled", "tpm_2"]
        );
    }

    #[tokio::test]
    async fn instance_template_by_name_scans_all_pages() {
        let (provider, vpc, ..) = fake_provider();
        vpc.templates.lock().unwrap().extend([
            template("t-1", "alpha"),
            template("t-2", "beta"),
            template("t-3", "gamma"),
        ]);
        let source = Resource::new("ibm_is_instance_template", "tmpl")
            .with_read_only(true)
            .with_attribute("name", "gamma");

        let state = provider.read_instance_template(&source).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("t-3"));
        assert_eq!(state.get("keys").unwrap().string_list(), vec!["r006-key"]);
        assert_eq!(state.get("zone"), Some(&Value::from("us-south-1")));
        let nic = state
            .get("primary_network_interface")
            .unwrap()
            .as_map()
            .unwrap();
        assert_eq!(nic.get("subnet"), Some(&Value::from("0717-subnet")));
    }

    #[tokio::test]
    async fn instance_template_unknown_name_is_an_error() {
        let (provider, vpc, ..) = fake_provider();
        vpc.templates.lock().unwrap().push(template("t-1", "alpha"));
        let source = Resource::new("ibm_is_instance_template", "tmpl")
            .with_read_only(true)
            .with_attribute("name", "omega");

        let err = provider.read_instance_template(&source).await.unwrap_err();
        assert_eq!(err.message, "No instance template found with name omega");
    }

    #[tokio::test]
    async fn instance_template_by_identifier() {
        let (provider, vpc, ..) = fake_provider();
        vpc.templates.lock().unwrap().push(template("t-1", "alpha"));
        let source = Resource::new("ibm_is_instance_template", "tmpl")
            .with_read_only(true)
            .with_attribute("identifier", "t-1");

        let state = provider.read_instance_template(&source).await.unwrap();
        assert_eq!(state.get("name"), Some(&Value::from("alpha")));

        let templates = Resource::new("ibm_is_instance_templates", "all").with_read_only(true);
        let state = provider.read_instance_templates(&templates).await.unwrap();
        assert_eq!(state.get("templates").unwrap().as_list().unwrap().len(), 1);
    }
}
