//! Bare metal server handlers
//!
//! Create, read, update, stop and delete of `ibm_is_bare_metal_server`.
//! Every asynchronous transition (provisioning, stopping, deletion) is
//! awaited through the core waiter.

use std::collections::HashMap;
use std::time::Duration;

use ibmform_core::differ::attribute_change;
use ibmform_core::provider::{ProviderError, ProviderResult};
use ibmform_core::resource::{Resource, ResourceId, State, Value};
use ibmform_core::waiter::{
    ABSENT, Escalation, Observation, WaitError, WaitSpec, wait_for_state,
    wait_for_state_with_escalation,
};
use log::{info, warn};
use tokio::time::Instant;

use crate::client::VpcApi;
use crate::models::{
    AddressIdentity, BareMetalServer, BareMetalServerPatch, BareMetalServerPrototype, Identity,
    Initialization, NetworkInterfacePrototype, NetworkInterfaceReference, Reference, StopType,
};
use crate::provider::{IbmProvider, api_error, missing_attribute};
use crate::resources::BARE_METAL_SERVER_TIMEOUT;
use crate::utils::{merge_tags, tag_changes};

const STATUS_RUNNING: &str = "running";
const STATUS_STOPPED: &str = "stopped";
const STATUS_FAILED: &str = "failed";

/// Provisioning statuses a new server passes through before `running`
const CREATE_PENDING: &[&str] = &["pending", "starting", "restarting"];
/// Statuses seen between a stop request and `stopped`
const STOP_PENDING: &[&str] = &["running", "pending", "stopping"];
const DELETE_PENDING: &[&str] = &["deleting"];

/// Fetch one server as a waiter observation; 404 means gone
async fn observe(vpc: &dyn VpcApi, id: &str) -> ProviderResult<Observation<BareMetalServer>> {
    match vpc.get_bare_metal_server(id).await {
        Ok(server) => {
            let status = server.status.clone();
            Ok(Observation::found(server, status))
        }
        Err(e) if e.is_not_found() => Ok(Observation::Gone),
        Err(e) => Err(api_error(
            format!("Failed to read bare metal server {}", id),
            e,
        )),
    }
}

fn reference_id(reference: &Option<Reference>) -> Option<String> {
    reference.as_ref().and_then(|r| r.id.clone())
}

fn network_interface_attributes(nic: &NetworkInterfaceReference) -> Value {
    let mut map = HashMap::new();
    if let Some(id) = &nic.id {
        map.insert("id".to_string(), Value::from(id.as_str()));
    }
    if let Some(name) = &nic.name {
        map.insert("name".to_string(), Value::from(name.as_str()));
    }
    if let Some(subnet) = nic.subnet.as_ref().and_then(|s| s.id.as_deref()) {
        map.insert("subnet".to_string(), Value::from(subnet));
    }
    if let Some(address) = nic.primary_ip.as_ref().and_then(|ip| ip.address.as_deref()) {
        map.insert("primary_ip".to_string(), Value::from(address));
    }
    Value::Map(map)
}

/// Attributes observed on a server, shared by the resource and the data sources
///
/// Tags live in the tagging service and are not part of this map.
pub(crate) fn server_attributes(server: &BareMetalServer) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert("name".to_string(), Value::from(server.name.as_str()));
    attrs.insert("crn".to_string(), Value::from(server.crn.as_str()));
    attrs.insert("href".to_string(), Value::from(server.href.as_str()));
    attrs.insert("status".to_string(), Value::from(server.status.as_str()));
    attrs.insert(
        "status_reasons".to_string(),
        Value::List(
            server
                .status_reasons
                .iter()
                .map(|reason| {
                    let mut map = HashMap::new();
                    map.insert("code".to_string(), Value::from(reason.code.as_str()));
                    map.insert("message".to_string(), Value::from(reason.message.as_str()));
                    Value::Map(map)
                })
                .collect(),
        ),
    );

    if let Some(profile) = &server.profile.name {
        attrs.insert("profile".to_string(), Value::from(profile.as_str()));
    }
    if let Some(zone) = &server.zone.name {
        attrs.insert("zone".to_string(), Value::from(zone.as_str()));
    }
    if let Some(vpc) = reference_id(&server.vpc) {
        attrs.insert("vpc".to_string(), Value::from(vpc));
    }
    if let Some(group) = reference_id(&server.resource_group) {
        attrs.insert("resource_group".to_string(), Value::from(group));
    }
    if let Some(target) = reference_id(&server.boot_target) {
        attrs.insert("boot_target".to_string(), Value::from(target));
    }
    if let Some(bandwidth) = server.bandwidth {
        attrs.insert("bandwidth".to_string(), Value::Int(bandwidth));
    }
    if let Some(memory) = server.memory {
        attrs.insert("memory".to_string(), Value::Int(memory));
    }
    if let Some(cpu) = &server.cpu {
        let mut map = HashMap::new();
        if let Some(arch) = &cpu.architecture {
            map.insert("architecture".to_string(), Value::from(arch.as_str()));
        }
        for (key, count) in [
            ("core_count", cpu.core_count),
            ("socket_count", cpu.socket_count),
            ("threads_per_core", cpu.threads_per_core),
        ] {
            if let Some(n) = count {
                map.insert(key.to_string(), Value::Int(n));
            }
        }
        attrs.insert("cpu".to_string(), Value::Map(map));
    }
    if let Some(secure_boot) = server.enable_secure_boot {
        attrs.insert("enable_secure_boot".to_string(), Value::Bool(secure_boot));
    }
    if let Some(enabled) = server
        .trusted_platform_module
        .as_ref()
        .and_then(|tpm| tpm.enabled)
    {
        attrs.insert("trusted_platform_module".to_string(), Value::Bool(enabled));
    }

    let primary_id = server
        .primary_network_interface
        .as_ref()
        .and_then(|nic| nic.id.clone());
    if let Some(primary) = &server.primary_network_interface {
        attrs.insert(
            "primary_network_interface".to_string(),
            network_interface_attributes(primary),
        );
    }
    // The API lists the primary interface among all interfaces as well
    let secondary: Vec<Value> = server
        .network_interfaces
        .iter()
        .filter(|nic| nic.id.is_none() || nic.id != primary_id)
        .map(network_interface_attributes)
        .collect();
    if !secondary.is_empty() {
        attrs.insert("network_interfaces".to_string(), Value::List(secondary));
    }

    attrs
}

fn network_interface_prototype(value: &Value) -> ProviderResult<NetworkInterfacePrototype> {
    let map = value
        .as_map()
        .ok_or_else(|| ProviderError::new("Network interface must be a block"))?;
    let get_str = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    let get_list = |key: &str| map.get(key).map(Value::string_list).unwrap_or_default();

    let subnet = get_str("subnet").ok_or_else(|| missing_attribute("subnet"))?;
    Ok(NetworkInterfacePrototype {
        subnet: Identity::by_id(subnet),
        name: get_str("name").map(str::to_string),
        allow_ip_spoofing: map.get("allow_ip_spoofing").and_then(Value::as_bool),
        ips: get_list("ips")
            .into_iter()
            .map(|address| AddressIdentity { address })
            .collect(),
        security_groups: get_list("security_groups")
            .into_iter()
            .map(Identity::by_id)
            .collect(),
    })
}

fn required_str<'a>(resource: &'a Resource, key: &str) -> ProviderResult<&'a str> {
    resource.get_str(key).ok_or_else(|| missing_attribute(key))
}

/// Minutes a graceful stop may take before a hard stop is forced
fn force_recovery_time(resource: &Resource) -> Option<Duration> {
    resource
        .get_int("force_recovery_time")
        .and_then(|minutes| u64::try_from(minutes).ok())
        .filter(|minutes| *minutes > 0)
        .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
}

impl IbmProvider {
    fn wait_spec(&self, pending: &[&str], target: &[&str], timeout: Duration) -> WaitSpec {
        WaitSpec::new(pending.iter().copied(), target.iter().copied())
            .with_timeout(timeout)
            .with_delay(self.delay)
            .with_poll_interval(self.poll_interval)
    }

    /// Request body for a new server
    pub(crate) fn build_prototype(
        &self,
        resource: &Resource,
    ) -> ProviderResult<BareMetalServerPrototype> {
        let primary = resource
            .get("primary_network_interface")
            .ok_or_else(|| missing_attribute("primary_network_interface"))?;
        let network_interfaces = resource
            .get("network_interfaces")
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .map(network_interface_prototype)
            .collect::<ProviderResult<Vec<_>>>()?;

        Ok(BareMetalServerPrototype {
            name: required_str(resource, "name")?.to_string(),
            profile: Identity::by_name(required_str(resource, "profile")?),
            zone: Identity::by_name(required_str(resource, "zone")?),
            initialization: Initialization {
                image: Identity::by_id(required_str(resource, "image")?),
                keys: resource
                    .get_strings("keys")
                    .into_iter()
                    .map(Identity::by_id)
                    .collect(),
                user_data: resource.get_str("user_data").map(str::to_string),
            },
            primary_network_interface: network_interface_prototype(primary)?,
            network_interfaces,
            vpc: resource.get_str("vpc").map(Identity::by_id),
            resource_group: resource
                .get_str("resource_group")
                .or(self.resource_group.as_deref())
                .map(Identity::by_id),
        })
    }

    async fn server_tags(&self, server: &BareMetalServer) -> Vec<String> {
        if server.crn.is_empty() {
            return Vec::new();
        }
        match self.tagging.get_tags(&server.crn).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(
                    "Failed to fetch tags of bare metal server {}: {}",
                    server.id, e
                );
                Vec::new()
            }
        }
    }

    pub(crate) async fn create_bare_metal_server(
        &self,
        resource: Resource,
    ) -> ProviderResult<State> {
        let prototype = self.build_prototype(&resource)?;
        let created = self
            .vpc
            .create_bare_metal_server(&prototype)
            .await
            .map_err(|e| api_error("Failed to create bare metal server", e))?;
        info!(
            "Created bare metal server {} ({})",
            prototype.name, created.id
        );

        let timeout = self
            .timeouts(&resource)
            .create
            .unwrap_or(BARE_METAL_SERVER_TIMEOUT);
        let spec = self
            .wait_spec(CREATE_PENDING, &[STATUS_RUNNING], timeout)
            .with_failure([STATUS_FAILED]);
        let vpc = self.vpc.as_ref();
        let id = created.id.as_str();
        let outcome = wait_for_state(&format!("bare metal server {}", id), &spec, move || async move {
            Ok(match observe(vpc, id).await? {
                Observation::Found { snapshot, status } => {
                    let status = match status.as_str() {
                        STATUS_RUNNING | STATUS_FAILED => status,
                        _ => "pending".to_string(),
                    };
                    Observation::found(snapshot, status)
                }
                Observation::Gone => Observation::Gone,
            })
        })
        .await?;

        let crn = outcome
            .snapshot
            .map(|s| s.crn)
            .filter(|crn| !crn.is_empty())
            .unwrap_or_else(|| created.crn.clone());
        let tags = merge_tags(&resource.get_strings("tags"), &self.env_tags);
        if !tags.is_empty()
            && let Err(e) = self.tagging.attach_tags(&crn, &tags).await
        {
            warn!(
                "Failed to attach tags to bare metal server {}: {}",
                created.id, e
            );
        }

        self.read_bare_metal_server(&resource.id, &created.id).await
    }

    pub(crate) async fn read_bare_metal_server(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let server = match self.vpc.get_bare_metal_server(identifier).await {
            Ok(server) => server,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => {
                return Err(api_error(
                    format!("Failed to read bare metal server {}", identifier),
                    e,
                ));
            }
        };

        let mut attributes = server_attributes(&server);
        let tags = self.server_tags(&server).await;
        attributes.insert("tags".to_string(), Value::from_strings(tags));

        Ok(State::existing(id.clone(), attributes).with_identifier(server.id))
    }

    pub(crate) async fn bare_metal_server_exists(&self, identifier: &str) -> ProviderResult<bool> {
        match self.vpc.get_bare_metal_server(identifier).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(api_error(
                format!("Failed to read bare metal server {}", identifier),
                e,
            )),
        }
    }

    pub(crate) async fn update_bare_metal_server(
        &self,
        identifier: String,
        from: State,
        to: Resource,
    ) -> ProviderResult<State> {
        if let Some((_, Some(name))) = attribute_change(&from, &to, "name") {
            let name = name
                .as_str()
                .ok_or_else(|| ProviderError::new("Attribute 'name' must be a string"))?;
            let patch = BareMetalServerPatch {
                name: Some(name.to_string()),
            };
            self.vpc
                .update_bare_metal_server(&identifier, &patch)
                .await
                .map_err(|e| {
                    api_error(format!("Failed to rename bare metal server {}", identifier), e)
                })?;
            info!("Renamed bare metal server {} to {}", identifier, name);
        }

        if attribute_change(&from, &to, "tags").is_some() {
            let crn = match from.get("crn").and_then(Value::as_str) {
                Some(crn) if !crn.is_empty() => crn.to_string(),
                _ => {
                    self.vpc
                        .get_bare_metal_server(&identifier)
                        .await
                        .map_err(|e| {
                            api_error(
                                format!("Failed to read bare metal server {}", identifier),
                                e,
                            )
                        })?
                        .crn
                }
            };
            let old = from.get("tags").map(Value::string_list).unwrap_or_default();
            let new = merge_tags(&to.get_strings("tags"), &self.env_tags);
            let (removed, added) = tag_changes(&old, &new);

            self.tagging.detach_tags(&crn, &removed).await.map_err(|e| {
                api_error(
                    format!("Failed to detach tags from bare metal server {}", identifier),
                    e,
                )
            })?;
            self.tagging.attach_tags(&crn, &added).await.map_err(|e| {
                api_error(
                    format!("Failed to attach tags to bare metal server {}", identifier),
                    e,
                )
            })?;
        }

        self.read_bare_metal_server(&to.id, &identifier).await
    }

    /// Soft stop, then wait for `stopped`
    ///
    /// With `force_after` set, a hard stop is issued when the server is still
    /// not stopped after that long.
    async fn stop_and_wait(
        &self,
        identifier: &str,
        timeout: Duration,
        force_after: Option<Duration>,
    ) -> ProviderResult<()> {
        let vpc = self.vpc.as_ref();
        vpc.stop_bare_metal_server(identifier, StopType::Soft)
            .await
            .map_err(|e| {
                api_error(format!("Failed to stop bare metal server {}", identifier), e)
            })?;
        info!("Requested soft stop of bare metal server {}", identifier);

        let handle = format!("bare metal server {}", identifier);
        let spec = self
            .wait_spec(STOP_PENDING, &[STATUS_STOPPED], timeout)
            .with_failure([STATUS_FAILED]);
        let refresh = move || observe(vpc, identifier);

        match force_after {
            Some(after) => {
                let force = move || async move {
                    warn!(
                        "Bare metal server {} did not stop within {:?}, forcing a hard stop",
                        identifier, after
                    );
                    vpc.stop_bare_metal_server(identifier, StopType::Hard)
                        .await
                        .map_err(|e| {
                            api_error(
                                format!("Failed to hard stop bare metal server {}", identifier),
                                e,
                            )
                        })
                };
                let escalation = Escalation::new(after, force).with_policy(self.escalation_policy);
                wait_for_state_with_escalation(&handle, &spec, refresh, escalation).await?;
            }
            None => {
                wait_for_state(&handle, &spec, refresh).await?;
            }
        }
        Ok(())
    }

    /// Stop a running server and return its new state
    pub async fn stop_bare_metal_server(
        &self,
        resource: &Resource,
        identifier: &str,
    ) -> ProviderResult<State> {
        let server = self
            .vpc
            .get_bare_metal_server(identifier)
            .await
            .map_err(|e| api_error(format!("Failed to read bare metal server {}", identifier), e))
            .map_err(|e| e.for_resource(resource.id.clone()))?;

        if server.status == STATUS_STOPPED {
            info!("Bare metal server {} is already stopped", identifier);
        } else {
            let timeout = self
                .timeouts(resource)
                .delete
                .unwrap_or(BARE_METAL_SERVER_TIMEOUT);
            self.stop_and_wait(identifier, timeout, force_recovery_time(resource))
                .await
                .map_err(|e| e.for_resource(resource.id.clone()))?;
        }

        self.read_bare_metal_server(&resource.id, identifier).await
    }

    pub(crate) async fn delete_bare_metal_server(
        &self,
        resource: Resource,
        identifier: String,
    ) -> ProviderResult<()> {
        // Stop and deletion share one delete timeout
        let timeout = self
            .timeouts(&resource)
            .delete
            .unwrap_or(BARE_METAL_SERVER_TIMEOUT);
        let deadline = Instant::now().checked_add(timeout);
        let remaining =
            || deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));

        let server = match self.vpc.get_bare_metal_server(&identifier).await {
            Ok(server) => server,
            Err(e) if e.is_not_found() => {
                info!("Bare metal server {} is already gone", identifier);
                return Ok(());
            }
            Err(e) => {
                return Err(api_error(
                    format!("Failed to read bare metal server {}", identifier),
                    e,
                ));
            }
        };

        if server.status == STATUS_RUNNING {
            self.stop_and_wait(&identifier, remaining(), force_recovery_time(&resource))
                .await?;
        }

        match self.vpc.delete_bare_metal_server(&identifier).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                return Err(api_error(
                    format!("Failed to delete bare metal server {}", identifier),
                    e,
                ));
            }
        }

        let handle = format!("bare metal server {}", identifier);
        let remaining = remaining();
        if remaining.is_zero() {
            return Err(WaitError::Timeout {
                handle,
                timeout,
                target: vec![ABSENT.to_string()],
                last_status: None,
            }
            .into());
        }

        let spec = self.wait_spec(DELETE_PENDING, &[ABSENT], remaining);
        let vpc = self.vpc.as_ref();
        let id = identifier.as_str();
        wait_for_state(&handle, &spec, move || async move {
            Ok(match observe(vpc, id).await? {
                Observation::Found { snapshot, .. } => Observation::found(snapshot, "deleting"),
                Observation::Gone => Observation::Gone,
            })
        })
        .await?;

        info!("Deleted bare metal server {}", identifier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeCis, FakeTagging, FakeVpc, fake_provider};
    use std::sync::Arc;

    fn nic(subnet: &str) -> Value {
        let mut map = HashMap::new();
        map.insert("subnet".to_string(), Value::from(subnet));
        map.insert("allow_ip_spoofing".to_string(), Value::Bool(false));
        Value::Map(map)
    }

    fn server_resource() -> Resource {
        Resource::new("ibm_is_bare_metal_server", "web")
            .with_attribute("name", "bms-1")
            .with_attribute("profile", "bx2-metal-192x768")
            .with_attribute("image", "r006-image")
            .with_attribute("zone", "us-south-3")
            .with_attribute("keys", Value::from_strings(["r006-key"]))
            .with_attribute("primary_network_interface", nic("0717-subnet"))
    }

    #[test]
    fn prototype_from_attributes() {
        let (provider, ..) = fake_provider();
        let provider = provider.with_resource_group(Some("rg-default".to_string()));
        let resource = server_resource().with_attribute(
            "network_interfaces",
            Value::List(vec![nic("0717-subnet-2")]),
        );

        let prototype = provider.build_prototype(&resource).unwrap();
        assert_eq!(prototype.name, "bms-1");
        assert_eq!(prototype.profile, Identity::by_name("bx2-metal-192x768"));
        assert_eq!(prototype.initialization.keys, vec![Identity::by_id("r006-key")]);
        assert_eq!(
            prototype.primary_network_interface.subnet,
            Identity::by_id("0717-subnet")
        );
        assert_eq!(prototype.network_interfaces.len(), 1);
        assert_eq!(prototype.resource_group, Some(Identity::by_id("rg-default")));
        assert_eq!(prototype.initialization.user_data, None);
    }

    #[test]
    fn prototype_requires_subnet() {
        let (provider, ..) = fake_provider();
        let resource =
            server_resource().with_attribute("primary_network_interface", Value::Map(HashMap::new()));
        let err = provider.build_prototype(&resource).unwrap_err();
        assert!(err.message.contains("subnet"));
    }

    #[test]
    fn attributes_skip_primary_in_interface_list() {
        let primary = NetworkInterfaceReference {
            id: Some("nic-1".to_string()),
            name: Some("eth0".to_string()),
            ..Default::default()
        };
        let secondary = NetworkInterfaceReference {
            id: Some("nic-2".to_string()),
            ..Default::default()
        };
        let server = BareMetalServer {
            id: "bms-1".to_string(),
            status: "running".to_string(),
            primary_network_interface: Some(primary.clone()),
            network_interfaces: vec![primary, secondary],
            ..Default::default()
        };

        let attrs = server_attributes(&server);
        let list = attrs["network_interfaces"].as_list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(
            list[0].as_map().unwrap().get("id"),
            Some(&Value::from("nic-2"))
        );
        assert_eq!(attrs["status"], Value::from("running"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_for_running_and_merges_env_tags() {
        let (provider, vpc, tagging, _) = fake_provider();
        let provider = provider.with_env_tags(vec!["env:prod".to_string()]);
        vpc.script(["pending", "starting", "running"]);

        let resource = server_resource().with_attribute("tags", Value::from_strings(["web"]));
        let state = provider.create_bare_metal_server(resource).await.unwrap();

        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("bms-1"));
        assert_eq!(state.get("status"), Some(&Value::from("running")));
        assert_eq!(
            tagging.tags_of("crn:bms-1"),
            vec!["env:prod".to_string(), "web".to_string()]
        );
        assert_eq!(
            state.get("tags").unwrap().string_list(),
            vec!["env:prod", "web"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn create_survives_tag_failure() {
        let vpc = Arc::new(FakeVpc::default());
        let tagging = Arc::new(FakeTagging::failing());
        let provider = IbmProvider::with_clients(
            vpc.clone(),
            tagging.clone(),
            Arc::new(FakeCis::default()),
        )
        .with_polling(Duration::from_secs(1), Duration::from_secs(1));
        vpc.script(["running"]);

        let resource = server_resource().with_attribute("tags", Value::from_strings(["web"]));
        let state = provider.create_bare_metal_server(resource).await.unwrap();

        assert!(state.exists);
        assert!(state.get("tags").unwrap().string_list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn create_fails_on_failed_status() {
        let (provider, vpc, ..) = fake_provider();
        vpc.script(["starting", "failed"]);

        let err = provider
            .create_bare_metal_server(server_resource())
            .await
            .unwrap_err();
        assert!(err.message.contains("failure state 'failed'"), "{}", err);
    }

    #[tokio::test]
    async fn read_absent_server_is_not_found() {
        let (provider, ..) = fake_provider();
        let id = ResourceId::new("ibm_is_bare_metal_server", "web");
        let state = provider.read_bare_metal_server(&id, "missing").await.unwrap();
        assert!(!state.exists);
        assert!(!provider.bare_metal_server_exists("missing").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn update_renames_and_retags() {
        let (provider, vpc, tagging, _) = fake_provider();
        vpc.insert_server("bms-1", "running");
        tagging.set_tags("crn:bms-1", &["old", "keep"]);
        let id = ResourceId::new("ibm_is_bare_metal_server", "web");
        let from = provider.read_bare_metal_server(&id, "bms-1").await.unwrap();

        let to = server_resource()
            .with_attribute("name", "bms-2")
            .with_attribute("tags", Value::from_strings(["keep", "new"]));
        let state = provider
            .update_bare_metal_server("bms-1".to_string(), from, to)
            .await
            .unwrap();

        assert_eq!(state.get("name"), Some(&Value::from("bms-2")));
        assert_eq!(
            tagging.tags_of("crn:bms-1"),
            vec!["keep".to_string(), "new".to_string()]
        );
        assert!(vpc.calls().contains(&"update bms-1 bms-2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_absent_server_is_noop() {
        let (provider, vpc, ..) = fake_provider();
        provider
            .delete_bare_metal_server(server_resource(), "missing".to_string())
            .await
            .unwrap();
        assert_eq!(vpc.calls(), vec!["get missing".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_running_server_stops_first() {
        let (provider, vpc, ..) = fake_provider();
        vpc.insert_server("bms-1", "running");
        vpc.script(["running", "stopping", "stopped"]);

        provider
            .delete_bare_metal_server(server_resource(), "bms-1".to_string())
            .await
            .unwrap();

        let calls = vpc.calls();
        let stop = calls.iter().position(|c| c == "stop bms-1 soft").unwrap();
        let delete = calls.iter().position(|c| c == "delete bms-1").unwrap();
        assert!(stop < delete);
        assert!(!calls.contains(&"stop bms-1 hard".to_string()));
        assert!(!vpc.has_server("bms-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_stopped_server_skips_stop() {
        let (provider, vpc, ..) = fake_provider();
        vpc.insert_server("bms-1", "stopped");

        provider
            .delete_bare_metal_server(server_resource(), "bms-1".to_string())
            .await
            .unwrap();
        assert!(!vpc.calls().iter().any(|c| c.starts_with("stop")));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_until_server_reads_as_gone() {
        let (provider, vpc, ..) = fake_provider();
        vpc.insert_server("bms-1", "stopped");
        vpc.script(["stopped", "deleting", "deleting"]);
        vpc.linger_after_delete("bms-1", 2);

        provider
            .delete_bare_metal_server(server_resource(), "bms-1".to_string())
            .await
            .unwrap();

        let calls = vpc.calls();
        let delete = calls.iter().position(|c| c == "delete bms-1").unwrap();
        let gets_after_delete = calls[delete + 1..]
            .iter()
            .filter(|c| *c == "get bms-1")
            .count();
        assert_eq!(gets_after_delete, 3);
        assert!(!vpc.has_server("bms-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_maps_any_remaining_status_to_deleting() {
        let (provider, vpc, ..) = fake_provider();
        vpc.insert_server("bms-1", "stopped");
        vpc.linger_after_delete("bms-1", 1);

        // "stopped" is not a delete-wait status; it still counts as deleting
        provider
            .delete_bare_metal_server(server_resource(), "bms-1".to_string())
            .await
            .unwrap();
        assert!(!vpc.has_server("bms-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_stop_and_wait_share_the_delete_timeout() {
        let (provider, vpc, ..) = fake_provider();
        vpc.insert_server("bms-1", "running");
        vpc.script(["running"]);
        vpc.script(["stopping"; 20]);
        vpc.script(["stopped"]);
        vpc.linger_after_delete("bms-1", 1000);

        let resource = server_resource().with_timeouts(
            ibmform_core::resource::Timeouts::default().with_delete(Duration::from_secs(30)),
        );
        let start = Instant::now();
        let err = provider
            .delete_bare_metal_server(resource, "bms-1".to_string())
            .await
            .unwrap_err();

        assert!(err.message.contains("timeout"), "{}", err);
        assert!(vpc.calls().contains(&"delete bms-1".to_string()));
        assert!(start.elapsed() < Duration::from_secs(31));
    }

    #[test]
    fn recovery_time_saturates_instead_of_overflowing() {
        let resource = server_resource().with_attribute("force_recovery_time", Value::Int(2));
        assert_eq!(force_recovery_time(&resource), Some(Duration::from_secs(120)));

        let resource =
            server_resource().with_attribute("force_recovery_time", Value::Int(i64::MAX / 2));
        assert_eq!(
            force_recovery_time(&resource),
            Some(Duration::from_secs(u64::MAX))
        );

        let resource = server_resource().with_attribute("force_recovery_time", Value::Int(-5));
        assert_eq!(force_recovery_time(&resource), None);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_recovery_time_stops_without_escalating() {
        let (provider, vpc, ..) = fake_provider();
        vpc.insert_server("bms-1", "running");
        vpc.script(["running", "stopping", "stopped"]);

        let resource =
            server_resource().with_attribute("force_recovery_time", Value::Int(i64::MAX / 2));
        let state = provider
            .stop_bare_metal_server(&resource, "bms-1")
            .await
            .unwrap();

        assert_eq!(state.get("status"), Some(&Value::from("stopped")));
        assert!(!vpc.calls().contains(&"stop bms-1 hard".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_stop_escalates_to_hard_stop_once() {
        let (provider, vpc, ..) = fake_provider();
        let provider = provider.with_polling(Duration::from_secs(10), Duration::from_secs(10));
        vpc.insert_server("bms-1", "running");
        vpc.script(["running"]);

        let resource = server_resource().with_attribute("force_recovery_time", Value::Int(1));
        let state = provider
            .stop_bare_metal_server(&resource, "bms-1")
            .await
            .unwrap();

        assert_eq!(state.get("status"), Some(&Value::from("stopped")));
        let hard_stops = vpc
            .calls()
            .iter()
            .filter(|c| *c == "stop bms-1 hard")
            .count();
        assert_eq!(hard_stops, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_recovery_time_times_out() {
        let (provider, vpc, ..) = fake_provider();
        vpc.insert_server("bms-1", "running");

        let resource = server_resource().with_timeouts(
            ibmform_core::resource::Timeouts::default().with_delete(Duration::from_secs(30)),
        );
        let err = provider
            .stop_bare_metal_server(&resource, "bms-1")
            .await
            .unwrap_err();
        assert!(err.message.contains("timeout"), "{}", err);
        assert!(!vpc.calls().contains(&"stop bms-1 hard".to_string()));
    }
}
