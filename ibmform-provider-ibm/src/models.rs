//! Wire models for the IBM Cloud VPC, Global Tagging and CIS APIs
//!
//! Only the fields the provider reads or writes are modelled. Unknown
//! fields are ignored on deserialization.

use serde::{Deserialize, Serialize};

/// Reference to another VPC object as returned by the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reference {
    pub id: Option<String>,
    pub name: Option<String>,
    pub crn: Option<String>,
    pub href: Option<String>,
}

/// Identity used in request bodies: either `{ "id": .. }` or `{ "name": .. }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Identity {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }
}

// =============================================================================
// Bare metal servers
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BareMetalServer {
    pub id: String,
    pub name: String,
    pub crn: String,
    pub href: String,
    pub status: String,
    pub status_reasons: Vec<StatusReason>,
    pub bandwidth: Option<i64>,
    pub memory: Option<i64>,
    pub cpu: Option<Cpu>,
    pub profile: Reference,
    pub zone: Reference,
    pub vpc: Option<Reference>,
    pub resource_group: Option<Reference>,
    pub boot_target: Option<Reference>,
    pub enable_secure_boot: Option<bool>,
    pub trusted_platform_module: Option<TrustedPlatformModule>,
    pub primary_network_interface: Option<NetworkInterfaceReference>,
    pub network_interfaces: Vec<NetworkInterfaceReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusReason {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cpu {
    pub architecture: Option<String>,
    pub core_count: Option<i64>,
    pub socket_count: Option<i64>,
    pub threads_per_core: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustedPlatformModule {
    pub enabled: Option<bool>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkInterfaceReference {
    pub id: Option<String>,
    pub name: Option<String>,
    pub primary_ip: Option<ReservedIp>,
    pub subnet: Option<Reference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservedIp {
    pub address: Option<String>,
}

/// Body of `POST /bare_metal_servers`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BareMetalServerPrototype {
    pub name: String,
    pub profile: Identity,
    pub zone: Identity,
    pub initialization: Initialization,
    pub primary_network_interface: NetworkInterfacePrototype,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<NetworkInterfacePrototype>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<Identity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Initialization {
    pub image: Identity,
    pub keys: Vec<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkInterfacePrototype {
    pub subnet: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_ip_spoofing: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<AddressIdentity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<Identity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressIdentity {
    pub address: String,
}

/// Body of `PATCH /bare_metal_servers/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BareMetalServerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Kind of stop requested from the VPC API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopType {
    /// Graceful shutdown through the operating system
    Soft,
    /// Immediate power off
    Hard,
}

// =============================================================================
// Bare metal server profiles
// =============================================================================

/// Profile property as returned by the API: `{ "type": "fixed", "value": .. }`,
/// `{ "type": "enum", "values": [..] }` or a range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileField {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: Option<serde_json::Value>,
    pub values: Vec<serde_json::Value>,
    #[serde(rename = "default")]
    pub default_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDisk {
    pub quantity: ProfileField,
    pub size: ProfileField,
    pub supported_interface_types: ProfileField,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BareMetalServerProfile {
    pub name: String,
    pub href: String,
    pub family: Option<String>,
    pub resource_type: Option<String>,
    pub bandwidth: ProfileField,
    pub cpu_architecture: ProfileField,
    pub cpu_core_count: ProfileField,
    pub cpu_socket_count: ProfileField,
    pub memory: ProfileField,
    pub os_architecture: ProfileField,
    pub disks: Vec<ProfileDisk>,
    pub supported_image_flags: Vec<String>,
    pub supported_trusted_platform_module_modes: ProfileField,
}

// =============================================================================
// Instance templates
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceTemplate {
    pub id: String,
    pub name: String,
    pub href: String,
    pub crn: String,
    pub user_data: Option<String>,
    pub keys: Vec<Reference>,
    pub profile: Option<Reference>,
    pub vpc: Option<Reference>,
    pub zone: Option<Reference>,
    pub image: Option<Reference>,
    pub resource_group: Option<Reference>,
    pub primary_network_interface: Option<TemplateNetworkInterface>,
    pub network_interfaces: Vec<TemplateNetworkInterface>,
    pub volume_attachments: Vec<TemplateVolumeAttachment>,
    pub boot_volume_attachment: Option<TemplateVolumeAttachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateNetworkInterface {
    pub name: Option<String>,
    pub primary_ipv4_address: Option<String>,
    pub subnet: Option<Reference>,
    pub security_groups: Vec<Reference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateVolumeAttachment {
    pub name: Option<String>,
    pub delete_volume_on_instance_delete: Option<bool>,
    pub volume: Option<TemplateVolume>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateVolume {
    pub name: Option<String>,
    pub capacity: Option<i64>,
    pub profile: Option<Reference>,
}

// =============================================================================
// Collections
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageLink {
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BareMetalServerCollection {
    pub bare_metal_servers: Vec<BareMetalServer>,
    pub next: Option<PageLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BareMetalServerProfileCollection {
    pub profiles: Vec<BareMetalServerProfile>,
    pub next: Option<PageLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InstanceTemplateCollection {
    pub templates: Vec<InstanceTemplate>,
    pub next: Option<PageLink>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `start` token of the next page, if any
    pub next_start: Option<String>,
}

// =============================================================================
// Global Tagging
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TagList {
    pub items: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagResource {
    pub resource_id: String,
}

/// Body of `POST /v3/tags/attach` and `/v3/tags/detach`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagOperation {
    pub resources: Vec<TagResource>,
    pub tag_names: Vec<String>,
}

// =============================================================================
// CIS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WafRule {
    pub id: String,
    pub description: String,
    pub priority: String,
    pub group: Option<WafRuleGroup>,
    pub package_id: String,
    pub allowed_modes: Vec<String>,
    pub mode: String,
    pub default_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WafRuleGroup {
    pub id: String,
    pub name: String,
}

/// Envelope every CIS response is wrapped in
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CisEnvelope<T> {
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<CisMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CisMessage {
    pub code: i64,
    pub message: String,
}
