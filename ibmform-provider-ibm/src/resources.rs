//! Resource and data source type definitions
//!
//! Each type pairs a name with its schema and default timeouts. The
//! provider dispatches operations on the same names.

use std::time::Duration;

use ibmform_core::provider::ResourceType;
use ibmform_core::resource::Timeouts;
use ibmform_core::schema::ResourceSchema;

use crate::schemas::{cis, vpc};

pub const BARE_METAL_SERVER: &str = "ibm_is_bare_metal_server";
pub const BARE_METAL_SERVERS: &str = "ibm_is_bare_metal_servers";
pub const BARE_METAL_SERVER_PROFILE: &str = "ibm_is_bare_metal_server_profile";
pub const BARE_METAL_SERVER_PROFILES: &str = "ibm_is_bare_metal_server_profiles";
pub const INSTANCE_TEMPLATE: &str = "ibm_is_instance_template";
pub const INSTANCE_TEMPLATES: &str = "ibm_is_instance_templates";
pub const CIS_WAF_RULE: &str = "ibm_cis_waf_rule";

/// Create and delete waits of a bare metal server
pub const BARE_METAL_SERVER_TIMEOUT: Duration = Duration::from_secs(10 * 60);

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:expr) => {
        define_resource_type!($name, $type_name, $schema, Timeouts::default());
    };
    ($name:ident, $type_name:expr, $schema:expr, $timeouts:expr) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema
            }
            fn default_timeouts(&self) -> Timeouts {
                $timeouts
            }
        }
    };
}

macro_rules! define_data_source_type {
    ($name:ident, $type_name:expr, $schema:expr) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema
            }
            fn is_data_source(&self) -> bool {
                true
            }
        }
    };
}

define_resource_type!(
    BareMetalServerType,
    BARE_METAL_SERVER,
    vpc::bare_metal_server(),
    Timeouts::default()
        .with_create(BARE_METAL_SERVER_TIMEOUT)
        .with_delete(BARE_METAL_SERVER_TIMEOUT)
);
define_resource_type!(CisWafRuleType, CIS_WAF_RULE, cis::waf_rule());

define_data_source_type!(
    BareMetalServerDataSource,
    BARE_METAL_SERVER,
    vpc::bare_metal_server_data_source()
);
define_data_source_type!(
    BareMetalServersDataSource,
    BARE_METAL_SERVERS,
    vpc::bare_metal_servers_data_source()
);
define_data_source_type!(
    BareMetalServerProfileDataSource,
    BARE_METAL_SERVER_PROFILE,
    vpc::bare_metal_server_profile_data_source()
);
define_data_source_type!(
    BareMetalServerProfilesDataSource,
    BARE_METAL_SERVER_PROFILES,
    vpc::bare_metal_server_profiles_data_source()
);
define_data_source_type!(
    InstanceTemplateDataSource,
    INSTANCE_TEMPLATE,
    vpc::instance_template_data_source()
);
define_data_source_type!(
    InstanceTemplatesDataSource,
    INSTANCE_TEMPLATES,
    vpc::instance_templates_data_source()
);

/// Returns all resource and data source types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(BareMetalServerType),
        Box::new(CisWafRuleType),
        Box::new(BareMetalServerDataSource),
        Box::new(BareMetalServersDataSource),
        Box::new(BareMetalServerProfileDataSource),
        Box::new(BareMetalServerProfilesDataSource),
        Box::new(InstanceTemplateDataSource),
        Box::new(InstanceTemplatesDataSource),
    ]
}

/// Look up a type by name and kind
pub fn find_type(name: &str, data_source: bool) -> Option<Box<dyn ResourceType>> {
    resource_types()
        .into_iter()
        .find(|t| t.name() == name && t.is_data_source() == data_source)
}
