//! VPC schemas: bare metal servers, bare metal server profiles and
//! instance templates

use ibmform_core::resource::Value;
use ibmform_core::schema::{
    AttributeSchema, AttributeType, ResourceSchema, types, validate_regexp_len,
};
use regex::Regex;

const NAME_PATTERN: &str = r"^([a-z]|[a-z][-a-z0-9]*[a-z0-9])$";
const TAG_PATTERN: &str = r"^[A-Za-z0-9:_ .-]+$";

fn check_pattern(value: &Value, pattern: &str, min: usize, max: usize) -> Result<(), String> {
    let re = Regex::new(pattern).map_err(|e| format!("Invalid pattern {}: {}", pattern, e))?;
    validate_regexp_len(value, &re, min, max)
}

/// VPC resource name: lowercase, starts with a letter, 1 to 63 characters
pub fn vpc_name() -> AttributeType {
    AttributeType::Custom {
        name: "VpcName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| check_pattern(value, NAME_PATTERN, 1, 63),
    }
}

/// User tag: 1 to 128 characters from `[A-Za-z0-9:_ .-]`
pub fn tag() -> AttributeType {
    AttributeType::Custom {
        name: "Tag".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| check_pattern(value, TAG_PATTERN, 1, 128),
    }
}

fn network_interface() -> AttributeType {
    AttributeType::Block(vec![
        AttributeSchema::new("subnet", types::non_empty_string())
            .required()
            .with_description("Subnet the interface attaches to"),
        AttributeSchema::new("name", AttributeType::String),
        AttributeSchema::new("allow_ip_spoofing", AttributeType::Bool)
            .with_default(Value::Bool(false)),
        AttributeSchema::new("ips", types::string_list()),
        AttributeSchema::new("security_groups", types::string_list()),
    ])
}

fn status_reason() -> AttributeType {
    AttributeType::Block(vec![
        AttributeSchema::new("code", AttributeType::String),
        AttributeSchema::new("message", AttributeType::String),
    ])
}

pub fn bare_metal_server() -> ResourceSchema {
    ResourceSchema::new("ibm_is_bare_metal_server")
        .with_description("IBM Cloud VPC bare metal server")
        .attribute(
            AttributeSchema::new("name", vpc_name())
                .required()
                .with_description("Bare metal server name"),
        )
        .attribute(
            AttributeSchema::new("profile", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("image", types::non_empty_string())
                .required()
                .force_new()
                .with_description("Image id"),
        )
        .attribute(
            AttributeSchema::new("zone", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("keys", types::string_list())
                .required()
                .with_description("SSH key ids"),
        )
        .attribute(AttributeSchema::new("primary_network_interface", network_interface()).required())
        .attribute(AttributeSchema::new(
            "network_interfaces",
            AttributeType::List(Box::new(network_interface())),
        ))
        .attribute(AttributeSchema::new("user_data", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("vpc", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("resource_group", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("tags", AttributeType::List(Box::new(tag()))).optional_computed(),
        )
        .attribute(
            AttributeSchema::new("force_recovery_time", types::positive_int()).with_description(
                "Minutes to wait for a graceful stop before forcing a hard stop",
            ),
        )
        .attribute(AttributeSchema::new("bandwidth", AttributeType::Int).computed())
        .attribute(AttributeSchema::new("memory", AttributeType::Int).computed())
        .attribute(
            AttributeSchema::new(
                "cpu",
                AttributeType::Block(vec![
                    AttributeSchema::new("architecture", AttributeType::String),
                    AttributeSchema::new("core_count", AttributeType::Int),
                    AttributeSchema::new("socket_count", AttributeType::Int),
                    AttributeSchema::new("threads_per_core", AttributeType::Int),
                ]),
            )
            .computed(),
        )
        .attribute(AttributeSchema::new("crn", AttributeType::String).computed())
        .attribute(AttributeSchema::new("href", AttributeType::String).computed())
        .attribute(AttributeSchema::new("status", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("status_reasons", AttributeType::List(Box::new(status_reason())))
                .computed(),
        )
        .attribute(AttributeSchema::new("boot_target", AttributeType::String).computed())
        .attribute(AttributeSchema::new("enable_secure_boot", AttributeType::Bool).computed())
        .attribute(
            AttributeSchema::new("trusted_platform_module", AttributeType::Bool).computed(),
        )
}

/// Single server lookup by id
pub fn bare_metal_server_data_source() -> ResourceSchema {
    let mut schema = bare_metal_server();
    for attr in schema.attributes.values_mut() {
        *attr = AttributeSchema {
            required: false,
            optional: false,
            computed: true,
            force_new: false,
            ..attr.clone()
        };
    }
    schema.attribute(
        AttributeSchema::new("identifier", types::non_empty_string())
            .required()
            .with_description("Bare metal server id"),
    )
}

pub fn bare_metal_servers_data_source() -> ResourceSchema {
    ResourceSchema::new("ibm_is_bare_metal_servers").attribute(
        AttributeSchema::new(
            "servers",
            AttributeType::List(Box::new(AttributeType::Map(Box::new(AttributeType::String)))),
        )
        .computed(),
    )
}

fn profile_field() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::String))
}

pub fn bare_metal_server_profile_data_source() -> ResourceSchema {
    let computed = |name: &str, t: AttributeType| AttributeSchema::new(name, t).computed();
    ResourceSchema::new("ibm_is_bare_metal_server_profile")
        .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
        .attribute(computed("href", AttributeType::String))
        .attribute(computed("family", AttributeType::String))
        .attribute(computed("resource_type", AttributeType::String))
        .attribute(computed("bandwidth", profile_field()))
        .attribute(computed("cpu_architecture", profile_field()))
        .attribute(computed("cpu_core_count", profile_field()))
        .attribute(computed("cpu_socket_count", profile_field()))
        .attribute(computed("memory", profile_field()))
        .attribute(computed("os_architecture", profile_field()))
        .attribute(computed(
            "disks",
            AttributeType::List(Box::new(AttributeType::Map(Box::new(profile_field())))),
        ))
        .attribute(computed("supported_image_flags", types::string_list()))
        .attribute(computed(
            "supported_trusted_platform_module_modes",
            types::string_list(),
        ))
}

pub fn bare_metal_server_profiles_data_source() -> ResourceSchema {
    ResourceSchema::new("ibm_is_bare_metal_server_profiles").attribute(
        AttributeSchema::new(
            "profiles",
            AttributeType::List(Box::new(AttributeType::Map(Box::new(AttributeType::String)))),
        )
        .computed(),
    )
}

pub fn instance_template_data_source() -> ResourceSchema {
    let computed = |name: &str, t: AttributeType| AttributeSchema::new(name, t).computed();
    let any_map = || AttributeType::Map(Box::new(AttributeType::String));
    ResourceSchema::new("ibm_is_instance_template")
        .attribute(AttributeSchema::new("identifier", vpc_name_or_id()))
        .attribute(AttributeSchema::new("name", AttributeType::String).optional_computed())
        .with_exactly_one_of(&["identifier", "name"])
        .attribute(computed("href", AttributeType::String))
        .attribute(computed("crn", AttributeType::String))
        .attribute(computed("user_data", AttributeType::String))
        .attribute(computed("keys", types::string_list()))
        .attribute(computed("profile", AttributeType::String))
        .attribute(computed("vpc", AttributeType::String))
        .attribute(computed("zone", AttributeType::String))
        .attribute(computed("image", AttributeType::String))
        .attribute(computed("resource_group", AttributeType::String))
        .attribute(computed("primary_network_interface", any_map()))
        .attribute(computed("network_interfaces", AttributeType::List(Box::new(any_map()))))
        .attribute(computed("volume_attachments", AttributeType::List(Box::new(any_map()))))
        .attribute(computed("boot_volume_attachment", any_map()))
}

pub fn instance_templates_data_source() -> ResourceSchema {
    ResourceSchema::new("ibm_is_instance_templates").attribute(
        AttributeSchema::new(
            "templates",
            AttributeType::List(Box::new(AttributeType::Map(Box::new(AttributeType::String)))),
        )
        .computed(),
    )
}

/// Template ids are lowercase alphanumerics with dashes
fn vpc_name_or_id() -> AttributeType {
    AttributeType::Custom {
        name: "TemplateId".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s)
                if !s.is_empty()
                    && s.chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') =>
            {
                Ok(())
            }
            _ => Err("Identifier must be lowercase letters, digits and dashes".to_string()),
        },
    }
}
