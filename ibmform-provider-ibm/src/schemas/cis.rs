//! CIS (Cloud Internet Services) schemas

use ibmform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Modes a WAF rule can be set to; each rule narrows this via `allowed_modes`
pub const WAF_RULE_MODES: &[&str] = &[
    "on", "off", "default", "disable", "simulate", "block", "challenge",
];

pub fn waf_rule() -> ResourceSchema {
    ResourceSchema::new("ibm_cis_waf_rule")
        .with_description("Mode of a single rule in a CIS WAF package")
        .attribute(
            AttributeSchema::new("cis_id", types::non_empty_string())
                .required()
                .force_new()
                .with_description("CRN of the CIS instance"),
        )
        .attribute(
            AttributeSchema::new("domain_id", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("package_id", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("rule_id", types::non_empty_string())
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("mode", types::enum_of(WAF_RULE_MODES)).required())
        .attribute(AttributeSchema::new("description", AttributeType::String).computed())
        .attribute(AttributeSchema::new("priority", AttributeType::String).computed())
        .attribute(AttributeSchema::new("group", AttributeType::Map(Box::new(AttributeType::String))).computed())
        .attribute(AttributeSchema::new("allowed_modes", types::string_list()).computed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibmform_core::resource::Value;
    use std::collections::HashMap;

    fn rule(mode: &str) -> HashMap<String, Value> {
        let mut attrs = HashMap::new();
        attrs.insert("cis_id".to_string(), Value::from("crn:v1:cis"));
        attrs.insert("domain_id".to_string(), Value::from("zone-1"));
        attrs.insert("package_id".to_string(), Value::from("c504870194831cd12c3fc0284f294abb"));
        attrs.insert("rule_id".to_string(), Value::from("100000356"));
        attrs.insert("mode".to_string(), Value::from(mode));
        attrs
    }

    #[test]
    fn accepts_known_modes() {
        for mode in WAF_RULE_MODES {
            assert!(waf_rule().validate(&rule(mode)).is_ok(), "mode {}", mode);
        }
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(waf_rule().validate(&rule("log")).is_err());
    }
}
