//! CIS WAF rule handlers
//!
//! A WAF rule belongs to a managed package and cannot be created or removed;
//! "create" and "update" set its mode, "delete" puts it back to its default.

use std::collections::HashMap;

use ibmform_core::provider::{ProviderError, ProviderResult};
use ibmform_core::resource::{Resource, ResourceId, State, Value};
use log::info;

use crate::models::WafRule;
use crate::provider::{IbmProvider, api_error, missing_attribute};
use crate::utils::WafRuleId;

fn rule_id_from(resource: &Resource) -> ProviderResult<WafRuleId> {
    let part = |key: &str| {
        resource
            .get_str(key)
            .map(str::to_string)
            .ok_or_else(|| missing_attribute(key))
    };
    Ok(WafRuleId {
        rule_id: part("rule_id")?,
        package_id: part("package_id")?,
        domain_id: part("domain_id")?,
        cis_id: part("cis_id")?,
    })
}

fn waf_rule_state(id: &ResourceId, rule_id: &WafRuleId, rule: &WafRule) -> State {
    let mut attrs = HashMap::new();
    attrs.insert("cis_id".to_string(), Value::from(rule_id.cis_id.as_str()));
    attrs.insert("domain_id".to_string(), Value::from(rule_id.domain_id.as_str()));
    attrs.insert("package_id".to_string(), Value::from(rule_id.package_id.as_str()));
    attrs.insert("rule_id".to_string(), Value::from(rule_id.rule_id.as_str()));
    attrs.insert("mode".to_string(), Value::from(rule.mode.as_str()));
    attrs.insert("description".to_string(), Value::from(rule.description.as_str()));
    attrs.insert("priority".to_string(), Value::from(rule.priority.as_str()));
    attrs.insert(
        "allowed_modes".to_string(),
        Value::from_strings(rule.allowed_modes.iter().cloned()),
    );
    if let Some(group) = &rule.group {
        let mut map = HashMap::new();
        map.insert("id".to_string(), Value::from(group.id.as_str()));
        map.insert("name".to_string(), Value::from(group.name.as_str()));
        attrs.insert("group".to_string(), Value::Map(map));
    }
    State::existing(id.clone(), attrs).with_identifier(rule_id.to_string())
}

impl IbmProvider {
    async fn get_waf_rule(&self, rule_id: &WafRuleId) -> ProviderResult<Option<WafRule>> {
        match self
            .cis
            .get_waf_rule(
                &rule_id.cis_id,
                &rule_id.domain_id,
                &rule_id.package_id,
                &rule_id.rule_id,
            )
            .await
        {
            Ok(rule) => Ok(Some(rule)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(api_error(
                format!("Failed to read WAF rule {}", rule_id.rule_id),
                e,
            )),
        }
    }

    async fn set_waf_rule_mode(&self, rule_id: &WafRuleId, mode: &str) -> ProviderResult<()> {
        self.cis
            .set_waf_rule_mode(
                &rule_id.cis_id,
                &rule_id.domain_id,
                &rule_id.package_id,
                &rule_id.rule_id,
                mode,
            )
            .await
            .map_err(|e| {
                api_error(
                    format!("Failed to set mode of WAF rule {}", rule_id.rule_id),
                    e,
                )
            })?;
        info!("Set WAF rule {} to mode '{}'", rule_id.rule_id, mode);
        Ok(())
    }

    /// Shared by create and update: validate the mode against the rule, then set it
    pub(crate) async fn apply_waf_rule(&self, resource: Resource) -> ProviderResult<State> {
        let rule_id = rule_id_from(&resource)?;
        let mode = resource
            .get_str("mode")
            .ok_or_else(|| missing_attribute("mode"))?;

        let rule = self.get_waf_rule(&rule_id).await?.ok_or_else(|| {
            ProviderError::new(format!(
                "WAF rule {} not found in package {}",
                rule_id.rule_id, rule_id.package_id
            ))
        })?;
        if !rule.allowed_modes.iter().any(|m| m == mode) {
            return Err(ProviderError::new(format!(
                "Mode '{}' is not allowed for WAF rule {}, allowed modes: {}",
                mode,
                rule_id.rule_id,
                rule.allowed_modes.join(", ")
            )));
        }

        self.set_waf_rule_mode(&rule_id, mode).await?;
        self.read_waf_rule(&resource.id, &rule_id.to_string()).await
    }

    pub(crate) async fn read_waf_rule(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let rule_id = WafRuleId::parse(identifier).map_err(ProviderError::new)?;
        Ok(match self.get_waf_rule(&rule_id).await? {
            Some(rule) => waf_rule_state(id, &rule_id, &rule),
            None => State::not_found(id.clone()),
        })
    }

    /// Reset the rule to its default mode
    pub(crate) async fn delete_waf_rule(&self, identifier: String) -> ProviderResult<()> {
        let rule_id = WafRuleId::parse(&identifier).map_err(ProviderError::new)?;
        let Some(rule) = self.get_waf_rule(&rule_id).await? else {
            info!("WAF rule {} no longer exists", rule_id.rule_id);
            return Ok(());
        };

        match rule.default_mode.as_deref() {
            Some(default_mode) if default_mode != rule.mode => {
                self.set_waf_rule_mode(&rule_id, default_mode).await
            }
            Some(_) => Ok(()),
            None => {
                info!(
                    "WAF rule {} has no default mode, leaving it as '{}'",
                    rule_id.rule_id, rule.mode
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::fake_provider;

    const CRN: &str = "crn:v1:bluemix:public:internet-svcs:global:a/acc:inst::";

    fn rule(mode: &str) -> WafRule {
        WafRule {
            id: "100000356".to_string(),
            description: "SQL injection".to_string(),
            priority: "5".to_string(),
            package_id: "c504870194831cd12c3fc0284f294abb".to_string(),
            allowed_modes: vec!["on".to_string(), "off".to_string()],
            mode: mode.to_string(),
            default_mode: Some("on".to_string()),
            ..Default::default()
        }
    }

    fn declared(mode: &str) -> Resource {
        Resource::new("ibm_cis_waf_rule", "sqli")
            .with_attribute("cis_id", CRN)
            .with_attribute("domain_id", "zone-1")
            .with_attribute("package_id", "c504870194831cd12c3fc0284f294abb")
            .with_attribute("rule_id", "100000356")
            .with_attribute("mode", mode)
    }

    #[tokio::test]
    async fn apply_sets_allowed_mode() {
        let (provider, _, _, cis) = fake_provider();
        cis.insert_rule(rule("on"));

        let state = provider.apply_waf_rule(declared("off")).await.unwrap();

        assert_eq!(cis.mode_of("100000356").as_deref(), Some("off"));
        assert_eq!(state.get("mode"), Some(&Value::from("off")));
        assert_eq!(
            state.identifier.as_deref(),
            Some(format!("100000356:c504870194831cd12c3fc0284f294abb:zone-1:{}", CRN).as_str())
        );
    }

    #[tokio::test]
    async fn disallowed_mode_is_rejected_without_patch() {
        let (provider, _, _, cis) = fake_provider();
        cis.insert_rule(rule("on"));

        let err = provider.apply_waf_rule(declared("block")).await.unwrap_err();

        assert!(err.message.contains("not allowed"), "{}", err);
        assert!(!cis.calls().iter().any(|c| c.starts_with("set")));
        assert_eq!(cis.mode_of("100000356").as_deref(), Some("on"));
    }

    #[tokio::test]
    async fn read_missing_rule_is_not_found() {
        let (provider, ..) = fake_provider();
        let id = ResourceId::new("ibm_cis_waf_rule", "sqli");
        let state = provider
            .read_waf_rule(&id, &format!("1:pkg:zone-1:{}", CRN))
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn read_rejects_malformed_identifier() {
        let (provider, ..) = fake_provider();
        let id = ResourceId::new("ibm_cis_waf_rule", "sqli");
        assert!(provider.read_waf_rule(&id, "100000356").await.is_err());
    }

    #[tokio::test]
    async fn delete_restores_default_mode() {
        let (provider, _, _, cis) = fake_provider();
        cis.insert_rule(rule("off"));

        provider
            .delete_waf_rule(format!(
                "100000356:c504870194831cd12c3fc0284f294abb:zone-1:{}",
                CRN
            ))
            .await
            .unwrap();

        assert_eq!(cis.mode_of("100000356").as_deref(), Some("on"));
    }
}
