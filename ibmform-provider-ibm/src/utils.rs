//! Helpers for identifiers and tag sets

use std::collections::BTreeSet;

/// Parts of a WAF rule identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WafRuleId {
    pub rule_id: String,
    pub package_id: String,
    pub domain_id: String,
    pub cis_id: String,
}

impl WafRuleId {
    /// Parse `rule_id:package_id:domain_id:cis_id`
    ///
    /// The CIS id is a CRN and itself contains colons, so only the first
    /// three separators split.
    pub fn parse(identifier: &str) -> Result<Self, String> {
        let parts: Vec<&str> = identifier.splitn(4, ':').collect();
        match parts.as_slice() {
            [rule, package, domain, cis]
                if [rule, package, domain, cis].iter().all(|p| !p.is_empty()) =>
            {
                Ok(Self {
                    rule_id: rule.to_string(),
                    package_id: package.to_string(),
                    domain_id: domain.to_string(),
                    cis_id: cis.to_string(),
                })
            }
            _ => Err(format!(
                "Invalid WAF rule identifier '{}', expected rule_id:package_id:domain_id:cis_id",
                identifier
            )),
        }
    }
}

impl std::fmt::Display for WafRuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.rule_id, self.package_id, self.domain_id, self.cis_id
        )
    }
}

/// Union of declared tags and environment tags, sorted and deduplicated
pub fn merge_tags(declared: &[String], env_tags: &[String]) -> Vec<String> {
    declared
        .iter()
        .chain(env_tags)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Tags to detach and tags to attach to go from `old` to `new`
pub fn tag_changes(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let old: BTreeSet<&String> = old.iter().collect();
    let new: BTreeSet<&String> = new.iter().collect();
    let removed = old.difference(&new).map(|s| s.to_string()).collect();
    let added = new.difference(&old).map(|s| s.to_string()).collect();
    (removed, added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn waf_rule_id_keeps_crn_intact() {
        let crn = "crn:v1:bluemix:public:internet-svcs:global:a/acc:inst::";
        let id = WafRuleId::parse(&format!("100000356:c5048701:zone-1:{}", crn)).unwrap();
        assert_eq!(id.rule_id, "100000356");
        assert_eq!(id.package_id, "c5048701");
        assert_eq!(id.domain_id, "zone-1");
        assert_eq!(id.cis_id, crn);
        assert_eq!(id.to_string(), format!("100000356:c5048701:zone-1:{}", crn));
    }

    #[test]
    fn waf_rule_id_rejects_short_or_empty_parts() {
        assert!(WafRuleId::parse("100000:pkg").is_err());
        assert!(WafRuleId::parse("100000::zone:crn").is_err());
    }

    #[test]
    fn merge_tags_unions_and_sorts() {
        assert_eq!(
            merge_tags(&strings(&["b", "a"]), &strings(&["a", "env:prod"])),
            strings(&["a", "b", "env:prod"])
        );
    }

    #[test]
    fn tag_changes_computes_both_sides() {
        let (removed, added) = tag_changes(&strings(&["a", "b"]), &strings(&["b", "c"]));
        assert_eq!(removed, strings(&["a"]));
        assert_eq!(added, strings(&["c"]));
    }
}
