//! In-memory API fakes for handler tests

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{ApiError, ApiResult, CisApi, TaggingApi, VpcApi};
use crate::models::{
    BareMetalServer, BareMetalServerPatch, BareMetalServerProfile, BareMetalServerPrototype,
    InstanceTemplate, Page, Reference, StopType, WafRule,
};
use crate::provider::IbmProvider;

/// Items per page returned by the fake list calls
const PAGE_SIZE: usize = 2;

fn page<T: Clone>(items: &[T], start: Option<&str>) -> Page<T> {
    let offset: usize = start.and_then(|s| s.parse().ok()).unwrap_or(0);
    let end = (offset + PAGE_SIZE).min(items.len());
    Page {
        items: items.get(offset..end).unwrap_or_default().to_vec(),
        next_start: (end < items.len()).then(|| end.to_string()),
    }
}

#[derive(Default)]
pub struct FakeVpc {
    servers: Mutex<HashMap<String, BareMetalServer>>,
    /// Statuses a server moves through on successive GETs
    script: Mutex<VecDeque<String>>,
    /// GETs a server stays visible after DELETE, per id
    linger: Mutex<HashMap<String, usize>>,
    /// Remaining visible GETs of servers already deleted
    deleting: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<String>>,
    pub profiles: Mutex<Vec<BareMetalServerProfile>>,
    pub templates: Mutex<Vec<InstanceTemplate>>,
}

impl FakeVpc {
    pub fn script<const N: usize>(&self, statuses: [&str; N]) {
        let mut script = self.script.lock().unwrap();
        script.extend(statuses.iter().map(|s| s.to_string()));
    }

    pub fn insert_server(&self, id: &str, status: &str) {
        let server = BareMetalServer {
            id: id.to_string(),
            name: id.to_string(),
            crn: format!("crn:{}", id),
            status: status.to_string(),
            profile: Reference {
                name: Some("bx2-metal-192x768".to_string()),
                ..Default::default()
            },
            zone: Reference {
                name: Some("us-south-3".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.servers.lock().unwrap().insert(id.to_string(), server);
    }

    /// Keep `id` readable for `gets` more GETs once it is deleted
    pub fn linger_after_delete(&self, id: &str, gets: usize) {
        self.linger.lock().unwrap().insert(id.to_string(), gets);
    }

    pub fn has_server(&self, id: &str) -> bool {
        self.servers.lock().unwrap().contains_key(id)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VpcApi for FakeVpc {
    async fn get_bare_metal_server(&self, id: &str) -> ApiResult<BareMetalServer> {
        self.record(format!("get {}", id));
        let mut servers = self.servers.lock().unwrap();
        if let Some(remaining) = self.deleting.lock().unwrap().get_mut(id) {
            if *remaining == 0 {
                servers.remove(id);
            } else {
                *remaining -= 1;
            }
        }
        let server = servers
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found("Bare metal server not found"))?;
        if let Some(status) = self.script.lock().unwrap().pop_front() {
            server.status = status;
        }
        Ok(server.clone())
    }

    async fn create_bare_metal_server(
        &self,
        prototype: &BareMetalServerPrototype,
    ) -> ApiResult<BareMetalServer> {
        self.record(format!("create {}", prototype.name));
        let id = format!("bms-{}", self.servers.lock().unwrap().len() + 1);
        self.insert_server(&id, "pending");
        let mut servers = self.servers.lock().unwrap();
        let server = servers
            .get_mut(&id)
            .ok_or_else(|| ApiError::new(Some(500), "lost server"))?;
        server.name = prototype.name.clone();
        Ok(server.clone())
    }

    async fn update_bare_metal_server(
        &self,
        id: &str,
        patch: &BareMetalServerPatch,
    ) -> ApiResult<BareMetalServer> {
        let name = patch.name.clone().unwrap_or_default();
        self.record(format!("update {} {}", id, name));
        let mut servers = self.servers.lock().unwrap();
        let server = servers
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found("Bare metal server not found"))?;
        server.name = name;
        Ok(server.clone())
    }

    async fn delete_bare_metal_server(&self, id: &str) -> ApiResult<()> {
        self.record(format!("delete {}", id));
        let mut servers = self.servers.lock().unwrap();
        if !servers.contains_key(id) {
            return Err(ApiError::not_found("Bare metal server not found"));
        }
        match self.linger.lock().unwrap().get(id) {
            Some(&gets) => {
                self.deleting.lock().unwrap().insert(id.to_string(), gets);
            }
            None => {
                servers.remove(id);
            }
        }
        Ok(())
    }

    async fn stop_bare_metal_server(&self, id: &str, stop_type: StopType) -> ApiResult<()> {
        let kind = match stop_type {
            StopType::Soft => "soft",
            StopType::Hard => "hard",
        };
        self.record(format!("stop {} {}", id, kind));
        if stop_type == StopType::Hard {
            self.script.lock().unwrap().clear();
            if let Some(server) = self.servers.lock().unwrap().get_mut(id) {
                server.status = "stopped".to_string();
            }
        }
        Ok(())
    }

    async fn list_bare_metal_servers(&self, start: Option<&str>) -> ApiResult<Page<BareMetalServer>> {
        let mut servers: Vec<BareMetalServer> =
            self.servers.lock().unwrap().values().cloned().collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(page(&servers, start))
    }

    async fn get_bare_metal_server_profile(&self, name: &str) -> ApiResult<BareMetalServerProfile> {
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| ApiError::not_found("Profile not found"))
    }

    async fn list_bare_metal_server_profiles(
        &self,
        start: Option<&str>,
    ) -> ApiResult<Page<BareMetalServerProfile>> {
        Ok(page(&self.profiles.lock().unwrap(), start))
    }

    async fn get_instance_template(&self, id: &str) -> ApiResult<InstanceTemplate> {
        self.templates
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("Instance template not found"))
    }

    async fn list_instance_templates(&self, start: Option<&str>) -> ApiResult<Page<InstanceTemplate>> {
        Ok(page(&self.templates.lock().unwrap(), start))
    }
}

#[derive(Default)]
pub struct FakeTagging {
    tags: Mutex<HashMap<String, BTreeSet<String>>>,
    fail: bool,
}

impl FakeTagging {
    /// Tagging service whose every call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn set_tags(&self, crn: &str, tags: &[&str]) {
        self.tags.lock().unwrap().insert(
            crn.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        );
    }

    pub fn tags_of(&self, crn: &str) -> Vec<String> {
        self.tags
            .lock()
            .unwrap()
            .get(crn)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self) -> ApiResult<()> {
        if self.fail {
            Err(ApiError::new(Some(503), "Tagging service unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TaggingApi for FakeTagging {
    async fn get_tags(&self, crn: &str) -> ApiResult<Vec<String>> {
        self.check()?;
        Ok(self.tags_of(crn))
    }

    async fn attach_tags(&self, crn: &str, tags: &[String]) -> ApiResult<()> {
        self.check()?;
        self.tags
            .lock()
            .unwrap()
            .entry(crn.to_string())
            .or_default()
            .extend(tags.iter().cloned());
        Ok(())
    }

    async fn detach_tags(&self, crn: &str, tags: &[String]) -> ApiResult<()> {
        self.check()?;
        if let Some(existing) = self.tags.lock().unwrap().get_mut(crn) {
            existing.retain(|t| !tags.contains(t));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCis {
    rules: Mutex<HashMap<String, WafRule>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCis {
    pub fn insert_rule(&self, rule: WafRule) {
        self.rules.lock().unwrap().insert(rule.id.clone(), rule);
    }

    pub fn mode_of(&self, rule_id: &str) -> Option<String> {
        self.rules.lock().unwrap().get(rule_id).map(|r| r.mode.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CisApi for FakeCis {
    async fn get_waf_rule(
        &self,
        _cis_id: &str,
        _domain_id: &str,
        package_id: &str,
        rule_id: &str,
    ) -> ApiResult<WafRule> {
        self.calls.lock().unwrap().push(format!("get {}", rule_id));
        self.rules
            .lock()
            .unwrap()
            .get(rule_id)
            .filter(|r| r.package_id == package_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("WAF rule not found"))
    }

    async fn set_waf_rule_mode(
        &self,
        _cis_id: &str,
        _domain_id: &str,
        _package_id: &str,
        rule_id: &str,
        mode: &str,
    ) -> ApiResult<WafRule> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("set {} {}", rule_id, mode));
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .get_mut(rule_id)
            .ok_or_else(|| ApiError::not_found("WAF rule not found"))?;
        rule.mode = mode.to_string();
        Ok(rule.clone())
    }
}

/// Provider over fresh fakes, polling every second
pub fn fake_provider() -> (IbmProvider, Arc<FakeVpc>, Arc<FakeTagging>, Arc<FakeCis>) {
    let vpc = Arc::new(FakeVpc::default());
    let tagging = Arc::new(FakeTagging::default());
    let cis = Arc::new(FakeCis::default());
    let provider = IbmProvider::with_clients(vpc.clone(), tagging.clone(), cis.clone())
        .with_polling(Duration::from_secs(1), Duration::from_secs(1));
    (provider, vpc, tagging, cis)
}
