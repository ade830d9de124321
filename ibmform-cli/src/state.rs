//! Local state file
//!
//! Remembers the remote identifier and last known attributes of every
//! managed resource between runs.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use ibmform_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STATE_PATH: &str = ".ibmform/state.json";

/// The state file as persisted on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Version of ibmform that last modified this state
    pub ibmform_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            ibmform_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Load from `path`; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(format!("Failed to read {}: {}", path.display(), e)),
        };
        let state: StateFile = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
        if state.version > Self::CURRENT_VERSION {
            return Err(format!(
                "State file version {} is newer than supported version {}",
                state.version,
                Self::CURRENT_VERSION
            ));
        }
        Ok(state)
    }

    /// Bump the serial and write to `path`, creating parent directories
    pub fn save(&mut self, path: &Path) -> Result<(), String> {
        self.serial += 1;
        self.ibmform_version = env!("CARGO_PKG_VERSION").to_string();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize state: {}", e))?;
        fs::write(path, content).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }

    pub fn find(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == id.resource_type && r.name == id.name)
    }

    /// Add or update a resource in the state
    pub fn upsert(&mut self, resource: ResourceState) {
        match self.resources.iter_mut().find(|r| {
            r.resource_type == resource.resource_type && r.name == resource.name
        }) {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == id.resource_type && r.name == id.name)?;
        Some(self.resources.remove(pos))
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_type: String,
    pub name: String,
    /// Remote identifier
    pub identifier: String,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceState {
    /// Snapshot of an observed state
    ///
    /// Declared attributes the API does not echo back (ssh keys, image,
    /// user data) are kept from `declared` so later plans can compare them.
    pub fn from_state(state: &State, declared: &HashMap<String, Value>) -> Option<Self> {
        let identifier = state.identifier.clone()?;
        let mut attributes: HashMap<String, serde_json::Value> = declared
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        for (k, v) in &state.attributes {
            attributes.insert(k.clone(), v.to_json());
        }
        Some(Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            identifier,
            attributes,
        })
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    pub fn values(&self) -> HashMap<String, Value> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect()
    }

    /// The stored snapshot as an existing state
    pub fn to_state(&self) -> State {
        State::existing(self.id(), self.values()).with_identifier(&self.identifier)
    }
}
