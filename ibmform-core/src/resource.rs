//! Resource - Representing resources and their state

use std::collections::HashMap;
use std::time::Duration;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "ibm_is_bare_metal_server")
    pub resource_type: String,
    /// Resource name (local label given in the configuration)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Collect the string members of a list value, skipping anything else
    pub fn string_list(&self) -> Vec<String> {
        self.as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn from_strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => {
                let obj: serde_json::Map<_, _> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::Value::Object(obj)
            }
        }
    }

    /// Convert from JSON. `null` has no counterpart and yields `None`.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::Int),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Array(items) => Some(Value::List(
                items.iter().filter_map(Value::from_json).collect(),
            )),
            serde_json::Value::Object(map) => Some(Value::Map(
                map.iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Per-operation timeouts declared on a resource
///
/// Unset entries fall back to the resource type's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
}

impl Timeouts {
    pub fn with_create(mut self, d: Duration) -> Self {
        self.create = Some(d);
        self
    }

    pub fn with_update(mut self, d: Duration) -> Self {
        self.update = Some(d);
        self
    }

    pub fn with_delete(mut self, d: Duration) -> Self {
        self.delete = Some(d);
        self
    }

    /// Fill unset entries from `defaults`
    pub fn or(&self, defaults: &Timeouts) -> Timeouts {
        Timeouts {
            create: self.create.or(defaults.create),
            update: self.update.or(defaults.update),
            delete: self.delete.or(defaults.delete),
        }
    }

    /// Parse a `timeouts` attribute map such as `{ create = "15m", delete = "1h" }`
    pub fn from_value(value: &Value) -> Result<Timeouts, String> {
        let map = value
            .as_map()
            .ok_or_else(|| "timeouts must be a map".to_string())?;
        let mut timeouts = Timeouts::default();
        for (key, v) in map {
            let raw = v
                .as_str()
                .ok_or_else(|| format!("timeout '{}' must be a string", key))?;
            let duration = parse_duration(raw)?;
            match key.as_str() {
                "create" => timeouts.create = Some(duration),
                "update" => timeouts.update = Some(duration),
                "delete" => timeouts.delete = Some(duration),
                other => return Err(format!("Unknown timeout '{}'", other)),
            }
        }
        Ok(timeouts)
    }
}

/// Parse durations like "30s", "10m", "1h30m"
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("Invalid duration '{}'", s))?;
        digits.clear();
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(format!("Invalid duration unit '{}' in '{}'", c, s)),
        };
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("Duration '{}' out of range", s))?;
    }
    if !digits.is_empty() {
        return Err(format!("Invalid duration '{}': missing unit", s));
    }

    Ok(Duration::from_secs(total))
}

/// Desired state declared in configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// If true, this is a data source (read-only) that won't be modified
    pub read_only: bool,
    pub timeouts: Timeouts,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            read_only: false,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// String attribute; empty strings count as unset
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.get(key).map(Value::string_list).unwrap_or_default()
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Remote identifier (e.g., a bare metal server id)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_duration_rejects_overflow() {
        let err = parse_duration("9999999999999999h").unwrap_err();
        assert!(err.contains("out of range"));
        assert!(parse_duration(&format!("{}s1s", u64::MAX)).is_err());
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)).unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn timeouts_from_value_and_defaults() {
        let mut map = HashMap::new();
        map.insert("create".to_string(), Value::from("15m"));
        let declared = Timeouts::from_value(&Value::Map(map)).unwrap();

        let defaults = Timeouts::default()
            .with_create(Duration::from_secs(600))
            .with_delete(Duration::from_secs(600));
        let resolved = declared.or(&defaults);

        assert_eq!(resolved.create, Some(Duration::from_secs(900)));
        assert_eq!(resolved.delete, Some(Duration::from_secs(600)));
        assert_eq!(resolved.update, None);
    }

    #[test]
    fn timeouts_reject_unknown_key() {
        let mut map = HashMap::new();
        map.insert("read".to_string(), Value::from("1m"));
        assert!(Timeouts::from_value(&Value::Map(map)).is_err());
    }

    #[test]
    fn json_conversion_drops_nulls() {
        let json = serde_json::json!({
            "name": "bms-1",
            "bandwidth": 100000,
            "secure": true,
            "keys": ["k1", "k2"],
            "missing": null
        });
        let value = Value::from_json(&json).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("name"), Some(&Value::from("bms-1")));
        assert_eq!(map.get("bandwidth"), Some(&Value::Int(100000)));
        assert_eq!(map.get("keys").unwrap().string_list(), vec!["k1", "k2"]);
        assert!(!map.contains_key("missing"));
        assert_eq!(Value::from_json(&value.to_json()).unwrap(), value);
    }

    #[test]
    fn resource_get_str_ignores_empty() {
        let resource = Resource::new("ibm_is_bare_metal_server", "web")
            .with_attribute("name", "web-1")
            .with_attribute("user_data", "");
        assert_eq!(resource.get_str("name"), Some("web-1"));
        assert_eq!(resource.get_str("user_data"), None);
    }
}
