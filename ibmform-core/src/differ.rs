//! Differ - Compare desired state with current state
//!
//! Compares the "desired state" declared in configuration with the "current
//! state" read back from the Provider, and decides what has to happen to each
//! resource.

use std::collections::HashMap;

use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> destroy then create
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        forced_by: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
    /// Resource exists but not in desired state -> needs deletion
    Delete(State),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let forced_by: Vec<String> = match schema {
        Some(schema) => changed
            .iter()
            .filter(|name| schema.is_force_new(name))
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    if forced_by.is_empty() {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            forced_by,
        }
    }
}

/// Find changed attributes between desired and current state
///
/// Only declared attributes are compared; computed values in the current
/// state never produce a diff on their own.
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        match current.get(key) {
            Some(current_value) if values_equal(current_value, desired_value) => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

/// String lists are compared as sets. Nested maps only compare keys present
/// on both sides: provider-filled fields and write-only fields inside a block
/// never produce a diff.
fn values_equal(current: &Value, desired: &Value) -> bool {
    match (current, desired) {
        (Value::List(x), Value::List(y))
            if x.iter().chain(y.iter()).all(|v| v.as_str().is_some()) =>
        {
            let mut x = current.string_list();
            let mut y = desired.string_list();
            x.sort();
            x.dedup();
            y.sort();
            y.dedup();
            x == y
        }
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(c, d)| values_equal(c, d))
        }
        (Value::Map(c), Value::Map(d)) => d
            .iter()
            .all(|(k, v)| c.get(k).is_none_or(|cv| values_equal(cv, v))),
        _ => current == desired,
    }
}

/// Old and new value of one attribute, if it changed
pub fn attribute_change<'a>(
    from: &'a State,
    to: &'a Resource,
    key: &str,
) -> Option<(Option<&'a Value>, Option<&'a Value>)> {
    let old = from.get(key);
    let new = to.get(key);
    let same = match (old, new) {
        (Some(a), Some(b)) => values_equal(a, b),
        (None, None) => true,
        _ => false,
    };
    if same { None } else { Some((old, new)) }
}

/// Compute Diffs for all declared resources
///
/// Resources present in `current_states` but no longer declared are
/// scheduled for deletion.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Vec<Diff> {
    let mut plan = Vec::new();

    for resource in desired.iter().filter(|r| !r.is_data_source()) {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let d = diff(resource, &current, schemas.get(&resource.id.resource_type));
        if d.is_change() {
            plan.push(d);
        }
    }

    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !desired.iter().any(|r| r.id == s.id))
        .collect();
    orphans.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
    plan.extend(orphans.into_iter().map(|s| Diff::Delete(s.clone())));

    plan
}
