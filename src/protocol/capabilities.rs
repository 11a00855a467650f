//! Capability probing over loosely shaped hello payloads.
//!
//! Different gateway releases advertise their method list in different
//! places. Each probe looks at exactly one shape and returns `None` when the
//! shape does not match; probes run in a fixed order and the first match
//! wins.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashSet;
use serde_json::Value;

// ============================================================================
// Types
// ============================================================================

/// A single probe over the hello payload.
pub type Probe<T> = fn(&Value) -> Option<T>;

/// Set of method names advertised by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSet(FxHashSet<String>);

impl MethodSet {
    /// Returns `true` if `method` is advertised.
    #[inline]
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.0.contains(method)
    }

    /// Returns the number of advertised methods.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no methods are advertised.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the method names in sorted order.
    #[must_use]
    pub fn sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl FromIterator<String> for MethodSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Method Probes
// ============================================================================

/// Method-list probes, in priority order.
const METHOD_PROBES: &[(&str, Probe<MethodSet>)] = &[
    ("features.methods[]", features_method_array),
    ("methods[]", top_level_method_array),
    ("features.methods{}", features_method_object),
    ("snapshot.methods[]", snapshot_method_array),
];

/// Runs the method probes in order and returns the first match.
#[must_use]
pub fn probe_methods(payload: &Value) -> Option<MethodSet> {
    first_match(METHOD_PROBES, payload)
}

fn features_method_array(payload: &Value) -> Option<MethodSet> {
    string_array(payload.pointer("/features/methods")?)
}

fn top_level_method_array(payload: &Value) -> Option<MethodSet> {
    string_array(payload.get("methods")?)
}

fn features_method_object(payload: &Value) -> Option<MethodSet> {
    let object = payload.pointer("/features/methods")?.as_object()?;
    Some(object.keys().cloned().collect())
}

fn snapshot_method_array(payload: &Value) -> Option<MethodSet> {
    string_array(payload.pointer("/snapshot/methods")?)
}

/// Accepts only arrays whose elements are all strings.
fn string_array(value: &Value) -> Option<MethodSet> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

// ============================================================================
// Protocol Probes
// ============================================================================

/// Protocol-version probes, in priority order.
const PROTOCOL_PROBES: &[(&str, Probe<u32>)] = &[
    ("protocol", protocol_field),
    ("version", version_field),
    ("server.protocol", server_protocol_field),
];

/// Runs the protocol probes in order and returns the first match.
#[must_use]
pub fn probe_protocol(payload: &Value) -> Option<u32> {
    first_match(PROTOCOL_PROBES, payload)
}

fn protocol_field(payload: &Value) -> Option<u32> {
    u32_field(payload, "/protocol")
}

fn version_field(payload: &Value) -> Option<u32> {
    u32_field(payload, "/version")
}

fn server_protocol_field(payload: &Value) -> Option<u32> {
    u32_field(payload, "/server/protocol")
}

fn u32_field(payload: &Value, pointer: &str) -> Option<u32> {
    payload
        .pointer(pointer)?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
}

// ============================================================================
// Helpers
// ============================================================================

fn first_match<T>(probes: &[(&str, Probe<T>)], payload: &Value) -> Option<T> {
    probes.iter().find_map(|(name, probe)| {
        let found = probe(payload);
        if found.is_some() {
            tracing::trace!(probe = *name, "Capability probe matched");
        }
        found
    })
}

// ============================================================================
// Tests
// ============================================================================
