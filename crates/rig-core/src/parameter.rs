//! ParameterGuard - state-aware parameter registry
//!
//! Every device declares its parameters once, as an explicit registration
//! table of `{name -> (bounds, policy, writable states)}`. The guard owns the
//! current values and decides whether a write is legal right now.
//!
//! # Data Flow
//!
//! ```text
//! device.set(name, value)
//!         │
//!         ▼
//! ┌───────────────────────────────────────────────────┐
//! │ 1. prepare(): known? writable? allowed in state?  │
//! │    - Range: clamp (or reject, per policy)         │
//! │    - Choices: strict membership                   │
//! └───────────────────────────────────────────────────┘
//!         │ (fails here if invalid, value unchanged)
//!         ▼
//! ┌───────────────────────────────────────────────────┐
//! │ 2. Push to hardware (only while a handle is held) │
//! └───────────────────────────────────────────────────┘
//!         │ (fails here if hardware rejects)
//!         ▼
//! ┌───────────────────────────────────────────────────┐
//! │ 3. commit(): store as last applied value          │
//! └───────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{RigError, RigResult};
use crate::state::StateTag;

// =============================================================================
// Values
// =============================================================================

/// Value of a single device parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// On/off flag.
    Bool(bool),
    /// Integer, also used for enumerated codes.
    Int(i64),
    /// Real number.
    Float(f64),
    /// Free text such as a port name.
    Text(String),
    /// Per-pixel values such as a stored background.
    List(Vec<f64>),
}

impl ParamValue {
    /// Kind of the stored value.
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Text(_) => ParamKind::Text,
            ParamValue::List(_) => ParamKind::List,
        }
    }

    /// Numeric value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value; integral floats are narrowed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// List value.
    pub fn as_list(&self) -> Option<&[f64]> {
        match self {
            ParamValue::List(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "\"{}\"", v),
            ParamValue::List(v) => write!(f, "[{} values]", v.len()),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::List(v)
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// `true`/`false`.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point; accepts integers.
    Float,
    /// String.
    Text,
    /// List of finite floats.
    List,
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Text => "text",
            ParamKind::List => "list",
        };
        f.write_str(label)
    }
}

/// Snapshot of parameter values, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Value by name.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Numeric value by name.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    /// Integer value by name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_i64)
    }

    /// Boolean value by name.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    /// Text value by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// List value by name.
    pub fn get_list(&self, name: &str) -> Option<&[f64]> {
        self.get(name).and_then(ParamValue::as_list)
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Declarations
// =============================================================================

/// Declared bounds of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Bounds {
    /// Any value of the right kind.
    None,
    /// Inclusive numeric range. Use `f64::INFINITY` for an open upper end.
    Range {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Enumerated set of accepted values.
    Choices(Vec<ParamValue>),
}

/// What to do with an out-of-range numeric write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfBounds {
    /// Adjust to the nearest bound.
    #[default]
    Clamp,
    /// Refuse with `InvalidParameterValue`.
    Reject,
}

/// Registration entry for one parameter.
#[derive(Debug, Clone)]
pub struct ParameterSpec<S> {
    /// Unique name within the device.
    pub name: String,
    /// Declared kind, taken from the default.
    pub kind: ParamKind,
    /// Value before any write.
    pub default: ParamValue,
    /// Range or choice list.
    pub bounds: Bounds,
    /// Handling of out-of-range numeric writes.
    pub policy: OutOfBounds,
    /// Tags in which guarded writes are accepted.
    pub writable_in: Vec<S>,
    /// Never writable, in any state.
    pub read_only: bool,
    /// Display unit, e.g. `ms`.
    pub unit: Option<String>,
}

impl<S: StateTag> ParameterSpec<S> {
    /// Declare a parameter; its kind is taken from `default`.
    pub fn new(name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        let default = default.into();
        Self {
            name: name.into(),
            kind: default.kind(),
            default,
            bounds: Bounds::None,
            policy: OutOfBounds::Clamp,
            writable_in: Vec::new(),
            read_only: false,
            unit: None,
        }
    }

    /// Clamp numeric writes to `[min, max]`.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.bounds = Bounds::Range { min, max };
        self
    }

    /// Accept only the listed values.
    pub fn with_choices<V: Into<ParamValue>>(mut self, choices: impl IntoIterator<Item = V>) -> Self {
        let kind = self.kind;
        self.bounds = Bounds::Choices(
            choices
                .into_iter()
                .map(|c| widen(kind, c.into()))
                .collect(),
        );
        self
    }

    /// Reject out-of-range writes instead of clamping them.
    pub fn rejecting(mut self) -> Self {
        self.policy = OutOfBounds::Reject;
        self
    }

    /// Tags in which the parameter may be written.
    pub fn writable_in(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.writable_in = states.into_iter().collect();
        self
    }

    /// Mark as read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Attach a display unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Validate `value` against kind and bounds, returning the value to store.
    pub fn validate(&self, value: ParamValue) -> RigResult<ParamValue> {
        let value = self.coerce(value)?;
        match &self.bounds {
            Bounds::None => Ok(value),
            Bounds::Choices(choices) => {
                if choices.contains(&value) {
                    Ok(value)
                } else {
                    let listed: Vec<String> = choices.iter().map(ToString::to_string).collect();
                    Err(self.invalid(format!(
                        "{} is not one of [{}]",
                        value,
                        listed.join(", ")
                    )))
                }
            }
            Bounds::Range { min, max } => {
                let x = value
                    .as_f64()
                    .ok_or_else(|| self.invalid("range bounds require a numeric value"))?;
                if x.is_nan() {
                    return Err(self.invalid("NaN is not a valid value"));
                }
                if x >= *min && x <= *max {
                    return Ok(value);
                }
                match self.policy {
                    OutOfBounds::Reject => Err(self.invalid(format!(
                        "{} is outside [{}, {}]",
                        value, min, max
                    ))),
                    OutOfBounds::Clamp => Ok(match self.kind {
                        ParamKind::Int => {
                            if x < *min {
                                ParamValue::Int(min.ceil() as i64)
                            } else {
                                ParamValue::Int(max.floor() as i64)
                            }
                        }
                        _ => ParamValue::Float(x.clamp(*min, *max)),
                    }),
                }
            }
        }
    }

    fn coerce(&self, value: ParamValue) -> RigResult<ParamValue> {
        match (self.kind, value) {
            (ParamKind::Float, ParamValue::Int(v)) => Ok(ParamValue::Float(v as f64)),
            (ParamKind::List, ParamValue::List(v)) => {
                if v.iter().all(|x| x.is_finite()) {
                    Ok(ParamValue::List(v))
                } else {
                    Err(self.invalid("list entries must be finite"))
                }
            }
            (ParamKind::Int, ParamValue::Float(v)) => {
                if v.fract() == 0.0 && v.is_finite() {
                    Ok(ParamValue::Int(v as i64))
                } else {
                    Err(self.invalid(format!("{} is not an integer", v)))
                }
            }
            (kind, value) if value.kind() == kind => Ok(value),
            (kind, value) => Err(self.invalid(format!(
                "expected {}, got {}",
                kind,
                value.kind()
            ))),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> RigError {
        RigError::InvalidParameterValue {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

fn widen(kind: ParamKind, value: ParamValue) -> ParamValue {
    match (kind, value) {
        (ParamKind::Float, ParamValue::Int(v)) => ParamValue::Float(v as f64),
        (_, value) => value,
    }
}

// =============================================================================
// ParameterGuard
// =============================================================================

#[derive(Debug)]
struct Entry<S> {
    spec: ParameterSpec<S>,
    value: ParamValue,
}

/// Owns current parameter values and validates writes against declared
/// bounds and the device's current state.
#[derive(Debug)]
pub struct ParameterGuard<S> {
    entries: RwLock<BTreeMap<String, Entry<S>>>,
}

impl<S: StateTag> ParameterGuard<S> {
    /// Guard holding every spec at its default.
    pub fn new(specs: impl IntoIterator<Item = ParameterSpec<S>>) -> Self {
        let entries = specs
            .into_iter()
            .map(|spec| {
                let value = spec.default.clone();
                (spec.name.clone(), Entry { spec, value })
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Last successfully applied value. Always permitted.
    pub fn read(&self, name: &str) -> RigResult<ParamValue> {
        self.entries
            .read()
            .get(name)
            .map(|e| e.value.clone())
            .ok_or_else(|| RigError::UnknownParameter(name.to_string()))
    }

    /// Copy of all current values.
    pub fn snapshot(&self) -> ParameterSet {
        self.entries
            .read()
            .iter()
            .map(|(name, e)| (name.clone(), e.value.clone()))
            .collect()
    }

    /// Current declaration of `name`.
    pub fn spec(&self, name: &str) -> Option<ParameterSpec<S>> {
        self.entries.read().get(name).map(|e| e.spec.clone())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Check that `name` may be written in `state` and validate `value`.
    ///
    /// Nothing is stored; pair with [`commit`](Self::commit).
    pub fn prepare(&self, state: S, name: &str, value: ParamValue) -> RigResult<ParamValue> {
        let entries = self.entries.read();
        let entry = entries
            .get(name)
            .ok_or_else(|| RigError::UnknownParameter(name.to_string()))?;
        if entry.spec.read_only {
            return Err(RigError::ParameterReadOnly(name.to_string()));
        }
        if !entry.spec.writable_in.contains(&state) {
            return Err(RigError::OperationNotAllowedInState {
                operation: format!("set {}", name),
                state: state.to_string(),
            });
        }
        entry.spec.validate(value)
    }

    /// Store an already validated value.
    pub fn commit(&self, name: &str, value: ParamValue) {
        if let Some(entry) = self.entries.write().get_mut(name) {
            entry.value = value;
        }
    }

    /// Guarded write without a hardware push.
    pub fn write(&self, state: S, name: &str, value: ParamValue) -> RigResult<ParamValue> {
        let value = self.prepare(state, name, value)?;
        self.commit(name, value.clone());
        Ok(value)
    }

    /// Configuration-time initial value: validated, not state-guarded.
    pub fn preset(&self, name: &str, value: ParamValue) -> RigResult<ParamValue> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| RigError::UnknownParameter(name.to_string()))?;
        let value = entry.spec.validate(value)?;
        entry.value = value.clone();
        Ok(value)
    }

    /// Replace the numeric range of `name`. Later writes use the new range;
    /// the stored value is left as is.
    pub fn set_bounds(&self, name: &str, min: f64, max: f64) -> RigResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| RigError::UnknownParameter(name.to_string()))?;
        if !matches!(entry.spec.bounds, Bounds::Range { .. }) {
            return Err(RigError::InvalidParameterValue {
                name: name.to_string(),
                reason: "parameter has no numeric range".to_string(),
            });
        }
        if min.is_nan() || max.is_nan() || min > max {
            return Err(RigError::InvalidParameterValue {
                name: name.to_string(),
                reason: format!("invalid bounds [{}, {}]", min, max),
            });
        }
        entry.spec.bounds = Bounds::Range { min, max };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Tag {
        Disconnected,
        On,
        Measuring,
    }

    impl std::fmt::Display for Tag {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn guard() -> ParameterGuard<Tag> {
        ParameterGuard::new([
            ParameterSpec::new("integration_time_ms", 1000.0)
                .with_range(0.001, f64::INFINITY)
                .writable_in([Tag::On]),
            ParameterSpec::new("trigger_mode", 0)
                .with_choices([0, 1, 2, 3, 4])
                .writable_in([Tag::On]),
            ParameterSpec::new("camera_id", 0)
                .with_range(0.0, 255.0)
                .writable_in([Tag::Disconnected]),
            ParameterSpec::new("stopbits", 1.0)
                .with_choices([ParamValue::Int(1), ParamValue::Float(1.5), ParamValue::Int(2)])
                .writable_in([Tag::Disconnected]),
            ParameterSpec::new("serial_number", "unknown").read_only(),
        ])
    }

    #[test]
    fn defaults_are_readable_in_any_state() {
        let g = guard();
        assert_eq!(g.read("integration_time_ms").ok(), Some(ParamValue::Float(1000.0)));
        assert_eq!(g.read("trigger_mode").ok(), Some(ParamValue::Int(0)));
    }

    #[test]
    fn numeric_range_clamps() {
        let g = guard();
        let stored = g
            .write(Tag::On, "integration_time_ms", ParamValue::Float(0.0))
            .unwrap();
        assert_eq!(stored, ParamValue::Float(0.001));

        let stored = g.write(Tag::Disconnected, "camera_id", ParamValue::Int(300)).unwrap();
        assert_eq!(stored, ParamValue::Int(255));
        let stored = g.write(Tag::Disconnected, "camera_id", ParamValue::Int(-4)).unwrap();
        assert_eq!(stored, ParamValue::Int(0));
    }

    #[test]
    fn int_write_to_float_parameter_is_widened() {
        let g = guard();
        let stored = g.write(Tag::On, "integration_time_ms", ParamValue::Int(20)).unwrap();
        assert_eq!(stored, ParamValue::Float(20.0));

        let stored = g.write(Tag::Disconnected, "stopbits", ParamValue::Int(2)).unwrap();
        assert_eq!(stored, ParamValue::Float(2.0));
    }

    #[test]
    fn enumerated_values_are_strictly_rejected() {
        let g = guard();
        let err = g
            .write(Tag::On, "trigger_mode", ParamValue::Int(7))
            .unwrap_err();
        assert!(matches!(err, RigError::InvalidParameterValue { ref name, .. } if name == "trigger_mode"));
        assert_eq!(g.read("trigger_mode").ok(), Some(ParamValue::Int(0)));
    }

    #[test]
    fn write_in_forbidden_state_leaves_value_unchanged() {
        let g = guard();
        let err = g
            .write(Tag::Measuring, "integration_time_ms", ParamValue::Float(5.0))
            .unwrap_err();
        assert!(matches!(err, RigError::OperationNotAllowedInState { .. }));
        assert_eq!(g.read("integration_time_ms").ok(), Some(ParamValue::Float(1000.0)));
    }

    #[test]
    fn unknown_and_read_only_parameters() {
        let g = guard();
        assert!(matches!(
            g.write(Tag::On, "gain", ParamValue::Int(1)),
            Err(RigError::UnknownParameter(_))
        ));
        assert!(matches!(
            g.write(Tag::On, "serial_number", ParamValue::from("x")),
            Err(RigError::ParameterReadOnly(_))
        ));
        assert!(matches!(g.read("gain"), Err(RigError::UnknownParameter(_))));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let g = guard();
        let err = g
            .write(Tag::On, "trigger_mode", ParamValue::from("edge"))
            .unwrap_err();
        assert!(err.to_string().contains("expected int"));
    }

    #[test]
    fn preset_ignores_state_but_validates() {
        let g = guard();
        assert_eq!(
            g.preset("integration_time_ms", ParamValue::Float(50.0)).ok(),
            Some(ParamValue::Float(50.0))
        );
        assert!(g.preset("trigger_mode", ParamValue::Int(9)).is_err());
    }

    #[test]
    fn set_bounds_changes_later_clamping() {
        let g = guard();
        g.set_bounds("integration_time_ms", 10.0, 100.0).unwrap();
        let stored = g
            .write(Tag::On, "integration_time_ms", ParamValue::Float(500.0))
            .unwrap();
        assert_eq!(stored, ParamValue::Float(100.0));

        assert!(g.set_bounds("integration_time_ms", 5.0, 1.0).is_err());
        assert!(g.set_bounds("trigger_mode", 0.0, 1.0).is_err());
    }

    #[test]
    fn snapshot_contains_every_parameter() {
        let g = guard();
        let snap = g.snapshot();
        assert_eq!(snap.len(), 5);
        assert_eq!(snap.get_f64("integration_time_ms"), Some(1000.0));
        assert_eq!(snap.get_str("serial_number"), Some("unknown"));
    }

    #[test]
    fn reject_policy_refuses_out_of_range() {
        let spec: ParameterSpec<Tag> = ParameterSpec::new("gain", 1.0)
            .with_range(0.0, 10.0)
            .rejecting();
        assert!(spec.validate(ParamValue::Float(11.0)).is_err());
        assert_eq!(spec.validate(ParamValue::Float(10.0)).ok(), Some(ParamValue::Float(10.0)));
    }

    #[test]
    fn list_values_hold_finite_numbers() {
        let spec: ParameterSpec<Tag> =
            ParameterSpec::new("background", Vec::<f64>::new()).writable_in([Tag::On]);
        let parsed: ParamValue = serde_json::from_str("[1, 2.5, 0]").unwrap();
        assert_eq!(parsed, ParamValue::List(vec![1.0, 2.5, 0.0]));
        assert_eq!(spec.validate(parsed).ok(), Some(ParamValue::List(vec![1.0, 2.5, 0.0])));

        assert!(spec.validate(ParamValue::List(vec![1.0, f64::NAN])).is_err());
        assert!(spec.validate(ParamValue::Float(1.0)).is_err());
    }
}
