//! Parameter space definitions and solver configurations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::SpaceError;

/// A concrete value assigned to a solver parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

/// The domain of a single tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamKind {
    /// Boolean switch.
    Bool,
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Continuous range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Unordered set of admissible values.
    Categorical { values: Vec<ParamValue> },
}

impl ParamKind {
    /// Whether `value` lies inside this domain.
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Self::Bool, ParamValue::Bool(_)) => true,
            (Self::IntRange { low, high }, ParamValue::Int(v)) => low <= v && v <= high,
            (Self::FloatRange { low, high }, ParamValue::Float(v)) => low <= v && v <= high,
            (Self::Categorical { values }, v) => values.contains(v),
            _ => false,
        }
    }

    /// Whether the domain holds no admissible value at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bool => false,
            Self::IntRange { low, high } => low > high,
            Self::FloatRange { low, high } => low > high,
            Self::Categorical { values } => values.is_empty(),
        }
    }
}

/// A knob that is only meaningful when another knob takes a specific value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDependency {
    /// Name of the controlling parameter.
    pub parameter: String,
    /// Value the controlling parameter must take.
    pub value: ParamValue,
}

/// A single tunable knob: name, domain, default, optional dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: ParamValue,
    /// When set, this knob may only deviate from its default while the
    /// dependency holds.
    pub requires: Option<ParamDependency>,
}

/// The full tunable space: an ordered list of parameter specs plus any
/// parameters pinned to a fixed value for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    pub specs: Vec<ParameterSpec>,
    fixed: BTreeMap<String, ParamValue>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bool(mut self, name: impl Into<String>, default: bool) -> Self {
        self.specs.push(ParameterSpec {
            name: name.into(),
            kind: ParamKind::Bool,
            default: ParamValue::Bool(default),
            requires: None,
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64, default: i64) -> Self {
        self.specs.push(ParameterSpec {
            name: name.into(),
            kind: ParamKind::IntRange { low, high },
            default: ParamValue::Int(default),
            requires: None,
        });
        self
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64, default: f64) -> Self {
        self.specs.push(ParameterSpec {
            name: name.into(),
            kind: ParamKind::FloatRange { low, high },
            default: ParamValue::Float(default),
            requires: None,
        });
        self
    }

    pub fn add_categorical(
        mut self,
        name: impl Into<String>,
        values: Vec<ParamValue>,
        default: ParamValue,
    ) -> Self {
        self.specs.push(ParameterSpec {
            name: name.into(),
            kind: ParamKind::Categorical { values },
            default,
            requires: None,
        });
        self
    }

    /// Attach a dependency constraint to the most recently added parameter.
    pub fn only_when(mut self, parameter: impl Into<String>, value: ParamValue) -> Self {
        if let Some(last) = self.specs.last_mut() {
            last.requires = Some(ParamDependency {
                parameter: parameter.into(),
                value,
            });
        }
        self
    }

    /// Pin a parameter to a fixed value and remove it from tuning.
    pub fn fix_parameter(&mut self, name: &str, value: ParamValue) {
        self.specs.retain(|spec| spec.name != name);
        self.fixed.insert(name.to_string(), value);
    }

    /// Remove a parameter from the space entirely.
    pub fn drop_parameter(&mut self, name: &str) {
        self.specs.retain(|spec| spec.name != name);
        self.fixed.remove(name);
    }

    pub fn fixed_parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.fixed
    }

    pub fn spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Structural integrity: unique names, non-empty domains, defaults inside
    /// their domains, dependencies pointing at known parameters.
    pub fn check(&self) -> Result<(), SpaceError> {
        let mut seen = std::collections::HashSet::new();
        for spec in &self.specs {
            if !seen.insert(spec.name.as_str()) || self.fixed.contains_key(&spec.name) {
                return Err(SpaceError::DuplicateParameter {
                    name: spec.name.clone(),
                });
            }
            if spec.kind.is_empty() {
                return Err(SpaceError::EmptyDomain {
                    name: spec.name.clone(),
                });
            }
            if !spec.kind.contains(&spec.default) {
                return Err(SpaceError::DefaultOutOfDomain {
                    name: spec.name.clone(),
                });
            }
            if let Some(dep) = &spec.requires {
                let known = self.spec(&dep.parameter).is_some()
                    || self.fixed.contains_key(&dep.parameter);
                if !known {
                    return Err(SpaceError::UnknownParameter {
                        name: dep.parameter.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The all-default configuration: every spec at its default plus the
    /// fixed parameters. Used as the baseline reference.
    pub fn default_configuration(&self) -> Configuration {
        let mut config = Configuration::new();
        for spec in &self.specs {
            config.set(&spec.name, spec.default.clone());
        }
        for (name, value) in &self.fixed {
            config.set(name, value.clone());
        }
        config
    }

    /// The effective value a configuration assigns to `name`, falling back to
    /// the fixed value or the spec default for omitted knobs.
    pub fn effective_value(&self, config: &Configuration, name: &str) -> Option<ParamValue> {
        if let Some(value) = config.get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.fixed.get(name) {
            return Some(value.clone());
        }
        self.spec(name).map(|spec| spec.default.clone())
    }

    /// Validate a proposed configuration against the space.
    ///
    /// Configurations may omit knobs (omitted ones inherit solver defaults),
    /// but every present entry must name a known parameter, lie inside its
    /// domain, match any fixed value, and honor dependency constraints.
    pub fn validate(&self, config: &Configuration) -> Result<(), SpaceError> {
        for (name, value) in config.iter() {
            if let Some(fixed) = self.fixed.get(name) {
                if fixed != value {
                    return Err(SpaceError::FixedParameterOverride { name: name.clone() });
                }
                continue;
            }
            let spec = self
                .spec(name)
                .ok_or_else(|| SpaceError::UnknownParameter { name: name.clone() })?;
            if !spec.kind.contains(value) {
                return Err(SpaceError::OutOfDomain {
                    name: name.clone(),
                    value: value.to_string(),
                });
            }
            if let Some(dep) = &spec.requires {
                let holds = self
                    .effective_value(config, &dep.parameter)
                    .map(|v| v == dep.value)
                    .unwrap_or(false);
                if !holds && *value != spec.default {
                    return Err(SpaceError::DependencyViolated {
                        name: name.clone(),
                        dependency: dep.parameter.clone(),
                        value: dep.value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// One assignment of values to solver parameters, compared by value.
///
/// Backed by an ordered map so the serialized form is canonical; the JSON
/// rendering doubles as the evaluation-cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    values: BTreeMap<String, ParamValue>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A copy with one parameter removed (it reverts to the solver default).
    pub fn without(&self, name: &str) -> Self {
        let mut copy = self.clone();
        copy.values.remove(name);
        copy
    }

    /// The entries that deviate from the space's defaults and fixed values.
    pub fn overrides(&self, space: &ParameterSpace) -> Configuration {
        let mut diff = Configuration::new();
        for (name, value) in self.iter() {
            let default = space
                .spec(name)
                .map(|spec| &spec.default)
                .or_else(|| space.fixed_parameters().get(name));
            if default != Some(value) {
                diff.set(name, value.clone());
            }
        }
        diff
    }

    /// Canonical cache key: the configuration's JSON rendering. Stable because
    /// the backing map is ordered.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(&self.values).unwrap_or_else(|_| format!("{:?}", self.values))
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")
    }
}
