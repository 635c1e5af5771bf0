//! The live configuration read by the filtering pipeline.

use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, warn};

/// Parameter name for the frame records are transformed into before
/// filtering.
pub const INPUT_FRAME: &str = "input_frame";

/// Parameter name for the frame filtered records are published in.
pub const OUTPUT_FRAME: &str = "output_frame";

/// A batch of named parameter updates applied atomically.
pub type UpdateBatch = IndexMap<String, ParamValue>;

/// The value of a single named parameter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

impl ParamValue {
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Integer(value) => Some(value),
            _ => None,
        }
    }

    /// Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Double(value) => Some(value),
            Self::Integer(value) => Some(value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Double(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Build an [`UpdateBatch`] from `(name, value)` pairs.
pub fn batch<I, K, V>(updates: I) -> UpdateBatch
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<ParamValue>,
{
    updates
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect()
}

/// One consistent set of framing and algorithm parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Frame to transform input records into before filtering. Empty
    /// means filter in the record's own frame.
    pub input_frame: String,
    /// Frame to publish in. Empty means the record's original frame.
    pub output_frame: String,
    /// Algorithm parameters keyed by name.
    pub params: IndexMap<String, ParamValue>,
}

impl Default for Configuration {
    /// Empty frames and the common filter parameter defaults.
    fn default() -> Self {
        Self {
            input_frame: String::new(),
            output_frame: String::new(),
            params: default_parameters(),
        }
    }
}

impl Configuration {
    /// A configuration with empty frames and no algorithm parameters.
    pub fn empty() -> Self {
        Self {
            input_frame: String::new(),
            output_frame: String::new(),
            params: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Set a single value. Returns true if the stored value changed.
    pub(crate) fn set(&mut self, name: &str, value: &ParamValue) -> bool {
        let frame = match name {
            INPUT_FRAME => &mut self.input_frame,
            OUTPUT_FRAME => &mut self.output_frame,
            _ => {
                if self.params.get(name) == Some(value) {
                    return false;
                }
                debug!(name = %name, value = %value, "Setting parameter");
                self.params.insert(name.to_string(), value.clone());
                return true;
            }
        };

        let Some(value) = value.as_str() else {
            warn!(name = %name, value = %value, "Ignoring non-string frame name");
            return false;
        };

        if *frame == value {
            return false;
        }

        debug!(name = %name, frame = %value, "Setting frame");
        *frame = value.to_string();
        true
    }
}

/// The parameters shared by the point filters and their defaults.
pub fn default_parameters() -> IndexMap<String, ParamValue> {
    let defaults: [(&str, ParamValue); 17] = [
        ("filter_field_name", "z".into()),
        ("filter_limit_min", 0.0_f64.into()),
        ("filter_limit_max", 1.0_f64.into()),
        ("filter_limit_negative", false.into()),
        ("keep_organized", false.into()),
        ("leaf_size", 0.01_f64.into()),
        ("min_x", (-1.0_f64).into()),
        ("max_x", 1.0_f64.into()),
        ("min_y", (-1.0_f64).into()),
        ("max_y", 1.0_f64.into()),
        ("min_z", (-1.0_f64).into()),
        ("max_z", 1.0_f64.into()),
        ("min_neighbors", 5_i64.into()),
        ("radius_search", 0.1_f64.into()),
        ("mean_k", 2_i64.into()),
        ("stddev", 0.0_f64.into()),
        ("negative", false.into()),
    ];

    defaults
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
