//! Validation constraints.
//!
//! A [`Constraints`] bag carries the recognised predicates for one
//! parameter or field. Validation collects every violation rather than
//! stopping at the first, so aggregate error responses stay complete.

use crate::error::SetupError;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// A compiled `pattern` constraint.
///
/// Keeps the raw source alongside the compiled regex so descriptors stay
/// comparable and printable.
#[derive(Clone)]
pub struct Pattern {
    raw: String,
    regex: Arc<Regex>,
}

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Fails at setup when the pattern is not a valid regex.
    pub fn compile(raw: impl Into<String>) -> Result<Self, SetupError> {
        let raw = raw.into();
        let regex = Regex::new(&raw).map_err(|e| SetupError::InvalidPattern {
            pattern: raw.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw,
            regex: Arc::new(regex),
        })
    }

    /// Returns the raw pattern source.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Tests a candidate string.
    #[must_use]
    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.raw)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/// The recognised validation predicates.
///
/// Later constraint layers override earlier ones field-by-field when an
/// annotation chain stacks several bags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    /// Minimum string length.
    pub min_length: Option<usize>,
    /// Maximum string length.
    pub max_length: Option<usize>,
    /// Inclusive numeric minimum (alias of `ge`).
    pub min: Option<f64>,
    /// Inclusive numeric maximum (alias of `le`).
    pub max: Option<f64>,
    /// Exclusive numeric lower bound.
    pub gt: Option<f64>,
    /// Inclusive numeric lower bound.
    pub ge: Option<f64>,
    /// Exclusive numeric upper bound.
    pub lt: Option<f64>,
    /// Inclusive numeric upper bound.
    pub le: Option<f64>,
    /// Regex the string must match.
    pub pattern: Option<Pattern>,
    /// The number must be a multiple of this value.
    pub multiple_of: Option<f64>,
    /// The value must equal one of these.
    pub enum_of: Option<Vec<serde_json::Value>>,
    /// Minimum number of sequence items.
    pub min_items: Option<usize>,
    /// Maximum number of sequence items.
    pub max_items: Option<usize>,
    /// Maximum number of uploaded files for a form field.
    pub max_files: Option<usize>,
}

macro_rules! setters {
    ($($(#[$doc:meta])* $name:ident: $ty:ty),* $(,)?) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $name(mut self, value: $ty) -> Self {
                self.$name = Some(value);
                self
            }
        )*
    };
}

impl Constraints {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    setters! {
        /// Sets the minimum string length.
        min_length: usize,
        /// Sets the maximum string length.
        max_length: usize,
        /// Sets the inclusive numeric minimum.
        min: f64,
        /// Sets the inclusive numeric maximum.
        max: f64,
        /// Sets the exclusive lower bound.
        gt: f64,
        /// Sets the inclusive lower bound.
        ge: f64,
        /// Sets the exclusive upper bound.
        lt: f64,
        /// Sets the inclusive upper bound.
        le: f64,
        /// Sets the multiple-of predicate.
        multiple_of: f64,
        /// Sets the allowed values.
        enum_of: Vec<serde_json::Value>,
        /// Sets the minimum item count.
        min_items: usize,
        /// Sets the maximum item count.
        max_items: usize,
        /// Sets the maximum uploaded file count.
        max_files: usize,
    }

    /// Sets the pattern constraint.
    ///
    /// # Errors
    ///
    /// Fails when the pattern does not compile.
    pub fn pattern(mut self, raw: impl Into<String>) -> Result<Self, SetupError> {
        self.pattern = Some(Pattern::compile(raw)?);
        Ok(self)
    }

    /// Returns `true` when no predicate is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlays a later bag onto this one, field by field.
    #[must_use]
    pub fn merged_with(&self, later: &Self) -> Self {
        Self {
            min_length: later.min_length.or(self.min_length),
            max_length: later.max_length.or(self.max_length),
            min: later.min.or(self.min),
            max: later.max.or(self.max),
            gt: later.gt.or(self.gt),
            ge: later.ge.or(self.ge),
            lt: later.lt.or(self.lt),
            le: later.le.or(self.le),
            pattern: later.pattern.clone().or_else(|| self.pattern.clone()),
            multiple_of: later.multiple_of.or(self.multiple_of),
            enum_of: later.enum_of.clone().or_else(|| self.enum_of.clone()),
            min_items: later.min_items.or(self.min_items),
            max_items: later.max_items.or(self.max_items),
            max_files: later.max_files.or(self.max_files),
        }
    }

    /// Validates a decoded value, collecting every violation.
    #[must_use]
    pub fn validate(&self, value: &serde_json::Value) -> Vec<String> {
        let mut violations = Vec::new();

        if let Some(allowed) = &self.enum_of {
            if !allowed.contains(value) {
                violations.push("value is not one of the allowed values".to_string());
            }
        }

        if let Some(text) = value.as_str() {
            let chars = text.chars().count();
            if let Some(min) = self.min_length {
                if chars < min {
                    violations.push(format!("must have at least {min} characters"));
                }
            }
            if let Some(max) = self.max_length {
                if chars > max {
                    violations.push(format!("must have at most {max} characters"));
                }
            }
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(text) {
                    violations.push(format!("must match pattern {:?}", pattern.raw()));
                }
            }
        }

        if let Some(number) = value.as_f64() {
            for (bound, ok, describe) in [
                (self.min, number >= self.min.unwrap_or(number), ">="),
                (self.ge, number >= self.ge.unwrap_or(number), ">="),
                (self.gt, number > self.gt.unwrap_or(number - 1.0), ">"),
                (self.max, number <= self.max.unwrap_or(number), "<="),
                (self.le, number <= self.le.unwrap_or(number), "<="),
                (self.lt, number < self.lt.unwrap_or(number + 1.0), "<"),
            ] {
                if let Some(limit) = bound {
                    if !ok {
                        violations.push(format!("must be {describe} {limit}"));
                    }
                }
            }
            if let Some(step) = self.multiple_of {
                if step != 0.0 && (number / step).fract().abs() > f64::EPSILON {
                    violations.push(format!("must be a multiple of {step}"));
                }
            }
        }

        if let Some(items) = value.as_array() {
            if let Some(min) = self.min_items {
                if items.len() < min {
                    violations.push(format!("must have at least {min} items"));
                }
            }
            if let Some(max) = self.max_items {
                if items.len() > max {
                    violations.push(format!("must have at most {max} items"));
                }
            }
        }

        violations
    }
}
