//! Custom registration forms.
//!
//! An event carries an ordered list of [`FormField`]s. Participants answer
//! with [`FormResponses`], a label → [`FieldValue`] map checked against the
//! schema when a registration, team creation or team join is submitted.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Field kinds supported by the form builder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Single-line text
    Text,
    /// Multi-line text
    Textarea,
    /// Email address
    Email,
    /// Number
    Number,
    /// Calendar date (`YYYY-MM-DD` or RFC 3339)
    Date,
    /// One of `options`, picked from a list
    Dropdown,
    /// One of `options`, picked from radio buttons
    Radio,
    /// Several of `options`; a single consent box when there are none
    Checkbox,
    /// Reference to an uploaded file
    File,
}

impl FieldType {
    const fn needs_options(self) -> bool {
        matches!(self, Self::Dropdown | Self::Radio)
    }

    const fn expected(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Checkbox => "list or boolean",
            _ => "text",
        }
    }
}

/// One question on the form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Label; also the key in [`FormResponses`]
    pub label: String,
    /// Kind of answer expected
    pub field_type: FieldType,
    /// Whether an answer must be given
    pub required: bool,
    /// Choices for dropdown, radio and checkbox fields
    #[serde(default)]
    pub options: Vec<String>,
}

impl FormField {
    /// A field without options
    #[must_use]
    pub fn new(label: impl Into<String>, field_type: FieldType, required: bool) -> Self {
        Self {
            label: label.into(),
            field_type,
            required,
            options: Vec::new(),
        }
    }

    /// Attach choices
    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }
}

/// A submitted answer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Text, email, date, choice or file reference
    Text(String),
    /// Numeric answer
    Number(f64),
    /// Consent checkbox
    Boolean(bool),
    /// Multi-select checkbox
    List(Vec<String>),
}

impl FieldValue {
    fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Number(_) | Self::Boolean(_) => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

/// Answers keyed by field label
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormResponses(BTreeMap<String, FieldValue>);

impl FormResponses {
    /// No answers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an answer
    #[must_use]
    pub fn with(mut self, label: impl Into<String>, value: FieldValue) -> Self {
        self.0.insert(label.into(), value);
        self
    }

    /// Answer for `label`
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&FieldValue> {
        self.0.get(label)
    }

    /// Number of answers
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no answers were given
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate answers in label order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, FieldValue)> for FormResponses {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Why a form definition or a submission was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// Two fields share a label
    #[error("Duplicate form field label: {0}")]
    DuplicateLabel(String),

    /// A field has an empty label
    #[error("Form field labels cannot be empty")]
    EmptyLabel,

    /// A choice field offers nothing to choose
    #[error("Field '{0}' needs at least one option")]
    MissingOptions(String),

    /// A required answer is absent or blank
    #[error("Field '{0}' is required")]
    MissingRequired(String),

    /// An answer names a field the form does not have
    #[error("Unknown form field: {0}")]
    UnknownField(String),

    /// An answer has the wrong shape for its field
    #[error("Field '{label}' expects a {expected} value")]
    TypeMismatch {
        /// Field label
        label: String,
        /// Expected shape
        expected: &'static str,
    },

    /// A choice answer is not among the options
    #[error("'{value}' is not an option for field '{label}'")]
    InvalidOption {
        /// Field label
        label: String,
        /// Offending answer
        value: String,
    },

    /// A text answer is malformed for its field type
    #[error("Field '{label}' is not a valid {kind}")]
    Malformed {
        /// Field label
        label: String,
        /// `email`, `date` or `number`
        kind: &'static str,
    },
}

/// Ordered custom form attached to an event
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormSchema(Vec<FormField>);

impl FormSchema {
    /// Build a schema from fields in display order
    #[must_use]
    pub const fn new(fields: Vec<FormField>) -> Self {
        Self(fields)
    }

    /// Fields in display order
    #[must_use]
    pub fn fields(&self) -> &[FormField] {
        &self.0
    }

    /// Whether the event has no custom form
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the definition itself: labels non-empty and unique, choice fields
    /// carry options.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn check_definition(&self) -> Result<(), FormError> {
        let mut seen = HashSet::new();
        for field in &self.0 {
            let label = field.label.trim();
            if label.is_empty() {
                return Err(FormError::EmptyLabel);
            }
            if !seen.insert(label) {
                return Err(FormError::DuplicateLabel(label.to_string()));
            }
            if field.field_type.needs_options() && field.options.is_empty() {
                return Err(FormError::MissingOptions(label.to_string()));
            }
        }
        Ok(())
    }

    /// Validate a full submission against the form.
    ///
    /// # Errors
    ///
    /// Returns the first unknown, missing or malformed answer.
    pub fn validate(&self, responses: &FormResponses) -> Result<(), FormError> {
        for label in responses.0.keys() {
            if !self.0.iter().any(|field| field.label == *label) {
                return Err(FormError::UnknownField(label.clone()));
            }
        }

        for field in &self.0 {
            match responses.get(&field.label) {
                None => {
                    if field.required {
                        return Err(FormError::MissingRequired(field.label.clone()));
                    }
                },
                Some(value) if value.is_blank() => {
                    if field.required {
                        return Err(FormError::MissingRequired(field.label.clone()));
                    }
                },
                Some(value) => check_value(field, value)?,
            }
        }
        Ok(())
    }
}

fn check_value(field: &FormField, value: &FieldValue) -> Result<(), FormError> {
    let label = || field.label.clone();
    let mismatch = || FormError::TypeMismatch {
        label: label(),
        expected: field.field_type.expected(),
    };

    match (field.field_type, value) {
        (FieldType::Text | FieldType::Textarea | FieldType::File, FieldValue::Text(_)) => Ok(()),
        (FieldType::Email, FieldValue::Text(text)) => {
            if looks_like_email(text) {
                Ok(())
            } else {
                Err(FormError::Malformed { label: label(), kind: "email" })
            }
        },
        (FieldType::Number, FieldValue::Number(n)) => {
            if n.is_finite() {
                Ok(())
            } else {
                Err(FormError::Malformed { label: label(), kind: "number" })
            }
        },
        (FieldType::Date, FieldValue::Text(text)) => {
            let text = text.trim();
            if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
                || DateTime::parse_from_rfc3339(text).is_ok()
            {
                Ok(())
            } else {
                Err(FormError::Malformed { label: label(), kind: "date" })
            }
        },
        (FieldType::Dropdown | FieldType::Radio, FieldValue::Text(choice)) => {
            if field.options.iter().any(|option| option == choice) {
                Ok(())
            } else {
                Err(FormError::InvalidOption { label: label(), value: choice.clone() })
            }
        },
        (FieldType::Checkbox, FieldValue::List(choices)) if !field.options.is_empty() => {
            match choices.iter().find(|choice| !field.options.contains(choice)) {
                Some(bad) => Err(FormError::InvalidOption { label: label(), value: bad.clone() }),
                None => Ok(()),
            }
        },
        (FieldType::Checkbox, FieldValue::Boolean(checked)) if field.options.is_empty() => {
            if field.required && !checked {
                Err(FormError::MissingRequired(label()))
            } else {
                Ok(())
            }
        },
        _ => Err(mismatch()),
    }
}

fn looks_like_email(text: &str) -> bool {
    let text = text.trim();
    match text.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !text.contains(char::is_whitespace)
        },
        None => false,
    }
}
