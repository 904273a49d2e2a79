// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Model markform records: named fields with controls and values.
// Author: Lukas Bower

//! Markform, a form language embedded in markdown.
//!
//! A form *control* is one record field rendered as a line suffix:
//!
//! | control | rendered |
//! |---|---|
//! | free text | `Field = value___` |
//! | bounded text | `Field = value___[40]` |
//! | flag | `Field = [x]` or `Field = []` |
//! | radio | `Field = (x) open () closed` |
//! | multi-check | `Field = [x] bug [] docs` |
//! | list | `Field = ,, one ,, two ,, ___` |
//! | timestamp | `Field = 2010-01-02T15:04:05Z` |
//!
//! A `*` after the field name marks it required. Records are edited with
//! plain text tools; [`marshal`] renders a field, [`unmarshal`] reads an
//! edited document back. Unknown fields and malformed lines are ignored so
//! a stray edit never poisons the whole document.

mod marshal;
mod unmarshal;

pub use marshal::marshal;
pub use unmarshal::unmarshal;

use chrono::{DateTime, Utc};

use crate::error::{FsError, Result};

/// The kind of form control a field renders as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Free text terminated by `___`, optionally clipped to a limit.
    Text {
        /// Maximum number of characters kept, when bounded.
        limit: Option<usize>,
    },
    /// A single checkbox mapping to a boolean.
    Flag,
    /// One choice among fixed options.
    Radio {
        /// The options, in render order.
        options: Vec<String>,
    },
    /// Any number of choices among fixed options.
    Check {
        /// The options, in render order.
        options: Vec<String>,
    },
    /// User-defined list of values.
    List,
    /// An RFC3339 timestamp.
    Time,
}

/// A field's current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Free text.
    Text(String),
    /// Checkbox state.
    Flag(bool),
    /// Selected radio option; empty when none is selected.
    Choice(String),
    /// Selected multi-check options.
    Picks(Vec<String>),
    /// User-defined list items.
    Items(Vec<String>),
    /// Timestamp, when set.
    Time(Option<DateTime<Utc>>),
}

/// One record field: control, requiredness, and current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Whether the field must carry a value.
    pub required: bool,
    /// The control this field renders as.
    pub control: Control,
    /// The current value.
    pub value: Value,
}

impl Field {
    /// Unbounded text field.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            required: false,
            control: Control::Text { limit: None },
            value: Value::Text(value.into()),
        }
    }

    /// Text field clipped to `limit` characters.
    pub fn text_limited(limit: usize, value: impl Into<String>) -> Self {
        Self {
            required: false,
            control: Control::Text { limit: Some(limit) },
            value: Value::Text(value.into()),
        }
    }

    /// Boolean checkbox.
    #[must_use]
    pub fn flag(value: bool) -> Self {
        Self { required: false, control: Control::Flag, value: Value::Flag(value) }
    }

    /// Radio group over `options` with `choice` selected (may be empty).
    pub fn radio(options: &[&str], choice: impl Into<String>) -> Self {
        Self {
            required: false,
            control: Control::Radio { options: options.iter().map(|s| s.to_string()).collect() },
            value: Value::Choice(choice.into()),
        }
    }

    /// Multi-check group over `options` with `picks` selected.
    #[must_use]
    pub fn check(options: &[&str], picks: &[&str]) -> Self {
        Self {
            required: false,
            control: Control::Check { options: options.iter().map(|s| s.to_string()).collect() },
            value: Value::Picks(picks.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// User-defined list with the given items.
    #[must_use]
    pub fn list(items: &[&str]) -> Self {
        Self {
            required: false,
            control: Control::List,
            value: Value::Items(items.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Timestamp field.
    #[must_use]
    pub fn time(value: Option<DateTime<Utc>>) -> Self {
        Self { required: false, control: Control::Time, value: Value::Time(value) }
    }

    /// Mark the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn has_value(&self) -> bool {
        match &self.value {
            Value::Text(text) => !text.is_empty(),
            Value::Flag(_) => true,
            Value::Choice(choice) => !choice.is_empty(),
            Value::Picks(picks) => !picks.is_empty(),
            Value::Items(items) => !items.is_empty(),
            Value::Time(time) => time.is_some(),
        }
    }
}

/// An ordered set of named fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, Field)>,
}

impl Record {
    /// Empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field; builder style.
    #[must_use]
    pub fn field(mut self, name: &str, field: Field) -> Self {
        self.fields.push((name.to_string(), field));
        self
    }

    /// Look up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Look up a field by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Text or radio value of a field, when it has one.
    #[must_use]
    pub fn text_value(&self, name: &str) -> Option<&str> {
        match &self.get(name)?.value {
            Value::Text(text) => Some(text),
            Value::Choice(choice) => Some(choice),
            _ => None,
        }
    }

    /// Flag value of a field.
    #[must_use]
    pub fn flag_value(&self, name: &str) -> Option<bool> {
        match &self.get(name)?.value {
            Value::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    /// List or multi-check values of a field.
    #[must_use]
    pub fn items_value(&self, name: &str) -> Option<&[String]> {
        match &self.get(name)?.value {
            Value::Picks(picks) => Some(picks),
            Value::Items(items) => Some(items),
            _ => None,
        }
    }

    /// Timestamp value of a field.
    #[must_use]
    pub fn time_value(&self, name: &str) -> Option<DateTime<Utc>> {
        match &self.get(name)?.value {
            Value::Time(time) => *time,
            _ => None,
        }
    }

    /// Check that every required field carries a value.
    pub fn validate(&self) -> Result<()> {
        for (name, field) in &self.fields {
            if field.required && !field.has_value() {
                return Err(FsError::Codec(format!("required field {name} is missing")));
            }
        }
        Ok(())
    }

    /// The same record with every value reset to its empty state. Used as
    /// the unmarshal target when diffing an edited document against a
    /// snapshot.
    #[must_use]
    pub fn blank(&self) -> Self {
        let mut out = self.clone();
        for (_, field) in &mut out.fields {
            field.value = match &field.value {
                Value::Text(_) => Value::Text(String::new()),
                Value::Flag(_) => Value::Flag(false),
                Value::Choice(_) => Value::Choice(String::new()),
                Value::Picks(_) => Value::Picks(Vec::new()),
                Value::Items(_) => Value::Items(Vec::new()),
                Value::Time(_) => Value::Time(None),
            };
        }
        out
    }
}
