//! Record schemas: the explicit field table each record type registers.
//!
//! A [`Record`] describes its columns once, through [`Record::schema()`], as an
//! ordered list of [`FieldDescriptor`]s. Each descriptor pairs a column name
//! with an accessor, and optionally with a setter that lets the inference
//! engine write a prediction back into the record.
//!
//! The declaration order is the column order everywhere: it becomes the table
//! column order and, for the gradient boosting variant, the order of the
//! features fed to the concatenate stage.
//!
//! # Example
//!
//! ```
//! use intent_learning::{FieldDescriptor, Record, RecordSchema};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Review {
//!     label: bool,
//!     text: String,
//! }
//!
//! impl Record for Review {
//!     fn schema() -> RecordSchema<Self> {
//!         RecordSchema::new("Review")
//!             .field(
//!                 FieldDescriptor::boolean("Label", |r: &Review| r.label)
//!                     .writable(|r, p| r.label = p.predicted_label),
//!             )
//!             .field(FieldDescriptor::text("Text", |r: &Review| r.text.clone()))
//!     }
//! }
//!
//! let names = intent_learning::reflect_field_names::<Review>().unwrap();
//! assert_eq!(names, vec!["Label", "Text"]);
//! ```

use std::fmt;

use crate::error::{IntentError, Result};
use crate::types::RawPrediction;

/// Column type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// 32-bit float column.
    Numeric,
    /// Boolean column; converted to 0/1 when used as a feature or label.
    Boolean,
    /// Free-text column.
    Text,
    /// Precomputed feature vector, stored as a list column.
    Vector,
}

/// Read access to one field, typed by column kind.
pub(crate) enum Accessor<R> {
    Numeric(fn(&R) -> f32),
    Boolean(fn(&R) -> bool),
    Text(fn(&R) -> String),
    Vector(fn(&R) -> Vec<f32>),
}

/// Writes a prediction into a record field.
pub type LabelSetter<R> = fn(&mut R, &RawPrediction);

/// One named column of a record type.
pub struct FieldDescriptor<R> {
    name: &'static str,
    accessor: Accessor<R>,
    setter: Option<LabelSetter<R>>,
}

impl<R> FieldDescriptor<R> {
    /// A numeric column.
    pub fn numeric(name: &'static str, get: fn(&R) -> f32) -> Self {
        Self {
            name,
            accessor: Accessor::Numeric(get),
            setter: None,
        }
    }

    /// A boolean column.
    pub fn boolean(name: &'static str, get: fn(&R) -> bool) -> Self {
        Self {
            name,
            accessor: Accessor::Boolean(get),
            setter: None,
        }
    }

    /// A free-text column.
    pub fn text(name: &'static str, get: fn(&R) -> String) -> Self {
        Self {
            name,
            accessor: Accessor::Text(get),
            setter: None,
        }
    }

    /// A precomputed feature vector column.
    pub fn vector(name: &'static str, get: fn(&R) -> Vec<f32>) -> Self {
        Self {
            name,
            accessor: Accessor::Vector(get),
            setter: None,
        }
    }

    /// Mark the field writable so predictions can be stored into it.
    #[must_use]
    pub fn writable(mut self, set: LabelSetter<R>) -> Self {
        self.setter = Some(set);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        match self.accessor {
            Accessor::Numeric(_) => FieldKind::Numeric,
            Accessor::Boolean(_) => FieldKind::Boolean,
            Accessor::Text(_) => FieldKind::Text,
            Accessor::Vector(_) => FieldKind::Vector,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    pub(crate) fn accessor(&self) -> &Accessor<R> {
        &self.accessor
    }

    pub(crate) fn setter(&self) -> Option<LabelSetter<R>> {
        self.setter
    }
}

impl<R> fmt::Debug for FieldDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// The ordered field table of a record type.
pub struct RecordSchema<R> {
    record: &'static str,
    fields: Vec<FieldDescriptor<R>>,
}

impl<R> RecordSchema<R> {
    /// Start an empty schema for the record type called `record`.
    pub fn new(record: &'static str) -> Self {
        Self {
            record,
            fields: Vec::new(),
        }
    }

    /// Append a field. Declaration order is preserved.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor<R>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn record_name(&self) -> &'static str {
        self.record
    }

    pub fn fields(&self) -> &[FieldDescriptor<R>] {
        &self.fields
    }

    /// Look up a field by its column name (case-sensitive).
    pub fn find(&self, name: &str) -> Option<&FieldDescriptor<R>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<R> fmt::Debug for RecordSchema<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSchema")
            .field("record", &self.record)
            .field("fields", &self.fields)
            .finish()
    }
}

/// A caller-defined training/inference example.
///
/// Implementors list their columns once; the crate never inspects the type
/// any other way.
pub trait Record: Sized {
    /// The record's field table, in declaration order.
    fn schema() -> RecordSchema<Self>;
}

/// Ordered public field names of `R`.
///
/// # Errors
///
/// Returns [`IntentError::SchemaEmpty`] when `R` registers no fields.
pub fn reflect_field_names<R: Record>() -> Result<Vec<String>> {
    let schema = R::schema();
    if schema.is_empty() {
        return Err(IntentError::SchemaEmpty {
            record: schema.record_name().to_string(),
        });
    }
    Ok(schema.field_names())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Default)]
    struct Row {
        val1: f32,
        val2: f32,
        val3: f32,
        label: f32,
    }

    impl Record for Row {
        fn schema() -> RecordSchema<Self> {
            RecordSchema::new("Row")
                .field(FieldDescriptor::numeric("Val1", |r: &Row| r.val1))
                .field(FieldDescriptor::numeric("Val2", |r: &Row| r.val2))
                .field(FieldDescriptor::numeric("Val3", |r: &Row| r.val3))
                .field(
                    FieldDescriptor::numeric("Label", |r: &Row| r.label)
                        .writable(|r, p| r.label = p.score),
                )
        }
    }

    struct Empty;

    impl Record for Empty {
        fn schema() -> RecordSchema<Self> {
            RecordSchema::new("Empty")
        }
    }

    #[test]
    fn test_declaration_order() {
        let names = reflect_field_names::<Row>().unwrap();
        assert_eq!(names, vec!["Val1", "Val2", "Val3", "Label"]);
    }

    #[test]
    fn test_reflection_is_deterministic() {
        let first = reflect_field_names::<Row>().unwrap();
        let second = reflect_field_names::<Row>().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_schema() {
        let err = reflect_field_names::<Empty>().unwrap_err();
        assert!(matches!(err, IntentError::SchemaEmpty { ref record } if record == "Empty"));
    }

    #[test]
    fn test_find_and_writable() {
        let schema = Row::schema();
        assert!(schema.find("Label").unwrap().is_writable());
        assert!(!schema.find("Val1").unwrap().is_writable());
        assert!(schema.find("label").is_none());
        assert_eq!(schema.find("Val2").unwrap().kind(), FieldKind::Numeric);
    }
}
