//! Task schemas and their packed SPACK form.
//!
//! A schema fixes the names, types, and order of the fields a task reports.
//! Field order is significant: it is the wire order of the metric codec.
//!
//! The packed form is a SPACK map from task name to an array of
//! `[Str name, Int typeTag]` pairs, which preserves field order (a map of
//! field name to type would not).

use std::collections::BTreeMap;

use crate::core::SpackError;

use super::value::SpackValue;

/// The type of a single metric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Boolean flag.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// IEEE-754 double.
    Float,
    /// UTF-8 string.
    Str,
    /// Opaque bytes.
    Bytes,
}

impl FieldType {
    /// The packed tag, equal to the corresponding SPACK value tag.
    pub fn tag(self) -> u8 {
        match self {
            FieldType::Bool => 0x01,
            FieldType::Int => 0x02,
            FieldType::Float => 0x03,
            FieldType::Str => 0x04,
            FieldType::Bytes => 0x05,
        }
    }

    /// Parse a packed tag.
    pub fn from_tag(tag: i64) -> Option<Self> {
        match tag {
            0x01 => Some(FieldType::Bool),
            0x02 => Some(FieldType::Int),
            0x03 => Some(FieldType::Float),
            0x04 => Some(FieldType::Str),
            0x05 => Some(FieldType::Bytes),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Str => "str",
            FieldType::Bytes => "bytes",
        }
    }
}

/// One named, typed field of a task schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskField {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: FieldType,
}

impl TaskField {
    /// Create a field.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// The ordered field list a task reports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskSchema {
    /// Fields in wire order.
    pub fields: Vec<TaskField>,
}

impl TaskSchema {
    /// Create a schema from ordered fields.
    pub fn new(fields: Vec<TaskField>) -> Self {
        Self { fields }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&TaskField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Task name to schema, as distributed over the wire and as bound on the
/// receiver for metric decoding.
pub type TaskConfig = BTreeMap<String, TaskSchema>;

/// Pack a schema collection into its SPACK form.
pub fn pack_task_schemas(config: &TaskConfig) -> SpackValue {
    let entries = config
        .iter()
        .map(|(task, schema)| {
            let fields = schema
                .fields
                .iter()
                .map(|f| {
                    SpackValue::Array(vec![
                        SpackValue::Str(f.name.clone()),
                        SpackValue::Int(i64::from(f.ty.tag())),
                    ])
                })
                .collect();
            (task.clone(), SpackValue::Array(fields))
        })
        .collect();
    SpackValue::Map(entries)
}

/// Unpack a SPACK value into a schema collection.
pub fn unpack_task_schemas(value: &SpackValue) -> Result<TaskConfig, SpackError> {
    let entries = value.as_map().ok_or(SpackError::NotTaskCollection)?;

    let mut config = TaskConfig::new();
    for (task, packed) in entries {
        let pairs = packed.as_array().ok_or(SpackError::NotTaskCollection)?;
        let mut fields = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let pair = pair.as_array().ok_or(SpackError::NotTaskCollection)?;
            let (name, tag) = match pair {
                [name, tag] => (
                    name.as_str().ok_or(SpackError::NotTaskCollection)?,
                    tag.as_int().ok_or(SpackError::NotTaskCollection)?,
                ),
                _ => return Err(SpackError::NotTaskCollection),
            };
            let ty = FieldType::from_tag(tag).ok_or(SpackError::UnknownFieldType(tag))?;
            fields.push(TaskField::new(name, ty));
        }
        config.insert(task.clone(), TaskSchema::new(fields));
    }
    Ok(config)
}

/// Whether a value has the shape of a packed task collection.
pub fn is_task_collection(value: &SpackValue) -> bool {
    unpack_task_schemas(value).is_ok()
}
