//! Descriptor-driven metric codec.
//!
//! Metric samples travel as bare values in schema field order; the receiver
//! needs the matching [`TaskSchema`] to interpret them. This keeps the hot
//! reporting path compact: no tags, no field names on the wire.

use std::collections::BTreeMap;

use crate::core::SpackError;
use crate::wire::{WireReader, WireWriter};

use super::schema::{FieldType, TaskSchema};
use super::value::SpackValue;

/// Field name to sampled value.
pub type MetricValues = BTreeMap<String, SpackValue>;

/// Encode one metric sample against its task schema.
///
/// Every schema field must be present with the declared type; fields the
/// schema does not name are rejected rather than silently dropped.
pub fn serialize_task_metric(
    metric: &MetricValues,
    schema: &TaskSchema,
) -> Result<Vec<u8>, SpackError> {
    for name in metric.keys() {
        if schema.field(name).is_none() {
            return Err(SpackError::UnknownField(name.clone()));
        }
    }

    let mut writer = WireWriter::new();
    for field in &schema.fields {
        let value = metric
            .get(&field.name)
            .ok_or_else(|| SpackError::MissingField(field.name.clone()))?;
        write_bare(&mut writer, value, field.ty, &field.name)?;
    }
    Ok(writer.finish())
}

/// Decode one metric sample against its task schema.
///
/// The input must be consumed exactly.
pub fn deserialize_task_metric(
    bytes: &[u8],
    schema: &TaskSchema,
) -> Result<MetricValues, SpackError> {
    let mut reader = WireReader::new(bytes);
    let mut metric = MetricValues::new();
    for field in &schema.fields {
        let value = read_bare(&mut reader, field.ty)?;
        metric.insert(field.name.clone(), value);
    }
    if !reader.is_empty() {
        return Err(SpackError::TrailingData {
            remaining: reader.remaining(),
        });
    }
    Ok(metric)
}

fn write_bare(
    writer: &mut WireWriter,
    value: &SpackValue,
    ty: FieldType,
    field: &str,
) -> Result<(), SpackError> {
    match (ty, value) {
        (FieldType::Bool, SpackValue::Bool(b)) => writer.write_u8(u8::from(*b)),
        (FieldType::Int, SpackValue::Int(i)) => writer.write_i64(*i),
        (FieldType::Float, SpackValue::Float(f)) => writer.write_f64(*f),
        (FieldType::Str, SpackValue::Str(s)) => writer.write_block(s.as_bytes()),
        (FieldType::Bytes, SpackValue::Bytes(b)) => writer.write_block(b),
        _ => {
            return Err(SpackError::TypeMismatch {
                field: field.to_owned(),
                expected: ty.name(),
            })
        }
    }
    Ok(())
}

fn read_bare(reader: &mut WireReader<'_>, ty: FieldType) -> Result<SpackValue, SpackError> {
    Ok(match ty {
        FieldType::Bool => SpackValue::Bool(reader.read_u8()? != 0),
        FieldType::Int => SpackValue::Int(reader.read_i64()?),
        FieldType::Float => SpackValue::Float(reader.read_f64()?),
        FieldType::Str => {
            let bytes = reader.read_block()?;
            let s = std::str::from_utf8(bytes).map_err(|_| SpackError::InvalidUtf8)?;
            SpackValue::Str(s.to_owned())
        }
        FieldType::Bytes => SpackValue::Bytes(reader.read_block()?.to_vec()),
    })
}
