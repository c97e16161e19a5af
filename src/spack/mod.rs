//! SPACK: the self-describing binary object format.
//!
//! Three codecs share this module:
//! - [`SpackValue`] with [`serialize_spack`]/[`deserialize_spack`]: the
//!   general tagged value graph,
//! - [`pack_task_schemas`]/[`unpack_task_schemas`]: the packed schema
//!   collection distributed to receivers,
//! - [`serialize_task_metric`]/[`deserialize_task_metric`]: the compact
//!   descriptor-bound sample encoding.

mod metric;
mod schema;
mod value;

pub use metric::{deserialize_task_metric, serialize_task_metric, MetricValues};
pub use schema::{
    is_task_collection, pack_task_schemas, unpack_task_schemas, FieldType, TaskConfig, TaskField,
    TaskSchema,
};
pub use value::{deserialize_spack, serialize_spack, SpackValue};
