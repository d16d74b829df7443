//! Typed models over DynamoDB tables.
//!
//! Implement [`Model`] for a type, install a request executor, and use the
//! item operations and builders on the type.

use std::sync::Arc;

pub use dmap_core::{
    clear_default_executor, current_executor, set_default_executor, using_executor, Attr, AttributeValue,
    ClientConfig, Condition, Decoder, Document, DocumentExt, Error, ExecutorGuard, FieldDef, FieldType,
    FromValue, IntoCondition, Item, MemoryExecutor, ModelDefinition, ModelSchema, Number, RawPredicate,
    RequestExecutor, Result, ReturnValues, SchemaCell, TableConfig, TableKeys, UpdateAction, Value,
};

pub mod model;
pub use model::Model;

pub mod page;
pub use page::{ModelIter, PageResult};

pub mod query;
pub use query::QueryBuilder;

pub mod scan;
pub use scan::ScanBuilder;

pub mod update;
pub use update::{UpdateBuilder, UpdateOutput};

/// Registers subtype `S` of polymorphic base `B` under a discriminator value.
///
/// Call this from `S::schema()`. Reads through `B` resolve items carrying
/// `value` to `S`, converted with `B::from`, once `S::schema()` has run.
pub fn register<B, S>(value: &str, definition: ModelDefinition) -> Result<ModelSchema>
where
    B: Model + From<S>,
    S: Model,
{
    let base = B::schema()?;
    let decoder: Decoder<B> = Arc::new(|doc: Document| -> Result<B> {
        let schema = S::schema()?;
        S::from_document(model::to_field_names(&schema, doc)).map(B::from)
    });
    base.register(value)?.finalize(definition, decoder)
}
