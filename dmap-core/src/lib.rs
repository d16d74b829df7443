pub mod error;
pub mod types;
pub mod value;
pub mod serializer;
pub mod condition;
pub mod validation;
pub mod schema;
pub mod update;
pub mod executor;
pub mod expression; // request-side evaluation, used by the memory executor
pub mod memory;
pub mod config;
pub mod logging;

pub use error::{translate, Error, Fault, Result};
pub use types::{AttributeValue, Item};
pub use value::{Document, DocumentExt, FromValue, Number, Value};
pub use condition::{compile, Attr, CompiledExpression, Condition, IntoCondition, Operator, RawPredicate};
pub use validation::FieldType;
pub use schema::{
    Decoder, EntityRegistry, FieldDef, IndexDefinition, KeyMarker, ModelDefinition, ModelSchema, Registrar,
    SchemaCell, TableConfig, DEFAULT_REGION,
};
pub use update::{compile_update, CompiledUpdate, ReturnValues, UpdateAction};
pub use executor::{current_executor, set_default_executor, clear_default_executor, using_executor, ExecutorGuard, RequestExecutor};
pub use memory::{MemoryExecutor, TableKeys};
pub use config::ClientConfig;
