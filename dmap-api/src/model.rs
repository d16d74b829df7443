/// Model trait and item-level operations
///
/// A model type declares its schema once and converts itself to and from a
/// [`Document`] keyed by field name. Everything else (keys, wire names,
/// expressions, executor calls) is provided here.

use crate::page::PageResult;
use crate::query::QueryBuilder;
use crate::scan::ScanBuilder;
use crate::update::{UpdateBuilder, UpdateOutput};
use dmap_core::error::run;
use dmap_core::executor::{current_executor, DeleteItemInput, GetItemInput, PutItemInput};
use dmap_core::logging::redact_key;
use dmap_core::serializer::{from_wire, to_wire, to_wire_value};
use dmap_core::{
    compile, Attr, Condition, Document, Error, Item, ModelSchema, Result, ReturnValues, UpdateAction, Value,
};
use std::sync::Arc;
use tracing::info;

/// A type stored as items of one table.
///
/// ```ignore
/// impl Model for User {
///     fn schema() -> Result<Arc<ModelSchema>> {
///         static SCHEMA: SchemaCell = SchemaCell::new();
///         SCHEMA.get_or_init(|| {
///             ModelDefinition::new("User")
///                 .config(TableConfig::new("users"))
///                 .field(FieldDef::new("email", FieldType::Str).primary_key())
///                 .build()
///         })
///     }
///     // to_document / from_document
/// }
/// ```
pub trait Model: Sized + 'static {
    /// The resolved schema, built once.
    fn schema() -> Result<Arc<ModelSchema>>;

    /// Field-named document for this instance.
    fn to_document(&self) -> Result<Document>;

    /// Builds an instance from a field-named document.
    fn from_document(doc: Document) -> Result<Self>;

    /// Attribute reference for a declared field.
    fn attr(field: &str) -> Result<Attr> {
        Self::schema()?.attr(field)
    }

    /// Fetch an item by partition key
    fn get(pk: impl Into<Value>) -> Result<Option<Self>> {
        get_item(pk.into(), None)
    }

    /// Fetch an item by partition key and sort key
    fn get_with_sk(pk: impl Into<Value>, sk: impl Into<Value>) -> Result<Option<Self>> {
        get_item(pk.into(), Some(sk.into()))
    }

    /// Like [`Model::get`], failing with [`Error::ItemNotFound`] when absent.
    fn fetch(pk: impl Into<Value>) -> Result<Self> {
        fetch_item(pk.into(), None)
    }

    fn fetch_with_sk(pk: impl Into<Value>, sk: impl Into<Value>) -> Result<Self> {
        fetch_item(pk.into(), Some(sk.into()))
    }

    /// Writes the instance, replacing any item with the same key.
    ///
    /// Null fields are left out, and declared defaults (such as a subtype's
    /// discriminator) are filled in.
    fn save(&self, condition: Option<Condition>) -> Result<()> {
        let schema = Self::schema()?;
        let mut doc = to_wire_names(&schema, self.to_document()?);
        doc.retain(|_, value| !value.is_null());
        schema.apply_defaults(&mut doc);
        let item = to_wire(&doc)?;
        let key = key_of(&schema, &item);

        let compiled = condition.as_ref().map(compile).transpose()?;
        let expression = compiled.as_ref().map(|c| c.expression.clone());
        let input = PutItemInput {
            table_name: schema.table_name.clone(),
            item,
            condition_expression: expression.clone(),
            names: compiled.as_ref().and_then(|c| c.names.clone()),
            values: compiled.and_then(|c| c.values),
        };

        info!(model = %schema.model_name, table = %schema.table_name, key = %redact_key(&key), "saving item");
        let executor = current_executor()?;
        run(&schema.table_name, || executor.put_item(input))
            .map_err(|e| attach_condition(e, expression.as_deref()))?;
        info!(model = %schema.model_name, key = %redact_key(&key), "item saved");
        Ok(())
    }

    /// Delete an item by partition key
    fn delete(pk: impl Into<Value>, condition: Option<Condition>) -> Result<()> {
        let schema = Self::schema()?;
        let key = build_key(&schema, pk.into(), None)?;
        delete_key(&schema, key, condition)
    }

    /// Delete an item by partition key and sort key
    fn delete_with_sk(pk: impl Into<Value>, sk: impl Into<Value>, condition: Option<Condition>) -> Result<()> {
        let schema = Self::schema()?;
        let key = build_key(&schema, pk.into(), Some(sk.into()))?;
        delete_key(&schema, key, condition)
    }

    /// Deletes the item this instance was read from.
    fn delete_item(&self, condition: Option<Condition>) -> Result<()> {
        let schema = Self::schema()?;
        let key = instance_key(&schema, self)?;
        delete_key(&schema, key, condition)
    }

    /// Starts an update of the item with this partition key.
    fn update(pk: impl Into<Value>) -> Result<UpdateBuilder<Self>> {
        let schema = Self::schema()?;
        let key = build_key(&schema, pk.into(), None)?;
        Ok(UpdateBuilder::new(schema, key))
    }

    fn update_with_sk(pk: impl Into<Value>, sk: impl Into<Value>) -> Result<UpdateBuilder<Self>> {
        let schema = Self::schema()?;
        let key = build_key(&schema, pk.into(), Some(sk.into()))?;
        Ok(UpdateBuilder::new(schema, key))
    }

    /// Starts an update of the item this instance was read from.
    fn patch(&self) -> Result<UpdateBuilder<Self>> {
        let schema = Self::schema()?;
        let key = instance_key(&schema, self)?;
        Ok(UpdateBuilder::new(schema, key))
    }

    /// Applies `actions` to the item identified by `key` in one call.
    fn update_item(
        key: Document,
        actions: Vec<UpdateAction>,
        condition: Option<Condition>,
        return_values: ReturnValues,
    ) -> Result<UpdateOutput<Self>> {
        let schema = Self::schema()?;
        let mut key = to_wire_names(&schema, key);
        let pk = key
            .remove(&schema.pk_name)
            .filter(|v| !v.is_blank())
            .ok_or_else(|| Error::InvalidArgument(format!("Key missing partition key '{}'", schema.pk_name)))?;
        let sk = schema.sk_name.as_ref().and_then(|name| key.remove(name));
        let key = build_key(&schema, pk, sk)?;

        let mut builder = UpdateBuilder::new(schema, key).actions(actions).return_values(return_values);
        if let Some(condition) = condition {
            builder = builder.condition(condition);
        }
        builder.execute()
    }

    fn query(pk: impl Into<Value>) -> Result<QueryBuilder<Self>> {
        QueryBuilder::new(Self::schema()?, None, pk.into())
    }

    fn query_index(index: &str, pk: impl Into<Value>) -> Result<QueryBuilder<Self>> {
        QueryBuilder::new(Self::schema()?, Some(index), pk.into())
    }

    fn scan() -> Result<ScanBuilder<Self>> {
        ScanBuilder::new(Self::schema()?, None)
    }

    fn scan_index(index: &str) -> Result<ScanBuilder<Self>> {
        ScanBuilder::new(Self::schema()?, Some(index))
    }

    /// One page of a scan, resuming after `start_key`.
    fn scan_page(limit: Option<usize>, start_key: Option<Document>, index: Option<&str>) -> Result<PageResult<Self>> {
        let mut scan = ScanBuilder::new(Self::schema()?, index)?;
        if let Some(limit) = limit {
            scan = scan.limit(limit);
        }
        scan.page(start_key)
    }
}

/// Renames declared fields to their wire names. Undeclared keys pass through.
pub(crate) fn to_wire_names(schema: &ModelSchema, doc: Document) -> Document {
    doc.into_iter()
        .map(|(name, value)| {
            let wire = schema.field(&name).map(|f| f.wire_name().to_string()).unwrap_or(name);
            (wire, value)
        })
        .collect()
}

/// Inverse of [`to_wire_names`].
pub(crate) fn to_field_names(schema: &ModelSchema, doc: Document) -> Document {
    doc.into_iter()
        .map(|(wire, value)| {
            let name = schema.field_by_wire_name(&wire).map(|f| f.name.clone()).unwrap_or(wire);
            (name, value)
        })
        .collect()
}

/// Builds a model instance from a stored item, resolving registered subtypes.
pub(crate) fn decode<M: Model>(schema: &ModelSchema, item: &Item) -> Result<M> {
    let doc = from_wire(item)?;
    schema.resolve(doc, |doc| M::from_document(to_field_names(schema, doc)))
}

/// Store key for the given values. The sort key is only included when the
/// schema has one and the value is not blank.
pub(crate) fn build_key(schema: &ModelSchema, pk: Value, sk: Option<Value>) -> Result<Item> {
    if pk.is_blank() {
        return Err(Error::InvalidArgument(format!(
            "Key missing partition key '{}'",
            schema.pk_name
        )));
    }
    let mut key = Item::new();
    key.insert(schema.pk_name.clone(), to_wire_value(&pk)?);
    if let (Some(sk_name), Some(sk)) = (&schema.sk_name, sk) {
        if !sk.is_blank() {
            key.insert(sk_name.clone(), to_wire_value(&sk)?);
        }
    }
    Ok(key)
}

fn instance_key<M: Model>(schema: &ModelSchema, instance: &M) -> Result<Item> {
    let mut doc = to_wire_names(schema, instance.to_document()?);
    let pk = doc.remove(&schema.pk_name).unwrap_or(Value::Null);
    let sk = schema.sk_name.as_ref().and_then(|name| doc.remove(name));
    build_key(schema, pk, sk)
}

fn key_of(schema: &ModelSchema, item: &Item) -> Item {
    std::iter::once(&schema.pk_name)
        .chain(schema.sk_name.as_ref())
        .filter_map(|name| item.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

pub(crate) fn attach_condition(err: Error, expression: Option<&str>) -> Error {
    match err {
        Error::ConditionalCheckFailed { condition: None, source } => Error::ConditionalCheckFailed {
            condition: expression.map(str::to_string),
            source,
        },
        other => other,
    }
}

fn get_item<M: Model>(pk: Value, sk: Option<Value>) -> Result<Option<M>> {
    let schema = M::schema()?;
    let key = build_key(&schema, pk, sk)?;
    let redacted = redact_key(&key);
    info!(model = %schema.model_name, table = %schema.table_name, key = %redacted, "getting item");

    let executor = current_executor()?;
    let input = GetItemInput {
        table_name: schema.table_name.clone(),
        key,
    };
    let output = run(&schema.table_name, || executor.get_item(input))?;
    info!(model = %schema.model_name, key = %redacted, found = output.item.is_some(), "get finished");
    output.item.map(|item| decode(&schema, &item)).transpose()
}

fn fetch_item<M: Model>(pk: Value, sk: Option<Value>) -> Result<M> {
    let schema = M::schema()?;
    let key = build_key(&schema, pk.clone(), sk.clone())?;
    get_item(pk, sk)?.ok_or_else(|| Error::ItemNotFound { key: redact_key(&key) })
}

fn delete_key(schema: &ModelSchema, key: Item, condition: Option<Condition>) -> Result<()> {
    let redacted = redact_key(&key);
    let compiled = condition.as_ref().map(compile).transpose()?;
    let expression = compiled.as_ref().map(|c| c.expression.clone());
    let input = DeleteItemInput {
        table_name: schema.table_name.clone(),
        key,
        condition_expression: expression.clone(),
        names: compiled.as_ref().and_then(|c| c.names.clone()),
        values: compiled.and_then(|c| c.values),
    };

    info!(model = %schema.model_name, table = %schema.table_name, key = %redacted, "deleting item");
    let executor = current_executor()?;
    run(&schema.table_name, || executor.delete_item(input))
        .map_err(|e| attach_condition(e, expression.as_deref()))?;
    info!(model = %schema.model_name, key = %redacted, "item deleted");
    Ok(())
}
