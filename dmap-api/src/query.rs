/// Query builder
///
/// Queries one partition of a table or index. The key condition uses fixed
/// placeholders (`#pk`/`:pk`, `#sk`/`:sk`, `:low`/`:high`); the filter is
/// compiled separately into `#nK`/`:vK`, so the two never collide.

use crate::model::Model;
use crate::page::{ModelIter, PageResult};
use dmap_core::error::run;
use dmap_core::executor::{BoundExecutor, QueryInput};
use dmap_core::logging::redact_document;
use dmap_core::serializer::{deserialize_cursor, to_wire_value};
use dmap_core::types::AttributeValue;
use dmap_core::{compile, Condition, Document, Error, IntoCondition, Item, ModelSchema, Result, Value};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

pub struct QueryBuilder<M> {
    schema: Arc<ModelSchema>,
    executor: BoundExecutor,
    index: Option<String>,
    sk_name: Option<String>,
    names: HashMap<String, String>,
    values: Item,
    sk_condition: Option<String>,
    discriminator_filter: Option<String>,
    filter: Option<Condition>,
    limit: Option<usize>,
    forward: bool,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> QueryBuilder<M> {
    pub(crate) fn new(schema: Arc<ModelSchema>, index: Option<&str>, pk: Value) -> Result<Self> {
        let (pk_name, sk_name) = schema.key_names(index)?;
        let mut names = HashMap::new();
        let mut values = Item::new();
        names.insert("#pk".to_string(), pk_name);
        values.insert(":pk".to_string(), to_wire_value(&pk)?);

        let discriminator_filter = discriminator_filter(&schema, &mut names, &mut values);

        Ok(Self {
            schema,
            executor: BoundExecutor::capture(),
            index: index.map(str::to_string),
            sk_name,
            names,
            values,
            sk_condition: None,
            discriminator_filter,
            filter: None,
            limit: None,
            forward: true,
            _model: PhantomData,
        })
    }

    fn sort_key(&self) -> Result<&str> {
        self.sk_name
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument("Index does not have a Sort Key defined.".to_string()))
    }

    // Replaces the sort key predicate, dropping values of the previous one.
    fn with_sk(mut self, expression: &str, operands: Vec<(&str, Value)>) -> Result<Self> {
        let sk_name = self.sort_key()?.to_string();
        for stale in [":sk", ":low", ":high"] {
            self.values.remove(stale);
        }
        self.names.insert("#sk".to_string(), sk_name);
        for (placeholder, value) in operands {
            self.values.insert(placeholder.to_string(), to_wire_value(&value)?);
        }
        self.sk_condition = Some(expression.to_string());
        Ok(self)
    }

    /// Sort key begins with `prefix`
    pub fn starts_with(self, prefix: impl Into<Value>) -> Result<Self> {
        self.with_sk("begins_with(#sk, :sk)", vec![(":sk", prefix.into())])
    }

    /// Sort key within `low..=high`
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Result<Self> {
        self.with_sk(
            "#sk BETWEEN :low AND :high",
            vec![(":low", low.into()), (":high", high.into())],
        )
    }

    pub fn eq(self, value: impl Into<Value>) -> Result<Self> {
        self.with_sk("#sk = :sk", vec![(":sk", value.into())])
    }

    pub fn ne(self, value: impl Into<Value>) -> Result<Self> {
        self.with_sk("#sk <> :sk", vec![(":sk", value.into())])
    }

    pub fn gt(self, value: impl Into<Value>) -> Result<Self> {
        self.with_sk("#sk > :sk", vec![(":sk", value.into())])
    }

    pub fn ge(self, value: impl Into<Value>) -> Result<Self> {
        self.with_sk("#sk >= :sk", vec![(":sk", value.into())])
    }

    pub fn lt(self, value: impl Into<Value>) -> Result<Self> {
        self.with_sk("#sk < :sk", vec![(":sk", value.into())])
    }

    pub fn le(self, value: impl Into<Value>) -> Result<Self> {
        self.with_sk("#sk <= :sk", vec![(":sk", value.into())])
    }

    /// Maximum number of items to yield; also sent as the page size.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Descending sort key order
    pub fn reverse(mut self) -> Self {
        self.forward = false;
        self
    }

    /// Adds a filter, ANDed with any earlier ones.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// [`QueryBuilder::filter`] for raw predicates.
    pub fn try_filter(self, condition: impl IntoCondition) -> Result<Self> {
        Ok(self.filter(condition.into_condition()?))
    }

    /// Switches to another index.
    ///
    /// Key names are resolved again and `#pk` (and `#sk`, if a sort key
    /// predicate was set) re-pointed. The partition value `:pk` is kept as
    /// given at construction.
    pub fn using_index(mut self, index: &str) -> Result<Self> {
        let (pk_name, sk_name) = self.schema.key_names(Some(index))?;
        self.names.insert("#pk".to_string(), pk_name);
        if self.names.contains_key("#sk") {
            if let Some(sk) = &sk_name {
                self.names.insert("#sk".to_string(), sk.clone());
            }
        }
        self.sk_name = sk_name;
        self.index = Some(index.to_string());
        Ok(self)
    }

    /// The request this builder sends for its first page.
    pub fn to_input(&self) -> Result<QueryInput> {
        let mut names = self.names.clone();
        let mut values = self.values.clone();

        let key_condition_expression = match &self.sk_condition {
            Some(sk) => format!("#pk = :pk AND {}", sk),
            None => "#pk = :pk".to_string(),
        };

        let mut filters: Vec<String> = self.discriminator_filter.iter().cloned().collect();
        if let Some(filter) = &self.filter {
            let compiled = compile(filter)?;
            names.extend(compiled.names.unwrap_or_default());
            values.extend(compiled.values.unwrap_or_default());
            filters.push(compiled.expression);
        }
        let filter_expression = (!filters.is_empty()).then(|| filters.join(" AND "));

        debug!(
            model = %self.schema.model_name,
            index = ?self.index,
            key_condition = %key_condition_expression,
            filter = ?filter_expression,
            "query compiled"
        );

        Ok(QueryInput {
            table_name: self.schema.table_name.clone(),
            index_name: self.index.clone(),
            key_condition_expression,
            filter_expression,
            names: Some(names),
            values: Some(values),
            limit: self.limit,
            scan_index_forward: self.forward,
            exclusive_start_key: None,
        })
    }

    fn iter_limited(&self, limit: Option<usize>) -> ModelIter<M> {
        let mut template = match self.to_input() {
            Ok(input) => input,
            Err(error) => return ModelIter::failed(Arc::clone(&self.schema), error),
        };
        template.limit = limit;
        let executor = match self.executor.resolve() {
            Ok(executor) => executor,
            Err(error) => return ModelIter::failed(Arc::clone(&self.schema), error),
        };
        info!(model = %self.schema.model_name, table = %self.schema.table_name, index = ?self.index, "query started");

        let table = self.schema.table_name.clone();
        ModelIter::new(
            Arc::clone(&self.schema),
            limit,
            Box::new(move |start| {
                let mut input = template.clone();
                input.exclusive_start_key = start;
                run(&table, || executor.query(input))
            }),
        )
    }

    /// Lazy iteration over all matching items, across pages.
    pub fn iter(&self) -> ModelIter<M> {
        self.iter_limited(self.limit)
    }

    pub fn all(&self) -> Result<Vec<M>> {
        self.iter().collect()
    }

    /// First matching item. Sends a limit of 1 unless one is set.
    pub fn first(&self) -> Result<Option<M>> {
        self.iter_limited(self.limit.or(Some(1))).next().transpose()
    }

    /// First matching item, failing with [`Error::NoResults`] when there is none.
    pub fn one(&self) -> Result<M> {
        self.first()?.ok_or(Error::NoResults)
    }

    /// Exactly one request, resuming after `cursor`.
    pub fn page(&self, cursor: Option<Document>) -> Result<PageResult<M>> {
        let mut input = self.to_input()?;
        input.exclusive_start_key = cursor.as_ref().map(deserialize_cursor).transpose()?;
        debug!(model = %self.schema.model_name, start = ?cursor.as_ref().map(redact_document), "query page requested");
        let executor = self.executor.resolve()?;
        let output = run(&self.schema.table_name, || executor.query(input))?;
        let page = PageResult::from_output(&self.schema, output)?;
        info!(model = %self.schema.model_name, count = page.count, more = page.has_more(), "query page fetched");
        Ok(page)
    }
}

impl<M: Model> IntoIterator for QueryBuilder<M> {
    type Item = Result<M>;
    type IntoIter = ModelIter<M>;

    fn into_iter(self) -> ModelIter<M> {
        self.iter()
    }
}

/// Seeds `#disc = :disc_val` for registered subtypes.
pub(crate) fn discriminator_filter(
    schema: &ModelSchema,
    names: &mut HashMap<String, String>,
    values: &mut Item,
) -> Option<String> {
    if schema.parent.is_none() {
        return None;
    }
    let field = schema.discriminator_field.as_ref()?;
    let value = schema.discriminator_value.as_ref()?;
    names.insert("#disc".to_string(), field.clone());
    values.insert(":disc_val".to_string(), AttributeValue::S(value.clone()));
    Some("#disc = :disc_val".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmap_core::{Attr, DocumentExt, FieldDef, FieldType, ModelDefinition, SchemaCell, TableConfig};

    impl<M> std::fmt::Debug for QueryBuilder<M> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("QueryBuilder").field("index", &self.index).finish_non_exhaustive()
        }
    }

    #[derive(Debug)]
    struct Message {
        room_id: String,
        timestamp: i64,
    }

    impl Model for Message {
        fn schema() -> Result<Arc<ModelSchema>> {
            static SCHEMA: SchemaCell = SchemaCell::new();
            SCHEMA.get_or_init(|| {
                ModelDefinition::new("Message")
                    .config(TableConfig::new("messages"))
                    .field(FieldDef::new("room_id", FieldType::Str).primary_key())
                    .field(FieldDef::new("timestamp", FieldType::Int).sort_key().gsi_sort_key("by_author"))
                    .field(FieldDef::new("author", FieldType::Str).gsi_partition_key("by_author"))
                    .field(FieldDef::new("topic", FieldType::Str).gsi_partition_key("by_topic"))
                    .build()
            })
        }

        fn to_document(&self) -> Result<Document> {
            let mut doc = Document::new();
            doc.put("room_id", self.room_id.clone());
            doc.put("timestamp", self.timestamp);
            Ok(doc)
        }

        fn from_document(mut doc: Document) -> Result<Self> {
            Ok(Self {
                room_id: doc.take("room_id")?,
                timestamp: doc.take("timestamp")?,
            })
        }
    }

    #[test]
    fn test_key_condition_and_seeds() {
        let input = Message::query("general").unwrap().starts_with("17").unwrap().to_input().unwrap();
        assert_eq!(input.key_condition_expression, "#pk = :pk AND begins_with(#sk, :sk)");
        let names = input.names.unwrap();
        assert_eq!(names["#pk"], "room_id");
        assert_eq!(names["#sk"], "timestamp");
        let values = input.values.unwrap();
        assert_eq!(values[":pk"], AttributeValue::S("general".into()));
        assert!(input.filter_expression.is_none());
        assert!(input.scan_index_forward);
    }

    #[test]
    fn test_last_sort_key_predicate_wins() {
        let input = Message::query("general")
            .unwrap()
            .between(1, 5)
            .unwrap()
            .gt(3)
            .unwrap()
            .to_input()
            .unwrap();
        assert_eq!(input.key_condition_expression, "#pk = :pk AND #sk > :sk");
        let values = input.values.unwrap();
        assert!(!values.contains_key(":low") && !values.contains_key(":high"));
        assert_eq!(values[":sk"], AttributeValue::N("3".into()));
    }

    #[test]
    fn test_sort_key_required() {
        let err = Message::query_index("by_topic", "rust").unwrap().eq("x").unwrap_err();
        assert_eq!(err.to_string(), "Index does not have a Sort Key defined.");
    }

    #[test]
    fn test_unknown_index() {
        let err = Message::query_index("by_mood", "x").unwrap_err();
        assert_eq!(
            err.to_string(),
            "GSI 'by_mood' is not defined on model Message. Available GSIs: ['by_author', 'by_topic']"
        );
    }

    #[test]
    fn test_filters_and_together_after_key() {
        let input = Message::query("general")
            .unwrap()
            .filter(Attr::new("author").eq("ann"))
            .filter(Attr::new("topic").exists())
            .reverse()
            .limit(5)
            .to_input()
            .unwrap();
        assert_eq!(
            input.filter_expression.as_deref(),
            Some("(#n0 = :v0 AND attribute_exists(#n1))")
        );
        assert!(!input.scan_index_forward);
        assert_eq!(input.limit, Some(5));
        let names = input.names.unwrap();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_using_index_keeps_partition_value() {
        let input = Message::query("general")
            .unwrap()
            .ge(10)
            .unwrap()
            .using_index("by_author")
            .unwrap()
            .to_input()
            .unwrap();
        assert_eq!(input.index_name.as_deref(), Some("by_author"));
        let names = input.names.unwrap();
        assert_eq!(names["#pk"], "author");
        assert_eq!(names["#sk"], "timestamp");
        assert_eq!(input.values.unwrap()[":pk"], AttributeValue::S("general".into()));
    }

    #[test]
    fn test_raw_filter_must_be_a_predicate() {
        let err = Message::query("general")
            .unwrap()
            .try_filter(serde_json::json!(42))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidCondition(_)));
    }
}
