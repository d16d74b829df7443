/// Scan builder
///
/// Reads a whole table or index, optionally filtered. Same iteration and
/// paging contract as [`crate::QueryBuilder`], without key conditions.

use crate::model::Model;
use crate::page::{ModelIter, PageResult};
use crate::query::discriminator_filter;
use dmap_core::error::run;
use dmap_core::executor::{BoundExecutor, ScanInput};
use dmap_core::logging::redact_document;
use dmap_core::serializer::deserialize_cursor;
use dmap_core::{compile, Condition, Document, Error, IntoCondition, Item, ModelSchema, Result};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ScanBuilder<M> {
    schema: Arc<ModelSchema>,
    executor: BoundExecutor,
    index: Option<String>,
    names: HashMap<String, String>,
    values: Item,
    discriminator_filter: Option<String>,
    filter: Option<Condition>,
    limit: Option<usize>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> ScanBuilder<M> {
    pub(crate) fn new(schema: Arc<ModelSchema>, index: Option<&str>) -> Result<Self> {
        if let Some(index) = index {
            schema.require_index(index)?;
        }
        let mut names = HashMap::new();
        let mut values = Item::new();
        let discriminator_filter = discriminator_filter(&schema, &mut names, &mut values);
        Ok(Self {
            schema,
            executor: BoundExecutor::capture(),
            index: index.map(str::to_string),
            names,
            values,
            discriminator_filter,
            filter: None,
            limit: None,
            _model: PhantomData,
        })
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn try_filter(self, condition: impl IntoCondition) -> Result<Self> {
        Ok(self.filter(condition.into_condition()?))
    }

    pub fn using_index(mut self, index: &str) -> Result<Self> {
        self.schema.require_index(index)?;
        self.index = Some(index.to_string());
        Ok(self)
    }

    /// The request this builder sends for its first page.
    pub fn to_input(&self) -> Result<ScanInput> {
        let mut names = self.names.clone();
        let mut values = self.values.clone();
        let mut filters: Vec<String> = self.discriminator_filter.iter().cloned().collect();
        if let Some(filter) = &self.filter {
            let compiled = compile(filter)?;
            names.extend(compiled.names.unwrap_or_default());
            values.extend(compiled.values.unwrap_or_default());
            filters.push(compiled.expression);
        }
        let filter_expression = (!filters.is_empty()).then(|| filters.join(" AND "));
        debug!(model = %self.schema.model_name, index = ?self.index, filter = ?filter_expression, "scan compiled");

        Ok(ScanInput {
            table_name: self.schema.table_name.clone(),
            index_name: self.index.clone(),
            filter_expression,
            names: (!names.is_empty()).then_some(names),
            values: (!values.is_empty()).then_some(values),
            limit: self.limit,
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
        info!(model = %self.schema.model_name, table = %self.schema.table_name, index = ?self.index, "scan started");

        let table = self.schema.table_name.clone();
        ModelIter::new(
            Arc::clone(&self.schema),
            limit,
            Box::new(move |start| {
                let mut input = template.clone();
                input.exclusive_start_key = start;
                run(&table, || executor.scan(input))
            }),
        )
    }

    pub fn iter(&self) -> ModelIter<M> {
        self.iter_limited(self.limit)
    }

    pub fn all(&self) -> Result<Vec<M>> {
        self.iter().collect()
    }

    pub fn first(&self) -> Result<Option<M>> {
        self.iter_limited(self.limit.or(Some(1))).next().transpose()
    }

    pub fn one(&self) -> Result<M> {
        self.first()?.ok_or(Error::NoResults)
    }

    pub fn page(&self, cursor: Option<Document>) -> Result<PageResult<M>> {
        let mut input = self.to_input()?;
        input.exclusive_start_key = cursor.as_ref().map(deserialize_cursor).transpose()?;
        debug!(model = %self.schema.model_name, start = ?cursor.as_ref().map(redact_document), "scan page requested");
        let executor = self.executor.resolve()?;
        let output = run(&self.schema.table_name, || executor.scan(input))?;
        let page = PageResult::from_output(&self.schema, output)?;
        info!(model = %self.schema.model_name, count = page.count, more = page.has_more(), "scan page fetched");
        Ok(page)
    }
}

impl<M: Model> IntoIterator for ScanBuilder<M> {
    type Item = Result<M>;
    type IntoIter = ModelIter<M>;

    fn into_iter(self) -> ModelIter<M> {
        self.iter()
    }
}
