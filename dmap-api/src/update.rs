/// Update builder
///
/// Collects [`UpdateAction`]s for one item and sends them as a single
/// UpdateItem request. Values are validated before anything is sent.

use crate::model::{attach_condition, decode, Model};
use dmap_core::error::run;
use dmap_core::executor::{BoundExecutor, UpdateItemInput};
use dmap_core::logging::redact_key;
use dmap_core::{compile_update, Condition, IntoCondition, Item, ModelSchema, Result, ReturnValues, UpdateAction, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

/// Result of an update
#[derive(Debug)]
pub struct UpdateOutput<M> {
    /// The updated item, only for [`ReturnValues::AllNew`]
    pub item: Option<M>,
    /// Attributes as returned by the store
    pub attributes: Option<Item>,
}

pub struct UpdateBuilder<M> {
    schema: Arc<ModelSchema>,
    executor: BoundExecutor,
    key: Item,
    actions: Vec<UpdateAction>,
    condition: Option<Condition>,
    return_values: ReturnValues,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> UpdateBuilder<M> {
    pub(crate) fn new(schema: Arc<ModelSchema>, key: Item) -> Self {
        Self {
            schema,
            executor: BoundExecutor::capture(),
            key,
            actions: Vec::new(),
            condition: None,
            return_values: ReturnValues::None,
            _model: PhantomData,
        }
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.actions.push(UpdateAction::Set(field.to_string(), value.into()));
        self
    }

    pub fn remove(mut self, field: &str) -> Self {
        self.actions.push(UpdateAction::Remove(field.to_string()));
        self
    }

    /// Numeric increment, or union for sets
    pub fn add(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.actions.push(UpdateAction::Add(field.to_string(), value.into()));
        self
    }

    /// Removes elements from a set
    pub fn delete(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.actions.push(UpdateAction::Delete(field.to_string(), value.into()));
        self
    }

    pub(crate) fn actions(mut self, actions: Vec<UpdateAction>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Requires `condition` to hold on the stored item. Repeated calls AND together.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn try_condition(self, condition: impl IntoCondition) -> Result<Self> {
        Ok(self.condition(condition.into_condition()?))
    }

    pub fn return_values(mut self, return_values: ReturnValues) -> Self {
        self.return_values = return_values;
        self
    }

    /// The request this builder would send.
    pub fn to_input(&self) -> Result<UpdateItemInput> {
        let compiled = compile_update(&self.schema, &self.actions, self.condition.as_ref())?;
        Ok(UpdateItemInput {
            table_name: self.schema.table_name.clone(),
            key: self.key.clone(),
            update_expression: compiled.update_expression,
            condition_expression: compiled.condition_expression,
            names: compiled.names,
            values: compiled.values,
            return_values: Some(self.return_values.as_str().to_string()),
        })
    }

    pub fn execute(self) -> Result<UpdateOutput<M>> {
        let input = self.to_input()?;
        let expression = input.condition_expression.clone();
        let redacted = redact_key(&self.key);
        info!(
            model = %self.schema.model_name,
            table = %self.schema.table_name,
            key = %redacted,
            actions = self.actions.len(),
            "updating item"
        );

        let executor = self.executor.resolve()?;
        let output = run(&self.schema.table_name, || executor.update_item(input))
            .map_err(|e| attach_condition(e, expression.as_deref()))?;
        info!(model = %self.schema.model_name, key = %redacted, "item updated");

        let item = match (&self.return_values, &output.attributes) {
            (ReturnValues::AllNew, Some(attributes)) => Some(decode::<M>(&self.schema, attributes)?),
            _ => None,
        };
        Ok(UpdateOutput {
            item,
            attributes: output.attributes,
        })
    }
}
