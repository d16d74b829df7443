/// In-memory request executor for tests and local runs
///
/// Tables live in a shared map behind a lock; clones of a [`MemoryExecutor`]
/// see the same data. Expressions are evaluated with [`crate::expression`], so
/// the compiled requests run unchanged against it. Every request is recorded
/// for later inspection.

use crate::error::Fault;
use crate::executor::{
    DeleteItemInput, GetItemInput, GetItemOutput, PageOutput, PutItemInput, QueryInput, RequestExecutor,
    ScanInput, UpdateItemInput, UpdateItemOutput,
};
use crate::expression::{ConditionParser, Evaluator, ExpressionContext, UpdateExecutor, UpdateOp, UpdateParser};
use crate::schema::ModelSchema;
use crate::serializer::decode_number;
use crate::types::{AttributeValue, Item};
use crate::value::Number;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

type FaultResult<T> = std::result::Result<T, Fault>;

fn validation(message: impl Into<String>) -> Fault {
    Fault::new("ValidationException", message)
}

fn not_found() -> Fault {
    Fault::new("ResourceNotFoundException", "Requested resource not found")
}

fn check_failed() -> Fault {
    Fault::new("ConditionalCheckFailedException", "The conditional request failed")
}

/// Key layout of a table and its secondary indexes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKeys {
    pub pk: String,
    pub sk: Option<String>,
    /// index name -> (partition key, sort key)
    pub indexes: BTreeMap<String, (String, Option<String>)>,
}

impl TableKeys {
    pub fn new(pk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: None,
            indexes: BTreeMap::new(),
        }
    }

    pub fn with_sort_key(mut self, sk: impl Into<String>) -> Self {
        self.sk = Some(sk.into());
        self
    }

    pub fn with_index(mut self, name: impl Into<String>, pk: impl Into<String>, sk: Option<&str>) -> Self {
        self.indexes.insert(name.into(), (pk.into(), sk.map(str::to_string)));
        self
    }

    /// Layout matching a model schema.
    pub fn for_schema(schema: &ModelSchema) -> Self {
        let mut keys = Self::new(schema.pk_name.clone());
        keys.sk = schema.sk_name.clone();
        for (name, index) in &schema.indexes {
            keys.indexes
                .insert(name.clone(), (index.pk_name.clone(), index.sk_name.clone()));
        }
        keys
    }

    fn is_key_attribute(&self, name: &str) -> bool {
        name == self.pk || self.sk.as_deref() == Some(name)
    }
}

/// A request as received by the executor
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetItem(GetItemInput),
    PutItem(PutItemInput),
    DeleteItem(DeleteItemInput),
    UpdateItem(UpdateItemInput),
    Query(QueryInput),
    Scan(ScanInput),
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::GetItem(_) => "GetItem",
            Request::PutItem(_) => "PutItem",
            Request::DeleteItem(_) => "DeleteItem",
            Request::UpdateItem(_) => "UpdateItem",
            Request::Query(_) => "Query",
            Request::Scan(_) => "Scan",
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            Request::GetItem(i) => &i.table_name,
            Request::PutItem(i) => &i.table_name,
            Request::DeleteItem(i) => &i.table_name,
            Request::UpdateItem(i) => &i.table_name,
            Request::Query(i) => &i.table_name,
            Request::Scan(i) => &i.table_name,
        }
    }
}

/// Orderable key attribute value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    N(Number),
    S(String),
    B(Bytes),
}

impl KeyPart {
    fn of(value: &AttributeValue) -> Option<KeyPart> {
        match value {
            AttributeValue::S(s) => Some(KeyPart::S(s.clone())),
            AttributeValue::N(n) => decode_number(n, "").ok().map(KeyPart::N),
            AttributeValue::B(b) => Some(KeyPart::B(b.clone())),
            _ => None,
        }
    }
}

type StoreKey = (KeyPart, Option<KeyPart>);

struct Table {
    keys: TableKeys,
    items: BTreeMap<StoreKey, Item>,
}

impl Table {
    fn key_part(&self, item: &Item, name: &str) -> FaultResult<KeyPart> {
        let value = item
            .get(name)
            .ok_or_else(|| validation(format!("One of the required keys was not given a value: {}", name)))?;
        if matches!(value, AttributeValue::S(s) if s.is_empty()) {
            return Err(validation(format!(
                "One or more parameter values are not valid. The AttributeValue for a key attribute cannot contain an empty string value. Key: {}",
                name
            )));
        }
        KeyPart::of(value).ok_or_else(|| {
            validation(format!(
                "One or more parameter values were invalid: Type mismatch for key {}",
                name
            ))
        })
    }

    fn store_key(&self, item: &Item) -> FaultResult<StoreKey> {
        let pk = self.key_part(item, &self.keys.pk)?;
        let sk = match &self.keys.sk {
            Some(sk) => Some(self.key_part(item, sk)?),
            None => None,
        };
        Ok((pk, sk))
    }

    /// Key of a get/delete/update request: exactly the key attributes.
    fn request_key(&self, key: &Item) -> FaultResult<StoreKey> {
        let expected = 1 + usize::from(self.keys.sk.is_some());
        if key.len() != expected || key.keys().any(|k| !self.keys.is_key_attribute(k)) {
            return Err(validation("The provided key element does not match the schema"));
        }
        self.store_key(key)
    }

    fn key_item(&self, item: &Item, index: Option<&(String, Option<String>)>) -> Item {
        let mut names: Vec<&str> = vec![self.keys.pk.as_str()];
        names.extend(self.keys.sk.as_deref());
        if let Some((pk, sk)) = index {
            names.push(pk);
            names.extend(sk.as_deref());
        }
        names
            .into_iter()
            .filter_map(|n| item.get(n).map(|v| (n.to_string(), v.clone())))
            .collect()
    }

    fn index(&self, name: Option<&str>) -> FaultResult<Option<&(String, Option<String>)>> {
        match name {
            None => Ok(None),
            Some(name) => self.keys.indexes.get(name).map(Some).ok_or_else(|| {
                validation(format!(
                    "The table does not have the specified index: {}",
                    name
                ))
            }),
        }
    }

    /// Items visible through the table or one of its indexes, in key order.
    fn ordered(&self, index: Option<&(String, Option<String>)>) -> Vec<(&StoreKey, &Item)> {
        match index {
            None => self.items.iter().collect(),
            Some((pk, sk)) => {
                let mut entries: Vec<(Option<KeyPart>, Option<KeyPart>, &StoreKey, &Item)> = self
                    .items
                    .iter()
                    .filter(|(_, item)| {
                        item.contains_key(pk) && sk.as_ref().map(|s| item.contains_key(s)).unwrap_or(true)
                    })
                    .map(|(key, item)| {
                        let ipk = item.get(pk).and_then(KeyPart::of);
                        let isk = sk.as_ref().and_then(|s| item.get(s)).and_then(KeyPart::of);
                        (ipk, isk, key, item)
                    })
                    .collect();
                entries.sort_by(|a, b| (&a.0, &a.1, a.2).cmp(&(&b.0, &b.1, b.2)));
                entries.into_iter().map(|(_, _, key, item)| (key, item)).collect()
            }
        }
    }
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    requests: Vec<Request>,
    pending_faults: VecDeque<Fault>,
}

impl State {
    fn table(&self, name: &str) -> FaultResult<&Table> {
        self.tables.get(name).ok_or_else(not_found)
    }

    fn table_mut(&mut self, name: &str) -> FaultResult<&mut Table> {
        self.tables.get_mut(name).ok_or_else(not_found)
    }

    // Records the request and hands out an injected fault, if one is queued.
    fn begin(&mut self, request: Request) -> FaultResult<()> {
        debug!(kind = request.kind(), table = request.table_name(), "memory executor request");
        self.requests.push(request);
        match self.pending_faults.pop_front() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

fn check_condition(
    condition: Option<&str>,
    context: &ExpressionContext,
    existing: Option<&Item>,
) -> FaultResult<()> {
    let Some(text) = condition else {
        return Ok(());
    };
    let expr = ConditionParser::parse(text, context)?;
    let empty = Item::new();
    if Evaluator::new(existing.unwrap_or(&empty), context).evaluate(&expr)? {
        Ok(())
    } else {
        Err(check_failed())
    }
}

struct PageRequest<'r> {
    index_name: Option<&'r str>,
    key_condition: Option<&'r str>,
    filter: Option<&'r str>,
    context: ExpressionContext,
    limit: Option<usize>,
    forward: bool,
    start_key: Option<&'r Item>,
}

fn read_page(table: &Table, request: PageRequest<'_>) -> FaultResult<PageOutput> {
    if request.limit == Some(0) {
        return Err(validation("Limit must be greater than or equal to 1"));
    }
    let index = table.index(request.index_name)?;
    let key_condition = request
        .key_condition
        .map(|text| ConditionParser::parse(text, &request.context))
        .transpose()?;
    let filter = request
        .filter
        .map(|text| ConditionParser::parse(text, &request.context))
        .transpose()?;

    let mut candidates = Vec::new();
    for (key, item) in table.ordered(index) {
        let matches = match &key_condition {
            Some(expr) => Evaluator::new(item, &request.context).evaluate(expr)?,
            None => true,
        };
        if matches {
            candidates.push((key, item));
        }
    }
    if !request.forward {
        candidates.reverse();
    }

    if let Some(start) = request.start_key {
        let start = table.store_key(start)?;
        if let Some(pos) = candidates.iter().position(|(key, _)| **key == start) {
            candidates.drain(..=pos);
        }
    }

    let take = request.limit.unwrap_or(usize::MAX).min(candidates.len());
    let more = take < candidates.len();
    let evaluated = &candidates[..take];

    let mut items = Vec::new();
    for (_, item) in evaluated {
        let keep = match &filter {
            Some(expr) => Evaluator::new(item, &request.context).evaluate(expr)?,
            None => true,
        };
        if keep {
            items.push((*item).clone());
        }
    }

    let last_evaluated_key = match evaluated.last() {
        Some((_, item)) if more => Some(table.key_item(item, index)),
        _ => None,
    };
    Ok(PageOutput {
        items,
        last_evaluated_key,
    })
}

fn touched(ops: &[UpdateOp]) -> Vec<&str> {
    ops.iter()
        .filter_map(|op| match op {
            UpdateOp::Set(path, _) | UpdateOp::Remove(path) | UpdateOp::Add(path, _) | UpdateOp::Delete(path, _) => {
                path.first().map(String::as_str)
            }
        })
        .collect()
}

fn only(item: &Item, names: &[&str]) -> Item {
    item.iter()
        .filter(|(k, _)| names.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// In-memory [`RequestExecutor`]
#[derive(Clone, Default)]
pub struct MemoryExecutor {
    inner: Arc<RwLock<State>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table; an existing table of the same name is kept as is.
    pub fn create_table(&self, name: impl Into<String>, keys: TableKeys) {
        let name = name.into();
        let mut inner = self.inner.write();
        inner.tables.entry(name).or_insert_with(|| Table {
            keys,
            items: BTreeMap::new(),
        });
    }

    /// Creates the table a model schema points at, with its indexes.
    pub fn create_table_for(&self, schema: &ModelSchema) {
        self.create_table(schema.table_name.clone(), TableKeys::for_schema(schema));
    }

    pub fn with_table(self, name: impl Into<String>, keys: TableKeys) -> Self {
        self.create_table(name, keys);
        self
    }

    pub fn drop_table(&self, name: &str) -> bool {
        self.inner.write().tables.remove(name).is_some()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.inner.read().tables.contains_key(name)
    }

    /// Stores an item directly, bypassing request recording.
    pub fn insert_raw(&self, table: &str, item: Item) -> std::result::Result<(), Fault> {
        let mut inner = self.inner.write();
        let table = inner.table_mut(table)?;
        let key = table.store_key(&item)?;
        table.items.insert(key, item);
        Ok(())
    }

    /// All items of a table in key order.
    pub fn items(&self, table: &str) -> Vec<Item> {
        self.inner
            .read()
            .tables
            .get(table)
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn item_count(&self, table: &str) -> usize {
        self.inner.read().tables.get(table).map(|t| t.items.len()).unwrap_or(0)
    }

    /// Makes the next request fail with `fault`. Queued faults are used in order.
    pub fn fail_next(&self, fault: Fault) {
        self.inner.write().pending_faults.push_back(fault);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.inner.read().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.read().requests.len()
    }

    pub fn clear_requests(&self) {
        self.inner.write().requests.clear();
    }
}

impl std::fmt::Debug for MemoryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MemoryExecutor")
            .field("tables", &inner.tables.keys().collect::<Vec<_>>())
            .field("requests", &inner.requests.len())
            .finish()
    }
}

impl RequestExecutor for MemoryExecutor {
    fn get_item(&self, input: GetItemInput) -> FaultResult<GetItemOutput> {
        let mut inner = self.inner.write();
        inner.begin(Request::GetItem(input.clone()))?;
        let table = inner.table(&input.table_name)?;
        let key = table.request_key(&input.key)?;
        Ok(GetItemOutput {
            item: table.items.get(&key).cloned(),
        })
    }

    fn put_item(&self, input: PutItemInput) -> FaultResult<()> {
        let mut inner = self.inner.write();
        inner.begin(Request::PutItem(input.clone()))?;
        let table = inner.table_mut(&input.table_name)?;
        let key = table.store_key(&input.item)?;
        let context = ExpressionContext::from_parts(input.names.as_ref(), input.values.as_ref());
        check_condition(input.condition_expression.as_deref(), &context, table.items.get(&key))?;
        table.items.insert(key, input.item);
        Ok(())
    }

    fn delete_item(&self, input: DeleteItemInput) -> FaultResult<()> {
        let mut inner = self.inner.write();
        inner.begin(Request::DeleteItem(input.clone()))?;
        let table = inner.table_mut(&input.table_name)?;
        let key = table.request_key(&input.key)?;
        let context = ExpressionContext::from_parts(input.names.as_ref(), input.values.as_ref());
        check_condition(input.condition_expression.as_deref(), &context, table.items.get(&key))?;
        table.items.remove(&key);
        Ok(())
    }

    fn update_item(&self, input: UpdateItemInput) -> FaultResult<UpdateItemOutput> {
        let mut inner = self.inner.write();
        inner.begin(Request::UpdateItem(input.clone()))?;
        let table = inner.table_mut(&input.table_name)?;
        let key = table.request_key(&input.key)?;
        let context = ExpressionContext::from_parts(input.names.as_ref(), input.values.as_ref());

        let old = table.items.get(&key).cloned();
        check_condition(input.condition_expression.as_deref(), &context, old.as_ref())?;

        let ops = UpdateParser::parse(&input.update_expression, &context)?;
        let changed = touched(&ops);
        if let Some(name) = changed.iter().find(|n| table.keys.is_key_attribute(n)) {
            return Err(validation(format!(
                "One or more parameter values were invalid: Cannot update attribute {}. This attribute is part of the key",
                name
            )));
        }

        let base = old.clone().unwrap_or_else(|| input.key.clone());
        let new = UpdateExecutor::new(&context).execute(&base, &ops)?;
        table.items.insert(key, new.clone());

        let attributes = match input.return_values.as_deref().unwrap_or("NONE") {
            "NONE" => None,
            "ALL_OLD" => old,
            "ALL_NEW" => Some(new),
            "UPDATED_OLD" => old.map(|o| only(&o, &changed)),
            "UPDATED_NEW" => Some(only(&new, &changed)),
            other => return Err(validation(format!("Invalid ReturnValues value: {}", other))),
        };
        Ok(UpdateItemOutput { attributes })
    }

    fn query(&self, input: QueryInput) -> FaultResult<PageOutput> {
        let mut inner = self.inner.write();
        inner.begin(Request::Query(input.clone()))?;
        let table = inner.table(&input.table_name)?;
        if input.key_condition_expression.trim().is_empty() {
            return Err(validation("Either the KeyConditions or KeyConditionExpression parameter must be specified"));
        }
        read_page(
            table,
            PageRequest {
                index_name: input.index_name.as_deref(),
                key_condition: Some(input.key_condition_expression.as_str()),
                filter: input.filter_expression.as_deref(),
                context: ExpressionContext::from_parts(input.names.as_ref(), input.values.as_ref()),
                limit: input.limit,
                forward: input.scan_index_forward,
                start_key: input.exclusive_start_key.as_ref(),
            },
        )
    }

    fn scan(&self, input: ScanInput) -> FaultResult<PageOutput> {
        let mut inner = self.inner.write();
        inner.begin(Request::Scan(input.clone()))?;
        let table = inner.table(&input.table_name)?;
        read_page(
            table,
            PageRequest {
                index_name: input.index_name.as_deref(),
                key_condition: None,
                filter: input.filter_expression.as_deref(),
                context: ExpressionContext::from_parts(input.names.as_ref(), input.values.as_ref()),
                limit: input.limit,
                forward: true,
                start_key: input.exclusive_start_key.as_ref(),
            },
        )
    }
}
