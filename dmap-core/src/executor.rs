/// Request executor boundary
///
/// Everything the library sends to the store goes through a [`RequestExecutor`].
/// The executor for a call is the innermost scoped override on the calling
/// thread, else the process default.

use crate::error::{Error, Fault, Result};
use crate::types::Item;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetItemInput {
    pub table_name: String,
    pub key: Item,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetItemOutput {
    pub item: Option<Item>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PutItemInput {
    pub table_name: String,
    pub item: Item,
    pub condition_expression: Option<String>,
    pub names: Option<HashMap<String, String>>,
    pub values: Option<Item>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteItemInput {
    pub table_name: String,
    pub key: Item,
    pub condition_expression: Option<String>,
    pub names: Option<HashMap<String, String>>,
    pub values: Option<Item>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateItemInput {
    pub table_name: String,
    pub key: Item,
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub names: Option<HashMap<String, String>>,
    pub values: Option<Item>,
    /// `NONE`, `ALL_OLD`, `UPDATED_OLD`, `ALL_NEW` or `UPDATED_NEW`
    pub return_values: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateItemOutput {
    pub attributes: Option<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryInput {
    pub table_name: String,
    pub index_name: Option<String>,
    pub key_condition_expression: String,
    pub filter_expression: Option<String>,
    pub names: Option<HashMap<String, String>>,
    pub values: Option<Item>,
    pub limit: Option<usize>,
    pub scan_index_forward: bool,
    pub exclusive_start_key: Option<Item>,
}

impl Default for QueryInput {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            index_name: None,
            key_condition_expression: String::new(),
            filter_expression: None,
            names: None,
            values: None,
            limit: None,
            scan_index_forward: true,
            exclusive_start_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanInput {
    pub table_name: String,
    pub index_name: Option<String>,
    pub filter_expression: Option<String>,
    pub names: Option<HashMap<String, String>>,
    pub values: Option<Item>,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Item>,
}

/// One page of query or scan results
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageOutput {
    pub items: Vec<Item>,
    /// Present when more items may follow
    pub last_evaluated_key: Option<Item>,
}

/// Issues requests against the store.
///
/// Implementations report failures as a [`Fault`] carrying the store's error
/// code; translation into [`Error`] happens on the caller side.
pub trait RequestExecutor: Send + Sync {
    fn get_item(&self, input: GetItemInput) -> std::result::Result<GetItemOutput, Fault>;
    fn put_item(&self, input: PutItemInput) -> std::result::Result<(), Fault>;
    fn delete_item(&self, input: DeleteItemInput) -> std::result::Result<(), Fault>;
    fn update_item(&self, input: UpdateItemInput) -> std::result::Result<UpdateItemOutput, Fault>;
    fn query(&self, input: QueryInput) -> std::result::Result<PageOutput, Fault>;
    fn scan(&self, input: ScanInput) -> std::result::Result<PageOutput, Fault>;
}

lazy_static! {
    static ref DEFAULT_EXECUTOR: RwLock<Option<Arc<dyn RequestExecutor>>> = RwLock::new(None);
}

thread_local! {
    static OVERRIDES: RefCell<Vec<Arc<dyn RequestExecutor>>> = RefCell::new(Vec::new());
}

/// Sets the process-wide executor used when no scoped override is active.
pub fn set_default_executor(executor: Arc<dyn RequestExecutor>) {
    *DEFAULT_EXECUTOR.write() = Some(executor);
}

/// Removes the process-wide executor.
pub fn clear_default_executor() {
    *DEFAULT_EXECUTOR.write() = None;
}

/// Executor for the current call: innermost override, else the default.
pub fn current_executor() -> Result<Arc<dyn RequestExecutor>> {
    if let Some(executor) = OVERRIDES.with(|stack| stack.borrow().last().cloned()) {
        return Ok(executor);
    }
    DEFAULT_EXECUTOR
        .read()
        .as_ref()
        .cloned()
        .ok_or(Error::ExecutorNotConfigured)
}

/// Scoped executor override for the current thread.
///
/// The override is popped when the guard drops. Guards nest, and must be
/// dropped in reverse order of creation.
#[must_use = "the override ends when the guard is dropped"]
pub struct ExecutorGuard {
    // thread-local state: the guard must stay on its thread
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ExecutorGuard {
    pub fn push(executor: Arc<dyn RequestExecutor>) -> Self {
        OVERRIDES.with(|stack| stack.borrow_mut().push(executor));
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for ExecutorGuard {
    fn drop(&mut self) {
        OVERRIDES.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Executor captured when a builder is created.
///
/// Builders keep the executor that was current at construction, so running
/// them after an override scope ends still talks to the same store. When none
/// was available at construction, the executor current at run time is used.
#[derive(Clone)]
pub struct BoundExecutor(Option<Arc<dyn RequestExecutor>>);

impl BoundExecutor {
    pub fn capture() -> Self {
        Self(current_executor().ok())
    }

    pub fn resolve(&self) -> Result<Arc<dyn RequestExecutor>> {
        match &self.0 {
            Some(executor) => Ok(Arc::clone(executor)),
            None => current_executor(),
        }
    }
}

/// Runs `f` with `executor` as the current thread's executor.
pub fn using_executor<T>(executor: Arc<dyn RequestExecutor>, f: impl FnOnce() -> T) -> T {
    let _guard = ExecutorGuard::push(executor);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl RequestExecutor for Fixed {
        fn get_item(&self, _input: GetItemInput) -> std::result::Result<GetItemOutput, Fault> {
            Err(Fault::new(self.0, "fixed"))
        }
        fn put_item(&self, _input: PutItemInput) -> std::result::Result<(), Fault> {
            Ok(())
        }
        fn delete_item(&self, _input: DeleteItemInput) -> std::result::Result<(), Fault> {
            Ok(())
        }
        fn update_item(&self, _input: UpdateItemInput) -> std::result::Result<UpdateItemOutput, Fault> {
            Ok(UpdateItemOutput::default())
        }
        fn query(&self, _input: QueryInput) -> std::result::Result<PageOutput, Fault> {
            Ok(PageOutput::default())
        }
        fn scan(&self, _input: ScanInput) -> std::result::Result<PageOutput, Fault> {
            Ok(PageOutput::default())
        }
    }

    fn tag() -> String {
        match current_executor() {
            Ok(executor) => executor.get_item(GetItemInput::default()).unwrap_err().code,
            Err(_) => "none".to_string(),
        }
    }

    #[test]
    fn test_overrides_nest() {
        using_executor(Arc::new(Fixed("outer")), || {
            assert_eq!(tag(), "outer");
            using_executor(Arc::new(Fixed("inner")), || {
                assert_eq!(tag(), "inner");
            });
            assert_eq!(tag(), "outer");
        });
    }

    #[test]
    fn test_bound_executor_outlives_scope() {
        let bound = using_executor(Arc::new(Fixed("scoped")), BoundExecutor::capture);
        let code = bound.resolve().unwrap().get_item(GetItemInput::default()).unwrap_err().code;
        assert_eq!(code, "scoped");

        let unbound = BoundExecutor::capture();
        let code = using_executor(Arc::new(Fixed("later")), || {
            unbound.resolve().unwrap().get_item(GetItemInput::default()).unwrap_err().code
        });
        assert_eq!(code, "later");
    }

    #[test]
    fn test_override_is_thread_local() {
        let _guard = ExecutorGuard::push(Arc::new(Fixed("mine")));
        let seen = std::thread::spawn(|| {
            OVERRIDES.with(|stack| stack.borrow().len())
        })
        .join()
        .unwrap();
        assert_eq!(seen, 0);
        assert_eq!(tag(), "mine");
    }

    #[test]
    fn test_query_input_defaults_forward() {
        assert!(QueryInput::default().scan_index_forward);
    }
}
