/// Executor selection: process default, thread-scoped overrides
///
/// Tests touching the process-wide default live in a single test function.

use dmap::{clear_default_executor, set_default_executor, using_executor, MemoryExecutor, Model};
use dmap_test_utils::{assert_error_code, init_tracing, Message, User};
use std::sync::Arc;
use std::thread;

fn store() -> MemoryExecutor {
    let executor = MemoryExecutor::new();
    executor.create_table_for(&User::schema().unwrap());
    executor
}

#[test]
fn test_default_and_scoped_executors() {
    init_tracing();
    assert_error_code(User::get("ann@example.com"), "EXECUTOR_NOT_CONFIGURED");
    let err = User::new("ann@example.com", "Ann").save(None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "No request executor configured; call set_default_executor or using_executor first"
    );

    let shared = store();
    set_default_executor(Arc::new(shared.clone()));
    User::new("ann@example.com", "Ann").save(None).unwrap();

    // other threads see the default
    let seen = thread::spawn(|| User::get("ann@example.com").unwrap().is_some())
        .join()
        .unwrap();
    assert!(seen);

    // an override on one thread leaves the others on the default
    let private = store();
    let private_view = private.clone();
    thread::spawn(move || {
        using_executor(Arc::new(private), || {
            assert!(User::get("ann@example.com").unwrap().is_none());
            User::new("bob@example.com", "Bob").save(None).unwrap();
        });
        assert!(User::get("ann@example.com").unwrap().is_some());
    })
    .join()
    .unwrap();
    assert_eq!(private_view.item_count("users"), 1);
    assert_eq!(shared.item_count("users"), 1);
    assert!(User::get("bob@example.com").unwrap().is_none());

    clear_default_executor();
    assert_error_code(User::get("ann@example.com"), "EXECUTOR_NOT_CONFIGURED");
}

#[test]
fn test_builders_keep_their_executor() {
    init_tracing();
    let scoped = MemoryExecutor::new();
    scoped.create_table_for(&Message::schema().unwrap());
    scoped.create_table_for(&User::schema().unwrap());

    let (query, scan, update) = using_executor(Arc::new(scoped.clone()), || {
        for ts in 1..=3 {
            Message::new("general", ts, "ann", "hi").save(None).unwrap();
        }
        User::new("ann@example.com", "Ann").save(None).unwrap();
        (
            Message::query("general").unwrap().limit(2),
            Message::scan().unwrap(),
            User::update("ann@example.com").unwrap().set("org", "acme"),
        )
    });

    // the scope has ended; the builders still run against the scoped store
    assert_eq!(query.all().unwrap().len(), 2);
    assert_eq!(query.page(None).unwrap().count, 2);
    assert_eq!(scan.all().unwrap().len(), 3);
    update.execute().unwrap();

    let users = scoped.items("users");
    assert_eq!(users[0]["org"], dmap::AttributeValue::S("acme".into()));
}

#[test]
fn test_iteration_ignores_later_overrides() {
    init_tracing();
    let scoped = MemoryExecutor::new();
    scoped.create_table_for(&Message::schema().unwrap());
    let other = MemoryExecutor::new();
    other.create_table_for(&Message::schema().unwrap());

    let query = using_executor(Arc::new(scoped.clone()), || {
        for ts in 1..=4 {
            Message::new("general", ts, "ann", "hi").save(None).unwrap();
        }
        Message::query("general").unwrap()
    });
    scoped.clear_requests();

    let timestamps: Vec<i64> = using_executor(Arc::new(other.clone()), || {
        let mut pages = query.page(None).unwrap().items;
        pages.extend(query.iter().map(|m| m.unwrap()));
        pages.into_iter().map(|m| m.timestamp).collect()
    });
    assert_eq!(timestamps, vec![1, 2, 3, 4, 1, 2, 3, 4]);
    assert_eq!(other.request_count(), 0);
    assert_eq!(scoped.request_count(), 2);
}
