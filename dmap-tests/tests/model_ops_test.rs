/// Item-level operations against the in-memory executor
///
/// Covers save/get/delete, conditional writes, updates (builder and
/// one-shot) and the key rules for hash-only and hash-and-range models.

use dmap::{AttributeValue, Document, DocumentExt, Error, Model, ReturnValues, UpdateAction, Value};
use dmap_core::memory::Request;
use dmap_test_utils::{assert_error_code, Message, TestContext, User};

fn ann() -> User {
    User::new("ann@example.com", "Ann").with_age(31)
}

#[test]
fn test_save_and_get_by_email() {
    let ctx = TestContext::new();
    let user = ann();
    user.save(None).unwrap();

    let loaded = User::get("ann@example.com").unwrap().unwrap();
    assert_eq!(loaded, user);

    match ctx.last_request().unwrap() {
        Request::GetItem(input) => {
            assert_eq!(input.table_name, "users");
            assert_eq!(input.key.len(), 1);
            assert_eq!(input.key["email"], AttributeValue::S("ann@example.com".into()));
        }
        other => panic!("unexpected request {:?}", other),
    }
}

#[test]
fn test_saved_item_uses_wire_names_and_skips_nulls() {
    let ctx = TestContext::new();
    ann().save(None).unwrap();

    let items = ctx.executor.items("users");
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item["full_name"], AttributeValue::S("Ann".into()));
    assert!(!item.contains_key("name"));
    // null optional and empty set are both left out
    assert!(!item.contains_key("org"));
    assert!(!item.contains_key("tags"));
}

#[test]
fn test_get_missing_returns_none() {
    let _ctx = TestContext::new();
    assert!(User::get("nobody@example.com").unwrap().is_none());
    assert_error_code(User::fetch("nobody@example.com"), "ITEM_NOT_FOUND");
}

#[test]
fn test_save_not_exists_twice() {
    let ctx = TestContext::new();
    let user = ann();
    let not_exists = User::attr("email").unwrap().not_exists();

    user.save(Some(not_exists.clone())).unwrap();
    let err = user.save(Some(not_exists)).unwrap_err();

    assert!(matches!(err, Error::ConditionalCheckFailed { .. }));
    assert_eq!(err.to_string(), "Conditional check failed: attribute_not_exists(#n0)");
    assert_eq!(
        err.original_error().map(|f| f.code.as_str()),
        Some("ConditionalCheckFailedException")
    );
    assert!(!err.is_retryable());
    assert_eq!(ctx.request_count(), 2);
}

#[test]
fn test_add_on_string_field_sends_nothing() {
    let ctx = TestContext::new();
    let err = User::update("ann@example.com").unwrap().add("name", "x").execute().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid type for ADD operation on field 'name'. DynamoDB ADD supports only Numbers and Sets. Got: str"
    );
    assert_eq!(ctx.request_count(), 0);
}

#[test]
fn test_invalid_value_sends_nothing() {
    let ctx = TestContext::new();
    let err = User::update("ann@example.com").unwrap().set("age", "old").execute().unwrap_err();
    assert!(matches!(err, Error::Validation { field: Some(ref f), .. } if f == "age"));
    assert_eq!(ctx.request_count(), 0);
}

#[test]
fn test_update_returns_new_item() {
    let _ctx = TestContext::new();
    ann().save(None).unwrap();

    let output = User::update("ann@example.com")
        .unwrap()
        .add("age", 1)
        .set("name", "Annie")
        .add("tags", Value::str_set(["admin"]))
        .return_values(ReturnValues::AllNew)
        .execute()
        .unwrap();

    let user = output.item.unwrap();
    assert_eq!(user.age, Some(32));
    assert_eq!(user.name, "Annie");
    assert!(user.tags.contains("admin"));
    assert!(output.attributes.unwrap().contains_key("full_name"));
}

#[test]
fn test_update_without_all_new_has_no_item() {
    let _ctx = TestContext::new();
    ann().save(None).unwrap();

    let output = User::update("ann@example.com")
        .unwrap()
        .set("org", "acme")
        .return_values(ReturnValues::UpdatedNew)
        .execute()
        .unwrap();
    assert!(output.item.is_none());
    let attributes = output.attributes.unwrap();
    assert_eq!(attributes.len(), 1);
    assert_eq!(attributes["org"], AttributeValue::S("acme".into()));
}

#[test]
fn test_update_condition_failure_names_condition() {
    let _ctx = TestContext::new();
    ann().save(None).unwrap();

    let err = User::update("ann@example.com")
        .unwrap()
        .set("org", "acme")
        .condition(User::attr("age").unwrap().gt(40))
        .execute()
        .unwrap_err();
    assert_eq!(err.to_string(), "Conditional check failed: #n0 > :v0");
    assert!(User::get("ann@example.com").unwrap().unwrap().org.is_none());
}

#[test]
fn test_set_null_removes_attribute() {
    let ctx = TestContext::new();
    ann().save(None).unwrap();

    User::update("ann@example.com").unwrap().set("age", Value::Null).execute().unwrap();

    assert_eq!(User::get("ann@example.com").unwrap().unwrap().age, None);
    match ctx.requests().iter().rev().nth(1).unwrap() {
        Request::UpdateItem(input) => assert_eq!(input.update_expression, "REMOVE #u_n0"),
        other => panic!("unexpected request {:?}", other),
    }
}

#[test]
fn test_update_item_in_one_call() {
    let _ctx = TestContext::new();
    ann().save(None).unwrap();

    let mut key = Document::new();
    key.put("email", "ann@example.com");
    let output = User::update_item(
        key,
        vec![
            UpdateAction::Add("age".into(), Value::int(2)),
            UpdateAction::Remove("org".into()),
        ],
        None,
        ReturnValues::AllNew,
    )
    .unwrap();
    assert_eq!(output.item.unwrap().age, Some(33));
}

#[test]
fn test_update_item_requires_partition_key() {
    let ctx = TestContext::new();
    let mut key = Document::new();
    key.put("name", "Ann");
    let err = User::update_item(
        key,
        vec![UpdateAction::Set("age".into(), Value::int(3))],
        None,
        ReturnValues::None,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "Key missing partition key 'email'");
    assert_eq!(ctx.request_count(), 0);
}

#[test]
fn test_patch_and_delete_instance() {
    let _ctx = TestContext::new();
    let user = ann();
    user.save(None).unwrap();

    user.patch().unwrap().set("org", "acme").execute().unwrap();
    assert_eq!(User::get("ann@example.com").unwrap().unwrap().org.as_deref(), Some("acme"));

    user.delete_item(None).unwrap();
    assert!(User::get("ann@example.com").unwrap().is_none());
}

#[test]
fn test_conditional_delete() {
    let _ctx = TestContext::new();
    ann().save(None).unwrap();

    let too_old = User::attr("age").unwrap().gt(90);
    assert_error_code(User::delete("ann@example.com", Some(too_old)), "CONDITIONAL_CHECK_FAILED");
    assert!(User::get("ann@example.com").unwrap().is_some());

    User::delete("ann@example.com", None).unwrap();
    assert!(User::get("ann@example.com").unwrap().is_none());
}

#[test]
fn test_range_key_operations() {
    let ctx = TestContext::new();
    let message = Message::new("general", 7, "ann", "hello");
    message.save(None).unwrap();

    let loaded = Message::get_with_sk("general", 7).unwrap().unwrap();
    assert_eq!(loaded, message);
    match ctx.last_request().unwrap() {
        Request::GetItem(input) => assert_eq!(input.key["timestamp"], AttributeValue::N("7".into())),
        other => panic!("unexpected request {:?}", other),
    }

    Message::delete_with_sk("general", 7, None).unwrap();
    assert!(Message::get_with_sk("general", 7).unwrap().is_none());
}

#[test]
fn test_blank_sort_key_is_left_out() {
    let ctx = TestContext::new();
    let err = Message::get_with_sk("general", "").unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    match ctx.last_request().unwrap() {
        Request::GetItem(input) => assert_eq!(input.key.len(), 1),
        other => panic!("unexpected request {:?}", other),
    }
}

#[test]
fn test_missing_table() {
    let ctx = TestContext::new();
    ctx.executor.drop_table("users");
    let err = User::get("ann@example.com").unwrap_err();
    assert_eq!(err.to_string(), "Table 'users' not found");
    assert_eq!(err.code(), "TABLE_NOT_FOUND");
}
