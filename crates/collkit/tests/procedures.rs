mod common;

use collkit::{
    ErrorKind,
    backend::{CallContext, EndpointKind},
    core::procedure::FinisherInput,
    obs::metrics_report,
    prelude::*,
};
use common::{Harness, order_schema, thing_schema};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

fn orders(harness: &Harness) -> Arc<RecordType> {
    harness
        .tools
        .build(RecordTypeOptions::new("app_orders", order_schema()))
        .expect("orders should build")
}

#[test]
fn wildcard_updater_substitutes_trailing_arguments() {
    let harness = Harness::new();
    let orders = orders(&harness);

    let name = orders
        .make_method_updater(UpdaterSpec::new("items.*.qty"))
        .expect("updater should register");
    assert_eq!(name, "collections/orders/update-items.*.qty");
    assert_eq!(
        orders.update_methods().get("items.*.qty").map(String::as_str),
        Some(name.as_str())
    );

    // items keyed by id rather than position
    let id = harness.seed(
        "app_orders",
        serde_json::json!({ "title": "t", "items": { "item-1": { "sku": "a", "qty": 1 } } }),
    );
    let updated = harness
        .call(
            &name,
            vec![Value::from(id.as_str()), Value::Int(5), Value::from("item-1")],
        )
        .expect("update should succeed");
    assert_eq!(updated, Value::Int(1));

    let stored = harness.load("app_orders", &id);
    assert_eq!(
        collkit::schema::value::document_path(&stored, "items.item-1.qty"),
        Some(&Value::Int(5))
    );

    let err = harness
        .call(&name, vec![Value::from(id.as_str()), Value::from("five"), Value::from("item-1")])
        .expect_err("wrong value type should fail");
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let err = harness
        .call(&name, vec![Value::from(id.as_str()), Value::Int(5)])
        .expect_err("missing wildcard argument should fail");
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[test]
fn add_and_remove_round_out_array_fields() {
    let harness = Harness::new();
    let orders = orders(&harness);

    let add_order = orders
        .make_method_add(AddSpec::new())
        .expect("document add should register");
    let add_item = orders
        .make_method_add(AddSpec::new().field("items").with_params())
        .expect("item add should register");
    let remove_item = orders
        .make_method_remove(RemoveSpec::new().field("items"))
        .expect("item remove should register");
    let remove_order = orders
        .make_method_remove(RemoveSpec::new())
        .expect("document remove should register");

    let all = orders.all_methods();
    let id = harness
        .call(&all[&add_order], Vec::new())
        .expect("document add should succeed");
    let id = id.as_text().expect("add should return the id").to_string();
    assert_eq!(
        harness.load("app_orders", &id).get("title"),
        Some(&Value::from("untitled"))
    );

    for sku in ["a", "b"] {
        harness
            .call(
                &all[&add_item],
                vec![
                    Value::from(id.as_str()),
                    Value::from(serde_json::json!({ "sku": sku, "qty": 2 })),
                ],
            )
            .expect("item add should succeed");
    }
    let err = harness
        .call(
            &all[&add_item],
            vec![Value::from(id.as_str()), Value::from(serde_json::json!({ "colour": "red" }))],
        )
        .expect_err("off-schema element should be refused");
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    assert_eq!(
        harness
            .call(&all[&remove_item], vec![Value::from(id.as_str()), Value::Int(0)])
            .expect("element remove should succeed"),
        Value::Int(1)
    );
    assert_eq!(
        harness
            .call(&all[&remove_item], vec![Value::from(id.as_str()), Value::Int(9)])
            .expect("remove past the end should succeed"),
        Value::Int(0)
    );
    assert_eq!(
        harness.load("app_orders", &id).get("items"),
        Some(&Value::from(serde_json::json!([{ "sku": "b", "qty": 2 }])))
    );

    assert_eq!(
        harness
            .call(&all[&remove_order], vec![Value::from(id.as_str())])
            .expect("document remove should succeed"),
        Value::Int(1)
    );
}

#[test]
fn supplied_documents_must_satisfy_the_schema() {
    let harness = Harness::new();
    let orders = orders(&harness);
    let entry = orders
        .make_method_add(AddSpec::new().with_params())
        .expect("document add should register");
    let name = orders.all_methods()[&entry].clone();

    let err = harness
        .call(&name, vec![Value::from(serde_json::json!({}))])
        .expect_err("empty document should be refused");
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let err = harness
        .call(&name, vec![Value::from(serde_json::json!({ "title": "t", "total": 1 }))])
        .expect_err("document missing required fields should be refused");
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let id = harness
        .call(
            &name,
            vec![Value::from(serde_json::json!({
                "title": "t",
                "total": 1,
                "items": [{ "sku": "a", "qty": 1 }],
                "tags": [],
            }))],
        )
        .expect("complete document should insert");
    let id = id.as_text().expect("add should return the id");

    let stored = orders.instantiate(harness.load("app_orders", id));
    let report = stored
        .validate(false, false)
        .expect("validation should run");
    assert!(report.is_valid);
}

#[test]
fn procedure_names_are_unique_across_record_types() {
    let harness = Harness::new();
    let first = harness
        .tools
        .build(RecordTypeOptions::new("a_things", thing_schema()).method_prefix("shared/"))
        .expect("first should build");
    let second = harness
        .tools
        .build(RecordTypeOptions::new("b_things", thing_schema()).method_prefix("shared/"))
        .expect("second should build");

    first
        .make_method_add(AddSpec::new())
        .expect("first add should register");
    let err = second
        .make_method_add(AddSpec::new())
        .expect_err("same procedure name should be refused");
    assert_eq!(err.kind, ErrorKind::DuplicateMethodName);

    let err = first
        .make_method_add(AddSpec::new())
        .expect_err("same entry should be refused");
    assert_eq!(err.kind, ErrorKind::DuplicateEntryName);

    assert!(harness.tools.method_names().contains(&"shared/add".to_string()));
}

#[test]
fn general_and_generic_updaters() {
    let harness = Harness::new();
    let orders = orders(&harness);

    let general_name = orders
        .make_methods_general_updater(GeneralUpdaterSpec::new())
        .expect("general updater should register");
    let generic = orders
        .make_generic_method_updaters(
            GenericUpdatersSpec::new()
                .primitive_types_only()
                .exclude_by_name(["note"]),
        )
        .expect("generic updaters should register");
    assert_eq!(
        generic,
        [
            "collections/orders/update-gen-items.*.qty",
            "collections/orders/update-gen-items.*.sku",
            "collections/orders/update-gen-tags.*",
            "collections/orders/update-gen-title",
            "collections/orders/update-gen-total",
        ]
    );

    let id = harness.seed(
        "app_orders",
        serde_json::json!({ "title": "t", "total": 0, "items": [{ "sku": "a", "qty": 1 }] }),
    );
    assert_eq!(general_name, "collections/orders/general-update");
    harness
        .call(
            &general_name,
            vec![
                Value::from(id.as_str()),
                Value::from(serde_json::json!({ "title": "renamed", "items.0.qty": 3 })),
            ],
        )
        .expect("general update should succeed");
    let stored = harness.load("app_orders", &id);
    assert_eq!(stored.get("title"), Some(&Value::from("renamed")));
    assert_eq!(
        collkit::schema::value::document_path(&stored, "items.0.qty"),
        Some(&Value::Int(3))
    );

    let err = harness
        .call(
            &general_name,
            vec![Value::from(id.as_str()), Value::from(serde_json::json!({ "bogus": 1 }))],
        )
        .expect_err("unknown field should fail");
    assert_eq!(err.kind, ErrorKind::InvalidField);

    harness
        .call(
            "collections/orders/update-gen-total",
            vec![Value::from(id.as_str()), Value::Int(12)],
        )
        .expect("generic update should succeed");
    assert_eq!(harness.load("app_orders", &id).get("total"), Some(&Value::Int(12)));
}

#[test]
fn auth_rate_limits_and_finishers() {
    let harness = Harness::new();
    let owners = harness
        .tools
        .build(
            RecordTypeOptions::new("app_owned", thing_schema())
                .global_auth(Arc::new(|user: Option<&str>, _: Option<&Value>| user == Some("owner"))),
        )
        .expect("owned should build");

    let finished = Arc::new(AtomicUsize::new(0));
    let seen = finished.clone();
    let entry = owners
        .make_method_add(
            AddSpec::new()
                .rate_limit(RateLimit::per_millis(2, 60_000))
                .finisher(Arc::new(move |_: FinisherInput<'_>| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
        )
        .expect("add should register");
    let name = owners.all_methods()[&entry].clone();

    let err = harness
        .call_as(Some("stranger"), &name, Vec::new())
        .expect_err("stranger should be refused");
    assert_eq!(err.kind, ErrorKind::Unauthorized);

    harness
        .call_as(Some("owner"), &name, Vec::new())
        .expect("owner should be allowed");
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    // the refused call counted against the window too
    let err = harness
        .call_as(Some("owner"), &name, Vec::new())
        .expect_err("third call in the window should be limited");
    assert_eq!(err.kind, ErrorKind::RateLimited);

    let rule = harness
        .limiter
        .rule(EndpointKind::Method, &name)
        .expect("rule should exist");
    assert_eq!(rule.limit, RateLimit::per_millis(2, 60_000));

    let counters = metrics_report().methods[&name].clone();
    assert_eq!(counters.calls, 2);
    assert_eq!(counters.denied, 1);
}

#[test]
fn simulated_calls_can_skip_effects() {
    let harness = Harness::new();
    let tools = harness.tools.clone().simulate_nothing(true);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();

    let name = tools
        .create_method(MethodSpec::new("sim/touch", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Bool(true))
        }))
        .expect("method should register");

    let simulated = harness
        .transport
        .call(&name, &CallContext::new(None, Some("sim")).simulation(), Vec::new())
        .expect("simulated call should succeed");
    assert_eq!(simulated, Value::Null);
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let real = harness
        .transport
        .call(&name, &CallContext::new(None, Some("sim")), Vec::new())
        .expect("real call should succeed");
    assert_eq!(real, Value::Bool(true));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn server_only_methods_are_not_exposed_to_pure_clients() {
    let harness = Harness::pure_client();
    let orders = orders(&harness);

    let entry = orders
        .make_method_add(AddSpec::new().server_only(true))
        .expect("add should still be recorded");
    let name = orders.all_methods()[&entry].clone();

    assert!(!harness.transport.has_method(&name));
    assert!(harness.tools.method_names().contains(&name));

    let entry = orders
        .make_method_remove(RemoveSpec::new())
        .expect("remove should register");
    assert!(harness.transport.has_method(&orders.all_methods()[&entry]));
}
