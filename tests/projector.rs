// tests/projector.rs
use order_sync::entity::{Entity, Record, ORDERS, ORDER_LINES};
use serde_json::{json, Value};

fn obj(v: Value) -> Record {
    v.as_object().cloned().unwrap()
}

#[test]
fn missing_or_null_line_items_project_to_empty_list() {
    for raw in [
        obj(json!({"id": 1, "updated_at": "2021-09-01T10:00:00Z"})),
        obj(json!({"id": 1, "updated_at": "2021-09-01T10:00:00Z", "line_items": null})),
        obj(json!({"id": 1, "updated_at": "2021-09-01T10:00:00Z", "line_items": []})),
    ] {
        for entity in Entity::ALL {
            let out = (entity.spec().project)(&raw);
            assert_eq!(out["line_items"], json!([]), "{entity}");
        }
    }
}

#[test]
fn order_lines_keep_money_sets_verbatim() {
    let price_set = json!({
        "shop_money": {"amount": "12.50", "currency_code": "CZK"},
        "presentment_money": {"amount": "0.50", "currency_code": "EUR"}
    });
    let raw = obj(json!({
        "id": 77,
        "order_number": 1077,
        "email": "a@example.com",
        "created_at": "2021-09-01T10:00:00Z",
        "updated_at": "2021-09-01T11:00:00Z",
        "customer": {"id": 5},
        "line_items": [{
            "id": 770,
            "name": "Mug",
            "price": "12.50",
            "price_set": price_set,
            "quantity": 3,
            "sku": "MUG",
            "total_discount": "0.00",
            "total_discount_set": null,
            "tax_lines": []
        }]
    }));

    let out = (ORDER_LINES.project)(&raw);
    assert!(out.get("customer").is_none());
    let item = &out["line_items"][0];
    assert_eq!(item["price_set"], price_set);
    assert_eq!(item["price"], json!("12.50"));
    assert!(item.get("tax_lines").is_none());
    assert_eq!(item["total_discount_set"], Value::Null);
}

#[test]
fn orders_projection_matches_schema_columns() {
    let out = (ORDERS.project)(&obj(json!({"id": 1, "extra": true})));
    let mut keys: Vec<_> = out.keys().cloned().collect();
    let mut cols: Vec<_> = ORDERS.schema.iter().map(|f| f.name.to_string()).collect();
    keys.sort();
    cols.sort();
    assert_eq!(keys, cols);
}
