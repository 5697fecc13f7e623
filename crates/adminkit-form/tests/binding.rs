//! Field bindings against an in-memory form.

use std::sync::Arc;

use adminkit_form::{
    ArrayFieldBinding, BindingState, FieldBinding, FieldOptions, FormApi, FormError, MemoryForm,
    ValidationError, min_length, required,
};
use adminkit_model::Record;
use serde_json::{Value, json};

fn book() -> Record {
    Record::new(7)
        .with("title", "Dune")
        .with("stock", 0)
        .with("available", false)
        .with("tags", json!(["sf"]))
}

fn edit_form(record: &Record) -> Arc<MemoryForm> {
    Arc::new(MemoryForm::new(record.clone().into_value()))
}

// ============================================================================
// Defaults
// ============================================================================

#[test]
fn default_applies_without_dirtying_the_form() {
    let form = Arc::new(MemoryForm::default());
    let binding = FieldBinding::bind(
        form.clone(),
        None,
        FieldOptions::new("title").with_default_value(json!("Untitled")),
    )
    .expect("bind title");

    assert_eq!(binding.state(), BindingState::Bound);
    assert_eq!(binding.value(), json!("Untitled"));
    assert!(!binding.is_dirty());
    assert!(!form.is_form_dirty());
    assert_eq!(form.default_value("title"), Some(json!("Untitled")));
}

#[test]
fn record_values_win_over_defaults() {
    let record = book();
    let form = edit_form(&record);

    let title = FieldBinding::bind(
        form.clone(),
        Some(&record),
        FieldOptions::new("title").with_default_value(json!("Untitled")),
    )
    .expect("bind title");
    let stock = FieldBinding::bind(
        form.clone(),
        Some(&record),
        FieldOptions::new("stock").with_default_value(json!(10)),
    )
    .expect("bind stock");
    let available = FieldBinding::bind(
        form.clone(),
        Some(&record),
        FieldOptions::new("available").with_default_value(json!(true)),
    )
    .expect("bind available");

    assert_eq!(title.value(), json!("Dune"));
    assert_eq!(stock.value(), json!(0));
    assert_eq!(available.value(), json!(false));
    assert!(!form.is_form_dirty());
}

#[test]
fn user_input_is_kept_over_defaults() {
    let form = Arc::new(MemoryForm::default());
    form.set_value("title", json!("Typed"));
    let binding = FieldBinding::bind(
        form.clone(),
        None,
        FieldOptions::new("title").with_default_value(json!("Untitled")),
    )
    .expect("bind title");
    assert_eq!(binding.value(), json!("Typed"));
    assert!(binding.is_dirty());
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn a_field_binds_once() {
    let form = Arc::new(MemoryForm::default());
    let first = FieldBinding::bind(form.clone(), None, FieldOptions::new("title")).expect("bind");

    let second = FieldBinding::bind(form.clone(), None, FieldOptions::new("title"));
    assert_eq!(
        second.err(),
        Some(FormError::AlreadyRegistered {
            field: "title".to_string()
        })
    );

    first.unbind();
    assert_eq!(first.state(), BindingState::Uninitialized);
    assert!(!form.is_registered("title"));
    drop(first);

    let again = FieldBinding::bind(form.clone(), None, FieldOptions::new("title")).expect("rebind");
    drop(again);
    assert!(!form.is_registered("title"));
}

// ============================================================================
// Input handling
// ============================================================================

#[test]
fn empty_input_is_stored_as_null() {
    let form = Arc::new(MemoryForm::new(json!({"title": "Dune"})));
    let binding = FieldBinding::bind(form.clone(), None, FieldOptions::new("title")).expect("bind");

    binding.on_change(&json!(""));
    assert_eq!(form.get_value("title"), Some(Value::Null));
    assert_eq!(binding.value(), json!(""));
    assert!(binding.is_dirty());

    binding.on_blur();
    assert!(binding.is_touched());
}

#[test]
fn custom_format_and_parse() {
    let form = Arc::new(MemoryForm::new(json!({"price": 1250})));
    let options = FieldOptions::new("price")
        .with_format(|value| match value.as_f64() {
            Some(cents) => json!(format!("{:.2}", cents / 100.0)),
            None => json!(""),
        })
        .with_parse(|value| {
            value
                .as_str()
                .and_then(|text| text.parse::<f64>().ok())
                .map_or(Value::Null, |amount| json!((amount * 100.0).round() as i64))
        });
    let binding = FieldBinding::bind(form.clone(), None, options).expect("bind");

    assert_eq!(binding.value(), json!("12.50"));
    binding.on_change(&json!("9.99"));
    assert_eq!(form.get_value("price"), Some(json!(999)));
}

#[tokio::test]
async fn validation_errors_are_recorded_on_the_form() {
    let form = Arc::new(MemoryForm::default());
    let binding = FieldBinding::bind(
        form.clone(),
        None,
        FieldOptions::new("title")
            .with_validator(required())
            .with_validator(min_length(3)),
    )
    .expect("bind");
    assert!(binding.is_required());

    assert_eq!(
        binding.validate_and_record().await,
        Some(ValidationError::message("ra.validation.required"))
    );
    assert_eq!(form.error("title"), binding.error());

    binding.on_change(&json!("Dune"));
    assert_eq!(binding.validate_and_record().await, None);
    assert_eq!(form.error("title"), None);
}

// ============================================================================
// Array fields
// ============================================================================

#[test]
fn array_default_is_installed_clean() {
    let form = Arc::new(MemoryForm::default());
    let tags = ArrayFieldBinding::bind(
        form.clone(),
        None,
        FieldOptions::new("tags").with_default_value(json!(["sf", "classic"])),
    )
    .expect("bind tags");

    assert_eq!(tags.items(), vec![json!("sf"), json!("classic")]);
    assert!(!tags.is_dirty());
    assert!(!form.is_form_dirty());
    assert_eq!(tags.keys().len(), 2);
}

#[test]
fn record_array_is_left_alone() {
    let record = book();
    let form = edit_form(&record);
    let tags = ArrayFieldBinding::bind(
        form.clone(),
        Some(&record),
        FieldOptions::new("tags").with_default_value(json!(["default"])),
    )
    .expect("bind tags");
    assert_eq!(tags.items(), vec![json!("sf")]);
}

#[test]
fn row_keys_follow_their_rows() {
    let form = Arc::new(MemoryForm::new(json!({"items": ["a", "b", "c"]})));
    let items =
        ArrayFieldBinding::bind(form.clone(), None, FieldOptions::new("items")).expect("bind");
    let keys = items.keys();
    assert_eq!(keys.len(), 3);
    let (a, b, c) = (keys[0], keys[1], keys[2]);

    let x = items.insert(1, json!("x")).expect("insert");
    assert_eq!(items.keys(), vec![a, x, b, c]);

    items.move_item(3, 0).expect("move");
    assert_eq!(items.keys(), vec![c, a, x, b]);
    assert_eq!(
        items.items(),
        vec![json!("c"), json!("a"), json!("x"), json!("b")]
    );

    assert_eq!(items.remove(2), Ok(json!("x")));
    let d = items.append(json!("d")).expect("append");
    assert_eq!(
        items.fields(),
        vec![(c, json!("c")), (a, json!("a")), (b, json!("b")), (d, json!("d"))]
    );
    assert!(items.is_dirty());

    assert!(matches!(
        items.remove(9),
        Err(FormError::IndexOutOfBounds { index: 9, len: 4, .. })
    ));
    assert_eq!(items.keys().len(), 4);

    items.replace(vec![json!("z")]);
    let renewed = items.keys();
    assert_eq!(renewed.len(), 1);
    assert!(![a, b, c, d].contains(&renewed[0]));
}
