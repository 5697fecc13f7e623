//! Reference input controller wired to a params controller and a resolver.

use std::sync::Arc;

use adminkit_controller::{
    ALL_MISSING, ChoicesError, LocalChoices, ReferenceInputController, ReferenceInputOptions,
    ReferenceStatus, SINGLE_MISSING, use_choices_context,
};
use adminkit_data::{BatchedLookup, ManualScheduler, MemoryProvider, TokioScheduler};
use adminkit_model::{FilterValues, Identifier, Record, SortPayload};
use serde_json::{Value, json};

fn authors() -> Vec<Record> {
    vec![
        Record::new(1).with("name", "Austen").with("active", true),
        Record::new(2).with("name", "Abbott").with("active", false),
        Record::new(3).with("name", "Joyce").with("active", true),
    ]
}

struct Fixture {
    provider: Arc<MemoryProvider>,
    scheduler: Arc<ManualScheduler>,
    input: ReferenceInputController,
}

fn fixture(options: ReferenceInputOptions) -> Fixture {
    let provider = Arc::new(MemoryProvider::new().with_records("authors", authors()));
    let scheduler = Arc::new(ManualScheduler::new());
    let lookup = BatchedLookup::new(provider.clone(), Arc::new(TokioScheduler::current()));
    let input = ReferenceInputController::new(options, lookup, scheduler.clone());
    Fixture {
        provider,
        scheduler,
        input,
    }
}

fn search_of_two_chars(filter: &FilterValues) -> bool {
    filter
        .get("q")
        .and_then(Value::as_str)
        .is_some_and(|q| q.chars().count() >= 2)
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn candidates_wait_for_enough_search_text() {
    let Fixture {
        provider,
        scheduler,
        input,
    } = fixture(
        ReferenceInputOptions::new("authors", "author_id")
            .with_enable_get_choices(search_of_two_chars),
    );

    let resolved = input.resolve().await;
    assert!(provider.get_list_calls("authors").is_empty());
    assert!(resolved.all_choices.is_empty());

    input.set_search_text("abc");
    scheduler.run_until_idle();
    input.resolve().await;

    let calls = provider.get_list_calls("authors");
    assert_eq!(calls.len(), 1);
    assert_eq!(Value::Object(calls[0].filter.clone()), json!({"q": "abc"}));
}

#[tokio::test]
async fn search_is_debounced() {
    let Fixture {
        scheduler, input, ..
    } = fixture(ReferenceInputOptions::new("authors", "author_id"));

    input.set_search_text("a");
    input.set_search_text("au");
    input.set_search_text("aus");
    scheduler.run_due();
    assert!(input.params().params().filter.is_empty());

    scheduler.run_until_idle();
    assert_eq!(input.params().commit_count(), 1);
    assert_eq!(input.params().params().filter.get("q"), Some(&json!("aus")));
}

#[tokio::test]
async fn permanent_filter_overrides_user_filter() {
    let mut permanent = FilterValues::new();
    permanent.insert("active".to_string(), json!(true));
    let Fixture {
        provider,
        scheduler,
        input,
    } = fixture(
        ReferenceInputOptions::new("authors", "author_id")
            .with_filter(permanent)
            .with_sort(SortPayload::asc("name")),
    );

    input.set_search_text("e");
    scheduler.run_until_idle();
    let resolved = input.resolve().await;

    let names: Vec<_> = resolved
        .available_choices
        .iter()
        .filter_map(|record| record.get("name").cloned())
        .collect();
    assert_eq!(names, vec![json!("Austen"), json!("Joyce")]);
    assert_eq!(
        Value::Object(provider.get_list_calls("authors")[0].filter.clone()),
        json!({"q": "e", "active": true})
    );
}

#[tokio::test]
async fn fetch_predicate_ignores_the_permanent_filter() {
    let mut permanent = FilterValues::new();
    permanent.insert("active".to_string(), json!(true));
    let Fixture {
        provider,
        scheduler,
        input,
    } = fixture(
        ReferenceInputOptions::new("authors", "author_id")
            .with_filter(permanent)
            .with_enable_get_choices(|filter: &FilterValues| !filter.is_empty()),
    );

    input.resolve().await;
    assert!(provider.get_list_calls("authors").is_empty());

    input.set_search_text("j");
    scheduler.run_until_idle();
    input.resolve().await;

    let calls = provider.get_list_calls("authors");
    assert_eq!(calls.len(), 1);
    assert_eq!(
        Value::Object(calls[0].filter.clone()),
        json!({"q": "j", "active": true})
    );
}

#[tokio::test]
async fn custom_search_mapping() {
    let Fixture {
        provider,
        scheduler,
        input,
    } = fixture(
        ReferenceInputOptions::new("authors", "author_id").with_filter_to_query(|text| {
            let mut filter = FilterValues::new();
            filter.insert("name".to_string(), json!(text));
            filter
        }),
    );

    input.set_search_text("Joyce");
    scheduler.run_until_idle();
    let resolved = input.resolve().await;

    assert_eq!(resolved.available_choices.len(), 1);
    assert_eq!(
        Value::Object(provider.get_list_calls("authors")[0].filter.clone()),
        json!({"name": "Joyce"})
    );
}

// ============================================================================
// Context
// ============================================================================

#[tokio::test]
async fn context_actions_drive_the_params() {
    let Fixture {
        scheduler, input, ..
    } = fixture(ReferenceInputOptions::new("authors", "author_id").with_per_page(2));
    input.set_value(json!(3));

    let context = input.context().await;
    assert_eq!(context.resource.as_deref(), Some("authors"));
    assert_eq!(context.source, "author_id");
    assert_eq!(context.per_page, 2);
    assert_eq!(context.sort, SortPayload::desc("id"));
    assert_eq!(context.choices.has_next_page, Some(true));
    assert_eq!(context.all_choices().len(), 2);

    context.actions.set_page(2);
    scheduler.run_due();
    assert_eq!(input.params().params().page, 2);

    let context = input.context().await;
    assert_eq!(context.page, 2);
    let ids: Vec<_> = context.all_choices().iter().map(|r| r.id().clone()).collect();
    assert_eq!(ids, vec![Identifier::Int(3), Identifier::Int(1)]);
}

#[tokio::test]
async fn refetch_goes_back_to_the_backend() {
    let Fixture {
        provider, input, ..
    } = fixture(ReferenceInputOptions::new("authors", "author_id"));

    let context = input.context().await;
    input.context().await;
    assert_eq!(provider.get_list_calls("authors").len(), 1);

    let refreshed = context.actions.refetch().await.expect("refetch");
    assert_eq!(provider.get_list_calls("authors").len(), 2);
    assert_eq!(refreshed.total, Some(3));
}

#[tokio::test]
async fn static_choices_win_over_the_reference_context() {
    let Fixture { input, .. } = fixture(ReferenceInputOptions::new("authors", "author_id"));
    let ambient = input.context().await;
    let local = LocalChoices::new("genre", vec![Record::new("poetry")]);

    let picked = use_choices_context(Some(&ambient), Some(&local)).expect("local context");
    assert_eq!(picked.source, "genre");
    assert_eq!(picked.resource, None);

    let picked = use_choices_context(Some(&ambient), None).expect("ambient context");
    assert_eq!(picked.resource.as_deref(), Some("authors"));

    let missing = use_choices_context(None, None);
    assert!(matches!(missing, Err(ChoicesError::MissingChoicesSource)));
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn dangling_references_are_flagged() {
    let Fixture { input, .. } = fixture(ReferenceInputOptions::new("authors", "author_id"));

    input.set_value(json!(99));
    input.resolve().await;
    assert_eq!(input.status().error.as_deref(), Some(SINGLE_MISSING));

    input.set_value(json!([98, 99]));
    input.resolve().await;
    assert_eq!(input.status().error.as_deref(), Some(ALL_MISSING));

    input.set_value(json!(1));
    input.resolve().await;
    assert_eq!(input.status(), ReferenceStatus::default());
}

#[tokio::test]
async fn status_waits_for_a_resolve_of_the_new_value() {
    let Fixture { input, .. } = fixture(ReferenceInputOptions::new("authors", "author_id"));

    input.set_value(json!(1));
    input.resolve().await;
    assert_eq!(input.status(), ReferenceStatus::default());

    input.set_value(json!(2));
    let status = input.status();
    assert!(status.waiting);
    assert_eq!(status.error, None);

    input.resolve().await;
    assert_eq!(input.status(), ReferenceStatus::default());
}
