//! Choices resolution against an in-memory backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use adminkit_controller::{ChoicesQuery, ChoicesResolver, ResolverCaches, merge_choices};
use adminkit_data::{BatchedLookup, DataError, MemoryProvider, TokioScheduler};
use adminkit_model::{FilterValues, Identifier, Pagination, Record};
use proptest::prelude::*;
use serde_json::{Value, json};

fn books() -> Vec<Record> {
    vec![
        Record::new(1).with("title", "Dune").with("shelf", "a"),
        Record::new(2).with("title", "Emma").with("shelf", "b"),
        Record::new(3).with("title", "Ulysses").with("shelf", "b"),
    ]
}

fn filter(value: Value) -> FilterValues {
    match value {
        Value::Object(map) => map,
        _ => FilterValues::new(),
    }
}

fn id_list(records: &[Record]) -> Vec<Identifier> {
    records.iter().map(|record| record.id().clone()).collect()
}

fn ints(values: &[i64]) -> Vec<Identifier> {
    values.iter().copied().map(Identifier::Int).collect()
}

fn resolver_for(provider: &Arc<MemoryProvider>) -> ChoicesResolver {
    ChoicesResolver::new(BatchedLookup::new(
        provider.clone(),
        Arc::new(TokioScheduler::current()),
    ))
}

// ============================================================================
// Merging
// ============================================================================

#[tokio::test]
async fn visible_selection_is_not_duplicated() {
    let provider = Arc::new(MemoryProvider::new().with_records("books", books()[..2].to_vec()));
    let resolver = resolver_for(&provider);

    let resolved = resolver
        .resolve(&ChoicesQuery::new("books", "book_id"), &json!(1))
        .await;

    assert_eq!(resolved.all_choices.len(), 2);
    assert_eq!(resolved.total, Some(2));
    assert_eq!(resolved.error, None);
    assert_eq!(resolved.has_next_page, Some(false));
}

#[tokio::test]
async fn selection_outside_page_is_prepended() {
    let provider = Arc::new(MemoryProvider::new().with_records("books", books()));
    let resolver = resolver_for(&provider);
    let query = ChoicesQuery::new("books", "book_id").with_filter(filter(json!({"shelf": "b"})));

    let resolved = resolver.resolve(&query, &json!(1)).await;

    assert_eq!(id_list(&resolved.available_choices), ints(&[2, 3]));
    assert_eq!(id_list(&resolved.all_choices), ints(&[1, 2, 3]));
    assert_eq!(id_list(&resolved.selected_choices), ints(&[1]));
    assert_eq!(resolved.total, Some(3));

    let many = provider.get_many_calls("books");
    assert_eq!(many.len(), 1);
    assert_eq!(many[0].ids, ints(&[1]));
}

#[tokio::test]
async fn empty_filter_leaves_are_not_sent() {
    let provider = Arc::new(MemoryProvider::new().with_records("books", books()));
    let resolver = resolver_for(&provider);
    let query =
        ChoicesQuery::new("books", "book_id").with_filter(filter(json!({"q": "", "shelf": "a"})));

    resolver.resolve(&query, &Value::Null).await;

    let calls = provider.get_list_calls("books");
    assert_eq!(calls.len(), 1);
    assert_eq!(Value::Object(calls[0].filter.clone()), json!({"shelf": "a"}));
    assert!(provider.get_many_calls("books").is_empty());
}

// ============================================================================
// Fetch control
// ============================================================================

#[tokio::test]
async fn unchanged_request_is_served_from_memory() {
    let provider = Arc::new(MemoryProvider::new().with_records("books", books()));
    let resolver = resolver_for(&provider);
    let query = ChoicesQuery::new("books", "book_id");

    let first = resolver.resolve(&query, &json!([1, 2])).await;
    let second = resolver.resolve(&query, &json!([1, 2])).await;

    assert_eq!(first, second);
    assert_eq!(provider.get_list_calls("books").len(), 1);
    assert_eq!(provider.get_many_calls("books").len(), 1);
    assert_eq!(resolver.snapshot(), first);
}

#[tokio::test]
async fn value_change_only_refetches_the_selection() {
    let provider = Arc::new(MemoryProvider::new().with_records("books", books()));
    let resolver = resolver_for(&provider);
    let query = ChoicesQuery::new("books", "book_id");

    resolver.resolve(&query, &json!(1)).await;
    resolver.resolve(&query, &json!(3)).await;

    assert_eq!(provider.get_list_calls("books").len(), 1);
    assert_eq!(provider.get_many_calls("books").len(), 2);
}

#[tokio::test]
async fn shared_caches_dedupe_across_inputs() {
    let provider = Arc::new(MemoryProvider::new().with_records("books", books()));
    let caches = ResolverCaches::default();
    let first = resolver_for(&provider).with_caches(caches.clone());
    let second = resolver_for(&provider).with_caches(caches.clone());
    let query = ChoicesQuery::new("books", "book_id");

    let value = json!(2);
    let (a, b) = tokio::join!(
        first.resolve(&query, &value),
        second.resolve(&query, &value)
    );

    assert_eq!(a, b);
    assert_eq!(provider.get_list_calls("books").len(), 1);
    assert_eq!(provider.get_many_calls("books").len(), 1);
}

#[tokio::test]
async fn invalidate_forces_a_new_fetch() {
    let provider = Arc::new(MemoryProvider::new().with_records("books", books()));
    let resolver = resolver_for(&provider);
    let query = ChoicesQuery::new("books", "book_id");

    resolver.resolve(&query, &Value::Null).await;
    let mut shelf = books();
    shelf.push(Record::new(4).with("title", "Beloved"));
    provider.insert("books", shelf);
    resolver.invalidate("books");
    let resolved = resolver.resolve(&query, &Value::Null).await;

    assert_eq!(provider.get_list_calls("books").len(), 2);
    assert_eq!(resolved.total, Some(4));
}

#[tokio::test]
async fn predicate_blocks_candidate_fetch_only() {
    let provider = Arc::new(MemoryProvider::new().with_records("books", books()));
    let resolver = resolver_for(&provider)
        .with_enable_get_choices(Arc::new(|filter: &FilterValues| filter.contains_key("q")));

    let resolved = resolver
        .resolve(&ChoicesQuery::new("books", "book_id"), &json!(2))
        .await;

    assert!(provider.get_list_calls("books").is_empty());
    assert!(resolved.available_choices.is_empty());
    assert_eq!(id_list(&resolved.all_choices), ints(&[2]));
    assert_eq!(resolved.total, None);
}

#[tokio::test]
async fn disabled_query_fetches_nothing_for_empty_value() {
    let provider = Arc::new(MemoryProvider::new().with_records("books", books()));
    let resolver = resolver_for(&provider);

    let resolved = resolver
        .resolve(&ChoicesQuery::new("books", "book_id").with_enabled(false), &Value::Null)
        .await;

    assert!(provider.calls().is_empty());
    assert!(resolved.all_choices.is_empty());
}

#[tokio::test]
async fn backend_failure_is_reported() {
    let provider = Arc::new(MemoryProvider::new().with_records("books", books()));
    provider.set_failure("books", Some(DataError::with_status("unavailable", 503)));
    let resolver = resolver_for(&provider);

    let resolved = resolver
        .resolve(&ChoicesQuery::new("books", "book_id"), &json!(1))
        .await;

    assert_eq!(resolved.error, Some(DataError::with_status("unavailable", 503)));
    assert!(resolved.all_choices.is_empty());
    assert!(!resolved.is_loading);

    provider.set_failure("books", None);
    resolver.invalidate("books");
    let resolved = resolver
        .resolve(&ChoicesQuery::new("books", "book_id"), &json!(1))
        .await;
    assert_eq!(resolved.error, None);
    assert_eq!(resolved.all_choices.len(), 3);
}

// ============================================================================
// In-flight state
// ============================================================================

fn slow_provider() -> Arc<MemoryProvider> {
    Arc::new(
        MemoryProvider::new()
            .with_records("books", books())
            .with_latency(Duration::from_millis(50)),
    )
}

#[tokio::test(start_paused = true)]
async fn snapshot_distinguishes_first_load_from_reload() {
    let provider = slow_provider();
    let resolver = resolver_for(&provider);
    let first = ChoicesQuery::new("books", "book_id").with_pagination(Pagination::new(1, 2));

    let (resolved, during) = tokio::join!(resolver.resolve(&first, &Value::Null), async {
        tokio::task::yield_now().await;
        resolver.snapshot()
    });
    assert!(during.is_loading);
    assert!(during.is_fetching);
    assert!(!resolved.is_loading);
    assert!(!resolved.is_fetching);

    let second = first.clone().with_pagination(Pagination::new(2, 2));
    let (_, during) = tokio::join!(resolver.resolve(&second, &Value::Null), async {
        tokio::task::yield_now().await;
        resolver.snapshot()
    });
    assert!(during.is_fetching);
    assert!(!during.is_loading);
    assert_eq!(during.available_choices, resolved.available_choices);

    let settled = resolver.snapshot();
    assert!(!settled.is_fetching);
    assert_eq!(settled.available_choices.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_superseded_resolve_keeps_the_latest_result() {
    let provider = slow_provider();
    let caches = ResolverCaches::default();
    let warm = resolver_for(&provider).with_caches(caches.clone());
    let resolver = resolver_for(&provider).with_caches(caches);
    let old = ChoicesQuery::new("books", "book_id").with_filter(filter(json!({"shelf": "a"})));
    let new = ChoicesQuery::new("books", "book_id").with_filter(filter(json!({"shelf": "b"})));
    warm.resolve(&new, &Value::Null).await;

    let (old_resolved, new_resolved) = tokio::join!(resolver.resolve(&old, &Value::Null), async {
        tokio::task::yield_now().await;
        resolver.resolve(&new, &Value::Null).await
    });

    assert_eq!(id_list(&old_resolved.available_choices), ints(&[1]));
    assert_eq!(id_list(&new_resolved.available_choices), ints(&[2, 3]));
    assert_eq!(resolver.snapshot(), new_resolved);
    assert_eq!(provider.get_list_calls("books").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_resolve_does_not_stay_fetching() {
    let provider = slow_provider();
    let resolver = resolver_for(&provider);
    let query = ChoicesQuery::new("books", "book_id");

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), resolver.resolve(&query, &Value::Null))
            .await;
    assert!(abandoned.is_err());
    let snapshot = resolver.snapshot();
    assert!(!snapshot.is_fetching);
    assert!(!snapshot.is_loading);

    let resolved = resolver.resolve(&query, &Value::Null).await;
    assert_eq!(resolved.all_choices.len(), 3);
    assert!(!resolver.snapshot().is_fetching);
}

// ============================================================================
// Properties
// ============================================================================

fn id_records(ids: &[i64]) -> Vec<Record> {
    ids.iter().map(|id| Record::new(*id)).collect()
}

proptest! {
    #[test]
    fn merged_choices_hold_every_selected_record_once(
        available in prop::collection::hash_set(0i64..40, 0..15),
        selected in prop::collection::vec(0i64..40, 0..10),
        total in prop::option::of(0u64..1000),
    ) {
        let available: Vec<i64> = available.into_iter().collect();
        let available = id_records(&available);
        let selected = id_records(&selected);

        let (all, merged_total) = merge_choices(&available, &selected, total);

        let ids: Vec<&Identifier> = all.iter().map(Record::id).collect();
        let unique: HashSet<&Identifier> = ids.iter().copied().collect();
        prop_assert_eq!(unique.len(), ids.len());
        for record in &selected {
            prop_assert!(unique.contains(record.id()));
        }
        prop_assert_eq!(&all[all.len() - available.len()..], &available[..]);

        let added = (all.len() - available.len()) as u64;
        prop_assert_eq!(merged_total, total.map(|total| total + added));
    }
}
