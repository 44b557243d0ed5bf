//! Latest-per-identity listing and cursor walks.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::HashSet;
use xidb_core::{Page, Query, RecordStore, SortField, Xid};
use xidb_testkit::prelude::*;

const PATH: &str = "/info/x";

async fn walk(store: &RecordStore, mut query: Query) -> Vec<Page> {
    let ctx = xidb_core::Context::new();
    let mut pages = Vec::new();
    loop {
        let page = store.list(&ctx, &query).await.unwrap();
        let next = page.next_cursor.clone();
        pages.push(page);
        match next {
            Some(cursor) => query.after_cursor = Some(cursor),
            None => return pages,
        }
        assert!(pages.len() < 1_000, "cursor walk does not terminate");
    }
}

#[tokio::test]
async fn two_identities_one_per_page() {
    let store = TestStore::memory();
    let ctx = store.ctx();
    let factory = RecordFactory::new(PATH);
    store.create(&ctx, PATH, factory.record("u1", 10), None).await.unwrap();
    store.create(&ctx, PATH, factory.record("u2", 20), None).await.unwrap();

    let query = Query::new(PATH)
        .page_size(1)
        .sort_by(SortField::CreatedAt)
        .descending();
    let first = store.list(&ctx, &query).await.unwrap();
    assert_eq!(first.xids(), vec![&Xid::derive("u2")]);
    let cursor = first.next_cursor.expect("first page has a cursor");

    let second = store.list(&ctx, &query.clone().after(cursor)).await.unwrap();
    assert_eq!(second.xids(), vec![&Xid::derive("u1")]);
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn page_size_guardrail() {
    let store = TestStore::memory();
    let factory = RecordFactory::new(PATH);
    let ids: Vec<String> = (0..130).map(|i| format!("user-{i}")).collect();
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    scenarios::populate(&store, &factory, &ids, 1).await.unwrap();

    let ctx = store.ctx();
    for (requested, served) in [(0, 20), (-5, 20), (500, 100), (7, 7)] {
        let page = store
            .list(&ctx, &Query::new(PATH).page_size(requested))
            .await
            .unwrap();
        assert_eq!(page.records.len(), served, "page size {requested}");
        assert!(page.next_cursor.is_some());
    }
}

#[tokio::test]
async fn repeated_writes_do_not_inflate_listing() {
    let store = TestStore::memory();
    let factory = RecordFactory::new(PATH);
    scenarios::populate(&store, &factory, &["a", "b", "c"], 10)
        .await
        .unwrap();

    let pages = walk(&store, Query::new(PATH).page_size(2)).await;
    let total: usize = pages.iter().map(|p| p.records.len()).sum();
    assert_eq!(total, 3);
    assert_eq!(store.count(&store.ctx(), &Query::new(PATH)).await.unwrap(), 3);
    // Each identity is represented by its newest version.
    for record in pages.iter().flat_map(|p| &p.records) {
        assert!(record.metadata.created_at > 27);
    }
}

#[tokio::test]
async fn ties_on_created_at_neither_skip_nor_repeat() {
    let store = TestStore::memory();
    let ctx = store.ctx();
    let factory = RecordFactory::new(PATH);
    for i in 0..9 {
        store
            .create(&ctx, PATH, factory.record(&format!("tie-{i}"), 42), None)
            .await
            .unwrap();
    }

    for ascending in [true, false] {
        let mut query = Query::new(PATH).page_size(2);
        if ascending {
            query = query.ascending();
        }
        let pages = walk(&store, query).await;
        assert_eq!(pages.len(), 5);
        let seen: Vec<String> = pages
            .iter()
            .flat_map(|p| p.records.iter().map(|r| r.info.as_ref().unwrap().id.clone()))
            .collect();
        let mut expected: Vec<String> = (0..9).map(|i| format!("tie-{i}")).collect();
        if !ascending {
            expected.reverse();
        }
        assert_eq!(seen, expected);
    }
}

#[tokio::test]
async fn invalid_cursor_restarts() {
    let store = TestStore::memory();
    let ctx = store.ctx();
    let factory = RecordFactory::new(PATH);
    scenarios::populate(&store, &factory, &["a", "b", "c"], 1)
        .await
        .unwrap();

    let fresh = store.list(&ctx, &Query::new(PATH).page_size(2)).await.unwrap();
    let garbage = store
        .list(&ctx, &Query::new(PATH).page_size(2).after("not a cursor"))
        .await
        .unwrap();
    assert_eq!(fresh.xids(), garbage.xids());

    // A cursor minted for another sort order is not honored either.
    let by_name = Query::new(PATH).page_size(2).sort_by(SortField::Name);
    let foreign = store.list(&ctx, &by_name).await.unwrap().next_cursor.unwrap();
    let restarted = store
        .list(&ctx, &Query::new(PATH).page_size(2).after(foreign))
        .await
        .unwrap();
    assert_eq!(fresh.xids(), restarted.xids());
}

#[tokio::test]
async fn projection_keeps_identity_fields() {
    let store = TestStore::memory();
    let ctx = store.ctx();
    let factory = RecordFactory::new(PATH);
    store.create(&ctx, PATH, factory.record("p", 5), None).await.unwrap();

    let page = store
        .list(&ctx, &Query::new(PATH).project(["payload.id"]))
        .await
        .unwrap();
    let record = &page.records[0];
    assert_eq!(record.xid, Xid::derive("p"));
    assert_eq!(record.metadata.created_at, 5);
    assert_eq!(record.payload, serde_json::json!({ "id": "p" }));
    assert!(record.info.is_none());
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn cursor_walk_is_complete_and_ordered(
        plan in write_plan_strategy(12, 1, 60),
        page_size in page_size_strategy(),
        ascending in any::<bool>(),
    ) {
        runtime().block_on(async {
            let store = TestStore::memory();
            let ctx = store.ctx();
            let factory = RecordFactory::new(PATH);
            for (index, op) in plan.iter().enumerate() {
                let id = format!("id-{}", op.identity);
                store
                    .create(&ctx, PATH, factory.marked(&id, op.created_at, index), None)
                    .await
                    .unwrap();
            }

            let mut query = Query::new(PATH).page_size(page_size);
            if ascending {
                query = query.ascending();
            }
            let pages = walk(&store, query.clone()).await;
            let limit = query.effective_page_size();
            let markers: Vec<usize> = pages
                .iter()
                .flat_map(|p| p.records.iter().map(|r| marker_of(r).unwrap()))
                .collect();

            for page in &pages {
                prop_assert!(page.records.len() <= limit);
            }

            let latest = expected_latest(&plan);
            let mut expected: Vec<usize> = latest.values().copied().collect();
            expected.sort_by(|a, b| compare_by_created_at(&plan, *a, *b, ascending));
            prop_assert_eq!(&markers, &expected);

            let distinct: HashSet<usize> = markers.iter().map(|m| plan[*m].identity).collect();
            prop_assert_eq!(distinct.len(), markers.len());
            let count = store.count(&ctx, &Query::new(PATH)).await.unwrap();
            prop_assert_eq!(count, markers.len() as u64);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn every_sort_order_pages_completely(
        plan in write_plan_strategy(8, 1, 30),
        (sort, ascending) in sort_strategy(),
        page_size in 1i64..=4,
    ) {
        runtime().block_on(async {
            let store = TestStore::memory();
            let factory = RecordFactory::new(PATH);
            let ctx = store.ctx();
            for op in &plan {
                let id = format!("id-{}", op.identity);
                store.create(&ctx, PATH, factory.record(&id, op.created_at), None).await.unwrap();
            }

            let mut query = Query::new(PATH).page_size(page_size).sort_by(sort);
            if ascending {
                query = query.ascending();
            }
            let unpaged = store
                .list(&ctx, &Query { page_size: 100, after_cursor: None, ..query.clone() })
                .await
                .unwrap();
            let paged: Vec<Xid> = walk(&store, query)
                .await
                .into_iter()
                .flat_map(|p| p.records.into_iter().map(|r| r.xid))
                .collect();
            let unpaged: Vec<Xid> = unpaged.records.into_iter().map(|r| r.xid).collect();
            prop_assert_eq!(paged, unpaged);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
