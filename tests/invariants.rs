//! Property tests for the cache invariants under arbitrary interleavings of
//! page loads, realtime events and optimistic mutations.

use notification_sync::{
    reconcile, ChangeEvent, NotificationCache, NotificationId, NotificationKind,
    NotificationRecord, Page, Pagination, ReadTransaction,
};
use proptest::prelude::*;
use std::collections::HashSet;

fn record(id: u8, is_read: bool) -> NotificationRecord {
    let mut r = NotificationRecord::new(
        format!("n-{}", id),
        NotificationKind::System,
        format!("title {}", id),
        "body",
    );
    r.is_read = is_read;
    r
}

fn page(current_page: u32, records: Vec<NotificationRecord>, has_next: bool) -> Page {
    Page {
        pagination: Pagination {
            page_size: records.len() as u32,
            current_page,
            total_items: records.len() as u64,
            total_pages: current_page + u32::from(has_next),
            has_next,
            has_prev: current_page > 1,
        },
        records,
    }
}

#[derive(Clone, Debug)]
enum Op {
    Insert(u8, bool),
    Update(u8, bool),
    Delete(u8),
    /// Optimistic mark-as-read, an optional realtime event landing while the
    /// confirmation is outstanding, then confirm or roll back.
    MarkRead {
        id: u8,
        concurrent: Option<Box<Op>>,
        confirmed: bool,
    },
    MarkAll,
    FirstPage(Vec<(u8, bool)>),
}

fn event_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..12, any::<bool>()).prop_map(|(id, read)| Op::Insert(id, read)),
        (0u8..12, any::<bool>()).prop_map(|(id, read)| Op::Update(id, read)),
        (0u8..12).prop_map(Op::Delete),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => event_op(),
        2 => (0u8..12, prop::option::of(event_op()), any::<bool>()).prop_map(
            |(id, concurrent, confirmed)| Op::MarkRead {
                id,
                concurrent: concurrent.map(Box::new),
                confirmed,
            }
        ),
        1 => Just(Op::MarkAll),
        1 => prop::collection::vec((0u8..12, any::<bool>()), 0..8).prop_map(Op::FirstPage),
    ]
}

fn apply(cache: &mut NotificationCache, op: Op) {
    match op {
        Op::Insert(id, read) => {
            reconcile(cache, ChangeEvent::insert(record(id, read)));
        }
        Op::Update(id, read) => {
            reconcile(cache, ChangeEvent::update(record(id, read)));
        }
        Op::Delete(id) => {
            reconcile(cache, ChangeEvent::delete(record(id, false)));
        }
        Op::MarkRead {
            id,
            concurrent,
            confirmed,
        } => {
            let transaction =
                ReadTransaction::begin(cache, NotificationId::from(format!("n-{}", id)), true);
            if let Some(event) = concurrent {
                apply(cache, *event);
            }
            if !confirmed {
                transaction.revert(cache);
            }
        }
        Op::MarkAll => {
            cache.mark_all_read();
        }
        Op::FirstPage(entries) => {
            let records = entries.into_iter().map(|(id, read)| record(id, read)).collect();
            cache.replace_with_first_page(page(1, records, true));
        }
    }
}

fn assert_consistent(cache: &NotificationCache) -> Result<(), TestCaseError> {
    prop_assert_eq!(cache.unread_count(), cache.local_unread());

    let ids: HashSet<_> = cache.records().iter().map(|r| &r.id).collect();
    prop_assert_eq!(ids.len(), cache.len());
    Ok(())
}

proptest! {
    #[test]
    fn prop_counter_matches_cache(ops in prop::collection::vec(op(), 0..60)) {
        let mut cache = NotificationCache::new();
        for op in ops {
            apply(&mut cache, op);
            assert_consistent(&cache)?;
        }
    }

    #[test]
    fn prop_rollback_restores_untouched_record(
        others in prop::collection::vec((1u8..12, any::<bool>()), 0..8),
    ) {
        let mut entries = vec![(0u8, false)];
        entries.extend(others);
        let mut cache = NotificationCache::new();
        let records = entries.into_iter().map(|(id, read)| record(id, read)).collect();
        cache.replace_with_first_page(page(1, records, false));
        let before: Vec<_> = cache.records().to_vec();
        let unread = cache.unread_count();

        let id = NotificationId::from("n-0");
        let transaction = ReadTransaction::begin(&mut cache, id.clone(), true);
        prop_assert!(transaction.applied());
        prop_assert_eq!(cache.unread_count(), unread - 1);

        prop_assert!(transaction.revert(&mut cache));
        prop_assert_eq!(cache.records(), &before[..]);
        prop_assert_eq!(cache.unread_count(), unread);
    }

    #[test]
    fn prop_later_pages_never_duplicate(
        first in prop::collection::vec(0u8..20, 0..10),
        later in prop::collection::vec(prop::collection::vec(0u8..20, 0..10), 0..4),
        live in prop::collection::vec(0u8..20, 0..5),
    ) {
        let mut cache = NotificationCache::new();
        let records = first.iter().map(|id| record(*id, true)).collect();
        cache.replace_with_first_page(page(1, records, true));
        for id in live {
            reconcile(&mut cache, ChangeEvent::insert(record(id, true)));
        }
        for (i, ids) in later.into_iter().enumerate() {
            let records = ids.iter().map(|id| record(*id, true)).collect();
            cache.append_page(page(i as u32 + 2, records, true));
        }

        let ids: HashSet<_> = cache.records().iter().map(|r| r.id.clone()).collect();
        prop_assert_eq!(ids.len(), cache.len());
    }
}
