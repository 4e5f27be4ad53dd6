//! Consent lifecycle and concurrency tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crosscontext::consent::{
    ConsentError, ConsentStatus, ConsentStore, CONSENT_ID_PREFIX, DEFAULT_DENIAL_REASON,
};
use crosscontext::ids::SequentialIds;
use crosscontext::types::{default_offset, ClassificationLevel};

use ClassificationLevel::{ConfidentialCloudEligible, OfficialClosed, OfficialOpen, Restricted};

fn store() -> ConsentStore {
    ConsentStore::new(Box::new(SequentialIds::new("consent_")), default_offset())
}

fn tools() -> Vec<String> {
    vec!["fetch_emails".to_owned(), "fetch_documents".to_owned()]
}

#[test]
fn create_computes_highest_and_requirement() {
    let store = store();
    let request = store
        .create(
            "Summarise procurement threads",
            &tools(),
            &[OfficialOpen, ConfidentialCloudEligible, OfficialOpen],
            12,
        )
        .expect("create should succeed");

    assert_eq!(request.consent_id, "consent_1");
    assert_eq!(request.status, ConsentStatus::Pending);
    assert_eq!(request.highest_classification, ConfidentialCloudEligible);
    assert!(request.requires_consent);
    assert_eq!(request.classifications.len(), 2);
    assert_eq!(request.estimated_data_count, 12);
    assert!(request.resolved_at.is_none());
    assert_eq!(request.created_at.offset().local_minus_utc(), 28_800);
}

#[test]
fn low_classifications_do_not_require_consent() {
    let store = store();
    let request = store
        .create("Read newsletters", &[], &[OfficialOpen, OfficialClosed], 3)
        .expect("create should succeed");
    assert!(!request.requires_consent);
    assert_eq!(request.highest_classification, OfficialClosed);

    let empty = store
        .create("Nothing", &[], &[], 0)
        .expect("create should succeed");
    assert_eq!(empty.highest_classification, OfficialOpen);
    assert!(!empty.requires_consent);
}

#[test]
fn grant_then_grant_again_conflicts() {
    let store = store();
    let id = store
        .create("op", &tools(), &[Restricted], 1)
        .expect("create")
        .consent_id;

    let granted = store.grant(&id, "director_007").expect("first grant wins");
    assert_eq!(granted.status, ConsentStatus::Granted);
    assert_eq!(granted.resolved_by.as_deref(), Some("director_007"));
    assert!(granted.resolved_at.is_some());

    match store.grant(&id, "director_008") {
        Err(ConsentError::TerminalStateConflict { id: conflict_id, status }) => {
            assert_eq!(conflict_id, id);
            assert_eq!(status, ConsentStatus::Granted);
        }
        other => panic!("expected TerminalStateConflict, got {other:?}"),
    }

    let after = store.get(&id).expect("still present");
    assert_eq!(after, granted, "losing call must not change state");
}

#[test]
fn deny_after_grant_conflicts_and_deny_records_reason() {
    let store = store();
    let a = store.create("a", &[], &[Restricted], 1).expect("create").consent_id;
    let b = store.create("b", &[], &[Restricted], 1).expect("create").consent_id;

    store.grant(&a, "officer_001").expect("grant");
    assert!(matches!(
        store.deny(&a, "officer_001", "changed my mind"),
        Err(ConsentError::TerminalStateConflict { .. })
    ));

    let denied = store.deny(&b, "officer_001", "Too broad").expect("deny");
    assert_eq!(denied.status, ConsentStatus::Denied);
    assert_eq!(denied.denial_reason.as_deref(), Some("Too broad"));

    let blank = store.create("c", &[], &[], 1).expect("create").consent_id;
    let denied = store.deny(&blank, "officer_001", "").expect("deny");
    assert_eq!(denied.denial_reason.as_deref(), Some(DEFAULT_DENIAL_REASON));
}

#[test]
fn unknown_ids_are_not_found() {
    let store = store();
    assert!(matches!(store.get("consent_404"), Err(ConsentError::NotFound(_))));
    assert!(matches!(
        store.grant("consent_404", "a"),
        Err(ConsentError::NotFound(_))
    ));
    assert!(matches!(
        store.deny("consent_404", "a", "no"),
        Err(ConsentError::NotFound(_))
    ));
}

#[test]
fn list_pending_excludes_resolved_and_keeps_creation_order() {
    let store = store();
    let ids: Vec<String> = (0..4)
        .map(|n| {
            store
                .create(&format!("op {n}"), &[], &[Restricted], 1)
                .expect("create")
                .consent_id
        })
        .collect();
    store.grant(&ids[1], "a").expect("grant");
    store.deny(&ids[2], "a", "no").expect("deny");

    let pending: Vec<String> = store
        .list_pending("officer_001")
        .expect("list")
        .into_iter()
        .map(|r| r.consent_id)
        .collect();
    assert_eq!(pending, vec![ids[0].clone(), ids[3].clone()]);
}

#[test]
fn racing_resolutions_have_exactly_one_winner() {
    const RACERS: usize = 16;
    let store = store();
    let id = store
        .create("contended", &[], &[ConfidentialCloudEligible], 1)
        .expect("create")
        .consent_id;

    let wins = AtomicUsize::new(0);
    let conflicts = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for n in 0..RACERS {
            let (store, id, wins, conflicts) = (&store, &id, &wins, &conflicts);
            scope.spawn(move || {
                let actor = format!("actor_{n}");
                let result = if n % 2 == 0 {
                    store.grant(id, &actor)
                } else {
                    store.deny(id, &actor, "racing")
                };
                match result {
                    Ok(_) => wins.fetch_add(1, Ordering::SeqCst),
                    Err(ConsentError::TerminalStateConflict { .. }) => {
                        conflicts.fetch_add(1, Ordering::SeqCst)
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                };
            });
        }
    });

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(conflicts.load(Ordering::SeqCst), RACERS - 1);
    assert!(store.get(&id).expect("present").status.is_terminal());
}

#[test]
fn concurrent_creates_allocate_distinct_ids() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;
    let store = ConsentStore::with_defaults();

    let ids: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let store = &store;
                scope.spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| store.create("op", &[], &[], 1).expect("create").consent_id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread should not panic"))
            .collect()
    });

    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), THREADS * PER_THREAD);
    assert!(ids.iter().all(|id| id.starts_with(CONSENT_ID_PREFIX)));
    assert_eq!(store.list_pending("a").expect("list").len(), THREADS * PER_THREAD);
}
