//! Random grant / revoke / expire timelines: `find_active` must return
//! exactly the grants that are effective, unexpired and unrevoked at `t`.

use proptest::prelude::*;
use seal_ledger::{AuthorityLedger, GrantRequest};
use seal_core::Timestamp;

const BASE: i64 = 1_771_632_000; // 2026-02-21T00:00:00Z
const ACTORS: [&str; 3] = ["alice", "bob", "carol"];

#[derive(Debug, Clone)]
struct GrantEvent {
    actor: usize,
    effective: i64,
    lifetime: Option<i64>,
    revoked: Option<i64>,
}

fn grant_event() -> impl Strategy<Value = GrantEvent> {
    (
        0usize..ACTORS.len(),
        0i64..1_000,
        prop::option::of(1i64..1_000),
        prop::option::of(0i64..2_000),
    )
        .prop_map(|(actor, effective, lifetime, revoked)| GrantEvent {
            actor,
            effective,
            lifetime,
            revoked,
        })
}

fn at(offset: i64) -> Timestamp {
    Timestamp::from_epoch_secs(BASE + offset).unwrap()
}

fn expected_active(events: &[GrantEvent], actor: usize, t: i64) -> Vec<String> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.actor == actor)
        .filter(|(_, e)| e.effective <= t)
        .filter(|(_, e)| e.lifetime.map_or(true, |l| e.effective + l > t))
        .filter(|(_, e)| e.revoked.map_or(true, |r| r > t))
        .map(|(i, _)| format!("GRANT-{i}"))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn find_active_matches_the_model(
        events in prop::collection::vec(grant_event(), 1..8),
        queries in prop::collection::vec((0usize..ACTORS.len(), 0i64..2_500), 1..6),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AuthorityLedger::open(dir.path().join("ledger.ndjson"));

        for (i, e) in events.iter().enumerate() {
            let mut req = GrantRequest::new(
                format!("GRANT-{i}"),
                ACTORS[e.actor],
                "Operator",
                at(e.effective),
            );
            if let Some(l) = e.lifetime {
                req = req.expires_at(at(e.effective + l));
            }
            ledger.append(req).unwrap();
        }
        for (i, e) in events.iter().enumerate() {
            if let Some(r) = e.revoked {
                ledger.revoke(&format!("GRANT-{i}"), "timeline", at(r)).unwrap();
            }
        }
        prop_assert!(ledger.verify().passed());

        for (actor, t) in queries {
            let mut got: Vec<String> = ledger
                .find_active(ACTORS[actor], at(t))
                .unwrap()
                .into_iter()
                .map(|e| e.body.authority_id)
                .collect();
            got.sort();
            let mut want = expected_active(&events, actor, t);
            want.sort();
            prop_assert_eq!(got, want, "actor {} at +{}", ACTORS[actor], t);
        }
    }
}
