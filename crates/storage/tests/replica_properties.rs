//! Model-based property tests for replica and index consistency
//!
//! Every generated event sequence is applied both to a replica and to a
//! plain `BTreeMap` fold; the two must agree on:
//! 1. `get` for every key the sequence touched
//! 2. Index contents: each present entity is found under its current hash
//!    and no stale hash still returns it
//! 3. Deleting twice equals deleting once

mod common;

use std::collections::BTreeMap;

use common::*;
use configstore_core::hash::hash64_pair;
use configstore_core::{ChangeEvent, ChangeKind, EntityKey};
use configstore_storage::Replica;
use proptest::prelude::*;

const NAMES: [&str; 6] = ["ada", "bob", "cyd", "dee", "eve", "fay"];
const EMAILS: [&str; 4] = ["a@x", "b@x", "c@x", "d@x"];
const TEAMS: [&str; 2] = ["red", "blue"];
const ROLES: [&str; 2] = ["owner", "viewer"];

fn arb_kind() -> impl Strategy<Value = ChangeKind> {
    prop_oneof![
        Just(ChangeKind::Created),
        Just(ChangeKind::Updated),
        Just(ChangeKind::Deleted),
    ]
}

fn arb_member() -> impl Strategy<Value = Member> {
    (
        0..NAMES.len(),
        0..EMAILS.len(),
        prop::option::of(0..TEAMS.len()),
        0..ROLES.len(),
        any::<u64>(),
    )
        .prop_map(|(name, email, team, role, quota)| {
            let mut m = member(NAMES[name], EMAILS[email], quota);
            m.team = team.map(|t| team_key(TEAMS[t]));
            m.role = ROLES[role].to_string();
            m
        })
}

fn arb_events() -> impl Strategy<Value = Vec<ChangeEvent<Member>>> {
    prop::collection::vec(
        (arb_kind(), arb_member()).prop_map(|(kind, entity)| ChangeEvent { kind, entity }),
        0..64,
    )
}

fn fold(model: &mut BTreeMap<EntityKey, Member>, event: &ChangeEvent<Member>) {
    match event.kind {
        ChangeKind::Created | ChangeKind::Updated => {
            model.insert(event.entity.key.clone(), event.entity.clone());
        }
        ChangeKind::Deleted => {
            model.remove(&event.entity.key);
        }
    }
}

fn team_role_hash(team: &str, role: &str) -> u64 {
    hash64_pair(email_hash(team), email_hash(role))
}

/// Index contents as sorted key lists, for whole-state comparison
fn index_view(replica: &Replica<Member>) -> Vec<Vec<EntityKey>> {
    let mut view = Vec::new();
    for email in EMAILS {
        let mut keys: Vec<_> = replica
            .lookup_all(BY_EMAIL, email_hash(email))
            .iter()
            .map(|m| m.key.clone())
            .collect();
        keys.sort();
        view.push(keys);
    }
    for team in TEAMS {
        for role in ROLES {
            let mut keys: Vec<_> = replica
                .lookup_all(BY_TEAM_ROLE, team_role_hash(team, role))
                .iter()
                .map(|m| m.key.clone())
                .collect();
            keys.sort();
            view.push(keys);
        }
    }
    view
}

proptest! {
    #[test]
    fn prop_get_matches_fold(events in arb_events()) {
        let replica = member_replica();
        let mut model = BTreeMap::new();

        for event in &events {
            replica.apply(event.clone());
            fold(&mut model, event);
        }

        for name in NAMES {
            let key = member_key(name);
            let got = replica.get(&key);
            prop_assert_eq!(got.as_deref(), model.get(&key));
        }
        prop_assert_eq!(replica.len(), model.len());
        prop_assert_eq!(replica.applied_events(), events.len() as u64);
    }

    #[test]
    fn prop_index_tracks_current_values(events in arb_events()) {
        let replica = member_replica();
        let mut model = BTreeMap::new();

        for event in &events {
            replica.apply(event.clone());
            fold(&mut model, event);
        }

        for email in EMAILS {
            let mut expected: Vec<_> = model
                .values()
                .filter(|m| m.email == email)
                .map(|m| m.key.clone())
                .collect();
            expected.sort();

            let mut found: Vec<_> = replica
                .lookup_all(BY_EMAIL, email_hash(email))
                .iter()
                .map(|m| m.key.clone())
                .collect();
            found.sort();

            prop_assert_eq!(found, expected);
        }

        for team in TEAMS {
            for role in ROLES {
                let mut expected: Vec<_> = model
                    .values()
                    .filter(|m| {
                        m.team.as_ref().and_then(EntityKey::name) == Some(team) && m.role == role
                    })
                    .map(|m| m.key.clone())
                    .collect();
                expected.sort();

                let mut found: Vec<_> = replica
                    .lookup_all(BY_TEAM_ROLE, team_role_hash(team, role))
                    .iter()
                    .map(|m| m.key.clone())
                    .collect();
                found.sort();

                // Superseded (team, role) pairs no longer return the entity
                prop_assert_eq!(found, expected);
            }
        }

        for m in model.values() {
            let hit = replica.lookup_where(BY_EMAIL, email_hash(&m.email), |e| e.key == m.key);
            prop_assert_eq!(hit.as_deref(), Some(m));
        }
    }

    #[test]
    fn prop_delete_is_idempotent(events in arb_events(), target in arb_member()) {
        let once = member_replica();
        let twice = member_replica();

        for event in &events {
            once.apply(event.clone());
            twice.apply(event.clone());
        }
        once.apply(ChangeEvent::deleted(target.clone()));
        twice.apply(ChangeEvent::deleted(target.clone()));
        twice.apply(ChangeEvent::deleted(target.clone()));

        let mut once_keys = once.keys();
        let mut twice_keys = twice.keys();
        once_keys.sort();
        twice_keys.sort();
        prop_assert_eq!(once_keys, twice_keys);
        prop_assert_eq!(index_view(&once), index_view(&twice));
    }

    #[test]
    fn prop_snapshot_is_frozen(before in arb_events(), after in arb_events()) {
        let replica = member_replica();
        let mut model = BTreeMap::new();

        for event in &before {
            replica.apply(event.clone());
            fold(&mut model, event);
        }
        let snapshot = replica.snapshot();
        let frozen_index = index_view(&replica);

        for event in &after {
            replica.apply(event.clone());
        }

        for name in NAMES {
            let key = member_key(name);
            let got = snapshot.get(&key);
            prop_assert_eq!(got.as_deref(), model.get(&key));
        }
        for (i, email) in EMAILS.iter().enumerate() {
            let mut keys: Vec<_> = snapshot
                .lookup_all(BY_EMAIL, email_hash(email))
                .iter()
                .map(|m| m.key.clone())
                .collect();
            keys.sort();
            prop_assert_eq!(&keys, &frozen_index[i]);
        }
    }
}

#[test]
fn test_u64_max_survives_apply() {
    let replica = member_replica();
    let m = member("ada", "a@x", u64::MAX);

    replica.apply(ChangeEvent::created(m.clone()));

    assert_eq!(replica.get(&m.key).unwrap().quota, u64::MAX);
}

#[test]
fn test_absent_foreign_key_stays_absent() {
    let replica = member_replica();
    let without = member("ada", "a@x", 0);
    let mut with = member("bob", "b@x", 0);
    with.team = Some(team_key("red"));

    replica.apply(ChangeEvent::created(without.clone()));
    replica.apply(ChangeEvent::created(with.clone()));

    assert_eq!(replica.get(&without.key).unwrap().team, None);
    let team = replica.get(&with.key).unwrap().team.clone().unwrap();
    assert_eq!(team, team_key("red"));
    assert!(!team.is_incomplete());
}
