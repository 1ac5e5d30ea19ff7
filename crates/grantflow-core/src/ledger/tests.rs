//! Unit tests for the grant store.

use proptest::prelude::*;

use super::records::{GrantFunding, GrantInsert, MilestoneDraft, MilestoneStatus, StageStatus};
use super::store::{GrantStore, LedgerError};
use crate::identity::Address;

fn builder() -> Address {
    Address::from_bytes([0xb1; 20])
}

fn admin() -> Address {
    Address::from_bytes([0xad; 20])
}

fn eth_insert(builder: Address, requested_funds: u128) -> GrantInsert {
    GrantInsert {
        title: "Decentralized indexer".to_string(),
        description: "An indexer for everyone".to_string(),
        milestones: Some("1. design\n2. build\n3. ship".to_string()),
        funding: GrantFunding::Eth { requested_funds },
        showcase_video_url: None,
        github: "indexer-dev".to_string(),
        email: "dev@example.org".to_string(),
        twitter: None,
        telegram: None,
        builder_address: builder,
    }
}

fn usdc_insert(builder: Address) -> GrantInsert {
    GrantInsert {
        title: "Large infra grant".to_string(),
        description: "Infrastructure work".to_string(),
        milestones: None,
        funding: GrantFunding::Usdc,
        showcase_video_url: None,
        github: "infra-dev".to_string(),
        email: "infra@example.org".to_string(),
        twitter: None,
        telegram: None,
        builder_address: builder,
    }
}

fn drafts(amounts: &[u128]) -> Vec<MilestoneDraft> {
    amounts
        .iter()
        .map(|&amount| MilestoneDraft {
            description: format!("deliver {amount}"),
            proposed_deliverables: "code and docs".to_string(),
            amount,
            proposed_completion_date: Some(1_900_000_000),
        })
        .collect()
}

#[test]
fn test_grant_numbers_increment_per_builder() {
    let store = GrantStore::in_memory().unwrap();

    let first = store.create_grant(&eth_insert(builder(), 100), &[]).unwrap();
    let second = store.create_grant(&eth_insert(builder(), 200), &[]).unwrap();
    assert_eq!(first.grant_number, 1);
    assert_eq!(second.grant_number, 2);

    // A different builder starts back at 1.
    let other = Address::from_bytes([0xb2; 20]);
    let third = store.create_grant(&eth_insert(other, 300), &[]).unwrap();
    assert_eq!(third.grant_number, 1);
}

#[test]
fn test_grant_numbers_independent_per_kind() {
    let store = GrantStore::in_memory().unwrap();

    store.create_grant(&eth_insert(builder(), 100), &[]).unwrap();
    let large = store
        .create_grant(&usdc_insert(builder()), &drafts(&[500]))
        .unwrap();
    assert_eq!(large.grant_number, 1);
}

#[test]
fn test_create_grant_creates_stage_one_proposed() {
    let store = GrantStore::in_memory().unwrap();
    let created = store.create_grant(&eth_insert(builder(), 100), &[]).unwrap();

    let stage = store.latest_stage(created.grant_id).unwrap();
    assert_eq!(stage.id, created.stage_id);
    assert_eq!(stage.stage_number, 1);
    assert_eq!(stage.status, StageStatus::Proposed);
    assert!(created.milestone_ids.is_empty());
}

#[test]
fn test_requested_funds_roundtrip_at_wei_scale() {
    let store = GrantStore::in_memory().unwrap();
    // 1 ETH in wei, and something beyond i64 range to prove TEXT storage.
    let huge = 340_282_366_920_938_463_463_374_607_431_768_211_455u128;
    let created = store.create_grant(&eth_insert(builder(), huge), &[]).unwrap();

    let grant = store.grant_by_id(created.grant_id).unwrap();
    assert_eq!(
        grant.funding,
        GrantFunding::Eth {
            requested_funds: huge
        }
    );
}

#[test]
fn test_milestones_numbered_in_input_order() {
    let store = GrantStore::in_memory().unwrap();
    let created = store
        .create_grant(&usdc_insert(builder()), &drafts(&[100, 200, 300]))
        .unwrap();

    let milestones = store.milestones_for_stage(created.stage_id).unwrap();
    assert_eq!(milestones.len(), 3);
    // The returned IDs identify the stored rows, in input order.
    let stored_ids: Vec<u64> = milestones.iter().map(|m| m.id).collect();
    assert_eq!(created.milestone_ids, stored_ids);
    for (index, milestone) in milestones.iter().enumerate() {
        assert_eq!(milestone.milestone_number, index as u32 + 1);
        assert_eq!(milestone.status, MilestoneStatus::Proposed);
    }
    assert_eq!(milestones[0].amount, 100);
    assert_eq!(milestones[2].amount, 300);
}

#[test]
fn test_stage_number_conflict_detected() {
    let store = GrantStore::in_memory().unwrap();
    let created = store.create_grant(&eth_insert(builder(), 100), &[]).unwrap();

    // Stage 1 already exists; a stale client re-submitting it must fail.
    let result = store.create_stage(created.grant_id, 1, Some("again"), &[]);
    assert!(matches!(
        result,
        Err(LedgerError::StageNumberConflict {
            stage_number: 1,
            ..
        })
    ));

    // And nothing was written.
    let stages = store.stages_for_grant(created.grant_id).unwrap();
    assert_eq!(stages.len(), 1);
}

#[test]
fn test_stages_listed_latest_first() {
    let store = GrantStore::in_memory().unwrap();
    let created = store.create_grant(&eth_insert(builder(), 100), &[]).unwrap();
    store.create_stage(created.grant_id, 2, Some("next"), &[]).unwrap();
    store.create_stage(created.grant_id, 3, Some("after"), &[]).unwrap();

    let stages = store.stages_for_grant(created.grant_id).unwrap();
    let numbers: Vec<u32> = stages.iter().map(|s| s.stage_number).collect();
    assert_eq!(numbers, vec![3, 2, 1]);
    assert_eq!(store.latest_stage(created.grant_id).unwrap().stage_number, 3);
}

#[test]
fn test_duplicate_vote_rejected_not_overwritten() {
    let store = GrantStore::in_memory().unwrap();
    let created = store.create_grant(&eth_insert(builder(), 100), &[]).unwrap();
    store.ensure_user(admin()).unwrap();

    store.insert_vote(created.stage_id, admin(), 500).unwrap();
    let result = store.insert_vote(created.stage_id, admin(), 900);
    assert!(matches!(
        result,
        Err(LedgerError::DuplicateVote { author, .. }) if author == admin()
    ));

    // The original vote amount survives.
    let votes = store.votes_for_stage(created.stage_id).unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].amount, 500);
}

#[test]
fn test_approve_stage_cascades_to_milestones() {
    let store = GrantStore::in_memory().unwrap();
    let created = store
        .create_grant(&usdc_insert(builder()), &drafts(&[100, 200]))
        .unwrap();

    store.approve_stage(created.stage_id, None, Some("0xabc"), None).unwrap();

    let stage = store.stage_by_id(created.stage_id).unwrap();
    assert_eq!(stage.status, StageStatus::Approved);
    assert_eq!(stage.approved_tx.as_deref(), Some("0xabc"));
    assert!(stage.approved_at.is_some());

    for milestone in store.milestones_for_stage(created.stage_id).unwrap() {
        assert_eq!(milestone.status, MilestoneStatus::Approved);
    }
}

#[test]
fn test_approve_missing_stage_not_found() {
    let store = GrantStore::in_memory().unwrap();
    let result = store.approve_stage(999, None, None, None);
    assert!(matches!(
        result,
        Err(LedgerError::StageNotFound { stage_id: 999 })
    ));
}

#[test]
fn test_pay_last_milestone_completes_stage() {
    let store = GrantStore::in_memory().unwrap();
    let created = store
        .create_grant(&usdc_insert(builder()), &drafts(&[100, 200]))
        .unwrap();
    store.approve_stage(created.stage_id, None, None, None).unwrap();

    let completed = store
        .pay_milestone(created.milestone_ids[0], "0x01", None)
        .unwrap();
    assert!(!completed);
    assert_eq!(
        store.stage_by_id(created.stage_id).unwrap().status,
        StageStatus::Approved
    );

    let completed = store
        .pay_milestone(created.milestone_ids[1], "0x02", None)
        .unwrap();
    assert!(completed);
    assert_eq!(
        store.stage_by_id(created.stage_id).unwrap().status,
        StageStatus::Completed
    );
}

#[test]
fn test_milestone_resubmission_clears_rejection() {
    let store = GrantStore::in_memory().unwrap();
    let created = store
        .create_grant(&usdc_insert(builder()), &drafts(&[100]))
        .unwrap();
    let milestone_id = created.milestone_ids[0];

    store.reject_milestone(milestone_id, Some("not enough detail")).unwrap();
    let rejected = store.milestone_by_id(milestone_id).unwrap();
    assert_eq!(rejected.status, MilestoneStatus::Rejected);
    assert_eq!(rejected.status_note.as_deref(), Some("not enough detail"));

    store.resubmit_milestone(milestone_id, "full writeup").unwrap();
    let resubmitted = store.milestone_by_id(milestone_id).unwrap();
    assert_eq!(resubmitted.status, MilestoneStatus::Proposed);
    assert_eq!(resubmitted.completion_proof.as_deref(), Some("full writeup"));
    assert_eq!(resubmitted.status_note, None);
}

#[test]
fn test_ensure_user_defaults_to_grantee() {
    let store = GrantStore::in_memory().unwrap();
    let user = store.ensure_user(builder()).unwrap();
    assert_eq!(user.role, super::records::UserRole::Grantee);

    // Idempotent; role survives a second ensure.
    store.set_user_role(builder(), super::records::UserRole::Admin).unwrap();
    let again = store.ensure_user(builder()).unwrap();
    assert_eq!(again.role, super::records::UserRole::Admin);
    assert_eq!(again.id, user.id);
}

#[test]
fn test_private_notes_append_in_order() {
    let store = GrantStore::in_memory().unwrap();
    let created = store.create_grant(&eth_insert(builder(), 100), &[]).unwrap();
    store.ensure_user(admin()).unwrap();

    store.insert_private_note(created.stage_id, admin(), "first").unwrap();
    store.insert_private_note(created.stage_id, admin(), "second").unwrap();

    let notes = store.notes_for_stage(created.stage_id).unwrap();
    let texts: Vec<&str> = notes.iter().map(|n| n.note.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[test]
fn test_all_grants_mixes_kinds() {
    let store = GrantStore::in_memory().unwrap();
    store.create_grant(&eth_insert(builder(), 100), &[]).unwrap();
    store
        .create_grant(&usdc_insert(builder()), &drafts(&[500]))
        .unwrap();

    let grants = store.all_grants().unwrap();
    assert_eq!(grants.len(), 2);
    // Consumers must be able to switch on the discriminator exhaustively.
    for grant in &grants {
        match grant.funding {
            GrantFunding::Eth { requested_funds } => assert_eq!(requested_funds, 100),
            GrantFunding::Usdc => {},
        }
    }
}

#[test]
fn test_public_projection_drops_contact_fields() {
    let store = GrantStore::in_memory().unwrap();
    let insert = GrantInsert {
        twitter: Some("@indexer".to_string()),
        telegram: Some("indexer_dev".to_string()),
        ..eth_insert(builder(), 100)
    };
    store.create_grant(&insert, &[]).unwrap();

    let public = store.public_grants().unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].title, insert.title);
    assert_eq!(public[0].builder_address, builder());

    // The projection type has no contact fields at all; serializing it
    // must not leak them either.
    let json = serde_json::to_value(&public[0]).unwrap();
    assert!(json.get("email").is_none());
    assert!(json.get("twitter").is_none());
    assert!(json.get("telegram").is_none());
}

#[test]
fn test_open_on_disk_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grants.db");

    let created = {
        let store = GrantStore::open(&path).unwrap();
        store.create_grant(&eth_insert(builder(), 42), &[]).unwrap()
    };

    let store = GrantStore::open(&path).unwrap();
    let grant = store.grant_by_id(created.grant_id).unwrap();
    assert_eq!(grant.grant_number, created.grant_number);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Grant numbers stay dense from 1 per (builder, kind) no matter how
    // many grants of each kind a builder accumulates.
    #[test]
    fn prop_grant_numbers_dense_per_kind(eth_count in 0usize..4, usdc_count in 0usize..4) {
        let store = GrantStore::in_memory().unwrap();
        for _ in 0..eth_count {
            store.create_grant(&eth_insert(builder(), 10), &[]).unwrap();
        }
        for _ in 0..usdc_count {
            store
                .create_grant(&usdc_insert(builder()), &drafts(&[1]))
                .unwrap();
        }

        let grants = store.builder_grants(builder()).unwrap();
        let mut eth_numbers: Vec<u32> = grants
            .iter()
            .filter(|g| matches!(g.funding, GrantFunding::Eth { .. }))
            .map(|g| g.grant_number)
            .collect();
        let mut usdc_numbers: Vec<u32> = grants
            .iter()
            .filter(|g| matches!(g.funding, GrantFunding::Usdc))
            .map(|g| g.grant_number)
            .collect();
        eth_numbers.sort_unstable();
        usdc_numbers.sort_unstable();

        prop_assert_eq!(eth_numbers, (1..=eth_count as u32).collect::<Vec<_>>());
        prop_assert_eq!(usdc_numbers, (1..=usdc_count as u32).collect::<Vec<_>>());
    }
}
