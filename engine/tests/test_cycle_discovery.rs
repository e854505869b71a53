//! End-to-end discovery scenarios
//!
//! Drives the documented trade-loop scenarios through the tenant manager:
//! bilateral swaps, triangles, disjoint pairs, dead ends, fan-ins, and
//! duplicate collapsing, plus the depth boundary behaviors.

use tradeweave_engine::models::{Delta, Item, TenantConfig};
use tradeweave_engine::tenant::TenantManager;

// ============================================================================
// Test Helpers
// ============================================================================

fn manager() -> TenantManager {
    TenantManager::new("scenario".to_string(), TenantConfig::default(), None).unwrap()
}

fn manager_with_depth(max_depth: usize) -> TenantManager {
    let config = TenantConfig {
        max_depth,
        ..TenantConfig::default()
    };
    TenantManager::new("scenario".to_string(), config, None).unwrap()
}

fn give(m: &TenantManager, account: &str, items: &[&str]) {
    m.submit_delta(Delta::Inventory {
        account: account.to_string(),
        added: items.iter().map(|id| Item::new(id.to_string())).collect(),
        removed: vec![],
    })
    .unwrap();
}

fn want(m: &TenantManager, account: &str, items: &[&str]) {
    m.submit_delta(Delta::Wants {
        account: account.to_string(),
        added: items.iter().map(|id| id.to_string()).collect(),
        removed: vec![],
    })
    .unwrap();
}

// ============================================================================
// Concrete scenarios
// ============================================================================

#[test]
fn scenario_bilateral_swap() {
    let m = manager();
    give(&m, "alice", &["nft_1"]);
    give(&m, "bob", &["nft_2"]);
    want(&m, "alice", &["nft_2"]);
    want(&m, "bob", &["nft_1"]);

    let cycles = m.query_active_cycles(10, None).unwrap();
    assert_eq!(cycles.len(), 1);
    let cycle = &cycles[0];
    assert_eq!(cycle.cycle.key(), "alice:nft_1|bob:nft_2");
    assert_eq!(cycle.cycle.accounts()[0], "alice", "canonical start is the smaller id");
    assert!(cycle.score >= 0.8 - 1e-9, "default weights give bilaterals 0.8");
}

#[test]
fn scenario_triangular_cycle() {
    let m = manager();
    give(&m, "a", &["n1"]);
    give(&m, "b", &["n2"]);
    give(&m, "c", &["n3"]);
    want(&m, "a", &["n3"]);
    want(&m, "b", &["n1"]);
    want(&m, "c", &["n2"]);

    let cycles = m.query_active_cycles(10, None).unwrap();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].cycle.len(), 3);
}

#[test]
fn scenario_two_disjoint_bilaterals() {
    let m = manager();
    give(&m, "a", &["n1"]);
    give(&m, "b", &["n2"]);
    want(&m, "a", &["n2"]);
    want(&m, "b", &["n1"]);
    give(&m, "c", &["n3"]);
    give(&m, "d", &["n4"]);
    want(&m, "c", &["n4"]);
    want(&m, "d", &["n3"]);

    let cycles = m.query_active_cycles(10, None).unwrap();
    assert_eq!(cycles.len(), 2);
    assert!(cycles.iter().all(|c| c.cycle.len() == 2));
}

#[test]
fn scenario_no_cycle() {
    let m = manager();
    give(&m, "a", &["n1"]);
    give(&m, "b", &["n2"]);
    give(&m, "x", &["n3"]);
    want(&m, "a", &["n2"]);
    want(&m, "b", &["n3"]);
    // the owner of n3 wants nothing back

    assert!(m.query_active_cycles(10, None).unwrap().is_empty());
}

#[test]
fn scenario_five_party_fan_in() {
    let m = manager();
    give(&m, "a", &["n1", "n6"]);
    give(&m, "b", &["n2"]);
    give(&m, "c", &["n3"]);
    give(&m, "d", &["n4"]);
    give(&m, "e", &["n5"]);
    want(&m, "a", &["n5"]);
    want(&m, "b", &["n1"]);
    want(&m, "c", &["n2"]);
    want(&m, "d", &["n3"]);
    want(&m, "e", &["n4", "n6"]);

    let cycles = m.query_active_cycles(10, None).unwrap();
    let lengths: Vec<usize> = cycles.iter().map(|c| c.cycle.len()).collect();
    assert!(lengths.contains(&5), "expected the 5-party loop, got {:?}", lengths);
    assert!(lengths.contains(&2), "expected the a⇄e bilateral, got {:?}", lengths);

    let five = cycles.iter().find(|c| c.cycle.len() == 5).unwrap();
    assert_eq!(five.cycle.key(), "a:n1|b:n2|c:n3|d:n4|e:n5");
    let two = cycles.iter().find(|c| c.cycle.len() == 2).unwrap();
    assert_eq!(two.cycle.key(), "a:n6|e:n5");
}

#[test]
fn scenario_duplicate_dedup_across_runs() {
    let m = manager();
    give(&m, "a", &["n1"]);
    give(&m, "b", &["n2"]);
    give(&m, "c", &["n3"]);
    want(&m, "a", &["n3"]);
    want(&m, "b", &["n1"]);
    want(&m, "c", &["n2"]);

    let first = m.query_active_cycles(10, None).unwrap();
    // re-run discovery over unchanged state: same identity, no duplicate
    m.run_scheduled_discovery();
    let second = m.query_active_cycles(10, None).unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].cycle.key(), second[0].cycle.key());
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[test]
fn empty_tenant_has_no_cycles() {
    let m = manager();
    assert!(m.query_active_cycles(10, None).unwrap().is_empty());
    let status = m.status();
    assert_eq!(status.accounts, 0);
    assert_eq!(status.edges, 0);
}

#[test]
fn self_wants_produce_nothing() {
    let m = manager();
    give(&m, "loner", &["n1", "n2"]);
    want(&m, "loner", &["n1", "n2"]);

    assert!(m.query_active_cycles(10, None).unwrap().is_empty());
    assert_eq!(m.status().edges, 0);
}

#[test]
fn depth_two_finds_only_bilaterals() {
    let m = manager_with_depth(2);
    // triangle
    give(&m, "a", &["n1"]);
    give(&m, "b", &["n2"]);
    give(&m, "c", &["n3"]);
    want(&m, "a", &["n3"]);
    want(&m, "b", &["n1"]);
    want(&m, "c", &["n2"]);
    // plus a bilateral
    give(&m, "x", &["m1"]);
    give(&m, "y", &["m2"]);
    want(&m, "x", &["m2"]);
    want(&m, "y", &["m1"]);

    let cycles = m.query_active_cycles(10, None).unwrap();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].cycle.len(), 2);
}

#[test]
fn ring_at_exactly_max_depth_is_found() {
    let depth = 10;
    let m = manager_with_depth(depth);
    for j in 0..depth {
        give(&m, &format!("a{:02}", j), &[&format!("i{:02}", j)]);
    }
    for j in 0..depth {
        want(&m, &format!("a{:02}", (j + 1) % depth), &[&format!("i{:02}", j)]);
    }

    let cycles = m.query_active_cycles(10, None).unwrap();
    assert_eq!(cycles.len(), 1, "the full ring is exactly one cycle");
    assert_eq!(cycles[0].cycle.len(), depth);
}

#[test]
fn ring_one_past_max_depth_is_not_found() {
    let depth = 4;
    let m = manager_with_depth(depth);
    let n = depth + 1;
    for j in 0..n {
        give(&m, &format!("a{:02}", j), &[&format!("i{:02}", j)]);
    }
    for j in 0..n {
        want(&m, &format!("a{:02}", (j + 1) % n), &[&format!("i{:02}", j)]);
    }

    assert!(m.query_active_cycles(10, None).unwrap().is_empty());
}

#[test]
fn monotone_progress_until_invalidation() {
    let m = manager();
    give(&m, "a", &["n1"]);
    give(&m, "b", &["n2"]);
    want(&m, "a", &["n2"]);
    let outcome = m
        .submit_delta(Delta::Wants {
            account: "b".to_string(),
            added: vec!["n1".to_string()],
            removed: vec![],
        })
        .unwrap();
    assert_eq!(outcome.new_cycles_discovered, 1);

    // once discoverable, subsequent queries keep seeing it
    for _ in 0..3 {
        assert_eq!(m.query_active_cycles(10, None).unwrap().len(), 1);
    }

    // until a delta invalidates it
    m.submit_delta(Delta::Wants {
        account: "b".to_string(),
        added: vec![],
        removed: vec!["n1".to_string()],
    })
    .unwrap();
    assert!(m.query_active_cycles(10, None).unwrap().is_empty());
}
