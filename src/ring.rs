use std::collections::HashSet;

// FNV-1a, 32-bit. Placement only cares about a stable, well-spread hash.
fn hash(s: &str) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for b in s.as_bytes() {
        h ^= u32::from(*b);
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

/// Index of the node that coordinates writes for this user.
pub fn coordinator_index(username: &str, n_servers: usize) -> usize {
    hash(username) as usize % n_servers
}

/// Rotation of `[0, n_servers)` starting at the coordinator. The first
/// `n_replicas` entries are the primary set, the rest are fallbacks in the
/// order they should be tried.
pub fn preference_list(username: &str, n_servers: usize) -> Vec<usize> {
    let first = coordinator_index(username, n_servers);
    (0..n_servers).map(|i| (first + i) % n_servers).collect()
}

// Membership in the half-open rotation [first, first + n_replicas), wrap-safe.
fn in_primary_set(index: usize, first: usize, n_servers: usize, n_replicas: usize) -> bool {
    (index + n_servers - first) % n_servers < n_replicas
}

/// Which primary the copy placed at `candidate` stands in for. `None` means
/// `candidate` is itself in the primary set and no hint is needed. Otherwise
/// the first ring index from the coordinator forward that neither holds a
/// replica nor is already assigned to another substitute.
///
/// While the coordinator is short of `n_replicas` acks, each counted ack
/// covers exactly one primary slot, so a free primary exists and the scan
/// finds it before reaching any fallback.
pub(crate) fn handoff_target(
    username: &str,
    candidate: usize,
    replicated: &HashSet<usize>,
    assigned: &HashSet<usize>,
    n_servers: usize,
    n_replicas: usize,
) -> Option<usize> {
    let first = coordinator_index(username, n_servers);
    if in_primary_set(candidate, first, n_servers, n_replicas) {
        return None;
    }

    (0..n_servers)
        .map(|step| (first + step) % n_servers)
        .find(|j| !replicated.contains(j) && !assigned.contains(j))
}

#[cfg(test)]
mod tests {
    use super::*;

    // search for a username whose coordinator is the wanted index
    fn username_for_coordinator(target: usize, n_servers: usize) -> String {
        (0u64..100_000)
            .map(|i| format!("user{i}"))
            .find(|u| coordinator_index(u, n_servers) == target)
            .expect("should find a username mapping to the target node")
    }

    #[test]
    fn preference_list_is_a_permutation() {
        for name in ["alice", "bob", "carol", ""] {
            let list = preference_list(name, 7);
            let mut sorted = list.clone();
            sorted.sort();
            assert_eq!(sorted, (0..7).collect::<Vec<_>>());
        }
    }

    #[test]
    fn preference_list_is_deterministic() {
        assert_eq!(preference_list("alice", 5), preference_list("alice", 5));
    }

    #[test]
    fn preference_list_starts_at_coordinator_and_rotates() {
        let list = preference_list("alice", 5);
        assert_eq!(list[0], coordinator_index("alice", 5));
        for i in 1..list.len() {
            assert_eq!(list[i], (list[i - 1] + 1) % 5);
        }
    }

    #[test]
    fn coordinators_distribute_across_nodes() {
        let n = 5;
        let mut counts = vec![0usize; n];
        for i in 0..1000 {
            counts[coordinator_index(&format!("user{i}"), n)] += 1;
        }
        for (node, count) in counts.iter().enumerate() {
            assert!(
                *count > 50,
                "node {} coordinates only {} of 1000 users, distribution looks broken",
                node,
                count
            );
        }
    }

    #[test]
    fn no_hint_inside_primary_set() {
        let n = 5;
        let r = 3;
        let user = username_for_coordinator(1, n);
        let none = HashSet::new();

        for candidate in [1, 2, 3] {
            assert_eq!(
                handoff_target(&user, candidate, &none, &none, n, r),
                None,
                "candidate {} is primary and must not get a hint",
                candidate
            );
        }
        for candidate in [4, 0] {
            assert!(
                handoff_target(&user, candidate, &none, &none, n, r).is_some(),
                "candidate {} is a fallback and must get a hint",
                candidate
            );
        }
    }

    #[test]
    fn primary_set_is_half_open_when_wrapping() {
        let n = 5;
        let r = 3;
        // primary set {4, 0, 1}; 2 is the first index past the wrap and must
        // not be treated as primary
        let user = username_for_coordinator(4, n);
        let none = HashSet::new();

        assert_eq!(handoff_target(&user, 0, &none, &none, n, r), None);
        assert_eq!(handoff_target(&user, 1, &none, &none, n, r), None);
        assert!(handoff_target(&user, 2, &none, &none, n, r).is_some());
        assert!(handoff_target(&user, 3, &none, &none, n, r).is_some());
    }

    #[test]
    fn target_is_first_unreplicated_primary() {
        let n = 5;
        let r = 3;
        let user = username_for_coordinator(1, n);

        let replicated: HashSet<usize> = [1].into_iter().collect();
        let assigned = HashSet::new();
        assert_eq!(handoff_target(&user, 4, &replicated, &assigned, n, r), Some(2));
    }

    #[test]
    fn target_skips_replicated_and_assigned_primaries() {
        let n = 5;
        let r = 3;
        let user = username_for_coordinator(1, n);

        let replicated: HashSet<usize> = [1].into_iter().collect();
        let assigned: HashSet<usize> = [2].into_iter().collect();
        assert_eq!(handoff_target(&user, 0, &replicated, &assigned, n, r), Some(3));
    }

    #[test]
    fn every_node_primary_when_replicas_equal_servers() {
        let n = 4;
        let user = username_for_coordinator(2, n);
        let none = HashSet::new();

        for candidate in 0..n {
            assert_eq!(handoff_target(&user, candidate, &none, &none, n, n), None);
        }
    }
}
