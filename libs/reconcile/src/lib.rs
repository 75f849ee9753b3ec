//! Harmonization primitives.
//!
//! Pure helpers shared by the constraint strategies that drive a cluster from
//! observed replica counts toward declared ones:
//!
//! - **Replica delta**: how far an observed count is from a desired count.
//! - **Removal ordering**: which replicas to give up first on scale-down.
//! - **Balanced selection**: round-robin over groups, largest group first.
//!
//! # Invariants
//!
//! - Every function here is deterministic given the same inputs
//! - Orderings are stable: equal-priority items keep their input order

use std::time::Duration;

/// Default harmonization interval.
pub const DEFAULT_HARMONIZE_INTERVAL: Duration = Duration::from_secs(15);

/// Distance between an observed replica count and a desired one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaDelta {
    /// Observed matches desired.
    Converged,

    /// This many replicas must be added.
    Add(usize),

    /// This many replicas must be removed.
    Remove(usize),
}

impl ReplicaDelta {
    /// Compute the delta that moves `observed` onto `desired`.
    pub fn between(desired: usize, observed: usize) -> Self {
        match observed.cmp(&desired) {
            std::cmp::Ordering::Equal => Self::Converged,
            std::cmp::Ordering::Less => Self::Add(desired - observed),
            std::cmp::Ordering::Greater => Self::Remove(observed - desired),
        }
    }

    /// Delta for a ceiling: only ever removes.
    pub fn toward_ceiling(ceiling: usize, observed: usize) -> Self {
        match Self::between(ceiling, observed) {
            Self::Remove(n) => Self::Remove(n),
            _ => Self::Converged,
        }
    }

    /// Delta for a floor: only ever adds.
    pub fn toward_floor(floor: usize, observed: usize) -> Self {
        match Self::between(floor, observed) {
            Self::Add(n) => Self::Add(n),
            _ => Self::Converged,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Removal priority for replicas.
///
/// Lower values are removed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RemovalPriority {
    /// Replica has no placement (remove first).
    Unplaced = 0,

    /// Replica is placed and starting.
    Starting = 1,

    /// Replica is running (remove last).
    Running = 2,
}

/// Order replicas for removal.
///
/// Returns replicas sorted by removal priority (first to remove first). The
/// sort is stable, so callers can pre-order replicas that share a priority.
pub fn order_for_removal<T, F>(replicas: Vec<T>, get_priority: F) -> Vec<T>
where
    F: Fn(&T) -> RemovalPriority,
{
    let mut with_priority: Vec<_> = replicas
        .into_iter()
        .map(|r| (get_priority(&r), r))
        .collect();

    with_priority.sort_by_key(|(p, _)| *p);
    with_priority.into_iter().map(|(_, r)| r).collect()
}

/// Drain groups round-robin, always taking from the currently largest group.
///
/// Ties go to the group that appears first in `groups`. Taking the first
/// `n` items of the result leaves the remaining group sizes as even as
/// possible.
pub fn largest_group_first<T>(groups: Vec<Vec<T>>) -> Vec<T> {
    let mut queues: Vec<(usize, std::collections::VecDeque<T>)> = groups
        .into_iter()
        .enumerate()
        .filter(|(_, g)| !g.is_empty())
        .map(|(i, g)| (i, g.into()))
        .collect();

    let total = queues.iter().map(|(_, q)| q.len()).sum();
    let mut out = Vec::with_capacity(total);

    while !queues.is_empty() {
        queues.sort_by(|(ia, a), (ib, b)| b.len().cmp(&a.len()).then(ia.cmp(ib)));

        let (_, largest) = &mut queues[0];
        if let Some(item) = largest.pop_front() {
            out.push(item);
        }
        if largest.is_empty() {
            queues.remove(0);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_replica_delta() {
        assert_eq!(ReplicaDelta::between(3, 3), ReplicaDelta::Converged);
        assert_eq!(ReplicaDelta::between(3, 1), ReplicaDelta::Add(2));
        assert_eq!(ReplicaDelta::between(3, 5), ReplicaDelta::Remove(2));

        assert_eq!(ReplicaDelta::toward_ceiling(3, 1), ReplicaDelta::Converged);
        assert_eq!(ReplicaDelta::toward_ceiling(3, 4), ReplicaDelta::Remove(1));
        assert_eq!(ReplicaDelta::toward_floor(3, 4), ReplicaDelta::Converged);
        assert_eq!(ReplicaDelta::toward_floor(3, 0), ReplicaDelta::Add(3));
    }

    #[test]
    fn test_order_for_removal_is_stable() {
        let replicas = vec![
            ("a", RemovalPriority::Running),
            ("b", RemovalPriority::Unplaced),
            ("c", RemovalPriority::Starting),
            ("d", RemovalPriority::Unplaced),
            ("e", RemovalPriority::Running),
        ];

        let ordered: Vec<_> = order_for_removal(replicas, |(_, p)| *p)
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        assert_eq!(ordered, vec!["b", "d", "c", "a", "e"]);
    }

    #[test]
    fn test_largest_group_first() {
        let groups = vec![vec!["a1"], vec!["b1", "b2", "b3"], vec!["c1", "c2"]];
        let out = largest_group_first(groups);
        assert_eq!(out, vec!["b1", "b2", "c1", "a1", "b3", "c2"]);
    }

    #[test]
    fn test_largest_group_first_skips_empty() {
        let groups: Vec<Vec<u8>> = vec![vec![], vec![1], vec![]];
        assert_eq!(largest_group_first(groups), vec![1]);
    }

    proptest! {
        #[test]
        fn largest_group_first_keeps_groups_balanced(
            sizes in proptest::collection::vec(0usize..6, 1..5),
            take in 0usize..20,
        ) {
            let groups: Vec<Vec<usize>> = sizes
                .iter()
                .enumerate()
                .map(|(g, &n)| vec![g; n])
                .collect();
            let total: usize = sizes.iter().sum();
            let take = take.min(total);

            let removed = largest_group_first(groups);
            prop_assert_eq!(removed.len(), total);

            let mut remaining = sizes.clone();
            for g in &removed[..take] {
                remaining[*g] -= 1;
            }

            // Whatever was removed came from the top: no group that lost a
            // replica may end up smaller than another group minus one.
            let max_left = *remaining.iter().max().unwrap_or(&0);
            for (g, &left) in remaining.iter().enumerate() {
                if left < sizes[g] {
                    prop_assert!(left + 1 >= max_left);
                }
            }
        }
    }
}
