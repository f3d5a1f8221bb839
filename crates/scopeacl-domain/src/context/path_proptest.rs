//! Property-based tests for materialized paths.

use proptest::prelude::*;
use scopeacl_storage::{ContextRecord, ROOT_CONTEXT_ID};

use super::Context;

/// Strategy for a root-first chain of distinct non-root context ids.
fn descendant_chain_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::btree_set(2i64..100_000, 0..12)
        .prop_map(|ids| ids.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

/// Builds each node of `root -> chain...` the way the resolver would.
fn build_chain(chain: &[i64]) -> Vec<Context> {
    let mut nodes = vec![Context::root()];
    for &id in chain {
        let parent = nodes.last().cloned().unwrap_or_else(Context::root);
        let record = ContextRecord {
            id,
            parent_id: Some(parent.id()),
            level: "node".to_string(),
            instance_id: Some(id),
            depth: parent.depth() + 1,
            path: format!("{}{id}/", parent.path()),
        };
        nodes.push(Context::from_record(record).unwrap());
    }
    nodes
}

proptest! {
    #[test]
    fn test_ancestor_ids_are_exactly_the_chain(chain in descendant_chain_strategy()) {
        let nodes = build_chain(&chain);
        let leaf = nodes.last().unwrap();

        let mut expected = vec![ROOT_CONTEXT_ID];
        expected.extend_from_slice(&chain);
        prop_assert_eq!(leaf.ancestor_ids(), expected.as_slice());
        prop_assert_eq!(leaf.depth() as usize, chain.len());
    }

    #[test]
    fn test_every_node_contains_its_descendants(chain in descendant_chain_strategy()) {
        let nodes = build_chain(&chain);

        for (i, ancestor) in nodes.iter().enumerate() {
            for (j, node) in nodes.iter().enumerate() {
                prop_assert_eq!(ancestor.contains(node), i <= j);
            }
        }
    }

    #[test]
    fn test_path_with_foreign_tail_is_rejected(
        chain in descendant_chain_strategy(),
        foreign in 100_000i64..200_000,
    ) {
        let nodes = build_chain(&chain);
        let parent = nodes.last().unwrap();
        let record = ContextRecord {
            id: foreign + 1,
            parent_id: Some(parent.id()),
            level: "node".to_string(),
            instance_id: None,
            depth: parent.depth() + 1,
            path: format!("{}{foreign}/", parent.path()),
        };

        prop_assert!(Context::from_record(record).is_err());
    }
}
