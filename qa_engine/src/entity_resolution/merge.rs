use crate::models::{Entity, EntitySet};
use petgraph::unionfind::UnionFind;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// Merge entity sets into the connected components of the "shares a
/// candidate item id" relation: two sets end up together iff they are
/// connected, directly or transitively, through at least one common
/// item id.
///
/// Running the merge on its own output returns the same partition.
pub fn merge_entity_sets(sets: Vec<EntitySet>) -> Vec<EntitySet> {
    if sets.len() < 2 {
        return sets;
    }

    let mut union: UnionFind<usize> = UnionFind::new(sets.len());
    let mut owner: HashMap<String, usize> = HashMap::new();
    for (idx, set) in sets.iter().enumerate() {
        for id in set.item_ids() {
            match owner.entry(id) {
                Entry::Occupied(entry) => {
                    debug!(
                        "Merging entity sets {} and {} because of shared {}",
                        entry.get(),
                        idx,
                        entry.key()
                    );
                    union.union(*entry.get(), idx);
                }
                Entry::Vacant(entry) => {
                    entry.insert(idx);
                }
            }
        }
    }

    // Regroup by component root, keeping first-appearance order.
    let mut grouped: Vec<Vec<Entity>> = Vec::new();
    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    for (idx, set) in sets.into_iter().enumerate() {
        let root = union.find(idx);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            grouped.push(Vec::new());
            grouped.len() - 1
        });
        grouped[slot].extend(set.entities);
    }
    grouped.into_iter().map(EntitySet::new).collect()
}
