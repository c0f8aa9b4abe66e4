//! The hash-consed store of structured abstract values.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::rc::Rc;

use crate::lattice::Lattice;

use super::path::{DataPath, Index, IndexKind};

/// The representation chosen for structured values, per analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// All fields of a composite are merged into one base value.
    Smashed,
    /// Composites are trees with per-field precision; inter-field
    /// correlations are not preserved.
    FirstOrder,
    /// Composites are sets of trees, preserving inter-field correlations.
    SecondOrder,
}

/// The number of trees a second-order set may hold before it is collapsed
/// into its pointwise join. Bounds the lattice height.
pub const SECOND_ORDER_WIDTH: usize = 8;

/// A handle to a value owned by a [`DataManager`].
///
/// Handles are canonical: two structurally equal values constructed through
/// the same manager receive the same handle, so handle equality is value
/// equality. A handle is only meaningful together with its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DataValue(u32);

impl DataValue {
    /// The bottom value carrying no information.
    pub const BOTTOM: Self = Self(0);

    /// Checks whether this is the bottom value.
    #[must_use]
    pub const fn is_bottom(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Entry<B> {
    Bottom,
    Atomic(B),
    Compound {
        kind: IndexKind,
        entries: BTreeMap<Index, DataValue>,
    },
    Set(BTreeSet<DataValue>),
}

fn combine_hashes(a: u64, b: u64) -> u64 {
    a ^ b.wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(31)
}

/// The exclusive owner and sole allocator of structured abstract values.
///
/// The manager lifts a base lattice into one of the three [`Variant`]s. All
/// entries are arena-allocated and hash-consed with hashes precomputed at
/// construction; destroying the manager invalidates every handle it ever
/// produced. The manager is non-copyable.
#[derive(Debug)]
pub struct DataManager<L: Lattice>
where
    L::Value: Hash,
{
    base: L,
    variant: Variant,
    entries: Vec<Entry<L::Value>>,
    hashes: Vec<u64>,
    cache: HashMap<u64, Vec<DataValue>>,
}

impl<L: Lattice> DataManager<L>
where
    L::Value: Hash,
{
    /// Creates a manager lifting `base` into the given variant.
    #[must_use]
    pub fn new(base: L, variant: Variant) -> Self {
        Self {
            base,
            variant,
            entries: vec![Entry::Bottom],
            hashes: vec![0],
            cache: HashMap::new(),
        }
    }

    /// The base lattice this manager lifts.
    #[must_use]
    pub const fn base(&self) -> &L {
        &self.base
    }

    /// The representation variant of this manager.
    #[must_use]
    pub const fn variant(&self) -> Variant {
        self.variant
    }

    fn entry(&self, v: DataValue) -> &Entry<L::Value> {
        &self.entries[v.0 as usize]
    }

    /// The precomputed hash of a value; equal values share it.
    #[must_use]
    pub fn hash_of(&self, v: DataValue) -> u64 {
        self.hashes[v.0 as usize]
    }

    fn entry_hash(&self, entry: &Entry<L::Value>) -> u64 {
        let mut hasher = DefaultHasher::new();
        match entry {
            Entry::Bottom => 0u8.hash(&mut hasher),
            Entry::Atomic(v) => {
                1u8.hash(&mut hasher);
                v.hash(&mut hasher);
            }
            Entry::Compound { kind, entries } => {
                2u8.hash(&mut hasher);
                kind.hash(&mut hasher);
                // order-independent combination over the entries
                let mut sum = 0u64;
                for (idx, &child) in entries {
                    let mut h = DefaultHasher::new();
                    idx.hash(&mut h);
                    sum = sum.wrapping_add(combine_hashes(h.finish(), self.hash_of(child)));
                }
                sum.hash(&mut hasher);
            }
            Entry::Set(elems) => {
                3u8.hash(&mut hasher);
                let sum = elems
                    .iter()
                    .fold(0u64, |acc, &t| acc.wrapping_add(self.hash_of(t)));
                sum.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    fn intern(&mut self, entry: Entry<L::Value>) -> DataValue {
        let hash = self.entry_hash(&entry);
        if let Some(candidates) = self.cache.get(&hash) {
            for &cand in candidates {
                if *self.entry(cand) == entry {
                    return cand;
                }
            }
        }
        let id = DataValue(u32::try_from(self.entries.len()).expect("value arena overflow"));
        self.entries.push(entry);
        self.hashes.push(hash);
        self.cache.entry(hash).or_default().push(id);
        id
    }

    // --- constructors ---

    /// The canonical value wrapping a base value.
    pub fn atomic(&mut self, value: L::Value) -> DataValue {
        let tree = self.intern(Entry::Atomic(value));
        match self.variant {
            Variant::SecondOrder => self.set(BTreeSet::from([tree])),
            _ => tree,
        }
    }

    /// The canonical compound value over the given (non-empty) entry map.
    ///
    /// # Panics
    /// Panics if the map is empty (use [`DataManager::create_empty`]) or its
    /// indices disagree on their kind.
    pub fn compound(&mut self, entries: BTreeMap<Index, DataValue>) -> DataValue {
        let kind = entries
            .keys()
            .next()
            .expect("empty compound requires an index kind")
            .kind();
        self.compound_of_kind(kind, entries)
    }

    /// The canonical compound value of the given index kind.
    ///
    /// # Panics
    /// Panics if an index disagrees with `kind`.
    pub fn compound_of_kind(
        &mut self,
        kind: IndexKind,
        entries: BTreeMap<Index, DataValue>,
    ) -> DataValue {
        assert!(
            entries.keys().all(|idx| idx.kind() == kind),
            "compound mixes index kinds"
        );
        match self.variant {
            Variant::Smashed => {
                // the structure is smashed into a single summary value
                let mut sum = self.base.bottom();
                for &child in entries.values() {
                    let child = self.smashed_value(child);
                    self.base.meet_assign(&mut sum, &child);
                }
                self.intern(Entry::Atomic(sum))
            }
            Variant::FirstOrder => {
                let entries = entries.into_iter().filter(|(_, v)| !v.is_bottom()).collect();
                self.intern(Entry::Compound { kind, entries })
            }
            Variant::SecondOrder => {
                let entries = entries.into_iter().filter(|(_, v)| !v.is_bottom()).collect();
                let tree = self.intern(Entry::Compound { kind, entries });
                self.set(BTreeSet::from([tree]))
            }
        }
    }

    /// The canonical empty value for the given index kind.
    pub fn create_empty(&mut self, kind: IndexKind) -> DataValue {
        self.compound_of_kind(kind, BTreeMap::new())
    }

    /// The canonical non-empty set of trees (second-order layer).
    fn set(&mut self, elems: BTreeSet<DataValue>) -> DataValue {
        assert!(!elems.is_empty(), "the set layer holds at least one tree");
        if elems.len() > SECOND_ORDER_WIDTH {
            // width bound exceeded: widen to the pointwise join of all trees
            let collapsed = self.collapse(&elems);
            return self.intern(Entry::Set(BTreeSet::from([collapsed])));
        }
        self.intern(Entry::Set(elems))
    }

    fn smashed_value(&self, v: DataValue) -> L::Value {
        match self.entry(v) {
            Entry::Bottom => self.base.bottom(),
            Entry::Atomic(value) => value.clone(),
            _ => unreachable!("smashed managers only allocate atomic entries"),
        }
    }

    // --- projection ---

    /// Projects a value to the sub-value at the given index.
    ///
    /// # Panics
    /// Panics when projecting an atomic first-order value or when the index
    /// kind disagrees with the compound's kind.
    pub fn project(&mut self, v: DataValue, index: &Index) -> DataValue {
        if self.variant == Variant::Smashed {
            return v;
        }
        match self.entry(v).clone() {
            Entry::Bottom => DataValue::BOTTOM,
            Entry::Atomic(_) => panic!("projection applied to an atomic value"),
            Entry::Compound { kind, entries } => {
                assert_eq!(kind, index.kind(), "projection with a foreign index kind");
                entries.get(index).copied().unwrap_or(DataValue::BOTTOM)
            }
            Entry::Set(elems) => {
                // the projection of a set is the join of per-tree projections
                let mut result = DataValue::BOTTOM;
                for tree in elems {
                    let projected = self.project_tree(tree, index);
                    result = self.meet(result, projected);
                }
                result
            }
        }
    }

    fn project_tree(&mut self, tree: DataValue, index: &Index) -> DataValue {
        match self.entry(tree).clone() {
            Entry::Bottom => DataValue::BOTTOM,
            Entry::Atomic(_) => panic!("projection applied to an atomic value"),
            Entry::Compound { kind, entries } => {
                assert_eq!(kind, index.kind(), "projection with a foreign index kind");
                entries.get(index).copied().unwrap_or(DataValue::BOTTOM)
            }
            Entry::Set(_) => unreachable!("sets do not nest"),
        }
    }

    /// Projects a value along a data path.
    pub fn project_path(&mut self, v: DataValue, path: &DataPath) -> DataValue {
        let mut current = v;
        for step in path.steps() {
            current = self.project(current, step);
        }
        current
    }

    // --- mutation ---

    /// A copy of `v` with the sub-value at `path` replaced by `new`.
    ///
    /// Mutation at the root path replaces the entire value. Descending into
    /// missing structure creates canonical empty compounds on the way down.
    pub fn mutate(&mut self, v: DataValue, path: &DataPath, new: DataValue) -> DataValue {
        if path.is_root() {
            return new;
        }
        if self.variant == Variant::Smashed {
            // a partial update may leave any previous content in place
            return self.meet(v, new);
        }
        let steps: Vec<Index> = path.steps().to_vec();
        self.mutate_steps(v, &steps, new)
    }

    fn mutate_steps(&mut self, v: DataValue, steps: &[Index], new: DataValue) -> DataValue {
        let Some(step) = steps.first() else {
            return new;
        };
        match self.entry(v).clone() {
            Entry::Bottom => {
                let empty = self.create_empty(step.kind());
                self.mutate_steps(empty, steps, new)
            }
            Entry::Atomic(_) => panic!("mutation descends into an atomic value"),
            Entry::Compound { kind, entries } => {
                if kind != step.kind() && entries.is_empty() {
                    // re-index an untyped empty compound with the step's kind
                    let empty = self.raw_empty(step.kind());
                    return self.mutate_steps(empty, steps, new);
                }
                assert_eq!(kind, step.kind(), "mutation with a foreign index kind");
                let sub = entries.get(step).copied().unwrap_or(DataValue::BOTTOM);
                let new_sub = self.mutate_steps(sub, &steps[1..], new);
                let mut entries = entries;
                if new_sub.is_bottom() {
                    entries.remove(step);
                } else {
                    entries.insert(step.clone(), new_sub);
                }
                self.intern(Entry::Compound { kind, entries })
            }
            Entry::Set(elems) => {
                // mutate every tree and join the results
                let mut result = DataValue::BOTTOM;
                for tree in elems {
                    let mutated = self.mutate_steps(tree, steps, new);
                    let wrapped = self.as_set(mutated);
                    result = self.meet(result, wrapped);
                }
                result
            }
        }
    }

    fn raw_empty(&mut self, kind: IndexKind) -> DataValue {
        self.intern(Entry::Compound {
            kind,
            entries: BTreeMap::new(),
        })
    }

    fn as_set(&mut self, v: DataValue) -> DataValue {
        match self.entry(v) {
            Entry::Set(_) | Entry::Bottom => v,
            _ => self.set(BTreeSet::from([v])),
        }
    }

    // --- lattice operations ---

    /// The combination of two values.
    pub fn meet(&mut self, a: DataValue, b: DataValue) -> DataValue {
        if a == b {
            return a;
        }
        if a.is_bottom() {
            return b;
        }
        if b.is_bottom() {
            return a;
        }
        match (self.entry(a).clone(), self.entry(b).clone()) {
            (Entry::Atomic(x), Entry::Atomic(y)) => {
                let combined = {
                    let mut x = x;
                    self.base.meet_assign(&mut x, &y);
                    x
                };
                self.intern(Entry::Atomic(combined))
            }
            (
                Entry::Compound {
                    kind: k1,
                    entries: e1,
                },
                Entry::Compound {
                    kind: k2,
                    entries: e2,
                },
            ) => {
                assert_eq!(k1, k2, "meet of compounds with different index kinds");
                // pointwise over the union of indices, missing entries are ⊥
                let mut merged = e1;
                for (idx, sub_b) in e2 {
                    let sub_a = merged.get(&idx).copied().unwrap_or(DataValue::BOTTOM);
                    let sub = self.meet(sub_a, sub_b);
                    merged.insert(idx, sub);
                }
                self.intern(Entry::Compound {
                    kind: k1,
                    entries: merged,
                })
            }
            (Entry::Set(s1), Entry::Set(s2)) => {
                let union = s1.union(&s2).copied().collect();
                self.set(union)
            }
            _ => panic!("meet of structurally incompatible values"),
        }
    }

    /// Merges `b` into `a` and reports whether `a` changed.
    pub fn meet_assign(&mut self, a: &mut DataValue, b: DataValue) -> bool {
        let merged = self.meet(*a, b);
        let changed = merged != *a;
        *a = merged;
        changed
    }

    /// Checks whether `inner` is subsumed by `outer` (`inner ⊑ outer`).
    #[must_use]
    pub fn contains(&self, outer: DataValue, inner: DataValue) -> bool {
        if outer == inner || inner.is_bottom() {
            return true;
        }
        if outer.is_bottom() {
            return false;
        }
        match (self.entry(outer), self.entry(inner)) {
            (Entry::Atomic(x), Entry::Atomic(y)) => self.base.less(y, x),
            (
                Entry::Compound {
                    kind: k1,
                    entries: e1,
                },
                Entry::Compound {
                    kind: k2,
                    entries: e2,
                },
            ) => {
                k1 == k2
                    && e2.iter().all(|(idx, &sub_inner)| {
                        let sub_outer = e1.get(idx).copied().unwrap_or(DataValue::BOTTOM);
                        self.contains(sub_outer, sub_inner)
                    })
            }
            (Entry::Set(s1), Entry::Set(s2)) => {
                // every inner tree must be covered by some outer tree
                s2.iter()
                    .all(|&t2| s1.iter().any(|&t1| self.contains(t1, t2)))
            }
            _ => false,
        }
    }

    /// The base value stored in an atomic handle.
    ///
    /// # Panics
    /// Panics if the handle is not atomic.
    #[must_use]
    pub fn as_atomic(&self, v: DataValue) -> &L::Value {
        match self.entry(v) {
            Entry::Atomic(value) => value,
            _ => panic!("value is not atomic"),
        }
    }

    // --- widening ---

    fn collapse(&mut self, trees: &BTreeSet<DataValue>) -> DataValue {
        let mut iter = trees.iter().copied();
        let first = iter.next().expect("collapse of an empty set");
        iter.fold(first, |acc, tree| self.tree_meet(acc, tree))
    }

    fn tree_meet(&mut self, a: DataValue, b: DataValue) -> DataValue {
        if a == b {
            return a;
        }
        match (self.entry(a).clone(), self.entry(b).clone()) {
            (Entry::Atomic(x), Entry::Atomic(y)) => {
                let combined = {
                    let mut x = x;
                    self.base.meet_assign(&mut x, &y);
                    x
                };
                self.intern(Entry::Atomic(combined))
            }
            (
                Entry::Compound {
                    kind: k1,
                    entries: e1,
                },
                Entry::Compound {
                    kind: k2,
                    entries: e2,
                },
            ) => {
                assert_eq!(k1, k2, "collapse of compounds with different index kinds");
                let mut merged = e1;
                for (idx, sub_b) in e2 {
                    let sub_a = merged.get(&idx).copied().unwrap_or(DataValue::BOTTOM);
                    let sub = self.meet(sub_a, sub_b);
                    merged.insert(idx, sub);
                }
                self.intern(Entry::Compound {
                    kind: k1,
                    entries: merged,
                })
            }
            _ => panic!("collapse of structurally incompatible trees"),
        }
    }
}

/// A [`Lattice`] over the handles of a shared [`DataManager`].
///
/// The manager is shared by reference counting so that constraints and
/// assignments can combine values; it still has a single logical owner, the
/// analysis instance that created it.
#[derive(Debug, Clone)]
pub struct DataValueLattice<L: Lattice>
where
    L::Value: Hash,
{
    manager: Rc<RefCell<DataManager<L>>>,
}

impl<L: Lattice> DataValueLattice<L>
where
    L::Value: Hash,
{
    /// Creates the lattice over a fresh manager.
    #[must_use]
    pub fn new(base: L, variant: Variant) -> Self {
        Self {
            manager: Rc::new(RefCell::new(DataManager::new(base, variant))),
        }
    }

    /// The shared manager backing this lattice.
    #[must_use]
    pub fn manager(&self) -> &Rc<RefCell<DataManager<L>>> {
        &self.manager
    }
}

impl<L: Lattice> Lattice for DataValueLattice<L>
where
    L::Value: Hash,
{
    type Value = DataValue;

    fn bottom(&self) -> DataValue {
        DataValue::BOTTOM
    }

    fn meet_assign(&self, a: &mut DataValue, b: &DataValue) -> bool {
        self.manager.borrow_mut().meet_assign(a, *b)
    }

    fn less(&self, a: &DataValue, b: &DataValue) -> bool {
        self.manager.borrow().contains(*b, *a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::SetLattice;

    fn first_order() -> DataManager<SetLattice<u32>> {
        DataManager::new(SetLattice::new(), Variant::FirstOrder)
    }

    fn atom(mgr: &mut DataManager<SetLattice<u32>>, values: &[u32]) -> DataValue {
        mgr.atomic(values.iter().copied().collect())
    }

    #[test]
    fn hash_consing_yields_identical_handles() {
        let mut mgr = first_order();
        let a = atom(&mut mgr, &[1, 2]);
        let b = atom(&mut mgr, &[2, 1]);
        assert_eq!(a, b);
        assert_eq!(mgr.hash_of(a), mgr.hash_of(b));

        let c1 = mgr.compound(BTreeMap::from([(Index::field("x"), a)]));
        let c2 = mgr.compound(BTreeMap::from([(Index::field("x"), b)]));
        assert_eq!(c1, c2);
    }

    #[test]
    fn projection_reads_fields() {
        let mut mgr = first_order();
        let x = atom(&mut mgr, &[7]);
        let y = atom(&mut mgr, &[9]);
        let point = mgr.compound(BTreeMap::from([
            (Index::field("x"), x),
            (Index::field("y"), y),
        ]));
        assert_eq!(mgr.project(point, &Index::field("x")), x);
        assert_eq!(mgr.project(point, &Index::field("y")), y);
        assert_eq!(
            mgr.project(point, &Index::field("z")),
            DataValue::BOTTOM
        );
    }

    #[test]
    fn mutation_at_root_replaces() {
        let mut mgr = first_order();
        let a = atom(&mut mgr, &[1]);
        let b = atom(&mut mgr, &[2]);
        assert_eq!(mgr.mutate(a, &DataPath::root(), b), b);
    }

    #[test]
    fn mutation_builds_missing_structure() {
        let mut mgr = first_order();
        let v = atom(&mut mgr, &[5]);
        let path = DataPath::root()
            .append(Index::field("x"))
            .append(Index::element(0));
        let mutated = mgr.mutate(DataValue::BOTTOM, &path, v);
        assert_eq!(mgr.project_path(mutated, &path), v);
    }

    #[test]
    fn meet_is_pointwise_over_index_union() {
        let mut mgr = first_order();
        let a = atom(&mut mgr, &[1]);
        let b = atom(&mut mgr, &[2]);
        let left = mgr.compound(BTreeMap::from([(Index::field("x"), a)]));
        let right = mgr.compound(BTreeMap::from([(Index::field("y"), b)]));
        let met = mgr.meet(left, right);
        assert_eq!(mgr.project(met, &Index::field("x")), a);
        assert_eq!(mgr.project(met, &Index::field("y")), b);
        assert!(mgr.contains(met, left));
        assert!(mgr.contains(met, right));
        assert!(!mgr.contains(left, met));
    }

    #[test]
    fn smashed_merges_all_fields() {
        let mut mgr: DataManager<SetLattice<u32>> =
            DataManager::new(SetLattice::new(), Variant::Smashed);
        let a = mgr.atomic(BTreeSet::from([1]));
        let b = mgr.atomic(BTreeSet::from([2]));
        let smashed = mgr.compound(BTreeMap::from([
            (Index::field("x"), a),
            (Index::field("y"), b),
        ]));
        assert_eq!(mgr.as_atomic(smashed), &BTreeSet::from([1, 2]));
        // projection of a smashed value is the value itself
        assert_eq!(mgr.project(smashed, &Index::field("x")), smashed);
    }

    #[test]
    fn second_order_projection_joins_trees() {
        let mut mgr: DataManager<SetLattice<u32>> =
            DataManager::new(SetLattice::new(), Variant::SecondOrder);
        let one = mgr.atomic(BTreeSet::from([1]));
        let two = mgr.atomic(BTreeSet::from([2]));
        let t1 = mgr.compound(BTreeMap::from([(Index::field("x"), one)]));
        let t2 = mgr.compound(BTreeMap::from([(Index::field("x"), two)]));
        let both = mgr.meet(t1, t2);
        let projected = mgr.project(both, &Index::field("x"));
        let expected = mgr.meet(one, two);
        assert_eq!(projected, expected);
    }

    #[test]
    fn second_order_width_is_bounded() {
        let mut mgr: DataManager<SetLattice<u32>> =
            DataManager::new(SetLattice::new(), Variant::SecondOrder);
        let mut current = DataValue::BOTTOM;
        for i in 0..64 {
            let value = mgr.atomic(BTreeSet::from([i]));
            let tree = mgr.compound(BTreeMap::from([(Index::field("x"), value)]));
            current = mgr.meet(current, tree);
        }
        // the widened set still covers each contributing tree
        let probe_value = mgr.atomic(BTreeSet::from([17]));
        let probe = mgr.compound(BTreeMap::from([(Index::field("x"), probe_value)]));
        assert!(mgr.contains(current, probe));
    }
}
