//! Mesh revision tracking and the set of chunks awaiting persistence.
#![forbid(unsafe_code)]

use hashbrown::HashMap;
use strata_world::{CHUNK_WIDTH, ChunkCoord};

/// Chunks whose mesh depends on a voxel at `(wx, wz)`: the owner, plus the
/// face-adjacent chunk on each axis where the voxel sits on the border.
pub fn affected_chunks(wx: i32, wz: i32) -> Vec<ChunkCoord> {
    let w = CHUNK_WIDTH as i32;
    let owner = ChunkCoord::from_world(wx, wz);
    let lx = wx - owner.base_x();
    let lz = wz - owner.base_z();
    let mut out = vec![owner];
    if lx == 0 {
        out.push(owner.offset(-1, 0));
    }
    if lx == w - 1 {
        out.push(owner.offset(1, 0));
    }
    if lz == 0 {
        out.push(owner.offset(0, -1));
    }
    if lz == w - 1 {
        out.push(owner.offset(0, 1));
    }
    out
}

/// Monotonic per-chunk revision stamps. A mesh built at revision `r` is
/// stale once the chunk's revision moves past `r`.
#[derive(Default, Debug)]
pub struct EditTracker {
    rev: HashMap<ChunkCoord, u64>,
    built: HashMap<ChunkCoord, u64>,
    counter: u64,
}

impl EditTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_stamp(&mut self) -> u64 {
        self.counter = self.counter.wrapping_add(1).max(1);
        self.counter
    }

    /// Bumps one chunk, e.g. after a structure plan lands in it.
    pub fn bump(&mut self, coord: ChunkCoord) -> u64 {
        let stamp = self.next_stamp();
        self.rev.insert(coord, stamp);
        stamp
    }

    /// Bumps the owner of `(wx, wz)` and any border neighbour; returns the
    /// stamp and the chunks that need a rebuild.
    pub fn bump_region_around(&mut self, wx: i32, wz: i32) -> (u64, Vec<ChunkCoord>) {
        let stamp = self.next_stamp();
        let affected = affected_chunks(wx, wz);
        for c in &affected {
            self.rev.insert(*c, stamp);
        }
        (stamp, affected)
    }

    #[inline]
    pub fn get_rev(&self, coord: ChunkCoord) -> u64 {
        self.rev.get(&coord).copied().unwrap_or(0)
    }

    #[inline]
    pub fn get_built_rev(&self, coord: ChunkCoord) -> u64 {
        self.built.get(&coord).copied().unwrap_or(0)
    }

    pub fn mark_built(&mut self, coord: ChunkCoord, rev: u64) {
        let e = self.built.entry(coord).or_insert(0);
        if rev > *e {
            *e = rev;
        }
    }

    /// A finished mesh is current only if nothing bumped the chunk after its job was queued.
    #[inline]
    pub fn is_current(&self, coord: ChunkCoord, rev: u64) -> bool {
        rev >= self.get_rev(coord)
    }

    pub fn needs_rebuild(&self, coord: ChunkCoord) -> bool {
        self.get_rev(coord) > self.get_built_rev(coord)
    }

    /// Drops bookkeeping for an evicted chunk.
    pub fn forget(&mut self, coord: ChunkCoord) {
        self.rev.remove(&coord);
        self.built.remove(&coord);
    }
}

/// Chunks that differ from their generated baseline. Each entry carries the
/// stamp of its latest edit so a flush only clears what it actually wrote.
#[derive(Default, Debug)]
pub struct ModifiedSet {
    stamps: HashMap<ChunkCoord, u64>,
    counter: u64,
}

impl ModifiedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, coord: ChunkCoord) -> u64 {
        self.counter += 1;
        self.stamps.insert(coord, self.counter);
        self.counter
    }

    #[inline]
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.stamps.contains_key(&coord)
    }

    #[inline]
    pub fn stamp(&self, coord: ChunkCoord) -> Option<u64> {
        self.stamps.get(&coord).copied()
    }

    /// Point-in-time copy, ordered by coordinate.
    pub fn snapshot(&self) -> Vec<(ChunkCoord, u64)> {
        let mut v: Vec<_> = self.stamps.iter().map(|(c, s)| (*c, *s)).collect();
        v.sort_unstable();
        v
    }

    /// Clears `coord` if it was not edited again after `stamp`.
    pub fn clear_if_unchanged(&mut self, coord: ChunkCoord, stamp: u64) -> bool {
        if self.stamps.get(&coord) == Some(&stamp) {
            self.stamps.remove(&coord);
            true
        } else {
            false
        }
    }

    /// Unmarks `coord` whatever its stamp. Returns whether it was marked.
    pub fn forget(&mut self, coord: ChunkCoord) -> bool {
        self.stamps.remove(&coord).is_some()
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_edits_bump_face_neighbours() {
        let mut t = EditTracker::new();
        let c = ChunkCoord::new(4, -2);
        let (bx, bz) = (c.base_x(), c.base_z());

        let (s1, mut hit) = t.bump_region_around(bx + 15, bz + 7);
        hit.sort();
        assert_eq!(hit, vec![c, c.offset(1, 0)]);
        assert_eq!(t.get_rev(c.offset(1, 0)), s1);
        assert_eq!(t.get_rev(c.offset(-1, 0)), 0);

        let (s2, mut hit) = t.bump_region_around(bx, bz);
        hit.sort();
        assert_eq!(hit, vec![c.offset(-1, 0), c.offset(0, -1), c]);
        assert_eq!(t.get_rev(c), s2);
        assert_eq!(t.get_rev(c.offset(1, 0)), s1);

        let (_, hit) = t.bump_region_around(bx + 5, bz + 5);
        assert_eq!(hit, vec![c]);
    }

    #[test]
    fn stale_revisions_are_detected() {
        let mut t = EditTracker::new();
        let c = ChunkCoord::new(0, 0);
        let r1 = t.bump(c);
        assert!(t.needs_rebuild(c));
        let r2 = t.bump(c);
        assert!(!t.is_current(c, r1));
        assert!(t.is_current(c, r2));
        t.mark_built(c, r2);
        t.mark_built(c, r1);
        assert_eq!(t.get_built_rev(c), r2);
        assert!(!t.needs_rebuild(c));
        t.forget(c);
        assert_eq!(t.get_rev(c), 0);
    }

    #[test]
    fn flush_only_clears_unchanged_entries() {
        let mut m = ModifiedSet::new();
        let a = ChunkCoord::new(1, 1);
        let b = ChunkCoord::new(-1, 0);
        m.mark(a);
        m.mark(b);
        let snap = m.snapshot();
        assert_eq!(snap.iter().map(|(c, _)| *c).collect::<Vec<_>>(), vec![b, a]);
        m.mark(a);
        for (c, s) in snap {
            m.clear_if_unchanged(c, s);
        }
        assert!(m.contains(a));
        assert!(!m.contains(b));
        assert_eq!(m.len(), 1);
        assert!(m.forget(a));
        assert!(!m.forget(a));
        assert!(m.is_empty());
    }
}
