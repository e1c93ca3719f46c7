//! Fixed-capacity particle arena
//!
//! Structure-of-Arrays slots sized once at construction. Free slots live on a
//! stack, live slots in a compact active index list that doubles as the point
//! index buffer for rendering. Nothing here allocates after `new`.

use glam::Vec3;

use super::spawner::ParticleDescriptor;

/// Visitor decision for [`ParticleStore::for_each_active_reverse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Keep,
    Remove,
}

/// Mutable view of one active particle during a pass
#[derive(Debug)]
pub struct ParticleMut<'a> {
    pub slot: usize,
    pub active_position: usize,
    pub position: &'a mut Vec3,
    pub prior_position: &'a mut Vec3,
    pub force: Vec3,
    pub time_to_live: &'a mut f32,
}

/// Particle slots plus free/active bookkeeping
#[derive(Debug, Clone)]
pub struct ParticleStore {
    position: Vec<Vec3>,
    prior_position: Vec<Vec3>,
    force: Vec<Vec3>,
    time_to_live: Vec<f32>,
    in_use: Vec<bool>,
    /// Free slot stack; the top is handed out next
    free: Vec<u32>,
    /// Active slots in iteration order
    active: Vec<u32>,
    modified: bool,
}

impl ParticleStore {
    /// Allocate `capacity` slots, all free
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        Self {
            position: vec![Vec3::ZERO; capacity],
            prior_position: vec![Vec3::ZERO; capacity],
            force: vec![Vec3::ZERO; capacity],
            time_to_live: vec![0.0; capacity],
            in_use: vec![false; capacity],
            // Reversed so slot 0 is popped first
            free: (0..capacity as u32).rev().collect(),
            active: Vec::with_capacity(capacity),
            modified: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.position.len()
    }

    /// Number of active particles
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn remaining_free(&self) -> usize {
        self.free.len()
    }

    /// Insert one particle; `None` when every slot is taken
    ///
    /// The prior position is seeded as `position - velocity * dt` so the first
    /// Verlet step carries the descriptor's velocity.
    pub fn insert(&mut self, descriptor: &ParticleDescriptor, dt: f32, force: Vec3) -> Option<usize> {
        let slot = self.free.pop()? as usize;

        self.position[slot] = descriptor.position;
        self.prior_position[slot] = descriptor.position - descriptor.velocity * dt;
        self.force[slot] = force;
        self.time_to_live[slot] = descriptor.time_to_live;
        self.in_use[slot] = true;
        self.active.push(slot as u32);
        self.modified = true;

        Some(slot)
    }

    /// Insert the first `remaining_free()` descriptors of `batch`, dropping the rest
    ///
    /// `force` is called once per admitted descriptor. Returns the number admitted.
    pub fn insert_batch<F>(&mut self, batch: &[ParticleDescriptor], dt: f32, mut force: F) -> usize
    where
        F: FnMut() -> Vec3,
    {
        let admitted = batch.len().min(self.remaining_free());
        for descriptor in &batch[..admitted] {
            self.insert(descriptor, dt, force());
        }
        admitted
    }

    /// Remove the entry at `active_position` in the active list, freeing its slot
    ///
    /// O(1): the last active entry moves into the vacated position, so a pass
    /// running from the back never skips an unvisited entry.
    ///
    /// # Panics
    /// If `active_position >= self.len()`.
    pub fn remove_at(&mut self, active_position: usize) -> usize {
        let slot = self.active.swap_remove(active_position) as usize;
        debug_assert!(self.in_use[slot], "slot {slot} was not in use");

        self.in_use[slot] = false;
        self.time_to_live[slot] = 0.0;
        self.free.push(slot as u32);
        self.modified = true;

        slot
    }

    /// Visit active particles from the last active position to the first
    ///
    /// Returning [`Visit::Remove`] frees the particle immediately. Returns the
    /// number of particles removed.
    pub fn for_each_active_reverse<F>(&mut self, mut visit: F) -> usize
    where
        F: FnMut(ParticleMut<'_>) -> Visit,
    {
        let mut removed = 0;
        for active_position in (0..self.active.len()).rev() {
            let slot = self.active[active_position] as usize;
            let view = ParticleMut {
                slot,
                active_position,
                position: &mut self.position[slot],
                prior_position: &mut self.prior_position[slot],
                force: self.force[slot],
                time_to_live: &mut self.time_to_live[slot],
            };
            if visit(view) == Visit::Remove {
                self.remove_at(active_position);
                removed += 1;
            }
        }
        removed
    }

    /// Free every slot
    pub fn clear(&mut self) {
        while let Some(active_position) = self.active.len().checked_sub(1) {
            self.remove_at(active_position);
        }
    }

    /// Active slot indices in iteration order
    pub fn active_indices(&self) -> &[u32] {
        &self.active
    }

    /// Positions of every slot (free slots hold stale data), indexed by slot
    pub fn positions(&self) -> &[Vec3] {
        &self.position
    }

    pub fn is_active(&self, slot: usize) -> bool {
        self.in_use.get(slot).copied().unwrap_or(false)
    }

    pub fn position(&self, slot: usize) -> Vec3 {
        self.position[slot]
    }

    pub fn prior_position(&self, slot: usize) -> Vec3 {
        self.prior_position[slot]
    }

    pub fn force(&self, slot: usize) -> Vec3 {
        self.force[slot]
    }

    pub fn time_to_live(&self, slot: usize) -> f32 {
        self.time_to_live[slot]
    }

    /// Whether the active list changed since the last [`Self::take_modified`]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Read and reset the active-list-changed flag
    pub fn take_modified(&mut self) -> bool {
        std::mem::take(&mut self.modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn descriptor(x: f32) -> ParticleDescriptor {
        ParticleDescriptor {
            position: Vec3::new(x, 1.0, 0.0),
            velocity: Vec3::new(0.0, -2.0, 0.0),
            time_to_live: 5.0,
        }
    }

    fn check_invariants(store: &ParticleStore) {
        assert_eq!(store.len() + store.remaining_free(), store.capacity());
        assert!(store.len() <= store.capacity());
        let mut seen = vec![false; store.capacity()];
        for &slot in store.active_indices() {
            let slot = slot as usize;
            assert!(!seen[slot], "slot {slot} listed twice");
            assert!(store.is_active(slot));
            seen[slot] = true;
        }
    }

    #[test]
    fn test_insert_seeds_prior_position() {
        let mut store = ParticleStore::new(4);
        let slot = store.insert(&descriptor(0.0), 0.1, Vec3::X).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(store.position(slot), Vec3::new(0.0, 1.0, 0.0));
        assert!((store.prior_position(slot) - Vec3::new(0.0, 1.2, 0.0)).length() < 1e-6);
        assert_eq!(store.force(slot), Vec3::X);
        assert_eq!(store.time_to_live(slot), 5.0);
        assert!(store.is_modified());
        assert!(store.take_modified());
        assert!(!store.is_modified());
    }

    #[test]
    fn test_insert_rejected_when_full() {
        let mut store = ParticleStore::new(1);
        assert!(store.insert(&descriptor(0.0), 0.1, Vec3::ZERO).is_some());
        store.take_modified();
        assert!(store.insert(&descriptor(1.0), 0.1, Vec3::ZERO).is_none());
        assert!(!store.is_modified());
        check_invariants(&store);
    }

    #[test]
    fn test_batch_truncated_to_capacity() {
        let mut store = ParticleStore::new(3);
        let batch: Vec<_> = (0..5).map(|i| descriptor(i as f32)).collect();
        let mut forces = 0;
        let admitted = store.insert_batch(&batch, 0.1, || {
            forces += 1;
            Vec3::ZERO
        });

        assert_eq!(admitted, 3);
        assert_eq!(forces, 3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.remaining_free(), 0);
        // The first three descriptors were the ones admitted
        let xs: Vec<f32> = store
            .active_indices()
            .iter()
            .map(|&s| store.position(s as usize).x)
            .collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
        check_invariants(&store);
    }

    #[test]
    fn test_remove_at_frees_slot_for_reuse() {
        let mut store = ParticleStore::new(3);
        for i in 0..3 {
            store.insert(&descriptor(i as f32), 0.1, Vec3::ZERO);
        }
        let slot = store.remove_at(0);
        assert_eq!(slot, 0);
        assert!(!store.is_active(0));
        assert_eq!(store.remaining_free(), 1);
        // Tail moved into the vacated position
        assert_eq!(store.active_indices(), &[2, 1]);

        let reused = store.insert(&descriptor(9.0), 0.1, Vec3::ZERO).unwrap();
        assert_eq!(reused, 0);
        check_invariants(&store);
    }

    #[test]
    fn test_reverse_pass_visits_every_particle_once() {
        let mut store = ParticleStore::new(6);
        for i in 0..6 {
            store.insert(&descriptor(i as f32), 0.1, Vec3::ZERO);
        }

        let mut visited = Vec::new();
        let removed = store.for_each_active_reverse(|p| {
            visited.push(p.slot);
            if p.slot % 2 == 0 { Visit::Remove } else { Visit::Keep }
        });

        assert_eq!(removed, 3);
        assert_eq!(visited, vec![5, 4, 3, 2, 1, 0]);
        let mut remaining: Vec<u32> = store.active_indices().to_vec();
        remaining.sort_unstable();
        assert_eq!(remaining, vec![1, 3, 5]);
        check_invariants(&store);
    }

    #[test]
    fn test_pass_can_mutate_particles() {
        let mut store = ParticleStore::new(2);
        store.insert(&descriptor(0.0), 0.1, Vec3::ZERO);
        store.for_each_active_reverse(|p| {
            *p.position += Vec3::Y;
            *p.time_to_live -= 1.0;
            Visit::Keep
        });
        assert_eq!(store.position(0), Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(store.time_to_live(0), 4.0);
    }

    #[test]
    fn test_clear_frees_everything() {
        let mut store = ParticleStore::new(4);
        for i in 0..3 {
            store.insert(&descriptor(i as f32), 0.1, Vec3::ZERO);
        }
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.remaining_free(), 4);
        check_invariants(&store);
    }

    proptest! {
        #[test]
        fn prop_capacity_invariant_holds(
            capacity in 1usize..32,
            ops in proptest::collection::vec((any::<bool>(), 0usize..64), 0..200),
        ) {
            let mut store = ParticleStore::new(capacity);
            for (is_insert, n) in ops {
                if is_insert {
                    let before = store.len();
                    let inserted = store.insert(&descriptor(n as f32), 0.02, Vec3::ZERO);
                    prop_assert_eq!(inserted.is_some(), before < capacity);
                } else if !store.is_empty() {
                    store.remove_at(n % store.len());
                }
                prop_assert_eq!(store.len() + store.remaining_free(), store.capacity());
                prop_assert!(store.len() <= capacity);
            }
            check_invariants(&store);
        }

        #[test]
        fn prop_batch_admits_at_most_remaining(
            capacity in 1usize..16,
            preload in 0usize..16,
            batch_len in 0usize..32,
        ) {
            let mut store = ParticleStore::new(capacity);
            let preload: Vec<_> = (0..preload).map(|i| descriptor(i as f32)).collect();
            store.insert_batch(&preload, 0.02, || Vec3::ZERO);
            let free_before = store.remaining_free();

            let batch: Vec<_> = (0..batch_len).map(|i| descriptor(i as f32)).collect();
            let admitted = store.insert_batch(&batch, 0.02, || Vec3::ZERO);
            prop_assert_eq!(admitted, batch_len.min(free_before));
            prop_assert_eq!(store.remaining_free(), free_before - admitted);
        }
    }
}
