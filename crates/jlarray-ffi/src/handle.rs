//! Slot+generation table mapping `u64` tokens to wrapped arrays.
//!
//! C callers never hold a Rust pointer, only a token. Removing an entry bumps
//! its slot's generation, so a token that outlives its entry resolves to
//! `None` instead of to whatever reuses the slot.

/// Token layout: slot index in the high 32 bits, generation in the low 32.
fn pack(slot: u32, generation: u32) -> u64 {
    (u64::from(slot) << 32) | u64::from(generation)
}

fn unpack(token: u64) -> (u32, u32) {
    ((token >> 32) as u32, token as u32)
}

struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

/// Table of live entries addressed by generation-checked tokens.
pub(crate) struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    vacant: Vec<u32>,
    live: usize,
}

impl<T> HandleTable<T> {
    /// An empty table, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            live: 0,
        }
    }

    /// Store `value` and return its token.
    pub fn insert(&mut self, value: T) -> u64 {
        self.live += 1;
        match self.vacant.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(value);
                pack(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(value),
                });
                pack(index, 0)
            }
        }
    }

    fn slot(&self, token: u64) -> Option<&Slot<T>> {
        let (index, generation) = unpack(token);
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
    }

    /// The entry behind `token`, or `None` if stale or never issued.
    pub fn get(&self, token: u64) -> Option<&T> {
        self.slot(token)?.entry.as_ref()
    }

    /// Take the entry behind `token` out of the table.
    ///
    /// The slot's generation advances so `token` goes stale. A slot whose
    /// generation wraps to 0 is retired rather than reused, so a token from
    /// its first life can never match again.
    pub fn remove(&mut self, token: u64) -> Option<T> {
        let (index, generation) = unpack(token);
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        if slot.generation != 0 {
            self.vacant.push(index);
        }
        self.live -= 1;
        Some(value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_resolve_until_removed() {
        let mut table = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_eq!(table.get(a), Some(&"a"));
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.remove(a), Some("a"));
        assert_eq!(table.get(a), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn second_remove_is_none() {
        let mut table = HandleTable::new();
        let t = table.insert(7u8);
        assert_eq!(table.remove(t), Some(7));
        assert_eq!(table.remove(t), None);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn reused_slot_does_not_answer_old_token() {
        let mut table = HandleTable::new();
        let old = table.insert(1u32);
        table.remove(old);
        let new = table.insert(2u32);
        assert_eq!(unpack(old).0, unpack(new).0);
        assert_eq!(unpack(new).1, unpack(old).1 + 1);
        assert_eq!(table.get(old), None);
        assert_eq!(table.get(new), Some(&2));
    }

    #[test]
    fn unknown_slot_is_none() {
        let table: HandleTable<u8> = HandleTable::new();
        assert_eq!(table.get(pack(42, 0)), None);
        assert_eq!(table.get(0), None);
    }

    #[test]
    fn wrapped_generation_retires_slot() {
        let mut table = HandleTable::new();
        let first = table.insert(1u32);
        table.remove(first);
        table.slots[0].generation = u32::MAX;
        let last = table.insert(2u32);
        assert_eq!(unpack(last), (0, u32::MAX));
        table.remove(last);
        assert_eq!(table.slots[0].generation, 0);
        assert!(!table.vacant.contains(&0));
        assert_eq!(table.get(first), None);
        let fresh = table.insert(3u32);
        assert_eq!(unpack(fresh).0, 1);
    }
}
