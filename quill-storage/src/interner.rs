//! Bidirectional string↔id interning for labels and relationship types.
//!
//! Mirrors the teacher's `label_interner.rs`: a `HashMap` for string→id
//! lookup and a growable `Vec` for id→string, kept in sync.

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
pub struct Interner {
    s2i: FxHashMap<String, u32>,
    i2s: Vec<String>,
}

impl Interner {
    pub fn get_or_intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.s2i.get(name) {
            return id;
        }
        let id = self.i2s.len() as u32;
        self.i2s.push(name.to_string());
        self.s2i.insert(name.to_string(), id);
        id
    }

    pub fn get_id(&self, name: &str) -> Option<u32> {
        self.s2i.get(name).copied()
    }

    pub fn get_name(&self, id: u32) -> Option<&str> {
        self.i2s.get(id as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.i2s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i2s.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_name_twice_returns_the_same_id() {
        let mut interner = Interner::default();
        let a = interner.get_or_intern("Person");
        let b = interner.get_or_intern("Person");
        assert_eq!(a, b);
        assert_eq!(interner.get_name(a), Some("Person"));
    }
}
