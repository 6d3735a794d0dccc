//! Body index pairs

use bytemuck::{Pod, Zeroable};
use static_assertions::assert_eq_size;

/// Two body indices identifying one interaction
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct BodyIndexPair {
    pub body_index_a: i32,
    pub body_index_b: i32,
}

impl BodyIndexPair {
    /// Marks a pair the next phase must skip
    pub const INVALID: BodyIndexPair = BodyIndexPair {
        body_index_a: -1,
        body_index_b: -1,
    };

    pub fn new(body_index_a: i32, body_index_b: i32) -> Self {
        Self {
            body_index_a,
            body_index_b,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.body_index_a >= 0 && self.body_index_b >= 0
    }

    /// Both indices address one of `num_bodies` bodies
    pub fn is_valid_for(&self, num_bodies: usize) -> bool {
        self.is_valid()
            && (self.body_index_a as usize) < num_bodies
            && (self.body_index_b as usize) < num_bodies
    }
}

impl Default for BodyIndexPair {
    fn default() -> Self {
        Self::INVALID
    }
}

assert_eq_size!(BodyIndexPair, [u8; 8]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sentinel() {
        assert!(!BodyIndexPair::INVALID.is_valid());
        assert!(!BodyIndexPair::new(0, -1).is_valid());
        assert!(BodyIndexPair::new(0, 1).is_valid_for(2));
        assert!(!BodyIndexPair::new(0, 2).is_valid_for(2));
    }
}
