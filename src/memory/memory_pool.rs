//! Block pool - recycles block stream storage between steps

/// Allocation counters for a [`BlockPool`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockPoolStats {
    pub allocations: usize,
    pub reuses: usize,
    pub free_blocks: usize,
}

/// Free list of word buffers backing stream blocks
#[derive(Debug, Default)]
pub struct BlockPool {
    free: Vec<Vec<u32>>,
    allocations: usize,
    reuses: usize,
}

impl BlockPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroed storage of at least `words` words
    pub fn acquire(&mut self, words: usize) -> Vec<u32> {
        if let Some(position) = self.free.iter().position(|b| b.capacity() >= words) {
            let mut block = self.free.swap_remove(position);
            block.clear();
            block.resize(words, 0);
            self.reuses += 1;
            return block;
        }

        self.allocations += 1;
        vec![0u32; words]
    }

    pub fn release(&mut self, block: Vec<u32>) {
        self.free.push(block);
    }

    pub fn stats(&self) -> BlockPoolStats {
        BlockPoolStats {
            allocations: self.allocations,
            reuses: self.reuses,
            free_blocks: self.free.len(),
        }
    }
}
