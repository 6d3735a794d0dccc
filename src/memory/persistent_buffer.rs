//! Persistent Buffer - grow-never-shrink scratch storage

/// Scratch buffer reused across steps. Its length tracks the last request;
/// its capacity only ever grows.
#[derive(Debug, Clone, Default)]
pub struct PersistentBuffer<T> {
    data: Vec<T>,
    len: usize,
    grow_count: usize,
}

impl<T: Copy + Default> PersistentBuffer<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            len: 0,
            grow_count: 0,
        }
    }

    /// Make `len` elements addressable, growing the storage if needed
    pub fn ensure_len(&mut self, len: usize) -> &mut [T] {
        if len > self.data.len() {
            self.data.resize(len, T::default());
            self.grow_count += 1;
        }
        self.len = len;
        &mut self.data[..len]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the storage can hold without growing
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn grow_count(&self) -> usize {
        self.grow_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grows_but_never_shrinks() {
        let mut buffer = PersistentBuffer::<u32>::new();
        buffer.ensure_len(8).fill(1);
        assert_eq!(buffer.capacity(), 8);

        buffer.ensure_len(2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.grow_count(), 1);

        buffer.ensure_len(16);
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(buffer.grow_count(), 2);
    }
}
