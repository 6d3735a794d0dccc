//! Strided views over engine buffers
//!
//! Sync-in accepts arrays whose elements sit `stride` bytes apart, so an
//! engine can hand over a larger per-body struct without repacking it.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::error::{PhysicsError, PhysicsResult};

/// Read-only view of `len` elements of `T` spaced `stride` bytes apart
#[derive(Debug, Clone, Copy)]
pub struct StridedSlice<'a, T> {
    bytes: &'a [u8],
    stride: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<'a, T: Pod> StridedSlice<'a, T> {
    pub fn new(name: &str, bytes: &'a [u8], stride: usize, len: usize) -> PhysicsResult<Self> {
        let element_size = std::mem::size_of::<T>();
        if stride < element_size {
            return Err(PhysicsError::InvalidStride {
                name: name.to_string(),
                stride,
                element_size,
            });
        }

        // Saturates on overflow so the length check below rejects it
        let required = match len.checked_sub(1) {
            None => 0,
            Some(last) => last
                .checked_mul(stride)
                .and_then(|offset| offset.checked_add(element_size))
                .unwrap_or(usize::MAX),
        };
        if bytes.len() < required {
            return Err(PhysicsError::BufferTooSmall {
                name: name.to_string(),
                required,
                available: bytes.len(),
            });
        }

        Ok(Self {
            bytes,
            stride,
            len,
            _marker: PhantomData,
        })
    }

    /// Tightly packed view
    pub fn from_slice(items: &'a [T]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(items),
            stride: std::mem::size_of::<T>(),
            len: items.len(),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }
        let start = index * self.stride;
        let end = start + std::mem::size_of::<T>();
        Some(bytemuck::pod_read_unaligned(&self.bytes[start..end]))
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + 'a {
        let view = *self;
        (0..view.len).filter_map(move |i| view.get(i))
    }
}
