//! Fixed-size block allocator: a stack of equally-sized blocks, `get()`
//! pops one (allocating a fresh one if the stack is empty). [`Block`]
//! returns itself to its [`Pool`]'s free list automatically on `Drop`.

use std::sync::{Arc, Mutex};

struct Inner {
    block_size: usize,
    free: Vec<Box<[u8]>>,
}

/// A pool of equally-sized byte blocks. Cheap to clone; clones share the
/// same underlying free list.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Mutex<Inner>>,
}

impl Pool {
    /// Creates a pool pre-filled with `count` blocks of `block_size`
    /// bytes.
    pub fn with_capacity(count: usize, block_size: usize) -> Pool {
        let free = (0..count)
            .map(|_| vec![0u8; block_size].into_boxed_slice())
            .collect();
        Pool {
            inner: Arc::new(Mutex::new(Inner { block_size, free })),
        }
    }

    /// Takes a block from the pool, allocating a fresh one if it's empty.
    pub fn get(&self) -> Block {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let bytes = inner
            .free
            .pop()
            .unwrap_or_else(|| vec![0u8; inner.block_size].into_boxed_slice());
        Block {
            bytes: Some(bytes),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Blocks currently sitting idle in the pool.
    pub fn available(&self) -> usize {
        self.inner.lock().expect("pool mutex poisoned").free.len()
    }
}

/// A block checked out of a [`Pool`]. Returns itself to the pool's free
/// list when dropped.
pub struct Block {
    bytes: Option<Box<[u8]>>,
    pool: Arc<Mutex<Inner>>,
}

impl std::ops::Deref for Block {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.bytes.as_deref().expect("block bytes taken before drop")
    }
}

impl std::ops::DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.bytes.as_deref_mut().expect("block bytes taken before drop")
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if let Some(bytes) = self.bytes.take() {
            self.pool.lock().expect("pool mutex poisoned").free.push(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaims_block_on_drop() {
        let pool = Pool::with_capacity(2, 64);
        assert_eq!(pool.available(), 2);

        let block = pool.get();
        assert_eq!(pool.available(), 1);
        drop(block);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn allocates_fresh_block_when_empty() {
        let pool = Pool::with_capacity(0, 32);
        let block = pool.get();
        assert_eq!(block.len(), 32);
    }
}
