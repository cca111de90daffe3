use std::cmp::Ordering;

/// Fixed number of equally sized buffers stored back to back in one allocation.
#[derive(Debug, Clone)]
pub(crate) struct FlatPool<T> {
    data: Vec<T>,
    buffer_size: usize,
    count: usize,
}

impl<T: Copy + Default> FlatPool<T> {
    pub(crate) fn new(count: usize, buffer_size: usize) -> Self {
        Self {
            data: vec![T::default(); count * buffer_size],
            buffer_size,
            count,
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub(crate) fn get(&self, idx: usize) -> &[T] {
        &self.data[idx * self.buffer_size..(idx + 1) * self.buffer_size]
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> &mut [T] {
        &mut self.data[idx * self.buffer_size..(idx + 1) * self.buffer_size]
    }

    pub(crate) fn reset(&mut self, idx: usize) {
        self.get_mut(idx).fill(T::default());
    }

    /// Borrows buffer `dest` mutably while keeping every other buffer readable.
    pub(crate) fn split(&mut self, dest: usize) -> PoolSplit<'_, T> {
        let size = self.buffer_size;
        let (head, rest) = self.data.split_at_mut(dest * size);
        let (dest_slice, tail) = rest.split_at_mut(size);
        PoolSplit {
            head,
            dest: dest_slice,
            tail,
            dest_idx: dest,
            size,
        }
    }
}

pub(crate) struct PoolSplit<'a, T> {
    head: &'a [T],
    pub(crate) dest: &'a mut [T],
    tail: &'a [T],
    dest_idx: usize,
    size: usize,
}

impl<'a, T> PoolSplit<'a, T> {
    /// Callers must never ask for the destination buffer itself.
    pub(crate) fn source(&self, idx: usize) -> &'a [T] {
        let (head, tail) = (self.head, self.tail);
        match idx.cmp(&self.dest_idx) {
            Ordering::Less => &head[idx * self.size..(idx + 1) * self.size],
            Ordering::Greater => {
                let offset = idx - self.dest_idx - 1;
                &tail[offset * self.size..(offset + 1) * self.size]
            }
            Ordering::Equal => unreachable!("buffer {} is borrowed as the destination", idx),
        }
    }
}
