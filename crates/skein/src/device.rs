//! Execution context for tensor primitives.

use core::ops::Range;

/// Where tensor primitives run: on the calling thread, or split across a
/// worker pool. Every parallel-capable primitive takes the device as an
/// explicit argument; nothing is hidden in a thread-local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    SingleThreaded,
    /// Worker pool with the given thread count.
    ThreadPool(usize),
}

impl Device {
    /// Thread pool sized to the available hardware parallelism.
    pub fn thread_pool() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::ThreadPool(n)
    }

    /// Number of worker threads this device uses.
    pub fn threads(&self) -> usize {
        match self {
            Self::SingleThreaded => 1,
            Self::ThreadPool(n) => (*n).max(1),
        }
    }

    /// Split `len` work items into at most `threads()` contiguous ranges.
    ///
    /// The split depends only on `len` and the thread count, so chunked
    /// reductions combined in chunk order are deterministic for a fixed
    /// device configuration.
    pub fn chunk_ranges(&self, len: usize) -> Vec<Range<usize>> {
        let chunks = self.threads().min(len).max(1);
        let base = len / chunks;
        let extra = len % chunks;
        let mut ranges = Vec::with_capacity(chunks);
        let mut start = 0;
        for c in 0..chunks {
            let size = base + usize::from(c < extra);
            ranges.push(start..start + size);
            start += size;
        }
        ranges
    }

    /// Run `work` over `len` items, one chunk per worker, and return the
    /// per-chunk results in chunk order.
    pub fn run_chunks<T, F>(&self, len: usize, work: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Range<usize>) -> T + Sync,
    {
        let ranges = self.chunk_ranges(len);
        if ranges.len() <= 1 {
            return ranges.into_iter().map(&work).collect();
        }
        std::thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .into_iter()
                .map(|r| scope.spawn(|| work(r)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::thread_pool()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ranges_cover_everything() {
        let device = Device::ThreadPool(4);
        let ranges = device.chunk_ranges(10);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0], 0..3);
        assert_eq!(ranges.last().unwrap().end, 10);
        let total: usize = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn chunk_ranges_small_input() {
        let device = Device::ThreadPool(8);
        let ranges = device.chunk_ranges(3);
        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().all(|r| r.len() == 1));
    }

    #[test]
    fn run_chunks_order_is_stable() {
        let device = Device::ThreadPool(4);
        let sums = device.run_chunks(100, |r| r.sum::<usize>());
        let single = Device::SingleThreaded.run_chunks(100, |r| r.sum::<usize>());
        assert_eq!(sums.iter().sum::<usize>(), single.iter().sum::<usize>());
        assert_eq!(sums.iter().sum::<usize>(), 4950);
    }

    #[test]
    fn single_threaded_one_chunk() {
        let device = Device::SingleThreaded;
        assert_eq!(device.chunk_ranges(100).len(), 1);
        assert_eq!(device.threads(), 1);
    }
}
