//! Stroke-duration telemetry.

/// Number of strokes kept for the rolling average.
pub const STROKE_WINDOW: usize = 20;
/// Strokes shorter than this are treated as noise and dropped.
pub const MIN_STROKE_MS: u64 = 100;

/// Fixed-capacity ring; the oldest entry is overwritten once full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T: Copy + Default, const N: usize> {
    buf: [T; N],
    next: usize,
    len: usize,
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self {
            buf: [T::default(); N],
            next: 0,
            len: 0,
        }
    }
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    pub fn push(&mut self, v: T) {
        if N == 0 {
            return;
        }
        self.buf[self.next] = v;
        self.next = (self.next + 1) % N;
        self.len = (self.len + 1).min(N);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let start = (self.next + N - self.len) % N.max(1);
        (0..self.len).map(move |i| self.buf[(start + i) % N])
    }

    pub fn last(&self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            Some(self.buf[(self.next + N - 1) % N])
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrokeStats {
    window: RingBuffer<u64, STROKE_WINDOW>,
    last_ms: u64,
    avg_ms: u64,
}

impl StrokeStats {
    /// Record a completed stroke. Returns `false` when it was dropped as noise.
    pub fn record_stroke(&mut self, ms: u64) -> bool {
        if ms < MIN_STROKE_MS {
            tracing::debug!(stroke_ms = ms, "stroke below noise floor, ignored");
            return false;
        }
        self.window.push(ms);
        self.last_ms = ms;
        let sum: u64 = self.window.iter().sum();
        // len >= 1 after push
        self.avg_ms = sum / self.window.len() as u64;
        tracing::debug!(stroke_ms = ms, avg_ms = self.avg_ms, "stroke recorded");
        true
    }

    /// Most recent accepted stroke; 0 before the first.
    #[inline]
    pub fn last_ms(&self) -> u64 {
        self.last_ms
    }

    /// Integer mean of the window; 0 before the first stroke.
    #[inline]
    pub fn avg_ms(&self) -> u64 {
        self.avg_ms
    }

    pub fn history(&self) -> Vec<u64> {
        self.window.iter().collect()
    }

    pub fn count(&self) -> usize {
        self.window.len()
    }
}
