//! Time-window debouncing for the four command buttons.
//!
//! A raw level must hold unchanged for the whole window before it becomes
//! the stable level. A stable transition into the active level latches a
//! press edge that stays set until [`DebouncedChannel::take_edge`] consumes it.

use pump_traits::Level;

/// Which electrical level means "pressed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Pulled up; pressing ties the line to ground.
    ActiveLow,
    ActiveHigh,
}

impl Polarity {
    #[inline]
    pub fn is_active(self, level: Level) -> bool {
        match self {
            Polarity::ActiveLow => level.is_low(),
            Polarity::ActiveHigh => level.is_high(),
        }
    }

    #[inline]
    fn released(self) -> Level {
        match self {
            Polarity::ActiveLow => Level::High,
            Polarity::ActiveHigh => Level::Low,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DebouncedChannel {
    name: &'static str,
    polarity: Polarity,
    window_ms: u64,
    stable: Level,
    last_raw: Level,
    last_change_ms: u64,
    edge: bool,
    last_press_ms: Option<u64>,
    /// Set by `rearm` on a held button; cleared once it is released.
    inhibited: bool,
}

impl DebouncedChannel {
    /// A channel that starts out released.
    pub fn new(name: &'static str, polarity: Polarity, window_ms: u64) -> Self {
        let idle = polarity.released();
        Self {
            name,
            polarity,
            window_ms,
            stable: idle,
            last_raw: idle,
            last_change_ms: 0,
            edge: false,
            last_press_ms: None,
            inhibited: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Feed one raw reading. Returns whether the stable level is active.
    pub fn sample(&mut self, raw: Level, now_ms: u64) -> bool {
        if raw != self.last_raw {
            self.last_raw = raw;
            self.last_change_ms = now_ms;
        }
        if raw != self.stable && now_ms.saturating_sub(self.last_change_ms) >= self.window_ms {
            self.stable = raw;
            if self.polarity.is_active(raw) {
                self.edge = true;
                self.last_press_ms = Some(now_ms);
                tracing::trace!(channel = self.name, now_ms, "press edge");
            } else {
                self.inhibited = false;
            }
        }
        self.is_active()
    }

    /// Stable level is the active level.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.inhibited && self.polarity.is_active(self.stable)
    }

    /// Consume the pending press edge, if any.
    #[inline]
    pub fn take_edge(&mut self) -> bool {
        std::mem::take(&mut self.edge)
    }

    #[inline]
    pub fn has_edge(&self) -> bool {
        self.edge
    }

    /// Held now, or a press edge was seen within the last `hold_ms`.
    ///
    /// Lets a short tap stay visible to a slow status consumer.
    pub fn recently_active(&self, now_ms: u64, hold_ms: u64) -> bool {
        self.is_active()
            || self
                .last_press_ms
                .is_some_and(|t| now_ms.saturating_sub(t) < hold_ms)
    }

    /// Adopt `raw` as the stable level without producing an edge.
    ///
    /// Used after an emergency stop clears: a button held through the
    /// release reads inactive until it has been let go.
    pub fn rearm(&mut self, raw: Level, now_ms: u64) {
        self.stable = raw;
        self.last_raw = raw;
        self.last_change_ms = now_ms;
        self.edge = false;
        self.inhibited = self.polarity.is_active(raw);
    }
}
