//! Status snapshots and their delivery to observers.
//!
//! Observers never feed back into control state. A slow observer only
//! ever sees the latest snapshot; older ones are dropped.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::Serialize;

use crate::cycle::CycleDirection;
use crate::error::SafetyFault;
use crate::mode::SystemMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub estop_active: bool,
    pub mode: SystemMode,
    pub cycle_direction: CycleDirection,
    pub extend_output: bool,
    pub retract_output: bool,
    pub manual_extend_active: bool,
    pub manual_retract_active: bool,
    pub start_auto_active: bool,
    pub stop_auto_active: bool,
    pub endstop_in: bool,
    pub endstop_out: bool,
    pub cycle_timeout_ms: u64,
    pub timeout_enabled: bool,
    pub last_stroke_duration_ms: u64,
    pub avg_stroke_duration_ms: u64,
    pub stroke_history: Vec<u64>,
    pub fault: Option<SafetyFault>,
    pub outputs_suspended: bool,
}

/// Receives published snapshots.
pub trait StatusSink {
    fn publish(
        &mut self,
        snapshot: &StatusSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<F> StatusSink for F
where
    F: FnMut(&StatusSnapshot),
{
    fn publish(
        &mut self,
        snapshot: &StatusSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self(snapshot);
        Ok(())
    }
}

/// Decides when to publish: on any change, or after `interval_ms` of silence.
#[derive(Debug, Clone)]
pub struct PublishGate {
    interval_ms: u64,
    last: Option<(StatusSnapshot, u64)>,
}

impl PublishGate {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            last: None,
        }
    }

    /// Returns `true` and remembers `snap` when it should go out.
    pub fn offer(&mut self, snap: &StatusSnapshot, now_ms: u64) -> bool {
        let due = match &self.last {
            None => true,
            Some((prev, at)) => prev != snap || now_ms.saturating_sub(*at) >= self.interval_ms,
        };
        if due {
            self.last = Some((snap.clone(), now_ms));
        }
        due
    }
}

/// Latest-wins hand-off of snapshots to another thread.
pub fn feed() -> (FeedSink, StatusFeed) {
    let (tx, rx) = bounded(1);
    (
        FeedSink {
            tx,
            drain: rx.clone(),
        },
        StatusFeed { rx },
    )
}

/// Producer half of [`feed`]; never blocks the control loop.
pub struct FeedSink {
    tx: Sender<StatusSnapshot>,
    drain: Receiver<StatusSnapshot>,
}

impl StatusSink for FeedSink {
    fn publish(
        &mut self,
        snapshot: &StatusSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut item = snapshot.clone();
        // Two attempts: the slot may be refilled by a racing reader draining it.
        for _ in 0..2 {
            match self.tx.try_send(item) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    let _ = self.drain.try_recv();
                    item = back;
                }
                Err(TrySendError::Disconnected(_)) => return Err("status feed closed".into()),
            }
        }
        Ok(())
    }
}

/// Consumer half of [`feed`].
pub struct StatusFeed {
    rx: Receiver<StatusSnapshot>,
}

impl StatusFeed {
    /// Most recent snapshot, if a new one arrived.
    pub fn latest(&self) -> Option<StatusSnapshot> {
        self.rx.try_iter().last()
    }

    /// Block until a snapshot arrives or the producer goes away.
    pub fn recv(&self) -> Option<StatusSnapshot> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<StatusSnapshot> {
        self.rx.recv_timeout(timeout).ok()
    }
}
