#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Control core for a reciprocating hydraulic actuator (hardware-agnostic).
//!
//! All hardware interaction goes through `pump_traits::InputBank` and
//! `pump_traits::Valve`; time comes from the caller as monotonic
//! milliseconds.
//!
//! ## Architecture
//!
//! - **Debounce**: per-button time-window filter with latched press edges (`debounce`)
//! - **Safety**: e-stop, dual end-stop and cycle-timeout interlocks (`safety`)
//! - **Mode**: MANUAL/AUTO transitions from command edges (`mode`)
//! - **Cycle**: end-stop reversal and quiescent delay (`cycle`)
//! - **Output**: break-before-make coil policy and driver (`output`)
//! - **Telemetry**: rolling stroke-duration window (`telemetry`)
//! - **Controller**: the ordered per-tick orchestration (`controller`)
//! - **Runner**: the cooperative scheduler and inbound commands (`runner`)
//! - **Status**: snapshots, publish cadence, latest-wins feed (`status`)

pub mod config;
pub mod controller;
pub mod conversions;
pub mod cycle;
pub mod debounce;
pub mod error;
pub mod hw_error;
pub mod mode;
pub mod output;
pub mod runner;
pub mod safety;
pub mod status;
pub mod telemetry;

pub use config::{ControlCfg, ResumePolicy, RunnerCfg, SharedSettings, TimeoutSettings};
pub use controller::{ControlContext, Controller, TickReport};
pub use conversions::controller_from_config;
pub use cycle::{CycleDirection, CycleDirector, EndStops, Reversal};
pub use debounce::{DebouncedChannel, Polarity};
pub use error::{PumpError, Result, SafetyFault};
pub use mode::{CommandEdges, ModeController, ModeTransition, SystemMode, TransitionReason};
pub use output::{OutputDriver, OutputPair};
pub use runner::{Flow, RunSummary, Runner, RunnerCommand, RunnerHandle};
pub use safety::{SafetyInterlock, SafetyState};
pub use status::{FeedSink, PublishGate, StatusFeed, StatusSink, StatusSnapshot, feed};
pub use telemetry::{RingBuffer, StrokeStats};
