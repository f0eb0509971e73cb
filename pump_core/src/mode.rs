//! MANUAL/AUTO mode selection from debounced command edges.

use serde::Serialize;

use crate::config::ResumePolicy;
use crate::cycle::CycleDirection;
use crate::error::SafetyFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemMode {
    #[default]
    Manual,
    Auto,
}

impl std::fmt::Display for SystemMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SystemMode::Manual => "MANUAL",
            SystemMode::Auto => "AUTO",
        })
    }
}

/// Press edges consumed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandEdges {
    pub manual_extend: bool,
    pub manual_retract: bool,
    pub start_auto: bool,
    pub stop_auto: bool,
}

impl CommandEdges {
    #[inline]
    pub fn any_manual(&self) -> bool {
        self.manual_extend || self.manual_retract
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    StartPressed,
    StopPressed,
    /// A manual direction button was pressed while cycling.
    ManualOverride,
    Interlock(SafetyFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: SystemMode,
    pub to: SystemMode,
    pub reason: TransitionReason,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModeController {
    resume: ResumePolicy,
}

impl ModeController {
    pub fn new(resume: ResumePolicy) -> Self {
        Self { resume }
    }

    /// Decide a mode change from this tick's edges. Interlocks are evaluated
    /// before this and never reach here.
    ///
    /// A stop edge wins over a start edge arriving on the same tick.
    pub fn transition(&self, mode: SystemMode, edges: CommandEdges) -> Option<ModeTransition> {
        let (to, reason) = match mode {
            SystemMode::Manual if edges.start_auto && !edges.stop_auto => {
                (SystemMode::Auto, TransitionReason::StartPressed)
            }
            SystemMode::Manual => return None,
            SystemMode::Auto if edges.stop_auto => {
                (SystemMode::Manual, TransitionReason::StopPressed)
            }
            SystemMode::Auto if edges.any_manual() => {
                (SystemMode::Manual, TransitionReason::ManualOverride)
            }
            SystemMode::Auto => return None,
        };
        Some(ModeTransition {
            from: mode,
            to,
            reason,
        })
    }

    /// Direction to cycle in when entering AUTO.
    pub fn resume_direction(&self, last: CycleDirection) -> CycleDirection {
        match (self.resume, last) {
            (ResumePolicy::AlwaysOut, _) | (_, CycleDirection::Stopped) => CycleDirection::Out,
            (ResumePolicy::LastDirection, d) => d,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const NONE: CommandEdges = CommandEdges {
        manual_extend: false,
        manual_retract: false,
        start_auto: false,
        stop_auto: false,
    };

    #[rstest]
    #[case(SystemMode::Manual, CommandEdges { start_auto: true, ..NONE }, Some(SystemMode::Auto))]
    #[case(SystemMode::Manual, CommandEdges { start_auto: true, stop_auto: true, ..NONE }, None)]
    #[case(SystemMode::Manual, CommandEdges { manual_extend: true, ..NONE }, None)]
    #[case(SystemMode::Auto, CommandEdges { stop_auto: true, ..NONE }, Some(SystemMode::Manual))]
    #[case(SystemMode::Auto, CommandEdges { manual_retract: true, ..NONE }, Some(SystemMode::Manual))]
    #[case(SystemMode::Auto, CommandEdges { start_auto: true, ..NONE }, None)]
    #[case(SystemMode::Auto, NONE, None)]
    fn transitions(
        #[case] mode: SystemMode,
        #[case] edges: CommandEdges,
        #[case] expect: Option<SystemMode>,
    ) {
        let mc = ModeController::default();
        assert_eq!(mc.transition(mode, edges).map(|t| t.to), expect);
    }

    #[test]
    fn manual_override_reason() {
        let t = ModeController::default()
            .transition(
                SystemMode::Auto,
                CommandEdges {
                    manual_extend: true,
                    ..NONE
                },
            )
            .expect("leaves AUTO");
        assert_eq!(t.reason, TransitionReason::ManualOverride);
    }

    #[rstest]
    #[case(ResumePolicy::LastDirection, CycleDirection::In, CycleDirection::In)]
    #[case(ResumePolicy::LastDirection, CycleDirection::Stopped, CycleDirection::Out)]
    #[case(ResumePolicy::AlwaysOut, CycleDirection::In, CycleDirection::Out)]
    fn resume(
        #[case] policy: ResumePolicy,
        #[case] last: CycleDirection,
        #[case] expect: CycleDirection,
    ) {
        assert_eq!(ModeController::new(policy).resume_direction(last), expect);
    }
}
