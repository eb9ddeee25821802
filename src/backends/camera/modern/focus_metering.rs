// SPDX-License-Identifier: GPL-3.0-only

//! AF lock and AE precapture sequencing before a still capture
//!
//! Every capture result reported while a still capture is pending goes
//! through [`FocusMeteringStateMachine::process`], which returns what the
//! session has to do next. The session owns the requests; the state machine
//! only tracks where the attempt stands.

use crate::backends::camera::types::{AeState, CaptureResult};
use tracing::debug;

/// Progress of a still-capture attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusMeteringState {
    /// No capture pending, results are ignored
    #[default]
    Preview,
    /// AF trigger sent, waiting for the lens to lock
    Locking,
    /// Focus locked, AE precapture about to be triggered
    Locked,
    /// Precapture trigger sent, waiting for AE to start metering
    Precapture,
    /// Waiting for AE to leave the precapture phase
    Waiting,
    /// Still capture fired, waiting for the image
    Capturing,
}

/// Follow-up the session has to issue after a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMeteringAction {
    None,
    /// Send the AE precapture trigger, then call
    /// [`FocusMeteringStateMachine::precapture_started`]
    RunPrecapture,
    /// Submit the still-capture request
    CaptureStill,
}

#[derive(Debug, Default)]
pub struct FocusMeteringStateMachine {
    state: FocusMeteringState,
}

impl FocusMeteringStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FocusMeteringState {
        self.state
    }

    /// True while a still capture is being negotiated or delivered
    pub fn is_active(&self) -> bool {
        self.state != FocusMeteringState::Preview
    }

    /// AF trigger has been sent
    pub fn start_locking(&mut self) {
        self.set_state(FocusMeteringState::Locking);
    }

    /// AE precapture trigger has been sent
    pub fn precapture_started(&mut self) {
        self.set_state(FocusMeteringState::Precapture);
    }

    /// Still capture fired without going through AF/AE
    pub fn capture_directly(&mut self) {
        self.set_state(FocusMeteringState::Capturing);
    }

    /// Back to preview, at session (re)configuration and after delivery
    pub fn reset(&mut self) {
        self.set_state(FocusMeteringState::Preview);
    }

    /// Advance on a capture result
    pub fn process(&mut self, result: &CaptureResult) -> FocusMeteringAction {
        match self.state {
            FocusMeteringState::Locking => {
                let Some(af) = result.af_state else {
                    return FocusMeteringAction::None;
                };
                if !af.is_locked() {
                    return FocusMeteringAction::None;
                }
                match result.ae_state {
                    None | Some(AeState::Converged) => {
                        self.set_state(FocusMeteringState::Capturing);
                        FocusMeteringAction::CaptureStill
                    }
                    Some(_) => {
                        self.set_state(FocusMeteringState::Locked);
                        FocusMeteringAction::RunPrecapture
                    }
                }
            }
            FocusMeteringState::Precapture => {
                if matches!(
                    result.ae_state,
                    None | Some(AeState::Precapture | AeState::FlashRequired | AeState::Converged)
                ) {
                    self.set_state(FocusMeteringState::Waiting);
                }
                FocusMeteringAction::None
            }
            FocusMeteringState::Waiting => {
                if result.ae_state != Some(AeState::Precapture) {
                    self.set_state(FocusMeteringState::Capturing);
                    FocusMeteringAction::CaptureStill
                } else {
                    FocusMeteringAction::None
                }
            }
            FocusMeteringState::Preview
            | FocusMeteringState::Locked
            | FocusMeteringState::Capturing => FocusMeteringAction::None,
        }
    }

    fn set_state(&mut self, state: FocusMeteringState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Focus/metering state");
            self.state = state;
        }
    }
}
