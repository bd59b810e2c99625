//! Per-device lifecycle state machine.
//!
//! ```text
//! any          --ClassifiedAdb{elevated: false}--> AdbUnrooted
//! any          --ClassifiedAdb{elevated: true}---> AdbReady
//! AdbUnrooted  --Elevated--> Elevating              (re-enumerate)
//! AdbReady     --RebootToBootloader--> FastbootReady (start fastboot scan)
//! any          --ClassifiedFastboot--> FastbootReady
//! FastbootReady --RebootToNormal--> Unclassified     (stop fastboot scan)
//! any          --Rejected | Detached--> Unclassified
//! ```
//!
//! Classification always wins: a device seen in a mode other than the one
//! its state expects (a reboot that was not taken, or one done outside the
//! registry) is reclassified from what was seen.
//!
//! Transitions are pure. Side effects are returned as an [`Effect`] for
//! the registry to carry out.

use crate::error::{DeviceError, Result};
use serde::Serialize;

/// Where a device is in the classification/elevation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Seen but not yet matched against the catalog
    #[default]
    Unclassified,
    /// Supported ADB device without root
    AdbUnrooted,
    /// Root requested, not yet confirmed by a later pass
    Elevating,
    /// Supported ADB device with root, usable for blob acquisition
    AdbReady,
    /// Supported device in bootloader mode
    FastbootReady,
}

impl LifecycleState {
    /// Whether the device belongs on the ready list in this state.
    pub fn is_ready(self) -> bool {
        matches!(self, LifecycleState::AdbReady | LifecycleState::FastbootReady)
    }

    /// Apply an event.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidTransition`] when the event is not
    /// allowed from this state.
    pub fn advance(self, event: LifecycleEvent) -> Result<Transition> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        let (next, effect) = match (self, event) {
            (_, E::Detached | E::Rejected) => (S::Unclassified, Effect::None),
            (_, E::ClassifiedAdb { elevated }) => {
                if elevated {
                    (S::AdbReady, Effect::None)
                } else {
                    (S::AdbUnrooted, Effect::None)
                }
            }
            (S::AdbUnrooted, E::Elevated) => (S::Elevating, Effect::Reenumerate),
            (S::AdbReady, E::RebootToBootloader) => (S::FastbootReady, Effect::StartFastbootScan),
            (_, E::ClassifiedFastboot) => (S::FastbootReady, Effect::None),
            (S::FastbootReady, E::RebootToNormal) => (S::Unclassified, Effect::StopFastbootScan),
            (from, event) => return Err(DeviceError::InvalidTransition { from, event }),
        };
        Ok(Transition { next, effect })
    }
}

/// Inputs to the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Matched a descriptor in ADB mode
    ClassifiedAdb {
        /// Whether the device shell already runs as root
        elevated: bool,
    },
    /// Root elevation was requested and acknowledged
    Elevated,
    /// Matched a descriptor in bootloader mode
    ClassifiedFastboot,
    /// User requested a reboot into the bootloader
    RebootToBootloader,
    /// User requested a reboot into the normal OS
    RebootToNormal,
    /// Device matched no descriptor
    Rejected,
    /// Device disappeared from enumeration
    Detached,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to do
    None,
    /// Run device enumeration again
    Reenumerate,
    /// Begin scanning for bootloader-mode devices
    StartFastbootScan,
    /// Stop scanning for bootloader-mode devices
    StopFastbootScan,
}

/// Result of a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// New state
    pub next: LifecycleState,
    /// Side effect to perform
    pub effect: Effect,
}
