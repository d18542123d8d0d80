//! CiA-402 drive state machine.
//!
//! Transitions are requested by writing the Controlword and confirmed by
//! polling the Statusword. Every call blocks until the drive reports the
//! target state, reports a fault, or the deadline passes.

use crate::od::ObjectKey;
use crate::sdo::SdoClient;
use bitflags::bitflags;
use dryve_common::config::StateMachineConfig;
use dryve_common::error::{DryveError, DryveResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

bitflags! {
    /// CiA-402 Statusword (0x6041).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Statusword: u16 {
        /// Ready to switch on.
        const READY_TO_SWITCH_ON = 1 << 0;
        /// Switched on.
        const SWITCHED_ON = 1 << 1;
        /// Operation enabled.
        const OPERATION_ENABLED = 1 << 2;
        /// Fault.
        const FAULT = 1 << 3;
        /// Voltage enabled.
        const VOLTAGE_ENABLED = 1 << 4;
        /// Quick stop (active low).
        const QUICK_STOP = 1 << 5;
        /// Switch on disabled.
        const SWITCH_ON_DISABLED = 1 << 6;
        /// Warning.
        const WARNING = 1 << 7;
        /// Remote.
        const REMOTE = 1 << 9;
        /// Target reached.
        const TARGET_REACHED = 1 << 10;
        /// Internal limit active.
        const INTERNAL_LIMIT = 1 << 11;
        /// Operation mode specific (set-point acknowledge, homing attained, ...).
        const OPERATION_MODE_SPECIFIC = 1 << 12;
    }
}

const STATUSWORD_NAMES: [(Statusword, &str); 12] = [
    (Statusword::READY_TO_SWITCH_ON, "ReadyToSwitchOn"),
    (Statusword::SWITCHED_ON, "SwitchedOn"),
    (Statusword::OPERATION_ENABLED, "OperationEnabled"),
    (Statusword::FAULT, "Fault"),
    (Statusword::VOLTAGE_ENABLED, "VoltageEnabled"),
    (Statusword::QUICK_STOP, "QuickStop"),
    (Statusword::SWITCH_ON_DISABLED, "SwitchOnDisabled"),
    (Statusword::WARNING, "Warning"),
    (Statusword::REMOTE, "Remote"),
    (Statusword::TARGET_REACHED, "TargetReached"),
    (Statusword::INTERNAL_LIMIT, "InternalLimit"),
    (Statusword::OPERATION_MODE_SPECIFIC, "OperationModeSpecific"),
];

impl Statusword {
    /// Whether the fault bit is set.
    pub fn is_fault(self) -> bool {
        self.contains(Self::FAULT)
    }

    /// Whether the target-reached bit is set.
    pub fn target_reached(self) -> bool {
        self.contains(Self::TARGET_REACHED)
    }

    /// Whether the warning bit is set.
    pub fn has_warning(self) -> bool {
        self.contains(Self::WARNING)
    }

    /// Whether the drive accepts commands over the fieldbus.
    pub fn is_remote(self) -> bool {
        self.contains(Self::REMOTE)
    }

    /// Decoded CiA-402 state.
    pub fn state(self) -> DriveState {
        DriveState::from_statusword(self.bits())
    }
}

impl fmt::Display for Statusword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in STATUSWORD_NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// CiA-402 drive states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveState {
    /// Not ready to switch on.
    NotReadyToSwitchOn,
    /// Switch on disabled.
    SwitchOnDisabled,
    /// Ready to switch on.
    ReadyToSwitchOn,
    /// Switched on.
    SwitchedOn,
    /// Operation enabled.
    OperationEnabled,
    /// Quick stop active.
    QuickStopActive,
    /// Fault reaction active.
    FaultReactionActive,
    /// Fault.
    Fault,
}

/// Statusword mask/value pairs, first match wins.
const STATE_TABLE: [(u16, u16, DriveState); 8] = [
    (0x004F, 0x0000, DriveState::NotReadyToSwitchOn),
    (0x006F, 0x0040, DriveState::SwitchOnDisabled),
    (0x006F, 0x0021, DriveState::ReadyToSwitchOn),
    (0x006F, 0x0023, DriveState::SwitchedOn),
    (0x006F, 0x0027, DriveState::OperationEnabled),
    (0x006F, 0x0007, DriveState::QuickStopActive),
    (0x004F, 0x000F, DriveState::FaultReactionActive),
    (0x004F, 0x0008, DriveState::Fault),
];

impl DriveState {
    /// Decode the state from a raw Statusword.
    pub fn from_statusword(statusword: u16) -> Self {
        STATE_TABLE
            .iter()
            .find(|(mask, value, _)| statusword & mask == *value)
            .map_or(Self::NotReadyToSwitchOn, |(_, _, state)| *state)
    }
}

impl fmt::Display for DriveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReadyToSwitchOn => write!(f, "NotReadyToSwitchOn"),
            Self::SwitchOnDisabled => write!(f, "SwitchOnDisabled"),
            Self::ReadyToSwitchOn => write!(f, "ReadyToSwitchOn"),
            Self::SwitchedOn => write!(f, "SwitchedOn"),
            Self::OperationEnabled => write!(f, "OperationEnabled"),
            Self::QuickStopActive => write!(f, "QuickStopActive"),
            Self::FaultReactionActive => write!(f, "FaultReactionActive"),
            Self::Fault => write!(f, "Fault"),
        }
    }
}

/// Controlword commands.
pub mod controlword {
    /// Disable voltage.
    pub const DISABLE_VOLTAGE: u16 = 0x0000;
    /// Quick stop.
    pub const QUICK_STOP: u16 = 0x0002;
    /// Shutdown.
    pub const SHUTDOWN: u16 = 0x0006;
    /// Switch on.
    pub const SWITCH_ON: u16 = 0x0007;
    /// Enable operation.
    pub const ENABLE_OPERATION: u16 = 0x000F;
    /// Enable operation with the new set-point bit, starting a profile move.
    pub const START_MOTION: u16 = 0x001F;
    /// Fault reset.
    pub const FAULT_RESET: u16 = 0x0080;
}

const CONTROLWORD_TABLE: [(DriveState, u16); 6] = [
    (DriveState::SwitchOnDisabled, controlword::DISABLE_VOLTAGE),
    (DriveState::ReadyToSwitchOn, controlword::SHUTDOWN),
    (DriveState::SwitchedOn, controlword::SWITCH_ON),
    (DriveState::OperationEnabled, controlword::ENABLE_OPERATION),
    (DriveState::QuickStopActive, controlword::QUICK_STOP),
    (DriveState::Fault, controlword::FAULT_RESET),
];

/// Controlword that requests `state`, if the state can be requested.
pub fn controlword_for_state(state: DriveState) -> Option<u16> {
    CONTROLWORD_TABLE
        .iter()
        .find(|(s, _)| *s == state)
        .map(|(_, cw)| *cw)
}

/// Modes of operation supported by the dryve D1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum OperationMode {
    /// Profile position mode.
    ProfilePosition = 1,
    /// Profile velocity mode.
    ProfileVelocity = 3,
    /// Homing mode.
    Homing = 6,
    /// Cyclic synchronous position mode.
    CyclicSyncPosition = 8,
}

enum Poll {
    Reached,
    Pending(Statusword),
}

/// Drives one axis through the CiA-402 state graph.
#[derive(Debug, Clone)]
pub struct DriveStateMachine {
    sdo: SdoClient,
    poll_interval: Duration,
    timeout: Duration,
}

impl DriveStateMachine {
    /// Create a state machine with default polling settings.
    pub fn new(sdo: SdoClient) -> Self {
        Self::with_config(sdo, &StateMachineConfig::default())
    }

    /// Create a state machine with polling settings from `config`.
    pub fn with_config(sdo: SdoClient, config: &StateMachineConfig) -> Self {
        Self {
            sdo,
            poll_interval: config.poll_interval,
            timeout: config.state_timeout,
        }
    }

    /// The underlying SDO client.
    pub fn sdo(&self) -> &SdoClient {
        &self.sdo
    }

    /// Default deadline used by the transition helpers.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read the Statusword.
    ///
    /// # Errors
    ///
    /// Propagates SDO errors.
    pub fn read_statusword(&self) -> DryveResult<Statusword> {
        let raw = self.sdo.read_u16(ObjectKey::Statusword)?;
        Ok(Statusword::from_bits_retain(raw))
    }

    /// Read the Statusword and decode the current state.
    ///
    /// # Errors
    ///
    /// Propagates SDO errors.
    pub fn read_state(&self) -> DryveResult<DriveState> {
        Ok(self.read_statusword()?.state())
    }

    fn poll(&self, target: DriveState) -> DryveResult<Poll> {
        let statusword = self.read_statusword()?;
        if statusword.is_fault() {
            return Err(DryveError::FaultState {
                statusword: statusword.bits(),
            });
        }
        if statusword.state() == target {
            Ok(Poll::Reached)
        } else {
            Ok(Poll::Pending(statusword))
        }
    }

    /// Poll until the drive reports `target`.
    ///
    /// Polls at least once, even with a zero timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DryveError::FaultState`] as soon as a poll sees the fault
    /// bit, [`DryveError::OperationTimeout`] once `timeout` elapses, or the
    /// SDO error of a failed poll.
    pub fn wait_for_state(&self, target: DriveState, timeout: Duration) -> DryveResult<()> {
        let start = Instant::now();
        // `None` when the timeout overflows `Instant`: wait without a deadline.
        let deadline = start.checked_add(timeout);
        loop {
            match self.poll(target)? {
                Poll::Reached => {
                    debug!(state = %target, elapsed_ms = start.elapsed().as_millis(), "State reached");
                    return Ok(());
                }
                Poll::Pending(statusword) => {
                    let now = Instant::now();
                    if deadline.is_some_and(|d| now >= d) {
                        warn!(
                            target = %target,
                            state = %statusword.state(),
                            statusword = statusword.bits(),
                            "Timed out waiting for state"
                        );
                        return Err(DryveError::OperationTimeout {
                            target: target.to_string(),
                            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    trace!(target = %target, statusword = %statusword, "Waiting for state");
                    thread::sleep(self.sleep_before(deadline, now));
                }
            }
        }
    }

    /// Poll until the target-reached bit is set.
    ///
    /// # Errors
    ///
    /// Returns [`DryveError::FaultState`] on a fault,
    /// [`DryveError::TargetNotReached`] once `timeout` elapses, or the SDO
    /// error of a failed poll.
    pub fn wait_target_reached(&self, timeout: Duration) -> DryveResult<()> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let statusword = self.read_statusword()?;
            if statusword.is_fault() {
                return Err(DryveError::FaultState {
                    statusword: statusword.bits(),
                });
            }
            if statusword.target_reached() {
                return Ok(());
            }
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                return Err(DryveError::TargetNotReached(format!(
                    "statusword {statusword} after {}ms",
                    timeout.as_millis()
                )));
            }
            thread::sleep(self.sleep_before(deadline, now));
        }
    }

    fn sleep_before(&self, deadline: Option<Instant>, now: Instant) -> Duration {
        match deadline {
            Some(deadline) => self.poll_interval.min(deadline.saturating_duration_since(now)),
            None => self.poll_interval,
        }
    }

    fn transition(&self, controlword: u16, target: DriveState) -> DryveResult<()> {
        debug!(controlword, target = %target, "Requesting transition");
        self.sdo.write(ObjectKey::Controlword, controlword)?;
        self.wait_for_state(target, self.timeout)
    }

    /// Request Ready To Switch On (Controlword 0x0006).
    ///
    /// # Errors
    ///
    /// See [`wait_for_state`](Self::wait_for_state).
    pub fn shutdown(&self) -> DryveResult<()> {
        self.transition(controlword::SHUTDOWN, DriveState::ReadyToSwitchOn)
    }

    /// Request Switched On (Controlword 0x0007).
    ///
    /// # Errors
    ///
    /// See [`wait_for_state`](Self::wait_for_state).
    pub fn switch_on(&self) -> DryveResult<()> {
        self.transition(controlword::SWITCH_ON, DriveState::SwitchedOn)
    }

    /// Request Operation Enabled (Controlword 0x000F).
    ///
    /// # Errors
    ///
    /// See [`wait_for_state`](Self::wait_for_state).
    pub fn enable_operation(&self) -> DryveResult<()> {
        self.transition(controlword::ENABLE_OPERATION, DriveState::OperationEnabled)
    }

    /// Request Switch On Disabled (Controlword 0x0000).
    ///
    /// # Errors
    ///
    /// See [`wait_for_state`](Self::wait_for_state).
    pub fn disable_voltage(&self) -> DryveResult<()> {
        self.transition(controlword::DISABLE_VOLTAGE, DriveState::SwitchOnDisabled)
    }

    /// Request Quick Stop Active (Controlword 0x0002).
    ///
    /// # Errors
    ///
    /// See [`wait_for_state`](Self::wait_for_state).
    pub fn quick_stop(&self) -> DryveResult<()> {
        self.transition(controlword::QUICK_STOP, DriveState::QuickStopActive)
    }

    /// Remove power from the motor.
    ///
    /// # Errors
    ///
    /// See [`disable_voltage`](Self::disable_voltage).
    pub fn stop_drive(&self) -> DryveResult<()> {
        info!("Stopping drive");
        self.disable_voltage()
    }

    /// Clear a pending fault. Does nothing if the fault bit is clear.
    ///
    /// # Errors
    ///
    /// Returns [`DryveError::FaultState`] if the fault persists after the
    /// reset, or any error of [`wait_for_state`](Self::wait_for_state).
    pub fn fault_reset(&self) -> DryveResult<()> {
        let statusword = self.read_statusword()?;
        if !statusword.is_fault() {
            return Ok(());
        }

        info!(statusword = %statusword, "Resetting fault");
        self.sdo.write(ObjectKey::Controlword, controlword::FAULT_RESET)?;
        thread::sleep(self.poll_interval);
        self.wait_for_state(DriveState::SwitchOnDisabled, self.timeout)
    }

    /// Bring the drive to Operation Enabled from any state.
    ///
    /// A fault that survives the initial reset is logged and ignored; the
    /// following transitions fail on their own if it persists.
    ///
    /// # Errors
    ///
    /// Returns the first error of the shutdown, switch-on or enable steps,
    /// or a non-fault error of the reset.
    pub fn initialize_drive(&self) -> DryveResult<()> {
        info!("Initializing drive");
        match self.fault_reset() {
            Ok(()) => {}
            Err(DryveError::FaultState { statusword }) => {
                warn!(statusword, "Fault still set after reset, continuing");
            }
            Err(e) => return Err(e),
        }

        self.shutdown()?;
        self.switch_on()?;
        self.enable_operation()?;
        info!("Drive operation enabled");
        Ok(())
    }

    /// Select the mode of operation.
    ///
    /// # Errors
    ///
    /// Propagates SDO errors.
    pub fn set_mode(&self, mode: OperationMode) -> DryveResult<()> {
        debug!(?mode, "Setting mode of operation");
        self.sdo.write(ObjectKey::ModeOfOperation, mode as i8)
    }

    /// Read the active mode of operation.
    ///
    /// # Errors
    ///
    /// Propagates SDO errors.
    pub fn read_mode(&self) -> DryveResult<i8> {
        let value = self.sdo.read(ObjectKey::ModeOfOperationDisplay)?;
        i8::try_from(value.as_i64())
            .map_err(|_| DryveError::ValueOutOfRange(format!("mode of operation {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDrive;
    use dryve_common::config::SdoConfig;
    use std::sync::Arc;

    fn machine(drive: &Arc<FakeDrive>, timeout: Duration) -> DriveStateMachine {
        let sdo = SdoClient::with_config(
            drive.clone(),
            &SdoConfig {
                max_attempts: 3,
                retry_delay: Duration::from_millis(1),
            },
        );
        DriveStateMachine::with_config(
            sdo,
            &StateMachineConfig {
                poll_interval: Duration::from_millis(1),
                state_timeout: timeout,
            },
        )
    }

    #[test]
    fn test_statusword_decode_table() {
        let cases = [
            (0x0000, DriveState::NotReadyToSwitchOn),
            (0x0040, DriveState::SwitchOnDisabled),
            (0x0250, DriveState::SwitchOnDisabled),
            (0x0021, DriveState::ReadyToSwitchOn),
            (0x0023, DriveState::SwitchedOn),
            (0x0027, DriveState::OperationEnabled),
            (0x0637, DriveState::OperationEnabled),
            (0x0007, DriveState::QuickStopActive),
            (0x000F, DriveState::FaultReactionActive),
            (0x0008, DriveState::Fault),
            (0x0218, DriveState::Fault),
        ];
        for (statusword, expected) in cases {
            assert_eq!(
                DriveState::from_statusword(statusword),
                expected,
                "statusword 0x{statusword:04X}"
            );
        }
    }

    #[test]
    fn test_controlword_table() {
        assert_eq!(controlword_for_state(DriveState::SwitchOnDisabled), Some(0x0000));
        assert_eq!(controlword_for_state(DriveState::ReadyToSwitchOn), Some(0x0006));
        assert_eq!(controlword_for_state(DriveState::SwitchedOn), Some(0x0007));
        assert_eq!(controlword_for_state(DriveState::OperationEnabled), Some(0x000F));
        assert_eq!(controlword_for_state(DriveState::QuickStopActive), Some(0x0002));
        assert_eq!(controlword_for_state(DriveState::Fault), Some(0x0080));
        assert_eq!(controlword_for_state(DriveState::NotReadyToSwitchOn), None);
    }

    #[test]
    fn test_statusword_display() {
        assert_eq!(
            Statusword::from_bits_retain(0x0023).to_string(),
            "ReadyToSwitchOn|SwitchedOn|QuickStop"
        );
        assert_eq!(Statusword::from_bits_retain(0).to_string(), "-");

        let sw = Statusword::from_bits_retain(0x0608);
        assert!(sw.is_fault());
        assert!(sw.target_reached());
        assert!(sw.is_remote());
        assert!(!sw.has_warning());
    }

    #[test]
    fn test_switch_on_scenario() {
        let drive = FakeDrive::new();
        drive.set_statusword(0x0021);
        drive.on_controlword(controlword::SWITCH_ON, 0x0023);
        let sm = machine(&drive, Duration::from_secs(1));

        sm.switch_on().unwrap();
        assert_eq!(drive.written_controlwords(), vec![0x0007]);
        assert_eq!(sm.read_state().unwrap(), DriveState::SwitchedOn);
    }

    #[test]
    fn test_fault_during_wait_fails_fast() {
        let drive = FakeDrive::new();
        drive.set_statusword(0x0021);
        drive.on_controlword(controlword::SWITCH_ON, 0x0008);
        let sm = machine(&drive, Duration::from_secs(10));

        let start = Instant::now();
        let err = sm.switch_on().unwrap_err();
        assert_eq!(err, DryveError::FaultState { statusword: 0x0008 });
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_wait_returns_once_target_reported() {
        let drive = FakeDrive::new();
        drive.script_statusword(&[0x0021, 0x0021, 0x0023]);
        let sm = machine(&drive, Duration::from_secs(1));

        sm.wait_for_state(DriveState::SwitchedOn, Duration::from_secs(1))
            .unwrap();
        assert_eq!(drive.request_count(), 3);
    }

    #[test]
    fn test_wait_times_out() {
        let drive = FakeDrive::new();
        drive.set_statusword(0x0021);
        let sm = machine(&drive, Duration::from_secs(1));

        let start = Instant::now();
        let err = sm
            .wait_for_state(DriveState::OperationEnabled, Duration::from_millis(30))
            .unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(
            err,
            DryveError::OperationTimeout {
                target: "OperationEnabled".into(),
                timeout_ms: 30
            }
        );
    }

    #[test]
    fn test_unbounded_timeout_waits_without_deadline() {
        let drive = FakeDrive::new();
        drive.set_statusword(0x0027);
        let sm = machine(&drive, Duration::MAX);

        sm.wait_for_state(DriveState::OperationEnabled, Duration::MAX)
            .unwrap();
        assert_eq!(drive.request_count(), 1);

        // Transition helpers use the configured timeout.
        drive.set_statusword(0x0021);
        drive.on_controlword(controlword::SWITCH_ON, 0x0023);
        sm.switch_on().unwrap();

        drive.script_statusword(&[0x0027, 0x0027, 0x0427]);
        sm.wait_target_reached(Duration::MAX).unwrap();
    }

    #[test]
    fn test_zero_timeout_still_polls() {
        let drive = FakeDrive::new();
        drive.set_statusword(0x0027);
        let sm = machine(&drive, Duration::from_secs(1));

        sm.wait_for_state(DriveState::OperationEnabled, Duration::ZERO)
            .unwrap();
        assert_eq!(drive.request_count(), 1);
    }

    #[test]
    fn test_fault_reset_noop_without_fault() {
        let drive = FakeDrive::new();
        drive.set_statusword(0x0040);
        let sm = machine(&drive, Duration::from_secs(1));

        sm.fault_reset().unwrap();
        assert!(drive.written_controlwords().is_empty());
    }

    #[test]
    fn test_fault_reset_clears_fault() {
        let drive = FakeDrive::new();
        drive.set_statusword(0x0008);
        drive.on_controlword(controlword::FAULT_RESET, 0x0040);
        let sm = machine(&drive, Duration::from_secs(1));

        sm.fault_reset().unwrap();
        assert_eq!(drive.written_controlwords(), vec![0x0080]);
    }

    #[test]
    fn test_initialize_drive_sequence() {
        let drive = FakeDrive::new();
        drive.set_statusword(0x0008);
        drive.on_controlword(controlword::FAULT_RESET, 0x0040);
        drive.on_controlword(controlword::SHUTDOWN, 0x0021);
        drive.on_controlword(controlword::SWITCH_ON, 0x0023);
        drive.on_controlword(controlword::ENABLE_OPERATION, 0x0027);
        let sm = machine(&drive, Duration::from_secs(1));

        sm.initialize_drive().unwrap();
        assert_eq!(
            drive.written_controlwords(),
            vec![0x0080, 0x0006, 0x0007, 0x000F]
        );
    }

    #[test]
    fn test_initialize_drive_tolerates_lingering_fault() {
        let drive = FakeDrive::new();
        // Fault seen by the reset check and by its first poll, then gone.
        drive.script_statusword(&[0x0008, 0x0008]);
        drive.on_controlword(controlword::SHUTDOWN, 0x0021);
        drive.on_controlword(controlword::SWITCH_ON, 0x0023);
        drive.on_controlword(controlword::ENABLE_OPERATION, 0x0027);
        let sm = machine(&drive, Duration::from_secs(1));

        sm.initialize_drive().unwrap();
        assert_eq!(
            drive.written_controlwords(),
            vec![0x0080, 0x0006, 0x0007, 0x000F]
        );
    }

    #[test]
    fn test_initialize_drive_propagates_sdo_failure() {
        let drive = FakeDrive::new();
        drive.fail_next(3, 0x06);
        let sm = machine(&drive, Duration::from_secs(1));

        let err = sm.initialize_drive().unwrap_err();
        assert!(matches!(err, DryveError::ReadFailed { .. }));
        assert!(drive.written_controlwords().is_empty());
    }

    #[test]
    fn test_quick_stop_and_stop_drive() {
        let drive = FakeDrive::new();
        drive.set_statusword(0x0027);
        drive.on_controlword(controlword::QUICK_STOP, 0x0007);
        drive.on_controlword(controlword::DISABLE_VOLTAGE, 0x0040);
        let sm = machine(&drive, Duration::from_secs(1));

        sm.quick_stop().unwrap();
        sm.stop_drive().unwrap();
        assert_eq!(drive.written_controlwords(), vec![0x0002, 0x0000]);
    }

    #[test]
    fn test_set_and_read_mode() {
        let drive = FakeDrive::new();
        drive.set(ObjectKey::ModeOfOperationDisplay, &[6]);
        let sm = machine(&drive, Duration::from_secs(1));

        sm.set_mode(OperationMode::ProfilePosition).unwrap();
        assert_eq!(drive.get(ObjectKey::ModeOfOperation), vec![1]);
        assert_eq!(sm.read_mode().unwrap(), 6);
    }

    #[test]
    fn test_wait_target_reached() {
        let drive = FakeDrive::new();
        drive.set_statusword(0x0427);
        let sm = machine(&drive, Duration::from_secs(1));
        sm.wait_target_reached(Duration::from_millis(20)).unwrap();

        drive.set_statusword(0x0027);
        let err = sm.wait_target_reached(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, DryveError::TargetNotReached(_)));
    }
}
