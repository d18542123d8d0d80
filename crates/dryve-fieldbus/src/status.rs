//! Point-in-time drive status snapshot.

use crate::cia402::Statusword;
use crate::od::ObjectKey;
use crate::sdo::SdoClient;
use dryve_common::error::DryveResult;
use serde::Serialize;
use std::time::SystemTime;

/// Snapshot of position, velocity and status flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriveStatus {
    /// Actual position in device units.
    pub position: f64,
    /// Actual velocity (scaled).
    pub velocity: f64,
    /// Raw Statusword.
    pub statusword: u16,
    /// Fault bit of the Statusword.
    pub fault: bool,
    /// Whether the manufacturer homing status reports a completed homing.
    pub homed: bool,
    /// When the snapshot was taken.
    pub timestamp: SystemTime,
}

impl DriveStatus {
    /// Read every field from the drive.
    ///
    /// # Errors
    ///
    /// Propagates the first failed SDO read.
    pub fn capture(sdo: &SdoClient) -> DryveResult<Self> {
        let position = sdo.read(ObjectKey::ActualPosition)?.as_f64();
        let velocity = sdo.read(ObjectKey::ActualVelocity)?.as_f64();
        let statusword = sdo.read_u16(ObjectKey::Statusword)?;
        let homed = sdo.read(ObjectKey::HomingStatus)?.as_i64() != 0;

        Ok(Self {
            position,
            velocity,
            statusword,
            fault: Statusword::from_bits_retain(statusword).is_fault(),
            homed,
            timestamp: SystemTime::now(),
        })
    }

    /// The Statusword as flags.
    pub fn flags(&self) -> Statusword {
        Statusword::from_bits_retain(self.statusword)
    }
}
