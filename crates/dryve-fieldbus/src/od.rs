//! Object dictionary of the dryve D1.
//!
//! The dictionary is a closed set of [`ObjectKey`]s, each resolved at
//! compile time to an immutable [`ObjectEntry`] describing its address and
//! binary layout.

use crate::codec::DataType;
use dryve_common::error::{DryveError, DryveResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access rights declared for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessType {
    /// Read only.
    ReadOnly,
    /// Write only.
    WriteOnly,
    /// Read and write.
    ReadWrite,
    /// Constant, readable but never writable.
    Const,
}

impl AccessType {
    /// Whether `intent` is permitted by this access type.
    pub fn permits(self, intent: AccessIntent) -> bool {
        match intent {
            AccessIntent::Read => self != Self::WriteOnly,
            AccessIntent::Write => matches!(self, Self::WriteOnly | Self::ReadWrite),
        }
    }
}

/// Direction of an object access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    /// SDO upload.
    Read,
    /// SDO download.
    Write,
}

impl fmt::Display for AccessIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Layout metadata of one dictionary object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Object index.
    pub index: u16,
    /// Object subindex.
    pub subindex: u8,
    /// Encoded length in bytes.
    pub length: u8,
    /// Declared access rights.
    pub access: AccessType,
    /// Wire data type.
    pub data_type: DataType,
    /// Factor between engineering value and raw value.
    pub scale: u32,
}

impl ObjectEntry {
    #[allow(clippy::cast_possible_truncation)]
    const fn new(
        index: u16,
        subindex: u8,
        access: AccessType,
        data_type: DataType,
        scale: u32,
    ) -> Self {
        Self {
            index,
            subindex,
            // Widths are at most 4 bytes.
            length: data_type.width() as u8,
            access,
            data_type,
            scale,
        }
    }
}

macro_rules! object_keys {
    ($($(#[$doc:meta])* $variant:ident => $name:literal,)*) => {
        /// Symbolic name of a dictionary object.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum ObjectKey {
            $($(#[$doc])* $variant,)*
        }

        impl ObjectKey {
            /// Every key in the dictionary.
            pub const ALL: &'static [ObjectKey] = &[$(ObjectKey::$variant,)*];

            /// The snake_case name of this key.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }

        impl FromStr for ObjectKey {
            type Err = DryveError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)*
                    other => Err(DryveError::ObjectNotFound(other.to_string())),
                }
            }
        }
    };
}

object_keys! {
    /// CiA-402 Controlword (0x6040).
    Controlword => "controlword",
    /// CiA-402 Statusword (0x6041).
    Statusword => "statusword",
    /// Requested mode of operation (0x6060).
    ModeOfOperation => "mode_of_operation",
    /// Active mode of operation (0x6061).
    ModeOfOperationDisplay => "mode_of_operation_display",
    /// Target position (0x607A).
    TargetPosition => "target_position",
    /// Target velocity (0x60FF).
    TargetVelocity => "target_velocity",
    /// Actual position (0x6064).
    ActualPosition => "actual_position",
    /// Actual velocity (0x606C).
    ActualVelocity => "actual_velocity",
    /// Profile velocity (0x6081).
    ProfileVelocity => "profile_velocity",
    /// Profile acceleration (0x6083).
    ProfileAcceleration => "profile_acceleration",
    /// Profile deceleration (0x6084).
    ProfileDeceleration => "profile_deceleration",
    /// Feed constant, feed (0x6092:1).
    FeedConstantFeed => "feed_constant_feed",
    /// Feed constant, shaft revolutions (0x6092:2).
    FeedConstantShaftRevolutions => "feed_constant_shaft_revolutions",
    /// Homing method (0x6098).
    HomingMethod => "homing_method",
    /// Homing speed while searching for the switch (0x6099:1).
    HomingSpeedSearchSwitch => "homing_speed_search_switch",
    /// Homing speed while searching for zero (0x6099:2).
    HomingSpeedSearchZero => "homing_speed_search_zero",
    /// Homing acceleration (0x609A).
    HomingAcceleration => "homing_acceleration",
    /// Digital inputs (0x60FD).
    DigitalInputs => "digital_inputs",
    /// Physical digital outputs (0x60FE:1).
    DigitalOutputsPhysical => "digital_outputs_physical",
    /// Digital output enable mask (0x60FE:2).
    DigitalOutputsBitmask => "digital_outputs_bitmask",
    /// Supported drive modes (0x6502).
    SupportedModes => "supported_modes",
    /// Position demand value (0x6063).
    PositionDemand => "position_demand",
    /// Error register (0x1001).
    ErrorRegister => "error_register",
    /// Most recent entry of the pre-defined error field (0x1003:1).
    PredefinedErrorField => "predefined_error_field",
    /// Store parameters, all (0x1010:1).
    StoreParameters => "store_parameters",
    /// Manufacturer homing status (0x2014).
    HomingStatus => "homing_status",
}

impl ObjectKey {
    /// Dictionary entry for this key.
    pub const fn entry(self) -> ObjectEntry {
        use AccessType::{ReadOnly as RO, ReadWrite as RW};
        use DataType::{I32, I8, U16, U32, U8};

        match self {
            Self::Controlword => ObjectEntry::new(0x6040, 0, RW, U16, 1),
            Self::Statusword => ObjectEntry::new(0x6041, 0, RO, U16, 1),
            Self::ModeOfOperation => ObjectEntry::new(0x6060, 0, RW, I8, 1),
            Self::ModeOfOperationDisplay => ObjectEntry::new(0x6061, 0, RO, I8, 1),
            Self::TargetPosition => ObjectEntry::new(0x607A, 0, RW, I32, 1),
            Self::TargetVelocity => ObjectEntry::new(0x60FF, 0, RW, I32, 1),
            Self::ActualPosition => ObjectEntry::new(0x6064, 0, RO, I32, 1),
            Self::ActualVelocity => ObjectEntry::new(0x606C, 0, RO, I32, 100),
            Self::ProfileVelocity => ObjectEntry::new(0x6081, 0, RW, U32, 1),
            Self::ProfileAcceleration => ObjectEntry::new(0x6083, 0, RW, U32, 1),
            Self::ProfileDeceleration => ObjectEntry::new(0x6084, 0, RW, U32, 1),
            Self::FeedConstantFeed => ObjectEntry::new(0x6092, 1, RW, U32, 1),
            Self::FeedConstantShaftRevolutions => ObjectEntry::new(0x6092, 2, RW, U32, 1),
            Self::HomingMethod => ObjectEntry::new(0x6098, 0, RO, I8, 1),
            Self::HomingSpeedSearchSwitch => ObjectEntry::new(0x6099, 1, RW, U32, 100),
            Self::HomingSpeedSearchZero => ObjectEntry::new(0x6099, 2, RW, U32, 100),
            Self::HomingAcceleration => ObjectEntry::new(0x609A, 0, RW, U32, 100),
            Self::DigitalInputs => ObjectEntry::new(0x60FD, 0, RO, U32, 1),
            Self::DigitalOutputsPhysical => ObjectEntry::new(0x60FE, 1, RW, U32, 1),
            Self::DigitalOutputsBitmask => ObjectEntry::new(0x60FE, 2, RW, U32, 1),
            Self::SupportedModes => ObjectEntry::new(0x6502, 0, RO, U32, 1),
            Self::PositionDemand => ObjectEntry::new(0x6063, 0, RO, I32, 100),
            Self::ErrorRegister => ObjectEntry::new(0x1001, 0, RO, U8, 1),
            Self::PredefinedErrorField => ObjectEntry::new(0x1003, 1, RO, U32, 1),
            Self::StoreParameters => ObjectEntry::new(0x1010, 1, RW, U32, 1),
            Self::HomingStatus => ObjectEntry::new(0x2014, 0, RO, U16, 1),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value written to [`ObjectKey::StoreParameters`] to persist parameters ("save").
pub const STORE_PARAMETERS_MAGIC: u32 = 0x6576_6173;

/// Resolve `key` to its dictionary entry.
pub fn lookup(key: ObjectKey) -> ObjectEntry {
    key.entry()
}

/// Resolve a key by its snake_case name.
///
/// # Errors
///
/// Returns [`DryveError::ObjectNotFound`] for unknown names.
pub fn lookup_name(name: &str) -> DryveResult<(ObjectKey, ObjectEntry)> {
    let key: ObjectKey = name.parse()?;
    Ok((key, key.entry()))
}

/// Find the key stored at `index:subindex`.
///
/// # Errors
///
/// Returns [`DryveError::ObjectNotFound`] if no key has that address.
pub fn find_by_address(index: u16, subindex: u8) -> DryveResult<ObjectKey> {
    ObjectKey::ALL
        .iter()
        .copied()
        .find(|key| {
            let entry = key.entry();
            entry.index == index && entry.subindex == subindex
        })
        .ok_or_else(|| DryveError::ObjectNotFound(format!("0x{index:04X}:{subindex}")))
}

/// Reject `intent` if it conflicts with the entry's access type.
///
/// # Errors
///
/// Returns [`DryveError::AccessViolation`] naming the key and access type.
pub fn check_access(key: ObjectKey, entry: &ObjectEntry, intent: AccessIntent) -> DryveResult<()> {
    if entry.access.permits(intent) {
        return Ok(());
    }
    Err(DryveError::AccessViolation(format!(
        "cannot {intent} {key} (0x{:04X}:{}, {:?})",
        entry.index, entry.subindex, entry.access
    )))
}
