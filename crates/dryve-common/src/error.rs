use thiserror::Error;

/// Modbus exception codes returned by the drive in an exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Illegal function code.
    IllegalFunction = 0x01,
    /// Illegal data address (unknown object index/subindex).
    IllegalDataAddress = 0x02,
    /// Illegal data value.
    IllegalDataValue = 0x03,
    /// Server device failure.
    ServerDeviceFailure = 0x04,
    /// Acknowledge (request accepted, processing).
    Acknowledge = 0x05,
    /// Server device busy.
    ServerDeviceBusy = 0x06,
    /// Gateway path unavailable.
    GatewayPathUnavailable = 0x0A,
    /// Gateway target device failed to respond.
    GatewayTargetFailed = 0x0B,
}

impl ExceptionCode {
    /// Parse an exception code from a byte value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::ServerDeviceFailure),
            0x05 => Some(Self::Acknowledge),
            0x06 => Some(Self::ServerDeviceBusy),
            0x0A => Some(Self::GatewayPathUnavailable),
            0x0B => Some(Self::GatewayTargetFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalFunction => write!(f, "Illegal Function"),
            Self::IllegalDataAddress => write!(f, "Illegal Data Address"),
            Self::IllegalDataValue => write!(f, "Illegal Data Value"),
            Self::ServerDeviceFailure => write!(f, "Server Device Failure"),
            Self::Acknowledge => write!(f, "Acknowledge"),
            Self::ServerDeviceBusy => write!(f, "Server Device Busy"),
            Self::GatewayPathUnavailable => write!(f, "Gateway Path Unavailable"),
            Self::GatewayTargetFailed => write!(f, "Gateway Target Failed"),
        }
    }
}

fn exception_name(code: &u8) -> String {
    ExceptionCode::from_byte(*code)
        .map(|e| e.to_string())
        .unwrap_or_else(|| "Unknown".into())
}

fn optional_code(code: &Option<u8>) -> String {
    code.map(|c| format!(" (last exception 0x{c:02X})"))
        .unwrap_or_default()
}

/// Coarse classification of a [`DryveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Socket or link failure.
    Transport,
    /// Framing or semantic violation of the telegram protocol.
    Protocol,
    /// Device-level CiA-402 condition.
    State,
    /// Terminal failure of an SDO read/write after retries.
    Sdo,
    /// Invalid configuration.
    Config,
}

/// Error type for the whole dryve D1 stack.
///
/// Every variant can report an optional numeric [`code`](DryveError::code)
/// for diagnostics.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DryveError {
    /// The socket closed or failed while sending or receiving.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Connecting, or waiting for response bytes, timed out.
    #[error("connection timeout: {0}")]
    ConnectionTimeout(String),

    /// The transport gave up after its bounded reconnect-and-retry loop.
    #[error("transport failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Message of the last underlying failure.
        last: String,
    },

    /// Response transaction id does not match the request.
    #[error("transaction id mismatch: expected {expected}, got {actual}")]
    TransactionMismatch {
        /// Transaction id of the request.
        expected: u16,
        /// Transaction id found in the response.
        actual: u16,
    },

    /// The drive answered with a Modbus exception response.
    #[error("modbus exception 0x{code:02X} ({})", exception_name(.code))]
    ModbusException {
        /// Raw exception code.
        code: u8,
    },

    /// Access intent conflicts with the object's declared access type.
    #[error("access violation: {0}")]
    AccessViolation(String),

    /// The object is not present in the object dictionary.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Malformed frame (short header, bad protocol id, length disagreement).
    #[error("framing error: {0}")]
    Framing(String),

    /// Echoed index/subindex/length differs from the request.
    #[error("response {field} mismatch: expected 0x{expected:X}, got 0x{actual:X}")]
    ResponseMismatch {
        /// Name of the mismatching field.
        field: &'static str,
        /// Expected value.
        expected: u32,
        /// Value found in the response.
        actual: u32,
    },

    /// Encoded value width differs from the declared width.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Declared length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// The codec does not know how to handle this data type.
    #[error("unsupported data type: {0}")]
    UnsupportedType(String),

    /// A value does not fit the declared data type after scaling.
    #[error("value out of range: {0}")]
    ValueOutOfRange(String),

    /// The drive reports the Fault bit in its Statusword.
    #[error("drive fault (statusword 0x{statusword:04X})")]
    FaultState {
        /// Statusword that carried the fault bit.
        statusword: u16,
    },

    /// Waiting for a drive state exceeded its deadline.
    #[error("timed out after {timeout_ms}ms waiting for state {target}")]
    OperationTimeout {
        /// Name of the awaited state.
        target: String,
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// A motion finished without the target-reached bit.
    #[error("target not reached: {0}")]
    TargetNotReached(String),

    /// SDO read kept failing with device exceptions.
    #[error("failed to read {key}{}", optional_code(.code))]
    ReadFailed {
        /// Object key that was read.
        key: String,
        /// Last Modbus exception code.
        code: Option<u8>,
    },

    /// SDO write kept failing with device exceptions.
    #[error("failed to write {key}{}", optional_code(.code))]
    WriteFailed {
        /// Object key that was written.
        key: String,
        /// Last Modbus exception code.
        code: Option<u8>,
    },

    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DryveError {
    /// Numeric diagnostic code, when the error carries one.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::ModbusException { code } => Some(u32::from(*code)),
            Self::TransactionMismatch { actual, .. } => Some(u32::from(*actual)),
            Self::FaultState { statusword } => Some(u32::from(*statusword)),
            Self::ReadFailed { code, .. } | Self::WriteFailed { code, .. } => {
                code.map(u32::from)
            }
            _ => None,
        }
    }

    /// Which layer of the stack the error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionLost(_) | Self::ConnectionTimeout(_) | Self::RetriesExhausted { .. } => {
                ErrorCategory::Transport
            }
            Self::TransactionMismatch { .. }
            | Self::ModbusException { .. }
            | Self::AccessViolation(_)
            | Self::ObjectNotFound(_)
            | Self::Framing(_)
            | Self::ResponseMismatch { .. }
            | Self::LengthMismatch { .. }
            | Self::UnsupportedType(_)
            | Self::ValueOutOfRange(_) => ErrorCategory::Protocol,
            Self::FaultState { .. } | Self::OperationTimeout { .. } | Self::TargetNotReached(_) => {
                ErrorCategory::State
            }
            Self::ReadFailed { .. } | Self::WriteFailed { .. } => ErrorCategory::Sdo,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// True for link failures the transport recovers from by reconnecting.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::ConnectionTimeout(_))
    }

    /// True only for device-side refusals the SDO client may retry.
    pub fn is_retryable_exchange(&self) -> bool {
        matches!(self, Self::ModbusException { .. })
    }

    /// Raw exception byte of a Modbus exception response.
    pub fn exception_byte(&self) -> Option<u8> {
        match self {
            Self::ModbusException { code } => Some(*code),
            _ => None,
        }
    }

    /// Decoded Modbus exception, if this is one with a known code.
    pub fn exception_code(&self) -> Option<ExceptionCode> {
        match self {
            Self::ModbusException { code } => ExceptionCode::from_byte(*code),
            _ => None,
        }
    }
}

/// Convenience type alias for driver operations.
pub type DryveResult<T> = Result<T, DryveError>;
