//! Typed SDO reads and writes over a [`RequestChannel`].

use crate::codec::{self, Value};
use crate::od::{check_access, AccessIntent, ObjectKey};
use crate::telegram::{self, Expected};
use crate::transport::RequestChannel;
use dryve_common::config::SdoConfig;
use dryve_common::error::{DryveError, DryveResult};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// SDO client for one drive.
///
/// Only [`DryveError::ModbusException`] is retried; the drive raises it for
/// transient refusals such as "busy". Everything else propagates at once.
#[derive(Clone)]
pub struct SdoClient {
    channel: Arc<dyn RequestChannel>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for SdoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdoClient")
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl SdoClient {
    /// Create a client with the default retry policy.
    pub fn new(channel: Arc<dyn RequestChannel>) -> Self {
        Self::with_config(channel, &SdoConfig::default())
    }

    /// Create a client with the retry policy from `config`.
    pub fn with_config(channel: Arc<dyn RequestChannel>, config: &SdoConfig) -> Self {
        Self {
            channel,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
        }
    }

    /// Read `key` and decode it with the object's type and scale.
    ///
    /// # Errors
    ///
    /// Returns [`DryveError::AccessViolation`] for write-only objects,
    /// [`DryveError::ReadFailed`] once every attempt ended in a device
    /// exception, or the first transport/protocol error.
    pub fn read(&self, key: ObjectKey) -> DryveResult<Value> {
        let entry = key.entry();
        check_access(key, &entry, AccessIntent::Read)?;
        let pdu = telegram::build_read_request(key)?;
        let expected = Expected::for_read(&entry);

        self.with_retry(key, AccessIntent::Read, || {
            let (transaction_id, frame) = self.channel.send_request(&pdu)?;
            let response = telegram::parse_response(&frame, transaction_id, &expected)?;
            let value = codec::unpack(response.data, entry.data_type, entry.scale)?;
            debug!(%key, %value, transaction_id, "SDO read");
            Ok(value)
        })
    }

    /// Write `value` to `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DryveError::AccessViolation`] for read-only objects, a codec
    /// error if the value does not fit, [`DryveError::WriteFailed`] once
    /// every attempt ended in a device exception, or the first
    /// transport/protocol error.
    pub fn write(&self, key: ObjectKey, value: impl Into<Value>) -> DryveResult<()> {
        let value = value.into();
        let entry = key.entry();
        check_access(key, &entry, AccessIntent::Write)?;
        let pdu = telegram::build_write_request(key, value)?;
        let expected = Expected::for_write(&entry);

        self.with_retry(key, AccessIntent::Write, || {
            let (transaction_id, frame) = self.channel.send_request(&pdu)?;
            telegram::parse_response(&frame, transaction_id, &expected)?;
            debug!(%key, %value, transaction_id, "SDO write");
            Ok(())
        })
    }

    /// Read a 16-bit object such as the Statusword.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read), plus [`DryveError::ValueOutOfRange`] if the
    /// value does not fit 16 bits.
    pub fn read_u16(&self, key: ObjectKey) -> DryveResult<u16> {
        let value = self.read(key)?;
        value
            .as_u16()
            .ok_or_else(|| DryveError::ValueOutOfRange(format!("{key} = {value} is not a u16")))
    }

    fn with_retry<T>(
        &self,
        key: ObjectKey,
        intent: AccessIntent,
        mut exchange: impl FnMut() -> DryveResult<T>,
    ) -> DryveResult<T> {
        let mut last_code = None;
        for attempt in 1..=self.max_attempts {
            match exchange() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable_exchange() => {
                    warn!(%key, attempt, error = %e, "Drive refused SDO {intent}");
                    last_code = e.exception_byte();
                    if attempt < self.max_attempts {
                        thread::sleep(self.retry_delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let key = key.to_string();
        Err(match intent {
            AccessIntent::Read => DryveError::ReadFailed { key, code: last_code },
            AccessIntent::Write => DryveError::WriteFailed { key, code: last_code },
        })
    }
}
