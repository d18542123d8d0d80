//! Protocol stack for the igus dryve D1 motor controller.
//!
//! This crate provides:
//! - [`codec`] for little-endian value packing with scale factors
//! - [`od`] with the drive's object dictionary
//! - [`telegram`] building and validating Modbus TCP SDO telegrams
//! - [`transport`] with a reconnecting, heartbeat-carrying TCP link
//! - [`sdo`] with typed, retrying object reads and writes
//! - [`cia402`] with the drive state machine
//! - [`status`] with a status snapshot
//!
//! [`Drive`] wires all of them together from a [`DriveConfig`].

pub mod cia402;
pub mod codec;
pub mod od;
pub mod sdo;
pub mod status;
pub mod telegram;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cia402::{controlword, DriveState, DriveStateMachine, OperationMode, Statusword};
pub use codec::{DataType, Value};
pub use od::{AccessType, ObjectEntry, ObjectKey};
pub use sdo::SdoClient;
pub use status::DriveStatus;
pub use transport::{ConnectionState, RequestChannel, Transport};

use dryve_common::config::DriveConfig;
use dryve_common::error::DryveResult;
use std::sync::Arc;

/// A connected drive: transport, SDO client and state machine.
#[derive(Debug, Clone)]
pub struct Drive {
    transport: Arc<Transport>,
    state_machine: DriveStateMachine,
}

impl Drive {
    /// Connect to the drive described by `config`.
    ///
    /// Starts the heartbeat when `transport.heartbeat_interval` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the first
    /// connection attempt fails.
    pub fn connect(config: &DriveConfig) -> DryveResult<Self> {
        config
            .validate()
            .map_err(|e| dryve_common::DryveError::Config(e.to_string()))?;

        let transport = Transport::open(config.transport.clone())?;
        let sdo = SdoClient::with_config(transport.clone(), &config.sdo);
        let state_machine = DriveStateMachine::with_config(sdo, &config.state_machine);
        Ok(Self {
            transport,
            state_machine,
        })
    }

    /// The TCP transport.
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// The SDO client.
    pub fn sdo(&self) -> &SdoClient {
        self.state_machine.sdo()
    }

    /// The CiA-402 state machine.
    pub fn state_machine(&self) -> &DriveStateMachine {
        &self.state_machine
    }

    /// Read a status snapshot.
    ///
    /// # Errors
    ///
    /// Propagates the first failed SDO read.
    pub fn status(&self) -> DryveResult<DriveStatus> {
        DriveStatus::capture(self.sdo())
    }

    /// Stop the heartbeat and close the connection.
    pub fn close(&self) {
        self.transport.close();
    }
}
