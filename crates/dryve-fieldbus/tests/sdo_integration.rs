//! SDO client integration tests against `MockDryveServer`.


use dryve_common::config::{SdoConfig, TransportConfig};
use dryve_common::error::DryveError;
use dryve_fieldbus::od::{ObjectKey, STORE_PARAMETERS_MAGIC};
use dryve_fieldbus::{DriveStatus, SdoClient, Transport, Value};
use mock_dryve_server::{MockBehavior, MockDryveServer};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Test Helpers
// ============================================================================

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

fn config_for_server(server: &MockDryveServer) -> TransportConfig {
    TransportConfig {
        address: server.local_addr().to_string(),
        io_timeout: Duration::from_millis(300),
        reconnect_delay: Duration::from_millis(20),
        heartbeat_interval: None,
        ..TransportConfig::default()
    }
}

fn client_for(server: &MockDryveServer) -> SdoClient {
    init_test_logging();
    let transport = Arc::new(Transport::new(config_for_server(server)).expect("valid config"));
    let sdo = SdoConfig {
        max_attempts: 3,
        retry_delay: Duration::from_millis(5),
    };
    SdoClient::with_config(transport, &sdo)
}

// ============================================================================
// Read / Write Tests
// ============================================================================

#[test]
fn test_write_profile_velocity_bytes_on_device() -> anyhow::Result<()> {
    let server = MockDryveServer::start(MockBehavior::Normal)?;
    let sdo = client_for(&server);

    sdo.write(ObjectKey::ProfileVelocity, 2000u32)?;

    assert_eq!(server.object(0x6081, 0), Some(vec![0xD0, 0x07, 0x00, 0x00]));
    let log = server.wire_log();
    assert_eq!(log.len(), 1);
    assert!(log[0].write);
    Ok(())
}

#[test]
fn test_signed_target_position_roundtrip() -> anyhow::Result<()> {
    let server = MockDryveServer::start(MockBehavior::Normal)?;
    let sdo = client_for(&server);

    sdo.write(ObjectKey::TargetPosition, -12_000i32)?;
    assert_eq!(server.object(0x607A, 0), Some((-12_000i32).to_le_bytes().to_vec()));
    assert_eq!(sdo.read(ObjectKey::TargetPosition)?, Value::Int(-12_000));
    Ok(())
}

#[test]
fn test_scaled_homing_speed() -> anyhow::Result<()> {
    let server = MockDryveServer::start(MockBehavior::Normal)?;
    let sdo = client_for(&server);

    sdo.write(ObjectKey::HomingSpeedSearchSwitch, 12.5)?;
    assert_eq!(server.object(0x6099, 1), Some(1250u32.to_le_bytes().to_vec()));
    assert_eq!(sdo.read(ObjectKey::HomingSpeedSearchSwitch)?, Value::Float(12.5));
    Ok(())
}

#[test]
fn test_unwritten_object_reads_zero() -> anyhow::Result<()> {
    let server = MockDryveServer::start(MockBehavior::Normal)?;
    let sdo = client_for(&server);

    assert_eq!(sdo.read(ObjectKey::DigitalInputs)?, Value::Int(0));
    assert_eq!(sdo.read(ObjectKey::ModeOfOperationDisplay)?, Value::Int(0));
    Ok(())
}

#[test]
fn test_store_parameters_magic() -> anyhow::Result<()> {
    let server = MockDryveServer::start(MockBehavior::Normal)?;
    let sdo = client_for(&server);

    sdo.write(ObjectKey::StoreParameters, STORE_PARAMETERS_MAGIC)?;
    assert_eq!(server.object(0x1010, 1), Some(b"save".to_vec()));
    Ok(())
}

// ============================================================================
// Access Tests
// ============================================================================

#[test]
fn test_write_read_only_object_never_sent() {
    let server = MockDryveServer::start(MockBehavior::Normal).unwrap();
    let sdo = client_for(&server);

    let err = sdo.write(ObjectKey::Statusword, 0x0006u16).unwrap_err();
    assert!(matches!(err, DryveError::AccessViolation(_)), "unexpected error: {err}");
    assert!(server.wire_log().is_empty());
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_out_of_range_value_never_sent() {
    let server = MockDryveServer::start(MockBehavior::Normal).unwrap();
    let sdo = client_for(&server);

    let err = sdo.write(ObjectKey::ModeOfOperation, 300).unwrap_err();
    assert!(matches!(err, DryveError::ValueOutOfRange(_)), "unexpected error: {err}");
    assert!(server.wire_log().is_empty());
}

// ============================================================================
// Retry Tests
// ============================================================================

#[test]
fn test_transient_exception_recovers() -> anyhow::Result<()> {
    let server = MockDryveServer::start(MockBehavior::ExceptionTimes(2, 0x06))?;
    server.set_object(0x6064, 0, &777i32.to_le_bytes());
    let sdo = client_for(&server);

    assert_eq!(sdo.read(ObjectKey::ActualPosition)?, Value::Int(777));
    assert_eq!(server.wire_log().len(), 3);
    assert_eq!(server.connection_count(), 1, "exceptions must not reconnect");
    Ok(())
}

#[test]
fn test_persistent_exception_fails_after_three_attempts() {
    let server = MockDryveServer::start(MockBehavior::Exception(0x02)).unwrap();
    let sdo = client_for(&server);

    let err = sdo.read(ObjectKey::ActualPosition).unwrap_err();
    assert_eq!(
        err,
        DryveError::ReadFailed {
            key: "actual_position".into(),
            code: Some(0x02)
        }
    );
    assert_eq!(server.wire_log().len(), 3);
}

#[test]
fn test_persistent_exception_on_write() {
    let server = MockDryveServer::start(MockBehavior::Exception(0x04)).unwrap();
    let sdo = client_for(&server);

    let err = sdo.write(ObjectKey::TargetVelocity, 100).unwrap_err();
    assert_eq!(
        err,
        DryveError::WriteFailed {
            key: "target_velocity".into(),
            code: Some(0x04)
        }
    );
    assert_eq!(server.object(0x60FF, 0), None, "refused write must not land");
}

#[test]
fn test_wrong_transaction_id_not_retried_by_sdo() {
    let server = MockDryveServer::start(MockBehavior::WrongTransactionId).unwrap();
    let sdo = client_for(&server);

    let err = sdo.read(ObjectKey::Statusword).unwrap_err();
    assert!(matches!(err, DryveError::TransactionMismatch { .. }));
    assert_eq!(server.wire_log().len(), 1);
}

// ============================================================================
// Status Snapshot Tests
// ============================================================================

#[test]
fn test_status_snapshot() -> anyhow::Result<()> {
    let server = MockDryveServer::start(MockBehavior::Normal)?;
    server.set_object(0x6064, 0, &2500i32.to_le_bytes());
    server.set_object(0x606C, 0, &(-1050i32).to_le_bytes());
    server.set_object(0x2014, 0, &1u16.to_le_bytes());
    server.set_statusword(0x0027);
    let sdo = client_for(&server);

    let status = DriveStatus::capture(&sdo)?;
    assert!((status.position - 2500.0).abs() < f64::EPSILON);
    assert!((status.velocity + 10.5).abs() < 1e-9);
    assert_eq!(status.statusword, 0x0027);
    assert!(!status.fault);
    assert!(status.homed);

    let json = serde_json::to_value(&status)?;
    assert_eq!(json["statusword"], 0x0027);
    Ok(())
}
