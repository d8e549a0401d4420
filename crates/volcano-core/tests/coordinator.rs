//! Coordinator integration tests driven by the mock transport.
//!
//! These cover the connection lifecycle, the freeze-on-disconnect rule,
//! and the blocking command semantics without requiring BLE hardware.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use volcano_core::{
    ConnectionStatus, Coordinator, CoordinatorConfig, Error, Field, MockTransport, PowerState,
    uuids,
};

/// Deadline for anything that should complete quickly.
const SOON: Duration = Duration::from_secs(5);

fn test_config(address: &str) -> CoordinatorConfig {
    CoordinatorConfig::new(address)
        .reconnect_interval(Duration::from_millis(20))
        .temp_poll_interval(Duration::from_millis(10))
        .slow_poll_interval(Duration::from_millis(500))
        .command_timeout(Duration::from_secs(2))
}

fn scripted_mock() -> Arc<MockTransport> {
    let mock = Arc::new(MockTransport::new());
    mock.set_read(uuids::CURRENT_TEMPERATURE, 1755u16.to_le_bytes().to_vec());
    mock.set_read(uuids::TARGET_TEMPERATURE, 1800u16.to_le_bytes().to_vec());
    mock.set_read(uuids::STATUS_REGISTER, vec![0x00, 0x00]);
    mock.set_read(uuids::LED_BRIGHTNESS, vec![70]);
    mock.set_read(uuids::AUTO_SHUTOFF, 5400u16.to_le_bytes().to_vec());
    mock.set_read(uuids::HOURS_OF_OPERATION, vec![0x98, 0x00, 0x07]);
    mock.set_read(uuids::FIRMWARE_VERSION, b"V03.44\0\0".to_vec());
    mock.set_read(uuids::BLE_FIRMWARE_VERSION, b"V01.12\0\0".to_vec());
    mock.set_read(uuids::SERIAL_NUMBER, b"VH123456".to_vec());
    mock
}

fn coordinator_over(mock: &Arc<MockTransport>) -> Coordinator {
    Coordinator::with_transport(test_config(mock.address()), mock.clone()).expect("valid config")
}

async fn wait_for_status(coordinator: &Coordinator, status: ConnectionStatus) {
    timeout(SOON, async {
        loop {
            if coordinator.state().connection_status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached status {status}"));
}

#[tokio::test]
async fn reconnect_loop_status_sequence() {
    let mock = scripted_mock();
    mock.fail_next_connects(3);
    let coordinator = coordinator_over(&mock);

    let mut rx = coordinator.subscribe();
    assert_eq!(
        coordinator.state().connection_status,
        ConnectionStatus::Disconnected
    );

    coordinator.connect();

    // Collect the observed status transitions until the link comes up.
    let mut transitions = Vec::new();
    timeout(SOON, async {
        loop {
            let change = rx.recv().await.expect("subscription live");
            if change.changed.contains(&Field::ConnectionStatus) {
                transitions.push(change.state.connection_status);
                if change.state.connection_status == ConnectionStatus::Connected {
                    break;
                }
            }
        }
    })
    .await
    .expect("connection never succeeded");

    use ConnectionStatus::*;
    assert_eq!(
        transitions,
        vec![
            Connecting,
            Disconnected,
            Connecting,
            Disconnected,
            Connecting,
            Disconnected,
            Connecting,
            Connected
        ]
    );
    assert_eq!(mock.connect_count(), 4);

    coordinator.stop().await;
}

#[tokio::test]
async fn error_status_after_repeated_failures_still_retries() {
    let mock = scripted_mock();
    mock.fail_next_connects(3);
    let coordinator = Coordinator::with_transport(
        test_config(mock.address()).max_connect_failures(2),
        mock.clone(),
    )
    .unwrap();

    coordinator.connect();

    // The second consecutive failure turns the visible status to ERROR...
    wait_for_status(&coordinator, ConnectionStatus::Error).await;
    // ...but the retry timer keeps firing and eventually connects.
    wait_for_status(&coordinator, ConnectionStatus::Connected).await;

    coordinator.stop().await;
}

#[tokio::test]
async fn link_loss_freezes_fields_and_reconnects() {
    let mock = scripted_mock();
    let coordinator = coordinator_over(&mock);
    coordinator.connect_wait().await.unwrap();
    assert_eq!(coordinator.state().current_temperature, Some(175.5));

    // Take the device away entirely: the link drops and reconnect
    // attempts keep failing until it comes back.
    mock.fail_next_connects(u32::MAX);
    mock.drop_link();
    wait_for_status(&coordinator, ConnectionStatus::Disconnected).await;

    // Everything except the link status is frozen at its last value.
    let state = coordinator.state();
    assert_eq!(state.current_temperature, Some(175.5));
    assert_eq!(state.led_brightness, Some(70));
    assert_eq!(state.serial_number.as_deref(), Some("VH123456"));

    // The loop reconnects on its own once the device is reachable again.
    mock.fail_next_connects(0);
    wait_for_status(&coordinator, ConnectionStatus::Connected).await;

    coordinator.stop().await;
}

#[tokio::test]
async fn set_temperature_while_disconnected_fails_without_write() {
    let mock = scripted_mock();
    let coordinator = coordinator_over(&mock);

    let result = coordinator.set_temperature(180.0).await;
    assert!(matches!(result, Err(Error::NotConnected)));
    assert!(mock.writes().is_empty());

    coordinator.stop().await;
}

#[tokio::test]
async fn set_temperature_wait_resolves_when_target_reached() {
    let mock = scripted_mock();
    let coordinator = coordinator_over(&mock);
    coordinator.connect_wait().await.unwrap();

    let wait = tokio::spawn({
        let mock = mock.clone();
        async move {
            // Simulate the chamber ramping up while the caller waits.
            tokio::time::sleep(Duration::from_millis(50)).await;
            mock.set_read(uuids::CURRENT_TEMPERATURE, 1800u16.to_le_bytes().to_vec());
        }
    });

    coordinator
        .set_temperature_wait_with_timeout(180.0, Duration::from_secs(5))
        .await
        .expect("target reached");
    wait.await.unwrap();

    // The setpoint write went out before the wait resolved.
    assert_eq!(
        mock.writes_to(uuids::TARGET_TEMPERATURE),
        vec![1800u16.to_le_bytes().to_vec()]
    );

    coordinator.stop().await;
}

#[tokio::test]
async fn set_temperature_wait_times_out() {
    let mock = scripted_mock();
    let coordinator = coordinator_over(&mock);
    coordinator.connect_wait().await.unwrap();

    let result = coordinator
        .set_temperature_wait_with_timeout(200.0, Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(Error::Timeout { .. })));

    // The write itself still happened; only the wait expired.
    assert_eq!(
        mock.writes_to(uuids::TARGET_TEMPERATURE),
        vec![2000u16.to_le_bytes().to_vec()]
    );

    coordinator.stop().await;
}

#[tokio::test]
async fn disconnect_cancels_pending_wait() {
    let mock = scripted_mock();
    let coordinator = Arc::new(coordinator_over(&mock));
    coordinator.connect_wait().await.unwrap();

    let waiting = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .set_temperature_wait_with_timeout(200.0, Duration::from_secs(30))
                .await
        }
    });

    // Give the waiter time to register, then tear the link down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    coordinator.disconnect();

    let result = timeout(SOON, waiting).await.expect("wait resolved").unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));

    coordinator.stop().await;
}

#[tokio::test]
async fn conflicting_setpoint_wait_supersedes_previous() {
    let mock = scripted_mock();
    let coordinator = Arc::new(coordinator_over(&mock));
    coordinator.connect_wait().await.unwrap();

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .set_temperature_wait_with_timeout(200.0, Duration::from_secs(30))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A newer conflicting setpoint cancels the first caller's wait.
    let second = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .set_temperature_wait_with_timeout(180.0, Duration::from_secs(5))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    mock.set_read(uuids::CURRENT_TEMPERATURE, 1800u16.to_le_bytes().to_vec());

    let first = timeout(SOON, first).await.expect("first resolved").unwrap();
    assert!(matches!(first, Err(Error::Cancelled)));

    let second = timeout(SOON, second).await.expect("second resolved").unwrap();
    assert!(second.is_ok());

    coordinator.stop().await;
}

#[tokio::test]
async fn connect_wait_timeout_leaves_retry_running() {
    let mock = scripted_mock();
    mock.fail_next_connects(u32::MAX);
    let coordinator = coordinator_over(&mock);

    let result = coordinator
        .connect_wait_with_timeout(Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(Error::Timeout { .. })));

    // The background loop keeps attempting after the caller gave up.
    let attempts = mock.connect_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(mock.connect_count() > attempts);

    coordinator.stop().await;
}

#[tokio::test]
async fn unrecognized_status_pattern_does_not_break_ingestion() {
    let mock = scripted_mock();
    let coordinator = coordinator_over(&mock);
    coordinator.connect_wait().await.unwrap();

    let mut rx = coordinator.subscribe();

    // Heat bits match no table entry; pump bits are a valid "on".
    mock.push_notification(uuids::STATUS_REGISTER, vec![0x10, 0x20]);
    timeout(SOON, async {
        loop {
            let change = rx.recv().await.unwrap();
            if change.changed.contains(&Field::Heat) || change.changed.contains(&Field::Pump) {
                break;
            }
        }
    })
    .await
    .expect("frame ingested");

    let state = coordinator.state();
    assert_eq!(state.heat, PowerState::Unknown);
    assert_eq!(state.pump, PowerState::On);

    // Subsequent well-formed frames keep flowing.
    mock.push_notification(uuids::STATUS_REGISTER, vec![0x20, 0x00]);
    timeout(SOON, async {
        loop {
            if coordinator.state().heat == PowerState::On {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pipeline still live");

    coordinator.stop().await;
}

#[tokio::test]
async fn disconnect_cancels_in_flight_connect_wait() {
    let mock = scripted_mock();
    mock.fail_next_connects(u32::MAX);
    let coordinator = Arc::new(coordinator_over(&mock));

    let waiting = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .connect_wait_with_timeout(Duration::from_secs(30))
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    coordinator.disconnect();

    let result = timeout(SOON, waiting).await.expect("wait resolved").unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));

    coordinator.stop().await;
}

#[tokio::test]
async fn snapshot_is_seeded_before_connected_is_observed() {
    let mock = scripted_mock();
    let coordinator = coordinator_over(&mock);
    let mut rx = coordinator.subscribe();

    coordinator.connect();

    // The change that announces Connected must already carry the values
    // from the initial full read.
    timeout(SOON, async {
        loop {
            let change = rx.recv().await.unwrap();
            if change.state.connection_status == ConnectionStatus::Connected {
                assert_eq!(change.state.current_temperature, Some(175.5));
                assert_eq!(change.state.serial_number.as_deref(), Some("VH123456"));
                assert_eq!(change.state.led_brightness, Some(70));
                return;
            }
        }
    })
    .await
    .expect("never connected");

    coordinator.stop().await;
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let mock = scripted_mock();
    let coordinator = coordinator_over(&mock);
    coordinator.connect_wait().await.unwrap();

    coordinator.disconnect();
    wait_for_status(&coordinator, ConnectionStatus::Disconnected).await;
    coordinator.disconnect();
    assert_eq!(
        coordinator.state().connection_status,
        ConnectionStatus::Disconnected
    );

    // No reconnect happens after an explicit disconnect.
    let attempts = mock.connect_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(mock.connect_count(), attempts);

    coordinator.stop().await;
}
