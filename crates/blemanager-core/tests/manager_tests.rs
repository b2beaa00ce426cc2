//! End-to-end tests for the central manager actor
//!
//! Each test drives a [`MockTransport`] by hand and observes the resulting
//! stack calls and manager events. Timer scenarios run with paused time.

use std::time::Duration;

use blemanager_core::*;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use test_utils::{
    connect_ready, discover, drain, next_non_scan_call, read_write_characteristics, settle,
    wait_for, write_only_characteristics, MockTransport, TransportCall, OTHER_SERVICE, RX,
    SERVICE, TX,
};

async fn start_with(config: ManagerConfig) -> (CentralManager, ManagerEventReceiver, test_utils::MockController) {
    let (transport, mock) = MockTransport::new();
    let (manager, events) = CentralManager::start(transport, MemoryStore::new(), config)
        .await
        .unwrap();
    (manager, events, mock)
}

// ----------------------------------------------------------------------------
// Scanning
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_service_filter_hides_unmatched_devices() {
    let config = ManagerConfig::new().with_filter(ScanFilter::new().with_service(SERVICE));
    let (manager, mut events, mut mock) = start_with(config).await;

    manager.scan(None).await.unwrap();
    assert_eq!(mock.next_call().await, TransportCall::StartScan(vec![SERVICE]));

    mock.advertise(Advertisement::new("other").with_service(OTHER_SERVICE));
    mock.advertise(Advertisement::new("match").with_service(SERVICE));

    let mut seen = Vec::new();
    loop {
        let event = test_utils::next_event(&mut events).await;
        let done = matches!(&event, ManagerEvent::PeripheralDiscovered { id, .. } if id.as_str() == "match");
        seen.push(event);
        if done {
            break;
        }
    }
    assert!(!seen.iter().any(|e| matches!(
        e,
        ManagerEvent::PeripheralDiscovered { id, .. } if id.as_str() == "other"
    )));

    let listed = manager.peripherals().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id.as_str(), "match");
}

#[tokio::test(start_paused = true)]
async fn test_scan_stops_at_timeout() {
    let (manager, mut events, mut mock) = start_with(ManagerConfig::new()).await;

    let started = Instant::now();
    manager.scan(Some(Duration::from_secs(5))).await.unwrap();
    assert!(matches!(mock.next_call().await, TransportCall::StartScan(_)));
    assert!(manager.is_scanning().await.unwrap());

    wait_for(&mut events, |e| matches!(e, ManagerEvent::ScanEnded)).await;
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(mock.next_call().await, TransportCall::StopScan);
    assert!(!manager.is_scanning().await.unwrap());
}

#[tokio::test]
async fn test_stop_scan_ends_session_early() {
    let (manager, mut events, mut mock) = start_with(ManagerConfig::new()).await;

    manager.scan(None).await.unwrap();
    manager.stop_scan().await.unwrap();
    wait_for(&mut events, |e| matches!(e, ManagerEvent::ScanEnded)).await;
    assert!(matches!(mock.next_call().await, TransportCall::StartScan(_)));
    assert_eq!(mock.next_call().await, TransportCall::StopScan);
}

#[tokio::test]
async fn test_scan_with_radio_off_reports_power_off() {
    let (transport, mut mock) = MockTransport::new();
    mock.set_adapter_state(AdapterState::PoweredOff);
    let (manager, mut events) = CentralManager::start(transport, MemoryStore::new(), ManagerConfig::new())
        .await
        .unwrap();

    // Reported once at startup, then again for the refused scan
    assert_eq!(test_utils::next_event(&mut events).await, ManagerEvent::PowerOff);
    manager.scan(None).await.unwrap();
    assert_eq!(test_utils::next_event(&mut events).await, ManagerEvent::PowerOff);
    assert!(!manager.is_scanning().await.unwrap());
    assert!(mock.try_next_call().is_none());
}

#[tokio::test]
async fn test_scan_without_radio_reports_unsupported() {
    let (transport, mut mock) = MockTransport::new();
    mock.set_adapter_state(AdapterState::Unsupported);
    let (manager, mut events) = CentralManager::start(transport, MemoryStore::new(), ManagerConfig::new())
        .await
        .unwrap();

    assert_eq!(test_utils::next_event(&mut events).await, ManagerEvent::Unsupported);
    manager.scan(None).await.unwrap();
    assert_eq!(test_utils::next_event(&mut events).await, ManagerEvent::Unsupported);
    assert!(mock.try_next_call().is_none());
}

// ----------------------------------------------------------------------------
// Connection Lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_reaches_ready_and_pairs() {
    let (manager, mut events, mut mock) = start_with(ManagerConfig::new()).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;

    connect_ready(&manager, &mut mock, &mut events, &id, read_write_characteristics()).await;
    wait_for(&mut events, |e| {
        matches!(e, ManagerEvent::AvailabilityChanged { available: true, .. })
    })
    .await;

    let snapshot = manager.peripheral(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, ConnectionState::Ready);
    assert!(snapshot.paired);
    assert_eq!(snapshot.default_read.map(|c| c.uuid), Some(RX));
    assert_eq!(snapshot.default_write.map(|c| c.uuid), Some(TX));
    assert_eq!(manager.paired_peripherals().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_write_only_device_rejected_under_read_and_write_policy() {
    let config = ManagerConfig::new()
        .with_filter(ScanFilter::new().with_need_channel(NeedChannel::ReadAndWrite));
    let (manager, mut events, mut mock) = start_with(config).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;

    manager.connect(&id).await.unwrap();
    assert_eq!(next_non_scan_call(&mut mock).await, TransportCall::Connect(id.clone()));
    mock.emit(StackEvent::LinkEstablished { id: id.clone() });
    assert_eq!(
        next_non_scan_call(&mut mock).await,
        TransportCall::DiscoverCharacteristics(id.clone())
    );
    mock.emit(StackEvent::CharacteristicsDiscovered {
        id: id.clone(),
        characteristics: write_only_characteristics(),
    });

    let result = wait_for(&mut events, |e| matches!(e, ManagerEvent::ConnectResult { .. })).await;
    assert!(matches!(
        result,
        ManagerEvent::ConnectResult {
            result: Err(BleError::ServiceUnavailable { .. }),
            ..
        }
    ));
    assert_eq!(next_non_scan_call(&mut mock).await, TransportCall::Disconnect(id.clone()));

    // Policy failures are not retried
    tokio::time::sleep(Duration::from_secs(30)).await;
    let snapshot = manager.peripheral(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert!(!snapshot.paired);
    assert!(!drain(&mut events).iter().any(|e| matches!(
        e,
        ManagerEvent::StateChanged {
            to: ConnectionState::Ready,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_reconnects_after_interval() {
    let config = ManagerConfig::new().with_reconnect_interval(Duration::from_secs(2));
    let (manager, mut events, mut mock) = start_with(config).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;
    connect_ready(&manager, &mut mock, &mut events, &id, read_write_characteristics()).await;

    mock.emit(StackEvent::LinkLost {
        id: id.clone(),
        reason: Some("supervision timeout".into()),
    });
    wait_for(&mut events, |e| {
        matches!(e, ManagerEvent::StateChanged { from: ConnectionState::Ready, to: ConnectionState::Disconnected, .. })
    })
    .await;
    wait_for(&mut events, |e| {
        matches!(e, ManagerEvent::StateChanged { to: ConnectionState::ReconnectWaiting, .. })
    })
    .await;
    let lost_at = Instant::now();

    wait_for(&mut events, |e| {
        matches!(e, ManagerEvent::StateChanged { from: ConnectionState::ReconnectWaiting, to: ConnectionState::Connecting, .. })
    })
    .await;
    let waited = lost_at.elapsed();
    assert!(waited >= Duration::from_secs(2), "reconnected after {:?}", waited);
    assert!(waited < Duration::from_millis(2100), "reconnected after {:?}", waited);
    assert_eq!(next_non_scan_call(&mut mock).await, TransportCall::Connect(id.clone()));

    mock.emit(StackEvent::LinkEstablished { id: id.clone() });
    assert_eq!(
        next_non_scan_call(&mut mock).await,
        TransportCall::DiscoverCharacteristics(id.clone())
    );
    mock.emit(StackEvent::CharacteristicsDiscovered {
        id: id.clone(),
        characteristics: read_write_characteristics(),
    });
    let result = wait_for(&mut events, |e| matches!(e, ManagerEvent::ConnectResult { .. })).await;
    assert_eq!(
        result,
        ManagerEvent::ConnectResult {
            id,
            origin: ConnectOrigin::AutoReconnect,
            result: Ok(()),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_unconnect_suppresses_reconnect() {
    let (manager, mut events, mut mock) = start_with(ManagerConfig::new()).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;
    connect_ready(&manager, &mut mock, &mut events, &id, read_write_characteristics()).await;

    manager.unconnect(&id).await.unwrap();
    assert_eq!(next_non_scan_call(&mut mock).await, TransportCall::Disconnect(id.clone()));
    mock.emit(StackEvent::LinkLost {
        id: id.clone(),
        reason: None,
    });
    let result = wait_for(&mut events, |e| matches!(e, ManagerEvent::UnconnectResult { .. })).await;
    assert_eq!(
        result,
        ManagerEvent::UnconnectResult {
            id: id.clone(),
            result: Ok(()),
        }
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    let snapshot = manager.peripheral(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert!(snapshot.default_write.is_none());
    while let Some(call) = mock.try_next_call() {
        assert!(!matches!(call, TransportCall::Connect(_)), "unexpected {:?}", call);
    }
}

#[tokio::test]
async fn test_duplicate_link_lost_during_connect_reports_once() {
    let config = ManagerConfig::new().with_auto_reconnect(false);
    let (manager, mut events, mut mock) = start_with(config).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;
    connect_ready(&manager, &mut mock, &mut events, &id, read_write_characteristics()).await;

    manager.unconnect(&id).await.unwrap();
    assert_eq!(next_non_scan_call(&mut mock).await, TransportCall::Disconnect(id.clone()));
    mock.emit(StackEvent::LinkLost {
        id: id.clone(),
        reason: None,
    });
    wait_for(&mut events, |e| matches!(e, ManagerEvent::UnconnectResult { .. })).await;

    // The adapter's own report of the same disconnect lands after the new connect
    manager.connect(&id).await.unwrap();
    assert_eq!(next_non_scan_call(&mut mock).await, TransportCall::Connect(id.clone()));
    mock.emit(StackEvent::LinkLost {
        id: id.clone(),
        reason: None,
    });
    let result = wait_for(&mut events, |e| matches!(e, ManagerEvent::ConnectResult { .. })).await;
    assert!(matches!(
        result,
        ManagerEvent::ConnectResult {
            origin: ConnectOrigin::Caller,
            result: Err(BleError::ConnectFailed { .. }),
            ..
        }
    ));

    // The link the stack still brings up is torn down, not adopted
    mock.emit(StackEvent::LinkEstablished { id: id.clone() });
    assert_eq!(next_non_scan_call(&mut mock).await, TransportCall::Disconnect(id.clone()));
    mock.emit(StackEvent::LinkLost {
        id: id.clone(),
        reason: None,
    });
    settle().await;

    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, ManagerEvent::ConnectResult { .. })));
    let snapshot = manager.peripheral(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    while let Some(call) = mock.try_next_call() {
        assert!(
            !matches!(call, TransportCall::DiscoverCharacteristics(_)),
            "unexpected {:?}",
            call
        );
    }
}

#[tokio::test]
async fn test_connect_issue_failure_reports_connect_failed() {
    let config = ManagerConfig::new().with_auto_reconnect(false);
    let (manager, mut events, mut mock) = start_with(config).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;

    mock.set_fail_connect(true);
    manager.connect(&id).await.unwrap();
    let result = wait_for(&mut events, |e| matches!(e, ManagerEvent::ConnectResult { .. })).await;
    assert!(matches!(
        result,
        ManagerEvent::ConnectResult {
            origin: ConnectOrigin::Caller,
            result: Err(BleError::ConnectFailed { .. }),
            ..
        }
    ));
    let snapshot = manager.peripheral(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_on_ready_device_is_noop() {
    let (manager, mut events, mut mock) = start_with(ManagerConfig::new()).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;
    connect_ready(&manager, &mut mock, &mut events, &id, read_write_characteristics()).await;

    manager.connect(&id).await.unwrap();
    manager.connect(&DeviceId::from("never-seen")).await.unwrap();
    assert_ok!(manager.is_scanning().await);
    settle().await;

    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, ManagerEvent::ConnectResult { .. })));
    while let Some(call) = mock.try_next_call() {
        assert!(!matches!(call, TransportCall::Connect(_)), "unexpected {:?}", call);
    }
}

// ----------------------------------------------------------------------------
// Removal
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_removal_during_connecting_waits_for_resolution() {
    let (manager, mut events, mut mock) = start_with(ManagerConfig::new()).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;

    manager.connect(&id).await.unwrap();
    assert_eq!(next_non_scan_call(&mut mock).await, TransportCall::Connect(id.clone()));

    manager.remove_connected_peripheral(&id).await.unwrap();
    assert_eq!(next_non_scan_call(&mut mock).await, TransportCall::Disconnect(id.clone()));
    assert!(manager.peripheral(&id).await.unwrap().unwrap().will_be_removed);
    assert!(!drain(&mut events).iter().any(|e| matches!(
        e,
        ManagerEvent::RemovalResult { .. } | ManagerEvent::UnconnectResult { .. }
    )));

    mock.emit(StackEvent::LinkFailed {
        id: id.clone(),
        reason: "cancelled by host".into(),
    });
    let result = wait_for(&mut events, |e| matches!(e, ManagerEvent::ConnectResult { .. })).await;
    assert_eq!(
        result,
        ManagerEvent::ConnectResult {
            id: id.clone(),
            origin: ConnectOrigin::Caller,
            result: Err(BleError::Cancelled),
        }
    );
    let removal = wait_for(&mut events, |e| matches!(e, ManagerEvent::RemovalResult { .. })).await;
    assert_eq!(
        removal,
        ManagerEvent::RemovalResult {
            id: id.clone(),
            result: Ok(()),
        }
    );
    assert!(manager.peripheral(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_removal_is_idempotent() {
    let (transport, mut mock) = MockTransport::new();
    let store = MemoryStore::new();
    let (manager, mut events) = CentralManager::start(transport, store.clone(), ManagerConfig::new())
        .await
        .unwrap();
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;
    connect_ready(&manager, &mut mock, &mut events, &id, read_write_characteristics()).await;
    manager.save_paired_peripherals().await.unwrap();
    assert!(store.ids().contains(&id));

    manager.remove_connected_peripheral(&id).await.unwrap();
    assert_eq!(next_non_scan_call(&mut mock).await, TransportCall::Disconnect(id.clone()));
    mock.emit(StackEvent::LinkLost {
        id: id.clone(),
        reason: None,
    });
    wait_for(&mut events, |e| matches!(e, ManagerEvent::RemovalResult { result: Ok(()), .. })).await;
    assert!(store.ids().is_empty());

    manager.remove_connected_peripheral(&id).await.unwrap();
    manager.remove_all_connected_peripherals().await.unwrap();
    assert!(manager.paired_peripherals().await.unwrap().is_empty());
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, ManagerEvent::RemovalResult { .. })));
}

#[tokio::test]
async fn test_removal_reports_storage_failure() {
    let (transport, _mock) = MockTransport::new();
    let store = MemoryStore::with_ids([DeviceId::from("stored")]);
    let (manager, mut events) = CentralManager::start(transport, store.clone(), ManagerConfig::new())
        .await
        .unwrap();

    store.set_fail_saves(true);
    manager.remove_all_connected_peripherals().await.unwrap();
    let removal = wait_for(&mut events, |e| matches!(e, ManagerEvent::RemovalResult { .. })).await;
    assert!(matches!(
        removal,
        ManagerEvent::RemovalResult {
            result: Err(BleError::StorageFailure { .. }),
            ..
        }
    ));

    // In-memory state is not rolled back
    assert!(manager.paired_peripherals().await.unwrap().is_empty());
    assert!(store.ids().contains(&DeviceId::from("stored")));
}

// ----------------------------------------------------------------------------
// Data Transfer
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_read_without_read_characteristic_makes_no_stack_call() {
    let config = ManagerConfig::new()
        .with_filter(ScanFilter::new().with_need_channel(NeedChannel::WriteOnly));
    let (manager, mut events, mut mock) = start_with(config).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;
    connect_ready(&manager, &mut mock, &mut events, &id, write_only_characteristics()).await;

    manager.read_data(&id).await.unwrap();
    manager.send_data_with_response(&id, vec![0x01, 0x02]).await.unwrap();

    // Commands are processed in order, so the write is the next call
    match next_non_scan_call(&mut mock).await {
        TransportCall::Write {
            data,
            with_response,
            ..
        } => {
            assert_eq!(data, vec![0x01, 0x02]);
            assert!(with_response);
        }
        other => panic!("Expected write, got {:?}", other),
    }
}

#[tokio::test]
async fn test_read_and_write_round_trip() {
    let (manager, mut events, mut mock) = start_with(ManagerConfig::new()).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;
    connect_ready(&manager, &mut mock, &mut events, &id, read_write_characteristics()).await;

    manager.read_data(&id).await.unwrap();
    match next_non_scan_call(&mut mock).await {
        TransportCall::Read(device, characteristic) => {
            assert_eq!(device, id);
            assert_eq!(characteristic.uuid, RX);
        }
        other => panic!("Expected read, got {:?}", other),
    }
    mock.emit(StackEvent::ReadCompleted {
        id: id.clone(),
        result: Ok(b"hello".to_vec()),
    });
    let data = wait_for(&mut events, |e| matches!(e, ManagerEvent::DataReceived { .. })).await;
    assert_eq!(
        data,
        ManagerEvent::DataReceived {
            id: id.clone(),
            data: b"hello".to_vec(),
        }
    );

    manager.send_data_without_response(&id, b"ping".to_vec()).await.unwrap();
    assert!(matches!(
        next_non_scan_call(&mut mock).await,
        TransportCall::Write { with_response: false, .. }
    ));

    manager.send_data_with_response(&id, b"pong".to_vec()).await.unwrap();
    assert!(matches!(
        next_non_scan_call(&mut mock).await,
        TransportCall::Write { with_response: true, .. }
    ));
    mock.emit(StackEvent::WriteCompleted {
        id: id.clone(),
        error: None,
    });
    let ack = wait_for(&mut events, |e| matches!(e, ManagerEvent::WriteCompleted { .. })).await;
    assert_eq!(ack, ManagerEvent::WriteCompleted { id, result: Ok(()) });
}

#[tokio::test]
async fn test_notifications_forwarded_as_data() {
    let (manager, mut events, mut mock) = start_with(ManagerConfig::new()).await;
    let id = discover(&manager, &mut mock, &mut events, "dev-1").await;
    let characteristics = vec![
        DiscoveredCharacteristic::new(SERVICE, RX, CharProperties::notify()),
        DiscoveredCharacteristic::new(SERVICE, TX, CharProperties::write()),
    ];
    connect_ready(&manager, &mut mock, &mut events, &id, characteristics).await;

    match next_non_scan_call(&mut mock).await {
        TransportCall::Subscribe(device, characteristic) => {
            assert_eq!(device, id);
            assert_eq!(characteristic.uuid, RX);
        }
        other => panic!("Expected subscribe, got {:?}", other),
    }

    mock.emit(StackEvent::ValueNotified {
        id: id.clone(),
        characteristic: RX,
        value: vec![0x2a],
    });
    let data = wait_for(&mut events, |e| matches!(e, ManagerEvent::DataReceived { .. })).await;
    assert_eq!(data, ManagerEvent::DataReceived { id, data: vec![0x2a] });
}

// ----------------------------------------------------------------------------
// Paired Registry
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_saved_paired_set_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paired.json");

    let (transport, mut mock) = MockTransport::new();
    let (manager, mut events) =
        CentralManager::start(transport, JsonFileStore::new(&path), ManagerConfig::new())
            .await
            .unwrap();
    let first = discover(&manager, &mut mock, &mut events, "dev-1").await;
    connect_ready(&manager, &mut mock, &mut events, &first, read_write_characteristics()).await;
    let second = discover(&manager, &mut mock, &mut events, "dev-2").await;
    connect_ready(&manager, &mut mock, &mut events, &second, read_write_characteristics()).await;

    manager.save_paired_peripherals().await.unwrap();
    manager.shutdown().await.unwrap();

    let (transport, _mock) = MockTransport::new();
    let (manager, _events) =
        CentralManager::start(transport, JsonFileStore::new(&path), ManagerConfig::new())
            .await
            .unwrap();
    let restored = manager.paired_peripherals().await.unwrap();
    let ids: Vec<&DeviceId> = restored.iter().map(|p| &p.id).collect();
    assert_eq!(ids, vec![&first, &second]);
    assert!(restored
        .iter()
        .all(|p| p.state == ConnectionState::Disconnected && p.paired));
}

#[tokio::test]
async fn test_paired_load_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paired.json");
    std::fs::write(&path, "{ not json").unwrap();

    let (transport, _mock) = MockTransport::new();
    let (manager, mut events) =
        CentralManager::start(transport, JsonFileStore::new(&path), ManagerConfig::new())
            .await
            .unwrap();

    let event = test_utils::next_event(&mut events).await;
    assert!(matches!(
        event,
        ManagerEvent::PairedLoadFailed {
            error: BleError::StorageFailure { .. }
        }
    ));
    assert!(manager.paired_peripherals().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_save_failure_is_returned() {
    let (transport, _mock) = MockTransport::new();
    let store = MemoryStore::new();
    store.set_fail_saves(true);
    let (manager, _events) = CentralManager::start(transport, store, ManagerConfig::new())
        .await
        .unwrap();

    let error = assert_err!(manager.save_paired_peripherals().await);
    assert!(matches!(error, BleError::StorageFailure { .. }));
}

// ----------------------------------------------------------------------------
// Radio Ownership
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_second_manager_on_same_radio_is_rejected() {
    let adapter = format!("shared-{}", uuid::Uuid::new_v4());

    let (transport, _first_mock) = MockTransport::with_adapter_id(adapter.clone());
    let (first, _events) = CentralManager::start(transport, MemoryStore::new(), ManagerConfig::new())
        .await
        .unwrap();

    let (transport, _second_mock) = MockTransport::with_adapter_id(adapter.clone());
    let rejected = CentralManager::start(transport, MemoryStore::new(), ManagerConfig::new()).await;
    match rejected {
        Err(BleError::RadioAlreadyClaimed { adapter: claimed }) => assert_eq!(claimed, adapter),
        Err(other) => panic!("Expected RadioAlreadyClaimed, got {:?}", other),
        Ok(_) => panic!("Expected RadioAlreadyClaimed, got a running manager"),
    }

    first.shutdown().await.unwrap();

    let (transport, _third_mock) = MockTransport::with_adapter_id(adapter);
    assert_ok!(CentralManager::start(transport, MemoryStore::new(), ManagerConfig::new()).await);
}

#[tokio::test]
async fn test_dropping_manager_closes_event_stream() {
    let (manager, mut events, _mock) = start_with(ManagerConfig::new()).await;
    assert!(manager.adapter_id().starts_with("mock-"));
    drop(manager);
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let (transport, _mock) = MockTransport::new();
    let result = CentralManager::start(
        transport,
        MemoryStore::new(),
        ManagerConfig::new().with_command_buffer_size(0),
    )
    .await;
    assert!(matches!(result, Err(BleError::Config { .. })));
}
