//! End-to-end tests driving a spawned layer through its handle.
//!
//! Set `RUST_LOG=fannwk_stack=debug` to see the layer's trace output.

use fannwk_models::{
    build_data_frame, Address, ExtensionId, PhysicalLink, Port, Qos, Reliability, StatCounter,
};
use fannwk_stack::{
    AttributeId, AttributeValue, ChannelMac, ConfirmSink, DataIndication, DataRequest,
    JsonFileStore, MacCommand, MacConfirm, MacDataRequest, MacDestination, MacIndication,
    MacStatus, MemoryStore, NetworkLayer, NetworkLayerHandle, NodeIdentity, RequestError,
    ResetKind, RuntimeConfig,
};
use strum::IntoEnumIterator;
use tokio::sync::{mpsc, oneshot};

const LOCAL: ExtensionId = ExtensionId::new([0x0A, 0x0B, 0x0C, 0x0D, 0x0E]);
const METER: ExtensionId = ExtensionId::new([0x11, 0x22, 0x33, 0x44, 0x55]);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

async fn started_layer() -> (NetworkLayerHandle, mpsc::UnboundedReceiver<MacCommand>) {
    init_tracing();
    let (mac, radio) = ChannelMac::new();
    let layer = NetworkLayer::new(
        NodeIdentity::endpoint(LOCAL),
        mac,
        MemoryStore::new(),
        RuntimeConfig::default(),
    );
    let (nwk, _task) = layer.spawn();
    nwk.start().await.expect("start");
    (nwk, radio)
}

async fn next_send(radio: &mut mpsc::UnboundedReceiver<MacCommand>) -> MacDataRequest {
    match radio.recv().await.expect("radio channel open") {
        MacCommand::Send(request) => request,
        other => panic!("expected a MAC send, got {other:?}"),
    }
}

async fn statistic(nwk: &NetworkLayerHandle, counter: StatCounter, index: usize) -> u32 {
    match nwk.get(AttributeId::Statistic { counter, index }).await {
        Ok(AttributeValue::Statistic { value, .. }) => value,
        other => panic!("unexpected statistic reply {other:?}"),
    }
}

#[tokio::test]
async fn critical_data_request_to_extension_id() {
    let (nwk, mut radio) = started_layer().await;
    let rf = PhysicalLink::Rf.index();
    let payload = b"interval-data".to_vec();

    let requests_before = statistic(&nwk, StatCounter::OutRequests, rf).await;
    let octets_before = statistic(&nwk, StatCounter::OutOctets, rf).await;

    let (tx, rx) = oneshot::channel();
    let request = DataRequest::new(Port::Plain, METER.into(), payload.clone()).with_qos(0x3F);
    let handle = nwk.data_request(request, ConfirmSink::Reply(tx)).unwrap();

    let sent = next_send(&mut radio).await;
    assert!(sent.ack_required);
    assert_eq!(sent.priority, 7);
    assert_eq!(sent.reliability, Reliability::High);
    assert_eq!(sent.destination, MacDestination::Unicast(METER));
    assert_eq!(sent.link, PhysicalLink::Rf);

    nwk.mac_confirm(MacConfirm {
        handle: sent.handle,
        status: MacStatus::Success,
    })
    .unwrap();
    let confirm = rx.await.unwrap();
    assert_eq!(confirm.handle(), handle);
    assert_eq!(confirm.status(), Ok(()));

    assert_eq!(
        statistic(&nwk, StatCounter::OutRequests, rf).await,
        requests_before + 1
    );
    assert_eq!(
        statistic(&nwk, StatCounter::OutOctets, rf).await,
        octets_before + u32::try_from(payload.len()).unwrap()
    );
}

#[tokio::test]
async fn mismatched_ports_count_only_unknown_protocol() {
    let (nwk, _radio) = started_layer().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    for port in Port::iter() {
        let seen_tx = seen_tx.clone();
        nwk.register_port_handler(port, move |ind: DataIndication| {
            let _ = seen_tx.send(ind);
        })
        .await
        .unwrap();
    }

    let frame = build_data_frame(
        b"alarm",
        &Address::Elided,
        Qos::CRITICAL,
        None,
        Port::Plain,
        Port::Secured,
    )
    .unwrap();
    nwk.mac_indication(MacIndication {
        link: PhysicalLink::Backhaul,
        source: METER,
        destination: MacDestination::Unicast(LOCAL),
        payload: frame,
    })
    .unwrap();

    for counter in StatCounter::iter() {
        for index in 0..counter.dimension().len() {
            let expected = u32::from(
                counter == StatCounter::InUnknownProtos
                    && index == PhysicalLink::Backhaul.index(),
            );
            assert_eq!(
                statistic(&nwk, counter, index).await,
                expected,
                "{counter}[{index}]"
            );
        }
    }
    assert!(seen_rx.try_recv().is_err());
}

#[tokio::test]
async fn overlapping_data_request_discards_the_older() {
    let (nwk, mut radio) = started_layer().await;
    let request = DataRequest::new(Port::Secured, METER.into(), b"x".to_vec());

    let (first_tx, first_rx) = oneshot::channel();
    nwk.data_request(request.clone(), ConfirmSink::Reply(first_tx))
        .unwrap();
    let first = next_send(&mut radio).await;

    let (second_tx, second_rx) = oneshot::channel();
    nwk.data_request(request, ConfirmSink::Reply(second_tx))
        .unwrap();
    let second = next_send(&mut radio).await;
    assert_ne!(first.handle, second.handle);

    // The older request's confirm channel is dropped without an answer.
    assert!(first_rx.await.is_err());

    nwk.mac_confirm(MacConfirm {
        handle: second.handle,
        status: MacStatus::Success,
    })
    .unwrap();
    assert_eq!(second_rx.await.unwrap().status(), Ok(()));
}

#[tokio::test]
async fn delivered_frame_reaches_port_handler() {
    let (nwk, _radio) = started_layer().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    nwk.register_port_handler(Port::Secured, move |ind: DataIndication| {
        let _ = seen_tx.send(ind);
    })
    .await
    .unwrap();

    let frame = build_data_frame(
        b"reading",
        &LOCAL.into(),
        Qos::new(0x18).unwrap(),
        None,
        Port::Secured,
        Port::Secured,
    )
    .unwrap();
    nwk.mac_indication(MacIndication {
        link: PhysicalLink::Rf,
        source: METER,
        destination: MacDestination::Unicast(LOCAL),
        payload: frame,
    })
    .unwrap();

    let ind = seen_rx.recv().await.unwrap();
    assert_eq!(ind.source, Address::ExtensionId(METER));
    assert_eq!(ind.destination, Address::ExtensionId(LOCAL));
    assert_eq!(ind.payload, b"reading");
    assert_eq!(ind.qos.code(), 0x18);
}

#[tokio::test]
async fn data_rejected_after_stop() {
    let (nwk, _radio) = started_layer().await;
    nwk.stop().await.unwrap();
    let request = DataRequest::new(Port::Plain, METER.into(), b"x".to_vec());
    assert_eq!(
        nwk.send_data(request).await,
        Err(RequestError::NotOperational)
    );
}

#[tokio::test]
async fn configuration_persists_across_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let (mac, _radio) = ChannelMac::new();
    let layer = NetworkLayer::new(
        NodeIdentity::endpoint(LOCAL),
        mac,
        JsonFileStore::open(dir.path()).unwrap(),
        RuntimeConfig::default(),
    );
    let (nwk, task) = layer.spawn();
    nwk.set(AttributeValue::HeadEndContext(0x42)).await.unwrap();
    nwk.reset(ResetKind::Statistics).await.unwrap();
    let reset_at = match nwk.get(AttributeId::LastResetTime).await.unwrap() {
        AttributeValue::LastResetTime(Some(at)) => at,
        other => panic!("unexpected {other:?}"),
    };
    drop(nwk);
    task.await.unwrap();

    let (mac, _radio) = ChannelMac::new();
    let layer = NetworkLayer::new(
        NodeIdentity::endpoint(LOCAL),
        mac,
        JsonFileStore::open(dir.path()).unwrap(),
        RuntimeConfig::default(),
    );
    let (nwk, _task) = layer.spawn();
    assert_eq!(
        nwk.get(AttributeId::HeadEndContext).await,
        Ok(AttributeValue::HeadEndContext(0x42))
    );
    assert_eq!(
        nwk.get(AttributeId::LastResetTime).await,
        Ok(AttributeValue::LastResetTime(Some(reset_at)))
    );

    nwk.reset(ResetKind::All).await.unwrap();
    assert_eq!(
        nwk.get(AttributeId::HeadEndContext).await,
        Ok(AttributeValue::HeadEndContext(0))
    );
}
