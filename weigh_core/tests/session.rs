use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crossbeam_channel as xch;
use rstest::{fixture, rstest};
use weigh_core::mocks::{LinkCall, ScriptedLink};
use weigh_core::runner::{MeasureParams, NOT_SETTLED, run_measurement};
use weigh_core::protocol::{COMMAND_CHAR_UUID, SERVICE_UUID, USER_INFO_CHAR_UUID, WEIGHT_DATA_CHAR_UUID};
use weigh_core::{
    Material, ScaleSession, SessionCfg, SessionError, SessionState, SessionUpdate, TargetRegistry,
    link_channel,
};
use weigh_traits::{DiscoveredDevice, LinkEvent, ManualClock};

const SCALE_ID: &str = "24:6F:28:AA:00:01";

struct Harness {
    session: ScaleSession<ScriptedLink, ManualClock>,
    tx: xch::Sender<LinkEvent>,
    clock: ManualClock,
}

#[fixture]
fn h() -> Harness {
    let (tx, rx) = link_channel();
    let clock = ManualClock::new();
    let session = ScaleSession::with_clock(
        ScriptedLink::new(),
        rx,
        TargetRegistry::default(),
        SessionCfg::default(),
        clock.clone(),
    );
    Harness { session, tx, clock }
}

fn advert(name: &str, id: &str) -> LinkEvent {
    LinkEvent::Advertisement(DiscoveredDevice::new(id, Some(name)))
}

fn weight(text: &str) -> LinkEvent {
    LinkEvent::Notification {
        service: SERVICE_UUID,
        characteristic: WEIGHT_DATA_CHAR_UUID,
        value: text.as_bytes().to_vec(),
    }
}

impl Harness {
    fn send(&self, ev: LinkEvent) {
        self.tx.send(ev).unwrap();
    }

    fn poll(&mut self) -> Vec<SessionUpdate> {
        self.session.poll()
    }

    fn link(&self) -> &ScriptedLink {
        self.session.link()
    }

    /// begin(1, "u1", ALU), match at t=2s, complete connect and discovery.
    fn connect(&mut self) -> Vec<SessionUpdate> {
        self.session.begin(1, "u1", Material::Alu).unwrap();
        self.clock.advance(Duration::from_secs(2));
        self.send(advert("Galaxy Buds", "5C:F3:70:00:00:00"));
        self.send(advert("ESP32_Weigh_1", SCALE_ID));
        let mut updates = self.poll();

        let ticket = self.link().connect_ticket().unwrap();
        self.send(LinkEvent::Connected {
            ticket,
            identifier: SCALE_ID.into(),
        });
        updates.extend(self.poll());

        let ticket = self.link().discovery_ticket().unwrap();
        self.send(LinkEvent::ServicesDiscovered { ticket });
        updates.extend(self.poll());
        updates
    }

    fn measure(&mut self) {
        self.connect();
        self.session.start_measurement().unwrap();
    }

    fn feed(&mut self, readings: &[&str]) -> Vec<SessionUpdate> {
        for r in readings {
            self.send(weight(r));
        }
        self.poll()
    }
}

#[rstest]
fn match_at_two_seconds_reaches_connected_with_user_info(mut h: Harness) {
    let updates = h.connect();

    assert_eq!(h.session.state(), SessionState::Connected);
    assert_eq!(
        h.link().writes_to(USER_INFO_CHAR_UUID),
        vec![b"USER:u1;MAT:ALU".to_vec()]
    );
    match updates.as_slice() {
        [SessionUpdate::DeviceFound(d), SessionUpdate::Ready { identifier }] => {
            assert_eq!(d.identifier, SCALE_ID);
            assert_eq!(identifier, SCALE_ID);
        }
        other => panic!("expected DeviceFound then Ready, got {other:?}"),
    }
    // Scan stopped exactly once, connected to the matching device only.
    assert_eq!(h.link().count(|c| matches!(c, LinkCall::StopScan)), 1);
    assert_eq!(h.link().count(|c| matches!(c, LinkCall::Connect { .. })), 1);
    let snap = h.session.snapshot();
    assert_eq!(snap.connected_device_id.as_deref(), Some(SCALE_ID));
    assert_eq!(snap.selected_slot, Some(1));
    assert!(!snap.scanning);
}

#[rstest]
#[case(2, "", SessionError::Validation("user id must not be empty".into()))]
#[case(2, "   ", SessionError::Validation("user id must not be empty".into()))]
#[case(4, "u1", SessionError::UnknownSlot(4))]
#[case(0, "u1", SessionError::UnknownSlot(0))]
fn bad_input_fails_before_any_io(
    mut h: Harness,
    #[case] slot: u8,
    #[case] user: &str,
    #[case] expected: SessionError,
) {
    let err = h.session.begin(slot, user, Material::Steel).unwrap_err();
    assert_eq!(err, expected);
    assert!(h.link().calls().is_empty());
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[rstest]
fn user_id_with_separator_is_rejected(mut h: Harness) {
    let err = h.session.begin(1, "a;b", Material::Alu).unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert!(h.link().calls().is_empty());
}

#[rstest]
fn user_id_is_trimmed(mut h: Harness) {
    h.session.begin(1, "  u7 ", Material::Plastic).unwrap();
    assert_eq!(h.session.context().unwrap().user_id, "u7");
}

#[rstest]
fn begin_while_in_flight_is_busy(mut h: Harness) {
    h.session.begin(1, "u1", Material::Alu).unwrap();
    assert_eq!(
        h.session.begin(2, "u2", Material::Alu),
        Err(SessionError::SessionBusy)
    );
    assert_eq!(h.link().count(|c| matches!(c, LinkCall::StartScan)), 1);
    assert_eq!(h.session.context().unwrap().slot, 1);
}

#[rstest]
fn no_match_before_deadline_times_out(mut h: Harness) {
    h.session.begin(3, "u1", Material::Alu).unwrap();
    h.send(advert("ESP32_Weigh_1", SCALE_ID));
    h.clock.advance(Duration::from_millis(7_999));
    assert!(h.poll().is_empty());
    assert_eq!(h.session.state(), SessionState::Scanning);

    h.clock.advance(Duration::from_millis(1));
    let updates = h.poll();
    assert_eq!(
        updates,
        vec![SessionUpdate::Aborted(SessionError::TimedOut(
            Duration::from_secs(8)
        ))]
    );
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(!h.session.is_scanning());
    assert_eq!(h.link().count(|c| matches!(c, LinkCall::StopScan)), 1);
    assert!(h.session.last_error().is_some());
}

#[rstest]
fn only_the_first_match_connects(mut h: Harness) {
    h.session.begin(1, "u1", Material::Alu).unwrap();
    h.send(advert("ESP32_Weigh_1", SCALE_ID));
    h.send(advert("ESP32_Weigh_1", SCALE_ID));
    let found = h
        .poll()
        .into_iter()
        .filter(|u| matches!(u, SessionUpdate::DeviceFound(_)))
        .count();
    assert_eq!(found, 1);
    assert_eq!(h.link().count(|c| matches!(c, LinkCall::Connect { .. })), 1);
    assert_eq!(h.session.state(), SessionState::Connecting);
}

#[rstest]
fn identifier_match_works_without_name(h: Harness) {
    let registry = TargetRegistry::new([SCALE_ID.into(), "B".into(), "C".into()]);
    let (tx, rx) = link_channel();
    let mut session = ScaleSession::with_clock(
        ScriptedLink::new(),
        rx,
        registry,
        SessionCfg::default(),
        h.clock.clone(),
    );
    session.begin(1, "u1", Material::Alu).unwrap();
    tx.send(LinkEvent::Advertisement(DiscoveredDevice::new(SCALE_ID, None)))
        .unwrap();
    session.poll();
    assert_eq!(session.state(), SessionState::Connecting);
}

#[rstest]
fn cancel_mid_connecting_discards_late_success(mut h: Harness) {
    h.session.begin(1, "u1", Material::Alu).unwrap();
    h.send(advert("ESP32_Weigh_1", SCALE_ID));
    h.poll();
    assert_eq!(h.session.state(), SessionState::Connecting);
    let stale = h.link().connect_ticket().unwrap();

    h.session.cancel();
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.link().calls().last(), Some(&LinkCall::Disconnect));

    h.send(LinkEvent::Connected {
        ticket: stale,
        identifier: SCALE_ID.into(),
    });
    assert!(h.poll().is_empty());
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(
        h.link().count(|c| matches!(c, LinkCall::DiscoverServices { .. })),
        0
    );
}

#[rstest]
fn stale_completion_does_not_leak_into_next_attempt(mut h: Harness) {
    h.session.begin(1, "u1", Material::Alu).unwrap();
    h.send(advert("ESP32_Weigh_1", SCALE_ID));
    h.poll();
    let stale = h.link().connect_ticket().unwrap();
    h.session.cancel();

    h.session.begin(1, "u1", Material::Alu).unwrap();
    h.send(advert("ESP32_Weigh_1", SCALE_ID));
    h.poll();
    let fresh = h.link().connect_ticket().unwrap();
    assert_ne!(stale, fresh);

    h.send(LinkEvent::Connected {
        ticket: stale,
        identifier: SCALE_ID.into(),
    });
    h.poll();
    assert_eq!(h.session.state(), SessionState::Connecting);

    h.send(LinkEvent::Connected {
        ticket: fresh,
        identifier: SCALE_ID.into(),
    });
    h.poll();
    assert_eq!(
        h.link().count(|c| matches!(c, LinkCall::DiscoverServices { .. })),
        1
    );
}

#[rstest]
fn connect_failure_returns_to_idle(mut h: Harness) {
    h.session.begin(1, "u1", Material::Alu).unwrap();
    h.send(advert("ESP32_Weigh_1", SCALE_ID));
    h.poll();
    let ticket = h.link().connect_ticket().unwrap();
    h.send(LinkEvent::ConnectFailed {
        ticket,
        reason: "gatt error 133".into(),
    });
    let updates = h.poll();
    assert_eq!(
        updates.last(),
        Some(&SessionUpdate::Aborted(SessionError::Connect(
            "gatt error 133".into()
        )))
    );
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.session.begin(1, "u1", Material::Alu).is_ok());
}

#[rstest]
fn discovery_failure_returns_to_idle(mut h: Harness) {
    h.session.begin(1, "u1", Material::Alu).unwrap();
    h.send(advert("ESP32_Weigh_1", SCALE_ID));
    h.poll();
    let ticket = h.link().connect_ticket().unwrap();
    h.send(LinkEvent::Connected {
        ticket,
        identifier: SCALE_ID.into(),
    });
    h.poll();
    let ticket = h.link().discovery_ticket().unwrap();
    h.send(LinkEvent::DiscoveryFailed {
        ticket,
        reason: "no service".into(),
    });
    match h.poll().as_slice() {
        [SessionUpdate::Aborted(SessionError::Connect(msg))] => assert!(msg.contains("no service")),
        other => panic!("expected Connect abort, got {other:?}"),
    }
    assert!(h.link().writes_to(USER_INFO_CHAR_UUID).is_empty());
}

#[rstest]
fn user_info_write_failure_aborts(mut h: Harness) {
    h.session.link_mut().fail_write_to = Some(USER_INFO_CHAR_UUID);
    let updates = h.connect();
    match updates.last() {
        Some(SessionUpdate::Aborted(SessionError::Write(_))) => {}
        other => panic!("expected Write abort, got {other:?}"),
    }
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[rstest]
fn scan_error_mid_scan_aborts(mut h: Harness) {
    h.session.begin(1, "u1", Material::Alu).unwrap();
    h.send(LinkEvent::ScanFailed {
        reason: "bluetooth powered off".into(),
    });
    assert_eq!(
        h.poll(),
        vec![SessionUpdate::Aborted(SessionError::Scan(
            "bluetooth powered off".into()
        ))]
    );
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[rstest]
fn scan_start_failure_leaves_session_idle(mut h: Harness) {
    h.session.link_mut().fail_start_scan = Some("adapter unavailable".into());
    let err = h.session.begin(1, "u1", Material::Alu).unwrap_err();
    assert!(matches!(err, SessionError::Scan(_)));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.session.context().is_none());
}

#[rstest]
fn start_measurement_requires_connected(mut h: Harness) {
    assert!(matches!(
        h.session.start_measurement(),
        Err(SessionError::NotReady(_))
    ));
    h.session.begin(1, "u1", Material::Alu).unwrap();
    assert!(matches!(
        h.session.start_measurement(),
        Err(SessionError::NotReady(_))
    ));
}

#[rstest]
fn five_equal_readings_settle(mut h: Harness) {
    h.measure();
    assert_eq!(h.session.state(), SessionState::Measuring);
    assert_eq!(h.link().writes_to(COMMAND_CHAR_UUID), vec![b"START".to_vec()]);
    assert!(h.link().calls().contains(&LinkCall::SetNotify {
        characteristic: WEIGHT_DATA_CHAR_UUID,
        enabled: true
    }));

    let updates = h.feed(&["10", "10", "10", "10"]);
    assert!(updates
        .iter()
        .all(|u| matches!(u, SessionUpdate::Reading { stable: false, .. })));
    assert_eq!(h.session.state(), SessionState::Measuring);

    let updates = h.feed(&["10"]);
    assert_eq!(
        updates,
        vec![
            SessionUpdate::Reading {
                weight: 10.0,
                stable: true
            },
            SessionUpdate::Settled { weight: 10.0 },
        ]
    );
    assert_eq!(h.session.state(), SessionState::Stable);
    assert!(h.session.is_weight_stable());
}

#[rstest]
fn one_gram_off_keeps_measuring(mut h: Harness) {
    h.measure();
    h.feed(&["10", "10", "10", "10", "11"]);
    assert_eq!(h.session.state(), SessionState::Measuring);
    assert_eq!(h.session.current_weight(), Some(11.0));
}

#[rstest]
fn stable_is_latched_while_weight_follows(mut h: Harness) {
    h.measure();
    h.feed(&["250", "250", "250", "250", "250"]);
    let updates = h.feed(&["251.5"]);
    assert_eq!(
        updates,
        vec![SessionUpdate::Reading {
            weight: 251.5,
            stable: true
        }]
    );
    assert_eq!(h.session.state(), SessionState::Stable);
    assert_eq!(h.session.current_weight(), Some(251.5));
}

#[rstest]
fn malformed_reading_is_dropped(mut h: Harness) {
    h.measure();
    let updates = h.feed(&["5", "5", "abc", "5", "5"]);
    assert!(updates.contains(&SessionUpdate::ReadingRejected(
        SessionError::MalformedReading("abc".into())
    )));
    assert_eq!(h.session.state(), SessionState::Measuring);
    assert_eq!(h.session.current_weight(), Some(5.0));

    h.feed(&["5"]);
    assert_eq!(h.session.state(), SessionState::Stable);
}

#[rstest]
fn notifications_from_other_characteristics_are_ignored(mut h: Harness) {
    h.measure();
    h.send(LinkEvent::Notification {
        service: SERVICE_UUID,
        characteristic: COMMAND_CHAR_UUID,
        value: b"12".to_vec(),
    });
    assert!(h.poll().is_empty());
    assert_eq!(h.session.current_weight(), None);
}

#[rstest]
fn notifications_before_measuring_are_ignored(mut h: Harness) {
    h.connect();
    assert!(h.feed(&["1", "1", "1", "1", "1"]).is_empty());
    assert_eq!(h.session.state(), SessionState::Connected);
}

#[rstest]
fn confirm_from_stable(mut h: Harness) {
    h.measure();
    h.feed(&["42.5"; 5]);
    let w = h.session.confirm().unwrap();
    assert_eq!(w, 42.5);
    assert_eq!(h.session.state(), SessionState::Confirmed);
    assert_eq!(
        h.link().writes_to(COMMAND_CHAR_UUID),
        vec![b"START".to_vec(), b"CONFIRM_RESULT".to_vec()]
    );
    assert_eq!(h.poll(), vec![SessionUpdate::Confirmed { weight: 42.5 }]);

    assert_eq!(
        h.session.begin(1, "u1", Material::Alu),
        Err(SessionError::SessionBusy)
    );
    assert_eq!(h.session.close(), Some(42.5));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.session.snapshot().confirmed_weight, Some(42.5));
}

#[rstest]
fn confirm_while_measuring_needs_a_reading(mut h: Harness) {
    h.measure();
    assert!(matches!(
        h.session.confirm(),
        Err(SessionError::Validation(_))
    ));
    h.feed(&["7.25"]);
    assert_eq!(h.session.confirm(), Ok(7.25));
}

#[rstest]
fn confirm_requires_a_measurement(mut h: Harness) {
    h.connect();
    assert!(matches!(h.session.confirm(), Err(SessionError::NotReady(_))));
    assert_eq!(h.session.state(), SessionState::Connected);
}

#[rstest]
fn start_write_failure_tears_down(mut h: Harness) {
    h.connect();
    h.session.link_mut().fail_write_to = Some(COMMAND_CHAR_UUID);
    let err = h.session.start_measurement().unwrap_err();
    assert!(matches!(err, SessionError::Write(_)));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.link().calls().last(), Some(&LinkCall::Disconnect));
    assert!(matches!(
        h.poll().as_slice(),
        [SessionUpdate::Aborted(SessionError::Write(_))]
    ));
}

#[rstest]
fn reset_and_measure_again_clears_readings(mut h: Harness) {
    h.measure();
    h.feed(&["3"; 5]);
    assert_eq!(h.session.state(), SessionState::Stable);

    h.session.reset_and_measure_again().unwrap();
    assert_eq!(h.session.state(), SessionState::Measuring);
    assert_eq!(h.session.current_weight(), None);
    assert!(!h.session.is_weight_stable());
    assert_eq!(
        h.link().writes_to(COMMAND_CHAR_UUID),
        vec![b"START".to_vec(), b"START".to_vec()]
    );
    // The existing subscription is reused, not duplicated.
    assert_eq!(
        h.link()
            .count(|c| matches!(c, LinkCall::SetNotify { enabled: true, .. })),
        1
    );

    h.feed(&["3"; 4]);
    assert_eq!(h.session.state(), SessionState::Measuring);
}

#[rstest]
fn reset_requires_a_measurement(mut h: Harness) {
    h.connect();
    assert!(matches!(
        h.session.reset_and_measure_again(),
        Err(SessionError::NotReady(_))
    ));
}

#[rstest]
fn link_loss_while_measuring_aborts(mut h: Harness) {
    h.measure();
    h.feed(&["1"]);
    h.send(LinkEvent::Disconnected {
        identifier: SCALE_ID.into(),
    });
    assert_eq!(
        h.poll(),
        vec![SessionUpdate::Aborted(SessionError::Connect(
            "link lost".into()
        ))]
    );
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.session.current_weight(), None);
}

#[rstest]
fn unrelated_disconnect_is_ignored(mut h: Harness) {
    h.measure();
    h.send(LinkEvent::Disconnected {
        identifier: "AA:BB".into(),
    });
    assert!(h.poll().is_empty());
    assert_eq!(h.session.state(), SessionState::Measuring);
}

#[rstest]
fn cancel_from_measuring_unsubscribes_and_disconnects(mut h: Harness) {
    h.measure();
    h.session.cancel();
    let calls = h.link().calls();
    let n = calls.len();
    assert_eq!(
        calls[n - 2],
        LinkCall::SetNotify {
            characteristic: WEIGHT_DATA_CHAR_UUID,
            enabled: false
        }
    );
    assert_eq!(calls[n - 1], LinkCall::Disconnect);
    assert_eq!(h.session.state(), SessionState::Idle);

    // Idempotent.
    h.session.cancel();
    assert_eq!(h.link().calls().len(), n);
}

#[rstest]
fn snapshot_serializes(mut h: Harness) {
    h.measure();
    h.feed(&["12.5"]);
    let json = serde_json::to_value(h.session.snapshot()).unwrap();
    assert_eq!(json["state"], "measuring");
    assert_eq!(json["current_weight"], 12.5);
    assert_eq!(json["is_weight_stable"], false);
    assert_eq!(json["connected_device_id"], SCALE_ID);
    assert_eq!(json["selected_slot"], 1);
}

#[rstest]
fn confirm_write_failure_aborts_without_a_result(mut h: Harness) {
    h.measure();
    h.feed(&["42.5"; 5]);
    assert_eq!(h.session.state(), SessionState::Stable);
    h.session.link_mut().fail_write_to = Some(COMMAND_CHAR_UUID);

    let err = h.session.confirm().unwrap_err();
    assert!(matches!(err, SessionError::Write(_)));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.link().calls().last(), Some(&LinkCall::Disconnect));
    assert_eq!(h.session.confirmed_weight(), None);
    assert_eq!(h.session.last_error(), Some(&err));
    assert!(matches!(
        h.poll().as_slice(),
        [SessionUpdate::Aborted(SessionError::Write(_))]
    ));
}

#[rstest]
fn advert_after_the_deadline_does_not_connect(mut h: Harness) {
    h.session.begin(1, "u1", Material::Alu).unwrap();
    h.clock.advance(Duration::from_secs(8));
    h.send(advert("ESP32_Weigh_1", SCALE_ID));
    assert_eq!(
        h.poll(),
        vec![SessionUpdate::Aborted(SessionError::TimedOut(
            Duration::from_secs(8)
        ))]
    );
    assert_eq!(h.link().count(|c| matches!(c, LinkCall::Connect { .. })), 0);
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[rstest]
fn disconnect_while_connecting_is_not_link_loss(mut h: Harness) {
    h.session.begin(1, "u1", Material::Alu).unwrap();
    h.send(advert("ESP32_Weigh_1", SCALE_ID));
    h.poll();
    h.send(LinkEvent::Disconnected {
        identifier: SCALE_ID.into(),
    });
    assert!(h.poll().is_empty());
    assert_eq!(h.session.state(), SessionState::Connecting);

    let ticket = h.link().connect_ticket().unwrap();
    h.send(LinkEvent::Connected {
        ticket,
        identifier: SCALE_ID.into(),
    });
    h.poll();
    assert_eq!(
        h.link().count(|c| matches!(c, LinkCall::DiscoverServices { .. })),
        1
    );
}

// ── Blocking loop under a manual clock ──

#[test]
fn next_update_advances_a_manual_clock_when_idle() {
    let (tx, rx) = link_channel();
    let clock = ManualClock::new();
    let handle = clock.clone();
    let (done_tx, done_rx) = xch::bounded(1);
    std::thread::spawn(move || {
        let mut session = ScaleSession::with_clock(
            ScriptedLink::new(),
            rx,
            TargetRegistry::default(),
            SessionCfg::default(),
            clock,
        );
        let _ = done_tx.send(session.next_update(Duration::from_millis(50)));
    });

    let update = done_rx
        .recv_timeout(Duration::from_secs(3))
        .expect("next_update(50ms) returned");
    assert_eq!(update, None);
    assert!(handle.elapsed() >= Duration::from_millis(50));
    drop(tx);
}

#[test]
fn scan_deadline_fires_inside_next_update_on_a_manual_clock() {
    let (_tx, rx) = link_channel();
    let cfg = SessionCfg {
        scan_timeout: Duration::from_millis(100),
        ..SessionCfg::default()
    };
    let mut session = ScaleSession::with_clock(
        ScriptedLink::new(),
        rx,
        TargetRegistry::default(),
        cfg,
        ManualClock::new(),
    );
    session.begin(1, "u1", Material::Alu).unwrap();

    assert_eq!(
        session.next_update(Duration::from_secs(1)),
        Some(SessionUpdate::Aborted(SessionError::TimedOut(
            Duration::from_millis(100)
        )))
    );
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn run_measurement_max_wait_fires_on_a_manual_clock() {
    let (_tx, rx) = link_channel();
    let mut session = ScaleSession::with_clock(
        ScriptedLink::new(),
        rx,
        TargetRegistry::default(),
        SessionCfg::default(),
        ManualClock::new(),
    );
    let params = MeasureParams {
        slot: 1,
        user_id: "u1".into(),
        material: Material::Alu,
        auto_confirm: false,
        max_wait: Duration::from_millis(100),
    };

    let err = run_measurement(&mut session, &params, &AtomicBool::new(false), |_| {}).unwrap_err();
    assert!(err.to_string().contains(NOT_SETTLED), "got: {err}");
    assert_eq!(session.state(), SessionState::Idle);
}
