use super::*;

fn session_channel() -> watch::Receiver<Session> {
    let (_, rx) = watch::channel(Session {
        whiteboard_id: 12,
        page_id: 3,
        user_id: "user-1".to_owned(),
        user_name: "Ada".to_owned(),
    });
    rx
}

fn camera() -> Camera {
    Camera { x: 0.0, y: 0.0, z: 1.0 }
}

#[test]
fn first_sample_sends_immediately() {
    let presence = PresenceBroadcaster::new(session_channel());
    assert!(presence.pointer_sample(1.0, 2.0, camera()).is_some());
}

#[test]
fn samples_inside_window_are_dropped_not_deferred() {
    let presence = PresenceBroadcaster::new(session_channel());
    assert!(presence.pointer_sample(1.0, 1.0, camera()).is_some());
    assert!(presence.pointer_sample(2.0, 2.0, camera()).is_none());
    assert!(presence.pointer_sample(3.0, 3.0, camera()).is_none());
}

#[test]
fn burst_of_samples_yields_at_most_two_messages() {
    let presence = PresenceBroadcaster::new(session_channel());

    let mut sent = 0;
    for i in 0..200 {
        let offset = f64::from(i);
        if presence.pointer_sample(offset, offset, camera()).is_some() {
            sent += 1;
        }
    }

    assert!(sent >= 1, "the first sample must pass the gate");
    assert!(sent <= 2, "a 50ms window admits at most two of a tight burst, got {sent}");
}

#[test]
fn gate_reopens_after_the_window() {
    let presence =
        PresenceBroadcaster::with_interval(session_channel(), Duration::from_millis(5));
    assert!(presence.pointer_sample(1.0, 1.0, camera()).is_some());
    assert!(presence.pointer_sample(2.0, 2.0, camera()).is_none());

    std::thread::sleep(Duration::from_millis(10));
    assert!(presence.pointer_sample(3.0, 3.0, camera()).is_some());
}

#[test]
fn message_carries_session_identity_and_sample() {
    let presence = PresenceBroadcaster::new(session_channel());
    let message = presence
        .pointer_sample(120.5, -4.25, Camera { x: 10.0, y: 20.0, z: 2.0 })
        .expect("first sample sends");

    let WireMessage::Presence(body) = message else {
        panic!("expected presence message");
    };
    assert_eq!(body.user_id, "user-1");
    assert_eq!(body.user_name, "Ada");
    assert_eq!(body.page_id, 3);
    assert_eq!(body.whiteboard_id, 12);
    assert!((body.x - 120.5).abs() < f64::EPSILON);
    assert!((body.y + 4.25).abs() < f64::EPSILON);
    assert!((body.camera.z - 2.0).abs() < f64::EPSILON);
}
