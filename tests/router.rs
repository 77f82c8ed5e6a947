mod common;

use std::sync::Arc;

use common::{plays, sound_board, Journal, MockChannel};
use drumcall::sound::{AudioHandle, LogPlayer, KEY_BINDINGS};
use drumcall::{
    Clip, FeedbackPolicy, ReceiveOutcome, SendOutcome, SignalEncoding, SignalMessage,
    SignalRouter, SoundBoard, SoundRegistry,
};

fn router(channel: Arc<MockChannel>, journal: &Journal) -> SignalRouter {
    SignalRouter::new(channel, sound_board(journal), "alice")
}

#[tokio::test]
async fn every_bound_key_sends_one_key_signal() {
    for (key, clip) in KEY_BINDINGS {
        for key in [key.to_string(), key.to_ascii_uppercase().to_string()] {
            let journal = Journal::default();
            let channel = MockChannel::new(journal.clone());
            let router = router(channel.clone(), &journal);

            assert_eq!(router.send(&key).await, SendOutcome::Sent(clip));

            let sent = channel.sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].kind, "key-signal");
            assert_eq!(sent[0].data, clip.key());
            assert!(sent[0].to.is_empty());
        }
    }
}

#[tokio::test]
async fn unbound_keys_send_and_play_nothing() {
    let journal = Journal::default();
    let channel = MockChannel::new(journal.clone());
    let router = router(channel.clone(), &journal);

    for key in ["x", "1", " ", "", "Enter", "dd"] {
        assert_eq!(router.send(key).await, SendOutcome::Unbound);
    }
    assert!(channel.sent().is_empty());
    assert!(journal.lock().is_empty());
}

#[tokio::test]
async fn snare_scenario_plays_after_delivery() {
    let journal = Journal::default();
    let channel = MockChannel::new(journal.clone());
    let router = router(channel.clone(), &journal);

    assert_eq!(router.send("d").await, SendOutcome::Sent(Clip::Snare));
    assert_eq!(
        channel.sent(),
        vec![SignalMessage::key_signal("snare")]
    );
    assert_eq!(*journal.lock(), vec!["send:snare", "play:snare"]);
}

#[tokio::test]
async fn acknowledged_feedback_stays_silent_on_delivery_failure() {
    let journal = Journal::default();
    let channel = MockChannel::new(journal.clone()).failing();
    let router = router(channel.clone(), &journal);

    assert_eq!(router.send("q").await, SendOutcome::DeliveryFailed(Clip::Drum1));
    assert_eq!(channel.sent().len(), 1);
    assert!(plays(&journal).is_empty());
}

#[tokio::test]
async fn optimistic_feedback_plays_before_sending() {
    let journal = Journal::default();
    let channel = MockChannel::new(journal.clone()).failing();
    let router = router(channel, &journal).with_feedback(FeedbackPolicy::Optimistic);

    assert_eq!(router.send("w").await, SendOutcome::DeliveryFailed(Clip::Drum2));
    assert_eq!(*journal.lock(), vec!["play:drum_2", "send:drum_2"]);
}

#[tokio::test]
async fn structured_encoding_names_the_sender() {
    let journal = Journal::default();
    let channel = MockChannel::new(journal.clone());
    let router = router(channel.clone(), &journal).with_encoding(SignalEncoding::Structured);

    router.send("D").await;
    let data: serde_json::Value = serde_json::from_str(&channel.sent()[0].data).unwrap();
    assert_eq!(data, serde_json::json!({ "userName": "alice", "keyCode": "d" }));
}

#[test]
fn remote_drum_plays_without_answering() {
    let journal = Journal::default();
    let channel = MockChannel::new(journal.clone());
    let router = router(channel.clone(), &journal);

    let inbound = SignalMessage::key_signal("drum_1");
    assert_eq!(router.receive(&inbound), ReceiveOutcome::Played(Clip::Drum1));
    assert_eq!(plays(&journal), vec!["play:drum_1"]);
    assert!(channel.sent().is_empty());
}

#[test]
fn receive_accepts_every_payload_variant() {
    let journal = Journal::default();
    let router = router(MockChannel::new(journal.clone()), &journal);

    for (data, clip) in [
        ("snare", Clip::Snare),
        ("e", Clip::Drum3),
        ("A", Clip::Drum4),
        (r#"{"userName":"bob","keyCode":"s"}"#, Clip::Drum5),
    ] {
        let msg = SignalMessage::key_signal(data);
        assert_eq!(router.receive(&msg), ReceiveOutcome::Played(clip));
    }
    assert_eq!(plays(&journal).len(), 4);
}

#[test]
fn unknown_clips_are_swallowed() {
    let journal = Journal::default();
    let router = router(MockChannel::new(journal.clone()), &journal);

    for data in ["cowbell", "", "z", r#"{"keyCode":"cowbell"}"#, "{broken"] {
        let msg = SignalMessage::key_signal(data);
        assert_eq!(router.receive(&msg), ReceiveOutcome::Undecodable);
    }
    assert!(journal.lock().is_empty());
}

#[test]
fn other_signal_types_are_ignored() {
    let journal = Journal::default();
    let router = router(MockChannel::new(journal.clone()), &journal);

    let chat = SignalMessage::new("my-chat", "snare");
    assert_eq!(router.receive(&chat), ReceiveOutcome::Ignored);
    assert!(journal.lock().is_empty());
}

#[test]
fn duplicate_signals_play_twice() {
    let journal = Journal::default();
    let router = router(MockChannel::new(journal.clone()), &journal);

    let msg = SignalMessage::key_signal("snare");
    router.receive(&msg);
    router.receive(&msg);
    assert_eq!(plays(&journal), vec!["play:snare", "play:snare"]);
}

#[test]
fn registry_miss_is_reported_not_raised() {
    let journal = Journal::default();
    let mut registry = SoundRegistry::new();
    registry.insert(AudioHandle::new(Clip::Snare, "snare.mp3", vec![1u8]));
    let sounds = Arc::new(SoundBoard::new(registry, LogPlayer));
    let router = SignalRouter::new(MockChannel::new(journal), sounds, "alice");

    let msg = SignalMessage::key_signal("drum_4");
    assert_eq!(router.receive(&msg), ReceiveOutcome::NotPlayed(Clip::Drum4));
    let msg = SignalMessage::key_signal("snare");
    assert_eq!(router.receive(&msg), ReceiveOutcome::Played(Clip::Snare));
}
