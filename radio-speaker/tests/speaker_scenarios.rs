//! End-to-end speaker scenarios on the simulated backend
//!
//! Covers deferred initialization, fade-out-triggered rotation, preloading the
//! next sound while one is active, and destroy racing an outstanding start.
//! All tests run on a paused Tokio clock.

mod helpers;

use helpers::{assert_valid_sequence, settle, wait_until, EventRecorder, TestRig};
use radio_speaker::platform::{MediaSpec, PlatformAudioResource};
use radio_speaker::playback::SlotRole;
use radio_speaker::{SoundConfig, SoundEvent, SoundEventKind, SoundPhase};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_play_before_initialization_waits_for_context() {
    let rig = TestRig::new();
    rig.media("sim://a", MediaSpec::new(60_000));
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create("sim://a", recorder.attach("a", SoundConfig::new()))
        .unwrap();
    a.play();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(recorder.is_empty(), "no events before initialization");
    assert!(!rig.speaker.is_initialized());
    assert_eq!(rig.speaker.pending_prepare().as_deref(), Some("sim://a"));
    assert_eq!(a.phase(), SoundPhase::Created);

    rig.speaker.initialize_audio().await.unwrap();
    assert_eq!(rig.speaker.pending_prepare(), None);
    assert_eq!(rig.slot(SlotRole::Preparing).url.as_deref(), Some("sim://a"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(recorder.is_empty(), "initialization alone does not play");

    a.play();
    assert!(wait_until(Duration::from_secs(1), || recorder.count("a", SoundEventKind::Play) == 1).await);
    assert_eq!(rig.slot(SlotRole::Active).bound, Some(a.id()));
}

#[tokio::test(start_paused = true)]
async fn test_fade_out_rotates_active_into_fading() {
    let rig = TestRig::initialized().await;
    rig.media("sim://a", MediaSpec::new(10_000));
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create(
            "sim://a",
            recorder.attach("a", SoundConfig::new().fade_out_seconds(3.0)),
        )
        .unwrap();
    a.play();

    assert!(wait_until(Duration::from_secs(12), || recorder.count("a", SoundEventKind::Finish) == 1).await);

    let finished_at = recorder.first_at("a", SoundEventKind::Finish).unwrap();
    assert!(
        (7000..=7250).contains(&finished_at),
        "finish at {}ms, expected at the fade-out start",
        finished_at
    );
    assert_eq!(recorder.lifecycle("a"), vec![SoundEvent::Play, SoundEvent::Finish { error: false }]);

    // Still audible while fading
    let fading = rig.slot(SlotRole::Fading);
    assert_eq!(fading.bound, Some(a.id()));
    assert_eq!(fading.url.as_deref(), Some("sim://a"));
    assert!(fading.volume > 0.9);
    assert!(rig.slot(SlotRole::Active).bound.is_none());

    // No progress reports once finished
    assert!(recorder.elapse_positions("a").iter().all(|p| *p < 7000));

    tokio::time::sleep(Duration::from_millis(4000)).await;
    let fading = rig.slot(SlotRole::Fading);
    assert!(fading.bound.is_none());
    assert_eq!(fading.volume, 0.0);
    assert_eq!(rig.audible_slots(), 0);
    assert_valid_sequence(&recorder.events("a"));
}

#[tokio::test(start_paused = true)]
async fn test_create_while_active_preloads_and_play_rotates() {
    let rig = TestRig::initialized().await;
    rig.media("sim://a", MediaSpec::new(60_000));
    rig.media("sim://b", MediaSpec::new(60_000));
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create("sim://a", recorder.attach("a", SoundConfig::new()))
        .unwrap();
    a.play();
    assert!(wait_until(Duration::from_secs(1), || recorder.count("a", SoundEventKind::Play) == 1).await);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let b = rig
        .speaker
        .create("sim://b", recorder.attach("b", SoundConfig::new()))
        .unwrap();
    settle().await;
    assert_eq!(rig.slot(SlotRole::Preparing).url.as_deref(), Some("sim://b"));
    assert_eq!(rig.slot(SlotRole::Active).bound, Some(a.id()));

    b.play();
    assert!(wait_until(Duration::from_secs(1), || recorder.count("b", SoundEventKind::Play) == 1).await);

    let order = recorder.lifecycle_all();
    assert_eq!(
        order,
        vec![
            ("a".to_string(), SoundEvent::Play),
            ("a".to_string(), SoundEvent::Finish { error: false }),
            ("b".to_string(), SoundEvent::Play),
        ]
    );
    assert_eq!(rig.slot(SlotRole::Active).bound, Some(b.id()));
    assert_eq!(a.phase(), SoundPhase::Finished);
    assert_eq!(a.position(), 0);

    // The pre-empted resource is silenced
    let previous = rig.slot(SlotRole::Preparing);
    assert!(previous.bound.is_none());
    assert_eq!(previous.volume, 0.0);
    assert!(previous.url.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_destroy_before_resolution_emits_nothing() {
    let rig = TestRig::initialized().await;
    rig.media(
        "sim://a",
        MediaSpec::new(60_000).with_load_delay(Duration::from_millis(300)),
    );
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create("sim://a", recorder.attach("a", SoundConfig::new()))
        .unwrap();
    a.play();
    a.destroy();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(recorder.is_empty());
    assert_eq!(rig.speaker.registered_sounds(), 0);
    assert!(!rig.speaker.is_registered(a.id()));
    assert!(a.is_destroyed());
    assert!(rig.speaker.slots().iter().all(|s| s.bound.is_none()));
    assert_eq!(rig.audible_slots(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_during_outstanding_start_silences_on_resolution() {
    let rig = TestRig::initialized().await;
    rig.media(
        "sim://a",
        MediaSpec::new(60_000).with_start_delay(Duration::from_millis(500)),
    );
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create("sim://a", recorder.attach("a", SoundConfig::new()))
        .unwrap();
    a.play();

    tokio::time::sleep(Duration::from_millis(100)).await;
    // Rotated, start outstanding
    assert_eq!(rig.slot(SlotRole::Active).starting, Some(a.id()));

    a.destroy();
    assert_eq!(rig.speaker.registered_sounds(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(recorder.is_empty());
    let active = rig.slot(SlotRole::Active);
    assert!(active.bound.is_none());
    assert!(active.starting.is_none());
    assert_eq!(active.volume, 0.0);
    assert!(rig.resource_for("sim://a").is_none(), "resource repointed at silence");
}

#[tokio::test(start_paused = true)]
async fn test_crossfade_keeps_two_slots_audible() {
    let rig = TestRig::initialized().await;
    rig.media("sim://a", MediaSpec::new(10_000));
    rig.media("sim://b", MediaSpec::new(30_000));
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create(
            "sim://a",
            recorder.attach("a", SoundConfig::new().fade_out_seconds(3.0)),
        )
        .unwrap();
    a.play();
    assert!(wait_until(Duration::from_secs(1), || recorder.count("a", SoundEventKind::Play) == 1).await);

    let b = rig
        .speaker
        .create("sim://b", recorder.attach("b", SoundConfig::new()))
        .unwrap();
    let next = b.clone();
    a.on(SoundEventKind::Finish, move |_| next.play());

    assert!(wait_until(Duration::from_secs(8), || recorder.count("b", SoundEventKind::Play) == 1).await);
    let b_started = recorder.first_at("b", SoundEventKind::Play).unwrap();
    assert!((7000..=7250).contains(&b_started));

    let mut last_fading = f32::MAX;
    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        if rig.elapsed_ms() >= 9900 {
            break;
        }
        assert_eq!(rig.audible_slots(), 2, "active and fading audible at {}ms", rig.elapsed_ms());
        let active = rig.slot(SlotRole::Active);
        let fading = rig.slot(SlotRole::Fading);
        assert_eq!(active.bound, Some(b.id()));
        assert_eq!(fading.bound, Some(a.id()));
        assert_eq!(active.volume, 1.0);
        assert!(fading.volume <= last_fading, "fading volume must not rise");
        last_fading = fading.volume;
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(rig.audible_slots(), 1);
    assert_valid_sequence(&recorder.events("a"));
    assert_valid_sequence(&recorder.events("b"));
}

#[tokio::test(start_paused = true)]
async fn test_deferred_prepare_loads_after_threshold() {
    let mut config = radio_speaker::SpeakerConfig::default();
    config.preload_threshold_ms = 5000;
    let rig = TestRig::with_config(config);
    rig.speaker.initialize_audio().await.unwrap();
    rig.media("sim://a", MediaSpec::new(60_000));
    rig.media("sim://b", MediaSpec::new(60_000));
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create("sim://a", recorder.attach("a", SoundConfig::new()))
        .unwrap();
    a.play();
    assert!(wait_until(Duration::from_secs(1), || recorder.count("a", SoundEventKind::Play) == 1).await);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    rig.speaker.prepare("sim://b");
    assert_eq!(rig.speaker.pending_prepare().as_deref(), Some("sim://b"));
    assert!(rig.slot(SlotRole::Preparing).url.is_none());

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(rig.speaker.pending_prepare().as_deref(), Some("sim://b"));

    assert!(wait_until(Duration::from_secs(3), || {
        rig.slot(SlotRole::Preparing).url.as_deref() == Some("sim://b")
    })
    .await);
    assert!(rig.elapsed_ms() >= 5000);
    assert_eq!(rig.speaker.pending_prepare(), None);
}

#[tokio::test(start_paused = true)]
async fn test_prepare_with_silent_active_loads_immediately() {
    let rig = TestRig::initialized().await;
    rig.media("sim://b", MediaSpec::new(60_000));

    rig.speaker.prepare("sim://b");
    settle().await;
    assert_eq!(rig.speaker.pending_prepare(), None);
    assert_eq!(rig.slot(SlotRole::Preparing).url.as_deref(), Some("sim://b"));
}

#[tokio::test(start_paused = true)]
async fn test_destroyed_preload_frees_preparing_slot() {
    let rig = TestRig::initialized().await;
    rig.media("sim://a", MediaSpec::new(60_000));
    rig.media("sim://b", MediaSpec::new(60_000));
    rig.media("sim://c", MediaSpec::new(60_000));
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create("sim://a", recorder.attach("a", SoundConfig::new()))
        .unwrap();
    settle().await;
    assert_eq!(rig.slot(SlotRole::Preparing).url.as_deref(), Some("sim://a"));

    a.destroy();
    let b = rig
        .speaker
        .create("sim://b", recorder.attach("b", SoundConfig::new()))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(rig.slot(SlotRole::Preparing).url.as_deref(), Some("sim://b"));
    assert_eq!(rig.speaker.pending_prepare(), None);

    // A URL parked behind the destroyed preload takes over the slot
    let c = rig
        .speaker
        .create("sim://c", recorder.attach("c", SoundConfig::new()))
        .unwrap();
    assert_eq!(rig.speaker.pending_prepare().as_deref(), Some("sim://c"));
    b.destroy();
    settle().await;
    assert_eq!(rig.slot(SlotRole::Preparing).url.as_deref(), Some("sim://c"));
    assert_eq!(rig.speaker.pending_prepare(), None);

    c.play();
    assert!(wait_until(Duration::from_secs(1), || recorder.count("c", SoundEventKind::Play) == 1).await);
    assert!(recorder.events("a").is_empty());
    assert!(recorder.events("b").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_volume_change_during_crossfade_keeps_fading_slot_falling() {
    let rig = TestRig::initialized().await;
    rig.media("sim://a", MediaSpec::new(10_000));
    rig.media("sim://b", MediaSpec::new(30_000));
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create(
            "sim://a",
            recorder.attach("a", SoundConfig::new().fade_out_seconds(3.0)),
        )
        .unwrap();
    a.play();
    assert!(wait_until(Duration::from_secs(1), || recorder.count("a", SoundEventKind::Play) == 1).await);

    let b = rig
        .speaker
        .create("sim://b", recorder.attach("b", SoundConfig::new()))
        .unwrap();
    let next = b.clone();
    a.on(SoundEventKind::Finish, move |_| next.play());
    assert!(wait_until(Duration::from_secs(8), || recorder.count("b", SoundEventKind::Play) == 1).await);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let before = rig.slot(SlotRole::Fading).volume;
    assert!(before > 0.0);

    rig.speaker.set_volume(50);
    let after = rig.slot(SlotRole::Fading).volume;
    assert!(after < before, "fading volume {} -> {} after lowering", before, after);
    assert_eq!(rig.slot(SlotRole::Active).volume, 0.5);

    let mut last = after;
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let fading = rig.slot(SlotRole::Fading);
        if fading.bound.is_none() {
            break;
        }
        assert!(fading.volume <= last, "fading volume must not rise");
        assert!(fading.volume <= 0.5);
        last = fading.volume;
    }
    assert_eq!(rig.slot(SlotRole::Active).volume, 0.5);
}

#[tokio::test(start_paused = true)]
async fn test_fading_slot_released_when_media_ends_early() {
    let rig = TestRig::initialized().await;
    rig.media("sim://a", MediaSpec::new(10_000));
    rig.media("sim://b", MediaSpec::new(30_000));
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create(
            "sim://a",
            recorder.attach("a", SoundConfig::new().fade_out_seconds(3.0)),
        )
        .unwrap();
    a.play();
    assert!(wait_until(Duration::from_secs(8), || recorder.count("a", SoundEventKind::Finish) == 1).await);
    assert_eq!(rig.slot(SlotRole::Fading).bound, Some(a.id()));

    // Jump the fading media to its end, well inside the fade window
    tokio::time::sleep(Duration::from_millis(300)).await;
    let ended_at = rig.elapsed_ms();
    rig.resource_for("sim://a").unwrap().seek(10_000);

    assert!(wait_until(Duration::from_millis(600), || rig.slot(SlotRole::Fading).bound.is_none()).await);
    assert!(rig.elapsed_ms() < 9000, "released by end of media, not by the fade window");
    assert!(rig.elapsed_ms() >= ended_at);
    let fading = rig.slot(SlotRole::Fading);
    assert_eq!(fading.volume, 0.0);
    assert!(fading.url.is_none());
    assert_eq!(rig.audible_slots(), 0);
    assert_valid_sequence(&recorder.events("a"));
}

#[tokio::test(start_paused = true)]
async fn test_second_play_pre_empts_assembling_sound() {
    let rig = TestRig::initialized().await;
    rig.media(
        "sim://a",
        MediaSpec::new(60_000).with_load_delay(Duration::from_millis(500)),
    );
    rig.media("sim://b", MediaSpec::new(60_000));
    let recorder = EventRecorder::new();

    let a = rig
        .speaker
        .create("sim://a", recorder.attach("a", SoundConfig::new()))
        .unwrap();
    let b = rig
        .speaker
        .create("sim://b", recorder.attach("b", SoundConfig::new()))
        .unwrap();

    a.play();
    b.play();
    assert!(wait_until(Duration::from_secs(2), || recorder.count("b", SoundEventKind::Play) == 1).await);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        recorder.lifecycle_all(),
        vec![
            ("a".to_string(), SoundEvent::Finish { error: false }),
            ("b".to_string(), SoundEvent::Play),
        ]
    );
    assert_eq!(a.phase(), SoundPhase::Finished);
    assert_eq!(rig.slot(SlotRole::Active).bound, Some(b.id()));
    assert_valid_sequence(&recorder.events("a"));
    assert_valid_sequence(&recorder.events("b"));
}
