mod common;

use common::{ids, settle, started, sticky_settings, track, tracks, user, Fixture};
use pretty_assertions::assert_eq;
use relay_queue::{
    audio::{
        events::QueueEventKind,
        session::{PlaybackState, RepeatMode},
    },
    config::SessionSettings,
    error::QueueError,
};
use serenity::model::id::GuildId;
use std::{sync::atomic::Ordering, time::Duration};

#[tokio::test(start_paused = true)]
async fn enqueue_keeps_order_and_requester() {
    let mut fx = Fixture::new(sticky_settings());
    let session = fx.session(1);

    let receipt = session
        .enqueue(tracks(&["a", "b"]), user(7))
        .await
        .unwrap();
    assert_eq!(receipt.first_position, 0);
    assert_eq!(receipt.added, 2);

    let receipt = session.enqueue(vec![track("c", 30)], user(8)).await.unwrap();
    assert_eq!(receipt.first_position, 2);

    let snapshot = receipt.snapshot;
    assert_eq!(ids(&snapshot.tracks), vec!["a", "b", "c"]);
    assert_eq!(snapshot.tracks[0].requested_by(), user(7));
    assert_eq!(snapshot.tracks[2].requested_by(), user(8));
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert!(fx.recorder.opened().is_empty());

    let kinds = fx.drain();
    assert_eq!(kinds[0], QueueEventKind::QueueCreated);
    assert_eq!(
        kinds[1],
        QueueEventKind::PlaylistAdded {
            count: 2,
            first_position: 0
        }
    );
    assert!(matches!(kinds[2], QueueEventKind::TrackAdded { position: 2, .. }));
}

#[tokio::test(start_paused = true)]
async fn enqueue_and_start_begins_with_first_track() {
    let mut fx = Fixture::new(sticky_settings());
    let session = fx.session(1);

    let receipt = session
        .enqueue_and_start(tracks(&["a", "b"]), None)
        .await
        .unwrap();

    assert_eq!(receipt.snapshot.state, PlaybackState::Playing);
    assert_eq!(receipt.snapshot.cursor, 0);
    assert!(receipt.snapshot.pipeline_attached);
    assert_eq!(fx.recorder.opened(), vec!["a"]);
    assert_eq!(fx.recorder.connects.load(Ordering::SeqCst), 1);
    assert_eq!(started(&fx.drain()), vec!["a"]);

    // Already playing: more tracks only get appended
    session
        .enqueue_and_start(vec![track("c", 10)], None)
        .await
        .unwrap();
    assert_eq!(fx.recorder.opened(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn empty_enqueue_is_rejected() {
    let fx = Fixture::new(sticky_settings());
    let session = fx.session(1);

    let result = session.enqueue(Vec::new(), None).await;
    assert_eq!(result.unwrap_err(), QueueError::EmptyQueue);
}

#[tokio::test(start_paused = true)]
async fn capacity_truncates_batches_and_rejects_when_full() {
    let fx = Fixture::new(SessionSettings {
        max_queue_size: 3,
        ..sticky_settings()
    });
    let session = fx.session(1);

    session.enqueue(tracks(&["a", "b"]), None).await.unwrap();
    let receipt = session
        .enqueue(tracks(&["c", "d", "e"]), None)
        .await
        .unwrap();
    assert_eq!(receipt.added, 1);
    assert_eq!(ids(&receipt.snapshot.tracks), vec!["a", "b", "c"]);

    let result = session.enqueue(vec![track("f", 10)], None).await;
    assert_eq!(result.unwrap_err(), QueueError::QueueFull { max: 3 });
}

#[tokio::test(start_paused = true)]
async fn play_on_empty_queue_fails_and_skip_reports_nothing_playing() {
    let fx = Fixture::new(sticky_settings());
    let session = fx.session(1);

    assert_eq!(session.play().await.unwrap_err(), QueueError::EmptyQueue);
    assert_eq!(session.skip().await.unwrap_err(), QueueError::NothingPlaying);
}

#[tokio::test(start_paused = true)]
async fn invalid_jump_leaves_state_unchanged() {
    let mut fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b", "c"]), None)
        .await
        .unwrap();
    fx.drain();

    let before = session.snapshot().await.unwrap();
    let result = session.jump(3).await;
    assert_eq!(
        result.unwrap_err(),
        QueueError::InvalidPosition { position: 3, len: 3 }
    );

    let after = session.snapshot().await.unwrap();
    assert_eq!(before, after);
    assert!(fx.drain().is_empty());
    assert_eq!(fx.recorder.opened(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn jump_records_history_and_restarts_at_position() {
    let fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b", "c"]), None)
        .await
        .unwrap();

    let snapshot = session.jump(2).await.unwrap();
    assert_eq!(snapshot.cursor, 2);
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(ids(&snapshot.history), vec!["a"]);
    assert_eq!(fx.recorder.opened(), vec!["a", "c"]);
    assert_eq!(fx.recorder.live(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_clears_queue_and_keeps_session_when_configured() {
    let mut fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b"]), None)
        .await
        .unwrap();
    session.notify_room_empty();
    assert!(session.snapshot().await.unwrap().idle_timer_pending);

    let snapshot = session.stop().await.unwrap();
    assert!(snapshot.tracks.is_empty());
    assert_eq!(snapshot.cursor, 0);
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert!(!snapshot.pipeline_attached);
    assert!(!snapshot.idle_timer_pending);
    assert_eq!(fx.recorder.live(), 0);

    assert_eq!(fx.drain().last(), Some(&QueueEventKind::Stopped));
    assert!(fx.registry.get(GuildId::new(1)).is_some());
    assert_eq!(fx.recorder.disconnects.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_tears_down_when_leaving_on_stop() {
    let mut fx = Fixture::new(SessionSettings::default());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b"]), None)
        .await
        .unwrap();

    let snapshot = session.stop().await.unwrap();
    assert!(snapshot.torn_down);
    assert!(fx.registry.get(GuildId::new(1)).is_none());
    assert_eq!(fx.recorder.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(fx.recorder.live(), 0);
    assert_eq!(fx.drain().last(), Some(&QueueEventKind::Stopped));

    // Operations on the dead handle fail instead of resurrecting it
    assert_eq!(session.play().await.unwrap_err(), QueueError::SessionClosed);
}

#[tokio::test(start_paused = true)]
async fn shuffle_keeps_current_track_first() {
    let fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    let names: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    session
        .enqueue_and_start(tracks(&names), None)
        .await
        .unwrap();
    session.jump(4).await.unwrap();

    let snapshot = session.shuffle().await.unwrap();
    assert_eq!(snapshot.cursor, 0);
    assert_eq!(snapshot.tracks[0].id(), "t4");
    assert_eq!(snapshot.state, PlaybackState::Playing);

    let mut shuffled = ids(&snapshot.tracks);
    shuffled.sort();
    let mut expected: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    expected.sort();
    assert_eq!(shuffled, expected);

    // The live pipeline is untouched
    assert_eq!(fx.recorder.opened(), vec!["t0", "t4"]);
}

#[tokio::test(start_paused = true)]
async fn history_is_bounded_to_most_recent_fifty() {
    let fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    let names: Vec<String> = (0..60).map(|i| format!("t{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    session.enqueue_and_start(tracks(&refs), None).await.unwrap();

    for _ in 0..55 {
        session.skip().await.unwrap();
    }

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.cursor, 55);
    assert_eq!(snapshot.history.len(), 50);
    assert_eq!(ids(&snapshot.history), names[5..55].to_vec());
    assert_eq!(fx.recorder.max_live.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn volume_changes_are_clamped_and_idempotent() {
    let mut fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a"]), None)
        .await
        .unwrap();
    fx.drain();

    session.set_volume(80).await.unwrap();
    session.set_volume(80).await.unwrap();
    let volume_events = fx
        .drain()
        .into_iter()
        .filter(|kind| matches!(kind, QueueEventKind::VolumeChanged { .. }))
        .count();
    assert_eq!(volume_events, 1);
    assert_eq!(*fx.recorder.volumes.lock(), vec![80]);

    assert_eq!(session.set_volume(150).await.unwrap().volume, 100);
    assert_eq!(session.set_volume(-5).await.unwrap().volume, 0);
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_only_act_in_matching_state() {
    let mut fx = Fixture::new(sticky_settings());
    let session = fx.session(1);

    session.pause().await.unwrap();
    session.resume().await.unwrap();
    assert!(fx.drain().is_empty());

    session
        .enqueue_and_start(tracks(&["a"]), None)
        .await
        .unwrap();
    fx.drain();

    assert_eq!(session.pause().await.unwrap().state, PlaybackState::Paused);
    session.pause().await.unwrap();
    assert_eq!(session.resume().await.unwrap().state, PlaybackState::Playing);

    assert_eq!(fx.drain(), vec![QueueEventKind::Paused, QueueEventKind::Resumed]);
    assert_eq!(fx.recorder.paused.load(Ordering::SeqCst), 1);
    assert_eq!(fx.recorder.resumed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn remove_shifts_cursor_and_protects_current_track() {
    let fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b", "c"]), None)
        .await
        .unwrap();
    session.jump(1).await.unwrap();

    assert_eq!(
        session.remove(1).await.unwrap_err(),
        QueueError::InvalidPosition { position: 1, len: 3 }
    );

    let snapshot = session.remove(0).await.unwrap();
    assert_eq!(ids(&snapshot.tracks), vec!["b", "c"]);
    assert_eq!(snapshot.cursor, 0);
    assert_eq!(snapshot.current().map(|t| t.id()), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn natural_end_advances_then_finishes_and_leaves() {
    let mut fx = Fixture::new(SessionSettings::default());
    let session = fx.session(1);
    session
        .enqueue_and_start(vec![track("a", 30), track("b", 45)], None)
        .await
        .unwrap();
    fx.drain();

    fx.recorder.signals_at(0).ended();
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.cursor, 1);
    assert_eq!(ids(&snapshot.history), vec!["a"]);
    assert_eq!(started(&fx.drain()), vec!["b"]);

    fx.recorder.signals_at(1).ended();
    assert!(!settle(&session).await);

    assert_eq!(fx.drain(), vec![QueueEventKind::Finished]);
    assert!(fx.registry.get(GuildId::new(1)).is_none());
    assert_eq!(fx.recorder.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(fx.recorder.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn repeat_track_replays_after_delay() {
    let mut fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b"]), None)
        .await
        .unwrap();
    session.set_repeat_mode(RepeatMode::Track).await.unwrap();
    fx.drain();

    fx.recorder.last_signals().ended();
    settle(&session).await;
    assert_eq!(fx.recorder.opened(), vec!["a"]);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.cursor, 0);
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(fx.recorder.opened(), vec!["a", "a"]);
    assert_eq!(started(&fx.drain()), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn repeat_queue_wraps_to_first_track() {
    let fx = Fixture::new(SessionSettings::default());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b"]), None)
        .await
        .unwrap();
    session.set_repeat_mode(RepeatMode::Queue).await.unwrap();

    fx.recorder.signals_at(0).ended();
    settle(&session).await;
    fx.recorder.signals_at(1).ended();

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.cursor, 0);
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(fx.recorder.opened(), vec!["a", "b", "a"]);
}

#[tokio::test(start_paused = true)]
async fn pipeline_error_reports_and_advances() {
    let mut fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b"]), None)
        .await
        .unwrap();
    fx.drain();

    fx.recorder.last_signals().failed("stream roto");
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert!(!snapshot.pipeline_attached);

    let kinds = fx.drain();
    assert!(matches!(
        &kinds[..],
        [QueueEventKind::Error { track: Some(t), message }] if t.id() == "a" && message == "stream roto"
    ));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.current().map(|t| t.id()), Some("b"));
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(ids(&snapshot.history), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn acquisition_failure_skips_to_next_track() {
    let mut fx = Fixture::new(sticky_settings());
    fx.recorder.fail_open.lock().insert("a".to_string());
    let session = fx.session(1);

    let receipt = session
        .enqueue_and_start(tracks(&["a", "b"]), None)
        .await
        .unwrap();
    assert_eq!(receipt.snapshot.state, PlaybackState::Idle);
    assert!(fx
        .drain()
        .iter()
        .any(|kind| matches!(kind, QueueEventKind::Error { .. })));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.current().map(|t| t.id()), Some("b"));
    assert_eq!(fx.recorder.opened(), vec!["b"]);
}

#[tokio::test(start_paused = true)]
async fn stale_end_signal_is_ignored() {
    let fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b", "c"]), None)
        .await
        .unwrap();
    let first = fx.recorder.signals_at(0);

    session.skip().await.unwrap();
    first.ended();
    first.failed("tarde");

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.cursor, 1);
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(fx.recorder.opened(), vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn skip_past_last_track_stops() {
    let mut fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a"]), None)
        .await
        .unwrap();
    fx.drain();

    let snapshot = session.skip().await.unwrap();
    assert!(snapshot.tracks.is_empty());
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert_eq!(fx.drain(), vec![QueueEventKind::Stopped]);
}

#[tokio::test(start_paused = true)]
async fn removing_a_failed_track_keeps_the_next_one() {
    let fx = Fixture::new(sticky_settings());
    fx.recorder.fail_open.lock().insert("a".to_string());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b", "c"]), None)
        .await
        .unwrap();

    // The skip scheduled for the failed track must not outlive it
    let snapshot = session.remove(0).await.unwrap();
    assert_eq!(ids(&snapshot.tracks), vec!["b", "c"]);
    assert_eq!(snapshot.current().map(|t| t.id()), Some("b"));
    assert_eq!(snapshot.state, PlaybackState::Playing);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.cursor, 0);
    assert_eq!(snapshot.current().map(|t| t.id()), Some("b"));
    assert!(snapshot.history.is_empty());
    assert_eq!(fx.recorder.opened(), vec!["b"]);
}

#[tokio::test(start_paused = true)]
async fn removing_current_track_of_a_stopped_queue_stays_idle() {
    let fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session.enqueue(tracks(&["a", "b"]), None).await.unwrap();

    let snapshot = session.remove(0).await.unwrap();
    assert_eq!(ids(&snapshot.tracks), vec!["b"]);
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert!(fx.recorder.opened().is_empty());
}

#[tokio::test(start_paused = true)]
async fn one_track_playlist_is_announced_as_a_playlist() {
    let mut fx = Fixture::new(sticky_settings());
    let session = fx.session(1);

    let receipt = session
        .enqueue_playlist(vec![track("a", 30)], None)
        .await
        .unwrap();
    assert!(receipt.playlist);
    assert_eq!(receipt.snapshot.state, PlaybackState::Playing);

    let kinds = fx.drain();
    assert_eq!(
        &kinds[..2],
        &[
            QueueEventKind::QueueCreated,
            QueueEventKind::PlaylistAdded {
                count: 1,
                first_position: 0
            }
        ]
    );
    assert!(!kinds
        .iter()
        .any(|kind| matches!(kind, QueueEventKind::TrackAdded { .. })));
}

#[tokio::test(start_paused = true)]
async fn each_pipeline_gets_a_newer_generation() {
    let fx = Fixture::new(sticky_settings());
    let session = fx.session(1);
    session
        .enqueue_and_start(tracks(&["a", "b"]), None)
        .await
        .unwrap();
    session.skip().await.unwrap();

    let first = fx.recorder.signals_at(0).generation();
    let second = fx.recorder.signals_at(1).generation();
    assert!(second > first);
}
