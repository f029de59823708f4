mod common;

use std::time::Duration;

use common::{drain, notices, TestEnv, NOTES, SOCIAL};
use tapblok::{
    models::{AppId, EndReason, SessionState},
    monitor::{HoldOutcome, Notice, ToggleOutcome, TOGGLE_TOKEN},
    platform::Capability,
    settings::ConfigUpdate,
    MonitorError,
};

#[tokio::test]
async fn blocked_app_raises_overlay_and_counts_each_entry_once() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();

    engine.block_app(SOCIAL).await.unwrap();
    monitor.start().await.unwrap();

    env.foreground.switch_to(SOCIAL);
    let snapshot = monitor.refresh().await.unwrap();
    assert!(snapshot.overlay_visible);
    assert_eq!(snapshot.attempt_count, 1);
    assert!(env.overlay.is_visible());

    // Staying in the app is the same attempt.
    monitor.refresh().await.unwrap();
    let snapshot = monitor.refresh().await.unwrap();
    assert_eq!(snapshot.attempt_count, 1);

    env.foreground.switch_to(NOTES);
    let snapshot = monitor.refresh().await.unwrap();
    assert!(!snapshot.overlay_visible);
    assert!(!env.overlay.is_visible());

    env.foreground.switch_to(SOCIAL);
    let snapshot = monitor.refresh().await.unwrap();
    assert_eq!(snapshot.attempt_count, 2);
    assert_eq!(env.overlay.shows(), 2);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn stop_hides_overlay_and_keeps_count_for_display() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();

    engine.block_app(SOCIAL).await.unwrap();
    monitor.start().await.unwrap();
    env.foreground.switch_to(SOCIAL);
    monitor.refresh().await.unwrap();

    let mut events = monitor.subscribe();
    let snapshot = monitor.stop().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Stopped);
    assert_eq!(snapshot.attempt_count, 1);
    assert!(!snapshot.overlay_visible);
    assert!(!env.overlay.is_visible());

    // Stopped sessions never enforce.
    let snapshot = monitor.refresh().await.unwrap();
    assert!(!snapshot.overlay_visible);

    assert!(notices(&drain(&mut events)).contains(&Notice::MonitoringStopped {
        reason: EndReason::Manual
    }));
    assert!(matches!(monitor.stop().await, Err(MonitorError::NotRunning)));

    let history = engine.recent_sessions(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].end_reason, Some(EndReason::Manual));
    assert_eq!(history[0].attempt_count, 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();

    let first = monitor.start().await.unwrap();
    assert!(matches!(
        monitor.start().await,
        Err(MonitorError::AlreadyActive)
    ));
    assert_eq!(monitor.snapshot().state, first.state);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn toggle_code_requires_code_control_and_matching_token() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();
    let mut events = monitor.subscribe();

    assert!(matches!(
        monitor.toggle_external_code(TOGGLE_TOKEN).await,
        Err(MonitorError::CodeControlDisabled)
    ));

    engine
        .update_config(ConfigUpdate::CodeControlEnabled(true))
        .unwrap();

    assert_eq!(
        monitor.toggle_external_code("").await.unwrap(),
        ToggleOutcome::Ignored
    );
    assert!(drain(&mut events).is_empty());

    // Only an exact match toggles: whitespace and padded codes are wrong codes.
    let padded = format!("  {TOGGLE_TOKEN}\n");
    for token in ["   ", padded.as_str(), "some-other-code"] {
        assert!(matches!(
            monitor.toggle_external_code(token).await,
            Err(MonitorError::RejectedToggle)
        ));
        assert_eq!(notices(&drain(&mut events)), vec![Notice::IncorrectCode]);
    }
    assert_eq!(monitor.snapshot().state, SessionState::Stopped);

    let outcome = monitor.toggle_external_code(TOGGLE_TOKEN).await.unwrap();
    assert!(matches!(outcome, ToggleOutcome::Started(ref snap) if snap.state.is_running()));

    let outcome = monitor.toggle_external_code(TOGGLE_TOKEN).await.unwrap();
    assert!(matches!(outcome, ToggleOutcome::Stopped(ref snap) if !snap.state.is_active()));

    let history = engine.recent_sessions(1).await.unwrap();
    assert_eq!(history[0].end_reason, Some(EndReason::ExternalCode));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn toggle_code_uses_configured_token() {
    let env = TestEnv::new();
    let engine = env
        .open_with(env.options().with_toggle_token("tapblok://desk-tag"))
        .await;
    let monitor = engine.monitor();
    engine
        .update_config(ConfigUpdate::CodeControlEnabled(true))
        .unwrap();

    assert!(matches!(
        monitor.toggle_external_code(TOGGLE_TOKEN).await,
        Err(MonitorError::RejectedToggle)
    ));
    let outcome = monitor
        .toggle_external_code("tapblok://desk-tag")
        .await
        .unwrap();
    assert!(matches!(outcome, ToggleOutcome::Started(_)));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn start_is_refused_without_overlay_permission() {
    let env = TestEnv::new();
    env.overlay.set_permission(false);
    let engine = env.open().await;
    let monitor = engine.monitor();

    assert!(matches!(
        monitor.start().await,
        Err(MonitorError::CapabilityUnavailable(Capability::Overlay))
    ));

    let snapshot = monitor.refresh().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Stopped);
    assert_eq!(snapshot.missing_capabilities, vec![Capability::Overlay]);
    assert!(snapshot.needs_permission());

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn losing_usage_access_mid_session_stops_monitoring() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();

    monitor.start().await.unwrap();
    let mut events = monitor.subscribe();

    env.foreground.set_access(false);
    let snapshot = monitor.refresh().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Stopped);
    assert_eq!(snapshot.missing_capabilities, vec![Capability::UsageAccess]);

    let seen = notices(&drain(&mut events));
    assert!(seen.contains(&Notice::NeedsPermission {
        capability: Capability::UsageAccess
    }));
    assert!(seen.contains(&Notice::MonitoringStopped {
        reason: EndReason::CapabilityLost
    }));

    // Reported once, not on every tick.
    monitor.refresh().await.unwrap();
    assert!(notices(&drain(&mut events)).is_empty());

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn active_session_survives_restart() {
    let env = TestEnv::new();

    let engine = env.open().await;
    engine.block_app(SOCIAL).await.unwrap();
    let started = engine.monitor().start().await.unwrap();
    env.foreground.switch_to(SOCIAL);
    engine.monitor().refresh().await.unwrap();
    engine.shutdown().await.unwrap();

    let engine = env.open().await;
    let monitor = engine.monitor();
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.state, started.state);
    assert_eq!(snapshot.attempt_count, 1);
    assert!(engine.blocked_apps().contains(&AppId::from(SOCIAL)));

    // The block screen comes back up on relaunch; the blocked app that was
    // already covered is not a new attempt.
    assert!(snapshot.overlay_visible);
    let snapshot = monitor.refresh().await.unwrap();
    assert!(snapshot.overlay_visible);
    assert!(env.overlay.is_visible());
    assert_eq!(snapshot.attempt_count, 1);

    env.foreground.switch_to(NOTES);
    monitor.refresh().await.unwrap();
    env.foreground.switch_to(SOCIAL);
    let snapshot = monitor.refresh().await.unwrap();
    assert_eq!(snapshot.attempt_count, 2);

    monitor.stop().await.unwrap();
    let history = engine.recent_sessions(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].attempt_count, 2);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn config_and_blocklist_are_frozen_while_running() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();

    engine
        .update_config(ConfigUpdate::AutoStopMinutes(30))
        .unwrap();
    let snapshot = monitor.start().await.unwrap();
    let deadline = snapshot.session_deadline;
    assert_eq!(deadline, Some(common::start_time() + chrono::Duration::minutes(30)));

    assert!(matches!(
        engine.update_config(ConfigUpdate::AutoStopMinutes(60)),
        Err(MonitorError::ConfigLocked(_))
    ));
    assert!(matches!(
        engine.update_config(ConfigUpdate::BreakMinutes(5)),
        Err(MonitorError::ConfigLocked(_))
    ));
    assert!(matches!(
        engine.block_app(NOTES).await,
        Err(MonitorError::ConfigLocked(_))
    ));

    // Code control is not a session setting.
    engine
        .update_config(ConfigUpdate::CodeControlEnabled(true))
        .unwrap();

    assert_eq!(monitor.snapshot().session_deadline, deadline);
    assert_eq!(engine.config().auto_stop_minutes, 30);
    assert!(engine.blocked_apps().is_empty());

    monitor.stop().await.unwrap();
    engine
        .update_config(ConfigUpdate::AutoStopMinutes(60))
        .unwrap();
    engine.block_app(NOTES).await.unwrap();

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn session_expires_at_deadline() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();

    engine
        .update_config(ConfigUpdate::AutoStopMinutes(30))
        .unwrap();
    engine.block_app(SOCIAL).await.unwrap();
    monitor.start().await.unwrap();

    env.advance_minutes(10);
    let snapshot = monitor.refresh().await.unwrap();
    assert!(snapshot.state.is_running());
    assert_eq!(snapshot.session_remaining_minutes(), Some(20));

    env.advance_minutes(21);
    env.foreground.switch_to(SOCIAL);
    let snapshot = monitor.refresh().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Stopped);
    assert!(!snapshot.overlay_visible);
    assert_eq!(snapshot.attempt_count, 0);

    let history = engine.recent_sessions(1).await.unwrap();
    assert_eq!(history[0].end_reason, Some(EndReason::Expired));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn break_lifts_overlay_until_it_ends() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();

    engine.update_config(ConfigUpdate::BreakMinutes(5)).unwrap();
    engine.block_app(SOCIAL).await.unwrap();
    monitor.start().await.unwrap();

    env.foreground.switch_to(SOCIAL);
    monitor.refresh().await.unwrap();
    assert!(env.overlay.is_visible());

    let mut events = monitor.subscribe();
    let snapshot = monitor.request_break().await.unwrap();
    assert!(snapshot.state.is_on_break());
    assert!(!env.overlay.is_visible());
    assert_eq!(snapshot.break_remaining_ms, Some(5 * 60 * 1000));

    env.advance_minutes(2);
    let snapshot = monitor.refresh().await.unwrap();
    assert!(snapshot.state.is_on_break());
    assert!(!snapshot.overlay_visible);
    assert_eq!(snapshot.attempt_count, 1);

    assert!(matches!(
        monitor.request_break().await,
        Err(MonitorError::NotRunning)
    ));

    env.advance_minutes(4);
    let snapshot = monitor.refresh().await.unwrap();
    assert!(snapshot.state.is_running());
    assert!(snapshot.overlay_visible);
    assert_eq!(snapshot.attempt_count, 2);

    let seen = notices(&drain(&mut events));
    assert!(matches!(seen.first(), Some(Notice::BreakStarted { .. })));
    assert!(seen.contains(&Notice::BreakEnded));

    monitor.stop().await.unwrap();
    let history = engine.recent_sessions(1).await.unwrap();
    assert_eq!(history[0].breaks_taken, 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn break_requires_break_minutes() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();

    monitor.start().await.unwrap();
    assert!(matches!(
        monitor.request_break().await,
        Err(MonitorError::BreaksDisabled)
    ));
    assert!(monitor.snapshot().state.is_running());

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn released_force_stop_leaves_session_running() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();
    monitor.start().await.unwrap();

    let hold = monitor.begin_force_stop();
    tokio::time::advance(Duration::from_secs(54)).await;
    assert!((hold.progress() - 0.9).abs() < 1e-3);

    hold.release();
    assert_eq!(hold.finish().await.unwrap(), HoldOutcome::Released);
    assert!(monitor.snapshot().state.is_running());

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn force_stop_progress_stream_resets_on_release() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();
    monitor.start().await.unwrap();

    let hold = monitor.begin_force_stop();
    let mut updates = hold.progress_updates();

    tokio::time::advance(Duration::from_secs(30)).await;
    let halfway = *updates.wait_for(|progress| *progress >= 0.5).await.unwrap();
    assert!((halfway - 0.5).abs() < 1e-3);

    hold.release();
    let reset = *updates.wait_for(|progress| *progress == 0.0).await.unwrap();
    assert_eq!(reset, 0.0);
    assert_eq!(hold.finish().await.unwrap(), HoldOutcome::Released);
    assert!(monitor.snapshot().state.is_running());

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn completed_force_stop_ends_session() {
    let env = TestEnv::new();
    let engine = env.open().await;
    let monitor = engine.monitor();
    monitor.start().await.unwrap();

    let hold = monitor.begin_force_stop();
    tokio::time::advance(Duration::from_secs(60)).await;

    match hold.finish().await.unwrap() {
        HoldOutcome::Completed(snapshot) => assert_eq!(snapshot.state, SessionState::Stopped),
        HoldOutcome::Released => panic!("hold should have completed"),
    }

    let history = engine.recent_sessions(1).await.unwrap();
    assert_eq!(history[0].end_reason, Some(EndReason::ForceStopped));

    engine.shutdown().await.unwrap();
}
