mod common;

use common::{text, wait_until, ChannelSpeech, Heard, ScriptedClassifier, Verdict};
use mic_sentiment::kernel::controller::{LifecycleController, LoopSettings};
use mic_sentiment::kernel::listener::{extract_sentiment, Pipeline};
use mic_sentiment::kernel::reading::ReadingCache;
use mic_sentiment::kernel::state::LoopPhase;
use mic_sentiment::kernel::time::ManualClock;
use mic_sentiment::SensorError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const FAST_BACKOFF: Duration = Duration::from_millis(10);

struct Rig {
    controller: LifecycleController,
    speech: Arc<ChannelSpeech>,
    mic: tokio::sync::mpsc::UnboundedSender<Heard>,
    classifier: Arc<ScriptedClassifier>,
}

fn rig_with(classifier: ScriptedClassifier, cache: ReadingCache) -> Rig {
    let (speech, mic) = ChannelSpeech::new();
    let speech = Arc::new(speech);
    let classifier = Arc::new(classifier);

    let controller = LifecycleController::with_settings(cache, LoopSettings { backoff: FAST_BACKOFF });
    controller.bind(Pipeline::new(speech.clone(), classifier.clone()));

    Rig {
        controller,
        speech,
        mic,
        classifier,
    }
}

fn rig(classifier: ScriptedClassifier) -> Rig {
    rig_with(classifier, ReadingCache::default())
}

#[tokio::test]
async fn test_end_to_end_heard_utterance_becomes_reading() {
    let rig = rig(ScriptedClassifier::new(vec![Verdict::Respond(json!({"sentiment": "positive"}))]));
    rig.controller.start().unwrap();

    rig.mic.send(text("I am happy")).unwrap();
    assert!(wait_until(|| rig.controller.stats().readings_stored == 1).await);

    let latest = rig.controller.get_latest();
    assert_eq!(latest.text_heard, "I am happy");
    assert_eq!(latest.sentiment, "positive");
    assert!(latest.is_listening);
    assert_eq!(*rig.classifier.seen.lock().unwrap(), vec!["I am happy".to_string()]);

    rig.controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_twice_runs_one_loop() {
    let rig = rig(ScriptedClassifier::positive());
    rig.controller.start().unwrap();
    rig.controller.start().unwrap();

    assert!(wait_until(|| rig.speech.calls() == 1).await);
    rig.mic.send(text("once")).unwrap();
    assert!(wait_until(|| rig.controller.stats().readings_stored == 1).await);

    // Give a hypothetical second loop time to show itself
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(rig.classifier.calls(), 1);
    assert_eq!(rig.speech.calls(), 2, "one loop: one listen per iteration");
    assert_eq!(rig.controller.stats().loops_started, 1);

    rig.controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_classifier_failure_does_not_end_the_loop() {
    let rig = rig(ScriptedClassifier::new(vec![
        Verdict::Fail("sentiment service unavailable".to_string()),
        Verdict::Respond(json!({"sentiment": "negative"})),
    ]));
    rig.controller.start().unwrap();

    rig.mic.send(text("first try")).unwrap();
    assert!(wait_until(|| rig.controller.stats().classify_faults == 1).await);
    assert!(rig.controller.is_listening());
    assert!(!rig.controller.state().cache.has_reading(), "failed utterance is dropped");

    rig.mic.send(text("second try")).unwrap();
    assert!(wait_until(|| rig.controller.stats().readings_stored == 1).await);

    let latest = rig.controller.get_latest();
    assert_eq!(latest.text_heard, "second try");
    assert_eq!(latest.sentiment, "negative");

    rig.controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_speech_failure_backs_off_and_retries() {
    let rig = rig(ScriptedClassifier::positive());
    rig.controller.start().unwrap();

    rig.mic.send(Heard::Fail("device unplugged".to_string())).unwrap();
    rig.mic.send(text("back again")).unwrap();

    assert!(wait_until(|| rig.controller.stats().readings_stored == 1).await);
    let stats = rig.controller.stats();
    assert_eq!(stats.listen_faults, 1);
    assert_eq!(rig.controller.get_latest().text_heard, "back again");

    rig.controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_blank_utterance_is_skipped_without_touching_the_reading() {
    let clock = Arc::new(ManualClock::default());
    let rig = rig_with(
        ScriptedClassifier::positive(),
        ReadingCache::with_clock(Duration::from_secs(20), clock.clone()),
    );
    rig.controller.start().unwrap();

    rig.mic.send(text("hello there")).unwrap();
    assert!(wait_until(|| rig.controller.stats().readings_stored == 1).await);
    let before = rig.controller.state().cache.read().unwrap();

    clock.advance(Duration::from_secs(5));
    rig.mic.send(text("")).unwrap();
    rig.mic.send(text("   \t")).unwrap();
    assert!(wait_until(|| rig.controller.stats().silences_skipped == 2).await);

    let after = rig.controller.state().cache.read().unwrap();
    assert_eq!(after, before, "skip must not rewrite the reading or its timestamp");
    assert_eq!(rig.classifier.calls(), 1, "blank text is never classified");

    rig.controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_sentiment_field_becomes_unknown() {
    let rig = rig(ScriptedClassifier::new(vec![Verdict::Respond(json!({"score": 0.2}))]));
    rig.controller.start().unwrap();

    rig.mic.send(text("hmm")).unwrap();
    assert!(wait_until(|| rig.controller.stats().readings_stored == 1).await);
    assert_eq!(rig.controller.get_latest().sentiment, "Unknown");

    rig.controller.shutdown().await.unwrap();
}

#[test]
fn test_extract_sentiment_shapes() {
    let map = |v: serde_json::Value| v.as_object().cloned().unwrap();
    assert_eq!(extract_sentiment(&map(json!({"sentiment": "negative"}))), "negative");
    assert_eq!(extract_sentiment(&map(json!({}))), "Unknown");
    assert_eq!(extract_sentiment(&map(json!({"sentiment": null}))), "Unknown");
    assert_eq!(extract_sentiment(&map(json!({"sentiment": 3}))), "3");
}

#[tokio::test]
async fn test_stop_is_visible_immediately_and_interrupts_listen() {
    let rig = rig(ScriptedClassifier::positive());
    rig.controller.start().unwrap();
    assert!(wait_until(|| rig.speech.calls() == 1).await, "loop should be parked in listen");

    rig.controller.stop();
    assert!(!rig.controller.is_listening());
    assert!(!rig.controller.status().is_listening);
    assert_ne!(rig.controller.phase(), LoopPhase::Running);

    rig.controller.shutdown().await.unwrap();
    assert_eq!(rig.controller.phase(), LoopPhase::Stopped);
    assert_eq!(rig.controller.stats().loops_cancelled, 1);
}

#[tokio::test]
async fn test_cancel_during_classify_writes_nothing() {
    let rig = rig(ScriptedClassifier::new(vec![Verdict::Hang]));
    rig.controller.start().unwrap();

    rig.mic.send(text("never finished")).unwrap();
    assert!(wait_until(|| rig.classifier.calls() == 1).await);

    rig.controller.shutdown().await.unwrap();
    assert!(!rig.controller.state().cache.has_reading());
    assert_eq!(rig.controller.stats().readings_stored, 0);
}

#[tokio::test]
async fn test_restart_after_stop_keeps_new_loop_alive() {
    let rig = rig(ScriptedClassifier::positive());
    rig.controller.start().unwrap();
    assert!(wait_until(|| rig.speech.calls() == 1).await);

    // Stop and immediately start again, without waiting for the old task
    rig.controller.stop();
    rig.controller.start().unwrap();
    assert!(rig.controller.is_listening());

    // The old run winding down must not clear the new run's flag
    assert!(wait_until(|| rig.controller.stats().loops_cancelled == 1).await);
    assert!(rig.controller.is_listening());
    assert_eq!(rig.controller.phase(), LoopPhase::Running);

    rig.mic.send(text("still here")).unwrap();
    assert!(wait_until(|| rig.controller.stats().readings_stored == 1).await);
    assert_eq!(rig.controller.stats().loops_started, 2);

    rig.controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_runs_stopped_earlier() {
    let rig = rig(ScriptedClassifier::positive());
    rig.controller.start().unwrap();
    assert!(wait_until(|| rig.speech.calls() == 1).await);

    rig.controller.stop();
    rig.controller.start().unwrap();
    rig.controller.shutdown().await.unwrap();

    // Both runs have exited by the time shutdown returns
    let stats = rig.controller.stats();
    assert_eq!(stats.loops_started, 2);
    assert_eq!(stats.loops_cancelled, 2);
    assert_eq!(rig.controller.phase(), LoopPhase::Stopped);
}

#[tokio::test]
async fn test_start_racing_rebind_never_uses_old_services() {
    let rig = rig(ScriptedClassifier::positive());
    rig.controller.start().unwrap();
    assert!(wait_until(|| rig.speech.calls() == 1).await);

    let (speech, mic) = ChannelSpeech::new();
    let speech = Arc::new(speech);
    let pipeline = Pipeline::new(speech.clone(), rig.classifier.clone());

    // join! polls the rebind first, so the start lands while it is awaiting
    // the old loop
    let (rebound, raced) = tokio::join!(rig.controller.rebind(pipeline), async { rig.controller.start() });
    rebound.unwrap();
    assert!(matches!(raced, Err(SensorError::NotConfigured)));
    assert!(!rig.controller.is_listening());

    rig.controller.start().unwrap();
    rig.mic.send(text("old")).unwrap();
    mic.send(text("new")).unwrap();
    assert!(wait_until(|| rig.controller.stats().readings_stored == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(rig.controller.get_latest().text_heard, "new");
    assert_eq!(rig.speech.calls(), 1);

    rig.controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_panic_in_speech_source_stops_loop_and_clears_flag() {
    let rig = rig(ScriptedClassifier::positive());
    rig.controller.start().unwrap();

    rig.mic.send(Heard::Panic).unwrap();
    assert!(wait_until(|| rig.controller.phase() == LoopPhase::Stopped).await);
    assert!(!rig.controller.is_listening());
    assert_eq!(rig.controller.stats().loops_fatal, 1);

    // Not automatically restarted, but a start recovers it
    rig.controller.start().unwrap();
    rig.mic.send(text("recovered")).unwrap();
    assert!(wait_until(|| rig.controller.stats().readings_stored == 1).await);
    assert_eq!(rig.controller.get_latest().text_heard, "recovered");

    rig.controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_reports_panicked_loop() {
    let rig = rig(ScriptedClassifier::positive());
    rig.controller.start().unwrap();

    rig.mic.send(Heard::Panic).unwrap();
    assert!(wait_until(|| rig.controller.phase() == LoopPhase::Stopped).await);

    let result = rig.controller.shutdown().await;
    assert!(matches!(result, Err(SensorError::LoopJoin(_))));
}

#[tokio::test]
async fn test_start_without_services_is_rejected() {
    let controller = LifecycleController::new(ReadingCache::default());
    assert!(matches!(controller.start(), Err(SensorError::NotConfigured)));
    assert!(!controller.is_listening());
    assert_eq!(controller.phase(), LoopPhase::NotStarted);
}

#[tokio::test]
async fn test_default_reading_when_nothing_heard() {
    let rig = rig(ScriptedClassifier::positive());
    let latest = rig.controller.get_latest();
    assert_eq!(latest.text_heard, "");
    assert_eq!(latest.sentiment, "None");
    assert!(!latest.is_listening);
}
