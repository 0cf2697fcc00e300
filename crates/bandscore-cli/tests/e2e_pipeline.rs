//! End-to-end session tests: start, submit and read back through the engine,
//! with scripted scorers standing in for the real backends.

use std::sync::Arc;
use std::time::Duration;

use bandscore_core::adapter::{ScorerAdapter, ScorerBackend};
use bandscore_core::blueprint::{BlueprintCatalog, TaskBlueprint};
use bandscore_core::engine::{EngineConfig, SessionEngine};
use bandscore_core::error::{
    BackendError, DegradationKind, EngineError, StateError, ValidationError,
};
use bandscore_core::model::{AnswerItem, Section, TaskSubmission, TaskType};
use bandscore_core::scale::ScoreScale;
use bandscore_core::session::SessionState;
use bandscore_core::store::MemoryStore;
use bandscore_core::traits::SessionStore;
use bandscore_scorers::{MockReply, MockScorer};

const OWNER: &str = "candidate-7";

struct Harness {
    engine: SessionEngine,
    store: Arc<MemoryStore>,
    scorer: Arc<MockScorer>,
}

fn harness(scorer: MockScorer) -> Harness {
    harness_with_timeout(scorer, Duration::from_secs(30))
}

fn harness_with_timeout(scorer: MockScorer, timeout: Duration) -> Harness {
    let scorer = Arc::new(scorer);
    let store = Arc::new(MemoryStore::new());
    let adapter = ScorerAdapter::new()
        .with_local(scorer.clone())
        .with_timeout(timeout);
    let engine = SessionEngine::new(
        BlueprintCatalog::builtin(),
        Arc::new(adapter),
        store.clone(),
        EngineConfig::default(),
    );
    Harness {
        engine,
        store,
        scorer,
    }
}

/// One submission per slot, each answer tagged `TASK<n>` so the mock can
/// tell them apart.
fn answers_for(blueprint: &TaskBlueprint) -> Vec<TaskSubmission> {
    blueprint
        .slots()
        .iter()
        .map(|slot| {
            TaskSubmission::new(
                slot.ordinal,
                slot.kind().or_task_type(TaskType::Independent),
                vec![AnswerItem::new(
                    u64::from(slot.ordinal) * 100,
                    format!("TASK{} {} answer about daily routines.", slot.ordinal, slot.section),
                )],
            )
        })
        .collect()
}

#[tokio::test]
async fn valid_strict_submission_scores_every_task() {
    let h = harness(MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 6.0));
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    assert_eq!(started.blueprint.len(), 6);

    let answers = answers_for(&started.blueprint);
    let summary = h
        .engine
        .submit_session(started.session_id, OWNER, &answers, None)
        .await
        .unwrap();

    assert_eq!(summary.per_task_feedback.len(), started.blueprint.len());
    assert_eq!(summary.overall_score, 6.0);
    assert_eq!(summary.performance_label, "Competent User (Band 6)");
    assert_eq!(h.scorer.call_count(), 6);

    let session = h.engine.session(started.session_id, OWNER).await.unwrap();
    assert_eq!(session.state, SessionState::Finalized);
    assert_eq!(session.task_results.len(), 6);
    let ordinals: Vec<u32> = session.task_results.iter().map(|r| r.ordinal).collect();
    assert_eq!(ordinals, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn all_perfect_scores_reach_top_label() {
    let h = harness(MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 9.0));
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    let summary = h
        .engine
        .submit_session(started.session_id, OWNER, &answers_for(&started.blueprint), None)
        .await
        .unwrap();

    assert_eq!(summary.overall_score, 9.0);
    assert_eq!(summary.performance_label, started.blueprint.bands().top_label());
    assert_eq!(
        summary.overall_feedback,
        "Overall Score: 9.0/9.0 - Performance Level: Expert User (Band 9)"
    );
}

#[tokio::test]
async fn malformed_output_degrades_only_that_task() {
    let scorer = MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 9.0)
        .on("TASK3", MockReply::Raw("I'd rate this a solid seven".into()));
    let h = harness(scorer);
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    let summary = h
        .engine
        .submit_session(started.session_id, OWNER, &answers_for(&started.blueprint), None)
        .await
        .unwrap();

    assert_eq!(summary.per_task_feedback.len(), 6);
    let task3 = &summary.per_task_feedback[2];
    assert_eq!(task3.ordinal, 3);
    assert_eq!(task3.degradation, Some(DegradationKind::ParseError));
    assert_eq!(task3.native_score, 0.0);
    assert!(task3.feedback[0].starts_with("parse_error"));
    assert_eq!(summary.degraded_tasks().count(), 1);

    // Five perfect tasks and one at the scale minimum: 9 * 5/6 = 7.5.
    assert_eq!(summary.overall_score, 7.5);
    assert_eq!(summary.performance_label, "Very Good User (Band 8)");
}

#[tokio::test]
async fn out_of_range_and_failing_backends_degrade() {
    let scorer = MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 8.0)
        .on("TASK1", MockReply::score(12.0))
        .on(
            "TASK2",
            MockReply::Fail(BackendError::RateLimited {
                retry_after_ms: 1000,
            }),
        )
        .on(
            "TASK4",
            MockReply::Fail(BackendError::MalformedResponse("no candidates".into())),
        );
    let h = harness(scorer);
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    let summary = h
        .engine
        .submit_session(started.session_id, OWNER, &answers_for(&started.blueprint), None)
        .await
        .unwrap();

    let kinds: Vec<_> = summary
        .per_task_feedback
        .iter()
        .map(|f| f.degradation)
        .collect();
    assert_eq!(
        kinds,
        vec![
            Some(DegradationKind::OutOfRange),
            Some(DegradationKind::BackendUnavailable),
            None,
            Some(DegradationKind::ParseError),
            None,
            None,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn hung_backend_times_out() {
    let scorer =
        MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 9.0).on("TASK2", MockReply::Hang);
    let h = harness_with_timeout(scorer, Duration::from_secs(5));
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    let summary = h
        .engine
        .submit_session(started.session_id, OWNER, &answers_for(&started.blueprint), None)
        .await
        .unwrap();

    let task2 = &summary.per_task_feedback[1];
    assert_eq!(task2.degradation, Some(DegradationKind::BackendUnavailable));
    assert!(task2.feedback[0].contains("did not answer within"));
    assert_eq!(summary.degraded_tasks().count(), 1);
    assert_eq!(summary.overall_score, 7.5);
}

#[tokio::test]
async fn practice_flexible_mixed_scores() {
    let scorer = MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 0.0)
        .on("speaking", MockReply::score(9.0));
    let h = harness(scorer);
    let started = h.engine.start_session("practice", OWNER).await.unwrap();
    assert_eq!(started.blueprint.len(), 10);

    // Flexible blueprints accept any order and either task type.
    let mut answers = answers_for(&started.blueprint);
    answers.reverse();
    for answer in answers.iter_mut().step_by(2) {
        answer.task_type = TaskType::Integrated;
    }

    let summary = h
        .engine
        .submit_session(started.session_id, OWNER, &answers, None)
        .await
        .unwrap();

    assert_eq!(summary.per_task_feedback.len(), 10);
    assert_eq!(summary.overall_score, 5.0);
    assert_eq!(summary.reporting_max, 10.0);
    assert_eq!(summary.performance_label, "Fair");
    assert_eq!(summary.degraded_tasks().count(), 0);
    assert_eq!(summary.per_task_feedback[0].task_type, TaskType::Integrated);
    assert_eq!(summary.per_task_feedback[1].task_type, TaskType::Independent);
}

#[tokio::test]
async fn five_point_scale_normalizes_to_reporting_max() {
    let h = harness(MockScorer::with_fixed_score(ScoreScale::ZeroToFive, 5.0));
    let started = h.engine.start_session("classic", OWNER).await.unwrap();
    let summary = h
        .engine
        .submit_session(started.session_id, OWNER, &answers_for(&started.blueprint), None)
        .await
        .unwrap();

    assert!(summary
        .per_task_feedback
        .iter()
        .all(|f| f.normalized_score == 1.0 && f.scale == ScoreScale::ZeroToFive));
    assert_eq!(summary.overall_score, 5.0);
    assert_eq!(summary.performance_label, "Excellent");
    assert_eq!(summary.overall_feedback, "Overall Score: 5/5 - Performance Level: Excellent");
}

#[tokio::test]
async fn wrong_task_count_has_no_side_effects() {
    let h = harness(MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 9.0));
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    let mut answers = answers_for(&started.blueprint);
    answers.truncate(4);

    let err = h
        .engine
        .submit_session(started.session_id, OWNER, &answers, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::TaskCountMismatch {
            expected: 6,
            actual: 4
        })
    ));

    assert_eq!(h.scorer.call_count(), 0);
    assert_eq!(h.store.staged_count(started.session_id), 0);
    let session = h.store.get_session(started.session_id, OWNER).await.unwrap();
    assert_eq!(session.state, SessionState::InProgress);
    assert!(session.task_results.is_empty());
}

#[tokio::test]
async fn wrong_structure_reports_the_slot() {
    let h = harness(MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 9.0));
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    let mut answers = answers_for(&started.blueprint);
    // Slot 4 is speaking/integrated; submit a writing task in its place.
    answers[3].section = Section::Writing;

    let err = h
        .engine
        .submit_session(started.session_id, OWNER, &answers, None)
        .await
        .unwrap_err();
    match err {
        EngineError::Validation(e @ ValidationError::TaskStructureMismatch { .. }) => {
            assert_eq!(e.ordinal(), Some(4));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.scorer.call_count(), 0);
}

#[tokio::test]
async fn second_submit_is_rejected() {
    let h = harness(MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 7.0));
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    let answers = answers_for(&started.blueprint);

    let first = h
        .engine
        .submit_session(started.session_id, OWNER, &answers, None)
        .await
        .unwrap();

    let err = h
        .engine
        .submit_session(started.session_id, OWNER, &answers, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::State(StateError::SessionAlreadyFinalized(id)) if id == started.session_id
    ));

    let session = h.engine.session(started.session_id, OWNER).await.unwrap();
    assert_eq!(session.overall_score, first.overall_score);
    assert_eq!(session.task_results.len(), 6);
    assert_eq!(h.scorer.call_count(), 6);
}

#[tokio::test]
async fn concurrent_submits_have_one_winner() {
    let h = harness(MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 8.0));
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    let answers = answers_for(&started.blueprint);

    let (a, b) = tokio::join!(
        h.engine.submit_session(started.session_id, OWNER, &answers, None),
        h.engine.submit_session(started.session_id, OWNER, &answers, None),
    );

    let (winner, loser) = match (a, b) {
        (Ok(summary), Err(e)) | (Err(e), Ok(summary)) => (summary, e),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert_eq!(winner.overall_score, 8.0);
    assert!(matches!(
        loser,
        EngineError::State(StateError::SessionAlreadyFinalized(_))
    ));

    let session = h.engine.session(started.session_id, OWNER).await.unwrap();
    assert_eq!(session.task_results.len(), 6);
}

#[tokio::test]
async fn session_access_is_owner_scoped() {
    let h = harness(MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 8.0));
    let started = h.engine.start_session("full", OWNER).await.unwrap();

    let err = h
        .engine
        .submit_session(started.session_id, "someone-else", &answers_for(&started.blueprint), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::State(StateError::OwnershipMismatch(_))));

    let err = h
        .engine
        .session(uuid::Uuid::new_v4(), OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::State(StateError::SessionNotFound(_))));
    assert_eq!(h.scorer.call_count(), 0);
}

#[tokio::test]
async fn feedback_blob_is_persisted() {
    let h = harness(MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 4.5));
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    let summary = h
        .engine
        .submit_session(started.session_id, OWNER, &answers_for(&started.blueprint), None)
        .await
        .unwrap();

    let session = h.engine.session(started.session_id, OWNER).await.unwrap();
    let blob = session.feedback.expect("finalized session carries feedback");
    assert_eq!(blob["overall_feedback"], summary.overall_feedback.as_str());
    let detailed = blob["detailed_feedback"].as_array().unwrap();
    assert_eq!(detailed.len(), 6);
    assert_eq!(detailed[0]["section"], "speaking");
    assert_eq!(detailed[0]["question_count"], 1);
    assert_eq!(session.performance_label.as_deref(), Some("Modest User (Band 5)"));
}

#[tokio::test]
async fn unconfigured_remote_degrades_all_tasks() {
    let h = harness(MockScorer::with_fixed_score(ScoreScale::ZeroToNine, 9.0));
    let started = h.engine.start_session("full", OWNER).await.unwrap();
    let summary = h
        .engine
        .submit_session(
            started.session_id,
            OWNER,
            &answers_for(&started.blueprint),
            Some(ScorerBackend::Remote),
        )
        .await
        .unwrap();

    assert_eq!(summary.degraded_tasks().count(), 6);
    assert_eq!(summary.overall_score, 0.0);
    assert_eq!(h.scorer.call_count(), 0);
}
