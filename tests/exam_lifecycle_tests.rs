// tests/exam_lifecycle_tests.rs

use std::sync::Arc;
use std::time::Duration;

use exam_engine::ExamError;
use exam_engine::blob::MemoryBlobStorage;
use exam_engine::config::ExamConfig;
use exam_engine::lock::MemoryLockStore;
use exam_engine::models::attempt::{Answer, AttemptState};
use exam_engine::models::certificate::Certificate;
use exam_engine::models::course::CourseExam;
use exam_engine::models::question::Question;
use exam_engine::models::user::Learner;
use exam_engine::notify::LogNotifier;
use exam_engine::services::certificate::CertificateIssuer;
use exam_engine::services::session::ExamSessionManager;
use exam_engine::store::ExamStore;
use exam_engine::store::memory::MemoryStore;

const USER: i64 = 7;
const COURSE: i64 = 3;

struct Harness {
    manager: ExamSessionManager,
    store: Arc<MemoryStore>,
    blob: Arc<MemoryBlobStorage>,
    issuer: Arc<CertificateIssuer>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Builds the engine on the in-process store with one enrolled learner
/// and a 4-question exam (correct option is always index 1, pass score
/// 60). Must run inside a Tokio runtime: constructing the manager
/// spawns the certificate pipeline worker.
fn harness_with(duration_minutes: i64, config: ExamConfig) -> Harness {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    store.seed_course(CourseExam {
        id: COURSE,
        title: "Systems Programming in Rust".to_string(),
        exam_duration_minutes: duration_minutes,
        exam_pass_score: 60,
    });
    store.seed_learner(Learner {
        id: USER,
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
    });
    store.enroll(USER, COURSE);
    for i in 1..=4 {
        store.seed_question(Question {
            id: i,
            course_id: COURSE,
            question_number: i as i32,
            text: format!("Question {}", i),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option: 1,
        });
    }

    let lock = Arc::new(MemoryLockStore::new());
    let blob = Arc::new(MemoryBlobStorage::new());
    let issuer = Arc::new(CertificateIssuer::new(
        store.clone(),
        blob.clone(),
        Arc::new(LogNotifier::new()),
        config.clone(),
    ));
    let manager = ExamSessionManager::new(store.clone(), lock, issuer.clone(), config);

    Harness {
        manager,
        store,
        blob,
        issuer,
    }
}

fn harness(duration_minutes: i64) -> Harness {
    harness_with(
        duration_minutes,
        ExamConfig {
            certificate_retry_delay_ms: 20,
            ..ExamConfig::default()
        },
    )
}

fn answer(question_id: i64, choice_index: i32) -> Answer {
    Answer {
        question_id,
        choice_index,
    }
}

/// 3 correct, 1 wrong: score 75 against a pass score of 60.
fn passing_answers() -> Vec<Answer> {
    vec![answer(1, 1), answer(2, 1), answer(3, 1), answer(4, 0)]
}

async fn wait_for_pdf(store: &MemoryStore) -> Certificate {
    for _ in 0..100 {
        if let Some(cert) = store.find_certificate(USER, COURSE).await.unwrap() {
            if cert.pdf_url.is_some() {
                return cert;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("certificate document was never rendered");
}

#[tokio::test]
async fn passing_submission_scores_and_issues_certificate() {
    let h = harness(30);

    let started = h.manager.start(USER, COURSE).await.unwrap();
    let receipt = h
        .manager
        .submit(USER, COURSE, started.attempt_id, passing_answers())
        .await
        .unwrap();

    assert_eq!(receipt.score, 75);
    assert!(receipt.passed);
    assert_eq!(receipt.correct_count, 3);
    assert_eq!(receipt.total_questions, 4);
    assert!(!receipt.flagged);

    let summary = receipt.certificate.expect("certificate should be issued");
    assert!(summary.certificate_number.starts_with("CERT-"));

    // The document is rendered off the request path and shows up
    // eventually.
    let cert = wait_for_pdf(&h.store).await;
    let pdf_url = cert.pdf_url.unwrap();
    assert!(pdf_url.ends_with(".pdf"));

    let path = format!(
        "certificates/certificate_{}_{}.pdf",
        cert.id, cert.certificate_number
    );
    let bytes = h.blob.object(&path).expect("uploaded certificate document");
    assert!(bytes.starts_with(b"%PDF"));

    let attempt = h.store.find_attempt(started.attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.state, AttemptState::Completed);
    assert!(attempt.duration_seconds.is_some());
}

#[tokio::test]
async fn failing_submission_issues_no_certificate() {
    let h = harness(30);

    let started = h.manager.start(USER, COURSE).await.unwrap();
    let receipt = h
        .manager
        .submit(USER, COURSE, started.attempt_id, vec![answer(1, 0)])
        .await
        .unwrap();

    assert_eq!(receipt.score, 0);
    assert!(!receipt.passed);
    assert!(receipt.certificate.is_none());
    assert!(h.store.find_certificate(USER, COURSE).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_starts_yield_exactly_one_attempt() {
    let h = harness(30);

    let (a, b) = tokio::join!(h.manager.start(USER, COURSE), h.manager.start(USER, COURSE));

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let failure = if a.is_err() { a } else { b };
    assert!(matches!(failure, Err(ExamError::AlreadyInProgress)));

    // Exactly one PENDING row exists for the pair.
    let attempts = h.store.recent_attempts(USER, COURSE, 10).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].state, AttemptState::Pending);
}

#[tokio::test]
async fn start_while_in_progress_is_rejected() {
    let h = harness(30);

    h.manager.start(USER, COURSE).await.unwrap();
    let second = h.manager.start(USER, COURSE).await;
    assert!(matches!(second, Err(ExamError::AlreadyInProgress)));
}

#[tokio::test]
async fn duplicate_submit_is_rejected_and_never_double_issues() {
    let h = harness(30);

    let started = h.manager.start(USER, COURSE).await.unwrap();
    let receipt = h
        .manager
        .submit(USER, COURSE, started.attempt_id, passing_answers())
        .await
        .unwrap();
    let first_number = receipt.certificate.unwrap().certificate_number;

    // Replayed retry: the session is gone, so the attempt cannot be
    // re-scored.
    let replay = h
        .manager
        .submit(USER, COURSE, started.attempt_id, passing_answers())
        .await;
    assert!(matches!(replay, Err(ExamError::Forbidden(_))));

    // A whole second passing attempt reuses the existing certificate.
    let second = h.manager.start(USER, COURSE).await.unwrap();
    let receipt = h
        .manager
        .submit(USER, COURSE, second.attempt_id, passing_answers())
        .await
        .unwrap();
    let summary = receipt.certificate.unwrap();
    assert_eq!(summary.certificate_number, first_number);

    let cert = h.store.find_certificate(USER, COURSE).await.unwrap().unwrap();
    assert_eq!(cert.certificate_number, first_number);
}

#[tokio::test]
async fn rapid_retry_is_flagged_but_not_blocked() {
    let h = harness(30);

    let first = h.manager.start(USER, COURSE).await.unwrap();
    h.manager
        .submit(USER, COURSE, first.attempt_id, vec![answer(1, 0)])
        .await
        .unwrap();

    // Restarted seconds after the previous attempt: well under the
    // 5-minute threshold.
    let second = h.manager.start(USER, COURSE).await.unwrap();
    let receipt = h
        .manager
        .submit(USER, COURSE, second.attempt_id, passing_answers())
        .await
        .unwrap();

    assert!(receipt.flagged);
    // The learner's flow is untouched: score stands, certificate issued.
    assert!(receipt.passed);
    assert!(receipt.certificate.is_some());

    let attempt = h.store.find_attempt(second.attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.state, AttemptState::Flagged);
    assert!(h.manager.monitor().is_flagged(USER, COURSE).await.unwrap());
}

#[tokio::test]
async fn spaced_attempts_are_not_flagged() {
    // Threshold of zero seconds: no gap ever counts as rapid.
    let h = harness_with(
        30,
        ExamConfig {
            monitor_threshold_secs: 0,
            certificate_retry_delay_ms: 20,
            ..ExamConfig::default()
        },
    );

    let first = h.manager.start(USER, COURSE).await.unwrap();
    h.manager
        .submit(USER, COURSE, first.attempt_id, vec![answer(1, 0)])
        .await
        .unwrap();

    let second = h.manager.start(USER, COURSE).await.unwrap();
    let receipt = h
        .manager
        .submit(USER, COURSE, second.attempt_id, passing_answers())
        .await
        .unwrap();

    assert!(!receipt.flagged);
    let attempt = h.store.find_attempt(second.attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.state, AttemptState::Completed);
}

#[tokio::test]
async fn time_check_expires_an_overdue_attempt() {
    let h = harness(0);

    let started = h.manager.start(USER, COURSE).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let remaining = h.manager.get_time_remaining(USER, COURSE).await.unwrap();
    assert!(!remaining.active);
    assert_eq!(remaining.remaining_seconds, 0);

    let attempt = h.store.find_attempt(started.attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.state, AttemptState::Expired);
    assert_eq!(attempt.score, Some(0));
    assert_eq!(attempt.passed, Some(false));

    // A later submit against the expired attempt is rejected.
    let late = h
        .manager
        .submit(USER, COURSE, started.attempt_id, passing_answers())
        .await;
    assert!(matches!(late, Err(ExamError::Forbidden(_))));
}

#[tokio::test]
async fn submit_after_the_deadline_is_rejected_as_expired() {
    let h = harness(0);

    let started = h.manager.start(USER, COURSE).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let late = h
        .manager
        .submit(USER, COURSE, started.attempt_id, passing_answers())
        .await;
    assert!(matches!(late, Err(ExamError::Expired)));

    let attempt = h.store.find_attempt(started.attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.state, AttemptState::Expired);
}

#[tokio::test]
async fn restart_reconciles_a_stale_pending_attempt() {
    let h = harness(0);

    let first = h.manager.start(USER, COURSE).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The session still points at the abandoned attempt; starting again
    // force-completes it instead of failing forever.
    let second = h.manager.start(USER, COURSE).await.unwrap();
    assert_ne!(second.attempt_id, first.attempt_id);

    let stale = h.store.find_attempt(first.attempt_id).await.unwrap().unwrap();
    assert_eq!(stale.state, AttemptState::Expired);
    let live = h.store.find_attempt(second.attempt_id).await.unwrap().unwrap();
    assert_eq!(live.state, AttemptState::Pending);
}

#[tokio::test]
async fn submit_with_a_stale_attempt_id_is_rejected() {
    let h = harness(30);

    let started = h.manager.start(USER, COURSE).await.unwrap();
    let wrong = h
        .manager
        .submit(USER, COURSE, started.attempt_id + 999, passing_answers())
        .await;
    assert!(matches!(wrong, Err(ExamError::Forbidden(_))));

    // The real attempt is untouched and still submittable.
    let receipt = h
        .manager
        .submit(USER, COURSE, started.attempt_id, passing_answers())
        .await
        .unwrap();
    assert_eq!(receipt.score, 75);
}

#[tokio::test]
async fn unenrolled_learner_is_forbidden() {
    let h = harness(30);

    let start = h.manager.start(99, COURSE).await;
    assert!(matches!(start, Err(ExamError::Forbidden(_))));
}

#[tokio::test]
async fn missing_course_is_not_found() {
    let h = harness(30);
    h.store.enroll(USER, 42);

    let start = h.manager.start(USER, 42).await;
    assert!(matches!(start, Err(ExamError::NotFound(_))));
}

#[tokio::test]
async fn empty_question_set_scores_zero_without_a_certificate() {
    let h = harness(30);
    h.store.seed_course(CourseExam {
        id: 5,
        title: "Unwritten Course".to_string(),
        exam_duration_minutes: 30,
        exam_pass_score: 0,
    });
    h.store.enroll(USER, 5);

    let started = h.manager.start(USER, 5).await.unwrap();
    let receipt = h
        .manager
        .submit(USER, 5, started.attempt_id, vec![answer(1, 1)])
        .await
        .unwrap();

    assert_eq!(receipt.score, 0);
    assert_eq!(receipt.total_questions, 0);
    assert!(!receipt.passed);
    assert!(receipt.certificate.is_none());
}

#[tokio::test]
async fn time_remaining_reports_the_deadline() {
    let h = harness(30);

    let started = h.manager.start(USER, COURSE).await.unwrap();
    let remaining = h.manager.get_time_remaining(USER, COURSE).await.unwrap();

    assert!(remaining.active);
    assert_eq!(remaining.attempt_id, Some(started.attempt_id));
    assert_eq!(remaining.deadline, Some(started.deadline));
    assert!(remaining.remaining_seconds > 0 && remaining.remaining_seconds <= 30 * 60);
}

#[tokio::test]
async fn exam_paper_withholds_the_answer_key() {
    let h = harness(30);

    let paper = h.manager.exam_paper(USER, COURSE).await.unwrap();
    assert_eq!(paper.course_title, "Systems Programming in Rust");
    assert_eq!(paper.total_questions, 4);
    assert_eq!(paper.pass_score, 60);

    // Questions arrive in order and the serialized form carries no
    // correct option.
    let numbers: Vec<i32> = paper.questions.iter().map(|q| q.question_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    let json = serde_json::to_string(&paper).unwrap();
    assert!(!json.contains("correct_option"));
}

#[tokio::test]
async fn results_and_history_reflect_finished_attempts() {
    let h = harness(30);

    assert!(h.manager.get_results(USER, COURSE).await.unwrap().is_none());

    let first = h.manager.start(USER, COURSE).await.unwrap();
    h.manager
        .submit(USER, COURSE, first.attempt_id, passing_answers())
        .await
        .unwrap();
    let second = h.manager.start(USER, COURSE).await.unwrap();
    h.manager
        .submit(USER, COURSE, second.attempt_id, vec![answer(1, 0)])
        .await
        .unwrap();

    // Results show the latest finished attempt, certificate included.
    let results = h.manager.get_results(USER, COURSE).await.unwrap().unwrap();
    assert_eq!(results.attempt_id, second.attempt_id);
    assert_eq!(results.score, 0);
    assert!(results.certificate.is_some());

    // History is newest first; only the passing attempt carries the
    // certificate.
    let history = h.manager.list_history(USER, Some(COURSE)).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].attempt_id, second.attempt_id);
    assert!(history[0].certificate.is_none());
    assert_eq!(history[1].attempt_id, first.attempt_id);
    assert!(history[1].certificate.is_some());

    let all = h.manager.list_history(USER, None).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn issued_certificates_verify_publicly() {
    let h = harness(30);

    let started = h.manager.start(USER, COURSE).await.unwrap();
    let receipt = h
        .manager
        .submit(USER, COURSE, started.attempt_id, passing_answers())
        .await
        .unwrap();
    let number = receipt.certificate.unwrap().certificate_number;

    let verification = h.issuer.verify(&number).await.unwrap();
    assert!(verification.valid);
    assert_eq!(verification.recipient.as_deref(), Some("Ada Lovelace"));
    assert_eq!(
        verification.course_title.as_deref(),
        Some("Systems Programming in Rust")
    );

    let bogus = h.issuer.verify("CERT-DEADBEEF-00000000").await.unwrap();
    assert!(!bogus.valid);
}

#[tokio::test]
async fn generate_is_idempotent_on_pdf_url() {
    let h = harness(30);

    let started = h.manager.start(USER, COURSE).await.unwrap();
    h.manager
        .submit(USER, COURSE, started.attempt_id, passing_answers())
        .await
        .unwrap();
    let cert = wait_for_pdf(&h.store).await;

    // A redundant delivery leaves the stored URL untouched.
    h.issuer.generate(cert.id).await.unwrap();
    let after = h.store.find_certificate(USER, COURSE).await.unwrap().unwrap();
    assert_eq!(after.pdf_url, cert.pdf_url);
}
