use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{
    process_one_submission, process_pending_submissions, process_timeout_submissions,
    GradingPipeline, SubmissionOutcome,
};
use crate::db::types::{SubmissionStatus, UserRole};
use crate::test_support::{self, error_record, progress_record, TestContext};

fn pipeline(ctx: &TestContext) -> GradingPipeline {
    GradingPipeline::new(&ctx.settings, &ctx.backends)
}

#[tokio::test]
async fn submitted_homework_is_graded_end_to_end() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 3);
    ctx.repos.add_user("student-1", UserRole::Student, 0);
    let homework = ctx.repos.add_homework("teacher-1");

    let submitted = ctx
        .services
        .homeworks
        .submit_homework("student-1", &homework.id, vec!["https://img/page-1.png".into()])
        .await
        .expect("submit");
    assert_eq!(submitted.status, SubmissionStatus::Initialized);

    let completed = process_pending_submissions(&pipeline(&ctx), &CancellationToken::new())
        .await
        .expect("tick");
    assert_eq!(completed, 1);

    let graded = ctx.repos.submission(&submitted.id).expect("submission");
    assert_eq!(graded.status, SubmissionStatus::Completed);
    assert_eq!(graded.grade_result.as_deref(), Some("27"));
    assert_eq!(graded.title.as_deref(), Some("My summer"));
    assert!(graded.response.is_some());
    assert!(graded.message.is_none());
    assert!(graded.updated_at > submitted.updated_at);
    assert_eq!(ctx.repos.user("teacher-1").expect("teacher").grading_quota, 2);

    let requests = ctx.grading.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].grade, Some(homework.grade));
    assert_eq!(requests[0].total_score, Some(homework.total_score));
    assert_eq!(requests[0].content, "It was hot and we went to the lake.");
}

#[tokio::test]
async fn teacher_without_quota_fails_before_ocr() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 0);
    let homework = ctx.repos.add_homework("teacher-1");
    let submission = ctx.repos.add_submission(&homework, "student-1", test_support::minutes_ago(1));

    let outcome = process_one_submission(&pipeline(&ctx), &submission.id, &CancellationToken::new())
        .await
        .expect("process");

    assert_eq!(outcome, SubmissionOutcome::Failed);
    let failed = ctx.repos.submission(&submission.id).expect("submission");
    assert_eq!(failed.status, SubmissionStatus::Failed);
    assert_eq!(failed.message.as_deref(), Some("Teacher has no gradings left"));
    assert_eq!(ctx.ocr.calls(), 0);
}

#[tokio::test]
async fn ocr_failure_is_terminal_and_free() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 2);
    let homework = ctx.repos.add_homework("teacher-1");
    let submission = ctx.repos.add_submission(&homework, "student-1", test_support::minutes_ago(1));
    ctx.ocr.fail("image unreadable");

    let outcome = process_one_submission(&pipeline(&ctx), &submission.id, &CancellationToken::new())
        .await
        .expect("process");

    assert_eq!(outcome, SubmissionOutcome::Failed);
    let failed = ctx.repos.submission(&submission.id).expect("submission");
    assert_eq!(failed.status, SubmissionStatus::Failed);
    assert!(failed.message.as_deref().is_some_and(|m| m.contains("image unreadable")));
    assert!(failed.response.is_none());
    assert_eq!(ctx.repos.user("teacher-1").expect("teacher").grading_quota, 2);
    assert!(ctx.grading.requests().is_empty());
}

#[tokio::test]
async fn remote_error_and_empty_stream_fail_with_distinct_messages() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 5);
    let homework = ctx.repos.add_homework("teacher-1");

    ctx.grading.set_records(vec![progress_record("essay_info"), error_record("model overloaded")]);
    let remote = ctx.repos.add_submission(&homework, "student-1", test_support::minutes_ago(2));
    process_one_submission(&pipeline(&ctx), &remote.id, &CancellationToken::new())
        .await
        .expect("process");

    ctx.grading.set_records(vec![progress_record("essay_info")]);
    let empty = ctx.repos.add_submission(&homework, "student-2", test_support::minutes_ago(1));
    process_one_submission(&pipeline(&ctx), &empty.id, &CancellationToken::new())
        .await
        .expect("process");

    let remote = ctx.repos.submission(&remote.id).expect("remote");
    let empty = ctx.repos.submission(&empty.id).expect("empty");
    assert_eq!(remote.status, SubmissionStatus::Failed);
    assert_eq!(empty.status, SubmissionStatus::Failed);
    assert!(remote.message.as_deref().is_some_and(|m| m.contains("model overloaded")));
    assert!(empty.message.as_deref().is_some_and(|m| m.contains("without a result")));
    assert_eq!(ctx.repos.user("teacher-1").expect("teacher").grading_quota, 5);
}

#[tokio::test]
async fn one_failure_does_not_block_the_batch() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("broke-teacher", UserRole::Teacher, 0);
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 1);
    let unpaid = ctx.repos.add_homework("broke-teacher");
    let paid = ctx.repos.add_homework("teacher-1");
    let first = ctx.repos.add_submission(&unpaid, "student-1", test_support::minutes_ago(3));
    let second = ctx.repos.add_submission(&paid, "student-2", test_support::minutes_ago(2));

    let completed = process_pending_submissions(&pipeline(&ctx), &CancellationToken::new())
        .await
        .expect("tick");

    assert_eq!(completed, 1);
    assert_eq!(ctx.repos.submission(&first.id).expect("first").status, SubmissionStatus::Failed);
    assert_eq!(
        ctx.repos.submission(&second.id).expect("second").status,
        SubmissionStatus::Completed
    );
}

#[tokio::test]
async fn submission_claimed_elsewhere_is_skipped() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 1);
    let homework = ctx.repos.add_homework("teacher-1");
    let submission = ctx.repos.add_submission(&homework, "student-1", test_support::minutes_ago(1));
    ctx.store
        .overwrite(
            &format!("grading:submission:{}", submission.id),
            "other-poller",
            Duration::from_secs(60),
        )
        .await;

    let outcome = process_one_submission(&pipeline(&ctx), &submission.id, &CancellationToken::new())
        .await
        .expect("process");

    assert_eq!(outcome, SubmissionOutcome::Skipped);
    assert_eq!(
        ctx.repos.submission(&submission.id).expect("submission").status,
        SubmissionStatus::Initialized
    );
    assert_eq!(ctx.ocr.calls(), 0);
}

#[tokio::test]
async fn grading_continues_when_claims_are_unavailable() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 1);
    let homework = ctx.repos.add_homework("teacher-1");
    let submission = ctx.repos.add_submission(&homework, "student-1", test_support::minutes_ago(1));
    ctx.store.fail_requests(true);

    let outcome = process_one_submission(&pipeline(&ctx), &submission.id, &CancellationToken::new())
        .await
        .expect("process");

    assert_eq!(outcome, SubmissionOutcome::Completed);
}

#[tokio::test]
async fn already_processed_submission_is_not_graded_twice() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 5);
    let homework = ctx.repos.add_homework("teacher-1");
    let submission = ctx.repos.add_submission(&homework, "student-1", test_support::minutes_ago(1));
    let pipeline = pipeline(&ctx);

    let first = process_one_submission(&pipeline, &submission.id, &CancellationToken::new())
        .await
        .expect("first");
    let second = process_one_submission(&pipeline, &submission.id, &CancellationToken::new())
        .await
        .expect("second");

    assert_eq!(first, SubmissionOutcome::Completed);
    assert_eq!(second, SubmissionOutcome::Skipped);
    assert_eq!(ctx.repos.user("teacher-1").expect("teacher").grading_quota, 4);
}

#[tokio::test]
async fn timeout_pass_resets_only_stale_gradings_once() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 5);
    let homework = ctx.repos.add_homework("teacher-1");

    let mut stale = ctx.repos.add_submission(&homework, "student-1", test_support::minutes_ago(40));
    stale.begin_grading(test_support::minutes_ago(30)).expect("grading");
    ctx.repos.put_submission(stale.clone());

    let mut fresh = ctx.repos.add_submission(&homework, "student-2", test_support::minutes_ago(10));
    fresh.begin_grading(test_support::minutes_ago(5)).expect("grading");
    ctx.repos.put_submission(fresh.clone());

    let pipeline = pipeline(&ctx);
    assert_eq!(process_timeout_submissions(&pipeline).await.expect("first pass"), 1);
    assert_eq!(process_timeout_submissions(&pipeline).await.expect("second pass"), 0);

    let stale = ctx.repos.submission(&stale.id).expect("stale");
    assert_eq!(stale.status, SubmissionStatus::Initialized);
    assert!(stale.updated_at > test_support::minutes_ago(1));
    assert_eq!(ctx.repos.submission(&fresh.id).expect("fresh").status, SubmissionStatus::Grading);
}

#[tokio::test]
async fn storage_outage_skips_the_submission_and_keeps_the_batch_alive() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 5);
    let homework = ctx.repos.add_homework("teacher-1");
    let submission = ctx.repos.add_submission(&homework, "student-1", test_support::minutes_ago(1));
    ctx.repos.fail_submission_updates(true);

    let completed = process_pending_submissions(&pipeline(&ctx), &CancellationToken::new())
        .await
        .expect("tick");

    assert_eq!(completed, 0);
    assert_eq!(
        ctx.repos.submission(&submission.id).expect("submission").status,
        SubmissionStatus::Initialized
    );
    assert_eq!(ctx.ocr.calls(), 0);
    assert_eq!(ctx.store.value(&format!("grading:submission:{}", submission.id)).await, None);
}

#[tokio::test]
async fn failed_result_write_ends_in_failed() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 5);
    let homework = ctx.repos.add_homework("teacher-1");
    let submission = ctx.repos.add_submission(&homework, "student-1", test_support::minutes_ago(1));
    ctx.repos.fail_next_completion_write();

    let outcome = process_one_submission(&pipeline(&ctx), &submission.id, &CancellationToken::new())
        .await
        .expect("process");

    assert_eq!(outcome, SubmissionOutcome::Failed);
    let failed = ctx.repos.submission(&submission.id).expect("submission");
    assert_eq!(failed.status, SubmissionStatus::Failed);
    assert_eq!(failed.message.as_deref(), Some("Failed to store grading result"));
    assert!(failed.grade_result.is_none());
    // Quota is charged before the final write and stays charged.
    assert_eq!(ctx.repos.user("teacher-1").expect("teacher").grading_quota, 4);
    assert_eq!(ctx.store.value(&format!("grading:submission:{}", submission.id)).await, None);
}

#[tokio::test]
async fn grading_transport_failure_is_terminal_and_free() {
    let ctx = TestContext::new().await;
    ctx.repos.add_user("teacher-1", UserRole::Teacher, 5);
    let homework = ctx.repos.add_homework("teacher-1");
    let submission = ctx.repos.add_submission(&homework, "student-1", test_support::minutes_ago(1));
    ctx.grading.fail("connection reset by peer");

    let outcome = process_one_submission(&pipeline(&ctx), &submission.id, &CancellationToken::new())
        .await
        .expect("process");

    assert_eq!(outcome, SubmissionOutcome::Failed);
    let failed = ctx.repos.submission(&submission.id).expect("submission");
    assert_eq!(failed.status, SubmissionStatus::Failed);
    let message = failed.message.as_deref().unwrap_or_default();
    assert!(message.contains("connection reset by peer"), "message: {message}");
    assert!(!message.contains("without a result"), "message: {message}");
    assert_eq!(ctx.repos.user("teacher-1").expect("teacher").grading_quota, 5);
}
