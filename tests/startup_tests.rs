mod support;

use assert_matches::assert_matches;
use sheet_verifier::flag::DEFAULT_KILL_MESSAGE;
use sheet_verifier::{
    FlagSource, ServiceError, Session, SheetService, StartupOutcome, Verifier, VerifyError,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use support::{FakeFlagSource, FakeSheetService, document};

fn verifier(fake: &Arc<FakeSheetService>, flag: Option<&Arc<FakeFlagSource>>) -> Verifier {
    Verifier::new(
        fake.clone() as Arc<dyn SheetService>,
        flag.map(|f| f.clone() as Arc<dyn FlagSource>),
    )
}

#[tokio::test]
async fn explicit_kill_stops_before_loading() {
    let fake = Arc::new(FakeSheetService::new().with_initial(document()));
    let flag = Arc::new(FakeFlagSource::body(
        r#"{"active": false, "message": "down for maintenance"}"#,
    ));
    let verifier = verifier(&fake, Some(&flag));
    let mut session = Session::new();

    let outcome = verifier.start(&mut session).await.unwrap();

    assert_eq!(
        outcome,
        StartupOutcome::Killed {
            message: "down for maintenance".into()
        }
    );
    assert_eq!(fake.fetch_all_calls.load(Ordering::SeqCst), 0);
    assert!(verifier.cache().sheet_names().is_empty());
    assert_eq!(session.sheet(), None);
}

#[tokio::test]
async fn bare_false_kills_with_default_message() {
    let fake = Arc::new(FakeSheetService::new().with_initial(document()));
    let flag = Arc::new(FakeFlagSource::body("false\n"));
    let outcome = verifier(&fake, Some(&flag))
        .start(&mut Session::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        StartupOutcome::Killed {
            message: DEFAULT_KILL_MESSAGE.into()
        }
    );
}

#[tokio::test]
async fn unreachable_flag_fails_open() {
    let fake = Arc::new(FakeSheetService::new().with_initial(document()));
    let flag = Arc::new(FakeFlagSource::failing());
    let verifier = verifier(&fake, Some(&flag));

    let outcome = verifier.start(&mut Session::new()).await.unwrap();

    assert_matches!(outcome, StartupOutcome::Ready { .. });
    assert_eq!(flag.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fake.fetch_all_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreadable_or_active_flag_lets_the_workflow_run() {
    for body in ["", "<html>oops</html>", r#"{"active": true}"#, r#"{"active": "false"}"#, "[]"] {
        let fake = Arc::new(FakeSheetService::new().with_initial(document()));
        let flag = Arc::new(FakeFlagSource::body(body));
        let outcome = verifier(&fake, Some(&flag))
            .start(&mut Session::new())
            .await
            .unwrap();
        assert_matches!(outcome, StartupOutcome::Ready { .. }, "flag body {body:?}");
    }
}

#[tokio::test]
async fn first_sheet_is_never_offered() {
    let fake = Arc::new(FakeSheetService::new().with_initial(document()));
    let verifier = verifier(&fake, None);
    let mut session = Session::new();

    let outcome = verifier.start(&mut session).await.unwrap();

    assert_eq!(
        outcome,
        StartupOutcome::Ready {
            sheets: vec!["North".into(), "South".into()],
            selected: Some("North".into()),
        }
    );
    assert_eq!(session.sheet(), Some("North"));
    assert_eq!(verifier.cache().sheet_names(), vec!["North", "South"]);
    // Cached all the same.
    assert!(verifier.cache().contains("Index"));
    assert_eq!(session.selectable_keys(verifier.cache()), vec!["K-1", "K-2"]);
}

#[tokio::test]
async fn single_sheet_document_has_nothing_to_select() {
    let mut data = document();
    data.sheet_names.truncate(1);
    let fake = Arc::new(FakeSheetService::new().with_initial(data));
    let mut session = Session::new();

    let outcome = verifier(&fake, None).start(&mut session).await.unwrap();

    assert_eq!(
        outcome,
        StartupOutcome::Ready {
            sheets: vec![],
            selected: None,
        }
    );
    assert_eq!(session.sheet(), None);
}

#[tokio::test]
async fn load_failure_is_reported_with_detail() {
    let fake = Arc::new(FakeSheetService::new());
    *fake.initial.lock() = Some(Err(ServiceError::Transport("dns error".into())));
    let verifier = verifier(&fake, None);

    let error = verifier.start(&mut Session::new()).await.unwrap_err();

    assert_matches!(&error, VerifyError::LoadFailed(ServiceError::Transport(_)));
    let message = error.to_string();
    assert!(message.contains("verify the API URL"), "{message}");
    assert!(message.contains("dns error"), "{message}");
    assert!(verifier.cache().sheet_names().is_empty());
}
