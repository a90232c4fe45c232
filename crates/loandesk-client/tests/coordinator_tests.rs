//! Effect scripts end to end, against a scripted backend.
//!
//! Guarantees exercised here:
//! - A successful step submission advances the case file; a failed one
//!   leaves it where it was and surfaces the error on the file's scope.
//! - Loading is cleared on every exit path.
//! - At most one script per action key is in flight; repeated triggers are
//!   dropped or queued depending on the dispatch mode.
//! - Any 401 signs out completely, whichever action triggered it.

use loandesk_client::{
    ClientConfig, Command, CommandOutput, DispatchMode, EntityScope, FailureKind, Method,
    NoticeKind, Progress, RequestBody, Route, RunOutcome, SessionStore,
};
use loandesk_core::{Attachment, FileId, FileStatus, Step, StepPayload, Transition};
use loandesk_test_utils::{login_response, pdf_response, Harness, ScriptedTransport};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn customer_payload() -> StepPayload {
    StepPayload::from_json(json!({"name": "Asha Rao", "pan": "ABCDE1234F"}))
}

async fn wait_for_requests(transport: &ScriptedTransport, count: usize) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while transport.request_count() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("requests never arrived");
}

/// Scenario: submit "customer", server answers `{data: {_id: "F100"}}`.
#[tokio::test]
async fn successful_submission_advances_to_next_step() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(201, json!({"data": {"_id": "F100"}}));
    let coordinator = harness.client.coordinator();
    let draft = coordinator.case_files().open_default();

    let output = coordinator
        .dispatch(Command::SubmitStep {
            draft,
            step: Step::Customer,
            payload: customer_payload(),
        })
        .await
        .completed()
        .unwrap();

    assert_eq!(
        output,
        CommandOutput::StepSubmitted {
            transition: Transition::Advanced {
                from: Step::Customer,
                to: Step::Address
            },
            file_id: Some(FileId::from("F100")),
        }
    );
    let file = coordinator.case_files().snapshot(draft).unwrap();
    assert_eq!(file.active, Step::Address);
    assert_eq!(file.completed.iter().copied().collect::<Vec<_>>(), vec![Step::Customer]);

    let request = harness.transport.last_request().unwrap();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.path, "/customer-file/customer_details");
    assert_eq!(
        request.body,
        RequestBody::Json(json!({"name": "Asha Rao", "pan": "ABCDE1234F"}))
    );
    assert!(!coordinator.entities().is_loading(&EntityScope::CaseFile(draft)));
}

/// Scenario: submit "customer", server fails.
#[tokio::test]
async fn failed_submission_keeps_active_step_and_surfaces_error() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(500, json!({"message": "database unavailable"}));
    let coordinator = harness.client.coordinator();
    let draft = coordinator.case_files().open_default();

    let outcome = coordinator
        .dispatch(Command::SubmitStep {
            draft,
            step: Step::Customer,
            payload: customer_payload(),
        })
        .await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    let file = coordinator.case_files().snapshot(draft).unwrap();
    assert_eq!(file.active, Step::Customer);
    assert!(file.completed.is_empty());

    let scope = EntityScope::CaseFile(draft);
    let state = coordinator.entities().state(&scope);
    assert!(!state.loading);
    let error = state.error.unwrap();
    assert_eq!(error.kind, FailureKind::UnexpectedError);
    assert_eq!(error.message, "database unavailable");
}

/// Scenario: submit "customer", server answers 201 without an id.
#[tokio::test]
async fn first_step_without_file_id_does_not_advance() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(201, json!({"data": {"message": "saved"}}));
    let coordinator = harness.client.coordinator();
    let draft = coordinator.case_files().open_default();

    let outcome = coordinator
        .dispatch(Command::SubmitStep {
            draft,
            step: Step::Customer,
            payload: customer_payload(),
        })
        .await;

    let RunOutcome::Failed(err) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(err.kind(), FailureKind::UnexpectedError);
    let file = coordinator.case_files().snapshot(draft).unwrap();
    assert_eq!(file.active, Step::Customer);
    assert!(file.completed.is_empty());
    assert_eq!(file.id, None);

    let state = coordinator.entities().state(&EntityScope::CaseFile(draft));
    assert!(!state.loading);
    assert_eq!(state.error.unwrap().kind, FailureKind::UnexpectedError);
}

#[tokio::test]
async fn validation_errors_reach_the_form() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(
        422,
        json!({"message": "Invalid customer", "errors": {"pan": "PAN is invalid"}}),
    );
    let coordinator = harness.client.coordinator();
    let draft = coordinator.case_files().open_default();

    coordinator
        .dispatch(Command::SubmitStep {
            draft,
            step: Step::Customer,
            payload: customer_payload(),
        })
        .await;

    let error = coordinator.entities().error(&EntityScope::CaseFile(draft)).unwrap();
    assert_eq!(error.kind, FailureKind::ValidationFailed);
    assert_eq!(error.field_errors.get("pan").map(String::as_str), Some("PAN is invalid"));
}

#[tokio::test]
async fn later_steps_target_the_assigned_file() {
    let harness = Harness::signed_in(ClientConfig::new());
    let transport = &harness.transport;
    transport.push_json(201, json!({"data": {"_id": "F100"}}));
    transport.push_json(200, json!({"data": {"ok": true}}));
    transport.push_json(200, json!({"data": {"ok": true}}));
    let coordinator = harness.client.coordinator();
    let draft = coordinator.case_files().open_default();

    for step in [Step::Customer, Step::Address] {
        coordinator
            .dispatch(Command::SubmitStep {
                draft,
                step,
                payload: StepPayload::default(),
            })
            .await
            .into_result()
            .unwrap();
    }
    // editing an already completed step
    coordinator
        .dispatch(Command::SubmitStep {
            draft,
            step: Step::Customer,
            payload: customer_payload(),
        })
        .await
        .into_result()
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests[1].method, Method::Post);
    assert_eq!(requests[1].path, "/customer-file/customer_address/F100");
    assert_eq!(requests[2].method, Method::Put);
    assert_eq!(requests[2].path, "/customer-file/customer_details/F100");

    let file = coordinator.case_files().snapshot(draft).unwrap();
    assert_eq!(file.active, Step::Associates);
}

#[tokio::test]
async fn skipping_ahead_fails_without_a_request() {
    let harness = Harness::signed_in(ClientConfig::new());
    let coordinator = harness.client.coordinator();
    let draft = coordinator.case_files().open_default();

    let outcome = coordinator
        .dispatch(Command::SubmitStep {
            draft,
            step: Step::Income,
            payload: StepPayload::default(),
        })
        .await;

    let RunOutcome::Failed(err) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(err.kind(), FailureKind::ValidationFailed);
    assert_eq!(harness.transport.request_count(), 0);
    assert!(coordinator.entities().error(&EntityScope::CaseFile(draft)).is_some());
}

#[tokio::test]
async fn attachments_switch_to_multipart() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(201, json!({"data": {"_id": "F9"}}));
    let coordinator = harness.client.coordinator();
    let draft = coordinator.case_files().open(vec![Step::Photos]).unwrap();

    let payload = StepPayload::default().with_attachment(Attachment {
        field: "selfie".into(),
        file_name: "selfie.png".into(),
        mime: "image/png".into(),
        bytes: vec![1, 2, 3],
    });
    coordinator
        .dispatch(Command::SubmitStep {
            draft,
            step: Step::Photos,
            payload,
        })
        .await
        .into_result()
        .unwrap();

    let request = harness.transport.last_request().unwrap();
    assert!(request.body.is_multipart());
    assert_eq!(request.path, "/customer-file/customer_photos");
    let file = coordinator.case_files().snapshot(draft).unwrap();
    assert_eq!(file.status, FileStatus::UnderReview);
}

#[tokio::test]
async fn verify_requires_completion() {
    let harness = Harness::signed_in(ClientConfig::new());
    let coordinator = harness.client.coordinator();
    let draft = coordinator.case_files().open_default();

    let outcome = coordinator
        .dispatch(Command::VerifyStep {
            draft,
            step: Step::Customer,
        })
        .await;
    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!(harness.transport.request_count(), 0);
}

/// Tenet: under DropIfBusy a second trigger while the first is in flight
/// does nothing at all.
#[tokio::test]
async fn repeated_trigger_is_dropped_while_busy() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = Harness::signed_in_with_transport(
        ClientConfig::new(),
        ScriptedTransport::gated(Arc::clone(&gate)),
    );
    harness.transport.push_json(200, json!({"data": {"total": 3}}));
    let coordinator = Arc::clone(harness.client.coordinator());

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.dispatch(Command::FetchDashboard).await })
    };
    wait_for_requests(&harness.transport, 1).await;
    assert!(coordinator.entities().is_loading(&EntityScope::Dashboard));

    let second = coordinator.dispatch(Command::FetchDashboard).await;
    assert!(second.is_dropped());

    gate.add_permits(1);
    let first = first.await.unwrap();
    assert_eq!(first.completed(), Some(CommandOutput::Dashboard(json!({"total": 3}))));
    assert_eq!(harness.transport.request_count(), 1);
    assert!(!coordinator.entities().is_loading(&EntityScope::Dashboard));
    assert!(coordinator.registry().is_empty());
}

#[tokio::test]
async fn queued_triggers_run_in_order() {
    let gate = Arc::new(Semaphore::new(0));
    let config = ClientConfig::new().with_dispatch_mode(DispatchMode::Queue);
    let harness =
        Harness::signed_in_with_transport(config, ScriptedTransport::gated(Arc::clone(&gate)));
    harness.transport.push_json(200, json!({"data": {"version": 1}}));
    harness.transport.push_json(200, json!({"data": {"version": 2}}));
    let coordinator = Arc::clone(harness.client.coordinator());

    let spawn_update = |version: u8| {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .dispatch(Command::UpdateLedger {
                    body: json!({"version": version}),
                })
                .await
        })
    };
    let first = spawn_update(1);
    wait_for_requests(&harness.transport, 1).await;
    let second = spawn_update(2);
    tokio::task::yield_now().await;
    assert_eq!(harness.transport.request_count(), 1);

    gate.add_permits(2);
    assert_eq!(
        first.await.unwrap().completed(),
        Some(CommandOutput::Ledger(json!({"version": 1})))
    );
    assert_eq!(
        second.await.unwrap().completed(),
        Some(CommandOutput::Ledger(json!({"version": 2})))
    );

    let bodies: Vec<_> = harness
        .transport
        .requests()
        .into_iter()
        .map(|r| r.body)
        .collect();
    assert_eq!(
        bodies,
        vec![
            RequestBody::Json(json!({"version": 1})),
            RequestBody::Json(json!({"version": 2}))
        ]
    );
}

/// Tenet: 401 from any action signs out completely.
#[tokio::test]
async fn unauthorized_from_any_action_signs_out() {
    let commands: [fn(&Harness) -> Command; 4] = [
        |_| Command::FetchDashboard,
        |_| Command::FetchLedger,
        |_| Command::FetchQuestions,
        |h| Command::SubmitStep {
            draft: h.client.coordinator().case_files().open_default(),
            step: Step::Customer,
            payload: customer_payload(),
        },
    ];

    for make in commands {
        let harness = Harness::signed_in(ClientConfig::new());
        harness.transport.push_json(401, json!({"message": "jwt expired"}));
        let command = make(&harness);
        let scope = command.scope();

        let outcome = harness.client.coordinator().dispatch(command).await;

        let RunOutcome::Failed(err) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(err.kind(), FailureKind::AuthExpired);
        assert!(harness.store.is_empty().unwrap());
        assert_eq!(harness.client.navigation().current(), Route::login());
        let state = harness.client.coordinator().entities().state(&scope);
        assert!(!state.loading);
        assert_eq!(state.error, None);
    }
}

#[tokio::test]
async fn progress_follows_script_phases() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(500, json!({}));
    let coordinator = harness.client.coordinator();
    let mut progress = coordinator.subscribe();

    coordinator.dispatch(Command::FetchLedger).await;

    let pending = progress.recv().await.unwrap();
    assert_eq!(pending.key.as_str(), "ledger:fetch");
    assert_eq!(pending.progress, Progress::Pending);
    let failed = progress.recv().await.unwrap();
    assert!(matches!(failed.progress, Progress::Failed { .. }));
}

#[tokio::test]
async fn login_installs_session_and_lands_on_workspace() {
    let harness = Harness::new(ClientConfig::new());
    harness.transport.push_json(200, login_response());

    let output = harness
        .client
        .coordinator()
        .dispatch(Command::Login {
            email: "asha@acme.test".into(),
            password: "secret".into(),
        })
        .await
        .completed()
        .unwrap();

    assert_eq!(
        output,
        CommandOutput::SignedIn {
            landing: Route::workspace("acme")
        }
    );
    assert!(harness.client.session().is_authenticated());
    assert!(!harness.client.session().snapshot().loading);
    assert_eq!(harness.client.navigation().current(), Route::workspace("acme"));
    assert!(!harness.store.is_empty().unwrap());
}

#[tokio::test]
async fn notices_come_back_as_pdf_bytes() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push(pdf_response(b"%PDF-1.7 notice"));

    let output = harness
        .client
        .coordinator()
        .dispatch(Command::EditNotice {
            kind: NoticeKind::Legal,
            body: json!({"fileId": "F100"}),
        })
        .await
        .completed()
        .unwrap();

    assert_eq!(output, CommandOutput::Notice(b"%PDF-1.7 notice".to_vec()));
    assert_eq!(
        harness.transport.last_request().unwrap().path,
        "/collection/edit-legalNotice"
    );
}

#[tokio::test]
async fn organization_config_uses_path_organization() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.transport.push_json(200, json!({"data": {"currency": "INR"}}));

    harness
        .client
        .coordinator()
        .dispatch(Command::FetchOrganizationConfig {
            organization: "acme".into(),
        })
        .await
        .into_result()
        .unwrap();

    assert_eq!(
        harness.transport.last_request().unwrap().path,
        "/organization-configs/acme/configs"
    );
}

#[tokio::test]
async fn logout_clears_session_and_closes_channel() {
    let harness = Harness::signed_in(ClientConfig::new());
    harness.client.hub().ensure_connected().await.unwrap();

    harness.client.logout().await.into_result().unwrap();

    assert!(harness.store.is_empty().unwrap());
    assert!(!harness.client.hub().is_connected().await);
    assert_eq!(harness.client.navigation().current(), Route::login());
}
