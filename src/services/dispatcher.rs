//! Decides, for one application document change, whether the applicant gets a
//! push notification, and sends it.
//!
//! Every guard that rejects an event is an expected outcome, not an error:
//! the trigger layer must never see a failure from here, otherwise it would
//! redeliver an event for a document that has already settled.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::{ApplicationRecord, ApplicationStatus, UserProfile};
use crate::error::AppResult;
use crate::services::push::{
    redact_token, PushData, PushNotification, PushPayload, PushSender, APPLICATION_STATUS_TYPE,
};

/// Read-only access to user profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync + 'static {
    async fn find_profile(&self, user_id: &str) -> AppResult<Option<UserProfile>>;
}

/// Before/after snapshots of a mutated document. A missing side means the
/// document was created or deleted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentChange {
    #[serde(default)]
    pub before: Option<ApplicationRecord>,
    #[serde(default)]
    pub after: Option<ApplicationRecord>,
}

/// Identifiers taken from the document's storage path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    pub job_id: Option<String>,
    pub application_id: Option<String>,
    pub user_id: Option<String>,
}

/// Where the owning user's id is found for a given trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdSource {
    /// Name of a field in the `after` snapshot.
    Field(String),
    /// Value already taken from the document path.
    Path(String),
}

impl UserIdSource {
    fn resolve<'a>(&'a self, after: &'a ApplicationRecord) -> Option<&'a str> {
        match self {
            UserIdSource::Field(name) => after.text(name),
            UserIdSource::Path(value) => Some(value.as_str()).filter(|v| !v.is_empty()),
        }
    }
}

/// What a dispatch decided. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    MissingSnapshot,
    StatusUnchanged,
    StatusNotNotifiable,
    MissingUserId,
    ProfileLookupFailed,
    ProfileNotFound,
    MissingDeviceToken,
    DeliveryFailed,
    Sent,
}

pub struct StatusChangeDispatcher {
    profiles: Arc<dyn ProfileStore>,
    push: Arc<dyn PushSender>,
}

impl StatusChangeDispatcher {
    pub fn new(profiles: Arc<dyn ProfileStore>, push: Arc<dyn PushSender>) -> Self {
        Self { profiles, push }
    }

    /// Run the guard sequence for one change and send at most one push.
    pub async fn dispatch(
        &self,
        change: &DocumentChange,
        params: &PathParams,
        user_id_source: &UserIdSource,
    ) -> DispatchOutcome {
        let (before, after) = match (&change.before, &change.after) {
            (Some(before), Some(after)) => (before, after),
            _ => {
                tracing::debug!("Skipping change without both snapshots (create or delete)");
                return DispatchOutcome::MissingSnapshot;
            }
        };

        if before.raw_status() == after.raw_status() {
            tracing::debug!("Application status unchanged, nothing to notify");
            return DispatchOutcome::StatusUnchanged;
        }

        let status = match after.status() {
            Some(status) if status.is_notifiable() => status,
            other => {
                tracing::debug!(
                    "Status {:?} is not notifiable",
                    other.as_ref().map(ApplicationStatus::as_str)
                );
                return DispatchOutcome::StatusNotNotifiable;
            }
        };

        let user_id = match user_id_source.resolve(after) {
            Some(id) => id,
            None => {
                tracing::info!("No userId found in document or path ({:?})", user_id_source);
                return DispatchOutcome::MissingUserId;
            }
        };

        let profile = match self.profiles.find_profile(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!("User profile does not exist: {}", user_id);
                return DispatchOutcome::ProfileNotFound;
            }
            Err(e) => {
                tracing::error!("Failed to look up profile for user {}: {}", user_id, e);
                return DispatchOutcome::ProfileLookupFailed;
            }
        };

        let token = match profile.push_token() {
            Some(token) => token,
            None => {
                tracing::info!("No device token for user: {}", user_id);
                return DispatchOutcome::MissingDeviceToken;
            }
        };

        let payload = compose_payload(&status, after, params);

        tracing::info!(
            "Sending {} notification to user {} (token {})",
            status.as_str(),
            user_id,
            redact_token(token)
        );

        match self.push.send(token, &payload).await {
            Ok(()) => {
                tracing::info!("Notification sent to user: {}", user_id);
                DispatchOutcome::Sent
            }
            Err(e) => {
                tracing::error!("Error sending notification to user {}: {}", user_id, e);
                DispatchOutcome::DeliveryFailed
            }
        }
    }
}

/// Build the push message for a notifiable status.
///
/// `applicationId` falls back to the path's job id: documents under
/// `Users/{userId}/appliedjobs/{jobId}` have no separate application id.
pub fn compose_payload(
    status: &ApplicationStatus,
    after: &ApplicationRecord,
    params: &PathParams,
) -> PushPayload {
    let status_text = status.as_str();
    let job_title = after.job_title().unwrap_or("a job");
    let company = after.company_name().unwrap_or("the company");

    let path_job_id = params.job_id.as_deref().filter(|s| !s.is_empty());
    let job_id = after.job_id().or(path_job_id).unwrap_or_default();
    let application_id = params
        .application_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(path_job_id)
        .unwrap_or_default();

    PushPayload {
        notification: PushNotification {
            title: format!("Application {}", capitalize(status_text)),
            body: format!(
                "Your application for \"{}\" at {} was {}.",
                job_title, company, status_text
            ),
        },
        data: PushData {
            kind: APPLICATION_STATUS_TYPE.to_string(),
            status: status_text.to_string(),
            job_id: job_id.to_string(),
            application_id: application_id.to_string(),
        },
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;
    use serde_json::json;

    use crate::error::AppError;

    #[derive(Default)]
    struct FakeProfiles {
        tokens: HashMap<String, Option<String>>,
        fail: bool,
    }

    impl FakeProfiles {
        fn with(user_id: &str, token: Option<&str>) -> Self {
            let mut tokens = HashMap::new();
            tokens.insert(user_id.to_string(), token.map(str::to_string));
            Self {
                tokens,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ProfileStore for FakeProfiles {
        async fn find_profile(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
            if self.fail {
                return Err(AppError::Internal(anyhow::anyhow!("store unavailable")));
            }
            let now = Utc::now().naive_utc();
            Ok(self.tokens.get(user_id).map(|token| UserProfile {
                user_id: user_id.to_string(),
                device_token: token.clone(),
                created_at: now,
                updated_at: now,
            }))
        }
    }

    #[derive(Default)]
    struct RecordingPush {
        sent: Mutex<Vec<(String, PushPayload)>>,
        fail: bool,
    }

    #[async_trait]
    impl PushSender for RecordingPush {
        async fn send(&self, device_token: &str, payload: &PushPayload) -> AppResult<()> {
            self.sent
                .lock()
                .unwrap()
                .push((device_token.to_string(), payload.clone()));
            if self.fail {
                return Err(AppError::Push("registration-token-not-registered".to_string()));
            }
            Ok(())
        }
    }

    fn dispatcher(
        profiles: FakeProfiles,
        push: RecordingPush,
    ) -> (StatusChangeDispatcher, Arc<RecordingPush>) {
        let push = Arc::new(push);
        (
            StatusChangeDispatcher::new(Arc::new(profiles), push.clone()),
            push,
        )
    }

    fn change(before: serde_json::Value, after: serde_json::Value) -> DocumentChange {
        DocumentChange {
            before: Some(before.into()),
            after: Some(after.into()),
        }
    }

    fn user_id_field() -> UserIdSource {
        UserIdSource::Field("userId".to_string())
    }

    fn job_params() -> PathParams {
        PathParams {
            job_id: Some("job-1".to_string()),
            application_id: Some("app-1".to_string()),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn accepted_transition_sends_one_push() {
        let (dispatcher, push) =
            dispatcher(FakeProfiles::with("u1", Some("tok1")), RecordingPush::default());

        let outcome = dispatcher
            .dispatch(
                &change(
                    json!({ "status": "pending", "userId": "u1" }),
                    json!({
                        "status": "accepted",
                        "userId": "u1",
                        "title": "Rust Developer",
                        "companyName": "Ferris Inc",
                    }),
                ),
                &job_params(),
                &user_id_field(),
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::Sent);
        let sent = push.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (token, payload) = &sent[0];
        assert_eq!(token, "tok1");
        assert_eq!(payload.notification.title, "Application Accepted");
        assert_eq!(
            payload.notification.body,
            "Your application for \"Rust Developer\" at Ferris Inc was accepted."
        );
        assert_eq!(payload.data.kind, "application_status");
        assert_eq!(payload.data.status, "accepted");
        assert_eq!(payload.data.job_id, "job-1");
        assert_eq!(payload.data.application_id, "app-1");
    }

    #[tokio::test]
    async fn unchanged_status_sends_nothing() {
        let (dispatcher, push) =
            dispatcher(FakeProfiles::with("u1", Some("tok1")), RecordingPush::default());

        let outcome = dispatcher
            .dispatch(
                &change(
                    json!({ "status": "pending", "userId": "u1" }),
                    json!({ "status": "pending", "userId": "u1", "title": "Renamed" }),
                ),
                &job_params(),
                &user_id_field(),
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::StatusUnchanged);
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_notifiable_status_is_not_resent() {
        let (dispatcher, push) =
            dispatcher(FakeProfiles::with("u1", Some("tok1")), RecordingPush::default());

        let outcome = dispatcher
            .dispatch(
                &change(
                    json!({ "status": "accepted", "userId": "u1" }),
                    json!({ "status": "accepted", "userId": "u1" }),
                ),
                &job_params(),
                &user_id_field(),
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::StatusUnchanged);
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_notifiable_statuses_send_nothing() {
        let (dispatcher, push) =
            dispatcher(FakeProfiles::with("u1", Some("tok1")), RecordingPush::default());

        for (before, after) in [
            (json!("accepted"), json!("pending")),
            (json!("pending"), json!("interviewing")),
            (json!("pending"), json!("Accepted")),
            (json!("pending"), json!(null)),
            (json!("pending"), json!(7)),
        ] {
            let outcome = dispatcher
                .dispatch(
                    &change(
                        json!({ "status": before, "userId": "u1" }),
                        json!({ "status": after, "userId": "u1" }),
                    ),
                    &job_params(),
                    &user_id_field(),
                )
                .await;
            assert_eq!(outcome, DispatchOutcome::StatusNotNotifiable);
        }
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_added_to_document_counts_as_change() {
        let (dispatcher, push) =
            dispatcher(FakeProfiles::with("u1", Some("tok1")), RecordingPush::default());

        let outcome = dispatcher
            .dispatch(
                &change(
                    json!({ "userId": "u1" }),
                    json!({ "status": "shortlisted", "userId": "u1" }),
                ),
                &job_params(),
                &user_id_field(),
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::Sent);
        assert_eq!(
            push.sent.lock().unwrap()[0].1.notification.title,
            "Application Shortlisted"
        );
    }

    #[tokio::test]
    async fn created_or_deleted_documents_are_ignored() {
        let (dispatcher, push) =
            dispatcher(FakeProfiles::with("u1", Some("tok1")), RecordingPush::default());
        let after: ApplicationRecord = json!({ "status": "accepted", "userId": "u1" }).into();

        let created = DocumentChange {
            before: None,
            after: Some(after.clone()),
        };
        let deleted = DocumentChange {
            before: Some(after),
            after: None,
        };

        for change in [created, deleted] {
            let outcome = dispatcher
                .dispatch(&change, &job_params(), &user_id_field())
                .await;
            assert_eq!(outcome, DispatchOutcome::MissingSnapshot);
        }
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_user_id_is_a_silent_no_op() {
        let (dispatcher, push) =
            dispatcher(FakeProfiles::with("u1", Some("tok1")), RecordingPush::default());

        let outcome = dispatcher
            .dispatch(
                &change(
                    json!({ "status": "pending" }),
                    json!({ "status": "accepted", "userId": "" }),
                ),
                &job_params(),
                &user_id_field(),
            )
            .await;
        assert_eq!(outcome, DispatchOutcome::MissingUserId);

        let outcome = dispatcher
            .dispatch(
                &change(json!({ "status": "pending" }), json!({ "status": "accepted" })),
                &PathParams::default(),
                &UserIdSource::Path(String::new()),
            )
            .await;
        assert_eq!(outcome, DispatchOutcome::MissingUserId);
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn path_binding_ignores_document_user_id() {
        let (dispatcher, push) =
            dispatcher(FakeProfiles::with("u2", Some("tok2")), RecordingPush::default());

        let outcome = dispatcher
            .dispatch(
                &change(
                    json!({ "status": "pending", "userId": "someone-else" }),
                    json!({ "status": "rejected", "userId": "someone-else" }),
                ),
                &PathParams {
                    job_id: Some("j2".to_string()),
                    application_id: None,
                    user_id: Some("u2".to_string()),
                },
                &UserIdSource::Path("u2".to_string()),
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::Sent);
        assert_eq!(push.sent.lock().unwrap()[0].0, "tok2");
    }

    #[tokio::test]
    async fn profile_without_token_sends_nothing() {
        let (dispatcher, push) =
            dispatcher(FakeProfiles::with("u2", None), RecordingPush::default());

        let outcome = dispatcher
            .dispatch(
                &change(json!({ "status": "pending" }), json!({ "status": "rejected" })),
                &PathParams {
                    job_id: Some("j2".to_string()),
                    application_id: None,
                    user_id: Some("u2".to_string()),
                },
                &UserIdSource::Path("u2".to_string()),
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::MissingDeviceToken);
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_token_counts_as_missing() {
        let (dispatcher, push) =
            dispatcher(FakeProfiles::with("u1", Some("  ")), RecordingPush::default());

        let outcome = dispatcher
            .dispatch(
                &change(
                    json!({ "status": "pending", "userId": "u1" }),
                    json!({ "status": "accepted", "userId": "u1" }),
                ),
                &job_params(),
                &user_id_field(),
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::MissingDeviceToken);
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_profile_sends_nothing() {
        let (dispatcher, push) = dispatcher(FakeProfiles::default(), RecordingPush::default());

        let outcome = dispatcher
            .dispatch(
                &change(
                    json!({ "status": "pending", "userId": "ghost" }),
                    json!({ "status": "accepted", "userId": "ghost" }),
                ),
                &job_params(),
                &user_id_field(),
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::ProfileNotFound);
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_is_swallowed() {
        let profiles = FakeProfiles {
            fail: true,
            ..Default::default()
        };
        let (dispatcher, push) = dispatcher(profiles, RecordingPush::default());

        let outcome = dispatcher
            .dispatch(
                &change(
                    json!({ "status": "pending", "userId": "u1" }),
                    json!({ "status": "accepted", "userId": "u1" }),
                ),
                &job_params(),
                &user_id_field(),
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::ProfileLookupFailed);
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_attempted_once_and_swallowed() {
        let push = RecordingPush {
            fail: true,
            ..Default::default()
        };
        let (dispatcher, push) = dispatcher(FakeProfiles::with("u1", Some("tok1")), push);

        let outcome = dispatcher
            .dispatch(
                &change(
                    json!({ "status": "pending", "userId": "u1" }),
                    json!({ "status": "accepted", "userId": "u1" }),
                ),
                &job_params(),
                &user_id_field(),
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::DeliveryFailed);
        assert_eq!(push.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn application_id_falls_back_to_path_job_id() {
        let after: ApplicationRecord = json!({ "status": "rejected" }).into();
        let params = PathParams {
            job_id: Some("j9".to_string()),
            application_id: None,
            user_id: Some("u2".to_string()),
        };

        let payload = compose_payload(&ApplicationStatus::Rejected, &after, &params);

        assert_eq!(payload.data.application_id, "j9");
        assert_eq!(payload.data.job_id, "j9");
    }

    #[test]
    fn record_job_id_wins_over_path() {
        let after: ApplicationRecord = json!({ "status": "accepted", "jobId": "j-doc" }).into();

        let payload = compose_payload(&ApplicationStatus::Accepted, &after, &job_params());

        assert_eq!(payload.data.job_id, "j-doc");
        assert_eq!(payload.data.application_id, "app-1");
    }

    #[test]
    fn payload_uses_display_fallbacks() {
        let after: ApplicationRecord = json!({ "status": "shortlisted" }).into();

        let payload =
            compose_payload(&ApplicationStatus::Shortlisted, &after, &PathParams::default());

        assert_eq!(payload.notification.title, "Application Shortlisted");
        assert_eq!(
            payload.notification.body,
            "Your application for \"a job\" at the company was shortlisted."
        );
        assert_eq!(payload.data.job_id, "");
        assert_eq!(payload.data.application_id, "");
    }

    #[test]
    fn job_title_is_used_when_title_missing() {
        let after: ApplicationRecord =
            json!({ "jobTitle": "Data Engineer", "companyName": "Acme" }).into();

        let payload = compose_payload(&ApplicationStatus::Accepted, &after, &job_params());

        assert_eq!(
            payload.notification.body,
            "Your application for \"Data Engineer\" at Acme was accepted."
        );
    }

    #[test]
    fn capitalize_only_touches_first_character() {
        assert_eq!(capitalize("accepted"), "Accepted");
        assert_eq!(capitalize("shortListed"), "ShortListed");
        assert_eq!(capitalize(""), "");
    }
}
