use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::email::client::{EmailClient, EmailMessage};
use crate::email::{templates, MailError};

/// Payload of one queued email. `to` is always required; the remaining fields
/// are template-specific and ignored by templates that don't use them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJobData {
    pub to: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub verification_link: Option<String>,
    #[serde(default)]
    pub reset_link: Option<String>,
    #[serde(default)]
    pub expires_in_minutes: Option<i64>,
}

/// One email to send, as delivered by the external queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailJob {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EmailJobData,
}

/// What became of a dispatched job. Failures are values, never panics or
/// propagated errors, so the queue runner always sees a completed unit of
/// work and can layer its own retry or dead-letter policy on the outcome.
#[derive(Debug)]
pub enum DispatchOutcome {
    Sent { provider_id: String },
    Failed { error: MailError },
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Resolves a job against the template registry and hands the rendered
/// message to the provider client. Stateless apart from the shared client.
#[derive(Clone)]
pub struct EmailDispatcher {
    client: Arc<dyn EmailClient>,
}

impl EmailDispatcher {
    pub fn new(client: Arc<dyn EmailClient>) -> Self {
        Self { client }
    }

    pub async fn dispatch(&self, job: &EmailJob) -> DispatchOutcome {
        let template = match templates::lookup(&job.kind) {
            Some(t) => t,
            None => {
                let err = MailError::UnknownTemplate(job.kind.clone());
                error!(template = %job.kind, to = %job.data.to, error = %err, "email job dropped");
                return DispatchOutcome::Failed { error: err };
            }
        };

        let message = EmailMessage {
            from: template.from.to_string(),
            to: job.data.to.clone(),
            subject: template.subject.to_string(),
            html: (template.render)(&job.data),
        };

        match self.client.send(&message).await {
            Ok(provider_id) => {
                info!(
                    template = %job.kind,
                    to = %job.data.to,
                    provider_id = %provider_id,
                    "email sent"
                );
                DispatchOutcome::Sent { provider_id }
            }
            Err(error) => {
                error!(
                    template = %job.kind,
                    to = %job.data.to,
                    error = %error,
                    "email send failed"
                );
                DispatchOutcome::Failed { error }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{welcome_job, StubEmailClient};
    use super::*;

    #[tokio::test]
    async fn welcome_job_sends_exactly_one_rendered_message() {
        let client = StubEmailClient::ok();
        let dispatcher = EmailDispatcher::new(client.clone());

        let outcome = dispatcher
            .dispatch(&welcome_job("a@example.com", "A"))
            .await;
        assert!(outcome.is_sent());

        let sent = client.sent.lock().expect("stub lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Welcome to AbegHelp");
        assert_eq!(sent[0].from, "AbegHelp <support@abeghelp.me>");
        assert_eq!(sent[0].to, "a@example.com");
        assert!(sent[0].html.contains("Welcome to AbegHelp, A!"));
    }

    #[tokio::test]
    async fn provider_failure_becomes_a_failed_outcome() {
        let client = StubEmailClient::failing();
        let dispatcher = EmailDispatcher::new(client.clone());

        let outcome = dispatcher
            .dispatch(&welcome_job("a@example.com", "A"))
            .await;
        match outcome {
            DispatchOutcome::Failed {
                error: MailError::Provider(msg),
            } => assert!(msg.contains("503")),
            other => panic!("expected provider failure, got {other:?}"),
        }
        assert_eq!(client.sent.lock().expect("stub lock").len(), 1);
    }

    #[tokio::test]
    async fn unregistered_kind_fails_without_touching_the_client() {
        let client = StubEmailClient::ok();
        let dispatcher = EmailDispatcher::new(client.clone());

        let mut job = welcome_job("a@example.com", "A");
        job.kind = "campaignUpdate".into();
        let outcome = dispatcher.dispatch(&job).await;
        match outcome {
            DispatchOutcome::Failed {
                error: MailError::UnknownTemplate(kind),
            } => assert_eq!(kind, "campaignUpdate"),
            other => panic!("expected unknown template, got {other:?}"),
        }
        assert!(client.sent.lock().expect("stub lock").is_empty());
    }

    #[test]
    fn job_wire_format_uses_type_and_camel_case_data() {
        let json = r#"{
            "type": "resetPassword",
            "data": {
                "to": "ada@example.com",
                "name": "Ada",
                "resetLink": "https://abeghelp.me/reset?token=abc",
                "expiresInMinutes": 15
            }
        }"#;
        let job: EmailJob = serde_json::from_str(json).expect("deserialize job");
        assert_eq!(job.kind, "resetPassword");
        assert_eq!(
            job.data.reset_link.as_deref(),
            Some("https://abeghelp.me/reset?token=abc")
        );
        assert_eq!(job.data.expires_in_minutes, Some(15));
    }
}
