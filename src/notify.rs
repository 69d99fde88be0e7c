//! Outgoing email. Sends are fire-and-forget: the request that triggers one
//! never waits for it, and failures are only logged.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

use crate::models::enums::ReviewStatus;
use crate::models::{Recommendation, User};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Mail relay unreachable: {0}")]
    Transport(String),

    #[error("Mail relay returned status {0}")]
    Rejected(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Mailer: Send + Sync {
    fn send<'a>(&'a self, from: &'a str, email: &'a Email) -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// Logs instead of sending. Used when no relay is configured.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send<'a>(&'a self, _from: &'a str, email: &'a Email) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            tracing::info!(to = %email.to, subject = %email.subject, "Email (not sent, no relay configured)");
            Ok(())
        })
    }
}

/// POSTs each message as JSON to an HTTP mail relay.
pub struct HttpMailer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpMailer {
    pub fn new(endpoint: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl Mailer for HttpMailer {
    fn send<'a>(&'a self, from: &'a str, email: &'a Email) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            let body = RelayMessage {
                from,
                to: &email.to,
                subject: &email.subject,
                text: &email.body,
            };
            let response = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(NotifyError::Rejected(status.as_u16()));
            }
            Ok(())
        })
    }
}

/// Spawns sends on the runtime.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    from: String,
    public_url: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, from: &str, public_url: &str) -> Self {
        Self {
            mailer,
            from: from.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Queue an email. Returns immediately.
    pub fn dispatch(&self, email: Email) -> tokio::task::JoinHandle<()> {
        let mailer = self.mailer.clone();
        let from = self.from.clone();
        tokio::spawn(async move {
            match mailer.send(&from, &email).await {
                Ok(()) => tracing::debug!(to = %email.to, subject = %email.subject, "Email sent"),
                Err(e) => tracing::warn!(to = %email.to, error = %e, "Email send failed"),
            }
        })
    }

    pub fn password_reset(&self, user: &User, token: &str) -> Email {
        let link = format!("{}/reset-password/{token}", self.public_url);
        Email {
            to: user.email.clone(),
            subject: "Reset your Labwise password".into(),
            body: format!(
                "Hello {},\n\nUse this link within the next hour to choose a new password:\n{link}\n\n\
                 If you did not ask for a reset you can ignore this message.",
                user.name
            ),
        }
    }

    pub fn report_assigned(&self, doctor: &User, patient_name: &str, rec: &Recommendation) -> Email {
        Email {
            to: doctor.email.clone(),
            subject: format!("New report to review ({} urgency)", rec.urgency),
            body: format!(
                "Dr. {},\n\n{patient_name} has asked you to review a lab report \
                 (health score {}/100).\n\nOpen it at {}/doctor/review/{}",
                doctor.name, rec.health_score, self.public_url, rec.id
            ),
        }
    }

    /// Approval or rejection notice. `None` for any other status.
    pub fn review_decision(&self, patient: &User, rec: &Recommendation) -> Option<Email> {
        let (subject, detail) = match rec.review_status {
            ReviewStatus::Approved => (
                "Your doctor approved your recommendations",
                "Your doctor has reviewed and approved your personalised recommendations.".to_string(),
            ),
            ReviewStatus::Rejected => (
                "Your doctor reviewed your lab report",
                format!(
                    "Your doctor did not approve the suggested recommendations. Reason: {}",
                    rec.rejection_reason.as_deref().unwrap_or("not given")
                ),
            ),
            _ => return None,
        };
        Some(Email {
            to: patient.email.clone(),
            subject: subject.into(),
            body: format!(
                "Hello {},\n\n{detail}\n\nSee the details at {}/reports/{}",
                patient.name, self.public_url, rec.report_id
            ),
        })
    }
}

/// Captures emails instead of sending them.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: std::sync::Mutex<Vec<Email>>,
}

#[cfg(test)]
impl Mailer for RecordingMailer {
    fn send<'a>(&'a self, _from: &'a str, email: &'a Email) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::enums::{Urgency, UserRole};
    use crate::models::{SuggestionSet, UserProfile};

    fn user(name: &str, email: &str, role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            password_hash: String::new(),
            role,
            profile: UserProfile::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rec(status: ReviewStatus) -> Recommendation {
        let now = Utc::now();
        Recommendation {
            id: Uuid::new_v4(),
            report_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: None,
            ai_suggestions: SuggestionSet::default(),
            health_score: 70,
            urgency: Urgency::High,
            risk_factors: vec![],
            summary: None,
            doctor_modifications: None,
            final_recommendations: None,
            doctor_notes: None,
            rejection_reason: Some("Retest needed".into()),
            review_status: status,
            created_at: now,
            updated_at: now,
            assigned_at: None,
            reviewed_at: None,
        }
    }

    fn notifier(mailer: Arc<dyn Mailer>) -> Notifier {
        Notifier::new(mailer, "no-reply@labwise.local", "https://app.example.com/")
    }

    #[test]
    fn reset_email_links_to_client() {
        let n = notifier(Arc::new(LogMailer));
        let email = n.password_reset(&user("Ada", "ada@example.com", UserRole::Patient), "tok123");
        assert_eq!(email.to, "ada@example.com");
        assert!(email.body.contains("https://app.example.com/reset-password/tok123"));
    }

    #[test]
    fn decision_email_only_for_terminal_status() {
        let n = notifier(Arc::new(LogMailer));
        let patient = user("Ada", "ada@example.com", UserRole::Patient);
        assert!(n.review_decision(&patient, &rec(ReviewStatus::Modified)).is_none());
        let rejected = n.review_decision(&patient, &rec(ReviewStatus::Rejected)).unwrap();
        assert!(rejected.body.contains("Retest needed"));
        assert!(n.review_decision(&patient, &rec(ReviewStatus::Approved)).is_some());
    }

    #[test]
    fn assignment_email_mentions_urgency() {
        let n = notifier(Arc::new(LogMailer));
        let doctor = user("House", "house@example.com", UserRole::Doctor);
        let email = n.report_assigned(&doctor, "Ada", &rec(ReviewStatus::UnderReview));
        assert_eq!(email.to, "house@example.com");
        assert!(email.subject.contains("high"));
    }

    #[tokio::test]
    async fn dispatch_delivers_in_background() {
        let mailer = Arc::new(RecordingMailer::default());
        let n = notifier(mailer.clone());
        let email = Email {
            to: "x@example.com".into(),
            subject: "s".into(),
            body: "b".into(),
        };
        n.dispatch(email.clone()).await.unwrap();
        assert_eq!(mailer.sent.lock().unwrap().as_slice(), &[email]);
    }

    #[tokio::test]
    async fn relay_failure_is_logged_not_raised() {
        let n = notifier(Arc::new(HttpMailer::new("http://127.0.0.1:1/send").unwrap()));
        let email = Email {
            to: "x@example.com".into(),
            subject: "s".into(),
            body: "b".into(),
        };
        assert!(n.dispatch(email).await.is_ok());
    }
}
