use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;

use invoicer_core::{DomainError, DomainResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn verification(to: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Verifikoni Email-in tuaj - Faturëime".to_string(),
            body: format!(
                "Mirë se vini!\n\nJu lutemi verifikoni adresën tuaj të email-it duke hapur këtë link:\n{link}\n"
            ),
        }
    }

    pub fn invitation(to: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Ftesë për të bashkuar Faturëime".to_string(),
            body: format!(
                "Jeni ftuar të bashkoheni me Faturëime.\n\nPër të pranuar ftesën dhe për të vendosur fjalëkalimin, hapni këtë link:\n{link}\n"
            ),
        }
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> DomainResult<()>;
}

/// Writes outgoing mail to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: EmailMessage) -> DomainResult<()> {
        tracing::info!(to = %message.to, subject = %message.subject, "email queued");
        Ok(())
    }
}

/// Keeps every accepted message; can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sender = Self::default();
        sender.set_failing(true);
        sender
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: EmailMessage) -> DomainResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::external(format!("could not deliver email to {}", message.to)));
        }
        self.sent
            .lock()
            .map_err(|_| DomainError::external("mailbox unavailable"))?
            .push(message);
        Ok(())
    }
}
