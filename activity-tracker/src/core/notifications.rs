/*!
Security notification emails.

Bodies are assembled from the translation catalog; delivery goes through a
mail transport so the tracker never talks SMTP itself. The platform's mail
gateway accepts the message as JSON.
*/

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::core::config::NotificationConfig;
use crate::core::i18n::Translator;

/// An outbound email, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Security-relevant account events that trigger a notification email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityNotification {
    RecoveryCodesRegenerated,
    RecoveryCodesUsed,
    PasswordChanged,
}

impl SecurityNotification {
    /// Completed API calls that warrant a notification.
    pub fn for_api_method(method: &str) -> Option<Self> {
        match method {
            "regenerateRecoveryCodes" => Some(SecurityNotification::RecoveryCodesRegenerated),
            "confirmWithRecoveryCode" => Some(SecurityNotification::RecoveryCodesUsed),
            "changePassword" => Some(SecurityNotification::PasswordChanged),
            _ => None,
        }
    }

    fn body_key(&self) -> &'static str {
        match self {
            SecurityNotification::RecoveryCodesRegenerated => {
                "security.recovery_codes_regenerated_body"
            }
            SecurityNotification::RecoveryCodesUsed => "security.recovery_codes_used_body",
            SecurityNotification::PasswordChanged => "security.password_changed_body",
        }
    }

    fn advice_key(&self) -> &'static str {
        match self {
            SecurityNotification::RecoveryCodesRegenerated => "security.if_this_was_you",
            SecurityNotification::RecoveryCodesUsed => "security.if_this_was_not_you",
            SecurityNotification::PasswordChanged => "security.if_this_was_not_you",
        }
    }

    /// Body text: the event sentence and the advice sentence, joined by a
    /// single space.
    pub fn body(&self, translator: &Translator) -> String {
        format!(
            "{} {}",
            translator.translate(self.body_key()),
            translator.translate(self.advice_key())
        )
    }

    pub fn build(&self, translator: &Translator, recipient: &str) -> Email {
        Email {
            to: recipient.to_string(),
            subject: translator.translate("security.notification_subject"),
            body: self.body(translator),
        }
    }
}

/// Trait for mail delivery backends
#[async_trait]
pub trait MailTransport: Send {
    fn name(&self) -> &'static str;

    async fn send(&mut self, email: &Email) -> Result<(), Box<dyn std::error::Error>>;
}

/// Delivers mail by POSTing it to the platform's mail gateway
pub struct WebhookMailTransport {
    url: String,
    client: reqwest::Client,
}

impl WebhookMailTransport {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MailTransport for WebhookMailTransport {
    fn name(&self) -> &'static str {
        "MailGateway"
    }

    async fn send(&mut self, email: &Email) -> Result<(), Box<dyn std::error::Error>> {
        let response = self.client.post(&self.url).json(email).send().await?;

        if !response.status().is_success() {
            return Err(format!("Mail gateway rejected message: {}", response.status()).into());
        }

        Ok(())
    }
}

/// Spools mail to a local file, one JSON message per line
pub struct FileMailTransport {
    path: PathBuf,
}

impl FileMailTransport {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MailTransport for FileMailTransport {
    fn name(&self) -> &'static str {
        "MailSpool"
    }

    async fn send(&mut self, email: &Email) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{}", serde_json::to_string(email)?)?;
        file.flush()?;

        Ok(())
    }
}

/// Pick a transport from the notification configuration.
pub fn transport_from_config(config: &NotificationConfig) -> Box<dyn MailTransport> {
    match &config.mail_gateway_url {
        Some(url) => Box::new(WebhookMailTransport::new(url.clone())),
        None => Box::new(FileMailTransport::new(config.mail_spool_path.clone())),
    }
}

/// Build and deliver a security notification, if a recipient is configured.
pub async fn notify(
    kind: SecurityNotification,
    config: &NotificationConfig,
    translator: &Translator,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(recipient) = &config.security_email else {
        return Ok(());
    };

    let email = kind.build(translator, recipient);
    let mut transport = transport_from_config(config);
    transport.send(&email).await?;

    info!(
        "Sent {:?} notification to {} via {}",
        kind,
        recipient,
        transport.name()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_SPOOL: AtomicUsize = AtomicUsize::new(0);

    fn translator() -> Translator {
        Translator::with_catalog(
            "en",
            HashMap::from([
                (
                    "security.recovery_codes_regenerated_body".to_string(),
                    "Your two-factor recovery codes were regenerated.".to_string(),
                ),
                (
                    "security.if_this_was_you".to_string(),
                    "If this was you, no action is needed.".to_string(),
                ),
                (
                    "security.notification_subject".to_string(),
                    "Security notification".to_string(),
                ),
            ]),
        )
    }

    #[test]
    fn body_is_two_phrases_joined_by_one_space() {
        let body = SecurityNotification::RecoveryCodesRegenerated.body(&translator());
        assert_eq!(
            body,
            "Your two-factor recovery codes were regenerated. If this was you, no action is needed."
        );
        assert!(!body.ends_with(' '));
    }

    #[test]
    fn body_is_pure_given_an_unchanged_catalog() {
        let t = translator();
        let kind = SecurityNotification::RecoveryCodesRegenerated;
        assert_eq!(kind.body(&t), kind.body(&t));
    }

    #[test]
    fn missing_translation_keys_surface_as_keys() {
        let t = Translator::with_catalog("en", HashMap::new());
        let body = SecurityNotification::PasswordChanged.body(&t);
        assert_eq!(
            body,
            "security.password_changed_body security.if_this_was_not_you"
        );
    }

    #[test]
    fn only_security_methods_map_to_notifications() {
        assert_eq!(
            SecurityNotification::for_api_method("regenerateRecoveryCodes"),
            Some(SecurityNotification::RecoveryCodesRegenerated)
        );
        assert_eq!(
            SecurityNotification::for_api_method("updateContainerVariable"),
            None
        );
    }

    #[test]
    fn build_fills_recipient_and_subject() {
        let email =
            SecurityNotification::RecoveryCodesRegenerated.build(&translator(), "admin@example.org");
        assert_eq!(email.to, "admin@example.org");
        assert_eq!(email.subject, "Security notification");
    }

    #[tokio::test]
    async fn file_transport_spools_json_lines() {
        let n = NEXT_SPOOL.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "activity-tracker-spool-{}-{}.json",
            std::process::id(),
            n
        ));

        let mut transport = FileMailTransport::new(path.clone());
        let email = SecurityNotification::RecoveryCodesRegenerated
            .build(&translator(), "admin@example.org");
        transport.send(&email).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Email = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed, email);

        std::fs::remove_file(path).ok();
    }
}
