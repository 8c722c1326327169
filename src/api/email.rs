//! Background notification dispatch and delivery abstractions.
//!
//! Handlers call `Notifier::dispatch` and return straight away. Messages travel
//! over an unbounded channel to a single worker task, which hands each one to an
//! `EmailSender` on the blocking pool (senders are synchronous and may do I/O).
//! A failing or panicking send is logged and the worker moves on.
//!
//! The worker ends once every `Notifier` clone has been dropped and the queue is
//! empty; `NotifierWorker::drain` waits for that during shutdown.
//!
//! The default sender is `LogEmailSender`, which logs and returns `Ok(())`.
//! Payloads carry one-time token plaintexts, so neither the sender nor the
//! `Debug` output of a message ever includes the payload itself.

use anyhow::Result;
use serde_json::Value;
use std::{fmt, sync::Arc};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument, debug, error, info, info_span};

#[derive(Clone)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

impl EmailMessage {
    #[must_use]
    pub fn new(to_email: &str, template: &str, payload: &Value) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: template.to_string(),
            payload_json: payload.to_string(),
        }
    }
}

impl fmt::Debug for EmailMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailMessage")
            .field("to_email", &self.to_email)
            .field("template", &self.template)
            .field("payload_bytes", &self.payload_json.len())
            .finish()
    }
}

/// Email delivery abstraction used by the notifier worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to have it logged as failed.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Sender that logs the message instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogEmailSender {
    from: String,
}

impl LogEmailSender {
    #[must_use]
    pub fn new(from: String) -> Self {
        Self { from }
    }
}

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            from = %self.from,
            to_email = %message.to_email,
            template = %message.template,
            payload_bytes = message.payload_json.len(),
            "email send stub"
        );
        Ok(())
    }
}

/// Fire-and-forget handle used by request handlers.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<EmailMessage>,
}

impl Notifier {
    /// Queue a message. Never blocks; a closed queue is logged and the message dropped.
    pub fn dispatch(&self, message: EmailMessage) {
        let template = message.template.clone();
        if self.tx.send(message).is_err() {
            error!(template, "notifier is closed, dropping message");
        } else {
            debug!(template, "notification queued");
        }
    }
}

#[derive(Debug)]
pub struct NotifierWorker {
    task: JoinHandle<()>,
}

impl NotifierWorker {
    /// Wait until every queued message has been handed to the sender.
    /// Only returns once all `Notifier` clones are gone.
    pub async fn drain(self) {
        if let Err(err) = self.task.await {
            error!("notifier worker failed: {err}");
        } else {
            info!("notifier drained");
        }
    }
}

/// Spawn the delivery worker and return the handle handlers dispatch through.
#[must_use]
pub fn spawn_notifier(sender: Arc<dyn EmailSender>) -> (Notifier, NotifierWorker) {
    let (tx, mut rx) = mpsc::unbounded_channel::<EmailMessage>();
    let task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let span = info_span!("email.send", template = %message.template);
            let sender = Arc::clone(&sender);
            let result = tokio::task::spawn_blocking(move || sender.send(&message))
                .instrument(span)
                .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("email send failed: {err:#}"),
                Err(err) => error!("email send panicked: {err}"),
            }
        }
    });
    (Notifier { tx }, NotifierWorker { task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;
    use crate::auth::token::generate_plaintext;
    use std::{io, sync::Mutex};

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<String>>,
    }

    impl EmailSender for RecordingSender {
        fn send(&self, message: &EmailMessage) -> Result<()> {
            match message.template.as_str() {
                "explode" => panic!("sender blew up"),
                "fail" => Err(anyhow!("smtp unavailable")),
                template => {
                    self.sent
                        .lock()
                        .map_err(|_| anyhow!("poisoned"))?
                        .push(template.to_string());
                    Ok(())
                }
            }
        }
    }

    #[tokio::test]
    async fn drain_delivers_everything_queued() -> Result<()> {
        let sender = Arc::new(RecordingSender::default());
        let (notifier, worker) = spawn_notifier(sender.clone());
        let payload = json!({"userID": 1});

        for template in ["user_welcome", "fail", "explode", "token_activation"] {
            notifier.dispatch(EmailMessage::new("a@example.com", template, &payload));
        }
        drop(notifier);
        worker.drain().await;

        let sent = sender.sent.lock().map_err(|_| anyhow!("poisoned"))?;
        assert_eq!(*sent, ["user_welcome", "token_activation"]);
        Ok(())
    }

    #[tokio::test]
    async fn clones_keep_the_worker_alive() -> Result<()> {
        let sender = Arc::new(RecordingSender::default());
        let (notifier, worker) = spawn_notifier(sender.clone());
        let clone = notifier.clone();
        drop(notifier);

        clone.dispatch(EmailMessage::new("b@example.com", "late", &json!({})));
        drop(clone);
        worker.drain().await;

        assert_eq!(sender.sent.lock().map_err(|_| anyhow!("poisoned"))?.len(), 1);
        Ok(())
    }

    #[test]
    fn log_sender_accepts() {
        let sender = LogEmailSender::new("noreply@reelgate.dev".to_string());
        let message = EmailMessage::new("c@example.com", "user_welcome", &json!({}));
        assert!(sender.send(&message).is_ok());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .map_err(|_| io::Error::other("poisoned"))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn log_sender_never_logs_token_plaintexts() -> Result<()> {
        let plaintext = generate_plaintext()?;
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let sender = LogEmailSender::new("noreply@reelgate.dev".to_string());
        let message = EmailMessage::new(
            "d@example.com",
            "user_welcome",
            &json!({"activationToken": plaintext, "userID": 4}),
        );
        tracing::subscriber::with_default(subscriber, || sender.send(&message))?;

        let out = String::from_utf8(captured.0.lock().map_err(|_| anyhow!("poisoned"))?.clone())?;
        assert!(out.contains("email send stub"));
        assert!(out.contains("user_welcome"));
        assert!(!out.contains(&plaintext));
        assert!(!format!("{message:?}").contains(&plaintext));
        Ok(())
    }
}
