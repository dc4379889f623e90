//! Due-date reminders
//!
//! Records carrying a `dueDate` trigger reminders at 7, 2 and 1 days out and
//! on the day itself. Each reminder goes out at most once per record; the
//! sent-state lives in a storage slot so it survives restarts. Delivery is
//! somebody else's job: messages are handed to a [`NotificationRelay`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::record_store::PlaintextRecord;
use crate::storage::{RecordId, VaultStorage};

/// Slot holding the sent-state map
pub const NOTIFICATION_STATE_SLOT: &str = "contract_vault_notification_state";

/// Slot holding the reminder email preference
pub const NOTIFICATION_EMAIL_SLOT: &str = "notification_email";

/// Sent-state of records overdue by more than this many days is dropped
const FORGET_AFTER_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpiryThreshold {
    SevenDays,
    TwoDays,
    OneDay,
    Today,
}

impl ExpiryThreshold {
    pub const ALL: [ExpiryThreshold; 4] = [
        ExpiryThreshold::SevenDays,
        ExpiryThreshold::TwoDays,
        ExpiryThreshold::OneDay,
        ExpiryThreshold::Today,
    ];

    pub fn days(self) -> i64 {
        match self {
            ExpiryThreshold::SevenDays => 7,
            ExpiryThreshold::TwoDays => 2,
            ExpiryThreshold::OneDay => 1,
            ExpiryThreshold::Today => 0,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ExpiryThreshold::SevenDays => "7 days until expiration",
            ExpiryThreshold::TwoDays => "2 days until expiration",
            ExpiryThreshold::OneDay => "1 day until expiration",
            ExpiryThreshold::Today => "Expires today",
        }
    }
}

/// Plain payload handed to the relay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderMessage {
    pub contract_id: RecordId,
    pub title: String,
    pub provider: String,
    pub days_until_due: i64,
    pub notification_type: ExpiryThreshold,
    pub notification_message: String,
    pub user_email: String,
}

/// External delivery channel (email relay, etc.)
#[async_trait]
pub trait NotificationRelay: Send + Sync {
    async fn send(&self, message: &ReminderMessage) -> Result<()>;
}

/// Relay that only logs. Used by the CLI for dry runs.
pub struct LogRelay;

#[async_trait]
impl NotificationRelay for LogRelay {
    async fn send(&self, message: &ReminderMessage) -> Result<()> {
        tracing::info!(
            contract = %message.contract_id,
            kind = ?message.notification_type,
            days = message.days_until_due,
            "reminder due"
        );
        Ok(())
    }
}

type SentState = BTreeMap<RecordId, BTreeMap<ExpiryThreshold, DateTime<Utc>>>;

/// Persisted "already sent" map, keyed by record id
pub struct NotificationStateStore<S: VaultStorage> {
    storage: Arc<S>,
}

impl<S: VaultStorage> NotificationStateStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    async fn load(&self) -> Result<SentState> {
        let Some(raw) = self.storage.get_slot(NOTIFICATION_STATE_SLOT).await? else {
            return Ok(SentState::new());
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(error = %e, "notification state unreadable, starting fresh");
                Ok(SentState::new())
            }
        }
    }

    async fn save(&self, state: &SentState) -> Result<()> {
        let raw = serde_json::to_string(state)?;
        self.storage.put_slot(NOTIFICATION_STATE_SLOT, &raw).await
    }

    pub async fn sent_for(&self, id: &RecordId) -> Result<BTreeMap<ExpiryThreshold, DateTime<Utc>>> {
        Ok(self.load().await?.remove(id).unwrap_or_default())
    }

    pub async fn has_been_sent(&self, id: &RecordId, threshold: ExpiryThreshold) -> Result<bool> {
        Ok(self.sent_for(id).await?.contains_key(&threshold))
    }

    pub async fn mark_sent(&self, id: &RecordId, threshold: ExpiryThreshold, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.load().await?;
        state.entry(id.clone()).or_default().insert(threshold, at);
        self.save(&state).await
    }

    pub async fn clear(&self, id: &RecordId) -> Result<()> {
        let mut state = self.load().await?;
        if state.remove(id).is_some() {
            self.save(&state).await?;
        }
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.storage.delete_slot(NOTIFICATION_STATE_SLOT).await
    }
}

/// Persisted reminder recipient, edited by the user
pub struct NotificationPreferences<S: VaultStorage> {
    storage: Arc<S>,
}

impl<S: VaultStorage> NotificationPreferences<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub async fn get_email(&self) -> Result<Option<String>> {
        Ok(self
            .storage
            .get_slot(NOTIFICATION_EMAIL_SLOT)
            .await?
            .filter(|email| !email.is_empty()))
    }

    /// Store `email` as the recipient. A blank value clears the preference.
    pub async fn save_email(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return self.clear_email().await;
        }
        if !email.contains('@') {
            return Err(VaultError::Notification(format!("Invalid reminder email {:?}", email)));
        }

        self.storage.put_slot(NOTIFICATION_EMAIL_SLOT, email).await?;
        tracing::info!("reminder email saved");
        Ok(())
    }

    pub async fn clear_email(&self) -> Result<()> {
        self.storage.delete_slot(NOTIFICATION_EMAIL_SLOT).await
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct NotificationSummary {
    pub sent: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

pub fn days_until_due(due: NaiveDate, today: NaiveDate) -> i64 {
    (due - today).num_days()
}

pub struct ExpiryNotifier<S: VaultStorage, R: NotificationRelay> {
    state: NotificationStateStore<S>,
    preferences: NotificationPreferences<S>,
    relay: Arc<R>,
    recipient: Option<String>,
}

impl<S: VaultStorage, R: NotificationRelay> ExpiryNotifier<S, R> {
    /// `recipient` overrides the stored preference when set
    pub fn new(storage: Arc<S>, relay: Arc<R>, recipient: Option<String>) -> Self {
        Self {
            state: NotificationStateStore::new(Arc::clone(&storage)),
            preferences: NotificationPreferences::new(storage),
            relay,
            recipient,
        }
    }

    pub fn set_recipient(&mut self, recipient: Option<String>) {
        self.recipient = recipient;
    }

    pub fn state(&self) -> &NotificationStateStore<S> {
        &self.state
    }

    pub fn preferences(&self) -> &NotificationPreferences<S> {
        &self.preferences
    }

    /// Configured recipient, else the stored preference
    pub async fn recipient(&self) -> Result<Option<String>> {
        match &self.recipient {
            Some(recipient) => Ok(Some(recipient.clone())),
            None => self.preferences.get_email().await,
        }
    }

    /// Send every reminder that is due as of `today` and not yet sent.
    ///
    /// Relay failures are collected, not returned; the reminder stays unsent
    /// and is retried on the next check. Each delivered reminder is recorded
    /// before the next one is attempted.
    pub async fn check_and_notify(
        &self,
        records: &[PlaintextRecord],
        today: NaiveDate,
    ) -> Result<NotificationSummary> {
        let mut summary = NotificationSummary::default();

        let Some(recipient) = self.recipient().await? else {
            tracing::warn!("no recipient configured, reminders not sent");
            summary.skipped = records.len();
            return Ok(summary);
        };

        let mut state = self.state.load().await?;
        let mut forgotten = false;

        for record in records {
            let Some(due) = record.get_str("dueDate").and_then(parse_due_date) else {
                summary.skipped += 1;
                continue;
            };

            let days = days_until_due(due, today);
            if days < -FORGET_AFTER_DAYS {
                forgotten |= state.remove(&record.id).is_some();
                continue;
            }
            if days < 0 {
                continue;
            }

            for threshold in ExpiryThreshold::ALL {
                if days > threshold.days() {
                    continue;
                }
                let already_sent = state
                    .get(&record.id)
                    .map(|sent| sent.contains_key(&threshold))
                    .unwrap_or(false);
                if already_sent {
                    continue;
                }

                let message = reminder(record, days, threshold, &recipient);
                match self.relay.send(&message).await {
                    Ok(()) => {
                        state
                            .entry(record.id.clone())
                            .or_default()
                            .insert(threshold, Utc::now());
                        self.state.save(&state).await?;
                        summary.sent += 1;
                    }
                    Err(e) => {
                        tracing::warn!(contract = %record.id, error = %e, "reminder not delivered");
                        summary.errors.push(e.to_string());
                    }
                }
            }
        }

        if forgotten {
            self.state.save(&state).await?;
        }

        tracing::info!(sent = summary.sent, skipped = summary.skipped, "reminders checked");
        Ok(summary)
    }

    /// Forget what was sent for a record (after it is edited or deleted)
    pub async fn clear_notifications(&self, id: &RecordId) -> Result<()> {
        self.state.clear(id).await
    }
}

fn reminder(
    record: &PlaintextRecord,
    days: i64,
    threshold: ExpiryThreshold,
    recipient: &str,
) -> ReminderMessage {
    ReminderMessage {
        contract_id: record.id.clone(),
        title: record.get_str("title").unwrap_or("(Untitled)").to_string(),
        provider: record.get_str("provider").unwrap_or("(No provider)").to_string(),
        days_until_due: days.max(0),
        notification_type: threshold,
        notification_message: threshold.message().to_string(),
        user_email: recipient.to_string(),
    }
}
