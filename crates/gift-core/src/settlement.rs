//! # Webhook Processor
//!
//! Drives every provider callback through the payment state machine:
//!
//! ```text
//!   pre_checkout_query ──► lookup by payload ──► accept / reject   (read-only,
//!                              │                                    raced against
//!                              └── deadline hit ──► transient reject  the deadline)
//!
//!   successful_payment ──► CAS on charge id ──► paid (+ item gifted) ──► notify
//!                              └── already stamped ──► no-op
//! ```
//!
//! Pre-checkout never mutates state. Settlement mutates at most once per
//! record no matter how often the provider redelivers the callback.

use crate::donation::DonationChannel;
use crate::error::{GiftError, GiftResult};
use crate::event::{CallbackQuery, PaymentConfirmation, PreCheckoutQuery, ProviderEvent};
use crate::order::DonationStatus;
use crate::payload::{InvoicePayload, PayloadError, PayloadKind};
use crate::provider::{InlineKeyboard, KeyboardButton, PreCheckoutAnswer, SharedProvider};
use crate::store::{SettleOutcome, SharedStore};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Default internal budget for answering a pre-checkout query
pub const PRECHECKOUT_DEADLINE: Duration = Duration::from_millis(8000);

/// The provider abandons a pre-checkout query that is not answered within this
pub const PROVIDER_ANSWER_LIMIT: Duration = Duration::from_secs(10);

/// Budget for delivering the answer itself once the decision is made
pub const PRECHECKOUT_ANSWER_TIMEOUT: Duration = Duration::from_millis(1500);

/// Amounts offered on the `/start` donation keyboard
pub const STAR_AMOUNTS: [i64; 5] = [50, 100, 250, 500, 1000];

/// Callback data prefix of the donation keyboard buttons
const STARS_CALLBACK_PREFIX: &str = "stars_";

/// Amount used when a `stars_` button carries no number
const FALLBACK_CALLBACK_AMOUNT: i64 = 100;

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub precheckout_deadline: Duration,
    /// Chat that receives a line for every settled donation
    pub admin_chat_id: Option<i64>,
    pub star_amounts: Vec<i64>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            precheckout_deadline: PRECHECKOUT_DEADLINE,
            admin_chat_id: None,
            star_amounts: STAR_AMOUNTS.to_vec(),
        }
    }
}

impl SettlementConfig {
    /// Builder: override the pre-checkout deadline
    pub fn with_precheckout_deadline(mut self, deadline: Duration) -> Self {
        self.precheckout_deadline = deadline;
        self
    }

    /// Builder: route donation notices to an admin chat
    pub fn with_admin_chat(mut self, chat_id: i64) -> Self {
        self.admin_chat_id = Some(chat_id);
        self
    }

    /// The lookup deadline plus the answer call must fit the provider window.
    pub fn validate(&self) -> GiftResult<()> {
        let max_deadline = PROVIDER_ANSWER_LIMIT - PRECHECKOUT_ANSWER_TIMEOUT;
        if self.precheckout_deadline.is_zero() || self.precheckout_deadline >= max_deadline {
            return Err(GiftError::Configuration(format!(
                "pre-checkout deadline must be between 1ms and {}ms, got {}ms",
                max_deadline.as_millis() - 1,
                self.precheckout_deadline.as_millis()
            )));
        }
        if self.star_amounts.iter().any(|amount| *amount < 1) {
            return Err(GiftError::Configuration(
                "donation keyboard amounts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why a pre-checkout query was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotFound(PayloadKind),
    /// Record exists but is no longer awaiting payment
    NoLongerPending(PayloadKind),
    AmountMismatch { expected: i64, proposed: i64 },
    UnknownPayload,
    /// Lookup failed or blew the deadline; the donor may retry
    Transient,
}

impl RejectReason {
    /// Human-readable text shown to the donor
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::NotFound(PayloadKind::Order) => "Order not found",
            RejectReason::NotFound(PayloadKind::Donation) => "Donation not found",
            RejectReason::NoLongerPending(PayloadKind::Order) => "This item is no longer reserved",
            RejectReason::NoLongerPending(PayloadKind::Donation) => "Already paid",
            RejectReason::AmountMismatch { .. } => "Amount does not match",
            RejectReason::UnknownPayload => "Unknown payload",
            RejectReason::Transient => "Please try again in a minute",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreCheckoutDecision {
    Accept,
    Reject(RejectReason),
}

impl PreCheckoutDecision {
    /// Accept only if the record exists, awaits payment and the amount matches.
    fn evaluate(kind: PayloadKind, record: Option<(bool, i64)>, proposed: i64) -> Self {
        match record {
            None => PreCheckoutDecision::Reject(RejectReason::NotFound(kind)),
            Some((false, _)) => PreCheckoutDecision::Reject(RejectReason::NoLongerPending(kind)),
            Some((true, expected)) if expected != proposed => {
                PreCheckoutDecision::Reject(RejectReason::AmountMismatch { expected, proposed })
            }
            Some((true, _)) => PreCheckoutDecision::Accept,
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, PreCheckoutDecision::Accept)
    }

    pub fn answer(&self) -> PreCheckoutAnswer {
        match self {
            PreCheckoutDecision::Accept => PreCheckoutAnswer::Accept,
            PreCheckoutDecision::Reject(reason) => PreCheckoutAnswer::Reject {
                error_message: reason.message().to_string(),
            },
        }
    }
}

/// What a payment confirmation did to persistent state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    OrderSettled { order_id: Uuid, item_gifted: bool },
    DonationSettled { donation_id: Uuid },
    /// Redelivery of an already settled payment
    Duplicate(PayloadKind),
    /// Payload names no record
    NothingToSettle,
    /// Record can never be paid (cancelled)
    Refused(PayloadKind),
    UnknownPayload,
    /// The store failed after the webhook was acknowledged. Logged; the
    /// captured payment needs operator reconciliation.
    Failed(String),
}

/// Result of one [`WebhookProcessor::handle`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    PreCheckout(PreCheckoutDecision),
    Settlement(SettlementOutcome),
    MenuSent,
    CallbackHandled,
    Ignored,
}

pub struct WebhookProcessor {
    store: SharedStore,
    provider: SharedProvider,
    donations: DonationChannel,
    config: SettlementConfig,
}

impl WebhookProcessor {
    pub fn new(store: SharedStore, provider: SharedProvider, config: SettlementConfig) -> Self {
        let donations = DonationChannel::new(store.clone(), provider.clone());
        Self {
            store,
            provider,
            donations,
            config,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Process one provider event. Never fails: every error is logged and
    /// folded into the outcome.
    pub async fn handle(&self, event: ProviderEvent) -> EventOutcome {
        debug!("Webhook event: {}", event.kind());
        match event {
            ProviderEvent::PreCheckout(query) => {
                EventOutcome::PreCheckout(self.pre_checkout(&query).await)
            }
            ProviderEvent::PaymentConfirmed(payment) => {
                EventOutcome::Settlement(self.confirm_payment(&payment).await)
            }
            ProviderEvent::StartCommand { chat_id } => {
                self.send_menu(chat_id).await;
                EventOutcome::MenuSent
            }
            ProviderEvent::CallbackQuery(query) => {
                self.callback(&query).await;
                EventOutcome::CallbackHandled
            }
            ProviderEvent::Ignored { .. } => EventOutcome::Ignored,
        }
    }

    /// Validate a proposed payment and answer the provider.
    ///
    /// The lookup is raced against the configured deadline; losing the race
    /// produces a transient rejection so the answer always goes out in time.
    #[instrument(skip(self, query), fields(query_id = %query.id))]
    pub async fn pre_checkout(&self, query: &PreCheckoutQuery) -> PreCheckoutDecision {
        let started = tokio::time::Instant::now();

        let decision = tokio::select! {
            result = self.evaluate_pre_checkout(query) => match result {
                Ok(decision) => decision,
                Err(e) => {
                    error!("Pre-checkout lookup failed: {}", e);
                    PreCheckoutDecision::Reject(RejectReason::Transient)
                }
            },
            _ = tokio::time::sleep(self.config.precheckout_deadline) => {
                warn!(
                    "Pre-checkout lookup exceeded {}ms, rejecting",
                    self.config.precheckout_deadline.as_millis()
                );
                PreCheckoutDecision::Reject(RejectReason::Transient)
            }
        };

        let reply = self
            .provider
            .answer_pre_checkout(&query.id, &decision.answer())
            .await;
        let elapsed = started.elapsed();

        if !reply.ok {
            error!("Failed to answer pre-checkout query: {}", reply.reason());
        }
        match decision {
            PreCheckoutDecision::Accept => info!(
                "Pre-checkout accepted: payload={}, amount={} XTR, {}ms",
                query.payload,
                query.total_amount,
                elapsed.as_millis()
            ),
            PreCheckoutDecision::Reject(reason) => warn!(
                "Pre-checkout rejected: payload={}, reason={:?}, {}ms",
                query.payload,
                reason,
                elapsed.as_millis()
            ),
        }
        if elapsed >= PROVIDER_ANSWER_LIMIT {
            error!("Pre-checkout answered after {}ms", elapsed.as_millis());
        }

        decision
    }

    /// Answer a pre-checkout query whose update could not be read.
    ///
    /// Only the query id survived parsing, so the donor gets a transient
    /// rejection instead of a provider timeout.
    pub async fn reject_unreadable_pre_checkout(&self, query_id: &str) -> PreCheckoutDecision {
        let decision = PreCheckoutDecision::Reject(RejectReason::Transient);
        let reply = self.provider.answer_pre_checkout(query_id, &decision.answer()).await;
        if reply.ok {
            warn!("Rejected unreadable pre-checkout query {}", query_id);
        } else {
            error!("Failed to answer pre-checkout query: {}", reply.reason());
        }
        decision
    }

    async fn evaluate_pre_checkout(&self, query: &PreCheckoutQuery) -> GiftResult<PreCheckoutDecision> {
        let payload = match query.payload.parse::<InvoicePayload>() {
            Ok(payload) => payload,
            Err(PayloadError::UnknownScheme) => {
                return Ok(PreCheckoutDecision::Reject(RejectReason::UnknownPayload))
            }
            Err(PayloadError::MalformedId { kind }) => {
                return Ok(PreCheckoutDecision::Reject(RejectReason::NotFound(kind)))
            }
        };

        let record = match payload {
            InvoicePayload::Order(id) => self
                .store
                .order(id)
                .await?
                .map(|o| (o.is_live(Utc::now()) && !o.is_settled(), o.amount_xtr)),
            InvoicePayload::Donation(id) => self
                .store
                .donation(id)
                .await?
                .map(|d| (d.status == DonationStatus::Pending && !d.is_settled(), d.amount_xtr)),
        };

        Ok(PreCheckoutDecision::evaluate(
            payload.kind(),
            record,
            query.total_amount,
        ))
    }

    /// Settle a captured payment at most once, then notify best-effort.
    #[instrument(skip(self, payment), fields(charge_id = %payment.charge_id))]
    pub async fn confirm_payment(&self, payment: &PaymentConfirmation) -> SettlementOutcome {
        let payload = match payment.payload.parse::<InvoicePayload>() {
            Ok(payload) => payload,
            Err(PayloadError::UnknownScheme) => {
                warn!("Payment with unknown payload: {}", payment.payload);
                return SettlementOutcome::UnknownPayload;
            }
            Err(PayloadError::MalformedId { kind }) => {
                warn!("Payment for malformed {} payload: {}", kind, payment.payload);
                return SettlementOutcome::NothingToSettle;
            }
        };

        let now = Utc::now();
        match payload {
            InvoicePayload::Order(order_id) => {
                match self.store.settle_order(order_id, &payment.charge_id, now).await {
                    Ok(SettleOutcome::Settled { record, item_gifted }) => {
                        if record.amount_xtr != payment.total_amount {
                            warn!(
                                "Order {} paid {} XTR, expected {}",
                                record.id, payment.total_amount, record.amount_xtr
                            );
                        }
                        if !item_gifted {
                            warn!(
                                "Late payment for order {}: item {} is held by another order",
                                record.id, record.item_id
                            );
                        }
                        info!("Order paid: order={}, item={}", record.id, record.item_id);

                        let chat_id = payment.chat_id.unwrap_or(record.donor.telegram_id);
                        self.notify(
                            chat_id,
                            &format!("✅ Gift paid! {} Stars.", payment.total_amount),
                        )
                        .await;

                        SettlementOutcome::OrderSettled {
                            order_id: record.id,
                            item_gifted,
                        }
                    }
                    Ok(SettleOutcome::AlreadySettled(order)) => {
                        info!("Duplicate payment confirmation for order {}", order.id);
                        SettlementOutcome::Duplicate(PayloadKind::Order)
                    }
                    Ok(SettleOutcome::Refused(order)) => {
                        error!(
                            "Payment captured for {} order {}",
                            order.status.as_str(),
                            order.id
                        );
                        SettlementOutcome::Refused(PayloadKind::Order)
                    }
                    Ok(SettleOutcome::NotFound) => {
                        warn!("Payment for unknown order {}", order_id);
                        SettlementOutcome::NothingToSettle
                    }
                    Err(e) => {
                        error!("Failed to settle order {}: {}", order_id, e);
                        SettlementOutcome::Failed(e.to_string())
                    }
                }
            }
            InvoicePayload::Donation(donation_id) => {
                match self
                    .store
                    .settle_donation(donation_id, &payment.charge_id, now)
                    .await
                {
                    Ok(SettleOutcome::Settled { record, .. }) => {
                        info!(
                            "Donation paid: id={}, amount={} XTR",
                            record.id, payment.total_amount
                        );

                        let chat_id = payment.chat_id.unwrap_or(record.donor.telegram_id);
                        self.notify(
                            chat_id,
                            &format!(
                                "✅ Thank you! Payment of {} Stars received.",
                                payment.total_amount
                            ),
                        )
                        .await;

                        if let Some(admin) = self.config.admin_chat_id {
                            let donor = payment.from.as_ref().unwrap_or(&record.donor);
                            self.notify(
                                admin,
                                &format!(
                                    "💰 Donation: {} Stars from {} (id: {})",
                                    payment.total_amount,
                                    donor.label(),
                                    donor.telegram_id
                                ),
                            )
                            .await;
                        }

                        SettlementOutcome::DonationSettled {
                            donation_id: record.id,
                        }
                    }
                    Ok(SettleOutcome::AlreadySettled(donation)) => {
                        info!("Duplicate payment confirmation for donation {}", donation.id);
                        SettlementOutcome::Duplicate(PayloadKind::Donation)
                    }
                    Ok(SettleOutcome::Refused(_)) => SettlementOutcome::Refused(PayloadKind::Donation),
                    Ok(SettleOutcome::NotFound) => {
                        warn!("Payment for unknown donation {}", donation_id);
                        SettlementOutcome::NothingToSettle
                    }
                    Err(e) => {
                        error!("Failed to settle donation {}: {}", donation_id, e);
                        SettlementOutcome::Failed(e.to_string())
                    }
                }
            }
        }
    }

    /// Reply to `/start` with the donation keyboard
    async fn send_menu(&self, chat_id: i64) {
        let buttons = self
            .config
            .star_amounts
            .iter()
            .map(|amount| KeyboardButton {
                text: format!("⭐ {}", amount),
                callback_data: format!("{STARS_CALLBACK_PREFIX}{amount}"),
            })
            .collect();
        let keyboard = InlineKeyboard::single_row(buttons);

        let reply = self
            .provider
            .send_message(
                chat_id,
                "⭐ Send Telegram Stars\n\nChoose an amount:",
                Some(&keyboard),
            )
            .await;
        if !reply.ok {
            warn!("Failed to send donation menu to {}: {}", chat_id, reply.reason());
        }
    }

    async fn callback(&self, query: &CallbackQuery) {
        let reply = self.provider.answer_callback_query(&query.id).await;
        if !reply.ok {
            warn!("Failed to answer callback query: {}", reply.reason());
        }

        let Some(raw) = query.data.strip_prefix(STARS_CALLBACK_PREFIX) else {
            debug!("Ignoring callback data {:?}", query.data);
            return;
        };
        let amount = raw.parse::<i64>().unwrap_or(FALLBACK_CALLBACK_AMOUNT);
        if amount < 1 {
            return;
        }

        let chat_id = query.chat_id.unwrap_or(query.from.telegram_id);
        if let Err(e) = self
            .donations
            .create_in_chat(chat_id, query.from.clone(), amount)
            .await
        {
            error!("Donation from keyboard failed: {}", e);
            let text = match e {
                GiftError::InvoiceRejected { reason } => format!("Error: {}", reason),
                _ => "Error: could not create invoice".to_string(),
            };
            self.notify(chat_id, &text).await;
        }
    }

    async fn notify(&self, chat_id: i64, text: &str) {
        let reply = self.provider.send_message(chat_id, text, None).await;
        if !reply.ok {
            warn!("Notification to {} failed: {}", chat_id, reply.reason());
        }
    }
}
