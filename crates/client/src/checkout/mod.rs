//! Checkout state machine.
//!
//! ```text
//! Idle -> OrderCreating -> IntentReady -> Confirming -> Succeeded
//!              |                |              |
//!        Failed(Order)   Failed(Intent)   Failed(Payment)
//! ```
//!
//! `OrderCreating` covers both backend calls that precede payment: creating
//! the order and requesting its payment intent. `Failed(Order)` leaves
//! nothing pending on the backend and is treated like `Idle`.
//! `Failed(Intent)` is recovered with [`CheckoutOrchestrator::retry_payment_intent`]
//! and `Failed(Payment)` by calling [`CheckoutOrchestrator::confirm_payment`]
//! again; neither creates a second order.
//!
//! Each checkout carries an attempt id. A step that completes after the
//! checkout was abandoned or restarted reports [`CheckoutError::Superseded`]
//! and changes nothing.

mod error;

pub use error::CheckoutError;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use shopsession_core::{OrderId, PaymentStatus, Totals};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::api::{ConfirmPaymentRequest, CreateOrderRequest, PaymentIntent, ShopClient};
use crate::cart::CartStore;
use crate::gateway::{GatewayConfirmation, PaymentGateway, PaymentMethodDetails};

/// Confirmation attempts allowed per checkout unless configured otherwise.
pub const DEFAULT_MAX_CONFIRMATION_ATTEMPTS: u32 = 3;

/// The step a checkout failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStep {
    Order,
    Intent,
    Payment,
}

/// Where a checkout stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutPhase {
    #[default]
    Idle,
    OrderCreating,
    IntentReady,
    Confirming,
    Succeeded,
    Failed(FailedStep),
}

impl CheckoutPhase {
    /// Whether a new checkout may start from this phase.
    #[must_use]
    pub const fn accepts_new_checkout(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Succeeded | Self::Failed(FailedStep::Order)
        )
    }
}

impl fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::OrderCreating => "creating the order",
            Self::IntentReady => "ready for payment",
            Self::Confirming => "confirming payment",
            Self::Succeeded => "complete",
            Self::Failed(FailedStep::Order) => "failed at order creation",
            Self::Failed(FailedStep::Intent) => "failed at payment intent creation",
            Self::Failed(FailedStep::Payment) => "failed at payment",
        };
        f.write_str(s)
    }
}

/// Public view of the current checkout. Never contains the client secret.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckoutSnapshot {
    pub attempt_id: Option<Uuid>,
    pub phase: CheckoutPhase,
    pub order_id: Option<OrderId>,
    pub payment_intent_id: Option<String>,
    /// Backend totals, present once a payment intent exists.
    pub totals: Option<Totals>,
    pub confirmation_attempts: u32,
}

struct Attempt {
    id: Uuid,
    phase: CheckoutPhase,
    save_payment_method: bool,
    order_id: Option<OrderId>,
    intent: Option<PaymentIntent>,
    /// Kept so a retry after a failed backend confirmation skips the gateway.
    gateway_confirmation: Option<GatewayConfirmation>,
    confirmation_attempts: u32,
}

impl Attempt {
    fn new(save_payment_method: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: CheckoutPhase::OrderCreating,
            save_payment_method,
            order_id: None,
            intent: None,
            gateway_confirmation: None,
            confirmation_attempts: 0,
        }
    }

    fn snapshot(&self) -> CheckoutSnapshot {
        CheckoutSnapshot {
            attempt_id: Some(self.id),
            phase: self.phase,
            order_id: self.order_id,
            payment_intent_id: self
                .intent
                .as_ref()
                .map(|intent| intent.payment_intent_id.clone()),
            totals: self.intent.as_ref().map(|intent| intent.totals),
            confirmation_attempts: self.confirmation_attempts,
        }
    }
}

fn snapshot_of(slot: &Option<Attempt>) -> CheckoutSnapshot {
    slot.as_ref()
        .map_or_else(CheckoutSnapshot::default, Attempt::snapshot)
}

/// Drives one purchase at a time from the cart to a confirmed order.
///
/// Cheap to clone; clones share the checkout.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    inner: Arc<CheckoutInner>,
}

struct CheckoutInner {
    shop: ShopClient,
    gateway: Arc<dyn PaymentGateway>,
    cart: CartStore,
    max_confirmation_attempts: u32,
    state: Mutex<Option<Attempt>>,
    events: watch::Sender<CheckoutSnapshot>,
}

impl CheckoutOrchestrator {
    #[must_use]
    pub fn new(
        shop: ShopClient,
        gateway: Arc<dyn PaymentGateway>,
        cart: CartStore,
        max_confirmation_attempts: u32,
    ) -> Self {
        Self {
            inner: Arc::new(CheckoutInner {
                shop,
                gateway,
                cart,
                max_confirmation_attempts: max_confirmation_attempts.max(1),
                state: Mutex::new(None),
                events: watch::Sender::new(CheckoutSnapshot::default()),
            }),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> CheckoutSnapshot {
        self.read(snapshot_of)
    }

    #[must_use]
    pub fn phase(&self) -> CheckoutPhase {
        self.read(|slot| slot.as_ref().map_or(CheckoutPhase::Idle, |a| a.phase))
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CheckoutSnapshot> {
        self.inner.events.subscribe()
    }

    /// Totals to show the user: the backend's once a payment intent exists,
    /// otherwise a provisional total computed from the cart.
    #[must_use]
    pub fn display_totals(&self) -> Totals {
        self.read(|slot| {
            slot.as_ref()
                .and_then(|a| a.intent.as_ref())
                .map(|intent| intent.totals)
        })
        .unwrap_or_else(|| Totals::provisional(self.inner.cart.cart_total()))
    }

    /// Create an order from the cart and request its payment intent.
    ///
    /// On success the checkout is `IntentReady` with backend totals.
    ///
    /// # Errors
    ///
    /// - `EmptyCart` without any network call
    /// - `AlreadyInProgress` if a checkout is past `Idle`
    /// - `Order` (phase `Failed(Order)`) or `Intent` (phase `Failed(Intent)`)
    /// - `Superseded` if the checkout was abandoned meanwhile
    #[instrument(skip(self))]
    pub async fn start_checkout(
        &self,
        save_payment_method: bool,
    ) -> Result<CheckoutSnapshot, CheckoutError> {
        let cart = self.inner.cart.snapshot();
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let attempt_id = self.update(|slot| {
            if slot
                .as_ref()
                .is_some_and(|a| !a.phase.accepts_new_checkout())
            {
                return Err(CheckoutError::AlreadyInProgress);
            }
            let attempt = Attempt::new(save_payment_method);
            let id = attempt.id;
            *slot = Some(attempt);
            Ok(id)
        })?;
        info!(%attempt_id, items = cart.items.len(), total = %cart.cart_total(), "Checkout started");

        let request = CreateOrderRequest::from_cart(&cart);
        let order = match self.inner.shop.create_order(&request).await {
            Ok(order) => order,
            Err(e) => {
                self.with_attempt(attempt_id, |a| {
                    a.phase = CheckoutPhase::Failed(FailedStep::Order);
                })?;
                warn!(error = %e, "Order creation failed");
                return Err(CheckoutError::Order(e));
            }
        };
        self.with_attempt(attempt_id, |a| a.order_id = Some(order.id))?;

        self.request_intent(attempt_id, order.id, save_payment_method)
            .await
    }

    /// Request a new payment intent for the existing order after
    /// `Failed(Intent)`.
    ///
    /// # Errors
    ///
    /// `InvalidPhase` outside `Failed(Intent)`; otherwise as
    /// [`Self::start_checkout`].
    #[instrument(skip(self))]
    pub async fn retry_payment_intent(&self) -> Result<CheckoutSnapshot, CheckoutError> {
        const ACTION: &str = "retry the payment intent";

        let (attempt_id, order_id, save) = self.update(|slot| {
            let phase = slot.as_ref().map_or(CheckoutPhase::Idle, |a| a.phase);
            let invalid = CheckoutError::InvalidPhase {
                action: ACTION,
                phase,
            };
            let Some(attempt) = slot
                .as_mut()
                .filter(|a| a.phase == CheckoutPhase::Failed(FailedStep::Intent))
            else {
                return Err(invalid);
            };
            let Some(order_id) = attempt.order_id else {
                return Err(invalid);
            };
            attempt.phase = CheckoutPhase::OrderCreating;
            Ok((attempt.id, order_id, attempt.save_payment_method))
        })?;

        self.request_intent(attempt_id, order_id, save).await
    }

    async fn request_intent(
        &self,
        attempt_id: Uuid,
        order_id: OrderId,
        save_payment_method: bool,
    ) -> Result<CheckoutSnapshot, CheckoutError> {
        match self
            .inner
            .shop
            .create_payment_intent(order_id, save_payment_method)
            .await
        {
            Ok(intent) => self.with_attempt(attempt_id, |a| {
                a.intent = Some(intent);
                a.phase = CheckoutPhase::IntentReady;
                a.snapshot()
            }),
            Err(e) => {
                self.with_attempt(attempt_id, |a| {
                    a.phase = CheckoutPhase::Failed(FailedStep::Intent);
                })?;
                warn!(error = %e, %order_id, "Payment intent creation failed");
                Err(CheckoutError::Intent(e))
            }
        }
    }

    /// Confirm the payment with the gateway, then with the backend.
    ///
    /// Valid from `IntentReady` and `Failed(Payment)`. On success the
    /// checkout is `Succeeded` and the cart has been cleared. If the gateway
    /// already accepted the payment in an earlier attempt, only the backend
    /// confirmation is re-sent.
    ///
    /// # Errors
    ///
    /// - `PaymentDeclined`, `Gateway`, `PaymentNotCompleted` or
    ///   `Confirmation`, leaving the checkout in `Failed(Payment)`
    /// - `RetryLimitReached` once the configured attempts are used up
    /// - `EmptyCart` if the cart was emptied; the checkout is abandoned
    /// - `AlreadyInProgress`, `InvalidPhase`, `Superseded`
    #[instrument(skip(self, details))]
    pub async fn confirm_payment(
        &self,
        details: &PaymentMethodDetails,
    ) -> Result<CheckoutSnapshot, CheckoutError> {
        let (attempt_id, intent, prior) = self.begin_confirmation()?;

        let gateway_confirmation = if let Some(confirmation) = prior {
            debug!("Gateway already accepted this payment, re-sending backend confirmation");
            confirmation
        } else {
            match self
                .inner
                .gateway
                .confirm_card_payment(&intent.client_secret, details)
                .await
            {
                Ok(confirmation) => {
                    self.with_attempt(attempt_id, |a| {
                        a.gateway_confirmation = Some(confirmation.clone());
                    })?;
                    confirmation
                }
                Err(e) => {
                    self.fail_payment(attempt_id)?;
                    warn!(error = %e, "Gateway did not accept the payment");
                    return Err(e.into());
                }
            }
        };

        let request = ConfirmPaymentRequest {
            payment_intent_id: intent.payment_intent_id.clone(),
            payment_method_id: gateway_confirmation.payment_method_id,
        };
        let confirmation = match self.inner.shop.confirm_payment(&request).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                self.fail_payment(attempt_id)?;
                warn!(error = %e, "Backend confirmation failed");
                return Err(CheckoutError::Confirmation(e));
            }
        };
        if !confirmation.status.is_success() {
            self.with_attempt(attempt_id, |a| {
                a.phase = CheckoutPhase::Failed(FailedStep::Payment);
                // A charge the gateway already took is only re-reported to the backend.
                if a
                    .gateway_confirmation
                    .as_ref()
                    .is_some_and(|c| !gateway_charged(&c.status))
                {
                    a.gateway_confirmation = None;
                }
            })?;
            warn!(status = ?confirmation.status, "Backend reported payment not completed");
            return Err(CheckoutError::PaymentNotCompleted(confirmation.status));
        }

        let (won, snapshot) = self.with_attempt(attempt_id, |a| {
            let won = a.phase == CheckoutPhase::Confirming;
            a.phase = CheckoutPhase::Succeeded;
            (won, a.snapshot())
        })?;
        if won {
            if let Err(e) = self.inner.cart.clear_cart() {
                warn!(error = %e, "Cart cleared in memory but not persisted");
            }
            info!(order_id = ?snapshot.order_id, "Checkout succeeded");
        }
        Ok(snapshot)
    }

    /// Check the entry conditions for a confirmation and move to `Confirming`.
    fn begin_confirmation(
        &self,
    ) -> Result<(Uuid, PaymentIntent, Option<GatewayConfirmation>), CheckoutError> {
        const ACTION: &str = "confirm payment";

        let cart_empty = self.inner.cart.is_empty();
        let max_attempts = self.inner.max_confirmation_attempts;
        self.update(|slot| {
            match slot.as_ref().map_or(CheckoutPhase::Idle, |a| a.phase) {
                CheckoutPhase::Confirming => return Err(CheckoutError::AlreadyInProgress),
                CheckoutPhase::IntentReady | CheckoutPhase::Failed(FailedStep::Payment) => {}
                phase => {
                    return Err(CheckoutError::InvalidPhase {
                        action: ACTION,
                        phase,
                    });
                }
            }
            if cart_empty {
                *slot = None;
                info!("Cart emptied during checkout, abandoning");
                return Err(CheckoutError::EmptyCart);
            }

            let Some(attempt) = slot.as_mut() else {
                return Err(CheckoutError::InvalidPhase {
                    action: ACTION,
                    phase: CheckoutPhase::Idle,
                });
            };
            if attempt.confirmation_attempts >= max_attempts {
                return Err(CheckoutError::RetryLimitReached {
                    attempts: attempt.confirmation_attempts,
                });
            }
            let Some(intent) = attempt.intent.clone() else {
                return Err(CheckoutError::InvalidPhase {
                    action: ACTION,
                    phase: attempt.phase,
                });
            };
            attempt.confirmation_attempts += 1;
            attempt.phase = CheckoutPhase::Confirming;
            debug!(
                attempt = attempt.confirmation_attempts,
                max_attempts, "Confirming payment"
            );
            Ok((attempt.id, intent, attempt.gateway_confirmation.clone()))
        })
    }

    fn fail_payment(&self, attempt_id: Uuid) -> Result<(), CheckoutError> {
        self.with_attempt(attempt_id, |a| {
            a.phase = CheckoutPhase::Failed(FailedStep::Payment);
        })
    }

    /// Discard the current checkout. In-flight steps report `Superseded`.
    pub fn abandon(&self) {
        let discarded = self.update(|slot| slot.take().map(|a| a.id));
        if let Some(attempt_id) = discarded {
            info!(%attempt_id, "Checkout abandoned");
        }
    }

    /// Abandon the checkout and cancel its pending order on the backend.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Api` if the backend refuses the cancellation.
    /// The local checkout is discarded either way.
    #[instrument(skip(self))]
    pub async fn cancel(&self) -> Result<(), CheckoutError> {
        let order_id = self.update(|slot| {
            slot.take()
                .filter(|a| a.phase != CheckoutPhase::Succeeded)
                .and_then(|a| a.order_id)
        });
        if let Some(order_id) = order_id {
            self.inner.shop.cancel_order(order_id).await?;
            info!(%order_id, "Checkout cancelled");
        }
        Ok(())
    }

    /// Run `f` on the attempt if it is still the current one.
    fn with_attempt<R>(
        &self,
        attempt_id: Uuid,
        f: impl FnOnce(&mut Attempt) -> R,
    ) -> Result<R, CheckoutError> {
        self.update(|slot| match slot.as_mut() {
            Some(attempt) if attempt.id == attempt_id => Ok(f(attempt)),
            _ => {
                debug!(%attempt_id, "Dropping result for superseded checkout");
                Err(CheckoutError::Superseded)
            }
        })
    }

    fn read<R>(&self, f: impl FnOnce(&Option<Attempt>) -> R) -> R {
        let slot = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&slot)
    }

    fn update<R>(&self, f: impl FnOnce(&mut Option<Attempt>) -> R) -> R {
        let mut slot = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut slot);
        let snapshot = snapshot_of(&slot);
        self.inner.events.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        result
    }
}

impl fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutOrchestrator")
            .field("snapshot", &self.snapshot())
            .field(
                "max_confirmation_attempts",
                &self.inner.max_confirmation_attempts,
            )
            .finish_non_exhaustive()
    }
}

/// Whether the gateway has taken or is taking the payment for the intent.
const fn gateway_charged(status: &PaymentStatus) -> bool {
    matches!(status, PaymentStatus::Succeeded | PaymentStatus::Processing)
}
