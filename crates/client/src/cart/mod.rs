//! Cart state container.
//!
//! The cart is a mapping of product id to line item plus the
//! checkout-adjacent fields (shipping address and order notes). It lives on
//! the client until checkout and is persisted after every mutation.
//!
//! # Operations
//!
//! Every change is one of the [`CartAction`] variants, applied through
//! [`CartStore::dispatch`]. The named methods (`add_item`, `remove_item`, ...)
//! are shorthands for dispatching a single action.
//!
//! # Invariants
//!
//! - Every stored quantity is at least 1. Setting a quantity to zero or less
//!   removes the entry.
//! - `cart_count` and `cart_total` are derived on demand and never stored.
//! - Every line total and the cart total fit in a [`Decimal`]. Mutations that
//!   would overflow are rejected.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shopsession_core::ProductId;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::storage::{CART_KEY, PersistentStore, Storage, StorageError};

/// Errors from cart mutations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Unit prices must be strictly positive.
    #[error("invalid unit price {price} for product {id}")]
    InvalidPrice { id: ProductId, price: Decimal },

    /// The line or cart total would not fit in a decimal.
    #[error("cart total overflows with product {id} at quantity {quantity}")]
    TotalOverflow { id: ProductId, quantity: u32 },

    /// The mutation was applied in memory but could not be persisted.
    #[error("failed to persist cart: {0}")]
    Storage(#[from] StorageError),
}

/// A product as offered to the cart by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
}

impl CartProduct {
    #[must_use]
    pub fn new(id: ProductId, name: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            unit_price,
        }
    }
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartItem {
    /// `unit_price × quantity`, saturating at [`Decimal::MAX`].
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price.saturating_mul(Decimal::from(self.quantity))
    }

    fn checked_line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Full cart record, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CartState {
    pub items: BTreeMap<ProductId, CartItem>,
    pub shipping_address: String,
    pub notes: String,
}

impl CartState {
    /// Sum of all quantities.
    #[must_use]
    pub fn cart_count(&self) -> u64 {
        self.items.values().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of all line totals. Display-only until the backend quotes totals.
    #[must_use]
    pub fn cart_total(&self) -> Decimal {
        self.items
            .values()
            .fold(Decimal::ZERO, |total, item| total.saturating_add(item.line_total()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cart total if `line` replaced the entry with the same id.
    fn checked_total_with(&self, line: &CartItem) -> Option<Decimal> {
        self.items
            .values()
            .filter(|item| item.id != line.id)
            .try_fold(line.checked_line_total()?, |total, item| {
                total.checked_add(item.checked_line_total()?)
            })
    }

    /// Drop entries that violate the item invariants and re-key by item id.
    fn sanitized(self) -> Self {
        let mut total = Decimal::ZERO;
        let items = self
            .items
            .into_values()
            .filter(|item| item.quantity >= 1 && item.unit_price > Decimal::ZERO)
            .filter(|item| match item
                .checked_line_total()
                .and_then(|line| total.checked_add(line))
            {
                Some(next) => {
                    total = next;
                    true
                }
                None => {
                    warn!(id = %item.id, "Dropping cart entry whose total overflows");
                    false
                }
            })
            .map(|item| (item.id, item))
            .collect();
        Self { items, ..self }
    }
}

/// The closed set of cart operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartAction {
    /// Insert with quantity 1, or increment an existing entry by 1.
    AddItem(CartProduct),
    /// Delete an entry. Absent ids are ignored.
    RemoveItem(ProductId),
    /// Set a quantity; values ≤ 0 remove the entry. Absent ids are ignored.
    UpdateQuantity { id: ProductId, quantity: i64 },
    /// Remove all items, keeping the shipping address and notes.
    Clear,
    SetShippingAddress(String),
    SetNotes(String),
}

fn ensure_total_fits(state: &CartState, line: &CartItem) -> Result<(), CartError> {
    match state.checked_total_with(line) {
        Some(_) => Ok(()),
        None => Err(CartError::TotalOverflow {
            id: line.id,
            quantity: line.quantity,
        }),
    }
}

/// Apply `action` to `state`. Returns whether anything changed.
///
/// On error `state` is left untouched.
fn reduce(state: &mut CartState, action: CartAction) -> Result<bool, CartError> {
    match action {
        CartAction::AddItem(product) => {
            if product.unit_price <= Decimal::ZERO {
                return Err(CartError::InvalidPrice {
                    id: product.id,
                    price: product.unit_price,
                });
            }
            let quantity = state
                .items
                .get(&product.id)
                .map_or(0, |item| item.quantity)
                .saturating_add(1);
            let item = CartItem {
                id: product.id,
                name: product.name,
                unit_price: product.unit_price,
                quantity,
            };
            ensure_total_fits(state, &item)?;
            state.items.insert(product.id, item);
            Ok(true)
        }
        CartAction::RemoveItem(id) => Ok(state.items.remove(&id).is_some()),
        CartAction::UpdateQuantity { id, quantity } => {
            if quantity <= 0 {
                return Ok(state.items.remove(&id).is_some());
            }
            let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
            let Some(current) = state.items.get(&id) else {
                return Ok(false);
            };
            if current.quantity == quantity {
                return Ok(false);
            }
            let item = CartItem {
                quantity,
                ..current.clone()
            };
            ensure_total_fits(state, &item)?;
            state.items.insert(id, item);
            Ok(true)
        }
        CartAction::Clear => {
            let changed = !state.items.is_empty();
            state.items.clear();
            Ok(changed)
        }
        CartAction::SetShippingAddress(address) => {
            let changed = state.shipping_address != address;
            state.shipping_address = address;
            Ok(changed)
        }
        CartAction::SetNotes(notes) => {
            let changed = state.notes != notes;
            state.notes = notes;
            Ok(changed)
        }
    }
}

/// Shared handle to the cart.
///
/// Cheap to clone; all clones see the same cart. Subscribers receive a
/// notification after each mutation that changed the state.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    state: watch::Sender<CartState>,
    record: PersistentStore<CartState>,
}

impl CartStore {
    /// Open the cart, restoring it from `storage`.
    ///
    /// A missing or malformed record yields an empty cart.
    #[must_use]
    pub fn open(storage: Arc<dyn Storage>) -> Self {
        let record = PersistentStore::new(storage, CART_KEY);
        let state = record.load().map(CartState::sanitized).unwrap_or_default();
        info!(
            items = state.items.len(),
            count = state.cart_count(),
            "Cart restored"
        );

        Self {
            inner: Arc::new(CartStoreInner {
                state: watch::Sender::new(state),
                record,
            }),
        }
    }

    /// Apply one action and persist the resulting state before returning.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidPrice` (state untouched) for a non-positive
    /// price, `CartError::TotalOverflow` (state untouched) when the totals
    /// would not fit in a decimal, or `CartError::Storage` if the new state could not be written.
    /// In the latter case the in-memory state has already changed.
    pub fn dispatch(&self, action: CartAction) -> Result<(), CartError> {
        debug!(?action, "Cart action");
        let mut outcome = Ok(());
        // The write lock is held while saving so disk writes follow mutation order.
        self.inner.state.send_if_modified(|state| match reduce(state, action) {
            Ok(changed) => {
                outcome = self.inner.record.save(state).map_err(CartError::from);
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }

    /// Add one unit of `product`.
    ///
    /// # Errors
    ///
    /// See [`Self::dispatch`].
    pub fn add_item(&self, product: CartProduct) -> Result<(), CartError> {
        self.dispatch(CartAction::AddItem(product))
    }

    /// Remove a product from the cart.
    ///
    /// # Errors
    ///
    /// See [`Self::dispatch`].
    pub fn remove_item(&self, id: ProductId) -> Result<(), CartError> {
        self.dispatch(CartAction::RemoveItem(id))
    }

    /// Set the quantity of a product already in the cart.
    ///
    /// # Errors
    ///
    /// See [`Self::dispatch`].
    pub fn update_quantity(&self, id: ProductId, quantity: i64) -> Result<(), CartError> {
        self.dispatch(CartAction::UpdateQuantity { id, quantity })
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// See [`Self::dispatch`].
    pub fn clear_cart(&self) -> Result<(), CartError> {
        self.dispatch(CartAction::Clear)
    }

    /// # Errors
    ///
    /// See [`Self::dispatch`].
    pub fn set_shipping_address(&self, address: impl Into<String>) -> Result<(), CartError> {
        self.dispatch(CartAction::SetShippingAddress(address.into()))
    }

    /// # Errors
    ///
    /// See [`Self::dispatch`].
    pub fn set_notes(&self, notes: impl Into<String>) -> Result<(), CartError> {
        self.dispatch(CartAction::SetNotes(notes.into()))
    }

    /// A copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> CartState {
        self.inner.state.borrow().clone()
    }

    /// Items in product id order.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.inner.state.borrow().items.values().cloned().collect()
    }

    #[must_use]
    pub fn cart_count(&self) -> u64 {
        self.inner.state.borrow().cart_count()
    }

    #[must_use]
    pub fn cart_total(&self) -> Decimal {
        self.inner.state.borrow().cart_total()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().is_empty()
    }

    /// Watch the cart for changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.state.subscribe()
    }
}
