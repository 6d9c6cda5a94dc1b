//! Checkout command.

use clap::Args;
use shopsession_client::{CheckoutError, PaymentMethodDetails};
use shopsession_core::format_amount;
use tracing::{info, warn};

use super::CliError;
use crate::app::App;

#[derive(Args)]
pub struct CheckoutArgs {
    /// Saved gateway payment method to charge (pm_...)
    #[arg(long)]
    payment_method: String,
    /// Ask the backend to keep this card for later
    #[arg(long)]
    save: bool,
}

pub async fn run(app: &App, args: CheckoutArgs) -> Result<(), CliError> {
    if !app.session.is_authenticated() {
        return Err(CliError::NotSignedIn);
    }
    if app.cart.snapshot().shipping_address.trim().is_empty() {
        return Err(CliError::InvalidArgument(
            "set a shipping address first with `shop cart address`".to_string(),
        ));
    }

    let checkout = app.checkout().await?;
    let estimate = checkout.display_totals();
    info!("Cart total {} (tax calculated at checkout)", format_amount(estimate.total));

    let ready = match checkout.start_checkout(args.save).await {
        Ok(snapshot) => snapshot,
        Err(CheckoutError::Intent(e)) => {
            warn!("Payment setup failed ({e}), retrying once");
            checkout.retry_payment_intent().await?
        }
        Err(e) => return Err(e.into()),
    };

    let totals = checkout.display_totals();
    info!(
        "Order {}: subtotal {}, tax {}, total {}",
        ready.order_id.map(|id| id.to_string()).unwrap_or_default(),
        format_amount(totals.subtotal),
        format_amount(totals.tax),
        format_amount(totals.total)
    );

    let details = PaymentMethodDetails::Saved {
        payment_method_id: args.payment_method,
    };
    match checkout.confirm_payment(&details).await {
        Ok(done) => {
            info!(
                "Payment complete. Order {} confirmed",
                done.order_id.map(|id| id.to_string()).unwrap_or_default()
            );
            Ok(())
        }
        Err(e) => {
            if let Some(order_id) = ready.order_id {
                warn!("Order {order_id} was left pending; cancel it with `shop orders cancel {order_id}`");
            }
            Err(e.into())
        }
    }
}
