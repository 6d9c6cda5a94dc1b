//! Cart commands.

use clap::Subcommand;
use rust_decimal::Decimal;
use shopsession_client::CartProduct;
use shopsession_core::{ProductId, format_amount};
use tracing::info;

use super::CliError;
use crate::app::App;

#[derive(Subcommand)]
pub enum CartCommand {
    /// Show cart contents and totals
    Show,
    /// Add one unit of a product
    Add {
        product_id: ProductId,
        name: String,
        /// Unit price, e.g. 8.50
        price: Decimal,
    },
    /// Remove a product
    Remove { product_id: ProductId },
    /// Set a product's quantity (0 removes it)
    Set { product_id: ProductId, quantity: i64 },
    /// Empty the cart, keeping address and notes
    Clear,
    /// Set the shipping address
    Address { address: String },
    /// Set the order notes
    Notes { notes: String },
}

pub fn run(app: &App, command: CartCommand) -> Result<(), CliError> {
    match command {
        CartCommand::Show => {
            show(app);
            return Ok(());
        }
        CartCommand::Add {
            product_id,
            name,
            price,
        } => app.cart.add_item(CartProduct::new(product_id, name, price))?,
        CartCommand::Remove { product_id } => app.cart.remove_item(product_id)?,
        CartCommand::Set {
            product_id,
            quantity,
        } => app.cart.update_quantity(product_id, quantity)?,
        CartCommand::Clear => app.cart.clear_cart()?,
        CartCommand::Address { address } => app.cart.set_shipping_address(address)?,
        CartCommand::Notes { notes } => app.cart.set_notes(notes)?,
    }
    show(app);
    Ok(())
}

fn show(app: &App) {
    let cart = app.cart.snapshot();
    if cart.is_empty() {
        info!("Cart is empty");
    }
    for item in cart.items.values() {
        info!(
            "#{}  {} x{} @ {} = {}",
            item.id,
            item.name,
            item.quantity,
            format_amount(item.unit_price),
            format_amount(item.line_total())
        );
    }
    info!(
        "{} item(s), total {} (before tax)",
        cart.cart_count(),
        format_amount(cart.cart_total())
    );
    if !cart.shipping_address.is_empty() {
        info!("Ship to: {}", cart.shipping_address);
    }
    if !cart.notes.is_empty() {
        info!("Notes: {}", cart.notes);
    }
}
