//! Order history commands.

use clap::Subcommand;
use shopsession_core::{OrderId, format_amount};
use tracing::info;

use super::CliError;
use crate::app::App;

#[derive(Subcommand)]
pub enum OrdersCommand {
    /// List your orders
    List {
        /// Page number, starting at 1
        #[arg(short, long)]
        page: Option<u32>,
    },
    /// Cancel a pending order
    Cancel { order_id: OrderId },
}

pub async fn run(app: &App, command: OrdersCommand) -> Result<(), CliError> {
    if !app.session.is_authenticated() {
        return Err(CliError::NotSignedIn);
    }

    match command {
        OrdersCommand::List { page } => {
            let page = app.shop.list_orders(page).await?;
            if page.results.is_empty() {
                info!("No orders yet");
            }
            for order in &page.results {
                let placed = order
                    .created_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                let total = order.total_amount.map(format_amount).unwrap_or_default();
                info!(
                    "{}  {}  {}  {}",
                    order.display_number(),
                    order.status,
                    placed,
                    total
                );
            }
            if page.has_next() {
                info!("More orders available; use --page");
            }
        }
        OrdersCommand::Cancel { order_id } => {
            app.shop.cancel_order(order_id).await?;
            info!("Order {order_id} cancelled");
        }
    }
    Ok(())
}
