//! Saved payment method commands.

use clap::Subcommand;
use tracing::info;

use super::CliError;
use crate::app::App;

#[derive(Subcommand)]
pub enum PaymentMethodsCommand {
    /// List saved cards
    List,
    /// Delete a saved card by its gateway id (pm_...)
    Delete { payment_method_id: String },
}

pub async fn run(app: &App, command: PaymentMethodsCommand) -> Result<(), CliError> {
    if !app.session.is_authenticated() {
        return Err(CliError::NotSignedIn);
    }

    match command {
        PaymentMethodsCommand::List => {
            let methods = app.shop.payment_methods().await?;
            if methods.is_empty() {
                info!("No saved payment methods");
            }
            for method in methods {
                let marker = if method.is_default { " (default)" } else { "" };
                info!(
                    "{}  {}{marker}",
                    method.stripe_payment_method_id,
                    method.describe()
                );
            }
        }
        PaymentMethodsCommand::Delete { payment_method_id } => {
            app.shop.delete_payment_method(&payment_method_id).await?;
            info!("Deleted {payment_method_id}");
        }
    }
    Ok(())
}
