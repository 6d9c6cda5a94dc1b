//! Subcommand handlers.

pub mod account;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod payments;

use std::io::BufRead;

use secrecy::SecretString;
use shopsession_client::{
    ApiError, CartError, CheckoutError, StorageError, TransportError, gateway::GatewayError,
};
use shopsession_core::EmailError;
use thiserror::Error;

/// Errors surfaced to the terminal.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not signed in. Run `shop login` first")]
    NotSignedIn,

    #[error("Could not read input: {0}")]
    Input(#[from] std::io::Error),
}

/// Read one line from stdin as a secret, without the trailing newline.
fn read_secret(prompt: &str) -> Result<SecretString, CliError> {
    tracing::info!("{prompt}");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let value = line.trim_end_matches(['\r', '\n']);
    if value.is_empty() {
        return Err(CliError::InvalidArgument(format!("{prompt} cannot be empty")));
    }
    Ok(SecretString::from(value.to_string()))
}
