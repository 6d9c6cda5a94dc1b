//! Sign-in, sign-out, and registration commands.

use clap::Args;
use secrecy::ExposeSecret;
use shopsession_client::auth::RegistrationRequest;
use shopsession_client::{ApiError, AuthError, Credentials};
use shopsession_core::Email;
use tracing::{info, warn};

use super::{CliError, read_secret};
use crate::app::App;

#[derive(Args)]
pub struct RegisterArgs {
    #[arg(short, long)]
    username: String,
    #[arg(short, long)]
    email: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

pub async fn login(app: &App, email: &str) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let password = read_secret("Password")?;
    let credentials = Credentials::new(email, password.expose_secret());

    match app.session.login(&credentials).await {
        Ok(user) => {
            info!("Signed in as {} <{}>", user.display_name(), user.email);
            Ok(())
        }
        Err(ApiError::Auth(AuthError::InvalidCredentials(message))) => {
            warn!("Sign-in rejected: {message}");
            Err(CliError::NotSignedIn)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn logout(app: &App) {
    app.session.logout();
    info!("Signed out");
}

pub async fn whoami(app: &App) -> Result<(), CliError> {
    if !app.session.is_authenticated() {
        return Err(CliError::NotSignedIn);
    }
    let user = app.shop.profile().await?;
    info!("{} <{}> (user {})", user.display_name(), user.email, user.id);
    if let Some(address) = user.address.filter(|a| !a.is_empty()) {
        info!("Address: {address}");
    }
    Ok(())
}

pub async fn register(app: &App, args: RegisterArgs) -> Result<(), CliError> {
    let email = Email::parse(&args.email)?;
    let password = read_secret("Password")?;
    let password_confirm = read_secret("Confirm password")?;

    let request = RegistrationRequest {
        username: args.username,
        email,
        first_name: args.first_name,
        last_name: args.last_name,
        phone: args.phone,
        address: args.address,
        password,
        password_confirm,
    };

    match app.shop.register(&request).await {
        Ok(()) => {
            info!("Account created. Run `shop login -e {}` to sign in", request.email);
            Ok(())
        }
        Err(ApiError::Validation(errors)) => {
            for (field, messages) in errors.iter() {
                warn!("{field}: {}", messages.join(" "));
            }
            Err(CliError::InvalidArgument("registration rejected".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
