//! Auth command handlers.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Result, bail};
use cfp_core::storage::mask_token;
use cfp_core::{Navigation, Route};
use cfp_types::Registration;

use super::Ctx;

fn read_password(provided: Option<String>) -> Result<String> {
    if let Some(password) = provided {
        return Ok(password);
    }

    if io::stdin().is_terminal() {
        eprint!("Password: ");
        io::stderr().flush()?;
    }

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    let password = input.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

/// Guest-only commands refuse to run over an existing session.
async fn ensure_guest(ctx: &mut Ctx) -> Result<bool> {
    match ctx.app.navigate(Route::Login).await {
        Navigation::Allow => Ok(true),
        Navigation::Redirect(_) => {
            let who = ctx
                .app
                .auth()
                .user()
                .map_or_else(|| "another account".to_string(), |u| u.email.clone());
            println!("Already logged in as {who}. Run `cfp logout` first.");
            Ok(false)
        }
    }
}

fn print_signed_in(ctx: &Ctx) {
    let auth = ctx.app.auth();
    if let Some(user) = auth.user() {
        println!("✓ Logged in as {} <{}>", user.name, user.email);
    }
    if let Some(token) = auth.session().token.as_deref() {
        println!("  Token: {}", mask_token(token));
    }
    if auth.needs_email_verification() {
        println!("  Check your inbox to verify your email (or run `cfp resend-verification`).");
    }
}

pub async fn login(ctx: &mut Ctx, email: &str, password: Option<String>) -> Result<()> {
    if !ensure_guest(ctx).await? {
        return Ok(());
    }

    let password = read_password(password)?;
    ctx.app.login(email, &password).await?;
    print_signed_in(ctx);
    Ok(())
}

pub async fn register(
    ctx: &mut Ctx,
    name: String,
    email: String,
    role: String,
    password: Option<String>,
) -> Result<()> {
    if !ensure_guest(ctx).await? {
        return Ok(());
    }

    let password = read_password(password)?;
    let registration = Registration {
        name,
        email,
        password_confirmation: password.clone(),
        password,
        role,
    };
    ctx.app.register(&registration).await?;
    print_signed_in(ctx);
    Ok(())
}

pub async fn logout(ctx: &mut Ctx) -> Result<()> {
    if !ctx.app.auth().is_logged_in() {
        println!("Not logged in.");
        return Ok(());
    }

    ctx.app.logout().await;
    println!("✓ Logged out");
    Ok(())
}

pub async fn whoami(ctx: &mut Ctx) -> Result<()> {
    ctx.require_login().await?;

    let auth = ctx.app.auth();
    let Some(user) = auth.user() else {
        bail!(super::NOT_LOGGED_IN);
    };

    println!("{} <{}>", user.name, user.email);
    println!("  id:    {}", user.id);
    println!("  role:  {}", user.role);
    let verified = if auth.needs_email_verification() {
        "pending"
    } else {
        "verified"
    };
    println!("  email: {verified}");
    Ok(())
}

pub async fn resend_verification(ctx: &mut Ctx) -> Result<()> {
    ctx.require_login().await?;

    let result = ctx.app.auth_mut().resend_verification().await;
    ctx.settle(result.map_err(anyhow::Error::from))?;

    let email = ctx
        .app
        .auth()
        .user()
        .map_or_else(String::new, |u| format!(" to {}", u.email));
    println!("✓ Verification email sent{email}");
    Ok(())
}
