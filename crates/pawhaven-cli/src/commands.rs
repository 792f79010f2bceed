//! One-shot subcommands: account flows, status and the profile view.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::{Duration, Local};
use tracing::warn;

use pawhaven_core::auth::AuthFlowError;
use pawhaven_core::session::Redirect;
use pawhaven_core::{
    Access, ApiClient, AuthService, Authenticator, ClientConfig, Clock, HttpAuthService,
    RouteGuard, SessionStore, SystemClock, TokenClaims,
};

/// Location of the profile area behind the route guard
const PROFILE_PATH: &str = "/profile";

/// Everything a command needs, built once from configuration.
pub struct Context {
    pub config: ClientConfig,
    pub store: SessionStore,
    pub clock: Arc<dyn Clock>,
    pub service: Arc<dyn AuthService>,
}

impl Context {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let store = config.open_store()?;
        let service = HttpAuthService::new(config.api_url.clone())
            .context("Failed to create HTTP client")?;
        Ok(Self {
            config,
            store,
            clock: Arc::new(SystemClock),
            service: Arc::new(service),
        })
    }

    fn authenticator(&self) -> Authenticator {
        Authenticator::new(
            Arc::clone(&self.service),
            self.store.clone(),
            Arc::clone(&self.clock),
            self.config.validity_window(),
        )
    }

    pub fn route_guard(&self) -> RouteGuard {
        RouteGuard::with_login_path(
            self.store.clone(),
            Arc::clone(&self.clock),
            self.config.login_path.clone(),
        )
    }
}

// ============================================================================
// Prompts
// ============================================================================

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_default(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(value) => {
            let answer = prompt(&format!("{} [{}]", label, value))?;
            Ok(if answer.is_empty() {
                value.to_string()
            } else {
                answer
            })
        }
        None => prompt(label),
    }
}

fn or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v.trim().to_string()),
        None => prompt(label),
    }
}

fn password(label: &str) -> Result<String> {
    rpassword::prompt_password(format!("{}: ", label)).context("Failed to read password")
}

fn flow_error(e: AuthFlowError) -> anyhow::Error {
    anyhow::anyhow!(e.user_message())
}

// ============================================================================
// Formatting
// ============================================================================

/// "1h 02m", "4m 59s", "12s"
pub fn format_remaining(left: Duration) -> String {
    let secs = left.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

pub fn print_redirect(redirect: &Redirect) {
    println!(
        "Sign-in required for {} (redirecting to {}). Run `pawhaven login` first.",
        redirect.from, redirect.to
    );
}

// ============================================================================
// Commands
// ============================================================================

pub async fn login(mut ctx: Context, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(e) => e.trim().to_string(),
        None => prompt_default("Email", ctx.config.last_email.as_deref())?,
    };
    let pass = password("Password")?;

    let session = ctx
        .authenticator()
        .login(&email, &pass)
        .await
        .map_err(flow_error)?;

    println!(
        "Signed in. Session valid until {}.",
        session.expiry.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );

    if ctx.config.last_email.as_deref() != Some(email.as_str()) {
        ctx.config.last_email = Some(email);
        if let Err(e) = ctx.config.save() {
            warn!(error = %e, "Failed to remember email");
        }
    }
    Ok(())
}

pub async fn register(
    ctx: Context,
    username: Option<String>,
    email: Option<String>,
) -> Result<()> {
    let username = or_prompt(username, "Username")?;
    let email = or_prompt(email, "Email")?;
    let pass = password("Password")?;
    let confirm = password("Confirm password")?;

    ctx.authenticator()
        .register(&username, &email, &pass, &confirm)
        .await
        .map_err(flow_error)?;

    println!("Account created and signed in as {}.", username);
    println!("Check {} for a verification code, then run `pawhaven verify`.", email);
    Ok(())
}

pub async fn verify(ctx: Context, email: Option<String>, code: Option<String>) -> Result<()> {
    let email = or_prompt(email, "Email")?;
    let code = or_prompt(code, "Verification code")?;
    ctx.authenticator()
        .verify_email(&email, &code)
        .await
        .map_err(flow_error)?;
    println!("Email verified.");
    Ok(())
}

pub fn logout(ctx: Context) -> Result<()> {
    ctx.authenticator()
        .logout()
        .context("Failed to remove stored session")?;
    println!("Signed out.");
    Ok(())
}

pub async fn forgot_password(ctx: Context, email: Option<String>) -> Result<()> {
    let email = or_prompt(email, "Email")?;
    let message = ctx
        .authenticator()
        .forgot_password(&email)
        .await
        .map_err(flow_error)?;
    println!("{}", message);
    println!("Then run `pawhaven reset-password` with the code you received.");
    Ok(())
}

pub async fn reset_password(
    ctx: Context,
    email: Option<String>,
    code: Option<String>,
) -> Result<()> {
    let email = or_prompt(email, "Email")?;
    let code = or_prompt(code, "Reset code")?;
    let pass = password("New password")?;
    let confirm = password("Confirm new password")?;

    ctx.authenticator()
        .reset_password(&email, &code, &pass, &confirm)
        .await
        .map_err(flow_error)?;
    println!("Password updated. You can now sign in with the new password.");
    Ok(())
}

pub fn status(ctx: Context) -> Result<()> {
    let now = ctx.clock.now();
    let Some(session) = ctx.store.get_session() else {
        println!("Not signed in.");
        return Ok(());
    };

    let expiry = session.expiry.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
    if session.is_valid_at(now) {
        println!(
            "Signed in. Expires {} ({} left).",
            expiry,
            format_remaining(session.time_left(now))
        );
    } else {
        println!("Session expired at {}. Run `pawhaven login`.", expiry);
    }

    if let Some(user) = TokenClaims::decode(session.credential.as_str()).and_then(|c| c.user_id())
    {
        println!("User id: {}", user);
    }
    Ok(())
}

pub async fn profile(ctx: Context) -> Result<()> {
    let guard = ctx.route_guard();
    if let Access::Redirect(redirect) = guard.check(PROFILE_PATH) {
        print_redirect(&redirect);
        return Ok(());
    }

    let client = ApiClient::new(ctx.config.api_url.clone(), ctx.store.clone(), ctx.clock)
        .context("Failed to create HTTP client")?;

    let user = client
        .fetch_profile()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("{} <{}>", user.username, user.email);
    if let Some(role) = &user.role {
        println!("Role: {}", role);
    }

    let pets = client
        .fetch_my_pets()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    if pets.is_empty() {
        println!("\nNo pets listed yet.");
        return Ok(());
    }
    println!("\nMy pets:");
    for pet in &pets {
        let mut line = format!("  [{}] {}", pet.id_display(), pet.name);
        if let Some(breed) = &pet.breed {
            line.push_str(&format!(", {}", breed));
        }
        if let Some(age) = pet.age {
            line.push_str(&format!(", {} yr", age));
        }
        println!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::seconds(12)), "12s");
        assert_eq!(format_remaining(Duration::seconds(299)), "4m 59s");
        assert_eq!(format_remaining(Duration::seconds(3720)), "1h 02m");
        assert_eq!(format_remaining(Duration::seconds(-5)), "0s");
    }
}
