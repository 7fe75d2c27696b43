//! Auth commands - register, login, logout, whoami
//!
//! The bearer token from `login` is kept in `<bank_dir>/session.json` so
//! later commands run as that user. `BANK_TOKEN` takes precedence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bank_core::{BankContext, LogEvent, SessionToken, User};
use colored::Colorize;
use dialoguer::{Input, Password};

use super::{get_bank_dir, get_context, EventLog};

fn session_path(bank_dir: &Path) -> PathBuf {
    bank_dir.join("session.json")
}

fn save_session(bank_dir: &Path, session: &SessionToken) -> Result<()> {
    let path = session_path(bank_dir);
    std::fs::write(&path, serde_json::to_string_pretty(session)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn load_token(bank_dir: &Path) -> Result<Option<String>> {
    if let Ok(token) = std::env::var("BANK_TOKEN") {
        return Ok(Some(token));
    }
    let path = session_path(bank_dir);
    if !path.exists() {
        return Ok(None);
    }
    let session: SessionToken = serde_json::from_str(&std::fs::read_to_string(&path)?)
        .with_context(|| format!("Corrupt session file {}", path.display()))?;
    Ok(Some(session.token))
}

fn clear_session(bank_dir: &Path) -> Result<()> {
    let path = session_path(bank_dir);
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

/// The logged-in user, or an error telling the caller to log in
pub fn current_user(ctx: &BankContext) -> Result<User> {
    let bank_dir = get_bank_dir()?;
    let token = load_token(&bank_dir)?
        .context("Not logged in. Run `bank login` first.")?;
    Ok(ctx.auth_service.authenticate(&token)?)
}

fn prompt_password(confirm: bool) -> Result<String> {
    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    Ok(prompt.interact()?)
}

pub fn run_register(
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;

    let username = match username {
        Some(u) => u,
        None => Input::new().with_prompt("Username").interact_text()?,
    };
    let email = match email {
        Some(e) => e,
        None => Input::new().with_prompt("Email").interact_text()?,
    };
    let password = match password {
        Some(p) => p,
        None => prompt_password(true)?,
    };

    let user = ctx.auth_service.register(&username, &email, &password)?;
    EventLog::open().record(LogEvent::new("user_registered").with_command("register"));

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("{}", "User registered".green());
        println!("  User ID: {}", user.id);
        println!("  Username: {}", user.username);
    }
    Ok(())
}

pub fn run_login(username: Option<String>, password: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let bank_dir = get_bank_dir()?;

    let username = match username {
        Some(u) => u,
        None => Input::new().with_prompt("Username").interact_text()?,
    };
    let password = match password {
        Some(p) => p,
        None => prompt_password(false)?,
    };

    let session = ctx.auth_service.login(&username, &password)?;
    save_session(&bank_dir, &session)?;
    EventLog::open().record(LogEvent::new("login").with_command("login"));

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        println!("{}", "Logged in".green());
        println!(
            "  Session expires: {}",
            session.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

pub fn run_logout() -> Result<()> {
    let ctx = get_context()?;
    let bank_dir = get_bank_dir()?;

    if let Some(token) = load_token(&bank_dir)? {
        ctx.auth_service.logout(&token)?;
    }
    clear_session(&bank_dir)?;
    EventLog::open().record(LogEvent::new("logout").with_command("logout"));

    println!("Logged out.");
    Ok(())
}

pub fn run_whoami(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = current_user(&ctx)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("{} ({})", user.username.bold(), user.email);
        println!("  User ID: {}", user.id);
        println!("  Member since: {}", user.created_at.format("%Y-%m-%d"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_session_file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("bank-cli-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let session = SessionToken {
            token: "abc".to_string(),
            user_id: Uuid::new_v4(),
            expires_at: Utc::now(),
        };

        save_session(&dir, &session).unwrap();
        let stored: SessionToken =
            serde_json::from_str(&std::fs::read_to_string(session_path(&dir)).unwrap()).unwrap();
        assert_eq!(stored.token, "abc");

        clear_session(&dir).unwrap();
        assert!(!session_path(&dir).exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
