//! Command implementations.
//!
//! Each command writes its result to `out` so tests can capture it.

use std::io::Write;

use anyhow::{Context, Result, bail};
use docdesk_client::{ClientError, DocdeskClient, PageQuery};
use uuid::Uuid;

use crate::output::{self, OutputFormat};

/// Message shown when a command needs a session and there is none.
pub const NOT_SIGNED_IN: &str = "not signed in, run `docdesk login`";

/// Message shown when the session could not be refreshed.
pub const SESSION_EXPIRED: &str = "session expired, run `docdesk login`";

/// Whether `error` means the user has to sign in again.
pub fn is_session_expired(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|e| e.downcast_ref::<ClientError>())
        .any(ClientError::requires_login)
}

pub async fn login<W: Write>(
    client: &DocdeskClient,
    username: &str,
    password: Option<&str>,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let Some(password) = password else {
        bail!("a password is required: pass --password or set DOCDESK_PASSWORD");
    };

    let session = client
        .login(username, password)
        .await
        .context("login failed")?;

    match (format, session.user) {
        (OutputFormat::Json, Some(user)) => output::write_json(out, &user)?,
        (OutputFormat::Text, Some(user)) => writeln!(out, "Signed in as {}", user.username)?,
        (_, None) => writeln!(out, "Signed in")?,
    }
    Ok(())
}

pub async fn logout<W: Write>(client: &DocdeskClient, out: &mut W) -> Result<()> {
    // Restores the saved cookie so the server can revoke it.
    client.bootstrap().await;
    client.logout().await;
    writeln!(out, "Signed out")?;
    Ok(())
}

pub async fn whoami<W: Write>(
    client: &DocdeskClient,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    require_session(client).await?;
    let Some(user) = client.session().user else {
        bail!(NOT_SIGNED_IN);
    };
    match format {
        OutputFormat::Json => output::write_json(out, &user)?,
        OutputFormat::Text => writeln!(out, "{}", output::render_user(&user))?,
    }
    Ok(())
}

pub async fn users<W: Write>(
    client: &DocdeskClient,
    query: &PageQuery,
    organization: Option<Uuid>,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    require_session(client).await?;
    let page = client.users(query, organization).await?;
    match format {
        OutputFormat::Json => output::write_json(out, &page)?,
        OutputFormat::Text => writeln!(out, "{}", output::render_users(&page))?,
    }
    Ok(())
}

pub async fn organizations<W: Write>(
    client: &DocdeskClient,
    query: &PageQuery,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    require_session(client).await?;
    let page = client.organizations(query).await?;
    match format {
        OutputFormat::Json => output::write_json(out, &page)?,
        OutputFormat::Text => writeln!(out, "{}", output::render_organizations(&page))?,
    }
    Ok(())
}

/// `GET` any API path and print the JSON body.
pub async fn get<W: Write>(client: &DocdeskClient, path: &str, out: &mut W) -> Result<()> {
    require_session(client).await?;
    let value: serde_json::Value = client.get_json(path).await?;
    output::write_json(out, &value)
}

async fn require_session(client: &DocdeskClient) -> Result<()> {
    let session = client.bootstrap().await;
    if session.should_redirect_to_login() {
        bail!(NOT_SIGNED_IN);
    }
    Ok(())
}
