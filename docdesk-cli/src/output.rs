//! Rendering command results as text or JSON.

use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;
use docdesk_client::{Organization, Page, UserIdentity};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn render_user(user: &UserIdentity) -> String {
    let mut lines = vec![
        format!("Username: {}", user.username),
        format!("ID:       {}", user.id),
    ];
    if let Some(email) = &user.email {
        lines.push(format!("Email:    {}", email));
    }
    let roles = user.role_names();
    if !roles.is_empty() {
        lines.push(format!("Roles:    {}", roles.join(", ")));
    }
    if let Some(organization) = &user.primary_organization {
        lines.push(format!("Org:      {}", organization.name));
    }
    if user.is_superuser() {
        lines.push("Superuser".to_string());
    }
    if !user.is_active {
        lines.push("Inactive".to_string());
    }
    lines.join("\n")
}

pub fn render_users(page: &Page<UserIdentity>) -> String {
    let mut lines = vec![format!("{:<36}  {:<20}  {:<8}  EMAIL", "ID", "USERNAME", "ACTIVE")];
    for user in &page.items {
        lines.push(format!(
            "{:<36}  {:<20}  {:<8}  {}",
            user.id,
            user.username,
            if user.is_active { "yes" } else { "no" },
            user.email.as_deref().unwrap_or("-"),
        ));
    }
    lines.push(format!("{} of {} users", page.items.len(), page.total));
    lines.join("\n")
}

pub fn render_organizations(page: &Page<Organization>) -> String {
    let mut lines = vec![format!("{:<36}  {:<24}  DOMAIN", "ID", "NAME")];
    for organization in &page.items {
        lines.push(format!(
            "{:<36}  {:<24}  {}",
            organization.id,
            organization.name,
            organization.domain.as_deref().unwrap_or("-"),
        ));
    }
    lines.push(format!(
        "{} of {} organizations",
        page.items.len(),
        page.total
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(active: bool) -> UserIdentity {
        serde_json::from_value(serde_json::json!({
            "id": "5f0c6b8e-3f43-4d8a-9a52-0f4b1c7d2e11",
            "username": "alice",
            "email": "alice@example.com",
            "is_active": active,
            "role": {"id": "0b7f2f2e-5d6a-4c1b-9f0e-3a2b1c0d9e8f", "name": "admin"}
        }))
        .unwrap()
    }

    #[test]
    fn test_render_user() {
        let text = render_user(&user(false));
        assert!(text.contains("Username: alice"));
        assert!(text.contains("Roles:    admin"));
        assert!(text.ends_with("Inactive"));
    }

    #[test]
    fn test_render_users_counts() {
        let page = Page {
            total: 12,
            items: vec![user(true)],
        };
        let text = render_users(&page);
        assert!(text.starts_with("ID"));
        assert!(text.contains("alice@example.com"));
        assert!(text.ends_with("1 of 12 users"));
    }

    #[test]
    fn test_write_json() {
        let mut out = Vec::new();
        write_json(&mut out, &serde_json::json!({"total": 0})).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"total\": 0"));
        assert!(text.ends_with('\n'));
    }
}
