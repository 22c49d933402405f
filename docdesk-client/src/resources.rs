//! Thin wrappers over the `admin/` endpoints.
//!
//! - [`Page`] - One page of a listing plus the total count
//! - [`PageQuery`] - Paging, ordering, and filtering parameters
//! - [`Department`] - A department and its organization

use docdesk_core::{Organization, Role, UserIdentity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::DocdeskClient;
use crate::error::Result;

pub const MAX_PAGE_SIZE: u32 = 100;

/// One page of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
}

/// Paging, ordering, and filtering for admin listings.
///
/// The server accepts a single filter; only the first one is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u32,
    pub page_size: u32,
    pub ordering: Option<String>,
    pub ordering_desc: bool,
    pub filters: Vec<(String, String)>,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

impl PageQuery {
    /// Page numbers start at 1; the page size is clamped to `1..=100`.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            ordering: None,
            ordering_desc: false,
            filters: Vec::new(),
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.ordering = Some(field.into());
        self.ordering_desc = descending;
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Query parameters as sent to the server.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
        ];
        if let Some(ordering) = &self.ordering {
            pairs.push(("ordering".to_string(), ordering.clone()));
            pairs.push(("ordering_desc".to_string(), self.ordering_desc.to_string()));
        }
        if let Some((field, value)) = self.filters.first() {
            pairs.push(("filter_field".to_string(), field.clone()));
            pairs.push(("filter_value".to_string(), value.clone()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub organization: Organization,
}

impl DocdeskClient {
    /// List users, optionally only those of one organization.
    pub async fn users(
        &self,
        query: &PageQuery,
        organization_id: Option<Uuid>,
    ) -> Result<Page<UserIdentity>> {
        let mut pairs = query.to_pairs();
        if let Some(id) = organization_id {
            pairs.push(("organization_id".to_string(), id.to_string()));
        }
        self.get_json_with("admin/users", pairs).await
    }

    pub async fn user(&self, id: Uuid) -> Result<UserIdentity> {
        self.get_json(&format!("admin/users/{}", id)).await
    }

    pub async fn deactivate_user(&self, id: Uuid) -> Result<()> {
        self.delete(&format!("admin/users/{}", id)).await
    }

    pub async fn activate_user(&self, id: Uuid) -> Result<()> {
        self.post_action(&format!("admin/users/{}/activate", id)).await
    }

    pub async fn organizations(&self, query: &PageQuery) -> Result<Page<Organization>> {
        self.get_json_with("admin/organizations", query.to_pairs()).await
    }

    pub async fn departments(&self, query: &PageQuery) -> Result<Page<Department>> {
        self.get_json_with("admin/departments", query.to_pairs()).await
    }

    pub async fn roles(&self, query: &PageQuery) -> Result<Page<Role>> {
        self.get_json_with("admin/roles", query.to_pairs()).await
    }
}
