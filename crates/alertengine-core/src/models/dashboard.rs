//! Minimal dashboard record owning alert rules

use serde::{Deserialize, Serialize};

/// Dashboard identity needed for cascades and deep links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: i64,
    pub org_id: i64,
    pub uid: String,
    pub slug: String,
    pub title: String,
}

impl Dashboard {
    /// Create a dashboard, deriving the slug from the title
    pub fn new(id: i64, org_id: i64, uid: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id,
            org_id,
            uid: uid.into(),
            slug: slugify(&title),
            title,
        }
    }
}

/// Lowercase, dash separated form of a title
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.trim().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
