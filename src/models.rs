//! Data model shared by the handlers and the storage backends.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service niche an order belongs to; each one is posted to its own group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Design,
    Programming,
    Content,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Design, Category::Programming, Category::Content];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Design => "design",
            Category::Programming => "programming",
            Category::Content => "content",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "design" => Ok(Category::Design),
            "programming" => Ok(Category::Programming),
            "content" => Ok(Category::Content),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Executor profile, one per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: i64,
    pub username: String,
    pub description: String,
    pub photo_file_id: Option<String>,
}

/// Order fields supplied by the client; the store assigns the rest
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub creator_id: i64,
    pub category: Category,
    pub text: String,
    pub photo_file_id: Option<String>,
}

/// Active service request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub creator_id: i64,
    pub category: Category,
    pub text: String,
    pub photo_file_id: Option<String>,
    pub complaints: u32,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn from_new(id: i64, new: NewOrder) -> Self {
        Self {
            id,
            creator_id: new.creator_id,
            category: new.category,
            text: new.text,
            photo_file_id: new.photo_file_id,
            complaints: 0,
            created_at: Utc::now(),
        }
    }
}
