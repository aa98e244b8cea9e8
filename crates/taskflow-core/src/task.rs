use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::datetime::api_date_serde;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Todo,
    InProgress,
    Done,
    Archived,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Todo, Status::InProgress, Status::Done, Status::Archived];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Archived => "archived",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == token)
    }

    pub fn icon(self) -> &'static str {
        match self {
            Status::Todo => "📝",
            Status::InProgress => "⏳",
            Status::Done => "✅",
            Status::Archived => "📦",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Todo => "📝 To do",
            Status::InProgress => "⏳ In progress",
            Status::Done => "✅ Done",
            Status::Archived => "📦 Archived",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == token)
    }

    /// Accepts the numeric shortcuts shown in the creation prompt as well as
    /// the API names, case-insensitively.
    pub fn parse_alias(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "1" | "low" => Some(Priority::Low),
            "2" | "medium" | "med" => Some(Priority::Medium),
            "3" | "high" => Some(Priority::High),
            "4" | "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "⬇️ Low",
            Priority::Medium => "⚖️ Medium",
            Priority::High => "⬆️ High",
            Priority::Urgent => "🔥 Urgent",
        }
    }

    pub fn initial(self) -> char {
        self.as_str()
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?')
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRef {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    pub status: Status,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub category: Option<CategoryRef>,

    #[serde(default, with = "api_date_serde::option")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub archived: bool,

    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Task {
    pub fn is_archived(&self) -> bool {
        self.archived || self.status == Status::Archived
    }

    pub fn display_title(&self) -> &str {
        let trimmed = self.title.trim();
        if trimmed.is_empty() { "Untitled" } else { trimmed }
    }
}

/// One fetched page of the task list plus the server-side match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: usize,
}

const SENTINEL_CATEGORY_NAMES: [&str; 2] = ["uncategorized", "без категории"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

impl Category {
    /// The API keeps a catch-all category per account; users never pick it.
    pub fn is_sentinel(&self) -> bool {
        let name = self.name.trim().to_lowercase();
        SENTINEL_CATEGORY_NAMES.contains(&name.as_str())
    }
}

pub fn visible_categories(categories: Vec<Category>) -> Vec<Category> {
    categories.into_iter().filter(|c| !c.is_sentinel()).collect()
}
