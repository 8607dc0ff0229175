use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Shared error type for collaborator boundaries between the healrun crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("{message}")]
    Message { message: String },
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde-full", serde(transparent))]
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// One execution of a suite or a single test.
    RunId
);
string_id!(TestId);
string_id!(ProjectId);
string_id!(OrganizationId);
string_id!(
    /// Identifier of a pending human approval for a low-confidence heal.
    ApprovalId
);
string_id!(
    /// Identifier of a successful heal awaiting promotion into the test definition.
    HealingId
);

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserType {
    pub fn name(self) -> &'static str {
        match self {
            BrowserType::Chromium => "chromium",
            BrowserType::Firefox => "firefox",
            BrowserType::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn weight(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 2,
            Priority::High => 4,
            Priority::Critical => 8,
        }
    }
}

/// Run lifecycle.
///
/// `pending -> running <-> paused`, `running|paused -> cancelling -> cancelled`,
/// `running -> passed|failed|error`.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Cancelling,
    Cancelled,
    Passed,
    Failed,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled | RunStatus::Passed | RunStatus::Failed | RunStatus::Error
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Run {
    pub id: RunId,
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    pub status: RunStatus,
    pub browser: BrowserType,
    pub branch: Option<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(organization_id: OrganizationId, project_id: ProjectId) -> Self {
        Self {
            id: RunId::new(),
            organization_id,
            project_id,
            status: RunStatus::Pending,
            browser: BrowserType::default(),
            branch: None,
            priority: Priority::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_browser(mut self, browser: BrowserType) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}
