use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// Backend rows have carried numeric ids in some deployments and string ids
// in others; everything past the adapter boundary compares canonical
// strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(value) => value,
            RawId::Number(value) => value.to_string(),
        }
    }
}

pub fn canonical_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn canonical_id_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawId>::deserialize(deserializer)?;
    Ok(raw.map(String::from))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListKind {
    Task,
    Grocery,
    Note,
}

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Grocery => "grocery",
            Self::Note => "note",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Owner,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

impl InviteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct List {
    #[serde(deserialize_with = "canonical_id")]
    pub id: String,
    pub name: String,
    pub kind: ListKind,
    #[serde(deserialize_with = "canonical_id")]
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    #[serde(deserialize_with = "canonical_id")]
    pub list_id: String,
    #[serde(deserialize_with = "canonical_id")]
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(deserialize_with = "canonical_id")]
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

// A directory row: the list plus the caller's role and the owner's display
// identity, resolved by the directory service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    #[serde(flatten)]
    pub list: List,
    pub role: Role,
    pub owner_first_name: Option<String>,
    pub owner_last_name: Option<String>,
    pub owner_username: Option<String>,
}

impl ListEntry {
    pub fn id(&self) -> &str {
        &self.list.id
    }

    pub fn owner_label(&self, current_user: &str) -> String {
        if self.list.created_by == current_user {
            return "Me".to_string();
        }
        let first = self.owner_first_name.as_deref().unwrap_or("").trim();
        if !first.is_empty() {
            let initial = self
                .owner_last_name
                .as_deref()
                .unwrap_or("")
                .trim()
                .chars()
                .next()
                .map(|c| format!(" {}.", c.to_uppercase()))
                .unwrap_or_default();
            return format!("{}{}", first, initial);
        }
        let username = self.owner_username.as_deref().unwrap_or("").trim();
        if !username.is_empty() {
            return username.to_string();
        }
        "—".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    #[serde(deserialize_with = "canonical_id")]
    pub id: String,
    #[serde(deserialize_with = "canonical_id")]
    pub list_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroceryEntry {
    #[serde(deserialize_with = "canonical_id")]
    pub id: String,
    #[serde(deserialize_with = "canonical_id")]
    pub list_id: String,
    pub name: String,
    pub quantity: Option<String>,
    pub checked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(deserialize_with = "canonical_id")]
    pub id: String,
    #[serde(deserialize_with = "canonical_id")]
    pub list_id: String,
    pub body: String,
    #[serde(default, deserialize_with = "canonical_id_opt")]
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    #[serde(deserialize_with = "canonical_id")]
    pub id: String,
    #[serde(deserialize_with = "canonical_id")]
    pub list_id: String,
    #[serde(deserialize_with = "canonical_id")]
    pub inviter: String,
    #[serde(deserialize_with = "canonical_id")]
    pub invitee: String,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
}

// Pending invitation enriched for display: list name plus inviter name, the
// shape the bell popover renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingInvite {
    pub id: String,
    pub list_id: String,
    pub list_name: String,
    pub inviter_id: String,
    pub inviter_name: String,
    pub created_at: DateTime<Utc>,
}

// ─── Drafts and patches ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewList {
    pub name: String,
    pub kind: ListKind,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn completed(value: bool) -> Self {
        Self {
            completed: Some(value),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroceryDraft {
    pub name: String,
    pub quantity: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroceryPatch {
    pub name: Option<String>,
    pub quantity: Option<String>,
    pub checked: Option<bool>,
}

impl GroceryPatch {
    pub fn checked(value: bool) -> Self {
        Self {
            checked: Some(value),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    pub body: String,
}

// ─── Notices ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

// Transient, non-fatal report surfaced to the user (a toast). Mutation
// failures produce exactly one of these per failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

// Notices flow to the presentation layer over one unbounded channel per
// session.
pub type NoticeSender = tokio::sync::mpsc::UnboundedSender<Notice>;
pub type NoticeReceiver = tokio::sync::mpsc::UnboundedReceiver<Notice>;

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}
