use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Isolation level of one transaction. Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    #[serde(rename = "READ UNCOMMITTED", alias = "READ_UNCOMMITTED")]
    ReadUncommitted,
    #[default]
    #[serde(rename = "READ COMMITTED", alias = "READ_COMMITTED")]
    ReadCommitted,
    #[serde(rename = "REPEATABLE READ", alias = "REPEATABLE_READ")]
    RepeatableRead,
    #[serde(rename = "SERIALIZABLE")]
    Serializable,
}

impl IsolationLevel {
    /// Whether reads come from a snapshot fixed at the first statement.
    pub fn uses_snapshot(self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "READ UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "READ COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "REPEATABLE READ" => Ok(IsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            other => Err(format!("unknown isolation level: {}", other)),
        }
    }
}

/// Current time at millisecond precision, the resolution of the conflict clock.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// One row of the `users` relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub zipcode: Option<String>,
    pub gender: Option<String>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn empty(user_id: i64, updated_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            username: None,
            first_name: None,
            last_name: None,
            city: None,
            country: None,
            zipcode: None,
            gender: None,
            updated_at,
        }
    }
}

// Absent field -> None, explicit null -> Some(None).
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// A partial set of user fields.
///
/// Only fields that were present in the source document are carried, so that a
/// merge leaves every other column of the target row untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub username: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub city: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub country: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub gender: Option<Option<String>>,
}

impl UserPatch {
    /// Every column of `row`, as a full patch.
    pub fn from_row(row: &UserRow) -> Self {
        Self {
            username: Some(row.username.clone()),
            first_name: Some(row.first_name.clone()),
            last_name: Some(row.last_name.clone()),
            city: Some(row.city.clone()),
            country: Some(row.country.clone()),
            zipcode: Some(row.zipcode.clone()),
            gender: Some(row.gender.clone()),
        }
    }

    /// Applies the present fields over `base` (or an empty row) and stamps `updated_at`.
    pub fn merge(&self, user_id: i64, base: Option<&UserRow>, updated_at: DateTime<Utc>) -> UserRow {
        let mut row = match base {
            Some(existing) => existing.clone(),
            None => UserRow::empty(user_id, updated_at),
        };
        row.user_id = user_id;

        fn set(target: &mut Option<String>, value: &Option<Option<String>>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut row.username, &self.username);
        set(&mut row.first_name, &self.first_name);
        set(&mut row.last_name, &self.last_name);
        set(&mut row.city, &self.city);
        set(&mut row.country, &self.country);
        set(&mut row.zipcode, &self.zipcode);
        set(&mut row.gender, &self.gender);

        row.updated_at = updated_at;
        row
    }
}

/// Row accepted by bulk loading. `updatedAt` defaults to the load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRow {
    pub user_id: i64,
    #[serde(flatten)]
    pub fields: UserPatch,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SeedRow {
    pub fn into_row(self, now: DateTime<Utc>) -> UserRow {
        self.fields
            .merge(self.user_id, None, self.updated_at.unwrap_or(now))
    }
}

impl From<UserRow> for SeedRow {
    fn from(row: UserRow) -> Self {
        Self {
            user_id: row.user_id,
            fields: UserPatch::from_row(&row),
            updated_at: Some(row.updated_at),
        }
    }
}
