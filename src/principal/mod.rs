mod repository;
pub(crate) mod service;

pub use repository::*;
pub use service::*;

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Kind of authenticated account. Each kind lives in its own table and
/// its own cache namespace.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    #[default]
    Customer,
    Merchant,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Customer => "customer",
            PrincipalKind::Merchant => "merchant",
        }
    }

    /// Table holding records of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            PrincipalKind::Customer => "customers",
            PrincipalKind::Merchant => "merchants",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Active,
    Blocked,
    Inactive,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Active => "active",
            Status::Blocked => "blocked",
            Status::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "active" => Ok(Status::Active),
            "blocked" => Ok(Status::Blocked),
            "inactive" => Ok(Status::Inactive),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown account status `{0}`")]
pub struct UnknownStatus(String);

/// Principal as saved on database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub full_name: String,
    #[serde(skip)]
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
    pub status: Status,
    pub is_verified: bool,
    pub is_deleted: bool,
    #[serde(skip)]
    pub last_reset_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public subset of a [`Principal`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShortProfile {
    pub username: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub status: Status,
}

impl From<&Principal> for ShortProfile {
    fn from(principal: &Principal) -> Self {
        Self {
            username: principal.username.clone(),
            full_name: principal.full_name.clone(),
            gender: principal.gender.clone(),
            status: principal.status,
        }
    }
}

/// Partial update of a [`Principal`]. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrincipalPatch {
    pub full_name: Option<String>,
    pub gender: Option<String>,
    pub email: Option<String>,
    pub occupation: Option<String>,
    pub organization: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub profile_pic_url: Option<String>,
    pub password: Option<String>,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub is_deleted: Option<bool>,
}

impl PrincipalPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the patch on an in-memory record.
    pub fn apply(&self, principal: &mut Principal) {
        if let Some(full_name) = &self.full_name {
            principal.full_name = full_name.clone();
        }
        if let Some(gender) = &self.gender {
            principal.gender = Some(gender.clone());
        }
        if let Some(email) = &self.email {
            principal.email = Some(email.clone());
        }
        if let Some(occupation) = &self.occupation {
            principal.occupation = Some(occupation.clone());
        }
        if let Some(organization) = &self.organization {
            principal.organization = Some(organization.clone());
        }
        if let Some(birth_date) = self.birth_date {
            principal.birth_date = Some(birth_date);
        }
        if let Some(url) = &self.profile_pic_url {
            principal.profile_pic_url = Some(url.clone());
        }
        if let Some(password) = &self.password {
            principal.password = password.clone();
        }
        if let Some(at) = self.last_reset_at {
            principal.last_reset_at = at;
        }
        if let Some(is_deleted) = self.is_deleted {
            principal.is_deleted = is_deleted;
        }
    }
}
