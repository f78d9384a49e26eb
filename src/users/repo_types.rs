use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{self, Secret};
use crate::error::UserError;

/// Discriminator stored in the `type` column. All roles share the `users` table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[default]
    User,
    Client,
    Stylist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Client => "Client",
            Role::Stylist => "Stylist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown user type: {0}")]
pub struct UnknownRole(pub String);

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "User" => Ok(Role::User),
            "Client" => Ok(Role::Client),
            "Stylist" => Ok(Role::Stylist),
            _ => Err(UnknownRole(value)),
        }
    }
}

/// Carrier whose email-to-SMS bridge delivers `<digits>@<domain>` as a text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WirelessProvider {
    pub id: Uuid,
    pub name: String,
    pub domain: String,
    pub created_at: OffsetDateTime,
}

impl WirelessProvider {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            domain: domain.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub id: Uuid,
    pub user_id: Option<Uuid>, // NULL once the owning user is deleted
    pub name: String,
    pub created_at: OffsetDateTime,
}

impl Employee {
    pub fn new(user_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            name: name.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Attributes accepted when a user is created.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    #[serde(default, rename = "type")]
    pub role: Role,
    pub name: String,
    pub email: String,
    pub password: Option<Secret>,
    pub password_confirmation: Option<Secret>,
    pub phone: Option<String>,
    pub alternate_phone: Option<String>,
    pub bio: Option<String>,
    pub wireless_provider_id: Option<Uuid>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub confirmed: bool,
}

/// Partial update. The outer `Option` means "leave unchanged"; nullable
/// columns take `Some(None)` to clear them.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub role: Option<Role>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<Secret>,
    pub password_confirmation: Option<Secret>,
    pub confirmed: Option<bool>,
    pub phone: Option<Option<String>>,
    pub alternate_phone: Option<Option<String>>,
    pub password_reset_required: Option<bool>,
    pub reset_code: Option<Option<String>>,
    pub admin: Option<bool>,
    pub wireless_provider_id: Option<Option<Uuid>>,
    pub bio: Option<Option<String>>,
}

/// One row of the `users` table, plus the request-only password fields.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub role: Role,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub confirmed: bool,
    #[serde(skip_serializing)]
    pub confirmation_code: Option<String>,
    pub password_reset_required: bool,
    #[serde(skip_serializing)]
    pub reset_code: Option<String>,
    pub admin: bool,
    #[serde(skip_serializing)]
    pub remember_token: Option<String>,
    pub phone: Option<String>,
    pub alternate_phone: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>, // object storage key
    pub wireless_provider_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,

    #[sqlx(skip)]
    #[serde(skip)]
    pub password: Option<Secret>,
    #[sqlx(skip)]
    #[serde(skip)]
    pub password_confirmation: Option<Secret>,
    #[sqlx(skip)]
    #[serde(skip)]
    pub(crate) new_record: bool,
}

impl UserRecord {
    pub fn new(attrs: NewUser) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            role: attrs.role,
            name: attrs.name,
            email: attrs.email,
            password_digest: String::new(),
            confirmed: attrs.confirmed,
            confirmation_code: None,
            password_reset_required: false,
            reset_code: None,
            admin: attrs.admin,
            remember_token: None,
            phone: attrs.phone,
            alternate_phone: attrs.alternate_phone,
            bio: attrs.bio,
            image: None,
            wireless_provider_id: attrs.wireless_provider_id,
            created_at: now,
            updated_at: now,
            password: attrs.password,
            password_confirmation: attrs.password_confirmation,
            new_record: true,
        }
    }

    /// Applies changes in memory; nothing is written until the record is saved.
    pub fn assign(&mut self, changes: UserChanges) {
        let UserChanges {
            role,
            name,
            email,
            password,
            password_confirmation,
            confirmed,
            phone,
            alternate_phone,
            password_reset_required,
            reset_code,
            admin,
            wireless_provider_id,
            bio,
        } = changes;

        if let Some(v) = role {
            self.role = v;
        }
        if let Some(v) = name {
            self.name = v;
        }
        if let Some(v) = email {
            self.email = v;
        }
        if password.is_some() {
            self.password = password;
        }
        if password_confirmation.is_some() {
            self.password_confirmation = password_confirmation;
        }
        if let Some(v) = confirmed {
            self.confirmed = v;
        }
        if let Some(v) = phone {
            self.phone = v;
        }
        if let Some(v) = alternate_phone {
            self.alternate_phone = v;
        }
        if let Some(v) = password_reset_required {
            self.password_reset_required = v;
        }
        if let Some(v) = reset_code {
            self.reset_code = v;
        }
        if let Some(v) = admin {
            self.admin = v;
        }
        if let Some(v) = wireless_provider_id {
            self.wireless_provider_id = v;
        }
        if let Some(v) = bio {
            self.bio = v;
        }
    }

    pub fn is_new_record(&self) -> bool {
        self.new_record
    }

    pub fn is_stylist(&self) -> bool {
        self.role == Role::Stylist
    }

    /// Checks `plain` against the stored digest.
    pub fn authenticate(&self, plain: &str) -> anyhow::Result<bool> {
        if self.password_digest.is_empty() {
            return Ok(false);
        }
        auth::verify_password(plain, &self.password_digest)
    }

    /// Gateway address for text messages: the phone number stripped of
    /// `- . / ( )` and ASCII whitespace, followed by `@<provider domain>`.
    ///
    /// No phone means no address. A phone without a provider is reported as
    /// `UserError::MissingProvider`; callers that prefer a soft failure can
    /// treat that error as "no address".
    pub fn phone_for_sms(
        &self,
        provider: Option<&WirelessProvider>,
    ) -> Result<Option<String>, UserError> {
        lazy_static! {
            static ref PHONE_PUNCT_RE: Regex = Regex::new(r"[-./()\t\n\x0B\x0C\r ]").unwrap();
        }
        let Some(phone) = self.phone.as_deref() else {
            return Ok(None);
        };
        let provider = provider.ok_or(UserError::MissingProvider)?;
        let digits = PHONE_PUNCT_RE.replace_all(phone, "");
        Ok(Some(format!("{}@{}", digits, provider.domain)))
    }
}
