use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{self, tokens, Secret};
use crate::error::{RepoError, UserError, ValidationErrors};
use crate::state::AppState;
use crate::users::repo_types::{Employee, NewUser, Role, UserChanges, UserRecord};
use crate::users::validation::{self, MUST_EXIST, TAKEN};

fn invalid(field: &'static str, message: &str) -> UserError {
    let mut errors = ValidationErrors::new();
    errors.add(field, message);
    UserError::Invalid(errors)
}

/// Validates and persists `user`.
///
/// Steps: lowercase the email, run the field rules and the uniqueness
/// pre-check and the wireless provider lookup, hash a pending password, assign the confirmation code (new
/// records only), rotate the remember token, write. `user` is left untouched
/// unless the write succeeds.
#[instrument(skip(st, user), fields(user_id = %user.id, new_record = user.is_new_record()))]
pub async fn save(st: &AppState, user: &mut UserRecord) -> Result<(), UserError> {
    let mut pending = user.clone();
    pending.email = pending.email.to_lowercase();

    let mut errors = validation::validate(&pending);
    if !pending.email.trim().is_empty() && st.users.email_taken(&pending.email, pending.id).await? {
        errors.add("email", TAKEN);
    }
    if let Some(provider_id) = pending.wireless_provider_id {
        if st.users.find_provider(provider_id).await?.is_none() {
            errors.add("wireless_provider", MUST_EXIST);
        }
    }
    if !errors.is_empty() {
        let fields: Vec<&str> = errors.fields().collect();
        warn!(?fields, "user validation failed");
        return Err(UserError::Invalid(errors));
    }

    if let Some(password) = pending.password.take() {
        pending.password_digest = auth::hash_password(password.expose())?;
    }
    pending.password_confirmation = None;

    let now = OffsetDateTime::now_utc();
    if pending.new_record {
        pending.confirmation_code = Some(tokens::confirmation_code());
        pending.created_at = now;
    }
    pending.remember_token = Some(tokens::remember_token());
    pending.updated_at = now;

    let written = if pending.new_record {
        st.users.insert(&pending).await
    } else {
        st.users.update(&pending).await
    };
    match written {
        Ok(()) => {}
        Err(RepoError::DuplicateEmail) => {
            warn!(email = %pending.email, "email claimed concurrently");
            return Err(invalid("email", TAKEN));
        }
        Err(RepoError::UnknownProvider) => {
            warn!(provider_id = ?pending.wireless_provider_id, "wireless provider removed concurrently");
            return Err(invalid("wireless_provider", MUST_EXIST));
        }
        Err(RepoError::NotFound) => return Err(UserError::NotFound),
        Err(RepoError::Other(e)) => return Err(UserError::Internal(e)),
    }

    pending.new_record = false;
    *user = pending;
    debug!("user saved");
    Ok(())
}

#[instrument(skip(st, attrs), fields(role = %attrs.role))]
pub async fn create(st: &AppState, attrs: NewUser) -> Result<UserRecord, UserError> {
    let mut user = UserRecord::new(attrs);
    save(st, &mut user).await?;
    info!(user_id = %user.id, role = %user.role, "user created");
    Ok(user)
}

#[instrument(skip(st, changes))]
pub async fn update(st: &AppState, id: Uuid, changes: UserChanges) -> Result<UserRecord, UserError> {
    let mut user = find(st, id).await?;
    user.assign(changes);
    save(st, &mut user).await?;
    info!(user_id = %user.id, "user updated");
    Ok(user)
}

pub async fn find(st: &AppState, id: Uuid) -> Result<UserRecord, UserError> {
    st.users.find(id).await?.ok_or(UserError::NotFound)
}

pub async fn find_by_email(st: &AppState, email: &str) -> Result<Option<UserRecord>, UserError> {
    Ok(st.users.find_by_email(email.trim()).await?)
}

pub async fn find_by_remember_token(
    st: &AppState,
    token: &str,
) -> Result<Option<UserRecord>, UserError> {
    Ok(st.users.find_by_remember_token(token).await?)
}

/// Users of one role; every role lives in the same table.
pub async fn list_by_role(st: &AppState, role: Role) -> Result<Vec<UserRecord>, UserError> {
    Ok(st.users.list_by_role(role).await?)
}

pub async fn count_by_role(st: &AppState, role: Role) -> Result<i64, UserError> {
    Ok(st.users.count_by_role(role).await?)
}

/// Hard delete. The stored profile image is removed afterwards on a best-effort basis.
#[instrument(skip(st))]
pub async fn destroy(st: &AppState, id: Uuid) -> Result<(), UserError> {
    let user = find(st, id).await?;
    match st.users.delete(id).await {
        Ok(()) => {}
        Err(RepoError::NotFound) => return Err(UserError::NotFound),
        Err(e) => return Err(UserError::Internal(e.into())),
    }
    if let Some(key) = user.image.as_deref() {
        if let Err(e) = st.storage.delete_object(key).await {
            warn!(error = %e, %key, "failed to remove profile image");
        }
    }
    info!(user_id = %id, "user destroyed");
    Ok(())
}

#[instrument(skip(st, password))]
pub async fn authenticate(
    st: &AppState,
    email: &str,
    password: &str,
) -> Result<Option<UserRecord>, UserError> {
    let Some(user) = find_by_email(st, email).await? else {
        warn!(%email, "login unknown email");
        return Ok(None);
    };
    if !user.authenticate(password)? {
        warn!(user_id = %user.id, "login invalid password");
        return Ok(None);
    }
    Ok(Some(user))
}

/// Marks the account confirmed when `code` matches the one issued at creation.
/// A wrong code is `false` whether or not the account is already confirmed.
#[instrument(skip(st, code))]
pub async fn confirm(st: &AppState, id: Uuid, code: &str) -> Result<bool, UserError> {
    let mut user = find(st, id).await?;
    if user.confirmation_code.as_deref() != Some(code) {
        warn!(user_id = %id, "confirmation code mismatch");
        return Ok(false);
    }
    if user.confirmed {
        return Ok(true);
    }
    user.confirmed = true;
    save(st, &mut user).await?;
    info!(user_id = %id, "user confirmed");
    Ok(true)
}

#[instrument(skip(st))]
pub async fn request_password_reset(
    st: &AppState,
    email: &str,
) -> Result<Option<UserRecord>, UserError> {
    let Some(mut user) = find_by_email(st, email).await? else {
        return Ok(None);
    };
    user.reset_code = Some(tokens::reset_code());
    user.password_reset_required = true;
    save(st, &mut user).await?;
    info!(user_id = %user.id, "password reset requested");
    Ok(Some(user))
}

/// Returns `false` when `code` is not the outstanding reset code.
#[instrument(skip(st, code, password, confirmation))]
pub async fn reset_password(
    st: &AppState,
    id: Uuid,
    code: &str,
    password: Secret,
    confirmation: Secret,
) -> Result<bool, UserError> {
    let mut user = find(st, id).await?;
    if user.reset_code.as_deref() != Some(code) {
        warn!(user_id = %id, "reset code mismatch");
        return Ok(false);
    }
    user.password = Some(password);
    user.password_confirmation = Some(confirmation);
    user.reset_code = None;
    user.password_reset_required = false;
    save(st, &mut user).await?;
    info!(user_id = %id, "password reset");
    Ok(true)
}

/// Email-to-SMS address for `user`, looking up the associated provider.
pub async fn sms_address(st: &AppState, user: &UserRecord) -> Result<Option<String>, UserError> {
    if user.phone.is_none() {
        return Ok(None);
    }
    let provider = match user.wireless_provider_id {
        Some(id) => st.users.find_provider(id).await?,
        None => None,
    };
    user.phone_for_sms(provider.as_ref())
}

pub async fn employees(st: &AppState, user_id: Uuid) -> Result<Vec<Employee>, UserError> {
    Ok(st.users.employees_of(user_id).await?)
}

#[instrument(skip(st, name))]
pub async fn add_employee(
    st: &AppState,
    user_id: Uuid,
    name: impl Into<String>,
) -> Result<Employee, UserError> {
    let owner = find(st, user_id).await?;
    let employee = Employee::new(owner.id, name);
    st.users.insert_employee(&employee).await?;
    Ok(employee)
}
