//! In-memory `UserRepo` for tests and local tooling.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use crate::error::RepoError;
use crate::users::repo::UserRepo;
use crate::users::repo_types::{Employee, Role, UserRecord, WirelessProvider};

#[derive(Default)]
pub struct MemoryUserRepo {
    users: DashMap<Uuid, UserRecord>,
    // lowercase email -> owner; plays the part of the unique index
    emails: DashMap<String, Uuid>,
    providers: DashMap<Uuid, WirelessProvider>,
    employees: DashMap<Uuid, Employee>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn reserve_email(&self, email: &str, owner: Uuid) -> Result<(), RepoError> {
        match self.emails.entry(email.to_lowercase()) {
            Entry::Occupied(e) if *e.get() != owner => Err(RepoError::DuplicateEmail),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(e) => {
                e.insert(owner);
                Ok(())
            }
        }
    }

    fn check_provider(&self, user: &UserRecord) -> Result<(), RepoError> {
        match user.wireless_provider_id {
            Some(id) if !self.providers.contains_key(&id) => Err(RepoError::UnknownProvider),
            _ => Ok(()),
        }
    }

    /// Overwrites the stored row for `user.id`, moving its email reservation
    /// from `previous_email`.
    fn replace(&self, user: &UserRecord, previous_email: &str) -> Result<(), RepoError> {
        self.check_provider(user)?;
        let email = user.email.to_lowercase();
        let moved = email != previous_email;
        if moved {
            self.reserve_email(&email, user.id)?;
        }

        let mut row = Self::stored(user);
        let Some(mut existing) = self.users.get_mut(&user.id) else {
            // deleted since the caller looked it up
            if moved {
                self.emails.remove_if(&email, |_, owner| *owner == user.id);
            }
            return Err(RepoError::NotFound);
        };
        row.created_at = existing.created_at;
        row.confirmation_code = existing.confirmation_code.clone();
        *existing = row;
        drop(existing);

        if moved {
            self.emails.remove_if(previous_email, |_, owner| *owner == user.id);
        }
        Ok(())
    }

    fn stored(user: &UserRecord) -> UserRecord {
        let mut row = user.clone();
        row.password = None;
        row.password_confirmation = None;
        row.new_record = false;
        row
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>> {
        let Some(id) = self.emails.get(&email.to_lowercase()).map(|e| *e.value()) else {
            return Ok(None);
        };
        self.find(id).await
    }

    async fn find_by_remember_token(&self, token: &str) -> anyhow::Result<Option<UserRecord>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.remember_token.as_deref() == Some(token))
            .map(|u| u.clone()))
    }

    async fn list_by_role(&self, role: Role) -> anyhow::Result<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self
            .users
            .iter()
            .filter(|u| u.role == role)
            .map(|u| u.clone())
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn count_by_role(&self, role: Role) -> anyhow::Result<i64> {
        Ok(self.users.iter().filter(|u| u.role == role).count() as i64)
    }

    async fn email_taken(&self, email: &str, except: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .emails
            .get(&email.to_lowercase())
            .is_some_and(|owner| *owner != except))
    }

    async fn insert(&self, user: &UserRecord) -> Result<(), RepoError> {
        self.check_provider(user)?;
        self.reserve_email(&user.email, user.id)?;
        self.users.insert(user.id, Self::stored(user));
        Ok(())
    }

    async fn update(&self, user: &UserRecord) -> Result<(), RepoError> {
        let previous_email = match self.users.get(&user.id) {
            Some(existing) => existing.email.to_lowercase(),
            None => return Err(RepoError::NotFound),
        };
        self.replace(user, &previous_email)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let (_, user) = self.users.remove(&id).ok_or(RepoError::NotFound)?;
        self.emails.remove(&user.email.to_lowercase());
        for mut employee in self.employees.iter_mut() {
            if employee.user_id == Some(id) {
                employee.user_id = None;
            }
        }
        Ok(())
    }

    async fn find_provider(&self, id: Uuid) -> anyhow::Result<Option<WirelessProvider>> {
        Ok(self.providers.get(&id).map(|p| p.clone()))
    }

    async fn list_providers(&self) -> anyhow::Result<Vec<WirelessProvider>> {
        let mut providers: Vec<WirelessProvider> =
            self.providers.iter().map(|p| p.clone()).collect();
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(providers)
    }

    async fn insert_provider(&self, provider: &WirelessProvider) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.providers.iter().any(|p| p.domain == provider.domain),
            "wireless provider domain {} already exists",
            provider.domain
        );
        self.providers.insert(provider.id, provider.clone());
        Ok(())
    }

    async fn employees_of(&self, user_id: Uuid) -> anyhow::Result<Vec<Employee>> {
        let mut employees: Vec<Employee> = self
            .employees
            .iter()
            .filter(|e| e.user_id == Some(user_id))
            .map(|e| e.clone())
            .collect();
        employees.sort_by_key(|e| e.created_at);
        Ok(employees)
    }

    async fn insert_employee(&self, employee: &Employee) -> anyhow::Result<()> {
        self.employees.insert(employee.id, employee.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::NewUser;

    fn record(email: &str) -> UserRecord {
        UserRecord::new(NewUser {
            name: "Example User".into(),
            email: email.into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn insert_rejects_case_insensitive_duplicates() {
        let repo = MemoryUserRepo::new();
        repo.insert(&record("a@b.com")).await.unwrap();
        let err = repo.insert(&record("A@B.com")).await.unwrap_err();
        assert!(matches!(err, RepoError::DuplicateEmail));
    }

    #[tokio::test]
    async fn update_moves_email_reservation() {
        let repo = MemoryUserRepo::new();
        let mut user = record("old@example.com");
        repo.insert(&user).await.unwrap();

        user.email = "new@example.com".into();
        repo.update(&user).await.unwrap();

        assert!(repo.find_by_email("old@example.com").await.unwrap().is_none());
        assert!(repo.find_by_email("NEW@example.com").await.unwrap().is_some());
        assert!(!repo.email_taken("old@example.com", Uuid::new_v4()).await.unwrap());
        assert!(!repo.email_taken("new@example.com", user.id).await.unwrap());
        assert!(repo.email_taken("new@example.com", Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn update_of_missing_user_is_not_found() {
        let repo = MemoryUserRepo::new();
        let err = repo.update(&record("ghost@example.com")).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn replace_after_concurrent_delete_releases_email() {
        let repo = MemoryUserRepo::new();
        let mut user = record("gone@example.com");
        repo.insert(&user).await.unwrap();
        repo.delete(user.id).await.unwrap();

        user.email = "moved@example.com".into();
        let err = repo.replace(&user, "gone@example.com").unwrap_err();

        assert!(matches!(err, RepoError::NotFound));
        assert!(!repo.email_taken("moved@example.com", Uuid::new_v4()).await.unwrap());
        assert!(repo.find(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let repo = MemoryUserRepo::new();
        let mut user = record("carrier@example.com");
        user.wireless_provider_id = Some(Uuid::new_v4());

        let err = repo.insert(&user).await.unwrap_err();
        assert!(matches!(err, RepoError::UnknownProvider));
        assert!(!repo.email_taken("carrier@example.com", Uuid::new_v4()).await.unwrap());

        let provider = WirelessProvider::new("Carrier", "carrier.net");
        repo.insert_provider(&provider).await.unwrap();
        user.wireless_provider_id = Some(provider.id);
        repo.insert(&user).await.unwrap();
    }

    #[tokio::test]
    async fn counts_by_role() {
        let repo = MemoryUserRepo::new();
        let mut stylist = record("stylist@example.com");
        stylist.role = Role::Stylist;
        repo.insert(&stylist).await.unwrap();
        repo.insert(&record("plain@example.com")).await.unwrap();

        assert_eq!(repo.count_by_role(Role::Stylist).await.unwrap(), 1);
        assert_eq!(repo.count_by_role(Role::User).await.unwrap(), 1);
        assert_eq!(repo.count_by_role(Role::Client).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_orphans_employees() {
        let repo = MemoryUserRepo::new();
        let user = record("owner@example.com");
        repo.insert(&user).await.unwrap();
        repo.insert_employee(&Employee::new(user.id, "Sam")).await.unwrap();

        repo.delete(user.id).await.unwrap();

        assert!(repo.employees_of(user.id).await.unwrap().is_empty());
        assert!(repo.find(user.id).await.unwrap().is_none());
        assert!(!repo.email_taken("owner@example.com", Uuid::new_v4()).await.unwrap());
    }
}
