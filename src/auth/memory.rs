use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{
    identifier::IdentifierKind,
    repo::CredentialStore,
    repo_types::{ConflictProbe, NewUser, PasswordUpdate, StoreError, UniqueField, User, UserUpdate},
};

/// Process-local store with the same uniqueness rules as the Postgres schema.
/// Check-and-write happens under one lock, so concurrent inserts of the same
/// email or provider id cannot both succeed.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, User>>, StoreError> {
        self.users
            .lock()
            .map_err(|_| StoreError::Unavailable(anyhow::anyhow!("memory store poisoned")))
    }

    fn find_where(&self, pred: impl Fn(&User) -> bool) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.values().find(|u| pred(u)).cloned())
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// First constraint `candidate` would break against `others`.
fn violation<'a>(
    others: impl Iterator<Item = &'a User>,
    email: &str,
    phone: Option<&str>,
    username: Option<&str>,
    provider_id: Option<&str>,
) -> Option<UniqueField> {
    for u in others {
        if same_email(&u.email, email) {
            return Some(UniqueField::Email);
        }
        if phone.is_some() && u.phone.as_deref() == phone {
            return Some(UniqueField::Phone);
        }
        if username.is_some() && u.username.as_deref() == username {
            return Some(UniqueField::Username);
        }
        if provider_id.is_some() && u.provider_id.as_deref() == provider_id {
            return Some(UniqueField::ProviderId);
        }
    }
    None
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_where(|u| same_email(&u.email, email))
    }

    async fn find_by_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
    ) -> Result<Option<User>, StoreError> {
        self.find_where(|u| match kind {
            IdentifierKind::Phone => u.phone.as_deref() == Some(value),
            IdentifierKind::Username => u.username.as_deref() == Some(value),
        })
    }

    async fn find_by_provider_id(&self, provider_id: &str) -> Result<Option<User>, StoreError> {
        self.find_where(|u| u.provider_id.as_deref() == Some(provider_id))
    }

    async fn find_conflict(&self, probe: ConflictProbe<'_>) -> Result<Option<UniqueField>, StoreError> {
        let users = self.lock()?;
        for u in users.values().filter(|u| Some(u.id) != probe.exclude) {
            if probe.email.is_some_and(|e| same_email(&u.email, e)) {
                return Ok(Some(UniqueField::Email));
            }
            if probe.phone.is_some() && u.phone.as_deref() == probe.phone {
                return Ok(Some(UniqueField::Phone));
            }
            if probe.username.is_some() && u.username.as_deref() == probe.username {
                return Ok(Some(UniqueField::Username));
            }
        }
        Ok(None)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.lock()?;
        if let Some(field) = violation(
            users.values(),
            &user.email,
            user.phone.as_deref(),
            user.username.as_deref(),
            user.provider_id.as_deref(),
        ) {
            return Err(StoreError::UniqueViolation(field));
        }

        let now = OffsetDateTime::now_utc();
        let record = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
            provider_id: user.provider_id,
            avatar_url: user.avatar_url,
            created_at: now,
            updated_at: now,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: Uuid, changes: UserUpdate) -> Result<User, StoreError> {
        let mut users = self.lock()?;
        let mut next = users.get(&id).cloned().ok_or(StoreError::NotFound)?;

        if let Some(name) = changes.name {
            next.name = name;
        }
        if let Some(email) = changes.email {
            next.email = email;
        }
        if let Some(phone) = changes.phone {
            next.phone = Some(phone);
        }
        if let Some(username) = changes.username {
            next.username = Some(username);
        }
        if let PasswordUpdate::Replace(hash) = changes.password {
            next.password_hash = hash;
        }
        if let Some(provider_id) = changes.provider_id {
            next.provider_id = Some(provider_id);
        }
        if let Some(avatar_url) = changes.avatar_url {
            next.avatar_url = Some(avatar_url);
        }
        if let Some(active) = changes.is_active {
            next.is_active = active;
        }

        if let Some(field) = violation(
            users.values().filter(|u| u.id != id),
            &next.email,
            next.phone.as_deref(),
            next.username.as_deref(),
            next.provider_id.as_deref(),
        ) {
            return Err(StoreError::UniqueViolation(field));
        }

        next.updated_at = OffsetDateTime::now_utc();
        users.insert(id, next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::Role;

    fn new_user(email: &str, phone: Option<&str>) -> NewUser {
        NewUser {
            name: "Test".into(),
            email: email.into(),
            phone: phone.map(Into::into),
            username: None,
            password_hash: "$argon2id$fake".into(),
            role: Role::User,
            provider_id: None,
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_email_case_insensitively() {
        let store = MemoryCredentialStore::new();
        store.insert(new_user("a@example.com", None)).await.unwrap();
        let err = store.insert(new_user("A@Example.com", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(UniqueField::Email)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_rejects_phone_owned_by_someone_else() {
        let store = MemoryCredentialStore::new();
        store
            .insert(new_user("a@example.com", Some("+254700000001")))
            .await
            .unwrap();
        let b = store.insert(new_user("b@example.com", None)).await.unwrap();
        let err = store
            .update(
                b.id,
                UserUpdate {
                    phone: Some("+254700000001".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(UniqueField::Phone)));
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let store = MemoryCredentialStore::new();
        let err = store
            .update(Uuid::new_v4(), UserUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn find_conflict_honours_exclusion() {
        let store = MemoryCredentialStore::new();
        let a = store.insert(new_user("a@example.com", None)).await.unwrap();
        let probe = ConflictProbe {
            email: Some("a@example.com"),
            ..Default::default()
        };
        assert_eq!(store.find_conflict(probe).await.unwrap(), Some(UniqueField::Email));
        let probe = ConflictProbe {
            exclude: Some(a.id),
            ..probe
        };
        assert_eq!(store.find_conflict(probe).await.unwrap(), None);
    }
}
