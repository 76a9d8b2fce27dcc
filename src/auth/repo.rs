use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{
    identifier::IdentifierKind,
    repo_types::{ConflictProbe, NewUser, PasswordUpdate, StoreError, UniqueField, User, UserRow, UserUpdate},
};

/// Persistence seam for user records.
///
/// `insert` and `update` must report uniqueness violations as
/// [`StoreError::UniqueViolation`]; that constraint, not the advisory
/// [`CredentialStore::find_conflict`] pre-check, is what keeps emails,
/// phones, usernames and provider ids unique under concurrent writes.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Case-insensitive; matches inactive users too.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn find_by_provider_id(&self, provider_id: &str) -> Result<Option<User>, StoreError>;

    async fn find_conflict(&self, probe: ConflictProbe<'_>) -> Result<Option<UniqueField>, StoreError>;

    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    async fn update(&self, id: Uuid, changes: UserUpdate) -> Result<User, StoreError>;
}

const SELECT_USER: &str = r#"
    SELECT id, name, email, phone, username, password_hash, role, is_active,
           provider_id, avatar_url, created_at, updated_at
    FROM users
"#;

const RETURNING_USER: &str = r#"
    RETURNING id, name, email, phone, username, password_hash, role, is_active,
              provider_id, avatar_url, created_at, updated_at
"#;

/// Postgres-backed store; see `migrations/` for the constraints it relies on.
#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("{SELECT_USER} WHERE {clause}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("{SELECT_USER} WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("lower(email) = lower($1)", email).await
    }

    async fn find_by_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
    ) -> Result<Option<User>, StoreError> {
        match kind {
            IdentifierKind::Phone => self.fetch_one_where("phone = $1", value).await,
            IdentifierKind::Username => self.fetch_one_where("username = $1", value).await,
        }
    }

    async fn find_by_provider_id(&self, provider_id: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("provider_id = $1", provider_id).await
    }

    async fn find_conflict(&self, probe: ConflictProbe<'_>) -> Result<Option<UniqueField>, StoreError> {
        let field = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT CASE
                WHEN lower(email) = lower($1) THEN 'email'
                WHEN phone = $2 THEN 'phone'
                WHEN username = $3 THEN 'username'
            END
            FROM users
            WHERE ($4::uuid IS NULL OR id <> $4)
              AND (lower(email) = lower($1) OR phone = $2 OR username = $3)
            LIMIT 1
            "#,
        )
        .bind(probe.email)
        .bind(probe.phone)
        .bind(probe.username)
        .bind(probe.exclude)
        .fetch_optional(&self.db)
        .await?
        .flatten();

        Ok(field.and_then(|f| match f.as_str() {
            "email" => Some(UniqueField::Email),
            "phone" => Some(UniqueField::Phone),
            "username" => Some(UniqueField::Username),
            _ => None,
        }))
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, phone, username, password_hash, role,
                               provider_id, avatar_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            {RETURNING_USER}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(&user.provider_id)
            .bind(&user.avatar_url)
            .fetch_one(&self.db)
            .await?;
        User::try_from(row)
    }

    async fn update(&self, id: Uuid, changes: UserUpdate) -> Result<User, StoreError> {
        let password_hash = match changes.password {
            PasswordUpdate::Unchanged => None,
            PasswordUpdate::Replace(hash) => Some(hash),
        };
        let sql = format!(
            r#"
            UPDATE users SET
                name          = COALESCE($2, name),
                email         = COALESCE($3, email),
                phone         = COALESCE($4, phone),
                username      = COALESCE($5, username),
                password_hash = COALESCE($6, password_hash),
                provider_id   = COALESCE($7, provider_id),
                avatar_url    = COALESCE($8, avatar_url),
                is_active     = COALESCE($9, is_active),
                updated_at    = now()
            WHERE id = $1
            {RETURNING_USER}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(changes.name)
            .bind(changes.email)
            .bind(changes.phone)
            .bind(changes.username)
            .bind(password_hash)
            .bind(changes.provider_id)
            .bind(changes.avatar_url)
            .bind(changes.is_active)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)?;
        User::try_from(row)
    }
}
