//! Users repository for database operations

use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::user::{
        ensure_admin_remains, format_member_id, CreateUser, Role, UpdateProfile, UpdateUser, User,
        UserQuery, UserStatus,
    },
};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by email (case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Check if email already exists
    pub async fn email_exists(&self, email: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND ($2::int IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// List users matching the query
    pub async fn search(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        let pattern = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q.to_lowercase()));

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE ($1::text IS NULL
                   OR LOWER(name) LIKE $1 OR LOWER(email) LIKE $1 OR LOWER(member_id) LIKE $1)
              AND ($2::text IS NULL OR role = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY member_id
            "#,
        )
        .bind(pattern)
        .bind(query.role)
        .bind(query.status)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Create a new user with the next member ID from the database sequence
    pub async fn create(&self, user: &CreateUser, password_hash: &str) -> AppResult<User> {
        let number: i64 = sqlx::query_scalar("SELECT nextval('member_number_seq')")
            .fetch_one(&self.pool)
            .await?;

        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO users (
                member_id, name, email, password_hash, role, status,
                address, phone, birth_date
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(format_member_id(number))
        .bind(&user.name)
        .bind(&user.email)
        .bind(password_hash)
        .bind(user.role.unwrap_or(Role::User))
        .bind(user.status.unwrap_or(UserStatus::Active))
        .bind(&user.address)
        .bind(&user.phone)
        .bind(user.birth_date)
        .fetch_one(&self.pool)
        .await?;

        self.get_by_id(id).await
    }

    /// Lock active admin rows and return their IDs
    async fn lock_active_admins(tx: &mut Transaction<'_, Postgres>) -> AppResult<Vec<i32>> {
        let ids = sqlx::query_scalar::<_, i32>(
            "SELECT id FROM users WHERE role = 'admin' AND status = 'active' ORDER BY id FOR UPDATE",
        )
        .fetch_all(&mut **tx)
        .await?;
        Ok(ids)
    }

    /// Update an existing user (admin). Role and status changes are checked
    /// against the last-admin rule inside the same transaction.
    pub async fn update(&self, id: i32, user: &UpdateUser, password_hash: Option<String>) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;

        // Admin rows are always locked before the target row
        let admins = if user.role.is_some() || user.status.is_some() {
            Some(Self::lock_active_admins(&mut tx).await?)
        } else {
            None
        };

        let current = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;

        if let Some(admins) = admins {
            let role = user.role.unwrap_or(current.role);
            let status = user.status.unwrap_or(current.status);
            ensure_admin_remains(
                &admins,
                id,
                role == Role::Admin && status == UserStatus::Active,
            )?;
        }

        let mut sets = vec!["updated_at = NOW()".to_string()];
        let mut param_idx = 1;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, param_idx));
                    param_idx += 1;
                }
            };
        }

        add_field!(user.name, "name");
        add_field!(user.email, "email");
        add_field!(user.role, "role");
        add_field!(user.status, "status");
        add_field!(user.address, "address");
        add_field!(user.phone, "phone");
        add_field!(user.birth_date, "birth_date");
        add_field!(password_hash, "password_hash");

        let query = format!("UPDATE users SET {} WHERE id = ${}", sets.join(", "), param_idx);

        let mut builder = sqlx::query(&query);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(user.name);
        bind_field!(user.email);
        bind_field!(user.role);
        bind_field!(user.status);
        bind_field!(user.address);
        bind_field!(user.phone);
        bind_field!(user.birth_date);
        bind_field!(password_hash);

        builder.bind(id).execute(&mut *tx).await?;

        tx.commit().await?;

        self.get_by_id(id).await
    }

    /// Update user's own profile (never role or status)
    pub async fn update_profile(
        &self,
        id: i32,
        profile: &UpdateProfile,
        password_hash: Option<String>,
        profile_image: Option<&str>,
    ) -> AppResult<User> {
        let mut sets = vec!["updated_at = NOW()".to_string()];
        let mut param_idx = 1;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, param_idx));
                    param_idx += 1;
                }
            };
        }

        add_field!(profile.name, "name");
        add_field!(profile.address, "address");
        add_field!(profile.phone, "phone");
        add_field!(profile.birth_date, "birth_date");
        add_field!(password_hash, "password_hash");
        add_field!(profile_image, "profile_image");

        let query = format!("UPDATE users SET {} WHERE id = ${}", sets.join(", "), param_idx);

        let mut builder = sqlx::query(&query);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(profile.name);
        bind_field!(profile.address);
        bind_field!(profile.phone);
        bind_field!(profile.birth_date);
        bind_field!(password_hash);
        bind_field!(profile_image);

        builder.bind(id).execute(&self.pool).await?;

        self.get_by_id(id).await
    }

    /// Delete a user and all of their loans in one transaction.
    ///
    /// Refused when the user is the last active admin. Returns the deleted user.
    pub async fn delete(&self, id: i32) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;

        let admins = Self::lock_active_admins(&mut tx).await?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;

        ensure_admin_remains(&admins, id, false)?;

        sqlx::query("DELETE FROM loans WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(user)
    }

    pub async fn count_admins(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Count members (role user), optionally only active ones
    pub async fn count_members(&self, only_active: bool) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE role = 'user' AND (NOT $1 OR status = 'active')",
        )
        .bind(only_active)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
