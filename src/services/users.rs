//! User management, profiles and development seeding

use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::CreateBook,
        user::{CreateUser, Role, UpdateProfile, UpdateUser, User, UserQuery, UserStatus},
    },
    repository::Repository,
    services::{
        auth::{hash_password, verify_password, AuthService},
        uploads::{UploadService, UploadedFile},
    },
};

const SEED_ADMIN_NAME: &str = "Library Administrator";
const SEED_ADMIN_EMAIL: &str = "admin@libris.local";
const SEED_ADMIN_PASSWORD: &str = "admin123";

/// (title, author, publisher, year, isbn, category, stock)
const SEED_BOOKS: &[(&str, &str, &str, i32, &str, &str, i32)] = &[
    ("Laskar Pelangi", "Andrea Hirata", "Bentang Pustaka", 2005, "9789793062792", "Novel", 5),
    ("Bumi Manusia", "Pramoedya Ananta Toer", "Hasta Mitra", 1980, "9789799731234", "Novel", 3),
    ("The Pragmatic Programmer", "Andrew Hunt", "Addison-Wesley", 1999, "9780201616224", "Technology", 2),
    ("Clean Code", "Robert C. Martin", "Prentice Hall", 2008, "9780132350884", "Technology", 4),
    ("Sapiens", "Yuval Noah Harari", "Harper", 2011, "9780062316097", "History", 2),
    ("Cosmos", "Carl Sagan", "Random House", 1980, "9780394502946", "Science", 0),
];

/// What the seed endpoint created
#[derive(Debug, Serialize, ToSchema)]
pub struct SeedReport {
    pub admin_created: bool,
    pub books_created: usize,
}

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    auth: AuthService,
    uploads: UploadService,
}

impl UsersService {
    pub fn new(repository: Repository, auth: AuthService, uploads: UploadService) -> Self {
        Self { repository, auth, uploads }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn search_users(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        self.repository.users.search(query).await
    }

    /// Create a user with any role and status (admin)
    pub async fn create_user(&self, user: CreateUser) -> AppResult<User> {
        user.validate()?;
        self.auth.create_account(user).await
    }

    /// Update an existing user (admin)
    pub async fn update_user(&self, id: i32, mut user: UpdateUser) -> AppResult<User> {
        user.validate()?;

        if let Some(ref email) = user.email {
            let email = email.trim().to_lowercase();
            if self.repository.users.email_exists(&email, Some(id)).await? {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
            user.email = Some(email);
        }

        let password = match user.password {
            Some(ref password) => Some(hash_password(password)?),
            None => None,
        };

        let updated = self.repository.users.update(id, &user, password).await?;
        tracing::info!(
            "Updated user {} (role {}, status {})",
            updated.member_id,
            updated.role,
            updated.status
        );
        Ok(updated)
    }

    /// Delete a user and their loans (admin). Admins cannot delete themselves.
    pub async fn delete_user(&self, actor_id: i32, id: i32) -> AppResult<()> {
        if actor_id == id {
            return Err(AppError::BusinessRule("You cannot delete your own account".to_string()));
        }

        let deleted = self.repository.users.delete(id).await?;
        if let Some(ref image) = deleted.profile_image {
            self.uploads.remove(image).await;
        }

        tracing::info!("Deleted user {}", deleted.member_id);
        Ok(())
    }

    /// Update the caller's own profile
    pub async fn update_profile(
        &self,
        user_id: i32,
        profile: UpdateProfile,
        image: Option<UploadedFile>,
    ) -> AppResult<User> {
        profile.validate()?;

        let user = self.repository.users.get_by_id(user_id).await?;

        // If changing password, verify current password
        let password = match profile.new_password {
            Some(ref new_password) => {
                let current_password = profile.current_password.as_deref().ok_or_else(|| {
                    AppError::Validation("Current password required to change password".to_string())
                })?;
                if !verify_password(&user.password_hash, current_password)? {
                    return Err(AppError::Authentication("Current password is incorrect".to_string()));
                }
                Some(hash_password(new_password)?)
            }
            None => None,
        };

        let image_url = match image {
            Some(ref file) => Some(self.uploads.store_image(file).await?),
            None => None,
        };

        let updated = match self
            .repository
            .users
            .update_profile(user_id, &profile, password, image_url.as_deref())
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(ref url) = image_url {
                    self.uploads.remove(url).await;
                }
                return Err(e);
            }
        };

        if image_url.is_some() {
            if let Some(ref old) = user.profile_image {
                self.uploads.remove(old).await;
            }
        }

        Ok(updated)
    }

    /// Create a default admin and sample books when missing
    pub async fn seed(&self, environment: &str) -> AppResult<SeedReport> {
        if environment.eq_ignore_ascii_case("production") {
            return Err(AppError::Authorization("Seeding is disabled in production".to_string()));
        }

        let mut report = SeedReport { admin_created: false, books_created: 0 };

        if self.repository.users.count_admins().await? == 0 {
            self.auth
                .create_account(CreateUser {
                    name: SEED_ADMIN_NAME.to_string(),
                    email: SEED_ADMIN_EMAIL.to_string(),
                    password: SEED_ADMIN_PASSWORD.to_string(),
                    role: Some(Role::Admin),
                    status: Some(UserStatus::Active),
                    address: None,
                    phone: None,
                    birth_date: None,
                })
                .await?;
            report.admin_created = true;
        }

        if self.repository.books.count().await? == 0 {
            for (title, author, publisher, year, isbn, category, stock) in SEED_BOOKS {
                let book = CreateBook {
                    title: title.to_string(),
                    author: author.to_string(),
                    publisher: Some(publisher.to_string()),
                    year: Some(*year),
                    isbn: Some(isbn.to_string()),
                    category: Some(category.to_string()),
                    stock: *stock,
                };
                self.repository.books.create(&book, None).await?;
                report.books_created += 1;
            }
        }

        tracing::info!(
            "Seed finished: admin_created={}, books_created={}",
            report.admin_created,
            report.books_created
        );

        Ok(report)
    }
}
