//! User model and related types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::AppError;

/// Prefix of human-readable member IDs (A0001, A0002, ...)
pub const MEMBER_ID_PREFIX: &str = "A";

/// Format a member sequence number as a member ID, zero-padded to four digits
pub fn format_member_id(number: i64) -> String {
    format!("{}{:04}", MEMBER_ID_PREFIX, number)
}

/// Extract the sequence number from a member ID
pub fn parse_member_id(member_id: &str) -> Option<i64> {
    let digits = member_id.strip_prefix(MEMBER_ID_PREFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl_text_type!(Role);

/// User account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            _ => Err(format!("Invalid user status: {}", s)),
        }
    }
}

impl_text_type!(UserStatus);

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    /// Sequential member ID (A0001, A0002, ...)
    pub member_id: String,
    pub name: String,
    pub email: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active_admin(&self) -> bool {
        self.role == Role::Admin && self.status == UserStatus::Active
    }
}

/// Reject a change that would leave the library without an active admin.
///
/// `active_admin_ids` are the current active admins; `remains_active_admin`
/// tells whether `target_id` is still an active admin after the change.
pub fn ensure_admin_remains(
    active_admin_ids: &[i32],
    target_id: i32,
    remains_active_admin: bool,
) -> Result<(), AppError> {
    if remains_active_admin || !active_admin_ids.contains(&target_id) {
        return Ok(());
    }
    if active_admin_ids.len() <= 1 {
        return Err(AppError::BusinessRule(
            "At least one active admin must remain".to_string(),
        ));
    }
    Ok(())
}

/// User query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    /// Search in name, email and member ID
    pub q: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

/// Self-registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterUser {
    #[validate(length(min = 1, max = 120, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub address: Option<String>,
    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

/// Create user request (admin)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 1, max = 120, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub address: Option<String>,
    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl From<RegisterUser> for CreateUser {
    fn from(user: RegisterUser) -> Self {
        Self {
            name: user.name,
            email: user.email,
            password: user.password,
            role: Some(Role::User),
            status: Some(UserStatus::Active),
            address: user.address,
            phone: user.phone,
            birth_date: user.birth_date,
        }
    }
}

/// Update user request (admin)
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 120, message = "Name must not be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub address: Option<String>,
    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

/// Update own profile request (built from a multipart form)
#[derive(Debug, Default, Validate)]
pub struct UpdateProfile {
    #[validate(length(min = 1, max = 120, message = "Name must not be empty"))]
    pub name: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    /// Current password (required to change password)
    pub current_password: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: Option<String>,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Bring the claims in line with the account as currently stored.
    ///
    /// The role is taken from the account, not from the token, so a demotion
    /// applies to tokens issued before it. Inactive accounts are refused.
    pub fn refresh(mut self, user: &User) -> Result<Self, AppError> {
        if user.id != self.user_id {
            return Err(AppError::Authentication("Token does not match the account".to_string()));
        }
        if user.status == UserStatus::Inactive {
            return Err(AppError::Authorization("Account is inactive".to_string()));
        }
        self.role = user.role;
        Ok(self)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require admin privileges
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator privileges required".to_string()))
        }
    }

    /// Allow the owner of a resource or an admin
    pub fn require_owner_or_admin(&self, owner_id: i32) -> Result<(), AppError> {
        if self.user_id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Not allowed to act on this resource".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> UserClaims {
        let now = Utc::now().timestamp();
        UserClaims {
            sub: "reader@example.org".to_string(),
            user_id: 7,
            role,
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn test_member_id_format() {
        assert_eq!(format_member_id(1), "A0001");
        assert_eq!(format_member_id(10), "A0010");
        assert_eq!(format_member_id(9999), "A9999");
        assert_eq!(format_member_id(10000), "A10000");
    }

    #[test]
    fn test_member_id_parse() {
        assert_eq!(parse_member_id("A0009"), Some(9));
        assert_eq!(parse_member_id("A10000"), Some(10000));
        assert_eq!(parse_member_id("B0001"), None);
        assert_eq!(parse_member_id("A"), None);
        assert_eq!(parse_member_id("A00x1"), None);
    }

    #[test]
    fn test_member_id_sequence_increments() {
        let next = parse_member_id("A0009").map(|n| format_member_id(n + 1));
        assert_eq!(next.as_deref(), Some("A0010"));
        let next = parse_member_id("A9999").map(|n| format_member_id(n + 1));
        assert_eq!(next.as_deref(), Some("A10000"));
    }

    #[test]
    fn test_last_admin_cannot_be_removed() {
        assert!(ensure_admin_remains(&[1], 1, false).is_err());
    }

    #[test]
    fn test_non_last_admin_can_be_removed() {
        assert!(ensure_admin_remains(&[1, 2], 1, false).is_ok());
    }

    #[test]
    fn test_changes_to_non_admins_are_unrestricted() {
        assert!(ensure_admin_remains(&[1], 5, false).is_ok());
        assert!(ensure_admin_remains(&[1], 1, true).is_ok());
    }

    #[test]
    fn test_role_and_status_parse() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("inactive".parse::<UserStatus>().unwrap(), UserStatus::Inactive);
        assert!("librarian".parse::<Role>().is_err());
    }

    #[test]
    fn test_token_round_trip() {
        let token = claims(Role::User).create_token("secret").unwrap();
        let decoded = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(decoded.user_id, 7);
        assert_eq!(decoded.role, Role::User);
        assert!(UserClaims::from_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_authorization_helpers() {
        assert!(claims(Role::User).require_admin().is_err());
        assert!(claims(Role::Admin).require_admin().is_ok());
        assert!(claims(Role::User).require_owner_or_admin(7).is_ok());
        assert!(claims(Role::User).require_owner_or_admin(8).is_err());
        assert!(claims(Role::Admin).require_owner_or_admin(8).is_ok());
    }

    fn account(id: i32, role: Role, status: UserStatus) -> User {
        let now = Utc::now();
        User {
            id,
            member_id: format_member_id(id as i64),
            name: "Reader".to_string(),
            email: "reader@example.org".to_string(),
            password_hash: String::new(),
            role,
            status,
            address: None,
            phone: None,
            birth_date: None,
            profile_image: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_refresh_applies_stored_role() {
        let demoted = claims(Role::Admin)
            .refresh(&account(7, Role::User, UserStatus::Active))
            .unwrap();
        assert_eq!(demoted.role, Role::User);
        assert!(demoted.require_admin().is_err());

        let promoted = claims(Role::User)
            .refresh(&account(7, Role::Admin, UserStatus::Active))
            .unwrap();
        assert!(promoted.require_admin().is_ok());
    }

    #[test]
    fn test_refresh_refuses_inactive_account() {
        let err = claims(Role::Admin)
            .refresh(&account(7, Role::User, UserStatus::Inactive))
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let err = claims(Role::User)
            .refresh(&account(7, Role::User, UserStatus::Inactive))
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
    }

    #[test]
    fn test_refresh_refuses_other_account() {
        let err = claims(Role::User)
            .refresh(&account(8, Role::User, UserStatus::Active))
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let now = Utc::now();
        let user = User {
            id: 1,
            member_id: format_member_id(1),
            name: "Ada".to_string(),
            email: "ada@example.org".to_string(),
            password_hash: "$argon2id$...".to_string(),
            role: Role::Admin,
            status: UserStatus::Active,
            address: None,
            phone: None,
            birth_date: None,
            profile_image: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "admin");
        assert!(user.is_active_admin());
    }
}
