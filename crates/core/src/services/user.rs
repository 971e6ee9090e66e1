//! User service.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::Set;
use serde::Deserialize;
use taskdesk_common::{AppError, AppResult, TokenGenerator};
use taskdesk_db::{entities::user, repositories::UserRepository};
use validator::Validate;

use crate::input::{non_empty, now};

use user::{UserRole, UserStatus};

/// User service for business logic.
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
    tokens: TokenGenerator,
}

/// Input for registering a new account.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    #[validate(length(max = 32))]
    pub phone: Option<String>,

    /// `client` or `freelancer`
    pub role: Option<String>,
}

/// A signed-in user and the session token to hand back.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: user::Model,
    pub token: String,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub const fn new(user_repo: UserRepository) -> Self {
        Self {
            user_repo,
            tokens: TokenGenerator::new(),
        }
    }

    /// Register a client or freelancer account and sign it in.
    pub async fn register(&self, input: RegisterInput) -> AppResult<Session> {
        input.validate()?;

        let role = match input.role.as_deref().map(str::trim) {
            None | Some("" | "client") => UserRole::Client,
            Some("freelancer") => UserRole::Freelancer,
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "Cannot register with role '{other}'."
                )));
            }
        };

        let email = input.email.trim().to_lowercase();
        if self.user_repo.find_by_email(&email).await?.is_some() {
            return Err(AppError::Validation(
                "An account with this email already exists.".to_string(),
            ));
        }

        let token = self.tokens.session_token();
        let user = self
            .user_repo
            .create(user::ActiveModel {
                name: Set(input.name.trim().to_string()),
                email: Set(email),
                phone: Set(non_empty(input.phone)),
                password_hash: Set(hash_password(&input.password)?),
                role: Set(role),
                status: Set(UserStatus::Active),
                token: Set(Some(token.clone())),
                deleted_at: Set(None),
                created_at: Set(now()),
                updated_at: Set(None),
                ..Default::default()
            })
            .await?;

        tracing::info!(user_id = user.id, role = ?user.role, "User registered");
        Ok(Session { user, token })
    }

    /// Sign in with email and password, issuing a fresh token.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<Session> {
        let user = self
            .user_repo
            .find_by_email(&email.trim().to_lowercase())
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(password, &user.password_hash)? {
            tracing::debug!(user_id = user.id, "Password mismatch");
            return Err(AppError::Unauthorized);
        }
        if !user.is_active() {
            return Err(AppError::Forbidden("This account is not active".to_string()));
        }

        let token = self.tokens.session_token();
        let mut active: user::ActiveModel = user.into();
        active.token = Set(Some(token.clone()));
        let user = self.user_repo.update(active).await?;

        tracing::info!(user_id = user.id, "User logged in");
        Ok(Session { user, token })
    }

    /// Revoke the user's session token.
    pub async fn logout(&self, user: &user::Model) -> AppResult<()> {
        let mut active: user::ActiveModel = user.clone().into();
        active.token = Set(None);
        self.user_repo.update(active).await?;
        Ok(())
    }

    /// Resolve a session token to an active user.
    pub async fn authenticate(&self, token: &str) -> AppResult<user::Model> {
        let user = self
            .user_repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)?;
        if user.is_active() {
            Ok(user)
        } else {
            Err(AppError::Unauthorized)
        }
    }

    pub async fn list_users(&self, role: Option<&str>) -> AppResult<Vec<user::Model>> {
        let role = match role.map(str::trim).filter(|r| !r.is_empty()) {
            None => None,
            Some(r) => Some(parse_role(r)?),
        };
        self.user_repo.list(role).await
    }

    /// Suspend an account and revoke its session.
    pub async fn suspend(&self, admin: &user::Model, user_id: i32) -> AppResult<user::Model> {
        let target = self.target(admin, user_id).await?;
        let mut active: user::ActiveModel = target.into();
        active.status = Set(UserStatus::Suspended);
        active.token = Set(None);
        active.updated_at = Set(Some(now()));
        let user = self.user_repo.update(active).await?;
        tracing::info!(user_id, admin_id = admin.id, "User suspended");
        Ok(user)
    }

    pub async fn unsuspend(&self, admin: &user::Model, user_id: i32) -> AppResult<user::Model> {
        let target = self.target(admin, user_id).await?;
        if target.status == UserStatus::Deleted {
            return Err(AppError::Validation(
                "Deleted accounts cannot be reactivated.".to_string(),
            ));
        }
        let mut active: user::ActiveModel = target.into();
        active.status = Set(UserStatus::Active);
        active.updated_at = Set(Some(now()));
        let user = self.user_repo.update(active).await?;
        tracing::info!(user_id, admin_id = admin.id, "User unsuspended");
        Ok(user)
    }

    /// Soft-delete an account. The row stays so tasks and invoices keep their owner.
    pub async fn soft_delete(&self, admin: &user::Model, user_id: i32) -> AppResult<user::Model> {
        let target = self.target(admin, user_id).await?;
        let at = now();
        let mut active: user::ActiveModel = target.into();
        active.status = Set(UserStatus::Deleted);
        active.deleted_at = Set(Some(at));
        active.token = Set(None);
        active.updated_at = Set(Some(at));
        let user = self.user_repo.update(active).await?;
        tracing::info!(user_id, admin_id = admin.id, "User deleted");
        Ok(user)
    }

    pub async fn set_role(
        &self,
        admin: &user::Model,
        user_id: i32,
        role: &str,
    ) -> AppResult<user::Model> {
        let role = parse_role(role)?;
        let target = self.target(admin, user_id).await?;
        let mut active: user::ActiveModel = target.into();
        active.role = Set(role);
        active.updated_at = Set(Some(now()));
        let user = self.user_repo.update(active).await?;
        tracing::info!(user_id, admin_id = admin.id, role = ?role, "User role changed");
        Ok(user)
    }

    /// Load the user an admin action applies to. Admins cannot act on themselves.
    async fn target(&self, admin: &user::Model, user_id: i32) -> AppResult<user::Model> {
        if !admin.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        if admin.id == user_id {
            return Err(AppError::Validation(
                "You cannot change your own account here.".to_string(),
            ));
        }
        self.user_repo.get_by_id(user_id).await
    }
}

fn parse_role(value: &str) -> AppResult<UserRole> {
    match value.trim().to_lowercase().as_str() {
        "client" => Ok(UserRole::Client),
        "freelancer" => Ok(UserRole::Freelancer),
        "admin" => Ok(UserRole::Admin),
        other => Err(AppError::Validation(format!("Unknown role '{other}'."))),
    }
}

/// Hash a password using Argon2.
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;
    use taskdesk_db::test_utils::TestDatabase;

    fn create_test_user(id: i32, status: UserStatus) -> user::Model {
        user::Model {
            id,
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            phone: None,
            password_hash: String::new(),
            role: UserRole::Client,
            status,
            token: Some("test_token".to_string()),
            deleted_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn register_input(email: &str, role: Option<&str>) -> RegisterInput {
        RegisterInput {
            name: "Amina".to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
            phone: Some("  ".to_string()),
            role: role.map(ToString::to_string),
        }
    }

    async fn service() -> (TestDatabase, UserService) {
        let db = TestDatabase::in_memory().await.unwrap();
        let service = UserService::new(UserRepository::new(db.shared()));
        (db, service)
    }

    #[test]
    fn test_hash_password() {
        let hash = hash_password("test_password_123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("test_password_123", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(verify_password("password", "not_a_valid_hash").is_err());
    }

    #[tokio::test]
    async fn test_authenticate_by_token_found() {
        let user = create_test_user(1, UserStatus::Active);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user.clone()]])
                .into_connection(),
        );
        let service = UserService::new(UserRepository::new(db));

        let result = service.authenticate("test_token").await.unwrap();
        assert_eq!(result.id, 1);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_suspended() {
        let user = create_test_user(1, UserStatus::Suspended);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user]])
                .into_connection(),
        );
        let service = UserService::new(UserRepository::new(db));

        let result = service.authenticate("test_token").await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (_db, service) = service().await;

        let session = service
            .register(register_input("Amina@Example.com", Some("freelancer")))
            .await
            .unwrap();
        assert_eq!(session.user.email, "amina@example.com");
        assert_eq!(session.user.role, UserRole::Freelancer);
        assert!(session.user.phone.is_none());
        assert_eq!(session.token.len(), 64);
        assert_eq!(service.authenticate(&session.token).await.unwrap().id, session.user.id);

        let login = service.login("amina@example.com", "correct horse").await.unwrap();
        assert_ne!(login.token, session.token);
        assert!(matches!(
            service.authenticate(&session.token).await,
            Err(AppError::Unauthorized)
        ));

        assert!(matches!(
            service.login("amina@example.com", "wrong").await,
            Err(AppError::Unauthorized)
        ));

        service.logout(&login.user).await.unwrap();
        assert!(service.authenticate(&login.token).await.is_err());
    }

    #[tokio::test]
    async fn test_register_rejects_admin_and_duplicates() {
        let (_db, service) = service().await;

        let err = service
            .register(register_input("boss@example.com", Some("admin")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        service.register(register_input("a@example.com", None)).await.unwrap();
        let err = service.register(register_input("A@example.com", None)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut short = register_input("b@example.com", None);
        short.password = "short".to_string();
        assert!(service.register(short).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_actions() {
        let (db, service) = service().await;
        let admin = db.seed_user("admin@example.com", UserRole::Admin).await.unwrap();
        let session = service.register(register_input("c@example.com", None)).await.unwrap();
        let id = session.user.id;

        let suspended = service.suspend(&admin, id).await.unwrap();
        assert_eq!(suspended.status, UserStatus::Suspended);
        assert!(suspended.token.is_none());
        assert!(matches!(
            service.login("c@example.com", "correct horse").await,
            Err(AppError::Forbidden(_))
        ));

        assert_eq!(service.unsuspend(&admin, id).await.unwrap().status, UserStatus::Active);
        assert_eq!(
            service.set_role(&admin, id, "freelancer").await.unwrap().role,
            UserRole::Freelancer
        );
        assert!(service.set_role(&admin, id, "owner").await.is_err());

        let deleted = service.soft_delete(&admin, id).await.unwrap();
        assert_eq!(deleted.status, UserStatus::Deleted);
        assert!(deleted.deleted_at.is_some());
        assert!(service.unsuspend(&admin, id).await.is_err());

        assert!(matches!(
            service.suspend(&admin, admin.id).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.suspend(&session.user, admin.id).await,
            Err(AppError::Forbidden(_))
        ));

        assert_eq!(service.list_users(Some("admin")).await.unwrap().len(), 1);
        assert_eq!(service.list_users(None).await.unwrap().len(), 2);
    }
}
