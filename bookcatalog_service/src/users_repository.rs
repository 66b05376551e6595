pub use in_memory_users_repository::InMemoryUsersRepository;
pub use postgres_users_repository::{PostgresUsersRepository, PostgresUsersRepositoryConfig};

use crate::api::UserId;

mod in_memory_users_repository;
mod postgres_users_repository;

#[derive(Debug, thiserror::Error)]
pub enum UsersRepositoryError {
    #[error("Username {0} already exists")]
    UsernameTaken(String),

    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("Token not recognized")]
    TokenNotFound,

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

/// User row as stored; the password is kept only as an argon2 hash
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewUserRecord {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[async_trait::async_trait]
pub trait UsersRepository: Send + Sync {
    /// Creates a user, fails with UsernameTaken if the username is in use
    async fn add_user(&self, user: NewUserRecord) -> Result<UserRecord, UsersRepositoryError>;

    async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<UserRecord, UsersRepositoryError>;

    /// Resolves the user owning the given session token
    async fn get_user_by_token(&self, token: &str) -> Result<UserRecord, UsersRepositoryError>;

    /// Issues a fresh session token for a newly created user
    async fn create_token(&self, user_id: UserId) -> Result<String, UsersRepositoryError>;

    /// Returns the user's session token, creating one if none exists.
    /// Tokens are one-to-one with users and are never rotated here.
    async fn get_or_create_token(&self, user_id: UserId) -> Result<String, UsersRepositoryError>;

    /// Flips the user back to active on a successful sign in
    async fn mark_signed_in(&self, user_id: UserId) -> Result<(), UsersRepositoryError>;

    /// Flips the user to inactive and records the sign out time
    async fn mark_signed_out(&self, user_id: UserId) -> Result<(), UsersRepositoryError>;
}
