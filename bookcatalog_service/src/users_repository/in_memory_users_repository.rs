use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::UNIX_EPOCH;

use uuid::Uuid;

use crate::api::UserId;
use crate::users_repository::{
    NewUserRecord, UserRecord, UsersRepository, UsersRepositoryError,
};

struct StoredUser {
    record: UserRecord,
    last_logout: Option<i64>,
}

pub struct InMemoryUsersRepository {
    users: parking_lot::RwLock<HashMap<UserId, StoredUser>>,
    // token key -> user id
    tokens: parking_lot::RwLock<HashMap<String, UserId>>,
    user_sequence_generator: AtomicI32,
}

impl Default for InMemoryUsersRepository {
    fn default() -> Self {
        Self {
            users: Default::default(),
            tokens: Default::default(),
            user_sequence_generator: Default::default(),
        }
    }
}

fn new_token_key() -> String {
    Uuid::new_v4().simple().to_string()
}

#[async_trait::async_trait]
impl UsersRepository for InMemoryUsersRepository {
    async fn add_user(&self, user: NewUserRecord) -> Result<UserRecord, UsersRepositoryError> {
        let mut locked_users = self.users.write();

        if locked_users
            .values()
            .any(|stored| stored.record.username == user.username)
        {
            return Err(UsersRepositoryError::UsernameTaken(user.username));
        }

        let id = self.user_sequence_generator.fetch_add(1, Ordering::Relaxed);
        let record = UserRecord {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            is_active: true,
        };
        locked_users.insert(
            id,
            StoredUser {
                record: record.clone(),
                last_logout: None,
            },
        );
        Ok(record)
    }

    async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<UserRecord, UsersRepositoryError> {
        self.users
            .read()
            .values()
            .find(|stored| stored.record.username == username)
            .map(|stored| stored.record.clone())
            .ok_or_else(|| UsersRepositoryError::UserNotFound(username.to_string()))
    }

    async fn get_user_by_token(&self, token: &str) -> Result<UserRecord, UsersRepositoryError> {
        let user_id = self
            .tokens
            .read()
            .get(token)
            .copied()
            .ok_or(UsersRepositoryError::TokenNotFound)?;

        self.users
            .read()
            .get(&user_id)
            .map(|stored| stored.record.clone())
            .ok_or(UsersRepositoryError::TokenNotFound)
    }

    async fn create_token(&self, user_id: UserId) -> Result<String, UsersRepositoryError> {
        let key = new_token_key();
        self.tokens.write().insert(key.clone(), user_id);
        Ok(key)
    }

    async fn get_or_create_token(&self, user_id: UserId) -> Result<String, UsersRepositoryError> {
        let mut locked_tokens = self.tokens.write();

        if let Some((key, _)) = locked_tokens.iter().find(|(_, &uid)| uid == user_id) {
            return Ok(key.clone());
        }

        let key = new_token_key();
        locked_tokens.insert(key.clone(), user_id);
        Ok(key)
    }

    async fn mark_signed_in(&self, user_id: UserId) -> Result<(), UsersRepositoryError> {
        let mut locked_users = self.users.write();
        let stored = locked_users
            .get_mut(&user_id)
            .ok_or_else(|| UsersRepositoryError::UserNotFound(user_id.to_string()))?;
        stored.record.is_active = true;
        Ok(())
    }

    async fn mark_signed_out(&self, user_id: UserId) -> Result<(), UsersRepositoryError> {
        let mut locked_users = self.users.write();
        let stored = locked_users
            .get_mut(&user_id)
            .ok_or_else(|| UsersRepositoryError::UserNotFound(user_id.to_string()))?;
        stored.record.is_active = false;
        stored.last_logout = Some(
            std::time::SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs() as i64,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests_in_memory_users_repository {
    use super::*;

    fn new_user(username: &str) -> NewUserRecord {
        NewUserRecord {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "$argon2id$fakehash".to_string(),
        }
    }

    #[tokio::test]
    /// Covers user creation and lookup
    /// 1. Creates a user, active by default
    /// 2. Gets the user by username
    /// 3. Tries to create a second user with the same username - rejected
    /// 4. Looks up an unknown username to get not found
    async fn test_user_management() {
        let repository = InMemoryUsersRepository::default();

        let user = repository.add_user(new_user("alice")).await.unwrap();
        assert!(user.is_active);

        let returned = repository.get_user_by_username("alice").await.unwrap();
        assert_eq!(returned, user);

        let duplicate = repository.add_user(new_user("alice")).await;
        assert!(matches!(
            duplicate,
            Err(UsersRepositoryError::UsernameTaken(..))
        ));

        let unknown = repository.get_user_by_username("bob").await;
        assert!(matches!(unknown, Err(UsersRepositoryError::UserNotFound(..))));
    }

    #[tokio::test]
    /// Covers the token lifecycle
    /// 1. Creates a user and a token, resolves the user through the token
    /// 2. get_or_create_token returns the same token on every call
    /// 3. A second user gets a distinct token
    /// 4. An unknown token is rejected
    async fn test_token_management() {
        let repository = InMemoryUsersRepository::default();

        let user = repository.add_user(new_user("alice")).await.unwrap();
        let token = repository.create_token(user.id).await.unwrap();

        let resolved = repository.get_user_by_token(&token).await.unwrap();
        assert_eq!(resolved.id, user.id);

        let same_token = repository.get_or_create_token(user.id).await.unwrap();
        assert_eq!(same_token, token);
        let same_token_again = repository.get_or_create_token(user.id).await.unwrap();
        assert_eq!(same_token_again, token);

        let other_user = repository.add_user(new_user("bob")).await.unwrap();
        let other_token = repository.get_or_create_token(other_user.id).await.unwrap();
        assert_ne!(other_token, token);

        let unknown = repository.get_user_by_token("not-a-token").await;
        assert!(matches!(unknown, Err(UsersRepositoryError::TokenNotFound)));
    }

    #[tokio::test]
    /// Covers the active flag transitions around sign out and sign in
    async fn test_sign_out_and_sign_in_flags() {
        let repository = InMemoryUsersRepository::default();

        let user = repository.add_user(new_user("alice")).await.unwrap();
        let token = repository.create_token(user.id).await.unwrap();

        repository.mark_signed_out(user.id).await.unwrap();
        let signed_out = repository.get_user_by_token(&token).await.unwrap();
        assert!(!signed_out.is_active);
        assert!(repository.users.read()[&user.id].last_logout.is_some());

        repository.mark_signed_in(user.id).await.unwrap();
        let signed_in = repository.get_user_by_token(&token).await.unwrap();
        assert!(signed_in.is_active);

        let unknown_user = repository.mark_signed_out(user.id + 100).await;
        assert!(matches!(
            unknown_user,
            Err(UsersRepositoryError::UserNotFound(..))
        ));
    }
}
