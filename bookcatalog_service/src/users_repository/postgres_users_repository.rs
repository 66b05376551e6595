use std::time::UNIX_EPOCH;

use anyhow::Context;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row, Statement};
use uuid::Uuid;

use crate::api::UserId;
use crate::users_repository::{
    NewUserRecord, UserRecord, UsersRepository, UsersRepositoryError,
};

pub struct PostgresUsersRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

pub struct PostgresUsersRepository {
    client: Client,
}

impl PostgresUsersRepository {
    pub async fn init(config: PostgresUsersRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!("Postgres connection_str: {}", connection_str);
        let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("connection error: {}", e);
            }
        });

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS users (
            id              SERIAL PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            email           TEXT NOT NULL,
            password_hash   TEXT NOT NULL,
            is_active       BOOLEAN NOT NULL DEFAULT TRUE,
            last_logout     BIGINT
            )
        ",
            )
            .await
            .context("Failed to setup users table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS tokens (
            key             TEXT PRIMARY KEY,
            user_id         INTEGER NOT NULL UNIQUE
            )
        ",
            )
            .await
            .context("Failed to setup tokens table")?;

        Ok(Self { client })
    }
}

fn user_from_row(row: &Row) -> Result<UserRecord, UsersRepositoryError> {
    Ok(UserRecord {
        id: row.try_get(0)?,
        username: row.try_get(1)?,
        email: row.try_get(2)?,
        password_hash: row.try_get(3)?,
        is_active: row.try_get(4)?,
    })
}

#[async_trait::async_trait]
impl UsersRepository for PostgresUsersRepository {
    async fn add_user(&self, user: NewUserRecord) -> Result<UserRecord, UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) \
                 RETURNING id, username, email, password_hash, is_active",
            )
            .await?;

        let rows = self
            .client
            .query(&stmt, &[&user.username, &user.email, &user.password_hash])
            .await;

        match rows {
            Ok(rows) => {
                let row = rows.first().ok_or_else(|| {
                    UsersRepositoryError::Other("Created user not returned".to_string())
                })?;
                user_from_row(row)
            }
            Err(err)
                if err
                    .as_db_error()
                    // This is unique constraint validation error
                    .map(|db_err| db_err.code() == &SqlState::from_code("23505"))
                    .unwrap_or_default() =>
            {
                Err(UsersRepositoryError::UsernameTaken(user.username))
            }
            Err(other_err) => Err(other_err.into()),
        }
    }

    async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<UserRecord, UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "SELECT id, username, email, password_hash, is_active FROM users \
                 WHERE username = $1",
            )
            .await?;

        let rows = self.client.query(&stmt, &[&username]).await?;

        let row = rows
            .first()
            .ok_or_else(|| UsersRepositoryError::UserNotFound(username.to_string()))?;
        user_from_row(row)
    }

    async fn get_user_by_token(&self, token: &str) -> Result<UserRecord, UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "SELECT u.id, u.username, u.email, u.password_hash, u.is_active \
                 FROM users u JOIN tokens t ON t.user_id = u.id \
                 WHERE t.key = $1",
            )
            .await?;

        let rows = self.client.query(&stmt, &[&token]).await?;

        let row = rows.first().ok_or(UsersRepositoryError::TokenNotFound)?;
        user_from_row(row)
    }

    async fn create_token(&self, user_id: UserId) -> Result<String, UsersRepositoryError> {
        let key = Uuid::new_v4().simple().to_string();
        let stmt: Statement = self
            .client
            .prepare("INSERT INTO tokens (key, user_id) VALUES ($1, $2) RETURNING key")
            .await?;

        let rows = self.client.query(&stmt, &[&key, &user_id]).await?;

        rows.first()
            .ok_or_else(|| UsersRepositoryError::Other("Token not returned".to_string()))?
            .try_get(0)
            .map_err(Into::into)
    }

    async fn get_or_create_token(&self, user_id: UserId) -> Result<String, UsersRepositoryError> {
        // Single upsert so two concurrent sign ins cannot mint two tokens;
        // the no-op DO UPDATE makes the existing row visible to RETURNING
        let key = Uuid::new_v4().simple().to_string();
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO tokens (key, user_id) VALUES ($1, $2) \
                 ON CONFLICT (user_id) DO UPDATE SET key = tokens.key \
                 RETURNING key",
            )
            .await?;

        let rows = self.client.query(&stmt, &[&key, &user_id]).await?;

        rows.first()
            .ok_or_else(|| UsersRepositoryError::Other("Token not returned".to_string()))?
            .try_get(0)
            .map_err(Into::into)
    }

    async fn mark_signed_in(&self, user_id: UserId) -> Result<(), UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("UPDATE users SET is_active = TRUE WHERE id = $1 RETURNING id")
            .await?;

        let rows = self.client.query(&stmt, &[&user_id]).await?;
        if rows.is_empty() {
            Err(UsersRepositoryError::UserNotFound(user_id.to_string()))
        } else {
            Ok(())
        }
    }

    async fn mark_signed_out(&self, user_id: UserId) -> Result<(), UsersRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE users SET is_active = FALSE, last_logout = $2 WHERE id = $1 \
                 RETURNING id",
            )
            .await?;

        let now = std::time::SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;

        let rows = self.client.query(&stmt, &[&user_id, &now]).await?;
        if rows.is_empty() {
            Err(UsersRepositoryError::UserNotFound(user_id.to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests_postgres_users_repository {
    use serial_test::file_serial;
    use testcontainers::core::IntoContainerPort;
    use testcontainers::runners::AsyncRunner;
    use testcontainers::{ContainerAsync, GenericImage, ImageExt};

    use super::*;

    async fn start_postgres_container_and_init_repo(
    ) -> (ContainerAsync<GenericImage>, PostgresUsersRepository) {
        let _pg_container = GenericImage::new("postgres", "latest")
            .with_mapped_port(5432, 5432.tcp())
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .start()
            .await
            .expect("Failed to start postgres");

        for _ in 0..10 {
            if let Ok(repo) = PostgresUsersRepository::init(PostgresUsersRepositoryConfig {
                hostname: "127.0.0.1".to_string(),
                username: "postgres".to_string(),
                password: "postgres".to_string(),
            })
            .await
            {
                return (_pg_container, repo);
            }
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        }
        panic!("Failed to setup postgres container")
    }

    fn new_user(username: &str) -> NewUserRecord {
        NewUserRecord {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "$argon2id$fakehash".to_string(),
        }
    }

    #[tokio::test]
    #[file_serial(key, path => "../.pgtestslock")]
    /// Covers user and token management against a real database
    /// Combined into big unit test to avoid duplicate container setup
    /// 1. Creates a user, gets it by username
    /// 2. Rejects a duplicate username through the unique constraint
    /// 3. Creates a token, resolves the user through it
    /// 4. get_or_create_token is idempotent per user
    /// 5. Sign out flips is_active off, sign in flips it back on
    /// 6. Unknown username/token are reported as not found
    async fn test_user_and_token_management() {
        let (_container, repository) = start_postgres_container_and_init_repo().await;

        let user = repository.add_user(new_user("alice")).await.unwrap();
        assert!(user.is_active);

        let returned = repository.get_user_by_username("alice").await.unwrap();
        assert_eq!(returned, user);

        let duplicate = repository.add_user(new_user("alice")).await;
        assert!(matches!(
            duplicate,
            Err(UsersRepositoryError::UsernameTaken(..))
        ));

        let token = repository.create_token(user.id).await.unwrap();
        let resolved = repository.get_user_by_token(&token).await.unwrap();
        assert_eq!(resolved.id, user.id);

        let same_token = repository.get_or_create_token(user.id).await.unwrap();
        assert_eq!(same_token, token);

        repository.mark_signed_out(user.id).await.unwrap();
        assert!(!repository.get_user_by_token(&token).await.unwrap().is_active);

        repository.mark_signed_in(user.id).await.unwrap();
        assert!(repository.get_user_by_token(&token).await.unwrap().is_active);

        let unknown_username = repository.get_user_by_username("bob").await;
        assert!(matches!(
            unknown_username,
            Err(UsersRepositoryError::UserNotFound(..))
        ));

        let unknown_token = repository.get_user_by_token("not-a-token").await;
        assert!(matches!(
            unknown_token,
            Err(UsersRepositoryError::TokenNotFound)
        ));
    }
}
