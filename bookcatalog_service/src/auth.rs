use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::error::InternalError;
use actix_web::http::header::AUTHORIZATION;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest, HttpResponse};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use futures::future::LocalBoxFuture;
use paperclip::actix::Apiv2Security;

use crate::api::{BookDetails, BookId, MessageResponse, UserId};
use crate::books_repository::{BooksRepository, BooksRepositoryError};
use crate::users_repository::{UsersRepository, UsersRepositoryError};

const TOKEN_PREFIX: &str = "Token ";

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("Failed to hash password: {}", err))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Identity of the caller, resolved from the `Authorization: Token <key>`
/// header against the users repository. Inactive (signed out) users are
/// rejected the same way unknown tokens are.
#[derive(Debug, Clone, Apiv2Security)]
#[openapi(
    apiKey,
    in = "header",
    name = "Authorization",
    description = "Session token, format: `Token <key>`"
)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

fn unauthorized(message: &str) -> actix_web::Error {
    InternalError::from_response(
        message.to_string(),
        HttpResponse::Unauthorized().json(MessageResponse {
            message: message.to_string(),
        }),
    )
    .into()
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let users_repository = req.app_data::<Data<Arc<dyn UsersRepository>>>().cloned();
        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(TOKEN_PREFIX))
            .map(|key| key.trim().to_string());

        Box::pin(async move {
            let users_repository = users_repository.ok_or_else(|| {
                actix_web::error::ErrorInternalServerError("Users repository is not configured")
            })?;

            let token = token
                .ok_or_else(|| unauthorized("Authentication credentials were not provided."))?;

            let user = match users_repository.get_user_by_token(&token).await {
                Ok(user) => user,
                Err(UsersRepositoryError::TokenNotFound) => {
                    return Err(unauthorized("Invalid token."));
                }
                Err(err) => {
                    tracing::error!("Token lookup failed {}", err);
                    return Err(actix_web::error::ErrorInternalServerError(
                        "Token lookup failed",
                    ));
                }
            };

            if !user.is_active {
                return Err(unauthorized("User inactive or deleted."));
            }

            Ok(AuthenticatedUser {
                id: user.id,
                username: user.username,
                email: user.email,
            })
        })
    }
}

#[derive(Debug)]
pub enum OwnedBookError {
    NotFound(BookId),
    NotOwner(BookId),
    Repository(BooksRepositoryError),
}

/// The one ownership guard in front of get/update/delete: loads the book
/// by id and checks its owner field against the caller before the actual
/// operation runs.
pub async fn load_owned_book(
    books_repository: &dyn BooksRepository,
    book_id: BookId,
    caller: UserId,
) -> Result<BookDetails, OwnedBookError> {
    let book = match books_repository.get_book(book_id).await {
        Ok(book) => book,
        Err(BooksRepositoryError::NotFound(id)) => return Err(OwnedBookError::NotFound(id)),
        Err(err) => return Err(OwnedBookError::Repository(err)),
    };

    if book.owner != caller {
        return Err(OwnedBookError::NotOwner(book_id));
    }

    Ok(book)
}

pub fn owned_book_error_response(err: OwnedBookError) -> HttpResponse {
    match err {
        OwnedBookError::NotFound(_) => HttpResponse::NotFound().json(MessageResponse {
            message: "Book not found".to_string(),
        }),
        OwnedBookError::NotOwner(_) => HttpResponse::Forbidden().json(MessageResponse {
            message: "You are not allowed to access this book".to_string(),
        }),
        OwnedBookError::Repository(err) => {
            tracing::error!("Failed to load book {}", err);
            HttpResponse::InternalServerError().finish()
        }
    }
}
