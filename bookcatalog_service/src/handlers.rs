use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{Error, HttpResponse};
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{
    BookId, BookPayload, BookResponse, BooksResponse, MessageResponse, SearchQuery, SignInRequest,
    SignUpRequest, TokenResponse, UserDetails, ValidationErrorResponse, ValidationErrors,
};
use crate::auth::{self, AuthenticatedUser};
use crate::books_repository::{BooksRepository, BooksRepositoryError};
use crate::users_repository::{NewUserRecord, UsersRepository, UsersRepositoryError};

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[api_v2_operation]
pub async fn sign_up(
    users_repository: Data<Arc<dyn UsersRepository>>,
    request: web::Json<SignUpRequest>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();

    let (username, email, password) = match (
        non_empty(request.username),
        non_empty(request.email),
        non_empty(request.password),
    ) {
        (Some(username), Some(email), Some(password)) => (username, email, password),
        _ => {
            return Ok(HttpResponse::BadRequest().json(MessageResponse {
                message: "Username, email and password are required fields".to_string(),
            }));
        }
    };

    if !is_valid_email(&email) {
        let mut errors = ValidationErrors::new();
        errors.insert(
            "email".to_string(),
            vec!["Enter a valid email address.".to_string()],
        );
        return Ok(HttpResponse::BadRequest().json(ValidationErrorResponse {
            message: "Error when creating the user".to_string(),
            errors,
        }));
    }

    let password_hash = match auth::hash_password(&password) {
        Ok(hash) => hash,
        Err(err) => {
            tracing::error!("Password hashing failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    let user = match users_repository
        .add_user(NewUserRecord {
            username,
            email,
            password_hash,
        })
        .await
    {
        Ok(user) => user,
        Err(UsersRepositoryError::UsernameTaken(_)) => {
            return Ok(HttpResponse::BadRequest().json(MessageResponse {
                message: "Username already exists".to_string(),
            }));
        }
        Err(err) => {
            tracing::error!("Sign up failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    Ok(match users_repository.create_token(user.id).await {
        Ok(token) => HttpResponse::Created().json(TokenResponse {
            token,
            user: UserDetails {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        }),
        Err(err) => {
            tracing::error!("Token creation failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn sign_in(
    users_repository: Data<Arc<dyn UsersRepository>>,
    request: web::Json<SignInRequest>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();

    let (username, password) = match (non_empty(request.username), non_empty(request.password)) {
        (Some(username), Some(password)) => (username, password),
        _ => {
            return Ok(HttpResponse::BadRequest().json(MessageResponse {
                message: "Username and password are required fields".to_string(),
            }));
        }
    };

    let user = match users_repository.get_user_by_username(&username).await {
        Ok(user) => user,
        Err(UsersRepositoryError::UserNotFound(_)) => {
            return Ok(HttpResponse::NotFound().json(MessageResponse {
                message: "User not found".to_string(),
            }));
        }
        Err(err) => {
            tracing::error!("Sign in failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    if !auth::verify_password(&password, &user.password_hash) {
        return Ok(HttpResponse::BadRequest().json(MessageResponse {
            message: "Invalid password".to_string(),
        }));
    }

    if let Err(err) = users_repository.mark_signed_in(user.id).await {
        tracing::error!("Sign in failed {}", err);
        return Ok(HttpResponse::InternalServerError().finish());
    }

    Ok(match users_repository.get_or_create_token(user.id).await {
        Ok(token) => HttpResponse::Ok().json(TokenResponse {
            token,
            user: UserDetails {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        }),
        Err(err) => {
            tracing::error!("Sign in failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn sign_out(
    users_repository: Data<Arc<dyn UsersRepository>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, Error> {
    Ok(match users_repository.mark_signed_out(user.id).await {
        Ok(()) => HttpResponse::Ok().json(MessageResponse {
            message: "User signed out successfully".to_string(),
        }),
        Err(err) => {
            tracing::error!("Sign out failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn create_book(
    books_repository: Data<Arc<dyn BooksRepository>>,
    user: AuthenticatedUser,
    payload: web::Json<BookPayload>,
) -> Result<HttpResponse, Error> {
    let draft = match payload.into_inner().validate() {
        Ok(draft) => draft,
        Err(errors) => {
            return Ok(HttpResponse::BadRequest().json(ValidationErrorResponse {
                message: "Error when creating the book".to_string(),
                errors,
            }));
        }
    };

    Ok(match books_repository.add_book(user.id, draft).await {
        Ok(book) => HttpResponse::Created().json(BookResponse {
            message: "Successfully created book".to_string(),
            book,
        }),
        Err(err) => {
            tracing::error!("Create book failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn get_all_books(
    books_repository: Data<Arc<dyn BooksRepository>>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, Error> {
    Ok(match books_repository.list_books(user.id).await {
        Ok(books) if books.is_empty() => HttpResponse::NotFound().json(MessageResponse {
            message: "Books not found for the current user".to_string(),
        }),
        Ok(books) => HttpResponse::Ok().json(BooksResponse {
            message: "Correctly obtained books for the current user".to_string(),
            books,
        }),
        Err(err) => {
            tracing::error!("Get all books failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn get_book(
    books_repository: Data<Arc<dyn BooksRepository>>,
    user: AuthenticatedUser,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let guarded = auth::load_owned_book(
        books_repository.get_ref().as_ref(),
        book_id.into_inner(),
        user.id,
    )
    .await;

    Ok(match guarded {
        Ok(book) => HttpResponse::Ok().json(BookResponse {
            message: "Correctly obtained book".to_string(),
            book,
        }),
        Err(err) => auth::owned_book_error_response(err),
    })
}

#[api_v2_operation]
pub async fn update_book(
    books_repository: Data<Arc<dyn BooksRepository>>,
    user: AuthenticatedUser,
    book_id: web::Path<BookId>,
    payload: web::Json<BookPayload>,
) -> Result<HttpResponse, Error> {
    let book_id = book_id.into_inner();

    // ownership is checked before the payload, so 404/403 win over 400
    let guarded =
        auth::load_owned_book(books_repository.get_ref().as_ref(), book_id, user.id).await;
    if let Err(err) = guarded {
        return Ok(auth::owned_book_error_response(err));
    }

    let draft = match payload.into_inner().validate() {
        Ok(draft) => draft,
        Err(errors) => {
            return Ok(HttpResponse::BadRequest().json(ValidationErrorResponse {
                message: "Error updating book".to_string(),
                errors,
            }));
        }
    };

    Ok(match books_repository.update_book(book_id, draft).await {
        Ok(book) => HttpResponse::Ok().json(BookResponse {
            message: "Book updated successfully".to_string(),
            book,
        }),
        Err(BooksRepositoryError::NotFound(_)) => HttpResponse::NotFound().json(MessageResponse {
            message: "Book not found".to_string(),
        }),
        Err(err) => {
            tracing::error!("Update book failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn delete_book(
    books_repository: Data<Arc<dyn BooksRepository>>,
    user: AuthenticatedUser,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book_id = book_id.into_inner();

    let guarded =
        auth::load_owned_book(books_repository.get_ref().as_ref(), book_id, user.id).await;
    if let Err(err) = guarded {
        return Ok(auth::owned_book_error_response(err));
    }

    Ok(match books_repository.delete_book(book_id).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(BooksRepositoryError::NotFound(_)) => HttpResponse::NotFound().json(MessageResponse {
            message: "Book not found".to_string(),
        }),
        Err(err) => {
            tracing::error!("Delete book failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn search_books(
    books_repository: Data<Arc<dyn BooksRepository>>,
    _user: AuthenticatedUser,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, Error> {
    let query = query.into_inner().query.unwrap_or_default();
    if query.is_empty() {
        return Ok(HttpResponse::BadRequest().json(MessageResponse {
            message: "incorrect search parameters".to_string(),
        }));
    }

    Ok(match books_repository.search_books(&query).await {
        Ok(books) if books.is_empty() => HttpResponse::NotFound().json(MessageResponse {
            message: "No books found matching your search".to_string(),
        }),
        Ok(books) => HttpResponse::Ok().json(BooksResponse {
            message: "Correctly obtained books".to_string(),
            books,
        }),
        Err(err) => {
            tracing::error!("Search books failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}
