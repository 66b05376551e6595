use std::collections::BTreeMap;

use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type UserId = i32;
pub type BookId = i32;
pub type AuthorId = i32;
pub type GenreId = i32;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema, Default)]
pub struct SignUpRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema, Default)]
pub struct SignInRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct UserDetails {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

/// Issued on successful sign up / sign in
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct TokenResponse {
    pub token: String,
    #[serde(rename = "User")]
    pub user: UserDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct AuthorDetails {
    pub id: AuthorId,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct GenreDetails {
    pub id: GenreId,
    pub genre: String,
}

/// A book as returned by the API, with nested author and genre data.
/// The `user` field carries the id of the owning user.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct BookDetails {
    pub id: BookId,
    #[serde(rename = "user")]
    pub owner: UserId,
    pub title: String,
    pub author: AuthorDetails,
    pub genre: Vec<GenreDetails>,
    pub publication_year: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema, Default)]
pub struct AuthorPayload {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct GenrePayload {
    pub genre: String,
}

/// Request body of the create and update book endpoints.
/// Every field is optional at the deserialization layer so that missing
/// keys surface as validation errors instead of a bare 400 from serde.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema, Default)]
pub struct BookPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<AuthorPayload>,
    #[serde(default)]
    pub genre: Option<Vec<GenrePayload>>,
    #[serde(default)]
    pub publication_year: Option<i32>,
}

/// Validated book payload handed to the repositories.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BookDraft {
    pub title: String,
    pub author: AuthorPayload,
    pub genres: Vec<String>,
    pub publication_year: i32,
}

/// Per-field validation messages, keyed by field name
pub type ValidationErrors = BTreeMap<String, Vec<String>>;

fn field_error(errors: &mut ValidationErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

impl BookPayload {
    /// Checks that all required fields are present and non-blank.
    /// Returns the draft to store or the full per-field error map.
    pub fn validate(self) -> Result<BookDraft, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = match self.title {
            Some(title) if !title.trim().is_empty() => Some(title),
            Some(_) => {
                field_error(&mut errors, "title", "This field may not be blank.");
                None
            }
            None => {
                field_error(&mut errors, "title", "This field is required.");
                None
            }
        };

        let author = match self.author {
            Some(author) => Some(author),
            None => {
                field_error(&mut errors, "author", "This field is required.");
                None
            }
        };

        let genres = match self.genre {
            Some(entries) => {
                if entries.iter().any(|entry| entry.genre.trim().is_empty()) {
                    field_error(&mut errors, "genre", "This field may not be blank.");
                    None
                } else {
                    Some(entries.into_iter().map(|entry| entry.genre).collect())
                }
            }
            None => {
                field_error(&mut errors, "genre", "This field is required.");
                None
            }
        };

        let publication_year = match self.publication_year {
            Some(year) => Some(year),
            None => {
                field_error(&mut errors, "publication_year", "This field is required.");
                None
            }
        };

        match (title, author, genres, publication_year) {
            (Some(title), Some(author), Some(genres), Some(publication_year))
                if errors.is_empty() =>
            {
                Ok(BookDraft {
                    title,
                    author,
                    genres,
                    publication_year,
                })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct ValidationErrorResponse {
    pub message: String,
    pub errors: ValidationErrors,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct BookResponse {
    pub message: String,
    #[serde(rename = "Book")]
    pub book: BookDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct BooksResponse {
    pub message: String,
    #[serde(rename = "Books")]
    pub books: Vec<BookDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema, Default)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: Option<String>,
}

#[cfg(test)]
mod book_payload_tests {
    use super::*;

    fn full_payload() -> BookPayload {
        BookPayload {
            title: Some("Dune".to_string()),
            author: Some(AuthorPayload {
                full_name: Some("Herbert".to_string()),
                email: None,
            }),
            genre: Some(vec![GenrePayload {
                genre: "Sci-Fi".to_string(),
            }]),
            publication_year: Some(1965),
        }
    }

    #[test]
    fn test_valid_payload_produces_draft() {
        let draft = full_payload().validate().expect("Payload should be valid");
        assert_eq!(draft.title, "Dune");
        assert_eq!(draft.genres, vec!["Sci-Fi".to_string()]);
        assert_eq!(draft.publication_year, 1965);
    }

    #[test]
    fn test_missing_fields_are_all_reported() {
        let errors = BookPayload::default()
            .validate()
            .expect_err("Empty payload should not validate");

        for field in ["title", "author", "genre", "publication_year"] {
            assert_eq!(
                errors.get(field),
                Some(&vec!["This field is required.".to_string()]),
                "missing error for {}",
                field
            );
        }
    }

    #[test]
    fn test_blank_title_and_genre_are_rejected() {
        let payload = BookPayload {
            title: Some("   ".to_string()),
            genre: Some(vec![GenrePayload {
                genre: "".to_string(),
            }]),
            ..full_payload()
        };
        let errors = payload.validate().expect_err("Blank fields should fail");
        assert_eq!(
            errors.get("title"),
            Some(&vec!["This field may not be blank.".to_string()])
        );
        assert_eq!(
            errors.get("genre"),
            Some(&vec!["This field may not be blank.".to_string()])
        );
    }

    #[test]
    fn test_book_envelope_uses_capitalized_keys() {
        let response = BookResponse {
            message: "Successfully created book".to_string(),
            book: BookDetails {
                id: 1,
                owner: 2,
                title: "Dune".to_string(),
                author: AuthorDetails {
                    id: 3,
                    full_name: Some("Herbert".to_string()),
                    email: None,
                },
                genre: vec![],
                publication_year: 1965,
            },
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("Book").is_some());
        assert_eq!(value["Book"]["user"], 2);
    }
}
