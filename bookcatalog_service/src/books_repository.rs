pub use in_memory_books_repository::InMemoryBooksRepository;
pub use postgres_books_repository::{PostgresBooksRepository, PostgresBooksRepositoryConfig};

use crate::api::{BookDetails, BookDraft, BookId, UserId};

mod in_memory_books_repository;
mod postgres_books_repository;

#[derive(Debug, thiserror::Error)]
pub enum BooksRepositoryError {
    #[error("Book {0} not found")]
    NotFound(BookId),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait BooksRepository: Send + Sync {
    /// Creates a book owned by the given user.
    /// The author and every genre are get-or-create'd by their natural key
    /// (full_name/email pair and genre name), so repeated payloads reuse rows.
    async fn add_book(
        &self,
        owner: UserId,
        draft: BookDraft,
    ) -> Result<BookDetails, BooksRepositoryError>;

    /// Lists all books owned by the given user, ordered by book id
    async fn list_books(&self, owner: UserId) -> Result<Vec<BookDetails>, BooksRepositoryError>;

    /// Retrieves a single book with its nested author and genres.
    /// No ownership filter here - callers decide what the owner field means.
    async fn get_book(&self, book_id: BookId) -> Result<BookDetails, BooksRepositoryError>;

    /// Replaces title, publication year, author reference and the full
    /// genre association set. The owner is left untouched.
    async fn update_book(
        &self,
        book_id: BookId,
        draft: BookDraft,
    ) -> Result<BookDetails, BooksRepositoryError>;

    /// Hard delete. Genre associations are dropped with the book,
    /// author and genre rows stay.
    async fn delete_book(&self, book_id: BookId) -> Result<(), BooksRepositoryError>;

    /// Case insensitive substring match over title, author full name and
    /// genre names. Deduplicated by book id, ordered by book id.
    async fn search_books(&self, query: &str) -> Result<Vec<BookDetails>, BooksRepositoryError>;
}
