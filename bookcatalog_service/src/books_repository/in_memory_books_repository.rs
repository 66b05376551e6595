use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::api::{
    AuthorDetails, AuthorId, AuthorPayload, BookDetails, BookDraft, BookId, GenreDetails, GenreId,
    UserId,
};
use crate::books_repository::{BooksRepository, BooksRepositoryError};

struct StoredBook {
    owner: UserId,
    title: String,
    publication_year: i32,
    author_id: AuthorId,
    genre_ids: Vec<GenreId>,
}

pub struct InMemoryBooksRepository {
    authors: parking_lot::RwLock<HashMap<AuthorId, AuthorDetails>>,
    genres: parking_lot::RwLock<HashMap<GenreId, GenreDetails>>,
    books: parking_lot::RwLock<HashMap<BookId, StoredBook>>,
    author_sequence_generator: AtomicI32,
    genre_sequence_generator: AtomicI32,
    book_sequence_generator: AtomicI32,
}

impl Default for InMemoryBooksRepository {
    fn default() -> Self {
        Self {
            authors: Default::default(),
            genres: Default::default(),
            books: Default::default(),
            author_sequence_generator: Default::default(),
            genre_sequence_generator: Default::default(),
            book_sequence_generator: Default::default(),
        }
    }
}

impl InMemoryBooksRepository {
    // Whole-map write lock stands in for the unique constraint that makes
    // the postgres upsert atomic
    fn get_or_create_author(&self, author: &AuthorPayload) -> AuthorId {
        let mut locked_authors = self.authors.write();

        if let Some((&id, _)) = locked_authors
            .iter()
            .find(|(_, a)| a.full_name == author.full_name && a.email == author.email)
        {
            return id;
        }

        let id = self.author_sequence_generator.fetch_add(1, Ordering::Relaxed);
        locked_authors.insert(
            id,
            AuthorDetails {
                id,
                full_name: author.full_name.clone(),
                email: author.email.clone(),
            },
        );
        id
    }

    fn get_or_create_genres(&self, names: &[String]) -> Vec<GenreId> {
        let mut locked_genres = self.genres.write();
        let mut ids = Vec::with_capacity(names.len());

        for name in names {
            let id = match locked_genres.iter().find(|(_, g)| &g.genre == name) {
                Some((&id, _)) => id,
                None => {
                    let id = self.genre_sequence_generator.fetch_add(1, Ordering::Relaxed);
                    locked_genres.insert(
                        id,
                        GenreDetails {
                            id,
                            genre: name.clone(),
                        },
                    );
                    id
                }
            };
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    fn book_details(
        &self,
        book_id: BookId,
        stored: &StoredBook,
    ) -> Result<BookDetails, BooksRepositoryError> {
        let author = self
            .authors
            .read()
            .get(&stored.author_id)
            .cloned()
            .ok_or_else(|| BooksRepositoryError::Other("Author row missing".to_string()))?;

        let locked_genres = self.genres.read();
        let genre = stored
            .genre_ids
            .iter()
            .map(|id| {
                locked_genres
                    .get(id)
                    .cloned()
                    .ok_or_else(|| BooksRepositoryError::Other("Genre row missing".to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BookDetails {
            id: book_id,
            owner: stored.owner,
            title: stored.title.clone(),
            author,
            genre,
            publication_year: stored.publication_year,
        })
    }
}

fn matches_query(book: &BookDetails, query: &str) -> bool {
    let query = query.to_lowercase();
    book.title.to_lowercase().contains(&query)
        || book
            .author
            .full_name
            .as_deref()
            .map(|name| name.to_lowercase().contains(&query))
            .unwrap_or_default()
        || book
            .genre
            .iter()
            .any(|genre| genre.genre.to_lowercase().contains(&query))
}

#[async_trait::async_trait]
impl BooksRepository for InMemoryBooksRepository {
    async fn add_book(
        &self,
        owner: UserId,
        draft: BookDraft,
    ) -> Result<BookDetails, BooksRepositoryError> {
        let author_id = self.get_or_create_author(&draft.author);
        let genre_ids = self.get_or_create_genres(&draft.genres);

        let id = self.book_sequence_generator.fetch_add(1, Ordering::Relaxed);
        let stored = StoredBook {
            owner,
            title: draft.title,
            publication_year: draft.publication_year,
            author_id,
            genre_ids,
        };
        let details = self.book_details(id, &stored)?;
        self.books.write().insert(id, stored);
        Ok(details)
    }

    async fn list_books(&self, owner: UserId) -> Result<Vec<BookDetails>, BooksRepositoryError> {
        let locked_books = self.books.read();
        let mut ids: Vec<BookId> = locked_books
            .iter()
            .filter(|(_, stored)| stored.owner == owner)
            .map(|(&id, _)| id)
            .collect();
        ids.sort();

        ids.into_iter()
            .map(|id| self.book_details(id, &locked_books[&id]))
            .collect()
    }

    async fn get_book(&self, book_id: BookId) -> Result<BookDetails, BooksRepositoryError> {
        let locked_books = self.books.read();
        let stored = locked_books
            .get(&book_id)
            .ok_or(BooksRepositoryError::NotFound(book_id))?;
        self.book_details(book_id, stored)
    }

    async fn update_book(
        &self,
        book_id: BookId,
        draft: BookDraft,
    ) -> Result<BookDetails, BooksRepositoryError> {
        let author_id = self.get_or_create_author(&draft.author);
        let genre_ids = self.get_or_create_genres(&draft.genres);

        let mut locked_books = self.books.write();
        let stored = locked_books
            .get_mut(&book_id)
            .ok_or(BooksRepositoryError::NotFound(book_id))?;

        stored.title = draft.title;
        stored.publication_year = draft.publication_year;
        stored.author_id = author_id;
        stored.genre_ids = genre_ids;

        self.book_details(book_id, stored)
    }

    async fn delete_book(&self, book_id: BookId) -> Result<(), BooksRepositoryError> {
        self.books
            .write()
            .remove(&book_id)
            .map(|_| ())
            .ok_or(BooksRepositoryError::NotFound(book_id))
    }

    async fn search_books(&self, query: &str) -> Result<Vec<BookDetails>, BooksRepositoryError> {
        let locked_books = self.books.read();
        let mut ids: Vec<_> = locked_books.keys().copied().collect();
        ids.sort();

        let mut matches = vec![];
        for id in ids {
            let details = self.book_details(id, &locked_books[&id])?;
            if matches_query(&details, query) {
                matches.push(details);
            }
        }
        Ok(matches)
    }
}
