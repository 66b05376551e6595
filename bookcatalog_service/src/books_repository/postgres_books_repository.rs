use anyhow::Context;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{
    AuthorDetails, AuthorId, AuthorPayload, BookDetails, BookDraft, BookId, GenreDetails, UserId,
};
use crate::books_repository::{BooksRepository, BooksRepositoryError};

pub struct PostgresBooksRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

pub struct PostgresBooksRepository {
    client: Client,
}

impl PostgresBooksRepository {
    pub async fn init(config: PostgresBooksRepositoryConfig) -> anyhow::Result<Self> {
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

        // The unique indexes double as the arbiters for the
        // get-or-create upserts below
        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS authors (
            id              SERIAL PRIMARY KEY,
            full_name       TEXT,
            email           TEXT,
            UNIQUE NULLS NOT DISTINCT (full_name, email)
            )
        ",
            )
            .await
            .context("Failed to setup authors table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS genres (
            id              SERIAL PRIMARY KEY,
            genre           TEXT NOT NULL UNIQUE
            )
        ",
            )
            .await
            .context("Failed to setup genres table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS books (
            id               SERIAL PRIMARY KEY,
            title            TEXT NOT NULL,
            publication_year INTEGER NOT NULL,
            owner_id         INTEGER NOT NULL,
            author_id        INTEGER NOT NULL
            )
        ",
            )
            .await
            .context("Failed to setup books table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS book_genres (
            book_id          INTEGER NOT NULL,
            genre_id         INTEGER NOT NULL,
            UNIQUE (book_id, genre_id)
            )
        ",
            )
            .await
            .context("Failed to setup book_genres table")?;

        Ok(Self { client })
    }

    async fn get_or_create_author(
        &self,
        author: &AuthorPayload,
    ) -> Result<AuthorDetails, BooksRepositoryError> {
        // The no-op DO UPDATE makes the pre-existing row visible to
        // RETURNING, so concurrent writers both land on the same id
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO authors (full_name, email) VALUES ($1, $2) \
                 ON CONFLICT (full_name, email) DO UPDATE SET full_name = EXCLUDED.full_name \
                 RETURNING id, full_name, email",
            )
            .await?;

        let rows = self
            .client
            .query(&stmt, &[&author.full_name, &author.email])
            .await?;

        let row = rows
            .first()
            .ok_or_else(|| BooksRepositoryError::Other("Author id not returned".to_string()))?;

        Ok(AuthorDetails {
            id: row.try_get(0)?,
            full_name: row.try_get(1)?,
            email: row.try_get(2)?,
        })
    }

    async fn get_or_create_genres(
        &self,
        names: &[String],
    ) -> Result<Vec<GenreDetails>, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO genres (genre) VALUES ($1) \
                 ON CONFLICT (genre) DO UPDATE SET genre = EXCLUDED.genre \
                 RETURNING id, genre",
            )
            .await?;

        let mut genres: Vec<GenreDetails> = Vec::with_capacity(names.len());
        for name in names {
            let rows = self.client.query(&stmt, &[name]).await?;
            let row = rows
                .first()
                .ok_or_else(|| BooksRepositoryError::Other("Genre id not returned".to_string()))?;
            let genre = GenreDetails {
                id: row.try_get(0)?,
                genre: row.try_get(1)?,
            };
            if !genres.iter().any(|existing| existing.id == genre.id) {
                genres.push(genre);
            }
        }
        Ok(genres)
    }

    async fn replace_genre_associations(
        &self,
        book_id: BookId,
        genres: &[GenreDetails],
    ) -> Result<(), BooksRepositoryError> {
        let delete: Statement = self
            .client
            .prepare("DELETE FROM book_genres WHERE book_id = $1")
            .await?;
        self.client.execute(&delete, &[&book_id]).await?;

        let insert: Statement = self
            .client
            .prepare(
                "INSERT INTO book_genres (book_id, genre_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .await?;
        for genre in genres {
            self.client.execute(&insert, &[&book_id, &genre.id]).await?;
        }
        Ok(())
    }

    async fn genres_of_book(
        &self,
        book_id: BookId,
    ) -> Result<Vec<GenreDetails>, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "SELECT g.id, g.genre FROM genres g \
                 JOIN book_genres bg ON bg.genre_id = g.id \
                 WHERE bg.book_id = $1 \
                 ORDER BY g.id",
            )
            .await?;

        let rows = self.client.query(&stmt, &[&book_id]).await?;
        rows.iter()
            .map(|row| {
                Ok(GenreDetails {
                    id: row.try_get(0)?,
                    genre: row.try_get(1)?,
                })
            })
            .collect()
    }

    /// Expects a row of (id, owner_id, title, publication_year, author id,
    /// author full_name, author email); fetches the genre set separately
    async fn book_from_row(&self, row: &Row) -> Result<BookDetails, BooksRepositoryError> {
        let book_id: BookId = row.try_get(0)?;
        let author_id: AuthorId = row.try_get(4)?;
        Ok(BookDetails {
            id: book_id,
            owner: row.try_get(1)?,
            title: row.try_get(2)?,
            author: AuthorDetails {
                id: author_id,
                full_name: row.try_get(5)?,
                email: row.try_get(6)?,
            },
            genre: self.genres_of_book(book_id).await?,
            publication_year: row.try_get(3)?,
        })
    }
}

const BOOK_SELECT: &str = "SELECT b.id, b.owner_id, b.title, b.publication_year, \
                           a.id, a.full_name, a.email \
                           FROM books b JOIN authors a ON a.id = b.author_id";

// ILIKE treats % and _ as wildcards; the search query is a literal substring
fn escape_like_pattern(query: &str) -> String {
    query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait::async_trait]
impl BooksRepository for PostgresBooksRepository {
    async fn add_book(
        &self,
        owner: UserId,
        draft: BookDraft,
    ) -> Result<BookDetails, BooksRepositoryError> {
        let author = self.get_or_create_author(&draft.author).await?;
        let genres = self.get_or_create_genres(&draft.genres).await?;

        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO books (title, publication_year, owner_id, author_id) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .await?;

        let rows = self
            .client
            .query(
                &stmt,
                &[&draft.title, &draft.publication_year, &owner, &author.id],
            )
            .await?;

        let book_id: BookId = rows
            .first()
            .ok_or_else(|| BooksRepositoryError::Other("Id not returned".to_string()))?
            .try_get(0)?;

        self.replace_genre_associations(book_id, &genres).await?;

        Ok(BookDetails {
            id: book_id,
            owner,
            title: draft.title,
            author,
            genre: genres,
            publication_year: draft.publication_year,
        })
    }

    async fn list_books(&self, owner: UserId) -> Result<Vec<BookDetails>, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!("{} WHERE b.owner_id = $1 ORDER BY b.id", BOOK_SELECT))
            .await?;

        let rows = self.client.query(&stmt, &[&owner]).await?;

        let mut books = Vec::with_capacity(rows.len());
        for row in &rows {
            books.push(self.book_from_row(row).await?);
        }
        Ok(books)
    }

    async fn get_book(&self, book_id: BookId) -> Result<BookDetails, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(&format!("{} WHERE b.id = $1", BOOK_SELECT))
            .await?;

        let rows = self.client.query(&stmt, &[&book_id]).await?;

        let row = rows
            .first()
            .ok_or(BooksRepositoryError::NotFound(book_id))?;
        self.book_from_row(row).await
    }

    async fn update_book(
        &self,
        book_id: BookId,
        draft: BookDraft,
    ) -> Result<BookDetails, BooksRepositoryError> {
        let author = self.get_or_create_author(&draft.author).await?;
        let genres = self.get_or_create_genres(&draft.genres).await?;

        let stmt: Statement = self
            .client
            .prepare(
                "UPDATE books SET title = $1, publication_year = $2, author_id = $3 \
                 WHERE id = $4 RETURNING owner_id",
            )
            .await?;

        let rows = self
            .client
            .query(
                &stmt,
                &[&draft.title, &draft.publication_year, &author.id, &book_id],
            )
            .await?;

        let owner: UserId = rows
            .first()
            .ok_or(BooksRepositoryError::NotFound(book_id))?
            .try_get(0)?;

        self.replace_genre_associations(book_id, &genres).await?;

        Ok(BookDetails {
            id: book_id,
            owner,
            title: draft.title,
            author,
            genre: genres,
            publication_year: draft.publication_year,
        })
    }

    async fn delete_book(&self, book_id: BookId) -> Result<(), BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM books WHERE id = $1 RETURNING id")
            .await?;

        let rows = self.client.query(&stmt, &[&book_id]).await?;
        if rows.is_empty() {
            return Err(BooksRepositoryError::NotFound(book_id));
        }

        let cleanup: Statement = self
            .client
            .prepare("DELETE FROM book_genres WHERE book_id = $1")
            .await?;
        self.client.execute(&cleanup, &[&book_id]).await?;

        Ok(())
    }

    async fn search_books(&self, query: &str) -> Result<Vec<BookDetails>, BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "SELECT DISTINCT b.id FROM books b \
                 JOIN authors a ON a.id = b.author_id \
                 LEFT JOIN book_genres bg ON bg.book_id = b.id \
                 LEFT JOIN genres g ON g.id = bg.genre_id \
                 WHERE b.title ILIKE $1 OR a.full_name ILIKE $1 OR g.genre ILIKE $1 \
                 ORDER BY b.id",
            )
            .await?;

        let pattern = format!("%{}%", escape_like_pattern(query));
        let rows = self.client.query(&stmt, &[&pattern]).await?;

        let mut books = Vec::with_capacity(rows.len());
        for row in &rows {
            let book_id: BookId = row.try_get(0)?;
            books.push(self.get_book(book_id).await?);
        }
        Ok(books)
    }
}
