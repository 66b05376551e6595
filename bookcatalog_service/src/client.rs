use anyhow::{bail, Context};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    BookDetails, BookId, BookPayload, BookResponse, BooksResponse, SignInRequest, SignUpRequest,
    TokenResponse,
};

/// API client used by the system tests; remembers the session token
/// returned by the last sign up / sign in.
pub struct BookCatalogClient {
    url: String,
    client: ClientWithMiddleware,
    token: Option<String>,
}

impl BookCatalogClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.to_string(),
            client,
            token: None,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> anyhow::Result<RequestBuilder> {
        let token = self.token.as_ref().context("No session token held")?;
        Ok(request.header("Authorization", format!("Token {}", token)))
    }

    /// Calls POST /api/user/signUp and keeps the returned token
    pub async fn sign_up(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> anyhow::Result<TokenResponse> {
        let response = self
            .client
            .post(format!("{}/api/user/signUp", self.url))
            .json(&SignUpRequest {
                username: Some(username.to_string()),
                email: Some(email.to_string()),
                password: Some(password.to_string()),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let error: String = response.text().await.unwrap_or_default();
            bail!("Failed to sign up {}", error)
        }

        let token_response: TokenResponse = response.json().await?;
        self.token = Some(token_response.token.clone());
        Ok(token_response)
    }

    /// Calls POST /api/user/signIn and keeps the returned token
    pub async fn sign_in(
        &mut self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<TokenResponse> {
        let response = self
            .client
            .post(format!("{}/api/user/signIn", self.url))
            .json(&SignInRequest {
                username: Some(username.to_string()),
                password: Some(password.to_string()),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let error: String = response.text().await.unwrap_or_default();
            bail!("Failed to sign in {}", error)
        }

        let token_response: TokenResponse = response.json().await?;
        self.token = Some(token_response.token.clone());
        Ok(token_response)
    }

    /// Calls GET /api/user/signOut
    pub async fn sign_out(&self) -> anyhow::Result<()> {
        let request = self.authorized(
            self.client
                .get(format!("{}/api/user/signOut", self.url)),
        )?;
        let response = request.send().await?;

        if !response.status().is_success() {
            let error: String = response.text().await.unwrap_or_default();
            bail!("Failed to sign out {}", error)
        }
        Ok(())
    }

    /// Calls POST /api/books/create endpoint
    /// Returns the created book with its nested author and genres
    pub async fn create_book(&self, payload: &BookPayload) -> anyhow::Result<BookDetails> {
        let request = self.authorized(
            self.client
                .post(format!("{}/api/books/create", self.url))
                .json(payload),
        )?;
        let response = request.send().await?;

        if !response.status().is_success() {
            let error: String = response.text().await.unwrap_or_default();
            bail!("Failed to create book {}", error)
        }

        let envelope: BookResponse = response.json().await?;
        Ok(envelope.book)
    }

    /// Calls GET /api/books/all endpoint
    /// An empty catalog is reported as 404 by the service and mapped
    /// to an empty list here
    pub async fn list_books(&self) -> anyhow::Result<Vec<BookDetails>> {
        let request = self.authorized(
            self.client.get(format!("{}/api/books/all", self.url)),
        )?;
        let response = request.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        if !response.status().is_success() {
            let error: String = response.text().await.unwrap_or_default();
            bail!("Failed to list books {}", error)
        }

        let envelope: BooksResponse = response.json().await?;
        Ok(envelope.books)
    }

    /// Calls GET /api/books/{book_id} endpoint
    /// Returns None if the book does not exist
    pub async fn get_book(&self, book_id: BookId) -> anyhow::Result<Option<BookDetails>> {
        let request = self.authorized(
            self.client
                .get(format!("{}/api/books/{}", self.url, book_id)),
        )?;
        let response = request.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let error: String = response.text().await.unwrap_or_default();
            bail!("Failed to get book {}", error)
        }

        let envelope: BookResponse = response.json().await?;
        Ok(Some(envelope.book))
    }

    /// Calls GET /api/books/{book_id} and returns the bare status code,
    /// for asserting on the ownership responses
    pub async fn get_book_status(&self, book_id: BookId) -> anyhow::Result<StatusCode> {
        let request = self.authorized(
            self.client
                .get(format!("{}/api/books/{}", self.url, book_id)),
        )?;
        let response = request.send().await?;
        Ok(response.status())
    }

    /// Calls PUT /api/books/update/{book_id} endpoint
    pub async fn update_book(
        &self,
        book_id: BookId,
        payload: &BookPayload,
    ) -> anyhow::Result<BookDetails> {
        let request = self.authorized(
            self.client
                .put(format!("{}/api/books/update/{}", self.url, book_id))
                .json(payload),
        )?;
        let response = request.send().await?;

        if !response.status().is_success() {
            let error: String = response.text().await.unwrap_or_default();
            bail!("Failed to update book {}", error)
        }

        let envelope: BookResponse = response.json().await?;
        Ok(envelope.book)
    }

    /// Calls DELETE /api/books/delete/{book_id} endpoint
    /// Returns true if deleted and false if the caller is not the owner
    pub async fn delete_book(&self, book_id: BookId) -> anyhow::Result<bool> {
        let request = self.authorized(
            self.client
                .delete(format!("{}/api/books/delete/{}", self.url, book_id)),
        )?;
        let response = request.send().await?;

        if response.status() == StatusCode::FORBIDDEN {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            let error: String = response.text().await.unwrap_or_default();
            bail!("Failed to delete book {}", error)
        }
    }

    /// Calls GET /api/books/searchs endpoint
    /// No match is reported as 404 by the service and mapped to an
    /// empty list here
    pub async fn search_books(&self, query: &str) -> anyhow::Result<Vec<BookDetails>> {
        let request = self.authorized(
            self.client
                .get(format!("{}/api/books/searchs", self.url))
                .query(&[("query", query)]),
        )?;
        let response = request.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        if !response.status().is_success() {
            let error: String = response.text().await.unwrap_or_default();
            bail!("Failed to search books {}", error)
        }

        let envelope: BooksResponse = response.json().await?;
        Ok(envelope.books)
    }
}
