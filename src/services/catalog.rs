//! Catalog management service

use chrono::{Datelike, Utc};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::book::{normalize_isbn, Book, BookQuery, CreateBook, UpdateBook},
    repository::Repository,
    services::uploads::{UploadService, UploadedFile},
};

fn check_year(year: Option<i32>) -> AppResult<()> {
    let max_year = Utc::now().year() + 1;
    match year {
        Some(y) if !(0..=max_year).contains(&y) => Err(AppError::Validation(format!(
            "Year must be between 0 and {}",
            max_year
        ))),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    uploads: UploadService,
}

impl CatalogService {
    pub fn new(repository: Repository, uploads: UploadService) -> Self {
        Self { repository, uploads }
    }

    /// List books matching the query; filtering runs over the whole catalog
    pub async fn list_books(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let books = self.repository.books.list_all().await?;
        Ok(query.apply(books))
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    pub async fn categories(&self) -> AppResult<Vec<String>> {
        self.repository.books.categories().await
    }

    /// Create a book, storing the cover image first
    pub async fn create_book(&self, mut book: CreateBook, cover: Option<UploadedFile>) -> AppResult<Book> {
        book.isbn = book.isbn.as_deref().map(normalize_isbn);
        book.validate()?;
        check_year(book.year)?;

        if let Some(ref isbn) = book.isbn {
            if self.repository.books.isbn_exists(isbn, None).await? {
                return Err(AppError::Conflict("A book with this ISBN already exists".to_string()));
            }
        }

        let cover_url = match cover {
            Some(ref file) => Some(self.uploads.store_image(file).await?),
            None => None,
        };

        match self.repository.books.create(&book, cover_url.as_deref()).await {
            Ok(created) => {
                tracing::info!("Created book {} \"{}\"", created.id, created.title);
                Ok(created)
            }
            Err(e) => {
                if let Some(ref url) = cover_url {
                    self.uploads.remove(url).await;
                }
                Err(e)
            }
        }
    }

    /// Update a book; a new cover replaces the old file
    pub async fn update_book(&self, id: i32, mut book: UpdateBook, cover: Option<UploadedFile>) -> AppResult<Book> {
        book.isbn = book.isbn.as_deref().map(normalize_isbn);
        book.validate()?;
        check_year(book.year)?;

        let existing = self.repository.books.get_by_id(id).await?;

        if let Some(ref isbn) = book.isbn {
            if self.repository.books.isbn_exists(isbn, Some(id)).await? {
                return Err(AppError::Conflict("A book with this ISBN already exists".to_string()));
            }
        }

        let cover_url = match cover {
            Some(ref file) => Some(self.uploads.store_image(file).await?),
            None => None,
        };

        let updated = match self.repository.books.update(id, &book, cover_url.as_deref()).await {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(ref url) = cover_url {
                    self.uploads.remove(url).await;
                }
                return Err(e);
            }
        };

        if cover_url.is_some() {
            if let Some(ref old) = existing.cover_image {
                self.uploads.remove(old).await;
            }
        }

        Ok(updated)
    }

    /// Delete a book; refused while it has loans that are not finished
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        let cover = self.repository.books.delete(id).await?;
        if let Some(ref url) = cover {
            self.uploads.remove(url).await;
        }
        tracing::info!("Deleted book {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_bounds() {
        let next_year = Utc::now().year() + 1;
        assert!(check_year(None).is_ok());
        assert!(check_year(Some(1998)).is_ok());
        assert!(check_year(Some(next_year)).is_ok());
        assert!(check_year(Some(next_year + 1)).is_err());
        assert!(check_year(Some(-5)).is_err());
    }
}
