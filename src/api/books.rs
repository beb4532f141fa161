//! Catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Multipart;

use crate::{
    error::AppResult,
    models::book::{BookQuery, BookView, CreateBook, UpdateBook},
};

use super::{form::MultipartForm, AuthenticatedUser};

fn create_book_from_form(form: &MultipartForm) -> AppResult<CreateBook> {
    Ok(CreateBook {
        title: form.text("title").unwrap_or_default(),
        author: form.text("author").unwrap_or_default(),
        publisher: form.text("publisher"),
        year: form.parse("year")?,
        isbn: form.text("isbn"),
        category: form.text("category"),
        stock: form.parse("stock")?.unwrap_or(0),
    })
}

fn update_book_from_form(form: &MultipartForm) -> AppResult<UpdateBook> {
    Ok(UpdateBook {
        title: form.text("title"),
        author: form.text("author"),
        publisher: form.text("publisher"),
        year: form.parse("year")?,
        isbn: form.text("isbn"),
        category: form.text("category"),
        stock: form.parse("stock")?,
    })
}

/// List books with search, filters and sorting
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = Vec<BookView>)
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<Vec<BookView>>> {
    let books = state.services.catalog.list_books(&query).await?;
    Ok(Json(books.into_iter().map(BookView::from).collect()))
}

/// Distinct book categories
#[utoipa::path(
    get,
    path = "/books/categories",
    tag = "books",
    responses(
        (status = 200, description = "Categories in alphabetical order", body = Vec<String>)
    )
)]
pub async fn list_categories(State(state): State<crate::AppState>) -> AppResult<Json<Vec<String>>> {
    let categories = state.services.catalog.categories().await?;
    Ok(Json(categories))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookView),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<BookView>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book.into()))
}

/// Add a book (multipart form with optional `cover` image)
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body(content = String, content_type = "multipart/form-data", description = "title, author, publisher, year, isbn, category, stock, cover"),
    responses(
        (status = 201, description = "Book created", body = BookView),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "ISBN already in catalog")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<BookView>)> {
    claims.require_admin()?;

    let mut form = MultipartForm::read(multipart).await?;
    let book = create_book_from_form(&form)?;
    let cover = form.take_file("cover");

    let created = state.services.catalog.create_book(book, cover).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Update a book (partial multipart form; a `cover` file replaces the current one)
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body(content = String, content_type = "multipart/form-data", description = "Any of the book fields, plus cover"),
    responses(
        (status = 200, description = "Book updated", body = BookView),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "ISBN already in catalog")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> AppResult<Json<BookView>> {
    claims.require_admin()?;

    let mut form = MultipartForm::read(multipart).await?;
    let book = update_book_from_form(&form)?;
    let cover = form.take_file("cover");

    let updated = state.services.catalog.update_book(id, book, cover).await?;
    Ok(Json(updated.into()))
}

/// Delete a book and its closed loans
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 400, description = "Book has pending, approved or unverified returned loans"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;

    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_create_form_missing_title_fails_validation() {
        let form = MultipartForm::default().with_text("author", "Tere Liye");
        let book = create_book_from_form(&form).unwrap();
        assert_eq!(book.stock, 0);
        assert!(book.validate().is_err());
    }

    #[test]
    fn test_create_form() {
        let form = MultipartForm::default()
            .with_text("title", "Hujan")
            .with_text("author", "Tere Liye")
            .with_text("year", "2016")
            .with_text("stock", "3")
            .with_text("isbn", "978-602-03-2478-4");
        let book = create_book_from_form(&form).unwrap();
        assert_eq!(book.year, Some(2016));
        assert_eq!(book.stock, 3);
        assert_eq!(book.publisher, None);
    }

    #[test]
    fn test_update_form_is_partial() {
        let form = MultipartForm::default().with_text("stock", "0");
        let book = update_book_from_form(&form).unwrap();
        assert_eq!(book.stock, Some(0));
        assert!(book.title.is_none());
        assert!(book.year.is_none());
    }

    #[test]
    fn test_bad_number_is_rejected() {
        let form = MultipartForm::default().with_text("title", "X").with_text("year", "twenty");
        assert!(create_book_from_form(&form).is_err());
    }
}
