//! Books repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook, UpdateBook},
        loan::LoanStatus,
    },
};

/// Book columns plus loan counters derived from the loans table
const BOOK_SELECT: &str = r#"
    SELECT b.id, b.title, b.author, b.publisher, b.year, b.isbn, b.category,
           b.stock, b.cover_image, b.created_at, b.updated_at,
           (SELECT COUNT(*) FROM loans l
             WHERE l.book_id = b.id AND l.status IN ('PENDING', 'APPROVED')) AS active_loans,
           (SELECT COUNT(*) FROM loans l
             WHERE l.book_id = b.id AND l.status = 'APPROVED') AS borrowed,
           (SELECT COUNT(*) FROM loans l
             WHERE l.book_id = b.id AND l.status NOT IN ('REJECTED', 'CANCELLED')) AS borrow_count
    FROM books b
"#;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("{} WHERE b.id = $1", BOOK_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Fetch the whole catalog
    pub async fn list_all(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!("{} ORDER BY b.created_at DESC", BOOK_SELECT))
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    /// Distinct non-empty categories
    pub async fn categories(&self) -> AppResult<Vec<String>> {
        let categories = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT category FROM books
            WHERE category IS NOT NULL AND category <> ''
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    /// Check if ISBN already exists
    pub async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND ($2::int IS NULL OR id <> $2))",
        )
        .bind(isbn)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Create a new book
    pub async fn create(&self, book: &CreateBook, cover_image: Option<&str>) -> AppResult<Book> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO books (title, author, publisher, year, isbn, category, stock, cover_image)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.publisher)
        .bind(book.year)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(book.stock)
        .bind(cover_image)
        .fetch_one(&self.pool)
        .await?;

        self.get_by_id(id).await
    }

    /// Update an existing book; only provided fields change
    pub async fn update(&self, id: i32, book: &UpdateBook, cover_image: Option<&str>) -> AppResult<Book> {
        let mut sets = vec!["updated_at = NOW()".to_string()];
        let mut param_idx = 1;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, param_idx));
                    param_idx += 1;
                }
            };
        }

        add_field!(book.title, "title");
        add_field!(book.author, "author");
        add_field!(book.publisher, "publisher");
        add_field!(book.year, "year");
        add_field!(book.isbn, "isbn");
        add_field!(book.category, "category");
        add_field!(book.stock, "stock");
        add_field!(cover_image, "cover_image");

        let query = format!("UPDATE books SET {} WHERE id = ${}", sets.join(", "), param_idx);

        let mut builder = sqlx::query(&query);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(book.title);
        bind_field!(book.author);
        bind_field!(book.publisher);
        bind_field!(book.year);
        bind_field!(book.isbn);
        bind_field!(book.category);
        bind_field!(book.stock);
        bind_field!(cover_image);

        let result = builder.bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        self.get_by_id(id).await
    }

    /// Delete a book together with its finished loans.
    ///
    /// Refused while any loan on the book is PENDING, APPROVED or RETURNED
    /// awaiting verification. Returns the cover image reference of the
    /// deleted book.
    pub async fn delete(&self, id: i32) -> AppResult<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let cover_image: Option<Option<String>> =
            sqlx::query_scalar("SELECT cover_image FROM books WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let cover_image =
            cover_image.ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let open: Vec<String> = LoanStatus::OPEN.iter().map(|s| s.as_str().to_string()).collect();
        let open_loans: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE book_id = $1 AND status = ANY($2)")
                .bind(id)
                .bind(&open)
                .fetch_one(&mut *tx)
                .await?;

        if open_loans > 0 {
            return Err(AppError::BusinessRule(format!(
                "Book has {} pending, approved or unverified returned loan(s) and cannot be deleted",
                open_loans
            )));
        }

        let terminal: Vec<String> =
            LoanStatus::TERMINAL.iter().map(|s| s.as_str().to_string()).collect();
        sqlx::query("DELETE FROM loans WHERE book_id = $1 AND status = ANY($2)")
            .bind(id)
            .bind(&terminal)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(cover_image)
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn total_stock(&self) -> AppResult<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(stock), 0)::bigint FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}
