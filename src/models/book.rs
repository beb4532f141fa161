//! Book (catalog entry) model, catalog filtering and sorting

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

static ISBN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{9}[\dX]|\d{13})$").expect("valid ISBN pattern"));

/// Strip hyphens and spaces from an ISBN and upper-case a trailing check letter
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

/// Lower-cased, accent-free form used for free-text matching
pub fn search_key(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Book row from database, with loan counters derived at query time
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub stock: i32,
    /// Relative URL of the cover image
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// PENDING and APPROVED loans on this book
    pub active_loans: i64,
    /// Copies currently handed out
    pub borrowed: i64,
    /// Loans ever granted or requested (excluding rejected and cancelled)
    pub borrow_count: i64,
}

impl Book {
    /// Copies on the shelf
    pub fn available(&self) -> i64 {
        (self.stock as i64 - self.borrowed).max(0)
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Book as returned by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookView {
    #[serde(flatten)]
    pub book: Book,
    pub available: i64,
}

impl From<Book> for BookView {
    fn from(book: Book) -> Self {
        let available = book.available();
        Self { book, available }
    }
}

/// Availability filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// stock > 0
    Available,
    /// stock == 0
    Unavailable,
}

/// Catalog sort order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookSort {
    #[default]
    Newest,
    Oldest,
    Alphabetical,
    /// Most borrowed first
    Popular,
}

/// Catalog query parameters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Case-insensitive substring of title or author
    pub q: Option<String>,
    pub category: Option<String>,
    /// Publication year
    pub year: Option<i32>,
    pub status: Option<Availability>,
    pub sort: Option<BookSort>,
}

impl BookQuery {
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let needle = search_key(q);
            if !search_key(&book.title).contains(&needle)
                && !search_key(&book.author).contains(&needle)
            {
                return false;
            }
        }

        if let Some(category) = self.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            let wanted = search_key(category);
            match book.category.as_deref() {
                Some(c) if search_key(c.trim()) == wanted => {}
                _ => return false,
            }
        }

        if let Some(year) = self.year {
            if book.year != Some(year) {
                return false;
            }
        }

        match self.status {
            Some(Availability::Available) if !book.is_in_stock() => false,
            Some(Availability::Unavailable) if book.is_in_stock() => false,
            _ => true,
        }
    }

    /// Filter and sort a fully-fetched catalog
    pub fn apply(&self, books: Vec<Book>) -> Vec<Book> {
        let mut books: Vec<Book> = books.into_iter().filter(|b| self.matches(b)).collect();

        match self.sort.unwrap_or_default() {
            BookSort::Newest => books.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))),
            BookSort::Oldest => books.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))),
            BookSort::Alphabetical => books.sort_by_cached_key(|b| (search_key(&b.title), b.id)),
            BookSort::Popular => books.sort_by(|a, b| {
                b.borrow_count
                    .cmp(&a.borrow_count)
                    .then_with(|| search_key(&a.title).cmp(&search_key(&b.title)))
            }),
        }

        books
    }
}

/// Create book request (built from a multipart form)
#[derive(Debug, Default, Validate)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Author is required"))]
    pub author: String,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    #[validate(regex(path = *ISBN_RE, message = "ISBN must have 10 or 13 digits"))]
    pub isbn: Option<String>,
    pub category: Option<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
}

/// Partial book update (built from a multipart form)
#[derive(Debug, Default, Validate)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255, message = "Title must not be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Author must not be empty"))]
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    #[validate(regex(path = *ISBN_RE, message = "ISBN must have 10 or 13 digits"))]
    pub isbn: Option<String>,
    pub category: Option<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn book(id: i32, title: &str, author: &str, stock: i32) -> Book {
        let created = Utc.with_ymd_and_hms(2024, 1, id as u32, 0, 0, 0).unwrap();
        Book {
            id,
            title: title.to_string(),
            author: author.to_string(),
            publisher: None,
            year: Some(2000 + id),
            isbn: None,
            category: Some(if id % 2 == 0 { "Fiction" } else { "Science" }.to_string()),
            stock,
            cover_image: None,
            created_at: created,
            updated_at: created,
            active_loans: 0,
            borrowed: 0,
            borrow_count: (id * 3 % 5) as i64,
        }
    }

    fn catalog() -> Vec<Book> {
        vec![
            book(1, "Laskar Pelangi", "Andrea Hirata", 3),
            book(2, "Bumi Manusia", "Pramoedya Ananta Toer", 0),
            book(3, "Cantik Itu Luka", "Eka Kurniawan", 2),
            book(4, "Les Misérables", "Victor Hugo", 1),
        ]
    }

    fn ids(books: &[Book]) -> Vec<i32> {
        books.iter().map(|b| b.id).collect()
    }

    #[test]
    fn test_available_filter_returns_only_books_in_stock() {
        let query = BookQuery { status: Some(Availability::Available), ..Default::default() };
        let result = query.apply(catalog());
        assert!(result.iter().all(|b| b.stock > 0));
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_unavailable_filter() {
        let query = BookQuery { status: Some(Availability::Unavailable), ..Default::default() };
        assert_eq!(ids(&query.apply(catalog())), vec![2]);
    }

    #[test]
    fn test_text_search_matches_title_or_author_case_insensitively() {
        let query = BookQuery { q: Some("PELANGI".into()), ..Default::default() };
        assert_eq!(ids(&query.apply(catalog())), vec![1]);

        let query = BookQuery { q: Some("kurniawan".into()), ..Default::default() };
        assert_eq!(ids(&query.apply(catalog())), vec![3]);
    }

    #[test]
    fn test_text_search_ignores_accents() {
        let query = BookQuery { q: Some("miserables".into()), ..Default::default() };
        assert_eq!(ids(&query.apply(catalog())), vec![4]);
    }

    #[test]
    fn test_blank_search_matches_everything() {
        let query = BookQuery { q: Some("   ".into()), ..Default::default() };
        assert_eq!(query.apply(catalog()).len(), 4);
    }

    #[test]
    fn test_category_and_year_filters() {
        let query = BookQuery { category: Some("fiction".into()), ..Default::default() };
        assert_eq!(ids(&query.apply(catalog())), vec![4, 2]);

        let query = BookQuery { year: Some(2003), ..Default::default() };
        assert_eq!(ids(&query.apply(catalog())), vec![3]);
    }

    #[test]
    fn test_category_filter_folds_non_ascii_case() {
        let mut books = catalog();
        books[0].category = Some("Éducation".to_string());

        for wanted in ["ÉDUCATION", "éducation", "Education"] {
            let query = BookQuery { category: Some(wanted.into()), ..Default::default() };
            assert_eq!(ids(&query.apply(books.clone())), vec![books[0].id], "{}", wanted);
        }
    }

    #[test]
    fn test_sort_orders() {
        let newest = BookQuery::default().apply(catalog());
        assert_eq!(ids(&newest), vec![4, 3, 2, 1]);

        let oldest = BookQuery { sort: Some(BookSort::Oldest), ..Default::default() }.apply(catalog());
        assert_eq!(ids(&oldest), vec![1, 2, 3, 4]);

        let alpha = BookQuery { sort: Some(BookSort::Alphabetical), ..Default::default() }.apply(catalog());
        assert_eq!(ids(&alpha), vec![2, 3, 1, 4]);

        // borrow counts: 1 -> 3, 2 -> 1, 3 -> 4, 4 -> 2
        let popular = BookQuery { sort: Some(BookSort::Popular), ..Default::default() }.apply(catalog());
        assert_eq!(ids(&popular), vec![3, 1, 4, 2]);
    }

    #[test]
    fn test_available_copies_never_negative() {
        let mut b = book(1, "T", "A", 1);
        b.borrowed = 3;
        assert_eq!(b.available(), 0);
        b.borrowed = 0;
        assert_eq!(b.available(), 1);
    }

    #[test]
    fn test_isbn_validation() {
        assert_eq!(normalize_isbn("978-602-8519-93-9"), "9786028519939");
        assert_eq!(normalize_isbn("0-306-40615-x"), "030640615X");

        let mut create = CreateBook {
            title: "T".into(),
            author: "A".into(),
            isbn: Some(normalize_isbn("978-602-8519-93-9")),
            ..Default::default()
        };
        assert!(create.validate().is_ok());

        create.isbn = Some("12345".into());
        assert!(create.validate().is_err());
    }

    #[test]
    fn test_create_book_requires_title_and_stock_non_negative() {
        let create = CreateBook { title: String::new(), author: "A".into(), stock: -1, ..Default::default() };
        let errors = create.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("stock"));
    }
}
