//! Loans repository for database operations

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanRecord, LoanStatus},
};

const LOAN_SELECT: &str = r#"
    SELECT l.*, u.member_id, u.name AS user_name, u.email AS user_email,
           b.title AS book_title, b.author AS book_author, b.cover_image AS book_cover
    FROM loans l
    JOIN users u ON u.id = l.user_id
    JOIN books b ON b.id = l.book_id
"#;

/// Loan list filter, expressed over stored statuses
#[derive(Debug, Default, Clone)]
pub struct LoanFilter {
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
    /// Stored statuses to include (all when empty)
    pub statuses: Vec<LoanStatus>,
    /// With `today`: Some(true) keeps only loans past due, Some(false) only loans not yet due
    pub overdue: Option<bool>,
    pub today: Option<NaiveDate>,
    pub borrowed_from: Option<NaiveDate>,
    pub borrowed_to: Option<NaiveDate>,
}

impl LoanFilter {
    /// Filter matching an effective status; LATE is an approved loan past its due date
    pub fn with_effective_status(mut self, status: LoanStatus, today: NaiveDate) -> Self {
        match status {
            LoanStatus::Late => {
                self.statuses = vec![LoanStatus::Approved];
                self.overdue = Some(true);
                self.today = Some(today);
            }
            LoanStatus::Approved => {
                self.statuses = vec![LoanStatus::Approved];
                self.overdue = Some(false);
                self.today = Some(today);
            }
            other => self.statuses = vec![other],
        }
        self
    }
}

/// Column changes applied together with a status transition
#[derive(Debug, Default)]
pub struct LoanChanges {
    pub borrow_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub actual_return_date: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Get loan with borrower and book by ID
    pub async fn get_record(&self, id: i32) -> AppResult<LoanRecord> {
        sqlx::query_as::<_, LoanRecord>(&format!("{} WHERE l.id = $1", LOAN_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// List loans with borrower and book, newest first
    pub async fn list(&self, filter: &LoanFilter) -> AppResult<Vec<LoanRecord>> {
        let statuses: Option<Vec<String>> = if filter.statuses.is_empty() {
            None
        } else {
            Some(filter.statuses.iter().map(|s| s.as_str().to_string()).collect())
        };

        let records = sqlx::query_as::<_, LoanRecord>(&format!(
            r#"{}
            WHERE ($1::int IS NULL OR l.user_id = $1)
              AND ($2::int IS NULL OR l.book_id = $2)
              AND ($3::text[] IS NULL OR l.status = ANY($3))
              AND ($4::bool IS NULL OR $5::date IS NULL OR (l.return_date < $5) = $4)
              AND ($6::date IS NULL OR l.borrow_date >= $6)
              AND ($7::date IS NULL OR l.borrow_date <= $7)
            ORDER BY l.created_at DESC, l.id DESC
            "#,
            LOAN_SELECT
        ))
        .bind(filter.user_id)
        .bind(filter.book_id)
        .bind(statuses)
        .bind(filter.overdue)
        .bind(filter.today)
        .bind(filter.borrowed_from)
        .bind(filter.borrowed_to)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Create a loan request.
    ///
    /// The active-loan check and the insert run in one transaction holding an
    /// advisory lock on (user, book), so concurrent requests cannot both pass.
    pub async fn create(
        &self,
        user_id: i32,
        book_id: i32,
        borrow_date: NaiveDate,
        return_date: NaiveDate,
        notes: Option<&str>,
    ) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(user_id)
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        let already_active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM loans
                WHERE user_id = $1 AND book_id = $2 AND status IN ('PENDING', 'APPROVED')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        if already_active {
            return Err(AppError::BusinessRule(
                "You already have an active loan for this book".to_string(),
            ));
        }

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (user_id, book_id, borrow_date, return_date, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(borrow_date)
        .bind(return_date)
        .bind(LoanStatus::Pending)
        .bind(notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(loan)
    }

    /// Move a loan to `to`, provided its stored status is still one of `from`
    pub async fn transition(
        &self,
        id: i32,
        from: &[LoanStatus],
        to: LoanStatus,
        changes: LoanChanges,
    ) -> AppResult<Loan> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

        sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET
                status = $1,
                borrow_date = COALESCE($2, borrow_date),
                return_date = COALESCE($3, return_date),
                actual_return_date = COALESCE($4, actual_return_date),
                verified_at = COALESCE($5, verified_at),
                notes = COALESCE($6, notes),
                updated_at = NOW()
            WHERE id = $7 AND status = ANY($8)
            RETURNING *
            "#,
        )
        .bind(to)
        .bind(changes.borrow_date)
        .bind(changes.return_date)
        .bind(changes.actual_return_date)
        .bind(changes.verified_at)
        .bind(changes.notes)
        .bind(id)
        .bind(from)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::BusinessRule(format!("Loan {} was modified concurrently, please reload", id))
        })
    }
}
