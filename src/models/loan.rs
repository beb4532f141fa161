//! Book loan model, lifecycle state machine and fine computation

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
};

/// Loan status.
///
/// `Late` is never stored: it is derived from `Approved` when the due date
/// has passed (see [`LoanStatus::effective`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
    VerifiedReturned,
    Late,
    Cancelled,
}

/// Actions that move a loan through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanAction {
    Approve,
    Reject,
    Return,
    Verify,
    Cancel,
}

impl LoanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanAction::Approve => "approve",
            LoanAction::Reject => "reject",
            LoanAction::Return => "return",
            LoanAction::Verify => "verify",
            LoanAction::Cancel => "cancel",
        }
    }
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 7] = [
        LoanStatus::Pending,
        LoanStatus::Approved,
        LoanStatus::Rejected,
        LoanStatus::Returned,
        LoanStatus::VerifiedReturned,
        LoanStatus::Late,
        LoanStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "PENDING",
            LoanStatus::Approved => "APPROVED",
            LoanStatus::Rejected => "REJECTED",
            LoanStatus::Returned => "RETURNED",
            LoanStatus::VerifiedReturned => "VERIFIED_RETURNED",
            LoanStatus::Late => "LATE",
            LoanStatus::Cancelled => "CANCELLED",
        }
    }

    /// Active loans block a second request for the same book and block book deletion
    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Pending | LoanStatus::Approved | LoanStatus::Late)
    }

    /// Stored statuses of loans that still need handling: these block book deletion
    pub const OPEN: [LoanStatus; 3] = [LoanStatus::Pending, LoanStatus::Approved, LoanStatus::Returned];

    /// Stored statuses that end the lifecycle
    pub const TERMINAL: [LoanStatus; 3] = [
        LoanStatus::Rejected,
        LoanStatus::VerifiedReturned,
        LoanStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Rejected | LoanStatus::VerifiedReturned | LoanStatus::Cancelled
        )
    }

    /// Whether the book was handed out, i.e. the loan can accrue a fine
    pub fn was_borrowed(&self) -> bool {
        matches!(
            self,
            LoanStatus::Approved
                | LoanStatus::Late
                | LoanStatus::Returned
                | LoanStatus::VerifiedReturned
        )
    }

    /// Status as seen by clients: an approved loan past its due date is late
    pub fn effective(self, due_date: NaiveDate, today: NaiveDate) -> LoanStatus {
        match self {
            LoanStatus::Approved if today > due_date => LoanStatus::Late,
            other => other,
        }
    }

    /// Status that is actually persisted for this status
    pub fn stored(self) -> LoanStatus {
        match self {
            LoanStatus::Late => LoanStatus::Approved,
            other => other,
        }
    }

    /// Apply a lifecycle action, returning the next status or rejecting the transition
    pub fn apply(self, action: LoanAction) -> AppResult<LoanStatus> {
        let next = match (self, action) {
            (LoanStatus::Pending, LoanAction::Approve) => LoanStatus::Approved,
            (LoanStatus::Pending, LoanAction::Reject) => LoanStatus::Rejected,
            (LoanStatus::Pending, LoanAction::Cancel) => LoanStatus::Cancelled,
            (LoanStatus::Approved | LoanStatus::Late, LoanAction::Return) => LoanStatus::Returned,
            (LoanStatus::Returned, LoanAction::Verify) => LoanStatus::VerifiedReturned,
            (current, action) => {
                return Err(AppError::BusinessRule(format!(
                    "Cannot {} a loan with status {}",
                    action.as_str(),
                    current
                )))
            }
        };
        Ok(next)
    }

    /// Statuses that may precede this action, as stored in the database
    pub fn stored_sources(action: LoanAction) -> &'static [LoanStatus] {
        match action {
            LoanAction::Approve | LoanAction::Reject | LoanAction::Cancel => &[LoanStatus::Pending],
            LoanAction::Return => &[LoanStatus::Approved],
            LoanAction::Verify => &[LoanStatus::Returned],
        }
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(LoanStatus::Pending),
            "APPROVED" => Ok(LoanStatus::Approved),
            "REJECTED" => Ok(LoanStatus::Rejected),
            "RETURNED" => Ok(LoanStatus::Returned),
            "VERIFIED_RETURNED" => Ok(LoanStatus::VerifiedReturned),
            "LATE" => Ok(LoanStatus::Late),
            "CANCELLED" => Ok(LoanStatus::Cancelled),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

impl_text_type!(LoanStatus);

/// Loan duration and fine rate
#[derive(Debug, Clone, Copy)]
pub struct LoanPolicy {
    pub duration_days: i64,
    pub fine_per_day: i64,
}

impl From<&LoansConfig> for LoanPolicy {
    fn from(config: &LoansConfig) -> Self {
        Self {
            duration_days: config.duration_days,
            fine_per_day: config.fine_per_day,
        }
    }
}

impl LoanPolicy {
    pub fn due_date(&self, borrow_date: NaiveDate) -> NaiveDate {
        borrow_date + Duration::days(self.duration_days)
    }

    /// Whole days between the due date and the return date (or today if not
    /// returned yet), never negative.
    pub fn late_days(
        &self,
        due_date: NaiveDate,
        returned_on: Option<NaiveDate>,
        today: NaiveDate,
    ) -> i64 {
        let end = returned_on.unwrap_or(today);
        (end - due_date).num_days().max(0)
    }

    pub fn fine_for_days(&self, late_days: i64) -> i64 {
        late_days * self.fine_per_day
    }

    /// Late days accrued by a loan; loans that were never handed out accrue none
    pub fn loan_late_days(&self, loan: &Loan, today: NaiveDate) -> i64 {
        if !loan.status.was_borrowed() {
            return 0;
        }
        self.late_days(
            loan.return_date,
            loan.actual_return_date.map(|d| d.date_naive()),
            today,
        )
    }

    pub fn loan_fine(&self, loan: &Loan, today: NaiveDate) -> i64 {
        self.fine_for_days(self.loan_late_days(loan, today))
    }
}

/// Loan row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrow_date: NaiveDate,
    /// Due date
    pub return_date: NaiveDate,
    pub actual_return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub notes: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Loan joined with its borrower and book
#[derive(Debug, Clone, FromRow)]
pub struct LoanRecord {
    #[sqlx(flatten)]
    pub loan: Loan,
    pub member_id: String,
    pub user_name: String,
    pub user_email: String,
    pub book_title: String,
    pub book_author: String,
    pub book_cover: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanUser {
    pub id: i32,
    pub member_id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanBook {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub cover_image: Option<String>,
}

/// Loan with borrower, book and derived status/fine for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub user: LoanUser,
    pub book: LoanBook,
    pub borrow_date: NaiveDate,
    /// Due date
    pub return_date: NaiveDate,
    pub actual_return_date: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    /// Effective status (LATE is derived)
    pub status: LoanStatus,
    pub notes: Option<String>,
    pub late_days: i64,
    pub fine: i64,
    pub created_at: DateTime<Utc>,
}

impl LoanDetails {
    pub fn from_record(record: LoanRecord, policy: &LoanPolicy, today: NaiveDate) -> Self {
        let late_days = policy.loan_late_days(&record.loan, today);
        let loan = record.loan;
        Self {
            id: loan.id,
            user: LoanUser {
                id: loan.user_id,
                member_id: record.member_id,
                name: record.user_name,
                email: record.user_email,
            },
            book: LoanBook {
                id: loan.book_id,
                title: record.book_title,
                author: record.book_author,
                cover_image: record.book_cover,
            },
            borrow_date: loan.borrow_date,
            return_date: loan.return_date,
            actual_return_date: loan.actual_return_date,
            verified_at: loan.verified_at,
            status: loan.status.effective(loan.return_date, today),
            notes: loan.notes,
            late_days,
            fine: policy.fine_for_days(late_days),
            created_at: loan.created_at,
        }
    }
}

/// Loan request (borrower side)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    pub book_id: i32,
    #[validate(length(max = 500, message = "Notes must be at most 500 characters"))]
    pub notes: Option<String>,
}

/// Admin decision on a pending request
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoanDecision {
    pub id: i32,
    /// APPROVED or REJECTED
    pub status: LoanStatus,
    pub notes: Option<String>,
}

/// Reference to a loan by id (return, cancel, verify)
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoanRef {
    pub id: i32,
}

/// Loan list filters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    /// Effective status filter (LATE matches approved loans past due)
    pub status: Option<LoanStatus>,
    /// Restrict to one borrower (admin only)
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
}
