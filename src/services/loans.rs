//! Loan request lifecycle service

use chrono::{NaiveDate, Utc};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{
            CreateLoan, Loan, LoanAction, LoanDecision, LoanDetails, LoanPolicy, LoanQuery,
            LoanStatus,
        },
        user::{UserClaims, UserStatus},
    },
    repository::{
        loans::{LoanChanges, LoanFilter},
        Repository,
    },
};

/// Current calendar date used for due dates, lateness and fines
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    policy: LoanPolicy,
}

impl LoansService {
    pub fn new(repository: Repository, policy: LoanPolicy) -> Self {
        Self { repository, policy }
    }

    /// Load a loan with borrower and book, as presented to clients
    pub async fn get_details(&self, id: i32) -> AppResult<LoanDetails> {
        let record = self.repository.loans.get_record(id).await?;
        Ok(LoanDetails::from_record(record, &self.policy, today()))
    }

    /// List loans. Members only ever see their own; admins may filter by borrower.
    pub async fn list_loans(&self, claims: &UserClaims, query: &LoanQuery) -> AppResult<Vec<LoanDetails>> {
        let mut filter = LoanFilter {
            user_id: if claims.is_admin() { query.user_id } else { Some(claims.user_id) },
            book_id: query.book_id,
            ..Default::default()
        };
        if let Some(status) = query.status {
            filter = filter.with_effective_status(status, today());
        }

        self.details_matching(&filter).await
    }

    /// Request a loan. Returns the new loan and a warning when the book is out of stock.
    pub async fn request_loan(
        &self,
        claims: &UserClaims,
        request: CreateLoan,
    ) -> AppResult<(LoanDetails, Option<String>)> {
        request.validate()?;

        let user = self.repository.users.get_by_id(claims.user_id).await?;
        if user.status != UserStatus::Active {
            return Err(AppError::Authorization(
                "Inactive accounts cannot request loans".to_string(),
            ));
        }

        let book = self.repository.books.get_by_id(request.book_id).await?;

        let warning = if book.is_in_stock() {
            None
        } else {
            tracing::warn!(
                "Loan requested by {} for out-of-stock book {} \"{}\"",
                user.member_id,
                book.id,
                book.title
            );
            Some(format!("\"{}\" is currently out of stock", book.title))
        };

        let borrow_date = today();
        let loan = self
            .repository
            .loans
            .create(
                user.id,
                book.id,
                borrow_date,
                self.policy.due_date(borrow_date),
                request.notes.as_deref(),
            )
            .await?;

        tracing::info!("Loan {} requested by {} for book {}", loan.id, user.member_id, book.id);

        Ok((self.get_details(loan.id).await?, warning))
    }

    /// Apply `action` to a loan, re-checking the stored status in the update itself
    async fn transition(&self, loan: &Loan, action: LoanAction, changes: LoanChanges) -> AppResult<LoanDetails> {
        let next = loan.status.effective(loan.return_date, today()).apply(action)?;
        let updated = self
            .repository
            .loans
            .transition(loan.id, LoanStatus::stored_sources(action), next, changes)
            .await?;

        tracing::info!("Loan {}: {} -> {}", updated.id, loan.status, updated.status);

        self.get_details(updated.id).await
    }

    /// Approve or reject a pending request (admin)
    pub async fn decide(&self, decision: LoanDecision) -> AppResult<LoanDetails> {
        let loan = self.repository.loans.get_by_id(decision.id).await?;

        let (action, changes) = match decision.status {
            LoanStatus::Approved => {
                let borrow_date = today();
                (
                    LoanAction::Approve,
                    LoanChanges {
                        borrow_date: Some(borrow_date),
                        return_date: Some(self.policy.due_date(borrow_date)),
                        notes: decision.notes,
                        ..Default::default()
                    },
                )
            }
            LoanStatus::Rejected => (
                LoanAction::Reject,
                LoanChanges { notes: decision.notes, ..Default::default() },
            ),
            other => {
                return Err(AppError::Validation(format!(
                    "Decision must be APPROVED or REJECTED, got {}",
                    other
                )))
            }
        };

        self.transition(&loan, action, changes).await
    }

    /// Mark a borrowed book as returned (owner or admin)
    pub async fn return_loan(&self, claims: &UserClaims, id: i32) -> AppResult<LoanDetails> {
        let loan = self.repository.loans.get_by_id(id).await?;
        claims.require_owner_or_admin(loan.user_id)?;

        self.transition(
            &loan,
            LoanAction::Return,
            LoanChanges { actual_return_date: Some(Utc::now()), ..Default::default() },
        )
        .await
    }

    /// Withdraw a pending request (owner or admin)
    pub async fn cancel_loan(&self, claims: &UserClaims, id: i32) -> AppResult<LoanDetails> {
        let loan = self.repository.loans.get_by_id(id).await?;
        claims.require_owner_or_admin(loan.user_id)?;

        self.transition(&loan, LoanAction::Cancel, LoanChanges::default()).await
    }

    /// Returned and verified loans awaiting or past admin verification
    pub async fn list_returns(&self, status: Option<LoanStatus>) -> AppResult<Vec<LoanDetails>> {
        let statuses = match status {
            None => vec![LoanStatus::Returned, LoanStatus::VerifiedReturned],
            Some(s @ (LoanStatus::Returned | LoanStatus::VerifiedReturned)) => vec![s],
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "Return status must be RETURNED or VERIFIED_RETURNED, got {}",
                    other
                )))
            }
        };

        self.details_matching(&LoanFilter { statuses, ..Default::default() }).await
    }

    /// Confirm a returned book was received (admin)
    pub async fn verify_return(&self, id: i32) -> AppResult<LoanDetails> {
        let loan = self.repository.loans.get_by_id(id).await?;

        self.transition(
            &loan,
            LoanAction::Verify,
            LoanChanges { verified_at: Some(Utc::now()), ..Default::default() },
        )
        .await
    }

    /// All loans matching `filter`, as presented to clients
    pub async fn details_matching(&self, filter: &LoanFilter) -> AppResult<Vec<LoanDetails>> {
        let today = today();
        let records = self.repository.loans.list(filter).await?;
        Ok(records
            .into_iter()
            .map(|r| LoanDetails::from_record(r, &self.policy, today))
            .collect())
    }
}
