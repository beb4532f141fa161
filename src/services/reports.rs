//! Loan reports and dashboard statistics
//!
//! Aggregation runs in memory over loan views, so LATE and fines are computed
//! exactly as they are shown to clients.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    api::reports::{
        LibraryStats, LoanReport, MemberStats, MonthlyEntry, ReportQuery, StatEntry, TopBook,
    },
    error::AppResult,
    models::loan::{LoanDetails, LoanStatus},
    repository::{loans::LoanFilter, Repository},
    services::loans::LoansService,
};

const TOP_BOOKS: usize = 5;

/// Loan counters shared by the admin and member dashboards
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoanCounters {
    pub pending: i64,
    pub active: i64,
    pub late: i64,
    pub returned: i64,
    pub awaiting_verification: i64,
    pub total_fines: i64,
    pub outstanding_fines: i64,
}

pub fn count_loans(loans: &[LoanDetails]) -> LoanCounters {
    let mut counters = LoanCounters::default();
    for loan in loans {
        match loan.status {
            LoanStatus::Pending => counters.pending += 1,
            LoanStatus::Approved => counters.active += 1,
            LoanStatus::Late => {
                counters.active += 1;
                counters.late += 1;
            }
            LoanStatus::Returned => {
                counters.returned += 1;
                counters.awaiting_verification += 1;
            }
            LoanStatus::VerifiedReturned => counters.returned += 1,
            LoanStatus::Rejected | LoanStatus::Cancelled => {}
        }
        counters.total_fines += loan.fine;
        if loan.status != LoanStatus::VerifiedReturned {
            counters.outstanding_fines += loan.fine;
        }
    }
    counters
}

/// Aggregate a report over the given loans
pub fn build_report(loans: &[LoanDetails], query: &ReportQuery) -> LoanReport {
    let mut by_status: HashMap<LoanStatus, i64> = HashMap::new();
    let mut members = HashSet::new();
    let mut books = HashSet::new();
    let mut monthly: BTreeMap<String, MonthlyEntry> = BTreeMap::new();
    let mut borrow_counts: HashMap<i32, (i64, &LoanDetails)> = HashMap::new();
    let mut total_fines = 0;

    for loan in loans {
        *by_status.entry(loan.status).or_default() += 1;
        members.insert(loan.user.id);
        books.insert(loan.book.id);
        total_fines += loan.fine;

        let month = loan.borrow_date.format("%Y-%m").to_string();
        let entry = monthly.entry(month.clone()).or_insert_with(|| MonthlyEntry {
            month,
            ..Default::default()
        });
        entry.borrowed += 1;
        if loan.fine > 0 {
            entry.late += 1;
        }

        if let Some(returned_at) = loan.actual_return_date {
            let month = returned_at.format("%Y-%m").to_string();
            monthly
                .entry(month.clone())
                .or_insert_with(|| MonthlyEntry { month, ..Default::default() })
                .returned += 1;
        }

        if !matches!(loan.status, LoanStatus::Rejected | LoanStatus::Cancelled) {
            borrow_counts.entry(loan.book.id).or_insert((0, loan)).0 += 1;
        }
    }

    let mut top_books: Vec<TopBook> = borrow_counts
        .into_values()
        .map(|(count, loan)| TopBook {
            book_id: loan.book.id,
            title: loan.book.title.clone(),
            author: loan.book.author.clone(),
            borrow_count: count,
        })
        .collect();
    top_books.sort_by(|a, b| {
        b.borrow_count
            .cmp(&a.borrow_count)
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
            .then_with(|| a.book_id.cmp(&b.book_id))
    });
    top_books.truncate(TOP_BOOKS);

    LoanReport {
        start_date: query.start_date,
        end_date: query.end_date,
        total_loans: loans.len() as i64,
        unique_members: members.len() as i64,
        unique_books: books.len() as i64,
        total_fines,
        by_status: LoanStatus::ALL
            .iter()
            .map(|s| StatEntry {
                label: s.as_str().to_string(),
                value: by_status.get(s).copied().unwrap_or(0),
            })
            .collect(),
        monthly: monthly.into_values().collect(),
        top_books,
    }
}

#[derive(Clone)]
pub struct ReportsService {
    repository: Repository,
    loans: LoansService,
}

impl ReportsService {
    pub fn new(repository: Repository, loans: LoansService) -> Self {
        Self { repository, loans }
    }

    pub async fn loan_report(&self, query: &ReportQuery) -> AppResult<LoanReport> {
        let filter = LoanFilter {
            borrowed_from: query.start_date,
            borrowed_to: query.end_date,
            ..Default::default()
        };
        let loans = self.loans.details_matching(&filter).await?;

        tracing::debug!("Building loan report over {} loans", loans.len());

        Ok(build_report(&loans, query))
    }

    pub async fn library_stats(&self) -> AppResult<LibraryStats> {
        let loans = self.loans.details_matching(&LoanFilter::default()).await?;
        let counters = count_loans(&loans);

        Ok(LibraryStats {
            total_books: self.repository.books.count().await?,
            total_stock: self.repository.books.total_stock().await?,
            total_members: self.repository.users.count_members(false).await?,
            active_members: self.repository.users.count_members(true).await?,
            pending_requests: counters.pending,
            active_loans: counters.active,
            late_loans: counters.late,
            awaiting_verification: counters.awaiting_verification,
            total_fines: counters.total_fines,
        })
    }

    pub async fn member_stats(&self, user_id: i32) -> AppResult<MemberStats> {
        let filter = LoanFilter { user_id: Some(user_id), ..Default::default() };
        let counters = count_loans(&self.loans.details_matching(&filter).await?);

        Ok(MemberStats {
            active_loans: counters.active,
            pending_requests: counters.pending,
            late_loans: counters.late,
            returned: counters.returned,
            outstanding_fines: counters.outstanding_fines,
        })
    }
}
