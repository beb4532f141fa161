//! Reporting and dashboard statistics endpoints

use axum::{extract::Query, extract::State, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

use super::AuthenticatedUser;

/// Report date range over borrow dates, both ends inclusive
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ReportQuery {
    /// Start date (YYYY-MM-DD)
    pub start_date: Option<NaiveDate>,
    /// End date (YYYY-MM-DD)
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatEntry {
    pub label: String,
    pub value: i64,
}

/// Loan activity for one calendar month
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct MonthlyEntry {
    /// Month (YYYY-MM)
    pub month: String,
    /// Loans borrowed in the month
    pub borrowed: i64,
    /// Loans physically returned in the month
    pub returned: i64,
    /// Loans borrowed in the month that ran late
    pub late: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopBook {
    pub book_id: i32,
    pub title: String,
    pub author: String,
    pub borrow_count: i64,
}

/// Loan report over a borrow date range
#[derive(Debug, Serialize, ToSchema)]
pub struct LoanReport {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_loans: i64,
    pub unique_members: i64,
    pub unique_books: i64,
    /// Sum of fines across the loans in range
    pub total_fines: i64,
    /// Loan counts by effective status
    pub by_status: Vec<StatEntry>,
    pub monthly: Vec<MonthlyEntry>,
    pub top_books: Vec<TopBook>,
}

/// Library-wide counters (admin dashboard)
#[derive(Debug, Serialize, ToSchema)]
pub struct LibraryStats {
    pub total_books: i64,
    pub total_stock: i64,
    pub total_members: i64,
    pub active_members: i64,
    pub pending_requests: i64,
    pub active_loans: i64,
    pub late_loans: i64,
    pub awaiting_verification: i64,
    pub total_fines: i64,
}

/// Counters for the calling member
#[derive(Debug, Serialize, ToSchema)]
pub struct MemberStats {
    pub active_loans: i64,
    pub pending_requests: i64,
    pub late_loans: i64,
    pub returned: i64,
    /// Fines on loans not yet verified as returned
    pub outstanding_fines: i64,
}

/// Dashboard statistics, depending on the caller's role
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum StatsResponse {
    Library(LibraryStats),
    Member(MemberStats),
}

/// Loan report (admin)
#[utoipa::path(
    get,
    path = "/reports",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(ReportQuery),
    responses(
        (status = 200, description = "Loan report", body = LoanReport),
        (status = 400, description = "Invalid date range"),
        (status = 403, description = "Admin only")
    )
)]
pub async fn get_report(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ReportQuery>,
) -> AppResult<Json<LoanReport>> {
    claims.require_admin()?;

    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if start > end {
            return Err(AppError::Validation("start_date must not be after end_date".to_string()));
        }
    }

    let report = state.services.reports.loan_report(&query).await?;
    Ok(Json(report))
}

/// Dashboard statistics: library-wide for admins, personal for members
#[utoipa::path(
    get,
    path = "/stats",
    tag = "reports",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Statistics", body = StatsResponse)
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<StatsResponse>> {
    let stats = if claims.is_admin() {
        StatsResponse::Library(state.services.reports.library_stats().await?)
    } else {
        StatsResponse::Member(state.services.reports.member_stats(claims.user_id).await?)
    };
    Ok(Json(stats))
}
