//! Book loan request endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::loan::{CreateLoan, LoanDecision, LoanDetails, LoanQuery, LoanRef},
};

use super::AuthenticatedUser;

/// Newly requested loan
#[derive(Serialize, ToSchema)]
pub struct CreatedLoan {
    #[serde(flatten)]
    pub loan: LoanDetails,
    /// Set when the book is out of stock; the request is still recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// List loans: own loans for members, all loans for admins
#[utoipa::path(
    get,
    path = "/bookloans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans, newest first", body = Vec<LoanDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.list_loans(&claims, &query).await?;
    Ok(Json(loans))
}

/// Request to borrow a book
#[utoipa::path(
    post,
    path = "/bookloans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan requested", body = CreatedLoan),
        (status = 400, description = "Already an active loan for this book"),
        (status = 403, description = "Account inactive"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<CreatedLoan>)> {
    let (loan, warning) = state.services.loans.request_loan(&claims, request).await?;
    Ok((StatusCode::CREATED, Json(CreatedLoan { loan, warning })))
}

/// Approve or reject a pending request
#[utoipa::path(
    patch,
    path = "/bookloans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = LoanDecision,
    responses(
        (status = 200, description = "Decision recorded", body = LoanDetails),
        (status = 400, description = "Loan is not pending"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn decide_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(decision): Json<LoanDecision>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_admin()?;

    let loan = state.services.loans.decide(decision).await?;
    Ok(Json(loan))
}

/// Mark a borrowed book as returned
#[utoipa::path(
    post,
    path = "/bookloans/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = LoanRef,
    responses(
        (status = 200, description = "Loan returned", body = LoanDetails),
        (status = 400, description = "Loan is not borrowed"),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<LoanRef>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.return_loan(&claims, request.id).await?;
    Ok(Json(loan))
}

/// Cancel a pending request
#[utoipa::path(
    post,
    path = "/bookloans/cancel",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = LoanRef,
    responses(
        (status = 200, description = "Request cancelled", body = LoanDetails),
        (status = 400, description = "Loan is not pending"),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn cancel_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<LoanRef>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.cancel_loan(&claims, request.id).await?;
    Ok(Json(loan))
}
