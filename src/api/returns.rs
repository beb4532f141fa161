//! Return verification endpoints (admin)

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::AppResult,
    models::loan::{LoanDetails, LoanRef, LoanStatus},
};

use super::AuthenticatedUser;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReturnQuery {
    /// RETURNED or VERIFIED_RETURNED (both when omitted)
    pub status: Option<LoanStatus>,
}

/// List returned loans
#[utoipa::path(
    get,
    path = "/returns",
    tag = "returns",
    security(("bearer_auth" = [])),
    params(ReturnQuery),
    responses(
        (status = 200, description = "Returned loans", body = Vec<LoanDetails>),
        (status = 400, description = "Status is not a return status"),
        (status = 403, description = "Admin only")
    )
)]
pub async fn list_returns(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ReturnQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_admin()?;

    let loans = state.services.loans.list_returns(query.status).await?;
    Ok(Json(loans))
}

/// Verify that a returned book was received
#[utoipa::path(
    patch,
    path = "/returns",
    tag = "returns",
    security(("bearer_auth" = [])),
    request_body = LoanRef,
    responses(
        (status = 200, description = "Return verified", body = LoanDetails),
        (status = 400, description = "Loan is not awaiting verification"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn verify_return(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<LoanRef>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_admin()?;

    let loan = state.services.loans.verify_return(request.id).await?;
    Ok(Json(loan))
}
