//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, loans, reports, returns, users};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "1.0.0",
        description = "Library loan management REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api", description = "API")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        auth::seed,
        // Books
        books::list_books,
        books::list_categories,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Users
        users::get_my_profile,
        users::update_my_profile,
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        // Loans
        loans::list_loans,
        loans::create_loan,
        loans::decide_loan,
        loans::return_loan,
        loans::cancel_loan,
        // Returns
        returns::list_returns,
        returns::verify_return,
        // Reports
        reports::get_report,
        reports::get_stats,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            crate::services::users::SeedReport,
            // Books
            crate::models::book::Book,
            crate::models::book::BookView,
            crate::models::book::Availability,
            crate::models::book::BookSort,
            // Users
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::UserStatus,
            crate::models::user::RegisterUser,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            // Loans
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanUser,
            crate::models::loan::LoanBook,
            crate::models::loan::CreateLoan,
            crate::models::loan::LoanDecision,
            crate::models::loan::LoanRef,
            loans::CreatedLoan,
            // Reports
            reports::LoanReport,
            reports::StatEntry,
            reports::MonthlyEntry,
            reports::TopBook,
            reports::StatsResponse,
            reports::LibraryStats,
            reports::MemberStats,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and authentication"),
        (name = "books", description = "Catalog management"),
        (name = "users", description = "Profiles and user management"),
        (name = "loans", description = "Loan requests"),
        (name = "returns", description = "Return verification"),
        (name = "reports", description = "Reports and statistics")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_routes_and_security() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/bookloans"));
        assert!(doc.paths.paths.contains_key("/books/{id}"));
        assert!(doc
            .components
            .as_ref()
            .map(|c| c.security_schemes.contains_key("bearer_auth"))
            .unwrap_or(false));
    }

    #[test]
    fn test_form_endpoints_document_multipart_bodies() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        for (path, method) in [("/books", "post"), ("/books/{id}", "put"), ("/users/profile", "put")] {
            assert!(
                doc["paths"][path][method]["requestBody"]["content"]["multipart/form-data"].is_object(),
                "{} {}",
                method,
                path
            );
        }
    }
}
