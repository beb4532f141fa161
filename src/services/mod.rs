//! Business logic services

pub mod auth;
pub mod catalog;
pub mod loans;
pub mod reports;
pub mod uploads;
pub mod users;

use crate::{config::AppConfig, error::AppResult, models::loan::LoanPolicy, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub users: users::UsersService,
    pub loans: loans::LoansService,
    pub reports: reports::ReportsService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let uploads = uploads::UploadService::new(&config.uploads);
        let auth = auth::AuthService::new(repository.clone(), config.auth.clone());
        let loans = loans::LoansService::new(repository.clone(), LoanPolicy::from(&config.loans));

        Self {
            catalog: catalog::CatalogService::new(repository.clone(), uploads.clone()),
            users: users::UsersService::new(repository.clone(), auth.clone(), uploads),
            reports: reports::ReportsService::new(repository.clone(), loans.clone()),
            auth,
            loans,
            repository,
        }
    }

    /// Check database connectivity
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
