pub mod affiliates;
pub mod cash_outs;
pub mod inventory;
pub mod orders;
pub mod referrals;
pub mod settings;

use std::str::FromStr;

use actix_web::{web, HttpResponse};
use bigdecimal::BigDecimal;

use crate::application::MarketplaceService;
use crate::domain::command::CommandOutcome;
use crate::domain::errors::DomainError;
use crate::errors::AppError;

/// Runs a synchronous service call on the blocking pool.
pub(crate) async fn blocking<T, F>(
    service: web::Data<MarketplaceService>,
    call: F,
) -> Result<T, AppError>
where
    F: FnOnce(&MarketplaceService) -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    let value = web::block(move || call(&service))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(value)
}

pub(crate) fn no_content(outcome: CommandOutcome) -> Result<HttpResponse, AppError> {
    match outcome {
        CommandOutcome::Done => Ok(HttpResponse::NoContent().finish()),
        other => Err(unexpected(other)),
    }
}

pub(crate) fn unexpected(outcome: CommandOutcome) -> AppError {
    AppError::Internal(format!("unexpected command outcome {:?}", outcome))
}

/// Decimal amounts travel as strings, e.g. "12.50".
pub(crate) fn parse_money(field: &str, value: &str) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(value.trim())
        .map_err(|e| AppError::BadRequest(format!("invalid {} '{}': {}", field, value, e)))
}

pub(crate) fn parse_enum<T: FromStr>(field: &str, value: &str) -> Result<T, AppError> {
    value
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid {} '{}'", field, value)))
}
