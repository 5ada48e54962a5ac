use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::currency::ConversionError;
use crate::db::StoreError;
use crate::models::MemberId;
use crate::summary::SummaryError;

/// Data-integrity faults and rejected mutations on a group's ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("member {0} is not part of this group")]
    UnknownMember(MemberId),
    #[error("member {0} is still referenced by an expense or settlement")]
    MemberInUse(MemberId),
    #[error("a member named {0:?} already exists")]
    DuplicateMember(String),
    #[error("member name must not be blank")]
    InvalidName,
    #[error("amount must be a positive number, got {0}")]
    InvalidAmount(f64),
    #[error("amount {0} must be a whole number of cents below 10000000000")]
    InvalidPrecision(f64),
    #[error("expense needs at least one participant")]
    NoParticipants,
    #[error("member {0} appears more than once in the split")]
    DuplicateParticipant(MemberId),
    #[error("share of member {member} must be a non-negative number, got {amount}")]
    InvalidShare { member: MemberId, amount: f64 },
    #[error("shares add up to {actual:.2} but the expense total is {expected:.2}")]
    SplitMismatch { expected: f64, actual: f64 },
    #[error("member {0} cannot settle with themselves")]
    SelfSettlement(MemberId),
    #[error("expense {0} not found")]
    ExpenseNotFound(Uuid),
    #[error("settlement {0} not found")]
    SettlementNotFound(Uuid),
}

/// Everything a route handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("group not found")]
    GroupNotFound,
    #[error("malformed identifier {0:?}")]
    BadId(String),
    #[error("could not issue share token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl From<SummaryError> for ApiError {
    fn from(error: SummaryError) -> Self {
        match error {
            SummaryError::Ledger(e) => ApiError::Ledger(e),
            SummaryError::Conversion(e) => ApiError::Conversion(e),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Ledger(e) => match e {
                LedgerError::UnknownMember(_)
                | LedgerError::ExpenseNotFound(_)
                | LedgerError::SettlementNotFound(_) => Status::NotFound,
                LedgerError::MemberInUse(_) | LedgerError::DuplicateMember(_) => Status::Conflict,
                _ => Status::UnprocessableEntity,
            },
            ApiError::Conversion(_) => Status::UnprocessableEntity,
            ApiError::GroupNotFound => Status::NotFound,
            ApiError::BadId(_) => Status::BadRequest,
            ApiError::Store(_) | ApiError::Token(_) => Status::InternalServerError,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            tracing::error!(error = %self, uri = %request.uri(), "request failed");
        } else {
            tracing::debug!(error = %self, uri = %request.uri(), "request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).respond_to(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::member_in_use(LedgerError::MemberInUse(Uuid::nil()), Status::Conflict)]
    #[case::unknown_member(LedgerError::UnknownMember(Uuid::nil()), Status::NotFound)]
    #[case::split_mismatch(
        LedgerError::SplitMismatch { expected: 10.0, actual: 9.0 },
        Status::UnprocessableEntity
    )]
    #[case::sub_cent_amount(LedgerError::InvalidPrecision(0.004), Status::UnprocessableEntity)]
    #[case::missing_expense(LedgerError::ExpenseNotFound(Uuid::nil()), Status::NotFound)]
    fn ledger_errors_map_to_statuses(#[case] error: LedgerError, #[case] expected: Status) {
        assert_eq!(ApiError::from(error).status(), expected);
    }

    #[test]
    fn conversion_failures_are_client_errors() {
        let error = ApiError::from(ConversionError::UnknownCurrency("XYZ".to_string()));
        assert_eq!(error.status(), Status::UnprocessableEntity);
    }

    #[test]
    fn split_mismatch_message_shows_both_totals() {
        let error = LedgerError::SplitMismatch {
            expected: 100.0,
            actual: 99.5,
        };
        assert_eq!(
            error.to_string(),
            "shares add up to 99.50 but the expense total is 100.00"
        );
    }
}
