//! Core error type
//!
//! One error enum for the whole translation/execution pipeline, with a
//! `kind()`/`status_code()` pair the REST layer uses to shape `{error:{type,reason},status}`
//! responses (see protocol::rest::error).

use thiserror::Error;

/// The error kinds the core produces (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Expired,
    Conflict,
    Internal,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Expired => "expired",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Expired => 410,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
            ErrorKind::Cancelled => 499,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid endpoint type: {0}")]
    InvalidEndpointType(String),

    #[error("unknown query type: {0}")]
    UnknownQueryType(String),

    #[error("bool query must have at least one clause")]
    EmptyBool,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("document not found: {index}/{id}")]
    DocumentNotFound { index: String, id: String },

    #[error("scroll not found: {0}")]
    ScrollNotFound(String),

    #[error("scroll expired: {0}")]
    ScrollExpired(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("version conflict on {index}/{id}: expected {expected}, found {found}")]
    VersionConflict {
        index: String,
        id: String,
        expected: i64,
        found: i64,
    },

    #[error("task cancelled: {0}")]
    Cancelled(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidQuery(_)
            | Error::MissingField(_)
            | Error::InvalidEndpointType(_)
            | Error::UnknownQueryType(_)
            | Error::EmptyBool
            | Error::BadRequest(_)
            | Error::Json(_) => ErrorKind::BadRequest,
            Error::IndexNotFound(_)
            | Error::DocumentNotFound { .. }
            | Error::ScrollNotFound(_)
            | Error::TaskNotFound(_) => ErrorKind::NotFound,
            Error::ScrollExpired(_) => ErrorKind::Expired,
            Error::VersionConflict { .. } => ErrorKind::Conflict,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Engine(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_kinds_map_to_400() {
        assert_eq!(Error::EmptyBool.status_code(), 400);
        assert_eq!(Error::MissingField("field".into()).status_code(), 400);
    }

    #[test]
    fn not_found_kinds_map_to_404() {
        assert_eq!(Error::IndexNotFound("products".into()).status_code(), 404);
    }

    #[test]
    fn expired_maps_to_410() {
        assert_eq!(Error::ScrollExpired("abc".into()).status_code(), 410);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = Error::VersionConflict {
            index: "products".into(),
            id: "1".into(),
            expected: 2,
            found: 3,
        };
        assert_eq!(err.status_code(), 409);
    }
}
