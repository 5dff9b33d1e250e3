//! Response envelope shared by every client call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::engine::LedgerError;

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub meta: Meta,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// `<DOMAIN>_<NNN>`
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

impl Meta {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            request_id: format!("req_{}", Uuid::new_v4().simple()),
        }
    }
}

impl From<&LedgerError> for ApiError {
    fn from(e: &LedgerError) -> Self {
        ApiError {
            code: e.code().to_string(),
            message: e.to_string(),
            details: Some(json!({ "kind": e.kind() })),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Meta::new(timestamp),
        }
    }

    pub fn failure(error: &LedgerError, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            meta: Meta::new(timestamp),
        }
    }

    pub fn from_result(result: Result<T, LedgerError>, timestamp: DateTime<Utc>) -> Self {
        match result {
            Ok(data) => Self::ok(data, timestamp),
            Err(e) => Self::failure(&e, timestamp),
        }
    }

    /// Error code, when the call failed.
    pub fn code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }

    /// Symbolic error kind (e.g. `INSUFFICIENT_BALANCE`), when the call failed.
    pub fn kind(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|e| e.details.as_ref())
            .and_then(|d| d.get("kind"))
            .and_then(Value::as_str)
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(ApiError {
                code: "SYSTEM_001".to_string(),
                message: "empty response".to_string(),
                details: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WalletError;
    use crate::Amount;

    #[test]
    fn success_envelope_shape() {
        let response = ApiResponse::ok(42, Utc::now());
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("error").is_none());
        assert!(json["meta"]["request_id"].as_str().unwrap().starts_with("req_"));
    }

    #[test]
    fn failure_envelope_shape() {
        let err: LedgerError = WalletError::InvalidAmount(Amount::ZERO).into();
        let response: ApiResponse<()> = ApiResponse::failure(&err, Utc::now());
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
        assert_eq!(json["error"]["code"], "WALLET_001");
        assert_eq!(json["error"]["details"]["kind"], "INVALID_AMOUNT");
        assert_eq!(response.code(), Some("WALLET_001"));
        assert_eq!(response.kind(), Some("INVALID_AMOUNT"));
    }

    #[test]
    fn into_result_unwraps_either_side() {
        assert_eq!(ApiResponse::ok("x", Utc::now()).into_result().unwrap(), "x");

        let err: LedgerError = LedgerError::Unavailable;
        let failed: ApiResponse<&str> = ApiResponse::failure(&err, Utc::now());
        assert_eq!(failed.into_result().unwrap_err().code, "SYSTEM_001");
    }
}
