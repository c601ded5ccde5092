//! oxd request/response message types
//!
//! Every exchange is a [`Request`] (`{"command": ..., "params": {...}}`)
//! answered by a [`Response`] (`{"status": "ok"|"error", "data": {...}}`).
//! The messenger deals in raw [`serde_json::Value`]s so that unknown
//! commands pass through untouched; the command client converts responses
//! into these types to interpret them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OxdError, Result};

/// Parameter name under which the protection access token is sent.
pub const ACCESS_TOKEN_PARAM: &str = "protection_access_token";

/// Command names understood by the oxd server.
pub mod commands {
    /// Liveness check
    pub const PING: &str = "ping";
    pub const SETUP_CLIENT: &str = "setup_client";
    pub const GET_CLIENT_TOKEN: &str = "get_client_token";
    pub const REGISTER_SITE: &str = "register_site";
    /// Update the registered site (named `update_site_registration` by older servers)
    pub const UPDATE_SITE: &str = "update_site";
    pub const REMOVE_SITE: &str = "remove_site";
    pub const GET_AUTHORIZATION_URL: &str = "get_authorization_url";
    pub const GET_TOKENS_BY_CODE: &str = "get_tokens_by_code";
    pub const GET_ACCESS_TOKEN_BY_REFRESH_TOKEN: &str = "get_access_token_by_refresh_token";
    pub const GET_USER_INFO: &str = "get_user_info";
    pub const GET_LOGOUT_URI: &str = "get_logout_uri";
    pub const UMA_RS_PROTECT: &str = "uma_rs_protect";
    pub const UMA_RS_CHECK_ACCESS: &str = "uma_rs_check_access";
    pub const UMA_RP_GET_RPT: &str = "uma_rp_get_rpt";
    pub const UMA_RP_GET_CLAIMS_GATHERING_URL: &str = "uma_rp_get_claims_gathering_url";
    pub const INTROSPECT_ACCESS_TOKEN: &str = "introspect_access_token";
    pub const INTROSPECT_RPT: &str = "introspect_rpt";
}

/// Error codes with a dedicated [`OxdError`] variant.
pub mod error_codes {
    /// Maps to [`OxdError::InvalidTicket`](crate::error::OxdError::InvalidTicket)
    pub const INVALID_TICKET: &str = "invalid_ticket";
    /// Maps to [`OxdError::NeedInfo`](crate::error::OxdError::NeedInfo)
    pub const NEED_INFO: &str = "need_info";
    /// Maps to [`OxdError::InvalidRequest`](crate::error::OxdError::InvalidRequest)
    pub const INVALID_REQUEST: &str = "invalid_request";
}

/// A command sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Command name, e.g. `register_site`
    pub command: String,
    /// Command parameters
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Request {
    /// Create a request for `command` with `params`.
    pub fn new(command: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            command: command.into(),
            params,
        }
    }
}

/// Outcome reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The command succeeded
    Ok,
    /// The command failed; `data` carries an [`ErrorData`]
    Error,
}

/// A server response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Outcome of the command
    pub status: ResponseStatus,
    /// Command result, or error details
    #[serde(default)]
    pub data: Value,
}

/// The `data` of an error response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorData {
    /// Convert to the matching typed error.
    pub fn into_error(self) -> OxdError {
        match self.error.as_str() {
            error_codes::INVALID_TICKET => OxdError::InvalidTicket(self.error_description),
            error_codes::NEED_INFO => OxdError::NeedInfo {
                description: self.error_description,
                details: self.details.unwrap_or(Value::Null),
            },
            error_codes::INVALID_REQUEST => OxdError::InvalidRequest(self.error_description),
            _ => OxdError::Server {
                error: self.error,
                description: self.error_description,
            },
        }
    }
}

impl Response {
    /// Interpret a raw response value.
    ///
    /// # Errors
    ///
    /// Returns [`OxdError::MalformedFrame`] if `value` lacks a valid `status`.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| {
            OxdError::MalformedFrame(format!("response is not a status/data object: {}", e)).into()
        })
    }

    /// `true` when the server reported success.
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// Error details, if this is an error response.
    pub fn error_data(&self) -> Option<ErrorData> {
        match self.status {
            ResponseStatus::Ok => None,
            ResponseStatus::Error => {
                Some(serde_json::from_value(self.data.clone()).unwrap_or_default())
            }
        }
    }

    /// Return `data` on success, or the typed application error.
    ///
    /// # Examples
    ///
    /// ```
    /// use oxd_messenger::protocol::Response;
    /// use oxd_messenger::OxdError;
    ///
    /// let response = Response::from_value(serde_json::json!({
    ///     "status": "error",
    ///     "data": {"error": "invalid_ticket", "error_description": "expired"}
    /// })).unwrap();
    ///
    /// let err = response.into_result().unwrap_err();
    /// assert!(matches!(err.downcast_ref::<OxdError>(), Some(OxdError::InvalidTicket(_))));
    /// ```
    pub fn into_result(self) -> Result<Value> {
        match self.status {
            ResponseStatus::Ok => Ok(self.data),
            ResponseStatus::Error => {
                let data: ErrorData = serde_json::from_value(self.data).unwrap_or_default();
                Err(data.into_error().into())
            }
        }
    }
}

/// Name of the JSON type of `value`, for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
