// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Fetch failures surfaced through the dispatcher

use proxyscope_core::ProxyscopeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_TRANSPORT: &str = "transport";
pub const CODE_TIMEOUT: &str = "timeout";
pub const CODE_DECODE: &str = "decode";
pub const CODE_INVALID_FILTER: &str = "invalid_filter";
pub const CODE_BAD_REQUEST: &str = "bad_request";

/// A failed query: transport problems and server 4xx/5xx share this type.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct FetchError {
    /// Machine-readable code (server supplied or one of the `CODE_*` values)
    pub code: String,
    /// HTTP status, when the server answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

impl FetchError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn server(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(CODE_TRANSPORT, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(CODE_DECODE, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::server(400, CODE_BAD_REQUEST, message)
    }

    /// True for 4xx/5xx answers from the server.
    pub fn is_server_error(&self) -> bool {
        self.status.is_some_and(|s| s >= 400)
    }
}

impl From<ProxyscopeError> for FetchError {
    fn from(e: ProxyscopeError) -> Self {
        Self::new(CODE_INVALID_FILTER, e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(CODE_TIMEOUT, e.to_string())
        } else if e.is_decode() {
            Self::decode(e.to_string())
        } else {
            Self::transport(e.to_string())
        }
    }
}
