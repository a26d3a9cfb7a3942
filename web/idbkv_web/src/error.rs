//! Error types for the browser host.

use idbkv_host::HostError;
use thiserror::Error;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::DomException;

/// Errors raised while setting up the browser host.
#[derive(Debug, Error)]
pub enum WebError {
    /// JavaScript error occurred.
    #[error("JS error: {0}")]
    JsError(String),

    /// Feature not supported in the current environment.
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl From<WebError> for JsValue {
    fn from(err: WebError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

impl From<JsValue> for WebError {
    fn from(val: JsValue) -> Self {
        WebError::JsError(describe(&val))
    }
}

/// Result type for browser host setup.
pub type WebResult<T> = Result<T, WebError>;

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

/// Maps a thrown value to a host error, keeping DOMException names.
pub(crate) fn dom_error(value: JsValue) -> HostError {
    match value.dyn_ref::<DomException>() {
        Some(exception) => exception_error(exception),
        None => HostError::Dom {
            name: "Error".into(),
            message: describe(&value),
        },
    }
}

pub(crate) fn exception_error(exception: &DomException) -> HostError {
    HostError::Dom {
        name: exception.name(),
        message: exception.message(),
    }
}

/// The error a request or transaction carries, or `fallback`.
pub(crate) fn reported_error(
    error: Result<Option<DomException>, JsValue>,
    fallback: &str,
) -> HostError {
    match error {
        Ok(Some(exception)) => exception_error(&exception),
        Ok(None) => HostError::aborted(fallback),
        Err(thrown) => dom_error(thrown),
    }
}
