//! Mapping of `kube` client errors onto the kubelink taxonomy.

use kube::core::ErrorResponse;
use kubelink_core::KubelinkError;

/// Classify a `kube` error raised while operating on `target`.
///
/// `target` is a short human description such as `pod 'web' in namespace
/// 'default'` and is embedded in the resulting message.
#[must_use]
pub fn from_kube(err: kube::Error, target: &str) -> KubelinkError {
    match err {
        kube::Error::Api(response) => from_status(&response, target),
        kube::Error::Auth(e) => {
            KubelinkError::connection(format!("authentication failed for {target}: {e}"))
        }
        other => KubelinkError::transient(format!("request for {target} failed: {other}")),
    }
}

/// Classify an API status response.
#[must_use]
pub fn from_status(response: &ErrorResponse, target: &str) -> KubelinkError {
    match response.code {
        404 => KubelinkError::not_found(format!("{target} not found")),
        401 | 403 => KubelinkError::connection(format!(
            "access to {target} denied ({}): {}",
            response.code, response.message
        )),
        400 | 409 | 422 => KubelinkError::validation(format!(
            "request for {target} rejected ({}): {}",
            response.reason, response.message
        )),
        code => KubelinkError::transient(format!(
            "API server returned {code} for {target}: {}",
            response.message
        )),
    }
}
