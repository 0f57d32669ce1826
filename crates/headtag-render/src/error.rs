//! Error types for render targets.

use headtag::{HeadError, HookError};
use thiserror::Error;

/// Error returned by the SSR renderer and the DOM reconciler.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Resolution failed, or a render hook aborted.
    #[error(transparent)]
    Head(#[from] HeadError),

    /// The embedded payload element could not be read back.
    #[error("invalid head payload in document: {0}")]
    Payload(#[source] HeadError),
}

impl From<HookError> for RenderError {
    fn from(err: HookError) -> Self {
        RenderError::Head(HeadError::Hook(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headtag::HookPoint;

    #[test]
    fn test_hook_error_keeps_point() {
        let err: RenderError = HookError::new("stop").at(HookPoint::SsrRendered).into();
        assert_eq!(err.to_string(), "hook error (ssr:rendered): stop");
    }
}
