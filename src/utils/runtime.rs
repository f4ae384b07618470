// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ProtocolError;
use tokio::runtime::Handle;

/// Handle to the runtime the caller is running on, for components that
/// spawn timers or children later.
pub fn current_runtime(component: &str) -> Result<Handle, ProtocolError> {
    Handle::try_current().map_err(|_| ProtocolError::NoRuntime {
        component: component.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outside_runtime_is_an_error() {
        let err = current_runtime("fan-out").unwrap_err();
        assert_eq!(
            err.to_string(),
            "'fan-out' must be created inside a Tokio runtime"
        );
    }

    #[tokio::test]
    async fn test_inside_runtime_returns_handle() {
        assert!(current_runtime("fan-out").is_ok());
    }
}
