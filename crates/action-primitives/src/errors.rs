//! Error types for page and browser operations

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Driver messages that mean "the element was not there in time". Real drivers
/// surface these as free-form text, so the classification is pattern based.
static ELEMENT_MISSING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(no (such )?element|element not found|not found|waiting for (selector|locator)|timeout|timed out|resolved to 0 elements)",
    )
    .expect("element-missing pattern compiles")
});

/// Error enumeration for page driver operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    /// Navigation timed out waiting for page load
    #[error("Navigation timeout: {0}")]
    NavTimeout(String),

    /// Element did not appear before the interaction deadline
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Selector resolved to no element
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Element is present but cannot receive the interaction
    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    /// Assertion step did not hold
    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    /// Browser or page already closed (crash, external kill)
    #[error("Browser closed: {0}")]
    BrowserClosed(String),

    /// Raw driver failure that was not classified by the driver itself
    #[error("Driver error: {0}")]
    Driver(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Transient "element not found / timeout" class that the healing cascade
    /// may recover from.
    pub fn is_element_missing(&self) -> bool {
        match self {
            ActionError::ElementNotFound(_) | ActionError::WaitTimeout(_) => true,
            ActionError::Driver(message) => ELEMENT_MISSING_PATTERN.is_match(message),
            _ => false,
        }
    }

    /// Already-closed errors are expected while tearing down a crashed browser.
    pub fn is_already_closed(&self) -> bool {
        matches!(self, ActionError::BrowserClosed(_))
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ActionError::Internal(_) | ActionError::BrowserClosed(_) => 3,
            ActionError::NavTimeout(_) | ActionError::Driver(_) => 2,
            ActionError::WaitTimeout(_)
            | ActionError::ElementNotFound(_)
            | ActionError::NotInteractable(_) => 1,
            ActionError::AssertionFailed(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classified_missing_errors() {
        assert!(ActionError::ElementNotFound("#a".into()).is_element_missing());
        assert!(ActionError::WaitTimeout("#a".into()).is_element_missing());
        assert!(!ActionError::NotInteractable("#a".into()).is_element_missing());
        assert!(!ActionError::AssertionFailed("x".into()).is_element_missing());
    }

    #[test]
    fn raw_driver_messages_are_pattern_matched() {
        let err = ActionError::Driver("locator.click: Timeout 5000ms exceeded".into());
        assert!(err.is_element_missing());
        let err = ActionError::Driver("waiting for selector \"#submit\"".into());
        assert!(err.is_element_missing());
        let err = ActionError::Driver("net::ERR_CONNECTION_REFUSED".into());
        assert!(!err.is_element_missing());
    }

    #[test]
    fn closed_browser_is_recognised() {
        assert!(ActionError::BrowserClosed("gone".into()).is_already_closed());
        assert_eq!(ActionError::BrowserClosed("gone".into()).severity(), 3);
    }
}
