use thiserror::Error;

use crate::mobile::MobileTokenError;
use crate::users::PreferenceError;

/// Errors raised by step catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The deployment is misconfigured: no rule list exists at all for the
    /// operation name. Distinct from a list that filters to empty.
    #[error("Invalid step configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Preference error: {0}")]
    Preferences(#[from] PreferenceError),

    #[error("Mobile token error: {0}")]
    MobileToken(#[from] MobileTokenError),
}
