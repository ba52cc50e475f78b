//! Errors returned by validation and by passes.

use crate::Diag;

#[derive(Debug, thiserror::Error)]
pub enum Failure {
    /// The module failed validation, with every collected diagnostic (in the
    /// order they were found) and their rendering, followed by a disassembly
    /// of the module.
    #[error("{rendered}")]
    Invalid { diags: Vec<Diag>, rendered: String },

    /// A pass could not be applied (e.g. due to invalid configuration).
    #[error("{pass}: {message}")]
    Transform { pass: &'static str, message: String },
}

impl Failure {
    pub fn transform(pass: &'static str, message: impl Into<String>) -> Self {
        Failure::Transform { pass, message: message.into() }
    }

    /// Diagnostics for [`Failure::Invalid`] (empty for other failures).
    pub fn diags(&self) -> &[Diag] {
        match self {
            Failure::Invalid { diags, .. } => diags,
            Failure::Transform { .. } => &[],
        }
    }

    /// Whether any error diagnostic (or the pass failure message) contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        match self {
            Failure::Invalid { diags, .. } => diags.iter().any(|d| d.message.contains(needle)),
            Failure::Transform { message, .. } => message.contains(needle),
        }
    }
}
