use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    #[error("XPath parse error in '{0}': {1}")]
    XPathParse(String, String),

    #[error("Error in function '{function}': {message}")]
    FunctionError { function: String, message: String },

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Unknown variable: ${0}")]
    UnknownVariable(String),

    #[error("Undeclared namespace prefix '{0}'")]
    UnknownPrefix(String),

    /// Raised by the evaluation host (variable pool, key index, extensions).
    #[error("{0}")]
    Host(String),
}

impl XPathError {
    pub(crate) fn function(name: &str, message: impl Into<String>) -> Self {
        XPathError::FunctionError {
            function: name.to_string(),
            message: message.into(),
        }
    }
}
