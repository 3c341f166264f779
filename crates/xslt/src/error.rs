use thiserror::Error;
use weft_xpath1::XPathError;

/// A position in a stylesheet module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

impl From<(usize, usize)> for Location {
    fn from((line, col): (usize, usize)) -> Self {
        Location { line, col }
    }
}

/// Errors that stop a stylesheet from being compiled, or a run from completing.
#[derive(Error, Debug)]
pub enum XsltError {
    #[error("Static error at {location}: {message}")]
    StaticCompose { message: String, location: Location },

    #[error("XML parsing error: {0}")]
    XmlParse(#[from] roxmltree::Error),

    #[error("XPath parse error in '{0}': {1}")]
    XPathParse(String, String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl XsltError {
    pub(crate) fn compose(message: impl Into<String>, location: Location) -> Self {
        XsltError::StaticCompose {
            message: message.into(),
            location,
        }
    }

    pub(crate) fn from_xpath(text: &str, err: XPathError) -> Self {
        match err {
            XPathError::XPathParse(expr, msg) => XsltError::XPathParse(expr, msg),
            other => XsltError::XPathParse(text.to_string(), other.to_string()),
        }
    }
}

/// Fatal errors raised while a transformation runs. Output already delivered
/// to the sink is not rolled back.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Transformation terminated by xsl:message: {0}")]
    Terminated(String),

    #[error("Circular reference to global variable '{0}'")]
    CircularVariable(String),

    #[error("Template recursion exceeded the limit of {0} nested invocations")]
    RecursionLimit(usize),

    #[error("Extension '{name}' failed: {message}")]
    Extension { name: String, message: String },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Key '{0}' was used while its index was being built")]
    RecursiveKey(String),

    #[error("Invalid stylesheet structure: {0}")]
    Structure(String),

    #[error("XPath evaluation error: {0}")]
    XPath(#[from] XPathError),
}
