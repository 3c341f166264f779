//! Concrete source trees for the runtime.
pub mod xml;

pub use xml::{XmlDocument, XmlNode};
