//! The XPath 1.0 expression language: parsing, evaluation over any tree that
//! implements [`DataSourceNode`], and the core function library.

pub mod ast;
pub mod axes;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod functions;
pub mod name;
pub mod operators;
pub mod parser;
pub mod value;

pub use ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, NodeTypeTest, Step, VarSlot, VariableRef};
pub use datasource::{DataSourceNode, NodeType, QName};
pub use engine::{EvaluationContext, EvaluationHost, VariableMap, evaluate};
pub use error::XPathError;
pub use fragment::{FragmentEvent, TreeFragment};
pub use name::{QualifiedName, XML_NAMESPACE};
pub use parser::parse_expression;
pub use value::XPathValue;
