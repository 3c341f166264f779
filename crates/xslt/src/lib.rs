//! # weft-xslt
//!
//! The runtime core of an XSLT 1.0 processor.
//!
//! A stylesheet is compiled once into a frozen instruction tree
//! ([`Stylesheet`]): variable references are resolved to stack slots, template
//! rules are grouped into per-mode dispatch tables and attribute value
//! templates are pre-parsed. The compiled stylesheet is shared through an
//! `Arc` and executed any number of times, from any number of threads, by a
//! [`Transformer`]. Each run owns its frame stack, global variable pool and
//! key index, and streams result events to a [`ResultSink`].
//!
//! XPath expressions are parsed and evaluated by `weft-xpath1`; the executor
//! acts as its evaluation host, supplying variables, `key()`,
//! `format-number()`, `system-property()` and extension functions.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use weft_xslt::{Transformer, compile_stylesheet};
//!
//! let stylesheet = compile_stylesheet(r#"
//!     <xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
//!         <xsl:template match="/"><greeting><xsl:value-of select="//name"/></greeting></xsl:template>
//!     </xsl:stylesheet>
//! "#)?;
//!
//! let fragment = Transformer::new(stylesheet).transform_to_fragment("<doc><name>World</name></doc>")?;
//! assert_eq!(fragment.string_value(), "World");
//! ```
//!
//! ## Module Organization
//!
//! - [`compiler`]: builds the instruction arena from stylesheet markup, following imports and includes
//! - [`stylesheet`]: the composed, immutable stylesheet
//! - [`slots`] and [`frame`]: compose-time slot allocation and the runtime frame stack
//! - [`pattern`] and [`dispatch`]: match patterns and template rule selection
//! - [`executor`]: the instruction interpreter
//! - [`keys`], [`number_format`], [`sort`], [`avt`]: services used by the interpreter
//! - [`processor`]: the host API

pub mod ast;
pub mod avt;
pub mod compiler;
pub mod config;
pub mod datasources;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod extensions;
pub mod frame;
pub mod keys;
pub mod names;
pub mod number_format;
pub mod output;
pub mod pattern;
pub mod processor;
pub mod slots;
pub mod sort;
pub mod stylesheet;

mod compiler_handlers;
mod compose;
mod executor_handlers;


pub use compiler::{InMemoryResolver, ModuleResolver, NoModules};
pub use config::TransformConfig;
pub use datasources::{XmlDocument, XmlNode};
pub use diagnostics::{CollectedDiagnostics, Diagnostic, DiagnosticListener, LogDiagnostics, Severity};
pub use error::{ExecutionError, Location, XsltError};
pub use extensions::{ExtensionHandler, ExtensionRegistry, ExtensionValue};
pub use output::{EventRecorder, ResultSink};
pub use processor::{Parameters, Transformer, compile_stylesheet, compile_stylesheet_with, compile_stylesheet_with_config};
pub use stylesheet::Stylesheet;
