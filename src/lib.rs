//! # weft
//!
//! An XSLT 1.0 tree-transformation runtime.
//!
//! The workspace is split into two crates, both re-exported here:
//!
//! - [`xpath`] (`weft-xpath1`): the XPath 1.0 expression language and the
//!   [`DataSourceNode`] trait that source trees implement.
//! - [`xslt`] (`weft-xslt`): stylesheet compilation, the compose pass and the
//!   template executor.
//!
//! On top of them this crate adds [`batch`], which runs one compiled
//! stylesheet over many documents in parallel.
//!
//! ```rust,ignore
//! use weft::{Transformer, compile_stylesheet};
//!
//! let stylesheet = compile_stylesheet(xslt_source)?;
//! let fragment = Transformer::new(stylesheet).transform_to_fragment("<doc/>")?;
//! ```

pub mod batch;

pub use weft_xpath1 as xpath;
pub use weft_xslt as xslt;

pub use batch::BatchTransformer;
pub use weft_xpath1::{DataSourceNode, FragmentEvent, QualifiedName, TreeFragment};
pub use weft_xslt::{
    CollectedDiagnostics, Diagnostic, DiagnosticListener, EventRecorder, ExecutionError, ExtensionHandler,
    ExtensionRegistry, ExtensionValue, InMemoryResolver, ModuleResolver, Parameters, ResultSink, Stylesheet,
    TransformConfig, Transformer, XsltError, compile_stylesheet, compile_stylesheet_with,
    compile_stylesheet_with_config,
};
