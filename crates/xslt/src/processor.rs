//! The host API: compiling stylesheets once and running transformations with
//! them any number of times, possibly from several threads at once.
use crate::compiler::{ModuleResolver, NoModules, compile_modules};
use crate::compose::compose;
use crate::config::TransformConfig;
use crate::datasources::xml::XmlDocument;
use crate::diagnostics::{DiagnosticListener, LogDiagnostics};
use crate::error::XsltError;
use crate::executor::TemplateExecutor;
use crate::extensions::{ExtensionRegistry, ExtensionValue};
use crate::output::{EventRecorder, ResultSink, ResultWriter};
use crate::stylesheet::Stylesheet;
use std::collections::HashMap;
use std::sync::Arc;
use weft_xpath1::{DataSourceNode, QualifiedName, TreeFragment, XPathValue};

/// Compiles a self-contained stylesheet with the default configuration.
pub fn compile_stylesheet(text: &str) -> Result<Arc<Stylesheet>, XsltError> {
    compile_stylesheet_with_config(text, &NoModules, &TransformConfig::default())
}

/// Compiles a stylesheet whose `xsl:import` and `xsl:include` hrefs are loaded through `resolver`.
pub fn compile_stylesheet_with(text: &str, resolver: &dyn ModuleResolver) -> Result<Arc<Stylesheet>, XsltError> {
    compile_stylesheet_with_config(text, resolver, &TransformConfig::default())
}

pub fn compile_stylesheet_with_config(
    text: &str,
    resolver: &dyn ModuleResolver,
    config: &TransformConfig,
) -> Result<Arc<Stylesheet>, XsltError> {
    let modules = compile_modules(text, resolver, config)?;
    let stylesheet = compose(modules)?;
    for warning in stylesheet.warnings() {
        log::warn!("{}", warning);
    }
    Ok(Arc::new(stylesheet))
}

/// Values for the stylesheet's top-level `xsl:param`s. Parameters the
/// stylesheet does not declare are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: HashMap<QualifiedName, ExtensionValue>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter in no namespace.
    pub fn with(mut self, name: &str, value: impl Into<ExtensionValue>) -> Self {
        self.insert(QualifiedName::local(name), value);
        self
    }

    pub fn insert(&mut self, name: QualifiedName, value: impl Into<ExtensionValue>) {
        self.values.insert(name, value.into());
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&ExtensionValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn to_values<N>(&self) -> HashMap<QualifiedName, XPathValue<N>> {
        self.values
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    ExtensionValue::String(s) => XPathValue::String(s.clone()),
                    ExtensionValue::Number(n) => XPathValue::Number(*n),
                    ExtensionValue::Boolean(b) => XPathValue::Boolean(*b),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

/// Runs a compiled stylesheet. A `Transformer` holds no per-run state, so one
/// instance can serve concurrent runs.
#[derive(Clone)]
pub struct Transformer {
    stylesheet: Arc<Stylesheet>,
    config: TransformConfig,
    extensions: ExtensionRegistry,
    listener: Arc<dyn DiagnosticListener>,
    parameters: Parameters,
    initial_mode: Option<QualifiedName>,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("config", &self.config)
            .field("extensions", &self.extensions)
            .field("parameters", &self.parameters)
            .field("initial_mode", &self.initial_mode)
            .finish_non_exhaustive()
    }
}

impl Transformer {
    pub fn new(stylesheet: Arc<Stylesheet>) -> Self {
        Self {
            stylesheet,
            config: TransformConfig::default(),
            extensions: ExtensionRegistry::new(),
            listener: Arc::new(LogDiagnostics),
            parameters: Parameters::new(),
            initial_mode: None,
        }
    }

    pub fn with_config(mut self, config: TransformConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn DiagnosticListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Starts each run in `mode` instead of the default mode.
    pub fn with_initial_mode(mut self, mode: QualifiedName) -> Self {
        self.initial_mode = Some(mode);
        self
    }

    pub fn stylesheet(&self) -> &Arc<Stylesheet> {
        &self.stylesheet
    }

    /// Transforms the tree rooted at `root`, sending the result to `sink`.
    /// Events already delivered stay delivered when the run fails.
    pub fn transform_node<'a, N>(&self, root: N, sink: &mut dyn ResultSink) -> Result<(), XsltError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        let executor = TemplateExecutor::new(
            &self.stylesheet,
            &self.config,
            &self.extensions,
            self.listener.as_ref(),
            root,
        )
        .with_parameters(self.parameters.to_values());
        let mut writer = ResultWriter::new(sink);
        executor.execute(self.initial_mode.as_ref(), &mut writer)?;
        Ok(())
    }

    pub fn transform_xml(&self, xml: &str, sink: &mut dyn ResultSink) -> Result<(), XsltError> {
        let document = XmlDocument::parse(xml)?;
        self.transform_node(document.root_node(), sink)
    }

    /// Transforms `xml` and returns the whole result as a tree fragment.
    pub fn transform_to_fragment(&self, xml: &str) -> Result<TreeFragment, XsltError> {
        let mut recorder = EventRecorder::new();
        self.transform_xml(xml, &mut recorder)?;
        Ok(recorder.into_fragment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::InMemoryResolver;
    use crate::diagnostics::CollectedDiagnostics;
    use crate::error::ExecutionError;

    const GREETING: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
        <xsl:param name="who" select="'world'"/>
        <xsl:template match="/">Hello, <xsl:value-of select="$who"/>!</xsl:template>
        <xsl:template match="/" mode="shout">HELLO!</xsl:template>
    </xsl:stylesheet>"#;

    #[test]
    fn test_parameters_override_param_defaults() {
        let stylesheet = compile_stylesheet(GREETING).unwrap();
        let plain = Transformer::new(stylesheet.clone());
        assert_eq!(plain.transform_to_fragment("<doc/>").unwrap().string_value(), "Hello, world!");

        let custom = Transformer::new(stylesheet)
            .with_parameters(Parameters::new().with("who", "weft").with("unused", 1.0));
        assert_eq!(custom.transform_to_fragment("<doc/>").unwrap().string_value(), "Hello, weft!");
    }

    #[test]
    fn test_initial_mode_selects_entry_rules() {
        let stylesheet = compile_stylesheet(GREETING).unwrap();
        let transformer = Transformer::new(stylesheet).with_initial_mode(QualifiedName::local("shout"));
        assert_eq!(transformer.transform_to_fragment("<doc/>").unwrap().string_value(), "HELLO!");
    }

    #[test]
    fn test_modules_load_through_the_resolver() {
        let resolver = InMemoryResolver::new().with_module(
            "common.xsl",
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template match="item">[<xsl:value-of select="."/>]</xsl:template>
            </xsl:stylesheet>"#,
        );
        let main = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
            <xsl:import href="common.xsl"/>
        </xsl:stylesheet>"#;
        let stylesheet = compile_stylesheet_with(main, &resolver).unwrap();
        let result = Transformer::new(stylesheet)
            .transform_to_fragment("<list><item>a</item><item>b</item></list>")
            .unwrap();
        assert_eq!(result.string_value(), "[a][b]");

        assert!(compile_stylesheet(main).is_err());
    }

    #[test]
    fn test_config_limits_recursion() {
        let stylesheet = compile_stylesheet(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template match="/"><xsl:call-template name="loop"/></xsl:template>
                <xsl:template name="loop"><xsl:call-template name="loop"/></xsl:template>
            </xsl:stylesheet>"#,
        )
        .unwrap();
        let config = TransformConfig::from_json(r#"{ "max-recursion-depth": 10 }"#).unwrap();
        let err = Transformer::new(stylesheet)
            .with_config(config)
            .transform_to_fragment("<doc/>")
            .unwrap_err();
        assert!(matches!(err, XsltError::Execution(ExecutionError::RecursionLimit(10))));
    }

    #[test]
    fn test_listener_receives_messages_and_bad_xml_is_reported() {
        let stylesheet = compile_stylesheet(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template match="/"><xsl:message>seen <xsl:value-of select="name(*)"/></xsl:message></xsl:template>
            </xsl:stylesheet>"#,
        )
        .unwrap();
        let diagnostics = Arc::new(CollectedDiagnostics::new());
        let transformer = Transformer::new(stylesheet).with_listener(diagnostics.clone());
        transformer.transform_to_fragment("<root/>").unwrap();
        assert_eq!(diagnostics.messages(), vec!["seen root".to_string()]);

        let err = transformer.transform_to_fragment("<root>").unwrap_err();
        assert!(matches!(err, XsltError::XmlParse(_)));
    }
}
