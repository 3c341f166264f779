use weft::{QualifiedName, ResultSink, Transformer, XsltError, compile_stylesheet};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serializes result events as markup, escaping text and attribute values
/// unless escaping has been switched off.
#[derive(Debug, Default)]
pub struct MarkupSink {
    pub output: String,
    tag_open: bool,
    escaping: bool,
}

impl MarkupSink {
    pub fn new() -> Self {
        Self {
            escaping: true,
            ..Self::default()
        }
    }

    fn close_start_tag(&mut self) {
        if self.tag_open {
            self.output.push('>');
            self.tag_open = false;
        }
    }
}

fn escape(text: &str, quote: bool) -> String {
    let mut s = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => s.push_str("&lt;"),
            '>' => s.push_str("&gt;"),
            '&' => s.push_str("&amp;"),
            '"' if quote => s.push_str("&quot;"),
            other => s.push(other),
        }
    }
    s
}

impl ResultSink for MarkupSink {
    fn start_element(&mut self, name: &QualifiedName) {
        self.close_start_tag();
        self.output.push_str(&format!("<{}", name));
        self.tag_open = true;
    }

    fn attribute(&mut self, name: &QualifiedName, value: &str) {
        self.output.push_str(&format!(" {}=\"{}\"", name, escape(value, true)));
    }

    fn end_element(&mut self, name: &QualifiedName) {
        if self.tag_open {
            self.output.push_str("/>");
            self.tag_open = false;
        } else {
            self.output.push_str(&format!("</{}>", name));
        }
    }

    fn characters(&mut self, text: &str) {
        self.close_start_tag();
        if self.escaping {
            self.output.push_str(&escape(text, false));
        } else {
            self.output.push_str(text);
        }
    }

    fn comment(&mut self, text: &str) {
        self.close_start_tag();
        self.output.push_str(&format!("<!--{}-->", text));
    }

    fn processing_instruction(&mut self, target: &str, data: &str) {
        self.close_start_tag();
        self.output.push_str(&format!("<?{} {}?>", target, data));
    }

    fn start_prefix_mapping(&mut self, _prefix: Option<&str>, _uri: &str) {}

    fn end_prefix_mapping(&mut self, _prefix: Option<&str>) {}

    fn set_escaping(&mut self, enabled: bool) {
        self.escaping = enabled;
    }
}

/// Compiles `xslt`, runs it over `xml` and returns the serialized result.
pub fn transform(xslt: &str, xml: &str) -> Result<String, XsltError> {
    let stylesheet = compile_stylesheet(xslt)?;
    transform_with(&Transformer::new(stylesheet), xml)
}

pub fn transform_with(transformer: &Transformer, xml: &str) -> Result<String, XsltError> {
    let mut sink = MarkupSink::new();
    transformer.transform_xml(xml, &mut sink)?;
    Ok(sink.output)
}

/// Wraps declarations and templates in an `xsl:stylesheet` element.
pub fn stylesheet(body: &str) -> String {
    format!(
        r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
        body
    )
}
