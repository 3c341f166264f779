//! Attribute value templates: literal text with embedded `{expression}` parts.

use crate::error::XsltError;
use weft_xpath1::{Expression, XPathError, parse_expression};

#[derive(Debug, Clone, PartialEq)]
pub enum AvtPart {
    Literal(String),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Avt {
    /// No embedded expressions; evaluation returns the text as is.
    Constant(String),
    Parts(Vec<AvtPart>),
}

/// A parsed AVT plus any recoverable problems found while parsing.
#[derive(Debug)]
pub struct ParsedAvt {
    pub avt: Avt,
    pub warnings: Vec<String>,
}

impl Avt {
    pub fn constant(text: impl Into<String>) -> Self {
        Avt::Constant(text.into())
    }

    pub fn parse(text: &str) -> Result<ParsedAvt, XsltError> {
        let mut parts = Vec::new();
        let mut warnings = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    warnings.push(format!(
                        "Unmatched '}}' at offset {} in attribute value template \"{}\"",
                        start, text
                    ));
                    literal.push('}');
                }
                '{' => {
                    let expr_start = start + 1;
                    let mut quote: Option<char> = None;
                    let mut expr_end = None;
                    for (i, ec) in chars.by_ref() {
                        match (quote, ec) {
                            (Some(q), _) if ec == q => quote = None,
                            (Some(_), _) => {}
                            (None, '\'' | '"') => quote = Some(ec),
                            (None, '}') => {
                                expr_end = Some(i);
                                break;
                            }
                            (None, '{') => {
                                return Err(XsltError::XPathParse(
                                    text.to_string(),
                                    "'{' is not allowed inside an attribute value template expression"
                                        .to_string(),
                                ));
                            }
                            (None, _) => {}
                        }
                    }
                    let Some(end) = expr_end else {
                        return Err(XsltError::XPathParse(
                            text.to_string(),
                            "Unterminated expression in attribute value template".to_string(),
                        ));
                    };
                    let source = &text[expr_start..end];
                    let expression =
                        parse_expression(source).map_err(|e| XsltError::from_xpath(source, e))?;
                    if !literal.is_empty() {
                        parts.push(AvtPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(AvtPart::Expression(expression));
                }
                _ => literal.push(c),
            }
        }

        let avt = if parts.is_empty() {
            Avt::Constant(literal)
        } else {
            if !literal.is_empty() {
                parts.push(AvtPart::Literal(literal));
            }
            Avt::Parts(parts)
        };
        Ok(ParsedAvt { avt, warnings })
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Avt::Constant(_))
    }

    /// Concatenates the literal parts and the string value of each expression, in order.
    pub fn evaluate<E, F>(&self, mut eval: F) -> Result<String, E>
    where
        F: FnMut(&Expression) -> Result<String, E>,
    {
        match self {
            Avt::Constant(text) => Ok(text.clone()),
            Avt::Parts(parts) => {
                let mut result = String::new();
                for part in parts {
                    match part {
                        AvtPart::Literal(text) => result.push_str(text),
                        AvtPart::Expression(expr) => result.push_str(&eval(expr)?),
                    }
                }
                Ok(result)
            }
        }
    }

    pub fn expressions_mut(&mut self) -> impl Iterator<Item = &mut Expression> {
        let parts: &mut [AvtPart] = match self {
            Avt::Constant(_) => &mut [],
            Avt::Parts(parts) => parts,
        };
        parts.iter_mut().filter_map(|part| match part {
            AvtPart::Expression(expr) => Some(expr),
            AvtPart::Literal(_) => None,
        })
    }

    pub fn resolve_prefixes<F>(&mut self, lookup: F) -> Result<(), XPathError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for expr in self.expressions_mut() {
            expr.resolve_prefixes(&lookup)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn parse(text: &str) -> Avt {
        Avt::parse(text).unwrap().avt
    }

    fn count_evaluations(avt: &Avt) -> (String, usize) {
        let mut count = 0;
        let text = avt
            .evaluate(|_| {
                count += 1;
                Ok::<_, Infallible>("X".to_string())
            })
            .unwrap();
        (text, count)
    }

    #[test]
    fn test_literal_text_is_constant() {
        for text in ["", "plain", "a b c", "quotes ' and \""] {
            let avt = parse(text);
            assert!(avt.is_constant());
            assert_eq!(count_evaluations(&avt), (text.to_string(), 0));
        }
    }

    #[test]
    fn test_escaped_braces() {
        let avt = parse("a{{b}}c");
        assert_eq!(avt, Avt::Constant("a{b}c".into()));
        assert_eq!(count_evaluations(&avt), ("a{b}c".to_string(), 0));
    }

    #[test]
    fn test_expression_parts_in_order() {
        let avt = parse("{$base}/page-{1}");
        let Avt::Parts(parts) = &avt else {
            panic!("Expected parts");
        };
        assert_eq!(parts.len(), 4);
        assert_eq!(count_evaluations(&avt), ("X/page-X".to_string(), 2));
    }

    #[test]
    fn test_braces_inside_quotes_pass_through() {
        let avt = parse("{concat('}', \"{\")}");
        let Avt::Parts(parts) = avt else {
            panic!("Expected parts");
        };
        let AvtPart::Expression(Expression::FunctionCall { args, .. }) = &parts[0] else {
            panic!("Expected a function call");
        };
        assert_eq!(args[0], Expression::Literal("}".into()));
        assert_eq!(args[1], Expression::Literal("{".into()));
    }

    #[test]
    fn test_stray_close_brace_is_a_warning() {
        let parsed = Avt::parse("a}b").unwrap();
        assert_eq!(parsed.avt, Avt::Constant("a}b".into()));
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_malformed_templates_are_errors() {
        assert!(Avt::parse("a{b").is_err());
        assert!(Avt::parse("{a{b}}").is_err());
        assert!(Avt::parse("{1 +}").is_err());
    }
}
