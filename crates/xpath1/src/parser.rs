//! A `nom`-based parser for the XPath 1.0 expression language.

use super::ast::*;
use crate::error::XPathError;
use crate::name::QualifiedName;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace0, satisfy},
    combinator::{map, not, opt, peek, recognize},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

pub fn parse_expression(input: &str) -> Result<Expression, XPathError> {
    match expression(input.trim()) {
        Ok(("", expr)) => Ok(expr),
        Ok((rem, _)) => Err(XPathError::XPathParse(
            input.to_string(),
            format!("Parser did not consume all input. Remainder: '{}'", rem),
        )),
        Err(e) => {
            log::debug!("failed to parse XPath '{}': {}", input, e);
            Err(XPathError::XPathParse(input.to_string(), e.to_string()))
        }
    }
}

fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// An operator name such as `div`, not followed by further name characters.
fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(tag(word), not(satisfy(is_name_char)))
}

/// Parses `operand (op operand)*`, folding the operators to the left.
fn left_assoc<'a, F, G>(operand: F, op: G) -> impl FnMut(&'a str) -> IResult<&'a str, Expression>
where
    F: Parser<&'a str, Output = Expression, Error = nom::error::Error<&'a str>> + Clone,
    G: Parser<&'a str, Output = BinaryOperator, Error = nom::error::Error<&'a str>> + Clone,
{
    move |input: &str| {
        let (input, first) = operand.clone().parse(input)?;
        let (input, tail) = many0(pair(ws(op.clone()), operand.clone())).parse(input)?;
        let folded = tail.into_iter().fold(first, |left, (op, right)| Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        });
        Ok((input, folded))
    }
}

fn descendant_or_self_step() -> Step {
    Step::new(Axis::DescendantOrSelf, NodeTest::NodeType(NodeTypeTest::Node))
}

fn expression(input: &str) -> IResult<&str, Expression> {
    or_expr(input)
}

fn or_op(input: &str) -> IResult<&str, BinaryOperator> {
    map(keyword("or"), |_| BinaryOperator::Or).parse(input)
}

fn and_op(input: &str) -> IResult<&str, BinaryOperator> {
    map(keyword("and"), |_| BinaryOperator::And).parse(input)
}

fn or_expr(input: &str) -> IResult<&str, Expression> {
    left_assoc(and_expr, or_op)(input)
}

fn and_expr(input: &str) -> IResult<&str, Expression> {
    left_assoc(equality_expr, and_op)(input)
}

fn equality_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(tag("="), |_| BinaryOperator::Equals),
        map(tag("!="), |_| BinaryOperator::NotEquals),
    ))
    .parse(input)
}

fn relational_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(tag("<="), |_| BinaryOperator::LessThanOrEqual),
        map(tag(">="), |_| BinaryOperator::GreaterThanOrEqual),
        map(tag("<"), |_| BinaryOperator::LessThan),
        map(tag(">"), |_| BinaryOperator::GreaterThan),
    ))
    .parse(input)
}

fn additive_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(char('+'), |_| BinaryOperator::Plus),
        map(char('-'), |_| BinaryOperator::Minus),
    ))
    .parse(input)
}

fn multiplicative_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        map(char('*'), |_| BinaryOperator::Multiply),
        map(keyword("div"), |_| BinaryOperator::Divide),
        map(keyword("mod"), |_| BinaryOperator::Modulo),
    ))
    .parse(input)
}

fn union_op(input: &str) -> IResult<&str, BinaryOperator> {
    map(char('|'), |_| BinaryOperator::Union).parse(input)
}

fn equality_expr(input: &str) -> IResult<&str, Expression> {
    left_assoc(relational_expr, equality_op)(input)
}

fn relational_expr(input: &str) -> IResult<&str, Expression> {
    left_assoc(additive_expr, relational_op)(input)
}

fn additive_expr(input: &str) -> IResult<&str, Expression> {
    left_assoc(multiplicative_expr, additive_op)(input)
}

fn multiplicative_expr(input: &str) -> IResult<&str, Expression> {
    left_assoc(unary_expr, multiplicative_op)(input)
}

fn unary_expr(input: &str) -> IResult<&str, Expression> {
    let (i, neg_op) = opt(ws(char('-'))).parse(input)?;
    if neg_op.is_some() {
        // `- - 5` nests.
        let (i, expr) = unary_expr(i)?;
        return Ok((
            i,
            Expression::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(expr),
            },
        ));
    }
    union_expr(i)
}

fn union_expr(input: &str) -> IResult<&str, Expression> {
    left_assoc(path_expr, union_op)(input)
}

/// A location path, or a filter expression optionally continued by a relative path.
fn path_expr(input: &str) -> IResult<&str, Expression> {
    // Primary expressions go first so a function call like `position()` is
    // not read as a step named `position`.
    let (i, start_expr) = ws(alt((filter_expr, map(location_path, Expression::LocationPath)))).parse(input)?;

    let (i, remainder_steps) = many0(pair(ws(alt((tag("//"), tag("/")))), step)).parse(i)?;

    if remainder_steps.is_empty() {
        return Ok((i, start_expr));
    }

    let (start_point, is_absolute, mut steps) = match start_expr {
        Expression::LocationPath(lp) => (lp.start_point, lp.is_absolute, lp.steps),
        other => (Some(Box::new(other)), false, vec![]),
    };
    push_steps(&mut steps, remainder_steps);

    Ok((
        i,
        Expression::LocationPath(LocationPath {
            start_point,
            is_absolute,
            steps,
        }),
    ))
}

fn push_steps(steps: &mut Vec<Step>, remainder: Vec<(&str, Step)>) {
    for (sep, next_step) in remainder {
        if sep == "//" {
            steps.push(descendant_or_self_step());
        }
        steps.push(next_step);
    }
}

fn filter_expr(input: &str) -> IResult<&str, Expression> {
    let (i, primary) = primary_expr(input)?;
    let (i, predicates) = many0(predicate).parse(i)?;
    if predicates.is_empty() {
        Ok((i, primary))
    } else {
        Ok((
            i,
            Expression::Filter {
                primary: Box::new(primary),
                predicates,
            },
        ))
    }
}

fn primary_expr(input: &str) -> IResult<&str, Expression> {
    alt((
        variable_reference,
        map(number, Expression::Number),
        map(string_literal, Expression::Literal),
        function_call,
        delimited(ws(char('(')), expression, ws(char(')'))),
    ))
    .parse(input)
}

/// `Digits ('.' Digits?)? | '.' Digits`. Signs and exponents are not part of the grammar.
fn number(input: &str) -> IResult<&str, f64> {
    map(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        |s: &str| s.parse().unwrap_or(f64::NAN),
    )
    .parse(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

fn variable_reference(input: &str) -> IResult<&str, Expression> {
    map(preceded(char('$'), q_name), |name| {
        Expression::Variable(VariableRef::new(name))
    })
    .parse(input)
}

fn nc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(take_while1(is_name_start), take_while(is_name_char))).parse(input)
}

/// A possibly prefixed name. The namespace is bound later, against the
/// declarations in scope where the expression appears.
fn q_name(input: &str) -> IResult<&str, QualifiedName> {
    map(pair(nc_name, opt(preceded(char(':'), nc_name))), |(first, second)| {
        match second {
            Some(local) => QualifiedName::new(Some(first), local, None),
            None => QualifiedName::local(first),
        }
    })
    .parse(input)
}

fn node_type_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        map(
            terminated(
                alt((tag("text"), tag("node"), tag("comment"))),
                pair(ws(char('(')), char(')')),
            ),
            |node_type: &str| match node_type {
                "text" => NodeTest::NodeType(NodeTypeTest::Text),
                "comment" => NodeTest::NodeType(NodeTypeTest::Comment),
                _ => NodeTest::NodeType(NodeTypeTest::Node),
            },
        ),
        map(
            delimited(
                pair(tag("processing-instruction"), ws(char('('))),
                opt(ws(string_literal)),
                char(')'),
            ),
            |target| NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(target)),
        ),
    ))
    .parse(input)
}

pub fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        map(tag("*"), |_| NodeTest::Wildcard),
        node_type_test,
        map(terminated(nc_name, tag(":*")), |prefix: &str| {
            NodeTest::NamespaceWildcard {
                prefix: prefix.to_string(),
                namespace_uri: None,
            }
        }),
        map(q_name, NodeTest::Name),
    ))
    .parse(input)
}

fn axis(input: &str) -> IResult<&str, Axis> {
    map(
        terminated(
            alt((
                tag("child"),
                tag("descendant-or-self"),
                tag("descendant"),
                tag("attribute"),
                tag("parent"),
                tag("ancestor-or-self"),
                tag("ancestor"),
                tag("self"),
                tag("following-sibling"),
                tag("preceding-sibling"),
                tag("following"),
                tag("preceding"),
            )),
            ws(tag("::")),
        ),
        |axis_str: &str| match axis_str {
            "descendant-or-self" => Axis::DescendantOrSelf,
            "descendant" => Axis::Descendant,
            "attribute" => Axis::Attribute,
            "parent" => Axis::Parent,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "ancestor" => Axis::Ancestor,
            "self" => Axis::SelfAxis,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            _ => Axis::Child,
        },
    )
    .parse(input)
}

pub fn predicate(input: &str) -> IResult<&str, Expression> {
    delimited(ws(char('[')), expression, ws(char(']'))).parse(input)
}

fn step(input: &str) -> IResult<&str, Step> {
    let (i, abbreviated) = opt(ws(alt((
        map(tag(".."), |_| Axis::Parent),
        map(terminated(char('.'), not(digit1)), |_| Axis::SelfAxis),
    ))))
    .parse(input)?;
    if let Some(axis) = abbreviated {
        return Ok((i, Step::new(axis, NodeTest::NodeType(NodeTypeTest::Node))));
    }

    let (i, (axis, node_test)) = ws(alt((
        map(preceded(char('@'), node_test), |nt| (Axis::Attribute, nt)),
        map(pair(opt(axis), node_test), |(ax, nt)| (ax.unwrap_or(Axis::Child), nt)),
    )))
    .parse(input)?;
    let (i, predicates) = many0(predicate).parse(i)?;
    Ok((
        i,
        Step {
            axis,
            node_test,
            predicates,
        },
    ))
}

fn location_path(input: &str) -> IResult<&str, LocationPath> {
    let (i, (is_absolute, first_steps)) = if let Ok((rem, _)) = tag::<&str, &str, nom::error::Error<&str>>("//").parse(input) {
        let (rem, step) = step(rem)?;
        (rem, (true, vec![descendant_or_self_step(), step]))
    } else if let Ok((rem, _)) = tag::<&str, &str, nom::error::Error<&str>>("/").parse(input) {
        match step(rem) {
            Ok((rem, first_step)) => (rem, (true, vec![first_step])),
            // The root on its own.
            Err(_) => (rem, (true, vec![])),
        }
    } else {
        let (rem, first_step) = step(input)?;
        (rem, (false, vec![first_step]))
    };

    let mut steps = first_steps;
    let (i, remainder) = many0(pair(ws(alt((tag("//"), tag("/")))), step)).parse(i)?;
    push_steps(&mut steps, remainder);

    Ok((
        i,
        LocationPath {
            start_point: None,
            is_absolute,
            steps,
        },
    ))
}

fn function_call(input: &str) -> IResult<&str, Expression> {
    // The lookahead keeps a step name (like 'foo' in 'foo/bar') from parsing as a function.
    let (i, name) = q_name(input)?;
    let (i, _) = peek(ws(char('('))).parse(i)?;

    // Node-type tests like text() are steps, not functions.
    let is_node_type = name.prefix.is_none()
        && matches!(
            name.local_part.as_str(),
            "text" | "node" | "comment" | "processing-instruction"
        );
    if is_node_type {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }

    let (i, _) = multispace0(i)?;
    let (i, args) = delimited(
        char('('),
        separated_list0(ws(char(',')), expression),
        ws(char(')')),
    )
    .parse(i)?;

    Ok((i, Expression::FunctionCall { name, args }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(name: &str) -> Step {
        Step::new(Axis::Child, NodeTest::Name(QualifiedName::local(name)))
    }

    fn relative(steps: Vec<Step>) -> Expression {
        Expression::LocationPath(LocationPath {
            start_point: None,
            is_absolute: false,
            steps,
        })
    }

    fn var(name: &str) -> Expression {
        Expression::Variable(VariableRef::new(QualifiedName::local(name)))
    }

    #[test]
    fn test_parse_simple_path() {
        let result = parse_expression("foo/bar").unwrap();
        assert_eq!(result, relative(vec![child("foo"), child("bar")]));
    }

    #[test]
    fn test_parse_unary_minus() {
        let result = parse_expression("-5").unwrap();
        assert_eq!(
            result,
            Expression::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(Expression::Number(5.0))
            }
        );

        let result2 = parse_expression("10 - -5").unwrap();
        let Expression::BinaryOp { left, op, right } = result2 else {
            panic!("Expected BinaryOp");
        };
        assert_eq!(op, BinaryOperator::Minus);
        assert_eq!(*left, Expression::Number(10.0));
        assert_eq!(
            *right,
            Expression::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(Expression::Number(5.0))
            }
        );
    }

    #[test]
    fn test_parse_axes() {
        let Expression::LocationPath(lp) = parse_expression("following-sibling::foo").unwrap() else {
            panic!("Expected location path");
        };
        assert_eq!(lp.steps[0].axis, Axis::FollowingSibling);

        let Expression::LocationPath(lp) = parse_expression("ancestor-or-self::*").unwrap() else {
            panic!("Expected location path");
        };
        assert_eq!(lp.steps[0].axis, Axis::AncestorOrSelf);
        assert_eq!(lp.steps[0].node_test, NodeTest::Wildcard);
    }

    #[test]
    fn test_parse_path_starting_with_variable() {
        let result = parse_expression("$myVar/foo/bar").unwrap();
        assert_eq!(
            result,
            Expression::LocationPath(LocationPath {
                start_point: Some(Box::new(var("myVar"))),
                is_absolute: false,
                steps: vec![child("foo"), child("bar")]
            })
        );
    }

    #[test]
    fn test_parse_variable_reference() {
        assert_eq!(parse_expression("$myVar").unwrap(), var("myVar"));
        assert_eq!(
            parse_expression("$myVar + 5").unwrap(),
            Expression::BinaryOp {
                left: Box::new(var("myVar")),
                op: BinaryOperator::Plus,
                right: Box::new(Expression::Number(5.0))
            }
        );

        let Expression::Variable(prefixed) = parse_expression("$p:v").unwrap() else {
            panic!("Expected variable");
        };
        assert_eq!(prefixed.name.prefix.as_deref(), Some("p"));
        assert_eq!(prefixed.name.local_part, "v");
        assert!(prefixed.slot.is_none());
    }

    #[test]
    fn test_parse_predicate() {
        let result = parse_expression("foo[@id = 'a']").unwrap();
        let attr = Step::new(Axis::Attribute, NodeTest::Name(QualifiedName::local("id")));
        let mut foo = child("foo");
        foo.predicates.push(Expression::BinaryOp {
            left: Box::new(relative(vec![attr])),
            op: BinaryOperator::Equals,
            right: Box::new(Expression::Literal("a".into())),
        });
        assert_eq!(result, relative(vec![foo]));
    }

    #[test]
    fn test_parse_numeric_predicate() {
        let mut foo = child("foo");
        foo.predicates.push(Expression::Number(1.0));
        assert_eq!(parse_expression("foo[1]").unwrap(), relative(vec![foo]));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_expression("3.25").unwrap(), Expression::Number(3.25));
        assert_eq!(parse_expression(".5").unwrap(), Expression::Number(0.5));
        assert_eq!(parse_expression("2.").unwrap(), Expression::Number(2.0));
        assert!(parse_expression("1e3").is_err());
    }

    #[test]
    fn test_parse_function_in_predicate() {
        let Expression::LocationPath(lp) = parse_expression("para[position()=1]").unwrap() else {
            panic!("Expected LocationPath");
        };
        assert_eq!(lp.steps.len(), 1);
        assert_eq!(lp.steps[0].predicates.len(), 1);
        assert!(lp.steps[0].predicates[0].is_binary_op());
    }

    #[test]
    fn test_parse_prefixed_function_call() {
        let Expression::FunctionCall { name, args } = parse_expression("ext:shout( 'a', 2 )").unwrap() else {
            panic!("Expected function call");
        };
        assert_eq!(name.prefix.as_deref(), Some("ext"));
        assert_eq!(name.local_part, "shout");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_parse_node_type_tests() {
        let Expression::LocationPath(lp) = parse_expression("foo/text()").unwrap() else {
            panic!("Expected location path");
        };
        assert_eq!(lp.steps[1].node_test, NodeTest::NodeType(NodeTypeTest::Text));

        let Expression::LocationPath(lp) = parse_expression("processing-instruction('tgt')").unwrap() else {
            panic!("Expected location path");
        };
        assert_eq!(
            lp.steps[0].node_test,
            NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(Some("tgt".into())))
        );
    }

    #[test]
    fn test_parse_namespace_wildcard() {
        let Expression::LocationPath(lp) = parse_expression("svg:*").unwrap() else {
            panic!("Expected location path");
        };
        assert_eq!(
            lp.steps[0].node_test,
            NodeTest::NamespaceWildcard {
                prefix: "svg".into(),
                namespace_uri: None
            }
        );
    }

    #[test]
    fn test_parse_abbreviated_steps() {
        let self_node = Step::new(Axis::SelfAxis, NodeTest::NodeType(NodeTypeTest::Node));
        let parent_node = Step::new(Axis::Parent, NodeTest::NodeType(NodeTypeTest::Node));
        assert_eq!(parse_expression(".").unwrap(), relative(vec![self_node]));
        assert_eq!(
            parse_expression("../foo").unwrap(),
            relative(vec![parent_node, child("foo")])
        );
    }

    #[test]
    fn test_parse_filter_expression() {
        let result = parse_expression("(a | b)[2]").unwrap();
        let Expression::Filter { primary, predicates } = result else {
            panic!("Expected filter expression");
        };
        assert!(primary.is_binary_op());
        assert_eq!(predicates, vec![Expression::Number(2.0)]);

        let Expression::LocationPath(lp) = parse_expression("$items[1]/name").unwrap() else {
            panic!("Expected location path");
        };
        assert!(matches!(lp.start_point.as_deref(), Some(Expression::Filter { .. })));
    }

    #[test]
    fn test_parse_operator_precedence() {
        assert_eq!(
            parse_expression("1 + 2 * 3").unwrap(),
            Expression::BinaryOp {
                left: Box::new(Expression::Number(1.0)),
                op: BinaryOperator::Plus,
                right: Box::new(Expression::BinaryOp {
                    left: Box::new(Expression::Number(2.0)),
                    op: BinaryOperator::Multiply,
                    right: Box::new(Expression::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn test_parse_keyword_operators_need_a_boundary() {
        let Expression::BinaryOp { op, right, .. } = parse_expression("6 div 2").unwrap() else {
            panic!("Expected BinaryOp");
        };
        assert_eq!(op, BinaryOperator::Divide);
        assert_eq!(*right, Expression::Number(2.0));

        // `order` is a step name, not `or` followed by `der`.
        assert_eq!(parse_expression("order").unwrap(), relative(vec![child("order")]));
    }

    #[test]
    fn test_parse_boolean_logic() {
        let path = |n: &str| relative(vec![child(n)]);
        let eq = |l: &str, r: &str| Expression::BinaryOp {
            left: Box::new(path(l)),
            op: BinaryOperator::Equals,
            right: Box::new(path(r)),
        };

        let result = parse_expression("a = b or c = d and e = f").unwrap();
        assert_eq!(
            result,
            Expression::BinaryOp {
                left: Box::new(eq("a", "b")),
                op: BinaryOperator::Or,
                right: Box::new(Expression::BinaryOp {
                    left: Box::new(eq("c", "d")),
                    op: BinaryOperator::And,
                    right: Box::new(eq("e", "f")),
                }),
            }
        );
    }

    #[test]
    fn test_parse_descendant_or_self() {
        assert_eq!(
            parse_expression("//foo").unwrap(),
            Expression::LocationPath(LocationPath {
                start_point: None,
                is_absolute: true,
                steps: vec![descendant_or_self_step(), child("foo")]
            })
        );
    }

    #[test]
    fn test_parse_root_alone() {
        let Expression::LocationPath(lp) = parse_expression("/").unwrap() else {
            panic!("Expected location path");
        };
        assert!(lp.is_absolute);
        assert!(lp.steps.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_expression("foo["),
            Err(XPathError::XPathParse(..))
        ));
        assert!(parse_expression("1 +").is_err());
    }
}
