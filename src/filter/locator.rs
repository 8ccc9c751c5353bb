//! Element locators: a small path language for selecting feed elements.
//!
//! ```text
//! locator   := ('/' | '//' | './' | './/')? step (('/' | '//') step)*
//! step      := nametest predicate*
//! nametest  := '*' | name | prefix ':' name | prefix ':' '*'
//! predicate := '[' or-expr ']'
//! or-expr   := and-expr ('or' and-expr)*
//! and-expr  := primary ('and' primary)*
//! primary   := '@' attr (('=' | '!=') literal)?
//!            | 'local-name()' '=' literal
//!            | number
//!            | '(' or-expr ')'
//! ```
//!
//! A leading `/` or `//` anchors the locator at the document; anything else is
//! evaluated relative to the context element. Unprefixed names match elements
//! in no namespace only. The prefixes `atom`, `content`, `dc` (and `xml`) are
//! the only ones a locator may use.
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::xml::{Element, NodeId, XmlDocument, XML_NS};

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("Locator is empty")]
    Empty,
    #[error("Unexpected character '{found}' at position {position}")]
    UnexpectedChar { position: usize, found: char },
    #[error("Unterminated string literal starting at position {0}")]
    UnterminatedLiteral(usize),
    #[error("Expected {expected} at position {position}")]
    Expected {
        expected: &'static str,
        position: usize,
    },
    #[error("Unknown namespace prefix '{0}' (known prefixes: atom, content, dc)")]
    UnknownPrefix(String),
    #[error("Position predicates start at 1")]
    ZeroPosition,
}

fn resolve_prefix(prefix: &str) -> Result<&'static str, LocatorError> {
    match prefix {
        "atom" => Ok(ATOM_NS),
        "content" => Ok(CONTENT_NS),
        "dc" => Ok(DC_NS),
        "xml" => Ok(XML_NS),
        other => Err(LocatorError::UnknownPrefix(other.to_string())),
    }
}

/// A compiled locator.
#[derive(Debug, Clone)]
pub struct Locator {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone)]
struct Step {
    /// Reached through `//` rather than `/`.
    descendant: bool,
    test: NameTest,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone)]
enum NameTest {
    Any,
    AnyInNamespace(&'static str),
    Name {
        namespace: Option<&'static str>,
        local: String,
    },
}

impl NameTest {
    fn matches(&self, element: &Element) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::AnyInNamespace(ns) => element.namespace.as_deref() == Some(*ns),
            NameTest::Name { namespace, local } => {
                element.namespace.as_deref() == *namespace && element.local_name() == local
            }
        }
    }
}

#[derive(Debug, Clone)]
struct AttrName {
    namespace: Option<&'static str>,
    local: String,
}

impl AttrName {
    fn value_in<'a>(&self, element: &'a Element) -> Option<&'a str> {
        element
            .attributes()
            .find(|attr| {
                attr.namespace.as_deref() == self.namespace && attr.name.local == self.local
            })
            .map(|attr| attr.value.as_str())
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    HasAttribute(AttrName),
    AttributeEquals(AttrName, String),
    AttributeNotEquals(AttrName, String),
    LocalName(String),
    Position(usize),
}

impl Expr {
    /// `position` is 1-based within the step's candidate list.
    fn test(&self, element: &Element, position: usize) -> bool {
        match self {
            Expr::Or(terms) => terms.iter().any(|term| term.test(element, position)),
            Expr::And(terms) => terms.iter().all(|term| term.test(element, position)),
            Expr::HasAttribute(name) => name.value_in(element).is_some(),
            Expr::AttributeEquals(name, expected) => {
                name.value_in(element).is_some_and(|value| value == expected)
            }
            // Like XPath, a missing attribute never compares unequal.
            Expr::AttributeNotEquals(name, expected) => {
                name.value_in(element).is_some_and(|value| value != expected)
            }
            Expr::LocalName(expected) => element.local_name() == expected,
            Expr::Position(expected) => position == *expected,
        }
    }
}

impl Locator {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Selects matching elements, de-duplicated and in document order.
    ///
    /// Relative locators start at `context`; absolute ones ignore it.
    pub fn select(&self, doc: &XmlDocument, context: NodeId) -> Vec<NodeId> {
        let mut current = vec![if self.absolute {
            doc.document()
        } else {
            context
        }];

        for step in &self.steps {
            let contexts = if step.descendant {
                let mut expanded = Vec::new();
                for &id in &current {
                    expanded.push(id);
                    expanded.extend(doc.descendant_elements(id));
                }
                expanded.sort_unstable();
                expanded.dedup();
                expanded
            } else {
                current
            };

            let mut next = Vec::new();
            for parent in contexts {
                let mut candidates: Vec<NodeId> = doc
                    .child_elements(parent)
                    .filter(|&child| doc.element(child).is_some_and(|el| step.test.matches(el)))
                    .collect();
                for predicate in &step.predicates {
                    candidates = candidates
                        .into_iter()
                        .enumerate()
                        .filter(|&(i, id)| {
                            doc.element(id)
                                .is_some_and(|el| predicate.test(el, i + 1))
                        })
                        .map(|(_, id)| id)
                        .collect();
                }
                next.extend(candidates);
            }
            // Arena ids follow parse order, which is document order.
            next.sort_unstable();
            next.dedup();
            current = next;
        }
        current
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let source = source.trim();
        if source.is_empty() {
            return Err(LocatorError::Empty);
        }
        let mut parser = Parser {
            tokens: tokenize(source)?,
            pos: 0,
            end: source.len(),
        };
        let (absolute, steps) = parser.locator()?;
        Ok(Self {
            source: source.to_string(),
            absolute,
            steps,
        })
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Star,
    Colon,
    Eq,
    NotEq,
    Name(String),
    Literal(String),
    Number(usize),
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, LocatorError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '/' => {
                if chars.next_if(|&(_, next)| next == '/').is_some() {
                    Token::DoubleSlash
                } else {
                    Token::Slash
                }
            }
            '.' => Token::Dot,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '@' => Token::At,
            '*' => Token::Star,
            ':' => Token::Colon,
            '=' => Token::Eq,
            '!' => {
                if chars.next_if(|&(_, next)| next == '=').is_none() {
                    return Err(LocatorError::UnexpectedChar {
                        position: i,
                        found: '!',
                    });
                }
                Token::NotEq
            }
            '\'' | '"' => {
                let start = i + c.len_utf8();
                let end = loop {
                    match chars.next() {
                        Some((j, ch)) if ch == c => break j,
                        Some(_) => {}
                        None => return Err(LocatorError::UnterminatedLiteral(i)),
                    }
                };
                Token::Literal(source[start..end].to_string())
            }
            c if c.is_ascii_digit() => {
                let mut end = i + 1;
                while let Some((j, _)) = chars.next_if(|&(_, next)| next.is_ascii_digit()) {
                    end = j + 1;
                }
                let number = source[i..end]
                    .parse::<usize>()
                    .map_err(|_| LocatorError::Expected {
                        expected: "a position that fits in memory",
                        position: i,
                    })?;
                Token::Number(number)
            }
            c if is_name_start(c) => {
                let mut end = i + c.len_utf8();
                while let Some((j, ch)) = chars.next_if(|&(_, next)| is_name_char(next)) {
                    end = j + ch.len_utf8();
                }
                Token::Name(source[i..end].to_string())
            }
            other => {
                return Err(LocatorError::UnexpectedChar {
                    position: i,
                    found: other,
                })
            }
        };
        tokens.push((i, token));
    }
    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(offset, _)| *offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, token)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), LocatorError> {
        let position = self.offset();
        if self.eat(&token) {
            Ok(())
        } else {
            Err(LocatorError::Expected { expected, position })
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn locator(&mut self) -> Result<(bool, Vec<Step>), LocatorError> {
        let (absolute, first_descendant) = match self.peek() {
            Some(Token::Slash) => (true, false),
            Some(Token::DoubleSlash) => (true, true),
            Some(Token::Dot) => {
                self.pos += 1;
                match self.peek() {
                    Some(Token::Slash) => (false, false),
                    Some(Token::DoubleSlash) => (false, true),
                    _ => {
                        return Err(LocatorError::Expected {
                            expected: "'/' or '//' after '.'",
                            position: self.offset(),
                        })
                    }
                }
            }
            _ => {
                let steps = self.steps(false)?;
                return Ok((false, steps));
            }
        };
        self.pos += 1;
        Ok((absolute, self.steps(first_descendant)?))
    }

    fn steps(&mut self, first_descendant: bool) -> Result<Vec<Step>, LocatorError> {
        let mut steps = vec![self.step(first_descendant)?];
        loop {
            let descendant = match self.peek() {
                None => return Ok(steps),
                Some(Token::Slash) => false,
                Some(Token::DoubleSlash) => true,
                Some(_) => {
                    return Err(LocatorError::Expected {
                        expected: "'/', '//' or end of locator",
                        position: self.offset(),
                    })
                }
            };
            self.pos += 1;
            steps.push(self.step(descendant)?);
        }
    }

    fn step(&mut self, descendant: bool) -> Result<Step, LocatorError> {
        let position = self.offset();
        let test = match self.next() {
            Some(Token::Star) => NameTest::Any,
            Some(Token::Name(first)) if self.eat(&Token::Colon) => {
                let namespace = resolve_prefix(&first)?;
                let position = self.offset();
                match self.next() {
                    Some(Token::Star) => NameTest::AnyInNamespace(namespace),
                    Some(Token::Name(local)) => NameTest::Name {
                        namespace: Some(namespace),
                        local,
                    },
                    _ => {
                        return Err(LocatorError::Expected {
                            expected: "element name or '*' after ':'",
                            position,
                        })
                    }
                }
            }
            Some(Token::Name(local)) => NameTest::Name {
                namespace: None,
                local,
            },
            _ => {
                return Err(LocatorError::Expected {
                    expected: "element name or '*'",
                    position,
                })
            }
        };

        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.or_expr()?);
            self.expect(Token::RBracket, "']'")?;
        }
        Ok(Step {
            descendant,
            test,
            predicates,
        })
    }

    fn or_expr(&mut self) -> Result<Expr, LocatorError> {
        let mut terms = vec![self.and_expr()?];
        while self.eat_keyword("or") {
            terms.push(self.and_expr()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn and_expr(&mut self) -> Result<Expr, LocatorError> {
        let mut terms = vec![self.primary()?];
        while self.eat_keyword("and") {
            terms.push(self.primary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn primary(&mut self) -> Result<Expr, LocatorError> {
        let position = self.offset();
        match self.next() {
            Some(Token::At) => {
                let name = self.attr_name()?;
                if self.eat(&Token::Eq) {
                    Ok(Expr::AttributeEquals(name, self.literal()?))
                } else if self.eat(&Token::NotEq) {
                    Ok(Expr::AttributeNotEquals(name, self.literal()?))
                } else {
                    Ok(Expr::HasAttribute(name))
                }
            }
            Some(Token::Name(name)) if name == "local-name" => {
                self.expect(Token::LParen, "'('")?;
                self.expect(Token::RParen, "')'")?;
                self.expect(Token::Eq, "'='")?;
                Ok(Expr::LocalName(self.literal()?))
            }
            Some(Token::Number(0)) => Err(LocatorError::ZeroPosition),
            Some(Token::Number(n)) => Ok(Expr::Position(n)),
            Some(Token::LParen) => {
                let expr = self.or_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(LocatorError::Expected {
                expected: "'@attribute', 'local-name()', a position or '('",
                position,
            }),
        }
    }

    fn attr_name(&mut self) -> Result<AttrName, LocatorError> {
        let position = self.offset();
        let Some(Token::Name(first)) = self.next() else {
            return Err(LocatorError::Expected {
                expected: "attribute name",
                position,
            });
        };
        if !self.eat(&Token::Colon) {
            return Ok(AttrName {
                namespace: None,
                local: first,
            });
        }
        let namespace = resolve_prefix(&first)?;
        let position = self.offset();
        match self.next() {
            Some(Token::Name(local)) => Ok(AttrName {
                namespace: Some(namespace),
                local,
            }),
            _ => Err(LocatorError::Expected {
                expected: "attribute name after ':'",
                position,
            }),
        }
    }

    fn literal(&mut self) -> Result<String, LocatorError> {
        let position = self.offset();
        match self.next() {
            Some(Token::Literal(value)) => Ok(value),
            _ => Err(LocatorError::Expected {
                expected: "quoted string",
                position,
            }),
        }
    }
}
