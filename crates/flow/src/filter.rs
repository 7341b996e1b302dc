//! Flow predicate expressions
//!
//! A small expression language for admitting or rejecting flows, used by the
//! flow filter segment and by branch conditions.
//!
//! # Grammar
//!
//! ```text
//! expr   := term { "or" term }
//! term   := clause { "and" clause }
//! clause := ["not"] field [op] value
//! field  := proto | port | srcport | dstport | bytes | packets
//!         | as | srcas | dstas | iface | inif | outif
//! op     := < | > | <= | >= | = | ==        (defaults to =)
//! value  := unsigned integer, or an IANA protocol name for `proto`
//! ```
//!
//! The directionless fields `port`, `as` and `iface` match when either the
//! source or the destination side satisfies the comparison.
//!
//! # Example
//!
//! ```
//! use flowpipe_flow::{FlowPredicate, FlowRecord};
//!
//! let predicate = FlowPredicate::parse("proto tcp and port <1024").unwrap();
//! let flow = FlowRecord { proto: 6, dst_port: 443, ..Default::default() };
//! assert!(predicate.matches(&flow));
//! ```

use thiserror::Error;

use crate::iana;
use crate::FlowRecord;

#[cfg(test)]
#[path = "filter_test.rs"]
mod tests;

/// Errors produced while parsing a predicate expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    /// The expression contained no clauses.
    #[error("empty filter expression")]
    Empty,

    /// A clause referenced an unknown field name.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// A field or operator was not followed by a value.
    #[error("expected a value after '{0}'")]
    MissingValue(String),

    /// A value could not be interpreted for its field.
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },

    /// Leftover input after a complete expression.
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldSel {
    Proto,
    Port,
    SrcPort,
    DstPort,
    Bytes,
    Packets,
    As,
    SrcAs,
    DstAs,
    Iface,
    InIf,
    OutIf,
}

impl FieldSel {
    fn parse(token: &str) -> Option<FieldSel> {
        let sel = match token.to_ascii_lowercase().as_str() {
            "proto" => FieldSel::Proto,
            "port" => FieldSel::Port,
            "srcport" => FieldSel::SrcPort,
            "dstport" => FieldSel::DstPort,
            "bytes" => FieldSel::Bytes,
            "packets" => FieldSel::Packets,
            "as" => FieldSel::As,
            "srcas" => FieldSel::SrcAs,
            "dstas" => FieldSel::DstAs,
            "iface" => FieldSel::Iface,
            "inif" => FieldSel::InIf,
            "outif" => FieldSel::OutIf,
            _ => return None,
        };
        Some(sel)
    }

    fn name(self) -> &'static str {
        match self {
            FieldSel::Proto => "proto",
            FieldSel::Port => "port",
            FieldSel::SrcPort => "srcport",
            FieldSel::DstPort => "dstport",
            FieldSel::Bytes => "bytes",
            FieldSel::Packets => "packets",
            FieldSel::As => "as",
            FieldSel::SrcAs => "srcas",
            FieldSel::DstAs => "dstas",
            FieldSel::Iface => "iface",
            FieldSel::InIf => "inif",
            FieldSel::OutIf => "outif",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
}

impl Cmp {
    fn parse(token: &str) -> Option<Cmp> {
        let cmp = match token {
            "<" => Cmp::Lt,
            ">" => Cmp::Gt,
            "<=" => Cmp::Le,
            ">=" => Cmp::Ge,
            "=" | "==" => Cmp::Eq,
            _ => return None,
        };
        Some(cmp)
    }

    fn eval(self, left: u64, right: u64) -> bool {
        match self {
            Cmp::Lt => left < right,
            Cmp::Gt => left > right,
            Cmp::Le => left <= right,
            Cmp::Ge => left >= right,
            Cmp::Eq => left == right,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Clause {
        field: FieldSel,
        cmp: Cmp,
        value: u64,
        negate: bool,
    },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

/// A compiled predicate over [`FlowRecord`]s.
#[derive(Debug, Clone)]
pub struct FlowPredicate {
    root: Node,
    source: String,
}

impl FlowPredicate {
    /// Parse an expression. See the module docs for the grammar.
    pub fn parse(expression: &str) -> Result<FlowPredicate, FilterError> {
        let tokens = tokenize(expression);
        if tokens.is_empty() {
            return Err(FilterError::Empty);
        }

        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.parse_or()?;
        if let Some(extra) = parser.peek() {
            return Err(FilterError::UnexpectedToken(extra.to_string()));
        }

        Ok(FlowPredicate {
            root,
            source: expression.trim().to_string(),
        })
    }

    /// Evaluate the predicate against a flow.
    pub fn matches(&self, flow: &FlowRecord) -> bool {
        eval(&self.root, flow)
    }

    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(|s| s.as_str())
    }

    fn next(&mut self) -> Option<&str> {
        let idx = self.pos;
        if idx < self.tokens.len() {
            self.pos += 1;
        }
        self.tokens.get(idx).map(|s| s.as_str())
    }

    fn parse_or(&mut self) -> Result<Node, FilterError> {
        let mut left = self.parse_and()?;
        while self.peek().is_some_and(|t| t.eq_ignore_ascii_case("or")) {
            self.next();
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, FilterError> {
        let mut left = self.parse_clause()?;
        while self.peek().is_some_and(|t| t.eq_ignore_ascii_case("and")) {
            self.next();
            let right = self.parse_clause()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_clause(&mut self) -> Result<Node, FilterError> {
        let mut negate = false;
        while self.peek().is_some_and(|t| t.eq_ignore_ascii_case("not")) {
            negate = !negate;
            self.next();
        }

        let field_token = self.next().ok_or(FilterError::Empty)?.to_string();
        let field = FieldSel::parse(&field_token)
            .ok_or_else(|| FilterError::UnknownField(field_token.clone()))?;

        let mut cmp = Cmp::Eq;
        let mut after = field_token.clone();
        if let Some(op) = self.peek().and_then(Cmp::parse) {
            cmp = op;
            after = self.next().map(str::to_string).unwrap_or(after);
        }

        let value_token = self
            .next()
            .ok_or(FilterError::MissingValue(after))?
            .to_string();
        let value = parse_value(field, &value_token)?;

        Ok(Node::Clause {
            field,
            cmp,
            value,
            negate,
        })
    }
}

fn parse_value(field: FieldSel, token: &str) -> Result<u64, FilterError> {
    if let Ok(number) = token.parse::<u64>() {
        return Ok(number);
    }
    // Protocol clauses also accept IANA names ("tcp", "udp", ...).
    if field == FieldSel::Proto {
        if let Some(number) = iana::protocol_number(token) {
            return Ok(number as u64);
        }
    }
    Err(FilterError::InvalidValue {
        field: field.name().to_string(),
        value: token.to_string(),
    })
}

/// Split on whitespace, then peel comparison operators off token fronts so
/// both `port <50` and `port < 50` tokenize identically.
fn tokenize(expression: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in expression.split_whitespace() {
        let op_len = word.chars().take_while(|c| "<>=".contains(*c)).count();
        if op_len > 0 {
            tokens.push(word[..op_len].to_string());
            if op_len < word.len() {
                tokens.push(word[op_len..].to_string());
            }
        } else {
            tokens.push(word.to_string());
        }
    }
    tokens
}

fn eval(node: &Node, flow: &FlowRecord) -> bool {
    match node {
        Node::Clause {
            field,
            cmp,
            value,
            negate,
        } => {
            let matched = match field {
                FieldSel::Proto => cmp.eval(flow.proto as u64, *value),
                FieldSel::Port => {
                    cmp.eval(flow.src_port as u64, *value) || cmp.eval(flow.dst_port as u64, *value)
                }
                FieldSel::SrcPort => cmp.eval(flow.src_port as u64, *value),
                FieldSel::DstPort => cmp.eval(flow.dst_port as u64, *value),
                FieldSel::Bytes => cmp.eval(flow.bytes, *value),
                FieldSel::Packets => cmp.eval(flow.packets, *value),
                FieldSel::As => {
                    cmp.eval(flow.src_as as u64, *value) || cmp.eval(flow.dst_as as u64, *value)
                }
                FieldSel::SrcAs => cmp.eval(flow.src_as as u64, *value),
                FieldSel::DstAs => cmp.eval(flow.dst_as as u64, *value),
                FieldSel::Iface => {
                    cmp.eval(flow.in_if as u64, *value) || cmp.eval(flow.out_if as u64, *value)
                }
                FieldSel::InIf => cmp.eval(flow.in_if as u64, *value),
                FieldSel::OutIf => cmp.eval(flow.out_if as u64, *value),
            };
            matched != *negate
        }
        Node::And(left, right) => eval(left, flow) && eval(right, flow),
        Node::Or(left, right) => eval(left, flow) || eval(right, flow),
    }
}
