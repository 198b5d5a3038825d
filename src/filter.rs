//! LDAP-style filter expressions matched against capability properties.
//!
//! The grammar is the OSGi filter syntax: `(attr=value)`, `(&...)`, `(|...)`,
//! `(!...)`, relational `>=`/`<=`, approximate `~=` (case-insensitive,
//! whitespace ignored), presence `=*`, substring `=a*b`, plus two set
//! operators used by repository metadata: `(attr:<*v1, v2)` tests that every
//! value of the property appears in the filter's comma-separated list
//! (subset), `(attr:*>v1, v2)` the reverse (superset). A missing property is
//! the empty set, so a subset test on it succeeds.
//!
//! Values escape `( ) * \` with a backslash. Property keys are matched
//! case-insensitively. Properties typed as version ranges compare with
//! [`VersionRange::compare`]; numbers compare numerically; everything else
//! compares as strings.
use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;

use crate::error::{ObrError, Result};
use crate::model::PropertyValue;
use crate::version::VersionRange;

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    root: Node,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Item(Item),
}

#[derive(Debug, Clone, PartialEq)]
struct Item {
    attr: String,
    op: Op,
    /// Pre-parsed range for `version` attributes, so repeated matches skip
    /// the string parse. Unparsable values stay None and fail at evaluation.
    converted: Option<VersionRange>,
}

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Equal(String),
    Approx(String),
    GreaterEq(String),
    LessEq(String),
    Present,
    /// Alternating literals and wildcards; None is `*`.
    Substring(Vec<Option<String>>),
    Subset(String),
    Superset(String),
}

impl Filter {
    pub fn parse(text: &str) -> Result<Self> {
        let mut parser = Parser {
            chars: text.chars().collect(),
            pos: 0,
            source: text,
        };
        let root = parser.parse_filter()?;
        if parser.pos != parser.chars.len() {
            return Err(parser.error("extraneous trailing characters"));
        }
        Ok(Self { root })
    }

    /// Evaluate against a property map (each property a list of values; a
    /// scalar comparison succeeds if any value matches).
    pub fn matches(&self, properties: &IndexMap<String, Vec<PropertyValue>>) -> bool {
        eval(&self.root, properties)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(f, &self.root)
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &Node) -> fmt::Result {
    match node {
        Node::And(children) => {
            f.write_str("(&")?;
            for child in children {
                write_node(f, child)?;
            }
            f.write_str(")")
        }
        Node::Or(children) => {
            f.write_str("(|")?;
            for child in children {
                write_node(f, child)?;
            }
            f.write_str(")")
        }
        Node::Not(child) => {
            f.write_str("(!")?;
            write_node(f, child)?;
            f.write_str(")")
        }
        Node::Item(item) => {
            write!(f, "({}", item.attr)?;
            match &item.op {
                Op::Equal(v) => write!(f, "={}", encode_value(v))?,
                Op::Approx(v) => write!(f, "~={}", encode_value(v))?,
                Op::GreaterEq(v) => write!(f, ">={}", encode_value(v))?,
                Op::LessEq(v) => write!(f, "<={}", encode_value(v))?,
                Op::Present => f.write_str("=*")?,
                Op::Substring(parts) => {
                    f.write_str("=")?;
                    for part in parts {
                        match part {
                            Some(lit) => write!(f, "{}", encode_value(lit))?,
                            None => f.write_str("*")?,
                        }
                    }
                }
                Op::Subset(v) => write!(f, ":<*{}", encode_value(v))?,
                Op::Superset(v) => write!(f, ":*>{}", encode_value(v))?,
            }
            f.write_str(")")
        }
    }
}

fn encode_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ── Evaluation ───────────────────────────────────────────────────────

fn eval(node: &Node, properties: &IndexMap<String, Vec<PropertyValue>>) -> bool {
    match node {
        Node::And(children) => children.iter().all(|c| eval(c, properties)),
        Node::Or(children) => children.iter().any(|c| eval(c, properties)),
        Node::Not(child) => !eval(child, properties),
        Node::Item(item) => eval_item(item, properties),
    }
}

fn lookup<'a>(
    properties: &'a IndexMap<String, Vec<PropertyValue>>,
    attr: &str,
) -> Option<&'a [PropertyValue]> {
    properties
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(attr))
        .map(|(_, values)| values.as_slice())
}

fn eval_item(item: &Item, properties: &IndexMap<String, Vec<PropertyValue>>) -> bool {
    match &item.op {
        Op::Present => lookup(properties, &item.attr).is_some(),
        Op::Subset(value) => {
            let prop_set = property_set(lookup(properties, &item.attr));
            let filter_set = split_set(value);
            prop_set.iter().all(|v| filter_set.contains(v))
        }
        Op::Superset(value) => {
            let prop_set = property_set(lookup(properties, &item.attr));
            let filter_set = split_set(value);
            filter_set.iter().all(|v| prop_set.contains(v))
        }
        _ => match lookup(properties, &item.attr) {
            Some(values) => values.iter().any(|v| compare_value(item, v)),
            None => false,
        },
    }
}

fn compare_value(item: &Item, value: &PropertyValue) -> bool {
    match value {
        PropertyValue::Text(s) => compare_text(item, s),
        PropertyValue::Set(elems) => elems.iter().any(|e| compare_text(item, e)),
        PropertyValue::Number(n) => compare_number(&item.op, *n),
        PropertyValue::Version(range) => compare_version(item, range),
    }
}

fn compare_text(item: &Item, text: &str) -> bool {
    match &item.op {
        Op::Equal(v) => text == v,
        Op::Approx(v) => approx_string(text) == approx_string(v),
        Op::GreaterEq(v) => text >= v.as_str(),
        Op::LessEq(v) => text <= v.as_str(),
        Op::Substring(parts) => match_substring(parts, text),
        _ => false,
    }
}

fn compare_number(op: &Op, number: i64) -> bool {
    match op {
        Op::Equal(v) | Op::Approx(v) => v.trim().parse::<i64>().is_ok_and(|t| number == t),
        Op::GreaterEq(v) => v.trim().parse::<i64>().is_ok_and(|t| number >= t),
        Op::LessEq(v) => v.trim().parse::<i64>().is_ok_and(|t| number <= t),
        _ => false,
    }
}

fn compare_version(item: &Item, range: &VersionRange) -> bool {
    let value = match &item.op {
        Op::Equal(v) | Op::Approx(v) | Op::GreaterEq(v) | Op::LessEq(v) => v,
        _ => return false,
    };
    let parsed;
    let target = match &item.converted {
        Some(r) => r,
        None => match VersionRange::parse(value) {
            Ok(r) => {
                parsed = r;
                &parsed
            }
            Err(_) => return false,
        },
    };
    let ord = range.compare(target);
    match &item.op {
        Op::Equal(_) | Op::Approx(_) => ord == std::cmp::Ordering::Equal,
        Op::GreaterEq(_) => ord != std::cmp::Ordering::Less,
        Op::LessEq(_) => ord != std::cmp::Ordering::Greater,
        _ => false,
    }
}

/// Whitespace stripped for `~=` comparison, case folded.
fn approx_string(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn match_substring(parts: &[Option<String>], value: &str) -> bool {
    let mut pos = 0;
    let len = parts.len();
    for (i, part) in parts.iter().enumerate() {
        match part {
            None => {
                if i + 1 == len {
                    return true;
                }
            }
            Some(lit) => {
                if i == 0 {
                    if !value[pos..].starts_with(lit.as_str()) {
                        return false;
                    }
                    pos += lit.len();
                } else if i + 1 == len {
                    let rest = &value[pos..];
                    return rest.len() >= lit.len() && rest.ends_with(lit.as_str());
                } else {
                    match value[pos..].find(lit.as_str()) {
                        Some(idx) => pos += idx + lit.len(),
                        None => return false,
                    }
                }
            }
        }
    }
    pos == value.len()
}

/// Union of string forms of a property's values, comma-split where textual.
/// No property at all is the empty set.
fn property_set(values: Option<&[PropertyValue]>) -> HashSet<String> {
    let mut set = HashSet::new();
    for value in values.unwrap_or_default() {
        match value {
            PropertyValue::Set(elems) => set.extend(elems.iter().cloned()),
            PropertyValue::Text(s) => set.extend(split_set(s)),
            other => {
                set.insert(other.to_string());
            }
        }
    }
    set
}

fn split_set(value: &str) -> HashSet<String> {
    value.split(',').map(|t| t.trim().to_string()).collect()
}

// ── Parser ───────────────────────────────────────────────────────────

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> ObrError {
        ObrError::InvalidFilter(format!(
            "{reason} at position {} in \"{}\"",
            self.pos, self.source
        ))
    }

    fn cur(&self) -> Result<char> {
        self.chars
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error("filter ended abruptly"))
    }

    fn ahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_filter(&mut self) -> Result<Node> {
        self.skip_whitespace();
        if self.cur()? != '(' {
            return Err(self.error("missing '('"));
        }
        self.pos += 1;
        let node = self.parse_filtercomp()?;
        self.skip_whitespace();
        if self.cur()? != ')' {
            return Err(self.error("missing ')'"));
        }
        self.pos += 1;
        self.skip_whitespace();
        Ok(node)
    }

    fn parse_filtercomp(&mut self) -> Result<Node> {
        self.skip_whitespace();
        match self.cur()? {
            '&' => {
                self.pos += 1;
                Ok(Node::And(self.parse_filter_list()?))
            }
            '|' => {
                self.pos += 1;
                Ok(Node::Or(self.parse_filter_list()?))
            }
            '!' => {
                self.pos += 1;
                self.skip_whitespace();
                Ok(Node::Not(Box::new(self.parse_filter()?)))
            }
            _ => self.parse_item(),
        }
    }

    fn parse_filter_list(&mut self) -> Result<Vec<Node>> {
        self.skip_whitespace();
        if self.cur()? != '(' {
            return Err(self.error("missing '('"));
        }
        let mut operands = Vec::new();
        while self.cur()? == '(' {
            operands.push(self.parse_filter()?);
        }
        Ok(operands)
    }

    fn parse_item(&mut self) -> Result<Node> {
        let attr = self.parse_attr()?;
        self.skip_whitespace();
        let op = match self.cur()? {
            ':' if self.ahead(1) == Some('<') && self.ahead(2) == Some('*') => {
                self.pos += 3;
                Op::Subset(self.parse_value()?)
            }
            ':' if self.ahead(1) == Some('*') && self.ahead(2) == Some('>') => {
                self.pos += 3;
                Op::Superset(self.parse_value()?)
            }
            '~' if self.ahead(1) == Some('=') => {
                self.pos += 2;
                Op::Approx(self.parse_value()?)
            }
            '>' if self.ahead(1) == Some('=') => {
                self.pos += 2;
                Op::GreaterEq(self.parse_value()?)
            }
            '<' if self.ahead(1) == Some('=') => {
                self.pos += 2;
                Op::LessEq(self.parse_value()?)
            }
            '=' => {
                // `=*` immediately before ')' is a presence test, otherwise
                // the '*' belongs to a substring pattern.
                if self.ahead(1) == Some('*') {
                    let mark = self.pos;
                    self.pos += 2;
                    self.skip_whitespace();
                    if self.cur()? == ')' {
                        return Ok(Node::Item(Item {
                            attr,
                            op: Op::Present,
                            converted: None,
                        }));
                    }
                    self.pos = mark;
                }
                self.pos += 1;
                self.parse_substring()?
            }
            _ => return Err(self.error("invalid operator")),
        };
        let converted = converted_range(&attr, &op);
        Ok(Node::Item(Item {
            attr,
            op,
            converted,
        }))
    }

    fn parse_attr(&mut self) -> Result<String> {
        self.skip_whitespace();
        let begin = self.pos;
        let mut end = self.pos;
        loop {
            let c = self.cur()?;
            if matches!(c, '~' | '<' | '>' | '=' | '(' | ')') {
                break;
            }
            if c == ':'
                && (self.ahead(1) == Some('<') && self.ahead(2) == Some('*')
                    || self.ahead(1) == Some('*') && self.ahead(2) == Some('>'))
            {
                break;
            }
            self.pos += 1;
            if !c.is_whitespace() {
                end = self.pos;
            }
        }
        if end == begin {
            return Err(self.error("missing attribute name"));
        }
        Ok(self.chars[begin..end].iter().collect())
    }

    fn parse_value(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            let mut c = self.cur()?;
            match c {
                ')' => break,
                '(' => return Err(self.error("invalid value")),
                '\\' => {
                    self.pos += 1;
                    c = self.cur()?;
                    out.push(c);
                    self.pos += 1;
                }
                _ => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        if out.is_empty() {
            return Err(self.error("missing value"));
        }
        Ok(out)
    }

    fn parse_substring(&mut self) -> Result<Op> {
        let mut parts: Vec<Option<String>> = Vec::new();
        let mut current = String::new();
        loop {
            let mut c = self.cur()?;
            match c {
                ')' => {
                    if !current.is_empty() {
                        parts.push(Some(current));
                    }
                    break;
                }
                '(' => return Err(self.error("invalid value")),
                '*' => {
                    if !current.is_empty() {
                        parts.push(Some(std::mem::take(&mut current)));
                    }
                    parts.push(None);
                    self.pos += 1;
                }
                '\\' => {
                    self.pos += 1;
                    c = self.cur()?;
                    current.push(c);
                    self.pos += 1;
                }
                _ => {
                    current.push(c);
                    self.pos += 1;
                }
            }
        }
        match parts.len() {
            0 => Err(self.error("missing value")),
            1 => match parts.pop() {
                Some(Some(literal)) => Ok(Op::Equal(literal)),
                _ => Ok(Op::Substring(vec![None])),
            },
            _ => Ok(Op::Substring(parts)),
        }
    }
}

/// Filter values compared against `version` attributes are ranges; parse once
/// at construction. Conversion failures are ignored here and surface as a
/// non-match during evaluation.
fn converted_range(attr: &str, op: &Op) -> Option<VersionRange> {
    if !attr.eq_ignore_ascii_case("version") {
        return None;
    }
    match op {
        Op::Equal(v) | Op::Approx(v) | Op::GreaterEq(v) | Op::LessEq(v) => {
            VersionRange::parse(v).ok()
        }
        _ => None,
    }
}
