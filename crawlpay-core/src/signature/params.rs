//! Signature declaration grammar.
//!
//! Both signature headers are structured-field dictionaries. The declaration
//! (`Signature-Input`) maps a label to an inner list of quoted component names
//! followed by `;key=value` parameters. The signature value (`Signature`) maps
//! the same label to a `:base64:` byte sequence.
//!
//! ```text
//! dictionary  = member *( OWS "," OWS member )
//! member      = label "=" ( inner-list / byte-seq ) *parameter
//! inner-list  = "(" *SP [ sf-string *( 1*SP sf-string ) *SP ] ")"
//! parameter   = ";" *SP key [ "=" bare-item ]
//! bare-item   = sf-integer / sf-string / token / sf-boolean
//! ```

use std::{
    collections::HashSet,
    fmt::{Display, Write},
};

use base64::{Engine, prelude::BASE64_STANDARD};
use bon::Builder;

use crate::signature::components::Component;

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Integer(i64),
    String(String),
    Token(String),
    Boolean(bool),
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Integer(i) => write!(f, "{i}"),
            ParamValue::String(s) => write_sf_string(f, s),
            ParamValue::Token(t) => f.write_str(t),
            ParamValue::Boolean(true) => f.write_str("?1"),
            ParamValue::Boolean(false) => f.write_str("?0"),
        }
    }
}

/// Malformed signature header syntax or semantics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    #[error("Header value is empty")]
    Empty,
    #[error("Unexpected end of input, expected {0}")]
    UnexpectedEnd(&'static str),
    #[error("Unexpected character {found:?} at offset {pos}, expected {expected}")]
    Unexpected {
        pos: usize,
        found: char,
        expected: &'static str,
    },
    #[error("Integer out of range at offset {0}")]
    IntegerRange(usize),
    #[error("Label '{0}' appears more than once")]
    DuplicateLabel(String),
    #[error("Component list must not be empty")]
    EmptyComponents,
    #[error("Component '{0}' is listed more than once")]
    DuplicateComponent(String),
    #[error("Invalid component '{0}'")]
    InvalidComponent(String),
    #[error("Parameter '{0}' is given more than once")]
    DuplicateParameter(String),
    #[error("Missing required parameter '{0}'")]
    MissingParameter(&'static str),
    #[error("Parameter '{name}' must be {expected}")]
    InvalidParameter {
        name: String,
        expected: &'static str,
    },
    #[error("Invalid byte sequence for '{label}': {reason}")]
    InvalidByteSequence { label: String, reason: String },
}

/// Parameters of one signature: what it covers and when it is valid.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct SignatureParameters {
    /// Covered components, in signing order.
    pub components: Vec<Component>,
    /// Creation time, Unix seconds.
    pub created: u64,
    /// Expiration time, Unix seconds.
    pub expires: Option<u64>,
    #[builder(into)]
    pub key_id: String,
    #[builder(into)]
    pub alg: Option<String>,
    #[builder(into)]
    pub nonce: Option<String>,
    #[builder(into)]
    pub tag: Option<String>,
    /// Parameters without defined semantics, kept in order of appearance.
    #[builder(default)]
    pub extra: Vec<(String, ParamValue)>,
}

impl SignatureParameters {
    fn from_parts(
        names: Vec<String>,
        params: Vec<(String, ParamValue)>,
    ) -> Result<Self, ParamsError> {
        if names.is_empty() {
            return Err(ParamsError::EmptyComponents);
        }

        let mut seen = HashSet::new();
        let mut components = Vec::with_capacity(names.len());
        for name in names {
            if !seen.insert(name.clone()) {
                return Err(ParamsError::DuplicateComponent(name));
            }
            components.push(name.parse::<Component>()?);
        }

        let mut created = None;
        let mut expires = None;
        let mut key_id = None;
        let mut alg = None;
        let mut nonce = None;
        let mut tag = None;
        let mut extra = Vec::new();

        for (name, value) in params {
            match name.as_str() {
                "created" => created = Some(timestamp(&name, value)?),
                "expires" => expires = Some(timestamp(&name, value)?),
                "keyid" => key_id = Some(string(&name, value)?),
                "alg" => alg = Some(string(&name, value)?),
                "nonce" => nonce = Some(string(&name, value)?),
                "tag" => tag = Some(string(&name, value)?),
                _ => extra.push((name, value)),
            }
        }

        Ok(SignatureParameters {
            components,
            created: created.ok_or(ParamsError::MissingParameter("created"))?,
            expires,
            key_id: key_id.ok_or(ParamsError::MissingParameter("keyid"))?,
            alg,
            nonce,
            tag,
            extra,
        })
    }
}

fn timestamp(name: &str, value: ParamValue) -> Result<u64, ParamsError> {
    match value {
        ParamValue::Integer(i) if i >= 0 => Ok(i as u64),
        _ => Err(ParamsError::InvalidParameter {
            name: name.to_string(),
            expected: "a non-negative integer",
        }),
    }
}

fn string(name: &str, value: ParamValue) -> Result<String, ParamsError> {
    match value {
        ParamValue::String(s) => Ok(s),
        _ => Err(ParamsError::InvalidParameter {
            name: name.to_string(),
            expected: "a quoted string",
        }),
    }
}

/// Serializes to the inner-list form used both in the declaration header and
/// as the value of the `@signature-params` line.
impl Display for SignatureParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char('(')?;
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_char(' ')?;
            }
            write_sf_string(f, component.name())?;
        }
        f.write_char(')')?;

        write!(f, ";created={}", self.created)?;
        if let Some(expires) = self.expires {
            write!(f, ";expires={expires}")?;
        }
        f.write_str(";keyid=")?;
        write_sf_string(f, &self.key_id)?;
        if let Some(alg) = &self.alg {
            f.write_str(";alg=")?;
            write_sf_string(f, alg)?;
        }
        if let Some(nonce) = &self.nonce {
            f.write_str(";nonce=")?;
            write_sf_string(f, nonce)?;
        }
        if let Some(tag) = &self.tag {
            f.write_str(";tag=")?;
            write_sf_string(f, tag)?;
        }
        for (name, value) in &self.extra {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}

/// Whether a value can be carried in a quoted string.
pub fn is_sf_string_safe(value: &str) -> bool {
    value.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

fn write_sf_string(f: &mut impl Write, value: &str) -> std::fmt::Result {
    f.write_char('"')?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('"')
}

/// One member of a declaration header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDeclaration {
    pub label: String,
    pub parameters: SignatureParameters,
    /// The member value exactly as received, used verbatim for `@signature-params`.
    pub raw: String,
}

impl SignatureDeclaration {
    /// Parse every member of a `Signature-Input` header value.
    pub fn parse_all(input: &str) -> Result<Vec<Self>, ParamsError> {
        let mut parser = Parser::new(input);
        let members = parser.parse_dictionary(|p| {
            let names = p.parse_inner_list()?;
            let params = p.parse_parameters()?;
            SignatureParameters::from_parts(names, params)
        })?;

        Ok(members
            .into_iter()
            .map(|(label, parameters, raw)| SignatureDeclaration {
                label,
                parameters,
                raw: raw.to_string(),
            })
            .collect())
    }

    /// Header form of this single member: `label=raw`.
    pub fn header_value(&self) -> String {
        format!("{}={}", self.label, self.raw)
    }
}

/// Parse every member of a `Signature` header value into raw signature bytes.
pub fn parse_signature_values(input: &str) -> Result<Vec<(String, Vec<u8>)>, ParamsError> {
    let mut parser = Parser::new(input);
    let members = parser.parse_dictionary(|p| {
        let encoded = p.parse_byte_sequence()?;
        // Parameters on the signature value carry no meaning here.
        p.parse_parameters()?;
        Ok(encoded)
    })?;

    members
        .into_iter()
        .map(|(label, encoded, _)| {
            BASE64_STANDARD
                .decode(encoded)
                .map(|bytes| (label.clone(), bytes))
                .map_err(|err| ParamsError::InvalidByteSequence {
                    label,
                    reason: err.to_string(),
                })
        })
        .collect()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn is_done(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn unexpected(&self, expected: &'static str) -> ParamsError {
        match self.input[self.pos..].chars().next() {
            Some(found) => ParamsError::Unexpected {
                pos: self.pos,
                found,
                expected,
            },
            None => ParamsError::UnexpectedEnd(expected),
        }
    }

    fn expect(&mut self, byte: u8, expected: &'static str) -> Result<(), ParamsError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn skip_sp(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn skip_ows(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    /// Parse `member *( OWS "," OWS member )`, returning each label, the parsed
    /// value and the raw text of the value.
    fn parse_dictionary<T>(
        &mut self,
        mut member: impl FnMut(&mut Self) -> Result<T, ParamsError>,
    ) -> Result<Vec<(String, T, &'a str)>, ParamsError> {
        self.skip_ows();
        if self.is_done() {
            return Err(ParamsError::Empty);
        }

        let mut labels = HashSet::new();
        let mut members = Vec::new();
        loop {
            let label = self.parse_key()?;
            if !labels.insert(label) {
                return Err(ParamsError::DuplicateLabel(label.to_string()));
            }
            self.expect(b'=', "'='")?;

            let start = self.pos;
            let value = member(self)?;
            let raw = &self.input[start..self.pos];
            members.push((label.to_string(), value, raw));

            self.skip_ows();
            if self.is_done() {
                return Ok(members);
            }
            self.expect(b',', "','")?;
            self.skip_ows();
            if self.is_done() {
                return Err(ParamsError::UnexpectedEnd("dictionary member"));
            }
        }
    }

    fn parse_key(&mut self) -> Result<&'a str, ParamsError> {
        let start = self.pos;
        match self.peek() {
            Some(b'a'..=b'z' | b'*') => self.pos += 1,
            _ => return Err(self.unexpected("lower-case key")),
        }
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b'*')
        ) {
            self.pos += 1;
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_inner_list(&mut self) -> Result<Vec<String>, ParamsError> {
        self.expect(b'(', "'('")?;
        let mut items = Vec::new();
        loop {
            self.skip_sp();
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(b'"') => {
                    items.push(self.parse_string()?);
                    if !matches!(self.peek(), Some(b' ' | b')')) {
                        return Err(self.unexpected("' ' or ')'"));
                    }
                }
                _ => return Err(self.unexpected("quoted component name or ')'")),
            }
        }
    }

    fn parse_parameters(&mut self) -> Result<Vec<(String, ParamValue)>, ParamsError> {
        let mut params: Vec<(String, ParamValue)> = Vec::new();
        while self.peek() == Some(b';') {
            self.pos += 1;
            self.skip_sp();
            let key = self.parse_key()?;
            let value = if self.peek() == Some(b'=') {
                self.pos += 1;
                self.parse_bare_item()?
            } else {
                ParamValue::Boolean(true)
            };
            if params.iter().any(|(k, _)| k == key) {
                return Err(ParamsError::DuplicateParameter(key.to_string()));
            }
            params.push((key.to_string(), value));
        }
        Ok(params)
    }

    fn parse_bare_item(&mut self) -> Result<ParamValue, ParamsError> {
        match self.peek() {
            Some(b'"') => self.parse_string().map(ParamValue::String),
            Some(b'-' | b'0'..=b'9') => self.parse_integer().map(ParamValue::Integer),
            Some(b'?') => self.parse_boolean().map(ParamValue::Boolean),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'*') => {
                self.parse_token().map(|t| ParamValue::Token(t.to_string()))
            }
            _ => Err(self.unexpected("integer, string, token or boolean")),
        }
    }

    fn parse_string(&mut self) -> Result<String, ParamsError> {
        self.expect(b'"', "'\"'")?;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(ParamsError::UnexpectedEnd("closing '\"'")),
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c @ (b'"' | b'\\')) => {
                            out.push(c as char);
                            self.pos += 1;
                        }
                        _ => return Err(self.unexpected("escaped '\"' or '\\'")),
                    }
                }
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c @ 0x20..=0x7e) => {
                    out.push(c as char);
                    self.pos += 1;
                }
                Some(_) => return Err(self.unexpected("printable ASCII")),
            }
        }
    }

    fn parse_integer(&mut self) -> Result<i64, ParamsError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let digits = self.pos - digits_start;
        if digits == 0 {
            return Err(self.unexpected("digit"));
        }
        if digits > 15 {
            return Err(ParamsError::IntegerRange(start));
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| ParamsError::IntegerRange(start))
    }

    fn parse_boolean(&mut self) -> Result<bool, ParamsError> {
        self.expect(b'?', "'?'")?;
        match self.peek() {
            Some(b'1') => {
                self.pos += 1;
                Ok(true)
            }
            Some(b'0') => {
                self.pos += 1;
                Ok(false)
            }
            _ => Err(self.unexpected("'0' or '1'")),
        }
    }

    fn parse_token(&mut self) -> Result<&'a str, ParamsError> {
        let start = self.pos;
        match self.peek() {
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'*') => self.pos += 1,
            _ => return Err(self.unexpected("token")),
        }
        while matches!(
            self.peek(),
            Some(
                b'a'..=b'z'
                    | b'A'..=b'Z'
                    | b'0'..=b'9'
                    | b'!'
                    | b'#'
                    | b'$'
                    | b'%'
                    | b'&'
                    | b'\''
                    | b'*'
                    | b'+'
                    | b'-'
                    | b'.'
                    | b'^'
                    | b'_'
                    | b'`'
                    | b'|'
                    | b'~'
                    | b':'
                    | b'/'
            )
        ) {
            self.pos += 1;
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_byte_sequence(&mut self) -> Result<&'a str, ParamsError> {
        self.expect(b':', "':'")?;
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/' | b'=')
        ) {
            self.pos += 1;
        }
        let encoded = &self.input[start..self.pos];
        self.expect(b':', "closing ':'")?;
        Ok(encoded)
    }
}
