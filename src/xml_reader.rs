//! Streaming XML navigation.
//!
//! [`XmlReader`] turns a forward-only byte stream into a one-token-lookahead
//! stream of namespace-resolved [`Token`]s. Character data, CDATA sections and
//! entity references between two tags are coalesced into a single
//! [`Token::Text`]; comments, processing instructions and the XML declaration
//! are dropped. Empty elements are expanded into a start and an end token.
//!
//! The grammar primitives live on the [`XmlCursor`] trait so that the same
//! navigation vocabulary is available on the full stream and on the scoped
//! view handed to record data parsers (see [`crate::subtree`]).

use std::collections::VecDeque;
use std::fmt;
use std::io::{BufReader, Read};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::error::{XmlError, XmlResult};

/// An attribute on a start tag, with its namespace resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub namespace: String,
    pub local_name: String,
    pub value: String,
}

/// A start tag, with its namespace resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub namespace: String,
    pub local_name: String,
    pub attributes: Vec<Attribute>,
}

impl StartTag {
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace == namespace
    }

    /// Value of an unqualified attribute
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_empty() && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }
}

/// A significant unit of the token stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Start(StartTag),
    End {
        namespace: String,
        local_name: String,
    },
    Text(String),
    Eof,
}

impl Token {
    pub(crate) fn is_whitespace(&self) -> bool {
        matches!(self, Token::Text(text) if text.trim().is_empty())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Start(tag) => write!(f, "<{}>", tag.local_name),
            Token::End { local_name, .. } => write!(f, "</{}>", local_name),
            Token::Text(text) => {
                let text = text.trim();
                if text.chars().count() > 32 {
                    let head: String = text.chars().take(32).collect();
                    write!(f, "text '{}...'", head)
                } else {
                    write!(f, "text '{}'", text)
                }
            }
            Token::Eof => f.write_str("end of input"),
        }
    }
}

static EOF_TOKEN: Token = Token::Eof;

/// Grammar-aware navigation over a token stream.
///
/// Implementors supply lookahead, consumption and position; every protocol
/// primitive is built on those three. All primitives come in a required and
/// an optional flavor: absence of an optional element is reported as
/// `Ok(false)`/`Ok(None)`, never as an error.
pub trait XmlCursor {
    /// Look at the next token without consuming it
    fn peek(&mut self) -> XmlResult<&Token>;

    /// Consume the next token
    fn next_token(&mut self) -> XmlResult<Token>;

    /// Byte offset of the next token
    fn position(&self) -> u64;

    /// Consume whitespace-only character data
    fn skip_whitespace(&mut self) -> XmlResult<()> {
        while self.peek()?.is_whitespace() {
            self.next_token()?;
        }
        Ok(())
    }

    /// Check whether the next significant token is the start of `namespace:name`
    fn peek_start(&mut self, namespace: &str, name: &str) -> XmlResult<bool> {
        self.skip_whitespace()?;
        Ok(matches!(self.peek()?, Token::Start(tag) if tag.is(namespace, name)))
    }

    /// The next significant token, if it is a start tag
    fn peek_start_tag(&mut self) -> XmlResult<Option<StartTag>> {
        self.skip_whitespace()?;
        match self.peek()? {
            Token::Start(tag) => Ok(Some(tag.clone())),
            _ => Ok(None),
        }
    }

    /// Recognize the start of `namespace:name`.
    ///
    /// On a match the start tag is consumed, unless `keep_open` is set, in
    /// which case it stays the current token so its attributes can be read
    /// with [`XmlCursor::attribute`] before [`XmlCursor::consume_open_tag`].
    /// Anything else leaves the stream untouched and yields `false`, or
    /// `MissingElement` when `required`.
    fn match_start(
        &mut self,
        namespace: &str,
        name: &str,
        required: bool,
        keep_open: bool,
    ) -> XmlResult<bool> {
        if self.peek_start(namespace, name)? {
            if !keep_open {
                self.next_token()?;
            }
            return Ok(true);
        }
        if required {
            let found = self.peek()?.to_string();
            return Err(XmlError::MissingElement {
                namespace: namespace.to_string(),
                name: name.to_string(),
                found,
                position: self.position(),
            });
        }
        Ok(false)
    }

    /// Value of an unqualified attribute on a start tag held open by `match_start`
    fn attribute(&mut self, name: &str) -> XmlResult<Option<String>> {
        match self.peek()? {
            Token::Start(tag) => Ok(tag.attribute(name).map(str::to_string)),
            _ => Ok(None),
        }
    }

    /// Advance past a start tag held open by `match_start`
    fn consume_open_tag(&mut self) -> XmlResult<()> {
        let position = self.position();
        match self.next_token()? {
            Token::Start(_) => Ok(()),
            other => Err(XmlError::UnexpectedContent {
                name: "open tag".to_string(),
                found: other.to_string(),
                position,
            }),
        }
    }

    /// Consume up to and including the end tag of `namespace:name`.
    ///
    /// Nested elements are an error unless `skip_unknown` is set, in which
    /// case whole subtrees are skipped by depth counting.
    fn match_end(&mut self, namespace: &str, name: &str, skip_unknown: bool) -> XmlResult<()> {
        let mut depth = 0usize;
        loop {
            let position = self.position();
            match self.next_token()? {
                Token::Start(tag) => {
                    if !skip_unknown {
                        return Err(XmlError::UnexpectedContent {
                            name: name.to_string(),
                            found: format!("<{}>", tag.local_name),
                            position,
                        });
                    }
                    depth += 1;
                }
                Token::End {
                    namespace: ns,
                    local_name,
                } => {
                    if depth == 0 {
                        if local_name == name && ns == namespace {
                            return Ok(());
                        }
                        return Err(XmlError::MismatchedEndTag {
                            expected: name.to_string(),
                            found: local_name,
                            position,
                        });
                    }
                    depth -= 1;
                }
                Token::Text(text) => {
                    if !skip_unknown && !text.trim().is_empty() {
                        return Err(XmlError::UnexpectedContent {
                            name: name.to_string(),
                            found: Token::Text(text).to_string(),
                            position,
                        });
                    }
                }
                Token::Eof => return Err(XmlError::UnexpectedEof { position }),
            }
        }
    }

    /// Collect the raw character data up to the next tag
    fn read_raw_text(&mut self) -> XmlResult<String> {
        let mut content = String::new();
        loop {
            if !matches!(self.peek()?, Token::Text(_)) {
                break;
            }
            if let Token::Text(text) = self.next_token()? {
                content.push_str(&text);
            }
        }
        Ok(content)
    }

    /// Read the trimmed text content of a simple element.
    ///
    /// Returns `None` when the element is absent, or present but empty and
    /// not `required`.
    fn read_text(&mut self, namespace: &str, name: &str, required: bool) -> XmlResult<Option<String>> {
        if !self.match_start(namespace, name, required, false)? {
            return Ok(None);
        }
        let position = self.position();
        let content = self.read_raw_text()?;
        self.match_end(namespace, name, false)?;

        let trimmed = content.trim();
        if trimmed.is_empty() {
            if required {
                return Err(XmlError::EmptyContent {
                    name: name.to_string(),
                    position,
                });
            }
            return Ok(None);
        }
        Ok(Some(trimmed.to_string()))
    }

    /// Read a base-10 integer element, or `default` when it is absent
    fn read_integer(
        &mut self,
        namespace: &str,
        name: &str,
        required: bool,
        default: i64,
    ) -> XmlResult<i64> {
        self.skip_whitespace()?;
        let position = self.position();
        match self.read_text(namespace, name, required)? {
            None => Ok(default),
            Some(value) => value.parse::<i64>().map_err(|_| XmlError::InvalidNumber {
                name: name.to_string(),
                value,
                position,
            }),
        }
    }

    /// Read a non-negative count or position, `None` when it is absent
    fn read_count(&mut self, namespace: &str, name: &str, required: bool) -> XmlResult<Option<i64>> {
        self.skip_whitespace()?;
        let position = self.position();
        let Some(value) = self.read_text(namespace, name, required)? else {
            return Ok(None);
        };
        match value.parse::<i64>() {
            Ok(count) if count >= 0 => Ok(Some(count)),
            _ => Err(XmlError::InvalidNumber {
                name: name.to_string(),
                value,
                position,
            }),
        }
    }

    /// Skip the next element including its whole subtree
    fn skip_element(&mut self) -> XmlResult<()> {
        self.skip_whitespace()?;
        let position = self.position();
        match self.next_token()? {
            Token::Start(tag) => self.match_end(&tag.namespace, &tag.local_name, true),
            other => Err(XmlError::UnexpectedContent {
                name: "element".to_string(),
                found: other.to_string(),
                position,
            }),
        }
    }
}

/// Byte meter around the transport stream
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Forward-only, namespace-aware token stream over a byte source
pub struct XmlReader<R: Read> {
    reader: NsReader<BufReader<CountingReader<R>>>,
    buf: Vec<u8>,
    lookahead: VecDeque<(u64, Token)>,
    pending_text: Option<(u64, String)>,
    metered: bool,
    eof: bool,
}

impl<'a> XmlReader<&'a [u8]> {
    /// Reader over an in-memory document, e.g. a record delivered as an escaped string
    pub fn from_text(text: &'a str) -> Self {
        Self::new(text.as_bytes(), false)
    }
}

impl<R: Read> XmlReader<R> {
    /// Create a reader; `metered` enables [`XmlReader::byte_count`]
    pub fn new(source: R, metered: bool) -> Self {
        let counting = CountingReader {
            inner: source,
            count: 0,
        };
        let mut reader = NsReader::from_reader(BufReader::new(counting));
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = true;
        config.check_end_names = true;

        Self {
            reader,
            buf: Vec::new(),
            lookahead: VecDeque::new(),
            pending_text: None,
            metered,
            eof: false,
        }
    }

    /// Bytes consumed from the underlying source so far, if metering was requested
    pub fn byte_count(&self) -> Option<u64> {
        if self.metered {
            Some(self.reader.get_ref().get_ref().count)
        } else {
            None
        }
    }

    fn append_text(&mut self, position: u64, text: &str) {
        match &mut self.pending_text {
            Some((_, pending)) => pending.push_str(text),
            None => self.pending_text = Some((position, text.to_string())),
        }
    }

    fn flush_text(&mut self) {
        if let Some((position, text)) = self.pending_text.take() {
            self.lookahead.push_back((position, Token::Text(text)));
        }
    }

    fn offset(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Read events until at least one token is buffered
    fn fill(&mut self) -> XmlResult<()> {
        while self.lookahead.is_empty() {
            if self.eof {
                let position = self.offset();
                self.lookahead.push_back((position, Token::Eof));
                break;
            }

            let position = self.offset();
            match self.read_event(position)? {
                RawEvent::Start(tag) => {
                    self.flush_text();
                    self.lookahead.push_back((position, Token::Start(tag)));
                }
                RawEvent::Empty(tag) => {
                    let end = Token::End {
                        namespace: tag.namespace.clone(),
                        local_name: tag.local_name.clone(),
                    };
                    self.flush_text();
                    self.lookahead.push_back((position, Token::Start(tag)));
                    self.lookahead.push_back((position, end));
                }
                RawEvent::End {
                    namespace,
                    local_name,
                } => {
                    self.flush_text();
                    self.lookahead.push_back((
                        position,
                        Token::End {
                            namespace,
                            local_name,
                        },
                    ));
                }
                RawEvent::Text(text) => self.append_text(position, &text),
                RawEvent::Eof => {
                    self.eof = true;
                    self.flush_text();
                }
                RawEvent::Ignored => {}
            }
        }
        Ok(())
    }

    /// Pull one event from quick-xml and detach it from the read buffer
    fn read_event(&mut self, position: u64) -> XmlResult<RawEvent> {
        self.buf.clear();
        let (resolved, event) = match self.reader.read_resolved_event_into(&mut self.buf) {
            Ok(pair) => pair,
            Err(e) => return Err(malformed(position, e)),
        };

        let raw = match event {
            Event::Start(start) => {
                let namespace = namespace_uri(resolved, position)?;
                RawEvent::Start(start_tag(&self.reader, namespace, &start, position)?)
            }
            Event::Empty(start) => {
                let namespace = namespace_uri(resolved, position)?;
                RawEvent::Empty(start_tag(&self.reader, namespace, &start, position)?)
            }
            Event::End(end) => RawEvent::End {
                namespace: namespace_uri(resolved, position)?,
                local_name: utf8(end.local_name().as_ref(), position)?,
            },
            Event::Text(text) => {
                let raw = utf8(&text, position)?;
                let text = quick_xml::escape::unescape(&raw)
                    .map_err(|e| malformed(position, e))?
                    .into_owned();
                RawEvent::Text(text)
            }
            Event::CData(cdata) => RawEvent::Text(utf8(&cdata.into_inner(), position)?),
            Event::GeneralRef(reference) => {
                let name = utf8(&reference, position)?;
                let resolved = match name.strip_prefix('#') {
                    Some(code) => resolve_char_reference(code).map(String::from),
                    None => resolve_predefined_entity(&name).map(str::to_string),
                };
                match resolved {
                    Some(text) => RawEvent::Text(text),
                    None => {
                        return Err(XmlError::Malformed {
                            position,
                            details: format!("unresolvable entity reference '&{};'", name),
                        });
                    }
                }
            }
            Event::Eof => RawEvent::Eof,
            // comments, processing instructions, declaration, doctype
            _ => RawEvent::Ignored,
        };
        Ok(raw)
    }
}

/// A quick-xml event converted to owned data
enum RawEvent {
    Start(StartTag),
    Empty(StartTag),
    End {
        namespace: String,
        local_name: String,
    },
    Text(String),
    Eof,
    Ignored,
}

impl<R: Read> XmlCursor for XmlReader<R> {
    fn peek(&mut self) -> XmlResult<&Token> {
        self.fill()?;
        Ok(self
            .lookahead
            .front()
            .map(|(_, token)| token)
            .unwrap_or(&EOF_TOKEN))
    }

    fn next_token(&mut self) -> XmlResult<Token> {
        self.fill()?;
        let (_, token) = self
            .lookahead
            .pop_front()
            .unwrap_or((self.offset(), Token::Eof));
        if token == Token::Eof {
            // end of input is sticky
            let position = self.offset();
            self.lookahead.push_front((position, Token::Eof));
        }
        Ok(token)
    }

    fn position(&self) -> u64 {
        self.lookahead
            .front()
            .map(|(position, _)| *position)
            .or_else(|| self.pending_text.as_ref().map(|(position, _)| *position))
            .unwrap_or_else(|| self.offset())
    }
}

fn malformed(position: u64, err: impl fmt::Display) -> XmlError {
    XmlError::Malformed {
        position,
        details: err.to_string(),
    }
}

fn utf8(bytes: &[u8], position: u64) -> XmlResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| malformed(position, e))
}

fn namespace_uri(resolved: ResolveResult<'_>, position: u64) -> XmlResult<String> {
    match resolved {
        ResolveResult::Bound(ns) => utf8(ns.as_ref(), position),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) => Err(XmlError::Malformed {
            position,
            details: format!(
                "unknown namespace prefix '{}'",
                String::from_utf8_lossy(&prefix)
            ),
        }),
    }
}

fn start_tag<B>(
    reader: &NsReader<B>,
    namespace: String,
    start: &BytesStart<'_>,
    position: u64,
) -> XmlResult<StartTag> {
    let local_name = utf8(start.local_name().as_ref(), position)?;
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(position, e))?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let (ns, local) = reader.resolver().resolve_attribute(attr.key);
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(position, e))?
            .into_owned();
        attributes.push(Attribute {
            namespace: namespace_uri(ns, position)?,
            local_name: utf8(local.as_ref(), position)?,
            value,
        });
    }
    Ok(StartTag {
        namespace,
        local_name,
        attributes,
    })
}

fn resolve_char_reference(code: &str) -> Option<char> {
    let code_point = match code.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => code.parse::<u32>().ok()?,
    };
    char::from_u32(code_point)
}
