//! Scoped view onto one element.
//!
//! A [`SubtreeReader`] either covers the content of the element the cursor is
//! currently inside ([`SubtreeReader::new`]) or exactly the next element
//! including its tags ([`SubtreeReader::element`]). It counts nesting
//! relative to where it was created and reports [`Token::Eof`] at its
//! boundary, so a parser handed the view can treat it as the whole document
//! and cannot read past it. Enclosing end tags are left for the caller to
//! consume on the underlying cursor, after [`SubtreeReader::finish`] has
//! skipped whatever the parser left unread.

use crate::error::XmlResult;
use crate::xml_reader::{Token, XmlCursor};

static BOUNDARY: Token = Token::Eof;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Everything up to the enclosing end tag
    Content,
    /// One element, start tag through end tag
    Element,
}

pub struct SubtreeReader<'a> {
    inner: &'a mut dyn XmlCursor,
    scope: Scope,
    depth: usize,
    entered: bool,
}

impl<'a> SubtreeReader<'a> {
    /// Scope `inner` to the content of the element it is currently inside
    pub fn new(inner: &'a mut dyn XmlCursor) -> Self {
        Self::with_scope(inner, Scope::Content)
    }

    /// Scope `inner` to the next element, which the caller has peeked
    pub fn element(inner: &'a mut dyn XmlCursor) -> Self {
        Self::with_scope(inner, Scope::Element)
    }

    fn with_scope(inner: &'a mut dyn XmlCursor, scope: Scope) -> Self {
        Self {
            inner,
            scope,
            depth: 0,
            entered: false,
        }
    }

    /// Nesting depth relative to the scope's starting point
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Consume everything left inside the scope.
    ///
    /// Afterwards the underlying cursor sits right at the boundary. Returns
    /// whether anything other than whitespace had to be skipped.
    pub fn finish(&mut self) -> XmlResult<bool> {
        let mut skipped = false;
        loop {
            match self.next_token()? {
                Token::Eof => return Ok(skipped),
                token if token.is_whitespace() => {}
                _ => skipped = true,
            }
        }
    }

    fn at_boundary(&mut self) -> XmlResult<bool> {
        if self.depth > 0 {
            return Ok(false);
        }
        if self.scope == Scope::Element && self.entered {
            return Ok(true);
        }
        Ok(matches!(self.inner.peek()?, Token::End { .. } | Token::Eof))
    }
}

impl XmlCursor for SubtreeReader<'_> {
    fn peek(&mut self) -> XmlResult<&Token> {
        if self.at_boundary()? {
            return Ok(&BOUNDARY);
        }
        self.inner.peek()
    }

    fn next_token(&mut self) -> XmlResult<Token> {
        if self.at_boundary()? {
            return Ok(Token::Eof);
        }
        let token = self.inner.next_token()?;
        match token {
            Token::Start(_) => {
                self.entered = true;
                self.depth += 1;
            }
            Token::End { .. } => self.depth -= 1,
            _ => {}
        }
        Ok(token)
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }
}
