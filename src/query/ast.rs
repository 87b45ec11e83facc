//! Hand-written recursive-descent parser for the URL grammar (§4.7,
//! Glossary EBNF), in the same unassisted style as the teacher's
//! `Content-Length` header parsing in `dap/transport.rs::read_message`.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Context {
    Debugger,
    Session,
    Thread,
    Frame,
    Stack,
}

impl Context {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "debugger" => Some(Context::Debugger),
            "session" => Some(Context::Session),
            "thread" => Some(Context::Thread),
            "frame" => Some(Context::Frame),
            "stack" => Some(Context::Stack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Root {
    Abs,
    Rel { context: Context, offset: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Key(String),
    Index(usize),
    Filters(Vec<(String, FilterValue)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub edge: String,
    pub selectors: Vec<Selector>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Url {
    pub root: Root,
    pub segments: Vec<Segment>,
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

pub fn parse(input: &str) -> Result<Url> {
    let mut p = Parser { input: input.as_bytes(), pos: 0 };
    let root = p.parse_root()?;
    let mut segments = Vec::new();
    while p.pos < p.input.len() {
        segments.push(p.parse_segment()?);
    }
    Ok(Url { root, segments })
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn expect(&mut self, c: u8) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(Error::InvalidUrl(format!(
                "expected '{}' at position {}",
                c as char, self.pos
            )))
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if pred(c) {
                self.pos += 1;
            } else {
                break;
            }
        }
        std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("")
    }

    fn parse_root(&mut self) -> Result<Root> {
        match self.peek() {
            Some(b'/') => {
                self.bump();
                Ok(Root::Abs)
            }
            Some(b'@') => {
                self.bump();
                let name = self.take_while(|c| c.is_ascii_alphabetic());
                let context = Context::parse(name)
                    .ok_or_else(|| Error::InvalidUrl(format!("unknown context '{name}'")))?;
                let offset = match self.peek() {
                    Some(b'+') => {
                        self.bump();
                        self.parse_int()?
                    }
                    Some(b'-') => {
                        self.bump();
                        -self.parse_int()?
                    }
                    _ => 0,
                };
                Ok(Root::Rel { context, offset })
            }
            _ => Err(Error::InvalidUrl("url must start with '/' or '@'".to_string())),
        }
    }

    fn parse_int(&mut self) -> Result<i64> {
        let digits = self.take_while(|c| c.is_ascii_digit());
        digits
            .parse::<i64>()
            .map_err(|_| Error::InvalidUrl(format!("expected integer at position {}", self.pos)))
    }

    fn parse_segment(&mut self) -> Result<Segment> {
        self.expect(b'/')?;
        let edge = self
            .take_while(|c| c.is_ascii_alphanumeric() || c == b'_')
            .to_string();
        if edge.is_empty() {
            return Err(Error::InvalidUrl(format!("expected edge name at position {}", self.pos)));
        }
        let mut selectors = Vec::new();
        loop {
            match self.peek() {
                Some(b':') => {
                    self.bump();
                    let key = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'-' || c == b'.');
                    selectors.push(Selector::Key(key.to_string()));
                }
                Some(b'[') => {
                    self.bump();
                    let idx = self.parse_int()? as usize;
                    self.expect(b']')?;
                    selectors.push(Selector::Index(idx));
                }
                Some(b'(') => {
                    self.bump();
                    let mut filters = Vec::new();
                    loop {
                        filters.push(self.parse_filter()?);
                        match self.peek() {
                            Some(b',') => {
                                self.bump();
                            }
                            _ => break,
                        }
                    }
                    self.expect(b')')?;
                    selectors.push(Selector::Filters(filters));
                }
                _ => break,
            }
        }
        Ok(Segment { edge, selectors })
    }

    fn parse_filter(&mut self) -> Result<(String, FilterValue)> {
        let prop = self
            .take_while(|c| c.is_ascii_alphanumeric() || c == b'_')
            .to_string();
        self.expect(b'=')?;
        let value = self.parse_value()?;
        Ok((prop, value))
    }

    fn parse_value(&mut self) -> Result<FilterValue> {
        match self.peek() {
            Some(b'\'') | Some(b'"') => {
                let quote = self.bump().unwrap();
                let s = self.take_while(|c| c != quote);
                self.expect(quote)?;
                Ok(FilterValue::Str(s.to_string()))
            }
            Some(c) if c == b'-' || c.is_ascii_digit() => {
                let start = self.pos;
                if c == b'-' {
                    self.bump();
                }
                self.take_while(|c| c.is_ascii_digit());
                let s = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("0");
                s.parse::<i64>()
                    .map(FilterValue::Int)
                    .map_err(|_| Error::InvalidUrl(format!("bad integer literal '{s}'")))
            }
            _ => {
                let word = self.take_while(|c| c.is_ascii_alphabetic());
                match word {
                    "true" => Ok(FilterValue::Bool(true)),
                    "false" => Ok(FilterValue::Bool(false)),
                    other => Err(Error::InvalidUrl(format!("unrecognized filter value '{other}'"))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_an_absolute_path_with_a_key_selector() {
        let url = parse("/sessions:a1b2").unwrap();
        assert_eq!(url.root, Root::Abs);
        assert_eq!(url.segments.len(), 1);
        assert_eq!(url.segments[0].edge, "sessions");
        assert_eq!(url.segments[0].selectors, vec![Selector::Key("a1b2".to_string())]);
    }

    #[test]
    fn parses_index_and_filter_selectors_in_order() {
        let url = parse("/sessions/threads(state='stopped')[0]").unwrap();
        assert_eq!(url.segments.len(), 2);
        assert_eq!(
            url.segments[1].selectors,
            vec![
                Selector::Filters(vec![("state".to_string(), FilterValue::Str("stopped".to_string()))]),
                Selector::Index(0),
            ]
        );
    }

    #[test]
    fn parses_a_contextual_reference_with_an_offset() {
        let url = parse("@frame+2/scopes").unwrap();
        assert_eq!(url.root, Root::Rel { context: Context::Frame, offset: 2 });
        assert_eq!(url.segments[0].edge, "scopes");
    }

    #[test]
    fn rejects_an_unknown_context() {
        assert!(parse("@nonsense/scopes").is_err());
    }
}
