//! Sentence parsing for helper output
//!
//! Helpers answer every query with a line-oriented sentence stream:
//!
//! ```text
//! interface {value=usb-ext}{display=USB sniffer}
//! dlt {number=147}{name=USER0}{display=Demo frames}
//! arg {number=0}{call=--delay}{display=Delay}{type=integer}
//! value {arg=0}{value=5}{display=Five}{default=true}
//! ```
//!
//! The rest of the crate family only depends on [`SentenceParser`]; the
//! bundled [`SentenceTokenizer`] implements the grammar above.

use crate::error::{ExtcapError, ExtcapResult};
use crate::types::{ArgumentValue, ConfigurationArgument, LinkType};
use std::collections::BTreeMap;

/// Interface candidate as emitted by a helper, before ownership is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInterface {
    pub call: String,
    pub display: String,
}

/// Turns helper output into structured records
pub trait SentenceParser: Send + Sync {
    /// Parse `--extcap-interfaces` output
    fn parse_interfaces(&self, output: &str) -> ExtcapResult<Vec<ParsedInterface>>;

    /// Parse `--extcap-dlts` output
    fn parse_dlts(&self, output: &str) -> ExtcapResult<Vec<LinkType>>;

    /// Parse `--extcap-config` output
    fn parse_arguments(&self, output: &str) -> ExtcapResult<Vec<ConfigurationArgument>>;
}

/// One tokenized line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    /// 1-based line number in the helper output
    pub line: usize,
    pub keyword: String,
    pub fields: BTreeMap<String, String>,
}

impl Sentence {
    fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> ExtcapResult<&str> {
        self.get(key).ok_or_else(|| {
            ExtcapError::parse(
                self.line,
                format!("{} sentence is missing {{{}=...}}", self.keyword, key),
            )
        })
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> ExtcapResult<T> {
        let raw = self.require(key)?;
        raw.trim().parse().map_err(|_| {
            ExtcapError::parse(self.line, format!("{}={} is not a number", key, raw))
        })
    }
}

/// Default sentence grammar implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceTokenizer;

impl SentenceTokenizer {
    pub fn new() -> Self {
        Self
    }

    /// Split helper output into sentences. Blank lines are skipped.
    pub fn tokenize(&self, output: &str) -> ExtcapResult<Vec<Sentence>> {
        output
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| tokenize_line(idx + 1, line.trim()))
            .collect()
    }
}

fn tokenize_line(line_no: usize, line: &str) -> ExtcapResult<Sentence> {
    let keyword_end = line
        .find(|c: char| c.is_whitespace() || c == '{')
        .unwrap_or(line.len());
    let keyword = line[..keyword_end].to_string();
    if keyword.is_empty() {
        return Err(ExtcapError::parse(line_no, "sentence has no keyword"));
    }

    let mut fields = BTreeMap::new();
    let mut chars = line[keyword_end..].chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some('{') => {}
            Some(other) => {
                return Err(ExtcapError::parse(
                    line_no,
                    format!("unexpected '{}' outside of braces", other),
                ))
            }
        }

        let mut body = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        body.push(escaped);
                    }
                }
                '}' => {
                    closed = true;
                    break;
                }
                c => body.push(c),
            }
        }
        if !closed {
            return Err(ExtcapError::parse(line_no, "unterminated '{'"));
        }

        let (key, value) = body
            .split_once('=')
            .ok_or_else(|| ExtcapError::parse(line_no, format!("field '{}' has no '='", body)))?;
        fields.insert(key.trim().to_string(), value.to_string());
    }

    Ok(Sentence {
        line: line_no,
        keyword,
        fields,
    })
}

impl SentenceParser for SentenceTokenizer {
    fn parse_interfaces(&self, output: &str) -> ExtcapResult<Vec<ParsedInterface>> {
        let mut interfaces = Vec::new();
        for sentence in self.tokenize(output)? {
            if sentence.keyword != "interface" {
                continue;
            }
            let call = sentence.require("value")?.to_string();
            let display = sentence.get("display").unwrap_or(&call).to_string();
            interfaces.push(ParsedInterface { call, display });
        }
        Ok(interfaces)
    }

    fn parse_dlts(&self, output: &str) -> ExtcapResult<Vec<LinkType>> {
        let mut dlts = Vec::new();
        for sentence in self.tokenize(output)? {
            if sentence.keyword != "dlt" {
                continue;
            }
            let name = sentence.require("name")?.to_string();
            dlts.push(LinkType {
                dlt: sentence.number("number")?,
                description: sentence.get("display").unwrap_or(&name).to_string(),
                name,
            });
        }
        Ok(dlts)
    }

    fn parse_arguments(&self, output: &str) -> ExtcapResult<Vec<ConfigurationArgument>> {
        let mut args: Vec<ConfigurationArgument> = Vec::new();

        for mut sentence in self.tokenize(output)? {
            match sentence.keyword.as_str() {
                "arg" => {
                    let number = sentence.number("number")?;
                    let call = sentence.require("call")?.to_string();
                    let display = sentence.get("display").unwrap_or(&call).to_string();
                    let kind = sentence.get("type").unwrap_or("string").to_string();
                    for key in ["number", "call", "display", "type"] {
                        sentence.fields.remove(key);
                    }
                    args.push(ConfigurationArgument {
                        number,
                        call,
                        display,
                        kind,
                        properties: sentence.fields,
                        values: Vec::new(),
                    });
                }
                "value" => {
                    let number: u32 = sentence.number("arg")?;
                    let value = sentence.require("value")?.to_string();
                    let display = sentence.get("display").unwrap_or(&value).to_string();
                    let is_default = sentence
                        .get("default")
                        .is_some_and(|d| d.eq_ignore_ascii_case("true"));

                    let arg = args
                        .iter_mut()
                        .find(|a| a.number == number)
                        .ok_or_else(|| {
                            ExtcapError::parse(
                                sentence.line,
                                format!("value for undeclared arg {}", number),
                            )
                        })?;
                    arg.values.push(ArgumentValue {
                        value,
                        display,
                        is_default,
                    });
                }
                _ => {}
            }
        }

        Ok(args)
    }
}
