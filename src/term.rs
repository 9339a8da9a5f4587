//! RDF terms and triples.
//!
//! Terms compare structurally: two IRIs are equal when their text is equal, two
//! literals when lexical form, datatype and language all agree. No base
//! resolution happens here, IRIs are kept exactly as they were written.

use std::fmt;

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#int";
pub const XSD_HEX_BINARY: &str = "http://www.w3.org/2001/XMLSchema#hexBinary";
pub const FOAF: &str = "http://xmlns.com/foaf/0.1/";
pub const CERT: &str = "http://www.w3.org/ns/auth/cert#";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    lexical: String,
    datatype: Option<String>,
    language: Option<String>,
}
impl Literal {
    pub fn plain(lexical: impl Into<String>) -> Self {
        Self { lexical: lexical.into(), datatype: None, language: None }
    }
    // xsd:string is the implicit datatype of a plain literal
    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        let datatype = if datatype == XSD_STRING { None } else { Some(datatype) };
        Self { lexical: lexical.into(), datatype, language: None }
    }
    pub fn tagged(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self { lexical: lexical.into(), datatype: None, language: Some(language.into().to_lowercase()) }
    }
    pub fn lexical(&self) -> &str {
        &self.lexical
    }
    pub fn datatype(&self) -> Option<&str> {
        self.datatype.as_deref()
    }
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal(Literal),
}
impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }
    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }
    pub fn literal(lexical: impl Into<String>) -> Self {
        Term::Literal(Literal::plain(lexical))
    }
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }
}

/// Characters an `<...>` IRI can only carry as a `\uXXXX` escape.
fn iri_needs_escape(c: char) -> bool {
    matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' | '\u{00}'..='\u{20}')
}

/// Writes an IRI body, escaping what the IRI syntax cannot hold.
fn escape_iri_into(out: &mut String, iri: &str) {
    for c in iri.chars() {
        if iri_needs_escape(c) {
            out.push_str(&format!("\\u{:04X}", c as u32));
        } else {
            out.push(c);
        }
    }
}

fn bracketed(iri: &str) -> String {
    let mut out = String::with_capacity(iri.len() + 2);
    out.push('<');
    escape_iri_into(&mut out, iri);
    out.push('>');
    out
}

/// Writes a string body with the escapes shared by Turtle and N-Triples.
pub fn escape_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            c => out.push(c),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => f.write_str(&bracketed(iri)),
            Term::Blank(label) => write!(f, "_:{label}"),
            Term::Literal(literal) => {
                let mut quoted = String::with_capacity(literal.lexical.len() + 2);
                quoted.push('"');
                escape_into(&mut quoted, &literal.lexical);
                quoted.push('"');
                if let Some(language) = &literal.language {
                    write!(f, "{quoted}@{language}")
                } else if let Some(datatype) = &literal.datatype {
                    write!(f, "{quoted}^^{}", bracketed(datatype))
                } else {
                    write!(f, "{quoted}")
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}
impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self { subject, predicate, object }
    }
}
impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}
