//! Parsers for Turtle (and thereby N-Triples) and the `INSERT DATA` /
//! `DELETE DATA` subset of SPARQL Update. Grammar details live in `rdf.pest`.

use std::collections::HashMap;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use tracing::debug;

use crate::error::{LinkstoreError, Result};
use crate::graph::Graph;
use crate::term::{Literal, Term, Triple, RDF_TYPE, XSD_BOOLEAN, XSD_DECIMAL, XSD_DOUBLE, XSD_INTEGER};

#[derive(Parser)]
#[grammar = "rdf.pest"]
pub struct RdfParser;

/// The parsed form of an update request. Every delete is matched against the
/// graph as it was before the request, inserts are applied afterwards.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Update {
    pub delete: Vec<Triple>,
    pub insert: Vec<Triple>,
}

pub fn parse_turtle(input: &str) -> Result<Graph> {
    let document = RdfParser::parse(Rule::turtle_document, input)?
        .next()
        .ok_or_else(|| LinkstoreError::Internal("empty parse tree".into()))?;
    let mut reader = Reader::default();
    let mut triples = Vec::new();
    for pair in document.into_inner() {
        match pair.as_rule() {
            Rule::triples => reader.triples(pair, &mut triples)?,
            Rule::EOI => (),
            _ => reader.directive(pair)?,
        }
    }
    debug!(triples = triples.len(), "parsed turtle");
    Ok(Graph::from_triples(triples))
}

pub fn parse_update(input: &str) -> Result<Update> {
    let request = RdfParser::parse(Rule::update_request, input)?
        .next()
        .ok_or_else(|| LinkstoreError::Internal("empty parse tree".into()))?;
    let mut reader = Reader::default();
    let mut update = Update::default();
    for pair in request.into_inner() {
        match pair.as_rule() {
            Rule::prologue => {
                for directive in pair.into_inner() {
                    reader.directive(directive)?;
                }
            }
            Rule::insert_data => reader.quad_data(pair, &mut update.insert)?,
            Rule::delete_data => reader.quad_data(pair, &mut update.delete)?,
            Rule::EOI => (),
            _ => return Err(unexpected(&pair)),
        }
    }
    debug!(insert = update.insert.len(), delete = update.delete.len(), "parsed update");
    Ok(update)
}

/// Whether all of `input` matches `rule`.
fn matches_rule(rule: Rule, input: &str) -> bool {
    RdfParser::parse(rule, input)
        .ok()
        .and_then(|mut pairs| pairs.next())
        .is_some_and(|pair| pair.as_str().len() == input.len())
}

/// Text that can stand between `<` and `>`.
pub fn is_iri(iri: &str) -> bool {
    matches_rule(Rule::IRIREF, &format!("<{iri}>"))
}

/// A label that can follow `_:`.
pub fn is_blank_label(label: &str) -> bool {
    matches_rule(Rule::BLANK_NODE_LABEL, &format!("_:{label}"))
}

pub fn is_language_tag(tag: &str) -> bool {
    matches_rule(Rule::LANGTAG, &format!("@{tag}"))
}

fn unexpected(pair: &Pair<Rule>) -> LinkstoreError {
    LinkstoreError::Internal(format!("unexpected {:?} in parse tree", pair.as_rule()))
}

fn child<'i>(pair: Pair<'i, Rule>) -> Result<Pair<'i, Rule>> {
    let rule = pair.as_rule();
    pair.into_inner()
        .next()
        .ok_or_else(|| LinkstoreError::Internal(format!("{rule:?} has no content")))
}

#[derive(Default)]
struct Reader {
    prefixes: HashMap<String, String>,
    base: Option<String>,
    anonymous: usize,
}

impl Reader {
    fn directive(&mut self, pair: Pair<Rule>) -> Result<()> {
        match pair.as_rule() {
            Rule::prefix_id | Rule::sparql_prefix => {
                let mut inner = pair.into_inner();
                let (Some(ns), Some(iri)) = (inner.next(), inner.next()) else {
                    return Err(LinkstoreError::BadRequest("incomplete prefix declaration".into()));
                };
                let prefix = ns.as_str().trim_end_matches(':').to_string();
                let iri = iriref(iri)?;
                self.prefixes.insert(prefix, iri);
            }
            Rule::base | Rule::sparql_base => {
                self.base = Some(iriref(child(pair)?)?);
            }
            _ => return Err(unexpected(&pair)),
        }
        Ok(())
    }

    fn quad_data(&mut self, pair: Pair<Rule>, out: &mut Vec<Triple>) -> Result<()> {
        for data in pair.into_inner() {
            for triples in data.into_inner() {
                self.triples(triples, out)?;
            }
        }
        Ok(())
    }

    fn triples(&mut self, pair: Pair<Rule>, out: &mut Vec<Triple>) -> Result<()> {
        let mut inner = pair.into_inner();
        let Some(first) = inner.next() else {
            return Ok(());
        };
        let subject = match first.as_rule() {
            Rule::subject => self.subject(first)?,
            Rule::blank_node_property_list => self.property_list(first, out)?,
            _ => return Err(unexpected(&first)),
        };
        if let Some(list) = inner.next() {
            self.predicate_object_list(&subject, list, out)?;
        }
        Ok(())
    }

    fn predicate_object_list(&mut self, subject: &Term, pair: Pair<Rule>, out: &mut Vec<Triple>) -> Result<()> {
        let mut inner = pair.into_inner();
        while let Some(verb) = inner.next() {
            let predicate = self.verb(verb)?;
            let Some(objects) = inner.next() else {
                return Err(LinkstoreError::BadRequest("predicate without objects".into()));
            };
            for object in objects.into_inner() {
                let object = self.object(object, out)?;
                out.push(Triple::new(subject.clone(), predicate.clone(), object));
            }
        }
        Ok(())
    }

    fn property_list(&mut self, pair: Pair<Rule>, out: &mut Vec<Triple>) -> Result<Term> {
        let node = self.fresh_blank();
        self.predicate_object_list(&node, child(pair)?, out)?;
        Ok(node)
    }

    fn fresh_blank(&mut self) -> Term {
        self.anonymous += 1;
        Term::blank(format!("genid{}", self.anonymous))
    }

    fn verb(&self, pair: Pair<Rule>) -> Result<Term> {
        let inner = child(pair)?;
        match inner.as_rule() {
            Rule::rdf_type => Ok(Term::iri(RDF_TYPE)),
            Rule::iri => Ok(Term::Iri(self.iri(inner)?)),
            _ => Err(unexpected(&inner)),
        }
    }

    fn subject(&mut self, pair: Pair<Rule>) -> Result<Term> {
        let inner = child(pair)?;
        match inner.as_rule() {
            Rule::iri => Ok(Term::Iri(self.iri(inner)?)),
            Rule::blank_node => self.blank_node(inner),
            _ => Err(unexpected(&inner)),
        }
    }

    fn object(&mut self, pair: Pair<Rule>, out: &mut Vec<Triple>) -> Result<Term> {
        let inner = child(pair)?;
        match inner.as_rule() {
            Rule::iri => Ok(Term::Iri(self.iri(inner)?)),
            Rule::blank_node => self.blank_node(inner),
            Rule::blank_node_property_list => self.property_list(inner, out),
            Rule::literal => self.literal(inner),
            _ => Err(unexpected(&inner)),
        }
    }

    fn blank_node(&mut self, pair: Pair<Rule>) -> Result<Term> {
        let inner = child(pair)?;
        match inner.as_rule() {
            Rule::BLANK_NODE_LABEL => Ok(Term::blank(&inner.as_str()[2..])),
            Rule::ANON => Ok(self.fresh_blank()),
            _ => Err(unexpected(&inner)),
        }
    }

    fn iri(&self, pair: Pair<Rule>) -> Result<String> {
        let inner = child(pair)?;
        match inner.as_rule() {
            Rule::IRIREF => iriref(inner),
            Rule::prefixed_name => {
                let name = child(inner)?.as_str();
                let (prefix, local) = name.split_once(':').unwrap_or((name, ""));
                let namespace = self.prefixes.get(prefix).ok_or_else(|| {
                    LinkstoreError::BadRequest(format!("undefined prefix '{prefix}:'"))
                })?;
                Ok(format!("{namespace}{}", unescape_local(local)))
            }
            _ => Err(unexpected(&inner)),
        }
    }

    fn literal(&self, pair: Pair<Rule>) -> Result<Term> {
        let inner = child(pair)?;
        let literal = match inner.as_rule() {
            Rule::rdf_literal => {
                let mut parts = inner.into_inner();
                let Some(string) = parts.next() else {
                    return Err(LinkstoreError::BadRequest("literal without a value".into()));
                };
                let lexical = unescape(child(string)?.as_str())?;
                match parts.next() {
                    None => Literal::plain(lexical),
                    Some(tag) if tag.as_rule() == Rule::LANGTAG => Literal::tagged(lexical, &tag.as_str()[1..]),
                    Some(datatype) => Literal::typed(lexical, self.iri(datatype)?),
                }
            }
            Rule::numeric_literal => {
                let number = child(inner)?;
                let datatype = match number.as_rule() {
                    Rule::INTEGER => XSD_INTEGER,
                    Rule::DECIMAL => XSD_DECIMAL,
                    _ => XSD_DOUBLE,
                };
                Literal::typed(number.as_str(), datatype)
            }
            Rule::boolean_literal => Literal::typed(inner.as_str(), XSD_BOOLEAN),
            _ => return Err(unexpected(&inner)),
        };
        Ok(Term::Literal(literal))
    }
}

fn iriref(pair: Pair<Rule>) -> Result<String> {
    let inner = child(pair)?;
    unescape(inner.as_str())
}

fn unescape_local(local: &str) -> String {
    let mut out = String::with_capacity(local.len());
    let mut chars = local.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Resolves string escapes (`\n`, `\"`, ...) and `\u`/`\U` code points.
pub fn unescape(value: &str) -> Result<String> {
    if !value.contains('\\') {
        return Ok(value.to_string());
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{08}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{0C}'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(u @ ('u' | 'U')) => {
                let width = if u == 'u' { 4 } else { 8 };
                let digits: String = chars.by_ref().take(width).collect();
                let code = u32::from_str_radix(&digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| LinkstoreError::BadRequest(format!("invalid code point \\{u}{digits}")))?;
                out.push(code);
            }
            other => {
                return Err(LinkstoreError::BadRequest(format!("invalid escape \\{}", other.unwrap_or(' '))));
            }
        }
    }
    Ok(out)
}
