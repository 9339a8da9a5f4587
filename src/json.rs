//! RDF/JSON: `{ subject: { predicate: [ {type, value, datatype?, lang?} ] } }`.
//!
//! The same shape serves as a serialization and as the structured-document
//! patch, where each `(subject, predicate)` entry overwrites the objects held
//! under that key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LinkstoreError, Result};
use crate::graph::Graph;
use crate::parse::{is_blank_label, is_iri, is_language_tag};
use crate::term::{Literal, Term, Triple};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Uri,
    Literal,
    Bnode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    #[serde(rename = "type")]
    pub kind: Kind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl ObjectDescriptor {
    /// The term this descriptor stands for. Values that could not be written
    /// back out as Turtle are refused.
    pub fn into_term(self) -> Result<Term> {
        let term = match self.kind {
            Kind::Uri => Term::Iri(checked_iri(self.value)?),
            Kind::Bnode => {
                let label = self.value.strip_prefix("_:").unwrap_or(&self.value);
                Term::Blank(checked_label(label)?)
            }
            Kind::Literal => match (self.lang, self.datatype) {
                (Some(lang), _) if is_language_tag(&lang) => Term::Literal(Literal::tagged(self.value, lang)),
                (Some(lang), _) => {
                    return Err(LinkstoreError::BadRequest(format!("'{lang}' is not a language tag")));
                }
                (None, Some(datatype)) => Term::Literal(Literal::typed(self.value, checked_iri(datatype)?)),
                (None, None) => Term::Literal(Literal::plain(self.value)),
            },
        };
        Ok(term)
    }
    pub fn from_term(term: &Term) -> Self {
        match term {
            Term::Iri(iri) => Self { kind: Kind::Uri, value: iri.clone(), datatype: None, lang: None },
            Term::Blank(label) => Self { kind: Kind::Bnode, value: format!("_:{label}"), datatype: None, lang: None },
            Term::Literal(literal) => Self {
                kind: Kind::Literal,
                value: literal.lexical().to_string(),
                datatype: literal.datatype().map(str::to_string),
                lang: literal.language().map(str::to_string),
            },
        }
    }
}

fn checked_iri(iri: String) -> Result<String> {
    if is_iri(&iri) {
        Ok(iri)
    } else {
        Err(LinkstoreError::BadRequest(format!("'{iri}' is not a valid IRI")))
    }
}

fn checked_label(label: &str) -> Result<String> {
    if is_blank_label(label) {
        Ok(label.to_string())
    } else {
        Err(LinkstoreError::BadRequest(format!("'{label}' is not a valid blank node label")))
    }
}

fn subject_term(key: &str) -> Result<Term> {
    match key.strip_prefix("_:") {
        Some(label) => Ok(Term::Blank(checked_label(label)?)),
        None => Ok(Term::Iri(checked_iri(key.to_string())?)),
    }
}

fn subject_key(term: &Term) -> String {
    match term {
        Term::Blank(label) => format!("_:{label}"),
        Term::Iri(iri) => iri.clone(),
        other => other.to_string(),
    }
}

/// A structured-document patch: keyed overwrites in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyedPatch {
    pub entries: Vec<(Term, Term, Vec<Term>)>,
}

impl KeyedPatch {
    pub fn apply(self, graph: &mut Graph) {
        for (subject, predicate, objects) in self.entries {
            graph.replace_objects(subject, predicate, objects);
        }
    }
}

pub fn parse_patch(body: &[u8]) -> Result<KeyedPatch> {
    let document: Map<String, Value> = serde_json::from_slice(body)?;
    let mut patch = KeyedPatch::default();
    for (subject, predicates) in document {
        let Value::Object(predicates) = predicates else {
            return Err(LinkstoreError::BadRequest(format!("predicates of <{subject}> must be an object")));
        };
        for (predicate, objects) in predicates {
            let objects: Vec<ObjectDescriptor> = serde_json::from_value(objects)?;
            patch.entries.push((
                subject_term(&subject)?,
                Term::Iri(checked_iri(predicate)?),
                objects.into_iter().map(ObjectDescriptor::into_term).collect::<Result<_>>()?,
            ));
        }
    }
    Ok(patch)
}

pub fn parse_rdf_json(body: &[u8]) -> Result<Graph> {
    let patch = parse_patch(body)?;
    let mut graph = Graph::new();
    for (subject, predicate, objects) in patch.entries {
        for object in objects {
            graph.insert(Triple::new(subject.clone(), predicate.clone(), object));
        }
    }
    Ok(graph)
}

pub fn to_rdf_json(graph: &Graph) -> String {
    let mut document = Map::new();
    for (subject, predicates) in graph.subjects() {
        let mut entry = Map::new();
        for (predicate, objects) in predicates {
            let objects: Vec<ObjectDescriptor> = objects.iter().map(ObjectDescriptor::from_term).collect();
            entry.insert(subject_key(predicate), serde_json::json!(objects));
        }
        document.insert(subject_key(subject), Value::Object(entry));
    }
    Value::Object(document).to_string()
}
