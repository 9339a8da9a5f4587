//! Writers for the supported RDF serializations.
//!
//! Turtle is produced as a sequence of chunks, one per subject block, so the
//! same writer backs both buffered and streamed delivery: buffering is just
//! concatenating the chunks.

use crate::graph::Graph;
use crate::json::to_rdf_json;
use crate::negotiate::Format;
use crate::term::{Term, Triple, RDF, RDF_TYPE};

pub fn turtle_header() -> String {
    format!("@prefix rdf: <{RDF}> .\n\n")
}

fn predicate(term: &Term) -> String {
    match term.as_iri() {
        Some(RDF_TYPE) => "a".to_string(),
        _ => term.to_string(),
    }
}

/// One subject block, terminated by a blank line.
fn subject_block(subject: &Term, predicates: &[(&Term, &[Term])]) -> String {
    let mut block = format!("{subject}\n");
    for (index, (p, objects)) in predicates.iter().enumerate() {
        block.push_str("    ");
        block.push_str(&predicate(p));
        block.push(' ');
        let objects: Vec<String> = objects.iter().map(Term::to_string).collect();
        block.push_str(&objects.join(", "));
        if index + 1 == predicates.len() {
            block.push_str(" .\n\n");
        } else {
            block.push_str(" ;\n");
        }
    }
    block
}

/// Turtle output split into the prefix header followed by one chunk per subject.
pub fn turtle_chunks(graph: &Graph) -> Vec<String> {
    let mut chunks = vec![turtle_header()];
    for (subject, predicates) in graph.subjects() {
        chunks.push(subject_block(subject, &predicates));
    }
    chunks
}

pub fn to_turtle(graph: &Graph) -> String {
    turtle_chunks(graph).concat()
}

pub fn ntriple(triple: &Triple) -> String {
    format!("{triple}\n")
}

/// N-Triples in insertion order. This is also the storage encoding of a Document.
pub fn to_ntriples(graph: &Graph) -> String {
    graph.triples().map(|triple| ntriple(&triple)).collect()
}

pub fn serialize(graph: &Graph, format: Format) -> String {
    match format {
        Format::Turtle => to_turtle(graph),
        Format::NTriples => to_ntriples(graph),
        Format::RdfJson => to_rdf_json(graph),
    }
}

type SubjectGroup = (Term, Vec<(Term, Vec<Term>)>);

/// Lazily formats an owned graph chunk by chunk, for streamed delivery.
/// Concatenating everything it yields gives exactly [`serialize`].
pub fn stream(graph: Graph, format: Format) -> Box<dyn Iterator<Item = String> + Send> {
    match format {
        Format::Turtle => {
            let groups: Vec<SubjectGroup> = graph
                .subjects()
                .into_iter()
                .map(|(subject, predicates)| {
                    let predicates = predicates
                        .into_iter()
                        .map(|(p, objects)| (p.clone(), objects.to_vec()))
                        .collect();
                    (subject.clone(), predicates)
                })
                .collect();
            let blocks = groups.into_iter().map(|(subject, predicates)| {
                let borrowed: Vec<(&Term, &[Term])> =
                    predicates.iter().map(|(p, objects)| (p, objects.as_slice())).collect();
                subject_block(&subject, &borrowed)
            });
            Box::new(std::iter::once(turtle_header()).chain(blocks))
        }
        Format::NTriples => Box::new(graph.into_triples().into_iter().map(|triple| ntriple(&triple))),
        Format::RdfJson => Box::new(std::iter::once(to_rdf_json(&graph))),
    }
}
