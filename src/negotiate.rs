//! Content negotiation.
//!
//! Reads rank the `Accept` header against the serializations the store can
//! write, writes map the `Content-Type` header onto a payload kind.

use std::cmp::Ordering;

use crate::error::{LinkstoreError, Result};
use crate::graph::Graph;
use crate::json::parse_rdf_json;
use crate::parse::parse_turtle;

pub const TURTLE: &str = "text/turtle";
pub const NTRIPLES: &str = "application/n-triples";
pub const RDF_JSON: &str = "application/json";
pub const SPARQL_UPDATE: &str = "application/sparql-update";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Turtle,
    NTriples,
    RdfJson,
}

impl Format {
    /// In order of preference when the client does not care.
    pub const ALL: [Format; 3] = [Format::Turtle, Format::NTriples, Format::RdfJson];

    pub fn media_type(self) -> &'static str {
        match self {
            Format::Turtle => TURTLE,
            Format::NTriples => NTRIPLES,
            Format::RdfJson => RDF_JSON,
        }
    }
    pub fn from_media_type(media_type: &str) -> Option<Format> {
        match media_type {
            "text/turtle" | "application/turtle" | "application/x-turtle" | "text/n3" => Some(Format::Turtle),
            "application/n-triples" => Some(Format::NTriples),
            "application/json" | "application/rdf+json" => Some(Format::RdfJson),
            _ => None,
        }
    }
    /// N-Triples is a subset of Turtle and shares its parser.
    pub fn parse(self, body: &[u8]) -> Result<Graph> {
        match self {
            Format::Turtle | Format::NTriples => {
                let text = std::str::from_utf8(body)
                    .map_err(|e| LinkstoreError::BadRequest(format!("body is not UTF-8: {e}")))?;
                parse_turtle(text)
            }
            Format::RdfJson => parse_rdf_json(body),
        }
    }
}

/// What a write request carries, as told by its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Rdf(Format),
    SparqlUpdate,
}

/// `type/subtype` lowercased, without parameters.
pub fn essence(header: &str) -> String {
    header.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

#[derive(Debug)]
struct MediaRange {
    kind: String,
    subtype: String,
    quality: f32,
    position: usize,
}

impl MediaRange {
    /// 3 for an exact match, 2 for `type/*`, 1 for `*/*`, 0 for none.
    fn specificity(&self, media_type: &str) -> u8 {
        let (kind, subtype) = media_type.split_once('/').unwrap_or((media_type, ""));
        match (self.kind.as_str(), self.subtype.as_str()) {
            ("*", "*") => 1,
            (k, "*") if k == kind => 2,
            (k, s) if k == kind && s == subtype => 3,
            _ => 0,
        }
    }
}

fn parse_accept(header: &str) -> Vec<MediaRange> {
    let mut ranges = Vec::new();
    for (position, item) in header.split(',').enumerate() {
        let mut parts = item.split(';');
        let media_type = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let Some((kind, subtype)) = media_type.split_once('/') else {
            continue;
        };
        let mut quality = 1.0;
        for parameter in parts {
            if let Some((name, value)) = parameter.split_once('=') {
                if name.trim().eq_ignore_ascii_case("q") {
                    quality = value.trim().parse::<f32>().unwrap_or(0.0).clamp(0.0, 1.0);
                }
            }
        }
        ranges.push(MediaRange { kind: kind.to_string(), subtype: subtype.to_string(), quality, position });
    }
    ranges
}

/// Picks the serialization for a read. An absent `Accept` means the default.
pub fn negotiate_read(accept: Option<&str>) -> Result<Format> {
    let accept = match accept.map(str::trim) {
        None | Some("") => return Ok(Format::Turtle),
        Some(accept) => accept,
    };
    let ranges = parse_accept(accept);
    let mut best: Option<(f32, usize, Format)> = None;
    for format in Format::ALL {
        // the most specific range decides, later ranges lose ties
        let matched = ranges
            .iter()
            .filter(|range| range.specificity(format.media_type()) > 0)
            .max_by(|a, b| {
                a.specificity(format.media_type())
                    .cmp(&b.specificity(format.media_type()))
                    .then(b.position.cmp(&a.position))
            });
        let Some(range) = matched else { continue };
        if range.quality <= 0.0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((quality, position, _)) => match range.quality.partial_cmp(&quality) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => range.position < position,
                _ => false,
            },
        };
        if better {
            best = Some((range.quality, range.position, format));
        }
    }
    best.map(|(_, _, format)| format)
        .ok_or_else(|| LinkstoreError::NotAcceptable(format!("cannot serialize to any of '{accept}'")))
}

/// Maps the `Content-Type` of a write onto a payload kind.
pub fn negotiate_write(content_type: Option<&str>) -> Result<Payload> {
    let Some(content_type) = content_type else {
        return Err(LinkstoreError::UnsupportedMediaType("missing Content-Type".into()));
    };
    let media_type = essence(content_type);
    if media_type == SPARQL_UPDATE {
        return Ok(Payload::SparqlUpdate);
    }
    Format::from_media_type(&media_type)
        .map(Payload::Rdf)
        .ok_or_else(|| LinkstoreError::UnsupportedMediaType(media_type))
}
