//! Linkstore – a Linked-Data resource server keeping RDF graphs as addressable documents.
//!
//! Every path below a tenant root is either a *document*, holding one graph of
//! triples, or a *container*, holding nothing but the fact that it exists and,
//! implicitly, the resources below it. Clients read and write graphs over HTTP
//! verbs:
//! * `GET`/`HEAD` serialize a document in the negotiated format.
//! * `PUT` replaces a graph, `POST` merges into it or applies an update.
//! * `PATCH` overwrites `(subject, predicate)` object lists or applies an update.
//! * `MKCOL` creates a container, `DELETE` removes a resource.
//!
//! ## Modules
//! * [`path`] – Maps host and path onto a tenant, a storage key and a URI.
//! * [`negotiate`] – `Accept` and `Content-Type` handling.
//! * [`term`] and [`graph`] – Triples and the insertion-ordered graph.
//! * [`parse`] – Turtle and SPARQL `INSERT DATA` / `DELETE DATA` (grammar in `rdf.pest`).
//! * [`serialize`] and [`json`] – Turtle, N-Triples and RDF/JSON output, plus the keyed patch.
//! * [`persist`] and [`store`] – SQLite rows per resource and the atomic graph mutations on top.
//! * [`dispatch`] – The per-request state machine and its verb table.
//! * [`identity`] and [`account`] – Client certificates minted from SPKAC requests,
//!   identity profiles and account availability.
//! * [`server`] – The axum router handing requests to the dispatcher.
//!
//! ## Persistence
//! The [`persist::Persistor`] keeps one row per resource. Documents store their
//! graph as N-Triples in insertion order, so reloading reproduces the order in
//! which objects are printed.
//!
//! ## Quick Start
//! ```
//! use axum::http::{header, Method};
//! use linkstore::config::Settings;
//! use linkstore::dispatch::{Dispatcher, LdRequest};
//! let dispatcher = Dispatcher::new(Settings::default()).unwrap();
//! let put = LdRequest::new(Method::PUT, "/notes")
//!     .header(header::CONTENT_TYPE, "text/turtle")
//!     .body("<a> <b> <c> .");
//! assert_eq!(dispatcher.handle(&put).status.as_u16(), 201);
//! let get = dispatcher.handle(&LdRequest::new(Method::GET, "/notes"));
//! assert!(get.into_text().contains("<b> <c>"));
//! ```

pub mod account;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod identity;
pub mod json;
pub mod negotiate;
pub mod parse;
pub mod path;
pub mod persist;
pub mod serialize;
pub mod server;
pub mod store;
pub mod term;

pub use error::{LinkstoreError, Result};
