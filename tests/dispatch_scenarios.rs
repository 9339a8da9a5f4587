use axum::http::{header, Method, StatusCode};
use linkstore::config::Settings;
use linkstore::dispatch::{decide, Action, Dispatcher, Facts, LdRequest, LdResponse, Target, Verb, TRIPLES};
use linkstore::negotiate::{Format, Payload};
use linkstore::LinkstoreError;

const TURTLE_ABC: &str = "@prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .\n\n<a>\n    <b> <c0>, <c1>, <c2> .\n\n";

fn dispatcher() -> Dispatcher {
    Dispatcher::new(Settings::default()).expect("dispatcher")
}

fn send(d: &Dispatcher, method: Method, path: &str, content_type: Option<&str>, body: &str) -> LdResponse {
    let mut request = LdRequest::new(method, path).host("example.org").body(body.to_string());
    if let Some(content_type) = content_type {
        request = request.header(header::CONTENT_TYPE, content_type);
    }
    d.handle(&request)
}

fn get(d: &Dispatcher, path: &str, accept: Option<&str>) -> LdResponse {
    let mut request = LdRequest::new(Method::GET, path).host("example.org");
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }
    d.handle(&request)
}

fn mkcol() -> Method {
    Method::from_bytes(b"MKCOL").unwrap()
}

// Scenarios 1 and 2: update language, then merges, then grouped Turtle output.
#[test]
fn update_then_merge_groups_objects_in_insertion_order() {
    let d = dispatcher();
    let r = send(&d, Method::POST, "/doc", Some("application/sparql-update"), "INSERT DATA { <a> <b> <c>, <c0> . }");
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.triples(), Some(2));

    let r = send(&d, Method::POST, "/doc", Some("application/sparql-update"), "DELETE DATA { <a> <b> <c> . }");
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.triples(), Some(1));

    let r = send(&d, Method::POST, "/doc", Some("text/turtle"), "<a> <b> <c1> .");
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.triples(), Some(2));
    let r = send(&d, Method::POST, "/doc", Some("text/turtle"), "<a> <b> <c2> .");
    assert_eq!(r.triples(), Some(3));

    let r = get(&d, "/doc", None);
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.header_str(&header::CONTENT_TYPE), Some("text/turtle"));
    assert_eq!(r.triples(), Some(3));
    assert_eq!(r.into_text(), TURTLE_ABC);
}

// Scenario 3: the structured patch replaces the object list of a key.
#[test]
fn keyed_patch_replaces_objects() {
    let d = dispatcher();
    send(&d, Method::POST, "/doc", Some("text/turtle"), "<a> <b> <c0>, <c1>, <c2> .");
    let patch = r#"{"a": {"b": [{"type": "uri", "value": "c"}]}}"#;
    let r = send(&d, Method::PATCH, "/doc", Some("application/json"), patch);
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.triples(), Some(1));
    let body = get(&d, "/doc", Some("application/n-triples")).into_text();
    assert_eq!(body, "<a> <b> <c> .\n");
}

#[test]
fn keyed_patch_creates_missing_document() {
    let d = dispatcher();
    let patch = r#"{"s": {"p": [{"type": "literal", "value": "hi", "lang": "en"}]}}"#;
    let r = send(&d, Method::PATCH, "/fresh", Some("application/json"), patch);
    assert_eq!(r.status, StatusCode::CREATED);
    assert_eq!(r.triples(), Some(1));
    let body = get(&d, "/fresh", Some("application/n-triples")).into_text();
    assert_eq!(body, "<s> <p> \"hi\"@en .\n");
}

// Scenario 4: PUT replaces everything.
#[test]
fn put_replaces_whole_graph() {
    let d = dispatcher();
    let r = send(&d, Method::PUT, "/doc", Some("text/turtle"), "<x> <y> <z> .");
    assert_eq!(r.status, StatusCode::CREATED);
    let r = send(&d, Method::PUT, "/doc", Some("text/turtle"), "<d> <e> <f> .");
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.triples(), Some(1));
    let body = get(&d, "/doc", Some("application/n-triples")).into_text();
    assert_eq!(body, "<d> <e> <f> .\n");
}

#[test]
fn failed_replace_keeps_prior_graph() {
    let d = dispatcher();
    send(&d, Method::PUT, "/doc", Some("text/turtle"), "<d> <e> <f> .");
    let r = send(&d, Method::PUT, "/doc", Some("text/turtle"), "<d> <e> ");
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.triples(), None);
    let body = get(&d, "/doc", Some("application/n-triples")).into_text();
    assert_eq!(body, "<d> <e> <f> .\n");
}

// Scenario 5: containers.
#[test]
fn collections_reject_graph_operations() {
    let d = dispatcher();
    send(&d, Method::PUT, "/doc", Some("text/turtle"), "<d> <e> <f> .");
    assert_eq!(send(&d, mkcol(), "/doc", None, "").status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(send(&d, mkcol(), "/dir", None, "").status, StatusCode::CREATED);
    assert_eq!(send(&d, mkcol(), "/dir", None, "").status, StatusCode::INTERNAL_SERVER_ERROR);
    let r = send(&d, Method::POST, "/dir", Some("text/turtle"), "<a> <b> <c> .");
    assert_eq!(r.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(get(&d, "/dir", None).status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(get(&d, "/dir", Some("image/png")).status, StatusCode::NOT_IMPLEMENTED);
}

#[test]
fn writing_below_a_path_creates_containers() {
    let d = dispatcher();
    let r = send(&d, Method::PUT, "/a/b/doc", Some("text/turtle"), "<d> <e> <f> .");
    assert_eq!(r.status, StatusCode::CREATED);
    assert_eq!(get(&d, "/a/b", None).status, StatusCode::NOT_IMPLEMENTED);
    // a document cannot hold children
    let r = send(&d, Method::PUT, "/a/b/doc/child", Some("text/turtle"), "<d> <e> <f> .");
    assert_eq!(r.status, StatusCode::INTERNAL_SERVER_ERROR);
    // nor can a non-empty container be removed
    assert_eq!(send(&d, Method::DELETE, "/a/b", None, "").status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(send(&d, Method::DELETE, "/a/b/doc", None, "").status, StatusCode::OK);
    assert_eq!(send(&d, Method::DELETE, "/a/b", None, "").status, StatusCode::OK);
}

#[test]
fn delete_is_not_repeatable() {
    let d = dispatcher();
    send(&d, Method::PUT, "/doc", Some("text/turtle"), "<d> <e> <f> .");
    assert_eq!(send(&d, Method::DELETE, "/doc", None, "").status, StatusCode::OK);
    assert_eq!(send(&d, Method::DELETE, "/doc", None, "").status, StatusCode::NOT_FOUND);
    assert_eq!(get(&d, "/doc", None).status, StatusCode::NOT_FOUND);
}

#[test]
fn root_delete_always_fails() {
    let d = dispatcher();
    assert_eq!(send(&d, Method::DELETE, "/", None, "").status, StatusCode::INTERNAL_SERVER_ERROR);
    send(&d, Method::PUT, "/doc", Some("text/turtle"), "<d> <e> <f> .");
    assert_eq!(send(&d, Method::DELETE, "/", None, "").status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn negotiation_failures() {
    let d = dispatcher();
    send(&d, Method::PUT, "/doc", Some("text/turtle"), "<d> <e> <f> .");
    assert_eq!(get(&d, "/doc", Some("image/png")).status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(get(&d, "/missing", Some("image/png")).status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(get(&d, "/missing", None).status, StatusCode::NOT_FOUND);
    let r = send(&d, Method::PUT, "/doc", Some("image/png"), "x");
    assert_eq!(r.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let r = send(&d, Method::PUT, "/doc", None, "<d> <e> <f> .");
    assert_eq!(r.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let r = send(&d, Method::PUT, "/doc", Some("application/sparql-update"), "INSERT DATA { <a> <b> <c> . }");
    assert_eq!(r.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let r = send(&d, Method::PATCH, "/doc", Some("text/turtle"), "<a> <b> <c> .");
    assert_eq!(r.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[test]
fn accept_header_picks_the_format() {
    let d = dispatcher();
    send(&d, Method::PUT, "/doc", Some("text/turtle"), "<a> <b> \"c\" .");
    let r = get(&d, "/doc", Some("text/html;q=0.9, application/n-triples;q=0.5, */*;q=0.1"));
    assert_eq!(r.header_str(&header::CONTENT_TYPE), Some("application/n-triples"));
    let r = get(&d, "/doc", Some("application/json"));
    assert_eq!(r.header_str(&header::CONTENT_TYPE), Some("application/json"));
    let json: serde_json::Value = serde_json::from_str(&r.into_text()).unwrap();
    assert_eq!(json["a"]["b"][0]["type"], "literal");
    assert_eq!(json["a"]["b"][0]["value"], "c");
}

#[test]
fn unknown_verb_is_not_allowed() {
    let d = dispatcher();
    let r = send(&d, Method::from_bytes(b"BREW").unwrap(), "/doc", None, "");
    assert_eq!(r.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[test]
fn invalid_paths_are_bad_requests() {
    let d = dispatcher();
    assert_eq!(get(&d, "/a/../b", None).status, StatusCode::BAD_REQUEST);
}

#[test]
fn preflight_echoes_origin_without_touching_the_store() {
    let d = dispatcher();
    let request = LdRequest::new(Method::OPTIONS, "/anything/at/all")
        .header(header::ORIGIN, "https://app.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "Content-Type, Slug");
    let r = d.handle(&request);
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.header_str(&header::ACCESS_CONTROL_ALLOW_ORIGIN), Some("https://app.example"));
    assert_eq!(r.header_str(&header::ACCESS_CONTROL_ALLOW_HEADERS), Some("Content-Type, Slug"));
    assert!(r.header_str(&header::ALLOW).is_some_and(|allow| allow.contains("MKCOL")));
    assert_eq!(r.into_text(), "");
    assert_eq!(d.store().kind("anything/at/all").unwrap(), None);
}

#[test]
fn origin_is_echoed_on_ordinary_responses() {
    let d = dispatcher();
    let request = LdRequest::new(Method::GET, "/missing").header(header::ORIGIN, "https://app.example");
    let r = d.handle(&request);
    assert_eq!(r.status, StatusCode::NOT_FOUND);
    assert_eq!(r.header_str(&header::ACCESS_CONTROL_ALLOW_ORIGIN), Some("https://app.example"));
}

#[test]
fn head_has_headers_but_no_body() {
    let d = dispatcher();
    send(&d, Method::PUT, "/doc", Some("text/turtle"), "<d> <e> <f> .");
    let r = d.handle(&LdRequest::new(Method::HEAD, "/doc"));
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.triples(), Some(1));
    assert!(r.header_str(&header::ETAG).is_some());
    assert!(r.header_str(&header::LAST_MODIFIED).is_some_and(|v| v.ends_with("GMT")));
    assert_eq!(r.into_text(), "");
}

#[test]
fn etag_follows_content() {
    let d = dispatcher();
    send(&d, Method::PUT, "/doc", Some("text/turtle"), "<d> <e> <f> .");
    let first = get(&d, "/doc", None).header_str(&header::ETAG).map(str::to_string);
    send(&d, Method::POST, "/doc", Some("text/turtle"), "<d> <e> <f> .");
    let same = get(&d, "/doc", None).header_str(&header::ETAG).map(str::to_string);
    send(&d, Method::POST, "/doc", Some("text/turtle"), "<d> <e> <g> .");
    let changed = get(&d, "/doc", None).header_str(&header::ETAG).map(str::to_string);
    assert_eq!(first, same);
    assert_ne!(first, changed);
}

#[test]
fn etag_differs_per_representation() {
    let d = dispatcher();
    send(&d, Method::PUT, "/doc", Some("text/turtle"), "<d> <e> <f> .");
    let etag = |accept| get(&d, "/doc", Some(accept)).header_str(&header::ETAG).map(str::to_string);
    let turtle = etag("text/turtle");
    let ntriples = etag("application/n-triples");
    assert!(turtle.is_some());
    assert_ne!(turtle, ntriples);
    assert_ne!(turtle, etag("application/json"));
    assert_eq!(turtle, etag("text/turtle"));
}

#[test]
fn escaped_iris_survive_storage() {
    let d = dispatcher();
    let r = send(&d, Method::PUT, "/doc", Some("text/turtle"), r"<a\u0020b> <p> <o> .");
    assert_eq!(r.status, StatusCode::CREATED);
    let r = get(&d, "/doc", Some("application/n-triples"));
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.into_text(), "<a\\u0020b> <p> <o> .\n");
    // the document stays writable
    let r = send(&d, Method::POST, "/doc", Some("text/turtle"), "<x> <y> <z> .");
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.triples(), Some(2));
}

#[test]
fn keyed_patch_with_bad_terms_leaves_the_document_alone() {
    let d = dispatcher();
    send(&d, Method::PUT, "/doc", Some("text/turtle"), "<a> <b> <c> .");
    let before = get(&d, "/doc", Some("application/n-triples")).into_text();
    for patch in [
        r#"{"a": {"b": [{"type": "uri", "value": "c> <evil"}]}}"#,
        r#"{"a> <x": {"b": []}}"#,
        r#"{"a": {"b c": []}}"#,
        r#"{"a": {"b": [{"type": "bnode", "value": "_:not a label"}]}}"#,
        r#"{"a": {"b": [{"type": "literal", "value": "v", "lang": "en gb"}]}}"#,
        r#"{"a": {"b": [{"type": "literal", "value": "v", "datatype": "x>"}]}}"#,
    ] {
        let r = send(&d, Method::PATCH, "/doc", Some("application/json"), patch);
        assert_eq!(r.status, StatusCode::BAD_REQUEST, "{patch}");
    }
    let r = get(&d, "/doc", Some("application/n-triples"));
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.into_text(), before);
}

#[test]
fn streamed_and_buffered_bodies_are_identical() {
    let buffered = dispatcher();
    let streamed = Dispatcher::new(Settings { stream: true, ..Settings::default() }).unwrap();
    let body = "@prefix ex: <http://example.org/> .\n\
                ex:s a ex:Thing ; ex:name \"Thing\"@en, \"Ding\"@de ; ex:size 3 .\n\
                ex:t ex:knows ex:s, [ ex:name \"anon\" ] .";
    for d in [&buffered, &streamed] {
        send(d, Method::PUT, "/doc", Some("text/turtle"), body);
    }
    for accept in ["text/turtle", "application/n-triples", "application/json"] {
        let a = get(&buffered, "/doc", Some(accept)).into_text();
        let b = get(&streamed, "/doc", Some(accept)).into_text();
        assert_eq!(a, b, "{accept}");
    }
}

#[test]
fn virtual_hosts_keep_tenants_apart() {
    let d = Dispatcher::new(Settings { vhosts: true, ..Settings::default() }).unwrap();
    let put = LdRequest::new(Method::PUT, "/doc")
        .host("alice.example.org:8443")
        .header(header::CONTENT_TYPE, "text/turtle")
        .body("<a> <b> <c> .");
    assert_eq!(d.handle(&put).status, StatusCode::CREATED);
    let bob = LdRequest::new(Method::GET, "/doc").host("bob.example.org");
    assert_eq!(d.handle(&bob).status, StatusCode::NOT_FOUND);
    let alice = LdRequest::new(Method::GET, "/doc").host("ALICE.example.org");
    assert_eq!(d.handle(&alice).status, StatusCode::OK);
}

#[test]
fn decision_table_is_exhaustive_for_writes() {
    let facts = |verb, target, payload| Facts { verb, target, root: false, payload };
    let turtle = Some(Payload::Rdf(Format::Turtle));
    assert_eq!(decide(&facts(Verb::Post, Target::Missing, turtle)).unwrap(), Action::Merge(Format::Turtle));
    assert_eq!(decide(&facts(Verb::Put, Target::Document, turtle)).unwrap(), Action::Replace(Format::Turtle));
    assert_eq!(
        decide(&facts(Verb::Patch, Target::Document, Some(Payload::SparqlUpdate))).unwrap(),
        Action::Update
    );
    assert!(matches!(
        decide(&facts(Verb::Put, Target::Container, turtle)),
        Err(LinkstoreError::Conflict(_))
    ));
    assert!(matches!(
        decide(&facts(Verb::Get, Target::Container, None)),
        Err(LinkstoreError::NotImplemented(_))
    ));
    let root = Facts { verb: Verb::Delete, target: Target::Missing, root: true, payload: None };
    assert!(matches!(decide(&root), Err(LinkstoreError::Conflict(_))));
    assert_eq!(decide(&facts(Verb::Options, Target::Container, None)).unwrap(), Action::Preflight);
}

#[test]
fn triples_header_name() {
    let d = dispatcher();
    let r = send(&d, Method::PUT, "/doc", Some("text/turtle"), "<a> <b> <c>, <d> .");
    assert_eq!(r.headers.get(TRIPLES).and_then(|v| v.to_str().ok()), Some("2"));
}
