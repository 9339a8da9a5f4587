//! The per-request state machine: resolve the path, negotiate the format,
//! execute against the store or the account registry, respond.
//!
//! What a request may do is decided by [`decide`] from the facts gathered
//! about it, so the verb/status mapping lives in one table. Errors from any
//! step short-circuit to [`status_for`], the only place that maps failures
//! onto status codes.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::{debug, info, warn};

use crate::account::{AccountRegistry, CertificateRequest};
use crate::config::Settings;
use crate::error::{LinkstoreError, Result};
use crate::identity::Issuer;
use crate::json::parse_patch;
use crate::negotiate::{negotiate_read, negotiate_write, Format, Payload, NTRIPLES, RDF_JSON, SPARQL_UPDATE, TURTLE};
use crate::parse::parse_update;
use crate::path::{PathInfo, Resolver};
use crate::persist::ResourceKind;
use crate::serialize::{serialize, stream};
use crate::store::{Store, Written};

pub const TRIPLES: HeaderName = HeaderName::from_static("triples");
pub const MS_AUTHOR_VIA: HeaderName = HeaderName::from_static("ms-author-via");
pub const ACCEPT_PATCH: HeaderName = HeaderName::from_static("accept-patch");
pub const ACCEPT_POST: HeaderName = HeaderName::from_static("accept-post");

const ALLOWED: &str = "OPTIONS, HEAD, GET, POST, PUT, PATCH, DELETE, MKCOL";
const EXPOSED: &str = "Triples, ETag, Last-Modified, Allow, Accept-Patch, Accept-Post, MS-Author-Via";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    MakeCollection,
    Options,
    Other(String),
}

impl From<&Method> for Verb {
    fn from(method: &Method) -> Self {
        match method.as_str() {
            "GET" => Verb::Get,
            "HEAD" => Verb::Head,
            "POST" => Verb::Post,
            "PUT" => Verb::Put,
            "PATCH" => Verb::Patch,
            "DELETE" => Verb::Delete,
            "MKCOL" => Verb::MakeCollection,
            "OPTIONS" => Verb::Options,
            other => Verb::Other(other.to_string()),
        }
    }
}

impl Verb {
    fn carries_body(&self) -> bool {
        matches!(self, Verb::Post | Verb::Put | Verb::Patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Missing,
    Document,
    Container,
}

impl From<Option<ResourceKind>> for Target {
    fn from(kind: Option<ResourceKind>) -> Self {
        match kind {
            None => Target::Missing,
            Some(ResourceKind::Document) => Target::Document,
            Some(ResourceKind::Container) => Target::Container,
        }
    }
}

/// Everything the decision depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facts {
    pub verb: Verb,
    pub target: Target,
    pub root: bool,
    /// The negotiated write payload, for verbs that carry a body.
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Preflight,
    Read,
    Merge(Format),
    Replace(Format),
    Update,
    KeyedPatch,
    Remove,
    MakeCollection,
}

/// The verb table. Read negotiation is settled before this is consulted, write
/// negotiation is an input.
pub fn decide(facts: &Facts) -> Result<Action> {
    use Action as A;
    use Target::{Container, Document, Missing};
    use Verb as V;

    let Facts { verb, target, root, payload } = facts;
    match (verb, target, payload) {
        (V::Options, _, _) => Ok(A::Preflight),
        (V::Other(method), _, _) => Err(LinkstoreError::MethodNotAllowed(method.clone())),

        (V::Get | V::Head, Container, _) => Err(LinkstoreError::NotImplemented("container listing".into())),
        (V::Get | V::Head, Missing, _) => Err(LinkstoreError::NotFound("no such resource".into())),
        (V::Get | V::Head, Document, _) => Ok(A::Read),

        (V::Delete, _, _) if *root => Err(LinkstoreError::Conflict("the root cannot be deleted".into())),
        (V::Delete, Missing, _) => Err(LinkstoreError::NotFound("no such resource".into())),
        (V::Delete, Document | Container, _) => Ok(A::Remove),

        (V::MakeCollection, Missing, _) => Ok(A::MakeCollection),
        (V::MakeCollection, Document, _) => Err(LinkstoreError::Conflict("a document exists at this path".into())),
        (V::MakeCollection, Container, _) => Err(LinkstoreError::Conflict("the container already exists".into())),

        (V::Post | V::Put | V::Patch, Container, _) => {
            Err(LinkstoreError::Conflict("containers hold no graph".into()))
        }
        (V::Post | V::Put | V::Patch, _, None) => {
            Err(LinkstoreError::UnsupportedMediaType("missing Content-Type".into()))
        }
        (V::Post, _, Some(Payload::Rdf(format))) => Ok(A::Merge(*format)),
        (V::Post | V::Patch, _, Some(Payload::SparqlUpdate)) => Ok(A::Update),
        (V::Put, _, Some(Payload::Rdf(format))) => Ok(A::Replace(*format)),
        (V::Put, _, Some(Payload::SparqlUpdate)) => {
            Err(LinkstoreError::UnsupportedMediaType(format!("{SPARQL_UPDATE} cannot replace a graph")))
        }
        (V::Patch, _, Some(Payload::Rdf(Format::RdfJson))) => Ok(A::KeyedPatch),
        (V::Patch, _, Some(Payload::Rdf(format))) => Err(LinkstoreError::UnsupportedMediaType(format!(
            "{} is not a patch format",
            format.media_type()
        ))),
    }
}

pub fn status_for(error: &LinkstoreError) -> StatusCode {
    match error {
        LinkstoreError::InvalidPath(_) | LinkstoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
        LinkstoreError::NotFound(_) => StatusCode::NOT_FOUND,
        LinkstoreError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        LinkstoreError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
        LinkstoreError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        LinkstoreError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        LinkstoreError::Conflict(_)
        | LinkstoreError::Persistence(_)
        | LinkstoreError::Config(_)
        | LinkstoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A request as the dispatcher sees it, detached from the transport.
#[derive(Debug, Clone)]
pub struct LdRequest {
    pub method: Method,
    pub host: Option<String>,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl LdRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, host: None, path: path.into(), headers: HeaderMap::new(), body: Bytes::new() }
    }
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
    /// Adds a header; values that are not valid header text are ignored.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub enum Body {
    Empty,
    Full(String),
    /// Serialized chunks, produced as the transport pulls them.
    Stream(Box<dyn Iterator<Item = String> + Send>),
}

pub struct LdResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl LdResponse {
    fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Body::Empty }
    }
    fn error(error: &LinkstoreError) -> Self {
        let mut response = Self::new(status_for(error));
        response.set(header::CONTENT_TYPE, PLAIN_TEXT);
        response.body = Body::Full(error.to_string());
        response
    }
    fn set(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!(header = %name, "dropping unrepresentable header value"),
        }
    }
    fn set_triples(&mut self, triples: usize) {
        self.headers.insert(TRIPLES, HeaderValue::from(triples));
    }
    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
    /// The resulting triple count, when the response carries one.
    pub fn triples(&self) -> Option<usize> {
        self.header_str(&TRIPLES).and_then(|v| v.parse().ok())
    }
    /// Drains the body, whichever way it is delivered.
    pub fn into_text(self) -> String {
        match self.body {
            Body::Empty => String::new(),
            Body::Full(text) => text,
            Body::Stream(chunks) => chunks.collect(),
        }
    }
}

pub struct Dispatcher {
    store: Arc<Store>,
    resolver: Resolver,
    settings: Arc<Settings>,
    accounts: AccountRegistry,
}

impl Dispatcher {
    /// Opens the configured store and generates a fresh certificate issuer.
    pub fn new(settings: Settings) -> Result<Self> {
        let store = Arc::new(Store::new(settings.persistence_mode())?);
        let issuer = Issuer::new(&settings.issuer_name, settings.certificate_days)?;
        Ok(Self::with_parts(Arc::new(settings), store, issuer))
    }

    pub fn with_parts(settings: Arc<Settings>, store: Arc<Store>, issuer: Issuer) -> Self {
        Self {
            resolver: Resolver::new(&settings),
            accounts: AccountRegistry::new(Arc::clone(&store), Arc::clone(&settings), issuer),
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn handle(&self, request: &LdRequest) -> LdResponse {
        let mut response = match self.execute(request) {
            Ok(response) => response,
            Err(error) => {
                let response = LdResponse::error(&error);
                if response.status.is_server_error() {
                    warn!(method = %request.method, path = %request.path, error = %error, "request failed");
                }
                response
            }
        };
        if let Some(origin) = request.headers.get(header::ORIGIN) {
            response.headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            response.set(header::ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSED);
        }
        info!(
            method = %request.method,
            path = %request.path,
            status = response.status.as_u16(),
            triples = response.triples(),
            "request handled"
        );
        response
    }

    fn execute(&self, request: &LdRequest) -> Result<LdResponse> {
        let verb = Verb::from(&request.method);
        if verb == Verb::Options {
            return Ok(self.preflight(request));
        }
        let info = self.resolver.resolve(request.host.as_deref(), &request.path)?;
        if info.first_segment() == self.settings.system_prefix {
            return self.system(request, &verb, &info);
        }

        // the tenant root always exists as a container
        let target = if info.is_root() { Target::Container } else { Target::from(self.store.kind(&info.key)?) };
        let read = matches!(verb, Verb::Get | Verb::Head);
        let format = if read && target != Target::Container {
            Some(negotiate_read(request.header_str(&header::ACCEPT))?)
        } else {
            None
        };
        let payload = if verb.carries_body() {
            Some(negotiate_write(request.header_str(&header::CONTENT_TYPE))?)
        } else {
            None
        };
        let facts = Facts { verb: verb.clone(), target, root: info.is_root(), payload };
        let action = decide(&facts)?;
        debug!(?facts, ?action, key = %info.key, "decided");

        match action {
            Action::Preflight => Ok(self.preflight(request)),
            Action::Read => match format {
                Some(format) => self.read(&info, format, verb == Verb::Head),
                None => Err(LinkstoreError::Internal("read without a negotiated format".into())),
            },
            Action::Merge(format) => {
                let graph = format.parse(&request.body)?;
                Ok(written(self.store.merge(&info.key, graph)?, true))
            }
            Action::Replace(format) => {
                let graph = format.parse(&request.body)?;
                Ok(written(self.store.replace(&info.key, graph)?, true))
            }
            Action::Update => {
                let text = std::str::from_utf8(&request.body)
                    .map_err(|e| LinkstoreError::BadRequest(format!("body is not UTF-8: {e}")))?;
                let update = parse_update(text)?;
                Ok(written(self.store.update(&info.key, update)?, false))
            }
            Action::KeyedPatch => {
                let patch = parse_patch(&request.body)?;
                Ok(written(self.store.patch(&info.key, patch)?, true))
            }
            Action::Remove => {
                let kind = self.store.remove(&info.key)?;
                info!(key = %info.key, ?kind, "removed");
                Ok(LdResponse::new(StatusCode::OK))
            }
            Action::MakeCollection => {
                self.store.make_collection(&info.key)?;
                Ok(LdResponse::new(StatusCode::CREATED))
            }
        }
    }

    fn read(&self, info: &PathInfo, format: Format, head: bool) -> Result<LdResponse> {
        let snapshot = self
            .store
            .load(&info.key)?
            .ok_or_else(|| LinkstoreError::NotFound(format!("'{}' does not exist", info.path)))?;
        let mut response = LdResponse::new(StatusCode::OK);
        response.set(header::CONTENT_TYPE, format.media_type());
        response.set(header::ETAG, &format!("\"{}\"", snapshot.etag(format.media_type())));
        response.set(
            header::LAST_MODIFIED,
            &snapshot.modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
        response.set_triples(snapshot.graph.len());
        self.describe(&mut response);
        response.body = match (head, self.settings.stream) {
            (true, _) => Body::Empty,
            (false, true) => Body::Stream(stream(snapshot.graph, format)),
            (false, false) => Body::Full(serialize(&snapshot.graph, format)),
        };
        Ok(response)
    }

    fn describe(&self, response: &mut LdResponse) {
        response.set(MS_AUTHOR_VIA, "SPARQL");
        response.set(ACCEPT_PATCH, &format!("{RDF_JSON}, {SPARQL_UPDATE}"));
        response.set(ACCEPT_POST, &format!("{TURTLE}, {NTRIPLES}, {RDF_JSON}, {SPARQL_UPDATE}"));
        response.set(header::ALLOW, ALLOWED);
    }

    fn preflight(&self, request: &LdRequest) -> LdResponse {
        let mut response = LdResponse::new(StatusCode::OK);
        self.describe(&mut response);
        response.set(header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED);
        let requested = request
            .header_str(&header::ACCESS_CONTROL_REQUEST_HEADERS)
            .unwrap_or("Accept, Authorization, Content-Type, Origin");
        response.set(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
        response.set(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
        response
    }

    /// The identity API under the reserved segment.
    fn system(&self, request: &LdRequest, verb: &Verb, info: &PathInfo) -> Result<LdResponse> {
        let endpoint = info.path.split('/').nth(1).unwrap_or("");
        if !matches!(endpoint, "accountStatus" | "spkac") {
            return Err(LinkstoreError::NotFound(format!("no system endpoint '{endpoint}'")));
        }
        if *verb != Verb::Post {
            return Err(LinkstoreError::MethodNotAllowed(format!("{} on {endpoint}", request.method)));
        }
        let mut response = LdResponse::new(StatusCode::OK);
        if endpoint == "accountStatus" {
            let status = self.accounts.account_status(&request.body, info)?;
            response.set(header::CONTENT_TYPE, "application/json");
            response.body = Body::Full(serde_json::to_string(&status)?);
        } else {
            let form: CertificateRequest = serde_urlencoded::from_bytes(&request.body)
                .map_err(|e| LinkstoreError::BadRequest(format!("certificate request form: {e}")))?;
            let issued = self.accounts.issue(form, request.header_str(&header::USER_AGENT), info)?;
            response.set(header::CONTENT_TYPE, issued.content_type());
            response.body = Body::Full(issued.body());
        }
        Ok(response)
    }
}

/// Status and triple count after a write. Update-language posts answer 200
/// even when they create the document.
fn written(written: Written, report_creation: bool) -> LdResponse {
    let status = if written.created && report_creation { StatusCode::CREATED } else { StatusCode::OK };
    let mut response = LdResponse::new(status);
    response.set_triples(written.triples);
    response
}
