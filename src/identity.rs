//! Identity issuance: turning a browser's signed public key and challenge
//! (SPKAC) into an X.509 client certificate plus the identity profile graph
//! that describes the same key.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, PublicKeyData, SanType, SerialNumber, SignatureAlgorithm,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use x509_parser::der_parser::asn1_rs::{self, FromDer, Ia5String, Sequence};
use x509_parser::prelude::SubjectPublicKeyInfo;
use x509_parser::public_key::PublicKey;

use crate::error::{LinkstoreError, Result};
use crate::graph::Graph;
use crate::term::{Literal, Term, Triple, CERT, FOAF, RDF_TYPE, XSD_HEX_BINARY, XSD_INT};

/// The RSA key a client asked to have certified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedKey {
    /// PKCS#1 RSAPublicKey, the content of the SPKI bit string.
    public_key: Vec<u8>,
    modulus: Vec<u8>,
    exponent: u64,
    challenge: String,
}

impl SignedKey {
    /// Lowercase hex without leading zeros.
    pub fn modulus_hex(&self) -> String {
        let significant: Vec<u8> = self.modulus.iter().copied().skip_while(|b| *b == 0).collect();
        let hex = hex::encode(significant);
        hex.trim_start_matches('0').to_string()
    }
    pub fn exponent(&self) -> u64 {
        self.exponent
    }
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

impl PublicKeyData for SignedKey {
    fn der_bytes(&self) -> &[u8] {
        &self.public_key
    }
    fn algorithm(&self) -> &SignatureAlgorithm {
        &rcgen::PKCS_RSA_SHA256
    }
}

/// Parses `SignedPublicKeyAndChallenge ::= SEQUENCE { PublicKeyAndChallenge
/// SEQUENCE { SubjectPublicKeyInfo, IA5String }, AlgorithmIdentifier, BIT STRING }`.
pub fn parse_spkac(spkac: &str) -> Result<SignedKey> {
    let compact: String = spkac.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(LinkstoreError::BadRequest("empty SPKAC".into()));
    }
    let der = STANDARD.decode(compact.as_bytes())?;
    let malformed = |e: asn1_rs::Err<asn1_rs::Error>| {
        LinkstoreError::BadRequest(format!("SPKAC is not a signed public key and challenge: {e}"))
    };
    let (_, signed) = Sequence::from_der(&der).map_err(malformed)?;
    let (_, key_and_challenge) = Sequence::from_der(&signed.content).map_err(malformed)?;
    let (rest, spki) = SubjectPublicKeyInfo::from_der(&key_and_challenge.content)
        .map_err(|e| LinkstoreError::BadRequest(format!("SPKAC public key: {e}")))?;
    // an absent challenge is tolerated
    let challenge = Ia5String::from_der(rest)
        .map(|(_, challenge)| challenge.string())
        .unwrap_or_default();
    let parsed = spki
        .parsed()
        .map_err(|e| LinkstoreError::BadRequest(format!("SPKAC public key: {e}")))?;
    let PublicKey::RSA(rsa) = parsed else {
        return Err(LinkstoreError::BadRequest("only RSA keys can be certified".into()));
    };
    let exponent = rsa
        .try_exponent()
        .map_err(|e| LinkstoreError::BadRequest(format!("RSA exponent: {e}")))?;
    debug!(modulus_bytes = rsa.modulus.len(), exponent, "parsed SPKAC");
    Ok(SignedKey {
        public_key: spki.subject_public_key.data.to_vec(),
        modulus: rsa.modulus.to_vec(),
        exponent,
        challenge,
    })
}

/// The certificate authority minting client certificates. Its key pair lives
/// only as long as the process.
pub struct Issuer {
    key: KeyPair,
    certificate: rcgen::Certificate,
    validity_days: u32,
}

impl Issuer {
    pub fn new(common_name: &str, validity_days: u32) -> Result<Self> {
        let key = KeyPair::generate()?;
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::DigitalSignature];
        let certificate = params.self_signed(&key)?;
        info!(common_name, "certificate issuer ready");
        Ok(Self { key, certificate, validity_days })
    }

    /// DER certificate binding `identity_uri` and `label` to the client's key.
    pub fn mint(&self, key: &SignedKey, identity_uri: &str, label: &str) -> Result<Vec<u8>> {
        let mut params = CertificateParams::default();
        let not_before = OffsetDateTime::now_utc() - Duration::minutes(5);
        params.not_before = not_before;
        params.not_after = not_before + Duration::days(self.validity_days.into());
        params.is_ca = IsCa::NoCa;
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, label);
        dn.push(DnType::OrganizationName, "WebID");
        params.distinguished_name = dn;
        let uri = identity_uri
            .to_string()
            .try_into()
            .map_err(|_| LinkstoreError::BadRequest(format!("invalid identity URI: {identity_uri}")))?;
        params.subject_alt_names.push(SanType::URI(uri));
        let serial_seed = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let serial_value = if serial_seed <= 0 { 1 } else { (serial_seed as u128 % u128::from(u64::MAX)).max(1) as u64 };
        params.serial_number = Some(SerialNumber::from(serial_value));
        let certificate = params.signed_by(key, &self.certificate, &self.key)?;
        Ok(certificate.der().to_vec())
    }
}

/// What goes into an identity profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub uri: String,
    pub name: String,
    pub email: String,
    pub img: String,
    pub modulus: String,
    pub exponent: String,
}

/// The profile document: the document describes the person, the person owns the key.
pub fn profile_graph(account: &Account) -> Graph {
    let document = account.uri.split('#').next().unwrap_or(&account.uri).to_string();
    let me = Term::iri(&account.uri);
    let key = Term::iri(format!("{document}#key"));
    let foaf = |local: &str| Term::iri(format!("{FOAF}{local}"));
    let cert = |local: &str| Term::iri(format!("{CERT}{local}"));
    let a = Term::iri(RDF_TYPE);

    let mut triples = vec![
        Triple::new(Term::iri(&document), a.clone(), foaf("PersonalProfileDocument")),
        Triple::new(Term::iri(&document), foaf("maker"), me.clone()),
        Triple::new(Term::iri(&document), foaf("primaryTopic"), me.clone()),
        Triple::new(me.clone(), a.clone(), foaf("Person")),
    ];
    if !account.name.is_empty() {
        triples.push(Triple::new(me.clone(), foaf("name"), Term::literal(&account.name)));
    }
    if !account.img.is_empty() {
        triples.push(Triple::new(me.clone(), foaf("img"), Term::iri(&account.img)));
    }
    if !account.email.is_empty() {
        triples.push(Triple::new(me.clone(), foaf("mbox"), Term::iri(format!("mailto:{}", account.email))));
    }
    triples.push(Triple::new(me, cert("key"), key.clone()));
    triples.push(Triple::new(key.clone(), a, cert("RSAPublicKey")));
    triples.push(Triple::new(
        key.clone(),
        cert("modulus"),
        Term::Literal(Literal::typed(&account.modulus, XSD_HEX_BINARY)),
    ));
    triples.push(Triple::new(key, cert("exponent"), Term::Literal(Literal::typed(&account.exponent, XSD_INT))));
    Graph::from_triples(triples)
}
