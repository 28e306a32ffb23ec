use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use crate::request::{AntibioticsQuery, AntibioticsRequest};
use crate::soap::serialize_envelope;
use crate::wsse::timestamp::Timestamp;
use crate::wsse::{
    Built, Error, Result, SIGNED_INFO_PREFIXES, SignableDocument, SignedElement, algorithms,
    token_types,
};
use crate::xml::Document;

/// The seven element identifiers of one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityIds {
    pub binary_token: String,
    pub username_token: String,
    pub timestamp: String,
    pub signature: String,
    pub body: String,
    pub key_info: String,
    pub token_reference: String,
}

impl SecurityIds {
    /// Fresh identifiers derived from random UUIDs
    pub fn generate() -> Self {
        Self {
            binary_token: generate_id("X509-"),
            username_token: generate_id("UsernameToken-"),
            timestamp: generate_id("TS-"),
            signature: generate_id("SIG-"),
            body: generate_id("id-"),
            key_info: generate_id("KI-"),
            token_reference: generate_id("STR-"),
        }
    }

    pub fn all(&self) -> [&str; 7] {
        [
            &self.binary_token,
            &self.username_token,
            &self.timestamp,
            &self.signature,
            &self.body,
            &self.key_info,
            &self.token_reference,
        ]
    }

    /// Identifier of the element a signature reference points to
    pub fn of(&self, element: SignedElement) -> &str {
        match element {
            SignedElement::Body => &self.body,
            SignedElement::Timestamp => &self.timestamp,
            SignedElement::UsernameToken => &self.username_token,
            SignedElement::BinarySecurityToken => &self.binary_token,
        }
    }
}

pub(crate) fn generate_id(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

impl SignableDocument<Built> {
    /// Build the envelope skeleton for `query`.
    ///
    /// Business fields are filled in; certificate, credentials, nonce,
    /// timestamps, digests and the signature value are left empty.
    pub fn build(username: &str, query: &AntibioticsQuery, client_id: &str) -> Result<Self> {
        Self::build_with(
            username,
            query,
            client_id,
            SecurityIds::generate(),
            generate_id("vetstat_request-"),
        )
    }

    pub(crate) fn build_with(
        username: &str,
        query: &AntibioticsQuery,
        client_id: &str,
        ids: SecurityIds,
        track_id: String,
    ) -> Result<Self> {
        let envelope = RequestEnvelope {
            header: RequestHeader {
                security: Security::placeholder(&ids),
            },
            body: RequestBody {
                id: ids.body.clone(),
                request: AntibioticsRequest::new(query, username, client_id, track_id),
            },
        };

        let xml = serialize_envelope(&envelope).map_err(|e| {
            error!("Failed to serialize envelope template: {e}");
            Error::from(e)
        })?;
        let doc = Document::parse(&xml).map_err(|e| {
            error!("Envelope template is not well-formed: {e}");
            Error::Template(e.to_string())
        })?;
        debug!(body_id = %ids.body, "Built envelope template");

        Ok(Self {
            doc,
            ids,
            state: Built,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "soapenv:Envelope")]
struct RequestEnvelope {
    #[serde(rename = "soapenv:Header")]
    header: RequestHeader,
    #[serde(rename = "soapenv:Body")]
    body: RequestBody,
}

#[derive(Debug, Clone, Serialize)]
struct RequestHeader {
    #[serde(rename = "wsse:Security")]
    security: Security,
}

#[derive(Debug, Clone, Serialize)]
struct RequestBody {
    #[serde(rename = "@wsu:Id")]
    id: String,
    #[serde(rename = "eks:VetStat_CHRHentAntibiotikaForbrugRequest")]
    request: AntibioticsRequest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "wsse:Security")]
struct Security {
    #[serde(rename = "wsse:BinarySecurityToken")]
    binary_security_token: BinarySecurityToken,
    #[serde(rename = "wsse:UsernameToken")]
    username_token: UsernameToken,
    #[serde(rename = "wsu:Timestamp")]
    timestamp: Timestamp,
    #[serde(rename = "ds:Signature")]
    signature: Signature,
}

impl Security {
    fn placeholder(ids: &SecurityIds) -> Self {
        let references = SignedElement::ALL
            .iter()
            .map(|element| Reference {
                uri: format!("#{}", ids.of(*element)),
                transforms: Transforms {
                    transform: vec![Transform::exclusive(element.inclusive_prefixes())],
                },
                digest_method: AlgorithmElement::new(algorithms::SHA256),
                digest_value: String::new(),
            })
            .collect();

        Self {
            binary_security_token: BinarySecurityToken {
                encoding_type: token_types::BASE64_BINARY,
                value_type: token_types::X509_V3,
                id: ids.binary_token.clone(),
                value: String::new(),
            },
            username_token: UsernameToken {
                id: ids.username_token.clone(),
                username: String::new(),
                password: TypedText {
                    kind: token_types::PASSWORD_TEXT,
                    value: String::new(),
                },
                nonce: EncodedText {
                    encoding_type: token_types::BASE64_BINARY,
                    value: String::new(),
                },
                created: String::new(),
            },
            timestamp: Timestamp::placeholder(ids.timestamp.clone()),
            signature: Signature {
                id: ids.signature.clone(),
                signed_info: SignedInfo {
                    canonicalization_method: Transform::exclusive(SIGNED_INFO_PREFIXES),
                    signature_method: AlgorithmElement::new(algorithms::RSA_SHA1),
                    references,
                },
                signature_value: String::new(),
                key_info: KeyInfo {
                    id: ids.key_info.clone(),
                    security_token_reference: SecurityTokenReference {
                        id: ids.token_reference.clone(),
                        reference: TokenReference {
                            uri: format!("#{}", ids.binary_token),
                            value_type: token_types::X509_V3,
                        },
                    },
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct BinarySecurityToken {
    #[serde(rename = "@EncodingType")]
    encoding_type: &'static str,
    #[serde(rename = "@ValueType")]
    value_type: &'static str,
    #[serde(rename = "@wsu:Id")]
    id: String,
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Clone, Serialize)]
struct UsernameToken {
    #[serde(rename = "@wsu:Id")]
    id: String,
    #[serde(rename = "wsse:Username")]
    username: String,
    #[serde(rename = "wsse:Password")]
    password: TypedText,
    #[serde(rename = "wsse:Nonce")]
    nonce: EncodedText,
    #[serde(rename = "wsu:Created")]
    created: String,
}

#[derive(Debug, Clone, Serialize)]
struct TypedText {
    #[serde(rename = "@Type")]
    kind: &'static str,
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Clone, Serialize)]
struct EncodedText {
    #[serde(rename = "@EncodingType")]
    encoding_type: &'static str,
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Clone, Serialize)]
struct Signature {
    #[serde(rename = "@Id")]
    id: String,
    #[serde(rename = "ds:SignedInfo")]
    signed_info: SignedInfo,
    #[serde(rename = "ds:SignatureValue")]
    signature_value: String,
    #[serde(rename = "ds:KeyInfo")]
    key_info: KeyInfo,
}

#[derive(Debug, Clone, Serialize)]
struct SignedInfo {
    #[serde(rename = "ds:CanonicalizationMethod")]
    canonicalization_method: CanonicalizationMethod,
    #[serde(rename = "ds:SignatureMethod")]
    signature_method: AlgorithmElement,
    #[serde(rename = "ds:Reference")]
    references: Vec<Reference>,
}

#[derive(Debug, Clone, Serialize)]
struct AlgorithmElement {
    #[serde(rename = "@Algorithm")]
    algorithm: &'static str,
}

impl AlgorithmElement {
    fn new(algorithm: &'static str) -> Self {
        Self { algorithm }
    }
}

/// Exclusive C14N with an inclusive prefix list
#[derive(Debug, Clone, Serialize)]
struct Transform {
    #[serde(rename = "@Algorithm")]
    algorithm: &'static str,
    #[serde(rename = "ec:InclusiveNamespaces")]
    inclusive_namespaces: InclusiveNamespaces,
}

type CanonicalizationMethod = Transform;

impl Transform {
    fn exclusive(prefixes: &[&str]) -> Self {
        Self {
            algorithm: algorithms::EXCLUSIVE_C14N,
            inclusive_namespaces: InclusiveNamespaces {
                prefix_list: prefixes.join(" "),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct InclusiveNamespaces {
    #[serde(rename = "@PrefixList")]
    prefix_list: String,
}

#[derive(Debug, Clone, Serialize)]
struct Transforms {
    #[serde(rename = "ds:Transform")]
    transform: Vec<Transform>,
}

#[derive(Debug, Clone, Serialize)]
struct Reference {
    #[serde(rename = "@URI")]
    uri: String,
    #[serde(rename = "ds:Transforms")]
    transforms: Transforms,
    #[serde(rename = "ds:DigestMethod")]
    digest_method: AlgorithmElement,
    #[serde(rename = "ds:DigestValue")]
    digest_value: String,
}

#[derive(Debug, Clone, Serialize)]
struct KeyInfo {
    #[serde(rename = "@Id")]
    id: String,
    #[serde(rename = "wsse:SecurityTokenReference")]
    security_token_reference: SecurityTokenReference,
}

#[derive(Debug, Clone, Serialize)]
struct SecurityTokenReference {
    #[serde(rename = "@wsu:Id")]
    id: String,
    #[serde(rename = "wsse:Reference")]
    reference: TokenReference,
}

#[derive(Debug, Clone, Serialize)]
struct TokenReference {
    #[serde(rename = "@URI")]
    uri: String,
    #[serde(rename = "@ValueType")]
    value_type: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::ns;
    use chrono::NaiveDate;

    fn query() -> AntibioticsQuery {
        AntibioticsQuery::new(
            28400,
            15,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 31).unwrap(),
        )
    }

    fn build() -> SignableDocument<Built> {
        SignableDocument::build("fvm-user", &query(), "LandbrugsData").unwrap()
    }

    #[test]
    fn test_build_places_security_in_header_and_request_in_body() {
        let built = SignableDocument::build("fvm-user", &query(), "LandbrugsData").unwrap();
        let doc = built.document();
        let root = doc.root();

        let children = doc.children(root);
        assert_eq!(children.len(), 2);
        let (header, body) = (children[0], children[1]);
        assert!(doc.matches(header, ns::SOAP_ENV, "Header"));
        assert!(doc.matches(body, ns::SOAP_ENV, "Body"));

        let security = doc.children(header);
        assert_eq!(security.len(), 1);
        assert!(doc.matches(security[0], ns::WSSE, "Security"));
        let parts: Vec<_> = doc
            .children(security[0])
            .iter()
            .filter_map(|c| doc.local_name(*c))
            .collect();
        assert_eq!(
            parts,
            ["BinarySecurityToken", "UsernameToken", "Timestamp", "Signature"]
        );

        assert_eq!(doc.attribute(body, "wsu:Id"), Some(built.ids().body.as_str()));
        let request = doc.children(body);
        assert_eq!(request.len(), 1);
        assert!(doc.matches(request[0], ns::EKS, "VetStat_CHRHentAntibiotikaForbrugRequest"));
    }

    #[test]
    fn test_username_whitespace_survives_serialization() {
        let built = SignableDocument::build(" fvm-user ", &query(), "LandbrugsData").unwrap();
        let doc = built.document();
        assert_eq!(doc.text(doc.find(ns::GLR, "BrugerNavn").unwrap()), " fvm-user ");
    }

    #[test]
    fn test_identifier_formats() {
        let ids = SecurityIds::generate();
        let hex_part = |id: &str, prefix: &str| {
            let rest = id.strip_prefix(prefix).unwrap().to_string();
            assert_eq!(rest.len(), 32, "{id}");
            assert!(rest.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        };
        hex_part(&ids.binary_token, "X509-");
        hex_part(&ids.username_token, "UsernameToken-");
        hex_part(&ids.timestamp, "TS-");
        hex_part(&ids.signature, "SIG-");
        hex_part(&ids.body, "id-");
        hex_part(&ids.key_info, "KI-");
        hex_part(&ids.token_reference, "STR-");
    }

    #[test]
    fn test_template_structure() {
        let built = build();
        let doc = built.document();
        let ids = built.ids();

        let root = doc.root();
        assert!(doc.matches(root, ns::SOAP_ENV, "Envelope"));
        assert_eq!(doc.in_scope_namespaces(root).len(), 7);

        for id in ids.all() {
            assert!(doc.find_by_id(id).is_some(), "missing element for {id}");
        }
        let body = doc.find_by_id(&ids.body).unwrap();
        assert!(doc.matches(body, ns::SOAP_ENV, "Body"));

        let signed_info = doc.find(ns::DS, "SignedInfo").unwrap();
        let uris: Vec<_> = doc
            .children(signed_info)
            .iter()
            .filter(|c| doc.matches(**c, ns::DS, "Reference"))
            .map(|c| doc.attribute(*c, "URI").unwrap().to_string())
            .collect();
        assert_eq!(
            uris,
            vec![
                format!("#{}", ids.body),
                format!("#{}", ids.timestamp),
                format!("#{}", ids.username_token),
                format!("#{}", ids.binary_token),
            ]
        );
    }

    #[test]
    fn test_template_prefix_lists() {
        let built = build();
        let doc = built.document();
        let lists: Vec<_> = doc
            .descendants(doc.root())
            .filter(|n| doc.matches(*n, ns::EC, "InclusiveNamespaces"))
            .map(|n| doc.attribute(n, "PrefixList").unwrap().to_string())
            .collect();
        assert_eq!(
            lists,
            vec![
                "ds ec eks glr soapenv wsse wsu",
                "ds ec eks glr wsse",
                "wsse ds ec eks glr soapenv",
                "ds ec eks glr soapenv wsse",
                "",
            ]
        );
    }

    #[test]
    fn test_template_business_payload() {
        let built = build();
        let doc = built.document();
        let text_of = |ns: &str, local: &str| doc.text(doc.find(ns, local).unwrap());

        assert_eq!(text_of(ns::GLR, "KlientId"), "LandbrugsData");
        assert_eq!(text_of(ns::GLR, "BrugerNavn"), "fvm-user");
        assert_eq!(text_of(ns::GLR, "SessionId"), "1");
        assert_eq!(text_of(ns::GLR, "IPAdresse"), "");
        assert!(text_of(ns::GLR, "TrackID").starts_with("vetstat_request-"));
        assert_eq!(text_of(ns::GLR, "DyreArtKode"), "15");
        assert_eq!(text_of(ns::EKS, "PeriodeFra"), "2023-01-01");
        assert_eq!(text_of(ns::EKS, "PeriodeTil"), "2023-03-31");
        assert_eq!(text_of(ns::EKS, "CHRNummer"), "28400");
    }

    #[test]
    fn test_template_leaves_security_fields_empty() {
        let built = build();
        let doc = built.document();
        for (ns, local) in [
            (ns::WSSE, "BinarySecurityToken"),
            (ns::WSSE, "Username"),
            (ns::WSSE, "Password"),
            (ns::WSSE, "Nonce"),
            (ns::DS, "DigestValue"),
            (ns::DS, "SignatureValue"),
        ] {
            let node = doc.find(ns, local).unwrap();
            assert_eq!(doc.text(node), "", "{local} should be empty");
        }
    }
}
