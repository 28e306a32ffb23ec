use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use secrecy::ExposeSecret;
use tracing::{debug, error};

use crate::credential::Credential;
use crate::soap::ns;
use crate::wsse::{Built, Error, Populated, Result, SecurityValues, SignableDocument};
use crate::xml::{Document, NodeId};

impl SignableDocument<Built> {
    /// Fill the security header with the credential and freshly generated
    /// nonce and timestamps.
    pub fn populate(self, credential: &Credential) -> Result<SignableDocument<Populated>> {
        let values = SecurityValues::generate()?;
        self.populate_with(credential, values)
    }

    /// Fill the security header with the credential and the given values.
    pub fn populate_with(
        mut self,
        credential: &Credential,
        values: SecurityValues,
    ) -> Result<SignableDocument<Populated>> {
        let nodes = SecurityNodes::locate(&self.doc)?;
        let created = values.created_str();

        let doc = &mut self.doc;
        doc.set_text(nodes.binary_token, BASE64.encode(credential.certificate_der()))?;
        doc.set_text(nodes.username, credential.username())?;
        doc.set_text(nodes.password, credential.password().expose_secret())?;
        doc.set_text(nodes.nonce, values.nonce())?;
        doc.set_text(nodes.username_created, created.as_str())?;
        doc.set_text(nodes.created, created.as_str())?;
        doc.set_text(nodes.expires, values.expires_str())?;

        debug!(created = %created, "Populated security header");
        Ok(SignableDocument {
            doc: self.doc,
            ids: self.ids,
            state: Populated { values },
        })
    }
}

/// Handles to every security header node that gets a value
struct SecurityNodes {
    binary_token: NodeId,
    username: NodeId,
    password: NodeId,
    nonce: NodeId,
    username_created: NodeId,
    created: NodeId,
    expires: NodeId,
}

impl SecurityNodes {
    fn locate(doc: &Document) -> Result<Self> {
        let binary_token = required(doc.find(ns::WSSE, "BinarySecurityToken"), "wsse:BinarySecurityToken")?;
        let username_token = required(doc.find(ns::WSSE, "UsernameToken"), "wsse:UsernameToken")?;
        let timestamp = required(doc.find(ns::WSU, "Timestamp"), "wsu:Timestamp")?;

        Ok(Self {
            binary_token,
            username: required(doc.child(username_token, ns::WSSE, "Username"), "wsse:Username")?,
            password: required(doc.child(username_token, ns::WSSE, "Password"), "wsse:Password")?,
            nonce: required(doc.child(username_token, ns::WSSE, "Nonce"), "wsse:Nonce")?,
            username_created: required(
                doc.child(username_token, ns::WSU, "Created"),
                "wsse:UsernameToken/wsu:Created",
            )?,
            created: required(doc.child(timestamp, ns::WSU, "Created"), "wsu:Timestamp/wsu:Created")?,
            expires: required(doc.child(timestamp, ns::WSU, "Expires"), "wsu:Timestamp/wsu:Expires")?,
        })
    }
}

fn required(node: Option<NodeId>, name: &'static str) -> Result<NodeId> {
    node.ok_or_else(|| {
        error!(element = name, "Envelope template is missing a security element");
        Error::MissingNode(name)
    })
}
