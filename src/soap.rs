mod ser;

pub use ser::to_string;

use serde::Serialize;

/// `SOAPAction` header value expected by the antibiotics usage operation
pub const SOAP_ACTION: &str = "http://vetstat.fvst.dk/chr/hentAntibiotikaforbrug";
/// Content type of every request body
pub const CONTENT_TYPE: &str = "text/xml;charset=UTF-8";

pub mod ns {
    pub const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
    pub const WSSE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
    pub const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
    pub const DS: &str = "http://www.w3.org/2000/09/xmldsig#";
    pub const EC: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    pub const EKS: &str = "http://vetstat.fvst.dk/ekstern";
    pub const GLR: &str = "http://www.logica.com/glrchr";
}

pub mod prefix {
    pub const SOAP_ENV: &str = "soapenv";
    pub const WSSE: &str = "wsse";
    pub const WSU: &str = "wsu";
    pub const DS: &str = "ds";
    pub const EC: &str = "ec";
    pub const EKS: &str = "eks";
    pub const GLR: &str = "glr";

    /// Every prefix declared on the envelope root, paired with its namespace
    pub const ALL: [(&str, &str); 7] = [
        (DS, super::ns::DS),
        (EC, super::ns::EC),
        (EKS, super::ns::EKS),
        (GLR, super::ns::GLR),
        (SOAP_ENV, super::ns::SOAP_ENV),
        (WSSE, super::ns::WSSE),
        (WSU, super::ns::WSU),
    ];
}

/// Serialize a complete envelope with every VetStat prefix declared on the
/// root element.
pub fn serialize_envelope<T: Serialize>(envelope: &T) -> Result<String, quick_xml::SeError> {
    to_string(envelope, &prefix::ALL)
}
