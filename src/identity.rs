// Application identity: signing certificate chain and per-certificate hashes

use crate::error::{AceError, AceResult};
use crate::interfaces::AppRegistry;
use ring::digest::{self, SHA1_FOR_LEGACY_USE_ONLY};
use std::sync::Arc;

/// Length of a certificate hash used as rule-matching key
pub const CERT_HASH_LEN: usize = 20;

pub type CertificateHash = [u8; CERT_HASH_LEN];

/// DER encoding of one application signing certificate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Certificate(pub Vec<u8>);

impl Certificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self(der.into())
    }

    pub fn encoded(&self) -> &[u8] {
        &self.0
    }

    /// Check that the encoding is a single DER SEQUENCE spanning all bytes.
    ///
    /// Only the outer TLV is inspected; the hash is taken over the exact
    /// bytes the registry supplied.
    pub fn check_der(&self) -> AceResult<()> {
        let invalid =
            |what: &str| AceError::InvalidIdentity(format!("certificate is not DER: {}", what));

        let (tag, rest) = self.0.split_first().ok_or_else(|| invalid("empty encoding"))?;
        if *tag != DER_SEQUENCE {
            return Err(invalid("outer tag is not a SEQUENCE"));
        }
        let (first, rest) = rest.split_first().ok_or_else(|| invalid("missing length"))?;

        let (len, body) = if first & 0x80 == 0 {
            (usize::from(*first), rest)
        } else {
            let count = usize::from(first & 0x7F);
            if count == 0 || count > 4 || rest.len() < count {
                return Err(invalid("bad length encoding"));
            }
            let (octets, body) = rest.split_at(count);
            if octets[0] == 0 || (count == 1 && octets[0] < 0x80) {
                return Err(invalid("non-minimal length"));
            }
            let len = octets
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
            (len, body)
        };

        if len != body.len() {
            return Err(invalid("length does not match encoding"));
        }
        Ok(())
    }
}

const DER_SEQUENCE: u8 = 0x30;

/// A certificate together with its hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateIdentity {
    pub hash: CertificateHash,
    pub certificate: Certificate,
}

/// Resolved identity of a requesting application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub package: String,
    pub certificates: Vec<CertificateIdentity>,
}

/// Compute the SHA-1 hash of a certificate's encoding
pub fn certificate_hash(certificate: &Certificate) -> AceResult<CertificateHash> {
    if certificate.encoded().is_empty() {
        return Err(AceError::InvalidIdentity(
            "certificate encoding is empty".to_string(),
        ));
    }

    let digest = digest::digest(&SHA1_FOR_LEGACY_USE_ONLY, certificate.encoded());
    let mut hash = [0u8; CERT_HASH_LEN];
    hash.copy_from_slice(digest.as_ref());
    Ok(hash)
}

/// Turns package identifiers into hashed certificate chains
#[derive(Clone)]
pub struct IdentityResolver {
    registry: Arc<dyn AppRegistry>,
}

impl IdentityResolver {
    pub fn new(registry: Arc<dyn AppRegistry>) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, package: &str) -> AceResult<AppIdentity> {
        if package.is_empty() {
            return Err(AceError::InvalidIdentity(
                "package name must be specified".to_string(),
            ));
        }

        let chain = self.registry.signing_certificates(package)?;
        if chain.is_empty() {
            return Err(AceError::InvalidIdentity(
                "application certificates are invalid or do not exist".to_string(),
            ));
        }

        let certificates = chain
            .into_iter()
            .map(|certificate| {
                certificate.check_der()?;
                Ok(CertificateIdentity {
                    hash: certificate_hash(&certificate)?,
                    certificate,
                })
            })
            .collect::<AceResult<Vec<_>>>()?;

        log::debug!(
            "Resolved {} certificate(s) for package {}",
            certificates.len(),
            package
        );

        Ok(AppIdentity {
            package: package.to_string(),
            certificates,
        })
    }
}
