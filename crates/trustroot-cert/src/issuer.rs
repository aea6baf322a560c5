//! Certificate issuance
//!
//! Three flows share one template builder and differ only in the
//! [`IdentityRole`] policy they apply:
//!
//! - [`issue_root`]: self-signed CA, serial 1
//! - [`Authority::issue_server_leaf`]: server-auth leaf with a hostname SAN
//! - [`Authority::issue_client_leaf`]: client-auth leaf
//!
//! The root's private key lives inside [`Authority`] and is only borrowed
//! for the duration of each signing call. Nothing hands it out.

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::CertificateDer;
use std::fmt;
use tracing::{debug, info, warn};

use crate::encoding::{decode_certificate_pem, CredentialBundle};
use crate::error::{CertError, CertResult};
use crate::inspect::CertificateInfo;
use crate::keys::{generate_keypair, load_private_key_pem, public_key_bytes};
use crate::role::IdentityRole;
use crate::serial::{self, SerialAllocator, SerialPolicy};
use crate::trust::TrustAnchorSet;
use crate::validity::ValidityWindow;

/// A signed certificate together with the key pair it was issued for
pub struct IssuedCertificate {
    role: IdentityRole,
    common_name: String,
    serial: u64,
    certificate_der: CertificateDer<'static>,
    certificate_pem: String,
    key_pair: KeyPair,
}

impl IssuedCertificate {
    fn new(
        role: IdentityRole,
        common_name: &str,
        serial: u64,
        certificate: rcgen::Certificate,
        key_pair: KeyPair,
    ) -> Self {
        Self {
            role,
            common_name: common_name.to_string(),
            serial,
            certificate_der: certificate.der().clone(),
            certificate_pem: certificate.pem(),
            key_pair,
        }
    }

    pub fn role(&self) -> IdentityRole {
        self.role
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn certificate_der(&self) -> &CertificateDer<'static> {
        &self.certificate_der
    }

    /// Public `CERTIFICATE` block
    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    /// Secret PKCS#8 `PRIVATE KEY` block
    pub fn private_key_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }

    /// Public key generated alongside this certificate
    pub fn public_key(&self) -> &[u8] {
        public_key_bytes(&self.key_pair)
    }

    pub fn info(&self) -> CertResult<CertificateInfo> {
        CertificateInfo::from_der(&self.certificate_der)
    }

    /// Encode into a transport-ready bundle
    pub fn to_credential(&self) -> CredentialBundle {
        CredentialBundle::new(self.certificate_pem.clone(), self.private_key_pem())
    }
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("role", &self.role)
            .field("common_name", &self.common_name)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// Build the unsigned template shared by all roles
fn build_template(
    role: IdentityRole,
    common_name: &str,
    hostnames: &[String],
    validity: &ValidityWindow,
) -> CertResult<CertificateParams> {
    if common_name.trim().is_empty() {
        return Err(CertError::Signing(format!(
            "{} certificate needs a non-empty common name",
            role
        )));
    }

    if role.requires_hostname() && hostnames.is_empty() {
        return Err(CertError::Signing(format!(
            "{} certificate needs at least one hostname",
            role
        )));
    }

    let mut params = CertificateParams::new(hostnames.to_vec())
        .map_err(|e| CertError::Signing(format!("Invalid subject alternative name: {}", e)))?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;

    params.not_before = validity.not_before();
    params.not_after = validity.not_after();

    role.apply(&mut params);

    Ok(params)
}

/// Issue the self-signed root with the default sequential serial
pub fn issue_root(common_name: &str, validity: ValidityWindow) -> CertResult<IssuedCertificate> {
    issue_root_with_policy(common_name, validity, SerialPolicy::Sequential)
}

/// Issue the self-signed root, choosing its serial from `policy`
pub fn issue_root_with_policy(
    common_name: &str,
    validity: ValidityWindow,
    policy: SerialPolicy,
) -> CertResult<IssuedCertificate> {
    let role = IdentityRole::Root;
    let mut params = build_template(role, common_name, &[], &validity)?;

    let key_pair = generate_keypair()?;
    let serial = SerialAllocator::root_serial(policy);
    params.serial_number = Some(serial::to_rcgen(serial));

    let certificate = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Signing(format!("Failed to self-sign root: {}", e)))?;

    info!(
        "Issued {} certificate CN={} serial={}",
        role, common_name, serial
    );

    Ok(IssuedCertificate::new(
        role,
        common_name,
        serial,
        certificate,
        key_pair,
    ))
}

/// Signing authority for leaf certificates
///
/// Holds the root certificate and exclusively owns the root private key.
/// Leaf issuance borrows the authority (`&self`), so a single authority can
/// be shared once it exists.
pub struct Authority {
    common_name: String,
    certificate_der: CertificateDer<'static>,
    certificate_pem: String,
    not_after: i64,
    signer: rcgen::Certificate,
    key_pair: KeyPair,
    serials: SerialAllocator,
}

impl Authority {
    /// Take ownership of a freshly issued root
    pub fn new(root: IssuedCertificate, policy: SerialPolicy) -> CertResult<Self> {
        Self::from_parts(
            root.certificate_der,
            root.certificate_pem,
            root.key_pair,
            policy,
            None,
        )
    }

    /// Rebuild an authority from its encoded certificate and private key
    ///
    /// Under [`SerialPolicy::Sequential`] the caller supplies `next_serial`,
    /// normally [`Authority::next_serial`] of the authority that last issued
    /// for this root, so a reloaded authority continues the sequence instead
    /// of reusing serials. It must be greater than the authority's own
    /// serial. `next_serial` is ignored under [`SerialPolicy::Random`].
    pub fn from_pem(
        certificate_pem: &str,
        private_key_pem: &str,
        policy: SerialPolicy,
        next_serial: u64,
    ) -> CertResult<Self> {
        let certificate_der = decode_certificate_pem(certificate_pem)
            .map_err(|e| CertError::ChainParse(e.to_string()))?;
        let key_pair = load_private_key_pem(private_key_pem)
            .map_err(|e| CertError::ChainParse(e.to_string()))?;

        Self::from_parts(
            certificate_der,
            certificate_pem.to_string(),
            key_pair,
            policy,
            Some(next_serial),
        )
    }

    fn from_parts(
        certificate_der: CertificateDer<'static>,
        certificate_pem: String,
        key_pair: KeyPair,
        policy: SerialPolicy,
        next_serial: Option<u64>,
    ) -> CertResult<Self> {
        let info = CertificateInfo::from_der(&certificate_der)
            .map_err(|e| CertError::ChainParse(e.to_string()))?;

        info.ensure_can_sign()
            .map_err(|e| CertError::ChainParse(e.to_string()))?;

        if info.public_key.as_slice() != public_key_bytes(&key_pair) {
            return Err(CertError::ChainParse(format!(
                "Private key does not belong to authority '{}'",
                info.subject
            )));
        }

        // Re-read the authority from DER so leaves are always signed by what
        // the trust anchors actually contain
        let signer = CertificateParams::from_ca_cert_der(&certificate_der)
            .and_then(|params| params.self_signed(&key_pair))
            .map_err(|e| {
                CertError::ChainParse(format!("Failed to load authority certificate: {}", e))
            })?;

        let common_name = info
            .subject_common_name
            .clone()
            .unwrap_or_else(|| info.subject.clone());

        let serials = match next_serial {
            None => SerialAllocator::new(policy),
            Some(next) => {
                let own_serial = info.serial_u64().unwrap_or(u64::MAX);
                if policy == SerialPolicy::Sequential && next <= own_serial {
                    return Err(CertError::Signing(format!(
                        "Next serial {} must be greater than the serial of authority '{}'",
                        next, common_name
                    )));
                }
                SerialAllocator::starting_at(policy, next)
            }
        };

        debug!("Loaded signing authority CN={}", common_name);

        Ok(Self {
            common_name,
            certificate_der,
            certificate_pem,
            not_after: info.not_after,
            signer,
            key_pair,
            serials,
        })
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn certificate_der(&self) -> &CertificateDer<'static> {
        &self.certificate_der
    }

    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    pub fn serial_policy(&self) -> SerialPolicy {
        self.serials.policy()
    }

    /// Serial the next sequential leaf will receive
    pub fn next_serial(&self) -> u64 {
        self.serials.next_serial()
    }

    /// Trust-anchor set containing only this authority
    pub fn trust_anchors(&self) -> TrustAnchorSet {
        TrustAnchorSet::from_root(self.certificate_der.clone())
    }

    /// Issue a server-authentication leaf bound to `hostnames`
    pub fn issue_server_leaf(
        &self,
        common_name: &str,
        hostnames: &[String],
        validity: ValidityWindow,
    ) -> CertResult<IssuedCertificate> {
        self.issue_leaf(IdentityRole::ServerLeaf, common_name, hostnames, validity)
    }

    /// Issue a client-authentication leaf
    pub fn issue_client_leaf(
        &self,
        common_name: &str,
        validity: ValidityWindow,
    ) -> CertResult<IssuedCertificate> {
        self.issue_leaf(IdentityRole::ClientLeaf, common_name, &[], validity)
    }

    fn issue_leaf(
        &self,
        role: IdentityRole,
        common_name: &str,
        hostnames: &[String],
        validity: ValidityWindow,
    ) -> CertResult<IssuedCertificate> {
        if role.is_ca() {
            return Err(CertError::Signing(
                "Intermediate authorities are not supported".to_string(),
            ));
        }

        let mut params = build_template(role, common_name, hostnames, &validity)?;

        if validity.not_after().unix_timestamp() > self.not_after {
            warn!(
                "{} certificate CN={} outlives its authority CN={}",
                role, common_name, self.common_name
            );
        }

        let key_pair = generate_keypair()?;
        let serial = self.serials.allocate();
        params.serial_number = Some(serial::to_rcgen(serial));

        let certificate = params
            .signed_by(&key_pair, &self.signer, &self.key_pair)
            .map_err(|e| CertError::Signing(format!("Failed to sign {}: {}", role, e)))?;

        info!(
            "Issued {} certificate CN={} serial={} issuer={}",
            role, common_name, serial, self.common_name
        );

        Ok(IssuedCertificate::new(
            role,
            common_name,
            serial,
            certificate,
            key_pair,
        ))
    }
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authority")
            .field("common_name", &self.common_name)
            .field("serial_policy", &self.serials.policy())
            .finish_non_exhaustive()
    }
}
