//!
//! Certificate chain verification.
//!
//! A chain is ordered leaf first. Each certificate must name the next one as its issuer and
//! carry a signature that verifies under the next one's public key. The last certificate is
//! not checked any further: whether it is trusted is up to the caller.
//!
use crate::{
    cert::Certificate,
    error::{ChainVerificationError, VerificationFailure},
    provider,
};

/// Check the signature of `cert` against the public key of `issuer`
fn verify_signature(cert: &Certificate, issuer: &Certificate) -> Result<(), VerificationFailure> {
    let parts = cert
        .signed_parts()
        .map_err(|_| VerificationFailure::MalformedCertificate)?;
    let key = issuer
        .public_key()
        .map_err(|_| VerificationFailure::MalformedCertificate)?;

    provider::require()?.verify(&key, parts.algorithm, &parts.tbs, &parts.signature)?;
    Ok(())
}

/// Verify every link of a chain, stopping at the first failure.
///
/// An empty or single-element chain is valid.
pub fn verify_chain(chain: &[Certificate]) -> Result<(), ChainVerificationError> {
    for (position, link) in chain.windows(2).enumerate() {
        let (cert, issuer) = (&link[0], &link[1]);

        if cert.issuer() != issuer.subject() {
            return Err(ChainVerificationError {
                position,
                reason: VerificationFailure::IssuerMismatch,
            });
        }

        verify_signature(cert, issuer).map_err(|reason| ChainVerificationError { position, reason })?;
    }
    Ok(())
}

/// Subject equals issuer and the certificate verifies under its own key.
/// Any failure to decide counts as not self-signed.
pub fn is_self_signed(cert: &Certificate) -> bool {
    cert.subject() == cert.issuer() && verify_signature(cert, cert).is_ok()
}
