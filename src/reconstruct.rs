//!
//! Repair of certificate chains truncated by deduplicating keystore formats.
//!
use crate::{cert::Certificate, verify::is_self_signed};

/// Extend `chain` towards its root.
///
/// While the last certificate is not self-signed, `search` is asked for a certificate whose
/// subject equals the last certificate's issuer. The match is appended unless it is already part
/// of the chain. The walk stops when there is no match, so an incomplete result is not an error.
///
/// The output starts with the input, and running the function again on its own output returns
/// it unchanged.
pub fn reconstruct<F>(chain: Vec<Certificate>, mut search: F) -> Vec<Certificate>
where
    F: FnMut(&str) -> Option<Certificate>,
{
    let mut chain = chain;

    while let Some(last) = chain.last() {
        if is_self_signed(last) {
            break;
        }

        let issuer = last.issuer().to_owned();
        match search(&issuer) {
            Some(parent) if !chain.contains(&parent) => {
                log::debug!("Appending {} to chain", parent.subject());
                chain.push(parent);
            }
            Some(_) => {
                log::debug!("Issuer {issuer} is already in the chain, stopping");
                break;
            }
            None => {
                log::debug!("No certificate found for issuer {issuer}");
                break;
            }
        }
    }

    chain
}
