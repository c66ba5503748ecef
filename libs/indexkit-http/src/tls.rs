//! rustls setup for the HTTPS connector.

use rustls::RootCertStore;
use std::sync::{Arc, OnceLock};

/// OS root store, parsed once per process.
static NATIVE_ROOTS: OnceLock<Result<Arc<RootCertStore>, String>> = OnceLock::new();

fn load_native_roots() -> Result<Arc<RootCertStore>, String> {
    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }
    if result.certs.is_empty() {
        return Err("no native root CA certificates found in OS certificate store".to_owned());
    }

    let found = result.certs.len();
    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(result.certs);
    if added == 0 {
        return Err(format!(
            "no valid native root CA certificates parsed (found {found}, all {ignored} failed to parse)"
        ));
    }
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    tracing::debug!(count = added, "loaded native root certificates");
    Ok(Arc::new(store))
}

/// Crypto provider for TLS connections.
///
/// Uses the process-wide default when one is installed, otherwise an
/// aws-lc-rs provider that is not installed globally.
pub fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// rustls client configuration trusting the OS root store.
///
/// # Errors
/// Returns a description of the problem when the OS store is empty or none
/// of its certificates parse, so misconfiguration surfaces at build time
/// rather than during the first handshake.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, String> {
    let roots = NATIVE_ROOTS.get_or_init(load_native_roots).clone()?;

    let config = rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("failed to set TLS protocol versions: {e}"))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_native_roots_result_is_cached() {
        let first = native_roots_client_config().map(|_| ());
        let second = native_roots_client_config().map(|_| ());
        // Containers without an OS store fail both times with the same message.
        assert_eq!(first, second);
        assert!(NATIVE_ROOTS.get().is_some());
    }

    #[test]
    fn test_crypto_provider_available() {
        let provider = get_crypto_provider();
        assert!(!provider.cipher_suites.is_empty());
    }
}
