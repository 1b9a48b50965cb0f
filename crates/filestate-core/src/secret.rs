//! HMAC key resolution: explicit argument, then environment, then fallback.

use zeroize::Zeroizing;

/// Environment variable consulted for the HMAC key when none is configured.
pub const HMAC_KEY_ENV: &str = "TF_FILE_HMAC_SECRET_KEY";

/// Hard coded key for unprotected files. Never persisted.
pub const UNPROTECTED_HMAC_SECRET: &str =
    "this-is-the-hmac-secret-key-that-will-be-used-to-calculate-the-hash-of-unprotected-files";

/// Supplies the HMAC key from outside the declared configuration.
///
/// Implementations must read at call time; callers never cache the result
/// across operations.
pub trait SecretSource {
    /// Returns the key, or `None` when unset or empty.
    fn secret_key(&self) -> Option<String>;

    /// Human readable origin, used in error messages.
    fn describe(&self) -> String;
}

impl<T: SecretSource + ?Sized> SecretSource for &T {
    fn secret_key(&self) -> Option<String> {
        (**self).secret_key()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Reads the key from a process environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvSecret {
    var: String,
}

impl EnvSecret {
    /// Source reading the given variable.
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    /// Name of the variable that is read.
    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Default for EnvSecret {
    fn default() -> Self {
        Self::new(HMAC_KEY_ENV)
    }
}

impl SecretSource for EnvSecret {
    fn secret_key(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|v| !v.is_empty())
    }

    fn describe(&self) -> String {
        self.var.clone()
    }
}

/// Fixed key, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticSecret(pub Option<String>);

impl StaticSecret {
    /// Source that never yields a key.
    pub fn none() -> Self {
        Self(None)
    }

    /// Source that always yields `key`.
    pub fn key(key: impl Into<String>) -> Self {
        Self(Some(key.into()))
    }
}

impl SecretSource for StaticSecret {
    fn secret_key(&self) -> Option<String> {
        self.0.clone().filter(|v| !v.is_empty())
    }

    fn describe(&self) -> String {
        HMAC_KEY_ENV.to_string()
    }
}

/// Which tier supplied the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// The resource's own `hmac_secret_key` field.
    Explicit,
    /// The secret source (environment).
    Environment,
    /// The hard coded constant.
    Fallback,
    /// Nothing was available; the key is empty.
    None,
}

/// A resolved key and its provenance. The value is wiped on drop.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    value: Zeroizing<String>,
    source: KeySource,
}

impl ResolvedKey {
    /// The key material; empty when `source` is [`KeySource::None`].
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Tier that supplied the key.
    pub fn source(&self) -> KeySource {
        self.source
    }

    /// True when no tier supplied a key.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Resolves the effective key: `explicit`, else `source`, else `fallback`.
///
/// Empty strings count as absent at every tier.
pub fn resolve_key(
    explicit: &str,
    source: &dyn SecretSource,
    fallback: Option<&str>,
) -> ResolvedKey {
    if !explicit.is_empty() {
        return ResolvedKey {
            value: Zeroizing::new(explicit.to_string()),
            source: KeySource::Explicit,
        };
    }
    if let Some(key) = source.secret_key() {
        return ResolvedKey {
            value: Zeroizing::new(key),
            source: KeySource::Environment,
        };
    }
    match fallback.filter(|f| !f.is_empty()) {
        Some(key) => ResolvedKey {
            value: Zeroizing::new(key.to_string()),
            source: KeySource::Fallback,
        },
        None => ResolvedKey {
            value: Zeroizing::new(String::new()),
            source: KeySource::None,
        },
    }
}
