use secrecy::SecretString;

/// Secrets shared across the server, kept out of debug output via `secrecy`.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Static secret used to seal/open device tokens and derive per-device
    /// transport keys.
    pub device_secret: SecretString,
    /// HMAC key for access/refresh token signing.
    pub token_secret: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(device_secret: SecretString, token_secret: SecretString) -> Self {
        Self {
            device_secret,
            token_secret,
        }
    }
}
