//! Random store passwords.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use zeroize::Zeroizing;

/// Length of generated keystore and truststore passwords.
pub const PASSWORD_LEN: usize = 48;

/// Generate an alphanumeric password of `len` characters from the OS CSPRNG.
pub fn generate_password(len: usize) -> Zeroizing<String> {
    Zeroizing::new(
        OsRng
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect(),
    )
}

/// Generate a store password of the default length.
pub fn generate_store_password() -> Zeroizing<String> {
    generate_password(PASSWORD_LEN)
}
