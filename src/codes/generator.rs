use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of a generated access code.
pub const CODE_LENGTH: usize = 16;

/// Generate a random alphanumeric access code
pub fn generate_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_LENGTH)
        .map(char::from)
        .collect()
}
