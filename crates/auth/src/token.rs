use rand::Rng;

/// Random 32-byte token, hex encoded.
///
/// Used for email verification, invitations and remember-me sessions.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.r#gen();
    hex::encode(bytes)
}
