use base64ct::{Base64UrlUnpadded, Encoding};
use rand::Rng;

/// 10 random bytes, hex encoded (20 chars).
pub fn confirmation_code() -> String {
    let bytes: [u8; 10] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Same shape as the confirmation code.
pub fn reset_code() -> String {
    confirmation_code()
}

/// 16 random bytes, URL-safe base64 without padding (22 chars).
pub fn remember_token() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    Base64UrlUnpadded::encode_string(&bytes)
}
