/*!
Crypto things
*/

/// Return the SHA256 hash of `bytes`
pub fn hash(bytes: &[u8]) -> Vec<u8> {
    let alg = &ring::digest::SHA256;
    let digest = ring::digest::digest(alg, bytes);
    Vec::from(digest.as_ref())
}

/// Return the SHA1 hash of `bytes`. Only for cache validators,
/// never for anything that has to resist collisions.
pub fn sha1(bytes: &[u8]) -> Vec<u8> {
    let digest = ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, bytes);
    Vec::from(digest.as_ref())
}

/// Hex encoded SHA256 of `bytes`
pub fn hash_hex(bytes: &[u8]) -> String {
    hex::encode(hash(bytes))
}
