use rand::Rng;

/// 128 random bits, hex encoded. Used as the process identity.
pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 16]>())
}
