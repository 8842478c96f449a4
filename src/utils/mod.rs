mod crypto;
mod mask;

pub use crypto::SecretCipher;
pub use mask::mask_secret;
