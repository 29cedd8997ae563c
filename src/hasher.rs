/// Content hashing for fingerprints and snapshot file names.
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha512};

/// Digest algorithm selected by the `hash_algorithm` config key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3, 256-bit output.
    Blake3,
    /// SHA-256. The default.
    #[default]
    Sha256,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Config spelling of the algorithm.
    pub const fn name(self) -> &'static str {
        return match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        };
    }
}

/// Hash arbitrary bytes to a lowercase hex string.
pub fn digest(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    return match algorithm {
        HashAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
        HashAlgorithm::Sha512 => format!("{:x}", Sha512::digest(bytes)),
    };
}

/// Hash a block of captured lines as one unit. Lines are joined with `\n`
/// so line-ending style does not affect the result.
pub fn digest_lines<S: AsRef<str>>(algorithm: HashAlgorithm, lines: &[S]) -> String {
    let joined = lines.iter().map(|l| return l.as_ref()).collect::<Vec<_>>().join("\n");
    return digest(algorithm, joined.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_are_lowercase_hex_of_expected_width() {
        let sha256 = digest(HashAlgorithm::Sha256, b"abc");
        assert_eq!(
            sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest(HashAlgorithm::Sha512, b"abc").len(), 128);
        assert_eq!(digest(HashAlgorithm::Blake3, b"abc").len(), 64);
    }

    #[test]
    fn line_digest_ignores_line_ending_style() {
        let a = digest_lines(HashAlgorithm::Sha256, &["x", "y"]);
        let b = digest(HashAlgorithm::Sha256, b"x\ny");
        assert_eq!(a, b);
    }
}
