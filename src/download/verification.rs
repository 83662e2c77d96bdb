use crate::constants::HASH_BUFFER_SIZE;
use crate::core::UpdateError;
use crate::descriptor::Checksum;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Hashing algorithms accepted in update descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = UpdateError;

    /// Case-insensitive; `SHA-256` and `SHA256` are equivalent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String =
            s.chars().filter(|c| *c != '-' && *c != '_').collect::<String>().to_ascii_uppercase();
        match normalized.as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(UpdateError::UnsupportedAlgorithm {
                algorithm: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
        };
        f.write_str(name)
    }
}

/// Verifies downloaded files against the checksum in an update descriptor.
///
/// Hashing streams the file through the digest on a blocking worker, so
/// multi-gigabyte archives are never held in memory.
///
/// # Examples
///
/// ```rust,no_run
/// use updraft::descriptor::Checksum;
/// use updraft::download::ChecksumVerifier;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), updraft::core::UpdateError> {
/// let checksum = Checksum::new("9e107d9d372bb6826bd81d3542a419d6", None);
/// ChecksumVerifier::verify(Path::new("update.zip"), &checksum).await?;
/// # Ok(())
/// # }
/// ```
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the lower-case hex digest of a file.
    pub async fn compute(file_path: &Path, algorithm: HashAlgorithm) -> Result<String, UpdateError> {
        debug!("Computing {} checksum for: {}", algorithm, file_path.display());

        let path = file_path.to_path_buf();
        tokio::task::spawn_blocking(move || hash_file(&path, algorithm))
            .await
            .map_err(|e| UpdateError::IoError(std::io::Error::other(e)))?
    }

    /// Verify a file against an expected checksum.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::UnsupportedAlgorithm`] for an unknown algorithm name
    /// - [`UpdateError::IntegrityError`] when the digests differ
    /// - [`UpdateError::IoError`] when the file cannot be read
    pub async fn verify(file_path: &Path, checksum: &Checksum) -> Result<(), UpdateError> {
        let algorithm: HashAlgorithm = checksum.algorithm_name().parse()?;
        let actual = Self::compute(file_path, algorithm).await?;
        let expected = checksum.value.trim();

        if actual.eq_ignore_ascii_case(expected) {
            info!("{} checksum verified for {}", algorithm, file_path.display());
            Ok(())
        } else {
            warn!(
                "{} checksum mismatch for {}: expected {}, got {}",
                algorithm,
                file_path.display(),
                expected,
                actual
            );
            Err(UpdateError::IntegrityError {
                path: file_path.display().to_string(),
                expected: expected.to_ascii_lowercase(),
                actual,
            })
        }
    }
}

fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String, UpdateError> {
    match algorithm {
        HashAlgorithm::Md5 => digest_file::<Md5>(path),
        HashAlgorithm::Sha1 => digest_file::<Sha1>(path),
        HashAlgorithm::Sha256 => digest_file::<Sha256>(path),
        HashAlgorithm::Sha384 => digest_file::<Sha384>(path),
        HashAlgorithm::Sha512 => digest_file::<Sha512>(path),
    }
}

fn digest_file<D: Digest>(path: &Path) -> Result<String, UpdateError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
