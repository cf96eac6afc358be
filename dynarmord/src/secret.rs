use anyhow::{ensure, Context as _, Result};
use dynarmor_network::ServerIdentity;
use rsa::{
    pkcs1::{DecodeRsaPrivateKey as _, DecodeRsaPublicKey as _},
    pkcs8::{
        DecodePrivateKey as _, DecodePublicKey as _, EncodePrivateKey as _,
        EncodePublicKey as _, LineEnding,
    },
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write as _,
    path::{Path, PathBuf},
};
use structopt::StructOpt;

const PEM_PREFIX: &[u8] = b"-----BEGIN";

#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, StructOpt)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// path to the RSA private key of the server
    ///
    /// PKCS#8 or PKCS#1, PEM or DER encoded
    #[structopt(
        long = "private-key",
        default_value = "private_key.pem",
        env = "DYNARMORD_PRIVATE_KEY_FILE"
    )]
    #[serde(default = "default_private_key")]
    pub private_key: PathBuf,

    /// path to the RSA public key of the server
    ///
    /// X.509 `SubjectPublicKeyInfo` or PKCS#1, PEM or DER encoded. If not
    /// set the public key is derived from the private key.
    #[structopt(long = "public-key", env = "DYNARMORD_PUBLIC_KEY_FILE")]
    #[serde(default)]
    pub public_key: Option<PathBuf>,
}

/// load the server's identity from the key files
///
/// the keys are checked to be a pair and to be large enough to carry
/// the session key envelope.
pub fn load(config: &Config) -> Result<ServerIdentity> {
    let private = read_private_key(&config.private_key)?;

    let identity = if let Some(public_key) = &config.public_key {
        let public = read_public_key(public_key)?;
        ServerIdentity::new(private, public).with_context(|| {
            format!(
                "Invalid key pair: {} and {}",
                config.private_key.display(),
                public_key.display()
            )
        })?
    } else {
        ServerIdentity::from_private_key(private)
            .with_context(|| format!("Invalid key: {}", config.private_key.display()))?
    };

    tracing::info!(fingerprint = %identity.fingerprint(), "secret loaded");

    Ok(identity)
}

/// write the identity's keys in PEM files
///
/// the private key is written as PKCS#8 and the public key as
/// X.509 `SubjectPublicKeyInfo`. Existing files are not overwritten.
pub fn save(identity: &ServerIdentity, private_key: &Path, public_key: &Path) -> Result<()> {
    let private_pem = identity
        .private_key()
        .to_pkcs8_pem(LineEnding::LF)
        .context("Cannot encode the private key")?;
    let public_pem = identity
        .public_key()
        .to_public_key_pem(LineEnding::LF)
        .context("Cannot encode the public key")?;

    write_new(private_key, private_pem.as_bytes(), 0o600)?;
    write_new(public_key, public_pem.as_bytes(), 0o644)?;

    Ok(())
}

fn read_private_key(path: &Path) -> Result<RsaPrivateKey> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot open the private key file {}", path.display()))?;

    let key = if bytes.starts_with(PEM_PREFIX) {
        let pem = std::str::from_utf8(&bytes).context("PEM file is not valid UTF-8")?;
        RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .context("Expecting a PKCS#8 or PKCS#1 PEM private key")
    } else {
        RsaPrivateKey::from_pkcs8_der(&bytes)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(&bytes))
            .context("Expecting a PKCS#8 or PKCS#1 DER private key")
    };

    key.with_context(|| format!("Cannot parse the private key file: {}", path.display()))
}

fn read_public_key(path: &Path) -> Result<RsaPublicKey> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot open the public key file {}", path.display()))?;

    let key = if bytes.starts_with(PEM_PREFIX) {
        let pem = std::str::from_utf8(&bytes).context("PEM file is not valid UTF-8")?;
        RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .context("Expecting a SubjectPublicKeyInfo or PKCS#1 PEM public key")
    } else {
        RsaPublicKey::from_public_key_der(&bytes)
            .or_else(|_| RsaPublicKey::from_pkcs1_der(&bytes))
            .context("Expecting a SubjectPublicKeyInfo or PKCS#1 DER public key")
    };

    key.with_context(|| format!("Cannot parse the public key file: {}", path.display()))
}

fn write_new(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    ensure!(!path.exists(), "File already exists: {}", path.display());

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt as _;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options
        .open(path)
        .with_context(|| format!("Cannot create file: {}", path.display()))?;
    file.write_all(content)
        .with_context(|| format!("Cannot write to file: {}", path.display()))
}

fn default_private_key() -> PathBuf {
    PathBuf::from("private_key.pem")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            private_key: default_private_key(),
            public_key: None,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use dynarmor_network::ServerIdentity;
    use rand::{rngs::StdRng, SeedableRng as _};
    use std::sync::{Arc, OnceLock};

    pub fn identity() -> Arc<ServerIdentity> {
        static IDENTITY: OnceLock<Arc<ServerIdentity>> = OnceLock::new();
        IDENTITY
            .get_or_init(|| {
                let mut rng = StdRng::seed_from_u64(0x5EC2_E700);
                Arc::new(ServerIdentity::generate(&mut rng, 1024).unwrap())
            })
            .clone()
    }

    pub fn other_identity() -> Arc<ServerIdentity> {
        static IDENTITY: OnceLock<Arc<ServerIdentity>> = OnceLock::new();
        IDENTITY
            .get_or_init(|| {
                let mut rng = StdRng::seed_from_u64(0x5EC2_E701);
                Arc::new(ServerIdentity::generate(&mut rng, 1024).unwrap())
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::{EncodeRsaPrivateKey as _, EncodeRsaPublicKey as _};

    #[test]
    fn saved_keys_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let identity = testing::identity();
        let config = Config {
            private_key: dir.path().join("private.pem"),
            public_key: Some(dir.path().join("public.pem")),
        };

        save(&identity, &config.private_key, config.public_key.as_ref().unwrap()).unwrap();
        let loaded = load(&config).unwrap();

        assert_eq!(loaded.fingerprint(), identity.fingerprint());
    }

    #[test]
    fn public_key_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let identity = testing::identity();
        let config = Config {
            private_key: dir.path().join("private.pem"),
            public_key: None,
        };

        save(&identity, &config.private_key, &dir.path().join("public.pem")).unwrap();
        let loaded = load(&config).unwrap();

        assert_eq!(loaded.fingerprint(), identity.fingerprint());
    }

    #[test]
    fn pkcs1_der_keys_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let identity = testing::identity();
        let config = Config {
            private_key: dir.path().join("private.der"),
            public_key: Some(dir.path().join("public.der")),
        };

        let private = identity.private_key().to_pkcs1_der().unwrap();
        let public = identity.public_key().to_pkcs1_der().unwrap();
        fs::write(&config.private_key, private.as_bytes()).unwrap();
        fs::write(config.public_key.as_ref().unwrap(), public.as_bytes()).unwrap();

        let loaded = load(&config).unwrap();

        assert_eq!(loaded.fingerprint(), identity.fingerprint());
    }

    #[test]
    fn mismatching_key_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("private.pem");
        let public = dir.path().join("public.pem");
        save(&testing::identity(), &private, &dir.path().join("unused.pem")).unwrap();
        save(&testing::other_identity(), &dir.path().join("unused2.pem"), &public).unwrap();

        let config = Config {
            private_key: private,
            public_key: Some(public),
        };

        assert!(load(&config).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            private_key: dir.path().join("private.pem"),
            public_key: None,
        };
        fs::write(&config.private_key, b"-----BEGIN nonsense").unwrap();

        assert!(load(&config).is_err());
    }

    #[test]
    fn save_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("private.pem");
        fs::write(&private, b"keep me").unwrap();

        assert!(save(&testing::identity(), &private, &dir.path().join("public.pem")).is_err());
        assert_eq!(fs::read(&private).unwrap(), b"keep me");
    }
}
