use super::{open, Crypt4ghError, KEY_LEN, NONCE_LEN};
use curve25519_dalek::montgomery::MontgomeryPoint;
use std::fmt;
use std::path::Path;

const KEY_MAGIC: &[u8] = b"c4gh-v1";
const PRIVATE_KEY_TAG: &str = "CRYPT4GH PRIVATE KEY";

// scrypt parameters fixed by the c4gh-v1 key format
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// X25519 private key of a Crypt4GH recipient.
#[derive(Clone)]
pub struct PrivateKey {
    secret: [u8; KEY_LEN],
    public: [u8; KEY_LEN],
}

impl PrivateKey {
    pub fn from_bytes(secret: [u8; KEY_LEN]) -> Self {
        let public = MontgomeryPoint::mul_base_clamped(secret).to_bytes();
        Self { secret, public }
    }

    pub fn generate() -> Self {
        Self::from_bytes(rand::random())
    }

    pub fn public_key(&self) -> [u8; KEY_LEN] {
        self.public
    }

    pub(crate) fn diffie_hellman(&self, peer: &[u8; KEY_LEN]) -> [u8; KEY_LEN] {
        MontgomeryPoint(*peer).mul_clamped(self.secret).to_bytes()
    }

    /// Load a PEM-armoured `c4gh-v1` private key file.
    pub fn load(path: impl AsRef<Path>, passphrase: &str) -> Result<Self, Crypt4ghError> {
        let path = path.as_ref();
        let contents = std::fs::read(path).map_err(|e| {
            Crypt4ghError::InvalidKey(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_pem(&contents, passphrase)
    }

    /// Parse a `c4gh-v1` private key, decrypting it with `passphrase` when the
    /// file is protected.
    pub fn from_pem(contents: &[u8], passphrase: &str) -> Result<Self, Crypt4ghError> {
        let pem = pem::parse(contents).map_err(|e| Crypt4ghError::InvalidKey(e.to_string()))?;
        if pem.tag() != PRIVATE_KEY_TAG {
            return Err(Crypt4ghError::InvalidKey(format!(
                "unexpected PEM block {}",
                pem.tag()
            )));
        }

        let mut fields = Fields(pem.contents());
        if fields.take(KEY_MAGIC.len())? != KEY_MAGIC {
            return Err(Crypt4ghError::InvalidKey("not a c4gh-v1 key".to_string()));
        }

        let kdf = fields.string()?;
        let salt = if kdf == b"none" {
            None
        } else {
            let options = fields.string()?;
            // rounds (u32 BE) then salt; scrypt ignores the rounds
            Some(options.get(4..).ok_or_else(|| {
                Crypt4ghError::InvalidKey("short kdf options".to_string())
            })?)
        };
        let cipher = fields.string()?;
        let data = fields.string()?;

        let secret = match (cipher, salt) {
            (b"none", None) => data.to_vec(),
            (b"chacha20_poly1305", Some(salt)) => {
                if kdf != b"scrypt" {
                    return Err(Crypt4ghError::InvalidKey(format!(
                        "unsupported kdf {}",
                        String::from_utf8_lossy(kdf)
                    )));
                }
                let key = derive_key(passphrase, salt)?;
                if data.len() < NONCE_LEN {
                    return Err(Crypt4ghError::InvalidKey("short encrypted key".to_string()));
                }
                open(&key, data).ok_or(Crypt4ghError::BadPassphrase)?
            }
            _ => {
                return Err(Crypt4ghError::InvalidKey(format!(
                    "unsupported cipher {} with kdf {}",
                    String::from_utf8_lossy(cipher),
                    String::from_utf8_lossy(kdf)
                )))
            }
        };

        let secret: [u8; KEY_LEN] = secret
            .as_slice()
            .try_into()
            .map_err(|_| Crypt4ghError::InvalidKey("private key must be 32 bytes".to_string()))?;

        Ok(Self::from_bytes(secret))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], Crypt4ghError> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| Crypt4ghError::InvalidKey(e.to_string()))?;
    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut key)
        .map_err(|e| Crypt4ghError::InvalidKey(e.to_string()))?;
    Ok(key)
}

/// Cursor over the length-prefixed fields of a key file.
struct Fields<'a>(&'a [u8]);

impl<'a> Fields<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], Crypt4ghError> {
        if self.0.len() < n {
            return Err(Crypt4ghError::InvalidKey("key file is truncated".to_string()));
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn string(&mut self) -> Result<&'a [u8], Crypt4ghError> {
        let len = self.take(2)?;
        let len = u16::from_be_bytes([len[0], len[1]]) as usize;
        self.take(len)
    }
}
