//! Hashes the redacted artifact, signs the hash with a persistent
//! ECDSA P-256 key, and embeds the signature in the PDF's `Keywords`
//! metadata field.

use std::path::{Path, PathBuf};

use chrono::Utc;
use ecdsa::signature::{Signer as _, Verifier as _};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};

const ALGORITHM: &str = "ECDSA-P256-SHA256";

#[derive(Debug, Serialize, Deserialize)]
struct EmbeddedSignature {
    secure_doc_ai_signature: String,
    sha256: String,
    signed_at: String,
    algorithm: String,
}

pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    /// Loads the key at `keys_dir/signing_key.pem`, generating and
    /// persisting one if absent.
    pub fn load_or_generate(keys_dir: &Path) -> Result<Self> {
        let key_path = Self::key_path(keys_dir);
        let signing_key = if key_path.exists() {
            let pem = std::fs::read_to_string(&key_path)?;
            SigningKey::from_pkcs8_pem(&pem)
                .map_err(|e| PipelineError::Signing(format!("corrupt signing key: {e}")))?
        } else {
            std::fs::create_dir_all(keys_dir)?;
            let key = SigningKey::random(&mut OsRng);
            let pem = key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| PipelineError::Signing(format!("could not encode signing key: {e}")))?;
            std::fs::write(&key_path, pem.as_str())?;
            key
        };
        Ok(Self { signing_key })
    }

    fn key_path(keys_dir: &Path) -> PathBuf {
        keys_dir.join("signing_key.pem")
    }

    /// Signs `input`, embeds the signature into its metadata, and
    /// writes the result to `output`.
    pub fn sign(&self, input: &Path, output: &Path) -> Result<()> {
        let bytes = std::fs::read(input)?;
        let digest_hex = hex::encode(Sha256::digest(&bytes));
        let signature: Signature = self.signing_key.sign(digest_hex.as_bytes());

        let embedded = EmbeddedSignature {
            secure_doc_ai_signature: hex::encode(signature.to_bytes()),
            sha256: digest_hex,
            signed_at: Utc::now().to_rfc3339(),
            algorithm: ALGORITHM.to_string(),
        };
        let json = serde_json::to_string(&embedded)
            .map_err(|e| PipelineError::Signing(format!("could not serialize signature: {e}")))?;

        let mut doc = lopdf::Document::load(input)
            .map_err(|e| PipelineError::Signing(format!("could not open PDF to sign: {e}")))?;
        set_keywords(&mut doc, &json)?;
        doc.compress();
        doc.save(output)
            .map_err(|e| PipelineError::Signing(format!("could not save signed PDF: {e}")))?;
        Ok(())
    }

    /// Re-reads `file`'s embedded metadata and checks the signature
    /// against the stored hash. Does not recompute the hash from the
    /// file's current bytes.
    pub fn verify(&self, file: &Path) -> Result<bool> {
        let doc = lopdf::Document::load(file)
            .map_err(|e| PipelineError::Signing(format!("could not open PDF to verify: {e}")))?;
        let keywords = get_keywords(&doc)
            .ok_or_else(|| PipelineError::Signing("no embedded signature found".into()))?;
        let embedded: EmbeddedSignature = serde_json::from_str(&keywords)
            .map_err(|e| PipelineError::Signing(format!("malformed embedded signature: {e}")))?;

        let signature_bytes = hex::decode(&embedded.secure_doc_ai_signature)
            .map_err(|e| PipelineError::Signing(format!("malformed signature hex: {e}")))?;
        let signature = Signature::try_from(signature_bytes.as_slice())
            .map_err(|e| PipelineError::Signing(format!("malformed signature: {e}")))?;

        let verifying_key = VerifyingKey::from(&self.signing_key);
        Ok(verifying_key
            .verify(embedded.sha256.as_bytes(), &signature)
            .is_ok())
    }
}

fn set_keywords(doc: &mut lopdf::Document, value: &str) -> Result<()> {
    let info_id = match doc.trailer.get(b"Info").ok().and_then(|o| o.as_reference().ok()) {
        Some(id) => id,
        None => {
            let id = doc.add_object(lopdf::Dictionary::new());
            doc.trailer.set("Info", id);
            id
        }
    };
    let dict = doc
        .get_object_mut(info_id)
        .map_err(|e| PipelineError::Signing(format!("could not access Info dictionary: {e}")))?
        .as_dict_mut()
        .map_err(|e| PipelineError::Signing(format!("Info object is not a dictionary: {e}")))?;
    dict.set("Keywords", lopdf::Object::string_literal(value));
    Ok(())
}

fn get_keywords(doc: &lopdf::Document) -> Option<String> {
    let info_ref = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let dict = doc.get_object(info_ref).ok()?.as_dict().ok()?;
    let keywords = dict.get(b"Keywords").ok()?.as_str().ok()?;
    Some(String::from_utf8_lossy(keywords).into_owned())
}
