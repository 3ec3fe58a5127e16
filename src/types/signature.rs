// Signature - Schémas de signature des requêtes
// Principle: Algorithms are opaque services, the engine only verifies
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain separation tag for request signatures, to prevent replay of a
/// signature over a payload of another kind.
pub const DOMAIN_REQUEST: &[u8] = b"moneta/request/v1";

/// Signing context for sr25519 signatures
const SR25519_CONTEXT: &[u8] = b"moneta";

/// Prepends a domain tag to a message before signing or verifying
pub fn domain_separate(domain: &[u8], message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(domain.len() + 1 + message.len());
    out.extend_from_slice(domain);
    out.push(b'/');
    out.extend_from_slice(message);
    out
}

/// Schéma de signature supporté pour les requêtes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureScheme {
    Ed25519,
    Sr25519,
}

impl SignatureScheme {
    pub fn name(&self) -> &'static str {
        match self {
            SignatureScheme::Ed25519 => "ed25519",
            SignatureScheme::Sr25519 => "sr25519",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ed25519" => Some(SignatureScheme::Ed25519),
            "sr25519" => Some(SignatureScheme::Sr25519),
            _ => None,
        }
    }

    /// Vérifie une signature. Une clé ou une signature malformée n'est
    /// jamais une erreur: la vérification échoue simplement.
    pub fn verify(&self, public_key_hex: &str, message: &[u8], signature: &[u8]) -> bool {
        let key_bytes = match hex::decode(public_key_hex) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        match self {
            SignatureScheme::Ed25519 => {
                use ed25519_dalek::{Signature, Verifier, VerifyingKey};

                let key_bytes: [u8; 32] = match key_bytes.try_into() {
                    Ok(bytes) => bytes,
                    Err(_) => return false,
                };
                let public_key = match VerifyingKey::from_bytes(&key_bytes) {
                    Ok(pk) => pk,
                    Err(_) => return false,
                };
                let signature_bytes: [u8; 64] = match signature.try_into() {
                    Ok(bytes) => bytes,
                    Err(_) => return false,
                };

                public_key
                    .verify(message, &Signature::from_bytes(&signature_bytes))
                    .is_ok()
            }
            SignatureScheme::Sr25519 => {
                let public_key = match schnorrkel::PublicKey::from_bytes(&key_bytes) {
                    Ok(pk) => pk,
                    Err(_) => return false,
                };
                let signature = match schnorrkel::Signature::from_bytes(signature) {
                    Ok(sig) => sig,
                    Err(_) => return false,
                };

                let context = schnorrkel::signing_context(SR25519_CONTEXT);
                public_key.verify(context.bytes(message), &signature).is_ok()
            }
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Paire de clés, utilisée par les clients et les tests pour signer des
/// requêtes. Le moteur lui-même ne signe jamais.
pub enum Keypair {
    Ed25519(ed25519_dalek::SigningKey),
    Sr25519(schnorrkel::Keypair),
}

impl Keypair {
    /// Génère une nouvelle paire de clés pour le schéma donné
    pub fn generate(scheme: SignatureScheme) -> Self {
        match scheme {
            SignatureScheme::Ed25519 => {
                use rand::rngs::OsRng;
                Keypair::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng))
            }
            SignatureScheme::Sr25519 => {
                let mini_secret = schnorrkel::MiniSecretKey::generate();
                Keypair::Sr25519(mini_secret.expand_to_keypair(schnorrkel::ExpansionMode::Ed25519))
            }
        }
    }

    pub fn scheme(&self) -> SignatureScheme {
        match self {
            Keypair::Ed25519(_) => SignatureScheme::Ed25519,
            Keypair::Sr25519(_) => SignatureScheme::Sr25519,
        }
    }

    /// Clé publique encodée en hex, telle que stockée dans le champ
    /// publicKey d'un compte
    pub fn public_key_hex(&self) -> String {
        match self {
            Keypair::Ed25519(signing_key) => {
                let verifying_key: ed25519_dalek::VerifyingKey = signing_key.into();
                hex::encode(verifying_key.to_bytes())
            }
            Keypair::Sr25519(keypair) => hex::encode(keypair.public.to_bytes()),
        }
    }

    /// Signe un message (déjà domain-séparé)
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Keypair::Ed25519(signing_key) => {
                use ed25519_dalek::Signer;
                signing_key.sign(message).to_bytes().to_vec()
            }
            Keypair::Sr25519(keypair) => {
                let context = schnorrkel::signing_context(SR25519_CONTEXT);
                keypair.sign(context.bytes(message)).to_bytes().to_vec()
            }
        }
    }
}
