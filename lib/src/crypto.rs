use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::codec;
use crate::error::SpendUnlockError;
use crate::types::{OutPoint, TxIn, TxOut, UnspentTxOut};
use crate::{Address, Hash};

/// Double SHA-256, rendered as 64 hex characters.
pub fn sha256d(data: &[u8]) -> Hash {
    hex::encode(Sha256::digest(Sha256::digest(data)))
}

/// base58check(0x00 || RIPEMD-160(SHA-256(pubkey)))
pub fn pubkey_to_address(pubkey: &[u8]) -> Address {
    let digest = Ripemd160::digest(Sha256::digest(pubkey));
    bs58::encode(digest).with_check_version(0x00).into_string()
}

#[derive(Debug, Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    pub fn generate() -> Self {
        Self(SigningKey::random(&mut OsRng))
    }

    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let bytes = hex::decode(hex_str.trim()).ok()?;
        SigningKey::from_slice(&bytes).ok().map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(*self.0.verifying_key())
    }

    /// Sign a spend message; the raw 64-byte r||s encoding goes into
    /// `TxIn.unlock_sig`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: EcdsaSignature = self.0.sign(message);
        signature.to_bytes().to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// SEC1 uncompressed point; these bytes travel in `TxIn.unlock_pk`.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(false).as_bytes().to_vec()
    }

    pub fn to_address(&self) -> Address {
        pubkey_to_address(&self.to_bytes())
    }
}

/// The message a spend signature commits to: the outpoint being consumed,
/// the signer's public key, the input's sequence number and every output
/// of the transaction.
pub fn build_spend_message(
    to_spend: &OutPoint,
    pubkey: &[u8],
    sequence: u32,
    txouts: &[TxOut],
) -> Vec<u8> {
    let preimage = format!(
        "{}{}{}{}",
        codec::serialize(to_spend),
        sequence,
        hex::encode(pubkey),
        codec::serialize(&txouts.to_vec()),
    );
    sha256d(preimage.as_bytes()).into_bytes()
}

/// Check that a txin is allowed to consume a UTXO: the key must hash to the
/// UTXO's address and the signature must verify over the spend message.
pub fn verify_spend(
    txin: &TxIn,
    utxo: &UnspentTxOut,
    txouts: &[TxOut],
) -> Result<(), SpendUnlockError> {
    let pubkey = txin
        .unlock_pk
        .as_deref()
        .ok_or(SpendUnlockError::MissingKey)?;
    let sig_bytes = txin
        .unlock_sig
        .as_deref()
        .ok_or(SpendUnlockError::MissingSignature)?;
    let to_spend = txin
        .to_spend
        .as_ref()
        .ok_or(SpendUnlockError::MissingOutPoint)?;

    if pubkey_to_address(pubkey) != utxo.to_address {
        return Err(SpendUnlockError::AddressMismatch);
    }

    let verifying_key =
        VerifyingKey::from_sec1_bytes(pubkey).map_err(|_| SpendUnlockError::MalformedKey)?;
    let signature =
        EcdsaSignature::from_slice(sig_bytes).map_err(|_| SpendUnlockError::MalformedSignature)?;
    let message = build_spend_message(to_spend, pubkey, txin.sequence, txouts);

    verifying_key
        .verify(&message, &signature)
        .map_err(|_| SpendUnlockError::BadSignature)
}
