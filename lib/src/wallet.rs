use std::fs;
use std::path::Path;

use log::info;

use crate::crypto::PrivateKey;
use crate::error::WalletError;
use crate::Address;

/// A node wallet: one secp256k1 key, stored hex-encoded in a single file.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub privkey: PrivateKey,
    pub address: Address,
}

impl Wallet {
    fn from_key(privkey: PrivateKey) -> Self {
        let address = privkey.public_key().to_address();
        Self { privkey, address }
    }

    /// Read the wallet file, or create one with a fresh key if it does not
    /// exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self, WalletError> {
        if path.exists() {
            let hex_key = fs::read_to_string(path)?;
            let privkey = PrivateKey::from_hex(&hex_key).ok_or(WalletError::InvalidKey)?;
            Ok(Self::from_key(privkey))
        } else {
            let privkey = PrivateKey::generate();
            fs::write(path, privkey.to_hex())?;
            let wallet = Self::from_key(privkey);
            info!(
                "generated new wallet {} at {}",
                wallet.address,
                path.display()
            );
            Ok(wallet)
        }
    }
}
