// UTXO transactions: each input spends an output of an earlier transaction,
// each output locks value to a public-key hash. Signing covers a trimmed
// copy of the transaction with the referenced output's lock substituted in.

use crate::core::Blockchain;
use crate::error::{NodeError, Result};
use crate::storage::UTXOSet;
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, random_bytes,
    serialize, sha256_digest,
};
use crate::wallet::{address_to_pub_key_hash, validate_address, Wallet};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// Fixed block reward minted by every coinbase transaction.
pub const SUBSIDY: i64 = 10;

/// Output index carried by the single coinbase input.
pub const COINBASE_OUT_INDEX: i32 = -1;

const COINBASE_DATA_LEN: usize = 24;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: i32,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: i32) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i32 {
        self.vout
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    #[cfg(test)]
    pub fn corrupt_signature(&mut self, byte_index: usize) {
        self.signature[byte_index] ^= 0x01;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: i64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    /// Build an output locked to the public-key hash behind `address`.
    pub fn new(value: i64, address: &str) -> Result<TXOutput> {
        if value <= 0 {
            return Err(NodeError::MalformedMessage(
                "Output value must be positive".to_string(),
            ));
        }
        Ok(TXOutput {
            value,
            pub_key_hash: address_to_pub_key_hash(address)?,
        })
    }

    pub fn get_value(&self) -> i64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

/// The value stored under a `utxo-<txid>` key: the still-unspent outputs
/// of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutputs {
    pub outputs: Vec<TXOutput>,
}

impl TXOutputs {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<TXOutputs> {
        deserialize(bytes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Mint the block reward to `to`. An empty `data` is replaced with 24
    /// random bytes, hex-encoded, so every coinbase hashes uniquely.
    pub fn new_coinbase_tx(to: &str, data: &[u8]) -> Result<Transaction> {
        let data = if data.is_empty() {
            HEXLOWER.encode(&random_bytes(COINBASE_DATA_LEN)?).into_bytes()
        } else {
            data.to_vec()
        };

        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_OUT_INDEX,
            signature: vec![],
            pub_key: data,
        };
        let tx_output = TXOutput::new(SUBSIDY, to)?;

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![tx_output],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Build and sign a transfer funded from `wallet`'s unspent outputs.
    pub fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: i64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount <= 0 {
            return Err(NodeError::MalformedMessage(
                "Amount must be positive".to_string(),
            ));
        }
        if !validate_address(to) {
            return Err(NodeError::InvalidAddress(to.to_string()));
        }

        let from = wallet.get_address();
        let pub_key_hash = crate::wallet::hash_pub_key(wallet.get_public_key());
        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(pub_key_hash.as_slice(), amount)?;

        if accumulated < amount {
            return Err(NodeError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER
                .decode(txid_hex.as_bytes())
                .map_err(|e| NodeError::Serialization(format!("Invalid transaction id: {e}")))?;
            for out in outs {
                inputs.push(TXInput {
                    txid: txid.clone(),
                    vout: out as i32,
                    signature: vec![],
                    pub_key: wallet.get_public_key().to_vec(),
                });
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        if accumulated > amount {
            // change back to the sender
            outputs.push(TXOutput::new(accumulated - amount, &from)?);
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;

        utxo_set
            .get_blockchain()
            .sign_tx(&mut tx, wallet.get_pkcs8())?;
        Ok(tx)
    }

    /// Copy with every input's signature and public key cleared; the signing
    /// preimage is derived from this.
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput::new(input.get_txid(), input.get_vout()))
            .collect();
        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    /// Sign every input against the transactions it spends. Coinbase
    /// transactions have nothing to sign.
    pub(crate) fn sign(&mut self, blockchain: &Blockchain, pkcs8: &[u8]) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut tx_copy = self.trimmed_copy();

        for (idx, vin) in self.vin.iter_mut().enumerate() {
            let prev_tx = blockchain.find_transaction(vin.get_txid()).ok_or_else(|| {
                NodeError::PrevTxMissing(HEXLOWER.encode(vin.get_txid()))
            })?;
            let prev_out = prev_tx.output_at(vin.get_vout())?;

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_out.get_pub_key_hash().to_vec();
            tx_copy.id = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            vin.signature = ecdsa_p256_sha256_sign_digest(pkcs8, tx_copy.get_id())?;
        }
        Ok(())
    }

    /// Verify every input's signature against the referenced outputs.
    /// The symmetric procedure to `sign`.
    pub(crate) fn verify(&self, blockchain: &Blockchain) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let mut tx_copy = self.trimmed_copy();

        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_tx = blockchain.find_transaction(vin.get_txid()).ok_or_else(|| {
                NodeError::PrevTxMissing(HEXLOWER.encode(vin.get_txid()))
            })?;
            let prev_out = prev_tx.output_at(vin.get_vout())?;

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_out.get_pub_key_hash().to_vec();
            tx_copy.id = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            if !ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                tx_copy.get_id(),
            ) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn output_at(&self, vout: i32) -> Result<&TXOutput> {
        if vout < 0 || vout as usize >= self.vout.len() {
            return Err(NodeError::MalformedMessage(format!(
                "Output index {vout} out of bounds"
            )));
        }
        Ok(&self.vout[vout as usize])
    }

    /// A coinbase has exactly one input with an empty previous id and the
    /// reserved output index.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1
            && self.vin[0].txid.is_empty()
            && self.vin[0].vout == COINBASE_OUT_INDEX
    }

    /// The transaction id: SHA-256 of the serialization with `id` cleared.
    fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(&tx_copy.serialize()?))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }

    #[cfg(test)]
    pub fn vin_mut(&mut self) -> &mut [TXInput] {
        self.vin.as_mut_slice()
    }
}
