//! Wire shapes for the upstream ledger's JSON-RPC results.

use mint::Amount;
use serde::Deserialize;

/// A block at verbosity 2: transactions fully decoded inline.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub hash: String,
    pub height: u64,
    #[serde(default)]
    pub tx: Vec<RawTx>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTx {
    pub txid: String,
    #[serde(default)]
    pub vout: Vec<TxOut>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxOut {
    pub value: f64,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl TxOut {
    pub fn pays_to(&self, address: &str) -> bool {
        self.script_pub_key.addresses.iter().any(|a| a == address)
    }

    pub fn amount(&self) -> Amount {
        Amount::from_coins_lossy(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_verbosity_two_block() {
        let raw = serde_json::json!({
            "hash": "00ab",
            "height": 7,
            "tx": [{
                "txid": "t1",
                "vout": [{
                    "value": 0.00500001,
                    "scriptPubKey": { "addresses": ["addr-main"] },
                }],
            }],
        });

        let block: Block = serde_json::from_value(raw).unwrap();
        let out = &block.tx[0].vout[0];
        assert!(out.pays_to("addr-main"));
        assert!(!out.pays_to("addr-other"));
        assert_eq!(out.amount().base_units(), 500_001);
    }

    #[test]
    fn tolerates_outputs_without_addresses() {
        let raw = serde_json::json!({ "value": 1.5, "scriptPubKey": {} });
        let out: TxOut = serde_json::from_value(raw).unwrap();
        assert!(!out.pays_to("addr-main"));
    }
}
