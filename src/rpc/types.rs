use serde::Deserialize;

fn de_hex32<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
    use serde::de::Error;
    let s = String::deserialize(deserializer)?;
    let bytes = hex::decode(&s).map_err(Error::custom)?;
    bytes.try_into().map_err(|_| Error::custom("expected 32-byte hex string"))
}

fn de_hex_bytes<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    use serde::de::Error;
    let s = String::deserialize(deserializer)?;
    hex::decode(&s).map_err(Error::custom)
}

/// `getblock(hash, 2)` response: a fully decoded block with nested
/// transactions, as returned at verbosity level 2.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    #[serde(deserialize_with = "de_hex32")]
    pub hash: [u8; 32],
    pub height: i32,
    #[serde(deserialize_with = "de_hex32")]
    pub previousblockhash: [u8; 32],
    #[serde(deserialize_with = "de_hex32")]
    pub merkleroot: [u8; 32],
    pub time: i64,
    pub mediantime: i64,
    pub nonce: u32,
    pub bits: String,
    pub difficulty: f64,
    pub chainwork: String,
    pub size: i32,
    pub strippedsize: i32,
    pub weight: i32,
    pub version: i32,
    pub tx: Vec<RawTransaction>,
    pub nextblockhash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    #[serde(deserialize_with = "de_hex32")]
    pub txid: [u8; 32],
    #[serde(deserialize_with = "de_hex32")]
    pub hash: [u8; 32],
    pub version: i32,
    pub size: i32,
    pub vsize: i32,
    pub weight: i32,
    #[serde(alias = "lock_time")]
    pub locktime: u32,
    pub fee: Option<f64>,
    pub vin: Vec<RawVin>,
    pub vout: Vec<RawVout>,
    /// Full raw transaction hex, present at verbosity level 2; used
    /// verbatim as the `checkpackage` input.
    pub hex: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVin {
    pub coinbase: Option<String>,
    pub txid: Option<String>,
    pub vout: Option<i32>,
    pub sequence: u32,
    #[serde(default)]
    pub txinwitness: Vec<String>,
    #[serde(rename = "scriptSig", default)]
    pub script_sig: Option<RawScript>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawScript {
    pub hex: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVout {
    pub value: f64,
    pub n: i32,
    #[serde(rename = "scriptPubKey")]
    pub script_pubkey: RawScript,
}

/// `getrawmempool(true)` response: txid -> entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MempoolEntry {
    pub time: i64,
    #[serde(default)]
    pub depends: Vec<String>,
}

/// `getblockmeta`/`gettxmeta`/`checkpackage` response shape.
#[derive(Debug, Clone, Deserialize)]
pub struct SpacesBlockMeta {
    #[serde(default)]
    pub tx_meta: Vec<MetaTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaTransaction {
    #[serde(deserialize_with = "de_hex32")]
    pub txid: [u8; 32],
    #[serde(default)]
    pub create: Vec<MetaCreate>,
    #[serde(default)]
    pub update: Vec<MetaUpdate>,
    #[serde(default)]
    pub spend: Vec<MetaSpend>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaCreate {
    #[serde(rename = "type")]
    pub covenant_type: String,
    pub n: i32,
    pub name: Option<String>,
    pub value: f64,
    #[serde(rename = "scriptPubKey", deserialize_with = "de_hex_bytes")]
    pub script_pubkey: Vec<u8>,
    #[serde(flatten)]
    pub covenant: CovenantFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaUpdate {
    pub output: MetaOutputRef,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaOutputRef {
    #[serde(rename = "type")]
    pub covenant_type: String,
    pub txid: String,
    pub n: i32,
    pub name: Option<String>,
    pub value: f64,
    #[serde(rename = "scriptPubKey", deserialize_with = "de_hex_bytes")]
    pub script_pubkey: Vec<u8>,
    pub covenant: Option<CovenantFields>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaSpend {
    pub n: i32,
    pub script_error: Option<ScriptError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CovenantFields {
    #[serde(default)]
    pub burn_increment: Option<f64>,
    #[serde(default)]
    pub total_burned: Option<f64>,
    #[serde(default)]
    pub claim_height: Option<i32>,
    #[serde(default)]
    pub expire_height: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_hex")]
    pub signature: Option<Vec<u8>>,
}

fn de_opt_hex<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
    let opt: Option<String> = Option::deserialize(deserializer)?;
    opt.map(|s| hex::decode(&s).map_err(serde::de::Error::custom)).transpose()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolloutRow {
    pub name: String,
    pub value: i64,
}
