use crate::sponsor::SponsorRequest;
use serde::Deserialize;
use sponsor_policy::Network;

/// Body of `/sponsor/{program}` and `/check/{program}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SponsorBody {
    #[serde(alias = "txHex")]
    pub tx: TxHex,
    pub network: Network,
    #[serde(default, alias = "feesInNot")]
    pub fee: Option<DeclaredFee>,
}

impl From<SponsorBody> for SponsorRequest {
    fn from(body: SponsorBody) -> Self {
        SponsorRequest {
            tx: body.tx.into(),
            network: body.network,
            declared_fee: body.fee.map(|f| f.0),
        }
    }
}

/// Hex-encoded wire transaction; a leading `0x` is tolerated.
#[derive(Debug, Clone)]
pub struct TxHex {
    inner: Vec<u8>,
}

impl std::str::FromStr for TxHex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("0x");
        if digits.is_empty() {
            return Err("transaction hex is empty".into());
        }
        Ok(Self {
            inner: hex::decode(digits)
                .map_err(|err| format!("transaction hex could not be decoded: {err}"))?,
        })
    }
}

impl From<TxHex> for Vec<u8> {
    fn from(tx: TxHex) -> Self {
        tx.inner
    }
}

impl<'de> Deserialize<'de> for TxHex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tx_as_hex = <String as Deserialize>::deserialize(deserializer)?;
        tx_as_hex.parse().map_err(serde::de::Error::custom)
    }
}

/// Declared fee in the program's token unit. JSON numbers cover 64 bits;
/// larger amounts arrive as decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredFee(pub u128);

impl<'de> Deserialize<'de> for DeclaredFee {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(DeclaredFee(u128::from(n))),
            Raw::Text(s) => s
                .trim()
                .parse::<u128>()
                .map(DeclaredFee)
                .map_err(|err| serde::de::Error::custom(format!("invalid fee {s:?}: {err}"))),
        }
    }
}
