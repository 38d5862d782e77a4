//! Built-in sponsorship programs.

use crate::program::{ContractFunction, ContractId, SponsorshipProgram};
use std::collections::BTreeMap;

/// `(address, name, function)` of the NOT send-many contract.
pub const SEND_MANY_NOT_CONTRACT: (&str, &str, &str) = (
    "SP32AEEF6WW5Y0NMJ1S8SBSZDAY8R5J32NBZFPKKZ",
    "nope",
    "send-many",
);
pub const MINIMUM_NOT_FEES: u64 = 10_000;

/// `(address, name, function)` of the sBTC transfer-many entry point.
pub const SBTC_CONTRACT: (&str, &str, &str) = (
    "SM3VDXK3WZZSA84XXFKAFAF15NNZX32CTSG82JFQ4",
    "sbtc-token",
    "transfer-many",
);
pub const MINIMUM_SBTC_SATS_FEES: u64 = 100;

pub const FAK_CONTRACTS: &[(&str, &str)] = &[
    ("SPV9K21TBFAK4KNRJXF5DFP8N7W46G4V9RCJDC22", "b-faktory-pool"),
    ("SPV9K21TBFAK4KNRJXF5DFP8N7W46G4V9RCJDC22", "buy-with-aibtc-faktory"),
    ("SPV9K21TBFAK4KNRJXF5DFP8N7W46G4V9RCJDC22", "buy-with-velar-faktory"),
    ("SPV9K21TBFAK4KNRJXF5DFP8N7W46G4V9RCJDC22", "buy-with-btc-faktory"),
    ("SP6SA6BTPNN5WDAWQ7GWJF1T5E2KWY01K9SZDBJQ", "pepe-faktory-pool-v2"),
    ("SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS", "sbtc-fakfun-amm-lp-v1"),
];

pub const NEON_DEPLOYER: &str = "SPP3HM2E4JXGT26G1QRWQ2YTR5WT040S5NKXZYFC";
pub const NEON_CONTRACTS: &[&str] = &[
    "invaders-neon",
    "stx-ft-swap",
    "sub100neon-invader",
    "neon-invader",
];

/// Named programs, looked up by the path segment of a sponsor request.
#[derive(Debug, Clone, Default)]
pub struct ProgramRegistry {
    programs: BTreeMap<String, SponsorshipProgram>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, program: SponsorshipProgram) {
        self.programs.insert(name.into(), program);
    }

    pub fn get(&self, name: &str) -> Option<&SponsorshipProgram> {
        self.programs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SponsorshipProgram)> {
        self.programs.iter().map(|(name, p)| (name.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

fn function((address, name, function): (&str, &str, &str)) -> ContractFunction {
    ContractFunction::new(address, name, function)
}

/// The programs every deployment serves. `dao` is only registered when a
/// deployer address is configured.
pub fn builtin_programs(dao_deployer: Option<&str>) -> ProgramRegistry {
    let mut registry = ProgramRegistry::new();

    registry.insert(
        "not",
        SponsorshipProgram::FixedContractFee {
            target: function(SEND_MANY_NOT_CONTRACT),
            min_fee: MINIMUM_NOT_FEES,
        },
    );
    registry.insert(
        "sbtc",
        SponsorshipProgram::FixedContractFee {
            target: function(SBTC_CONTRACT),
            min_fee: MINIMUM_SBTC_SATS_FEES,
        },
    );
    registry.insert(
        "fak",
        SponsorshipProgram::AllowList {
            contracts: FAK_CONTRACTS
                .iter()
                .map(|(address, name)| ContractId::new(*address, *name))
                .collect(),
            min_fee: None,
        },
    );
    registry.insert(
        "neon",
        SponsorshipProgram::AllowList {
            contracts: NEON_CONTRACTS
                .iter()
                .map(|name| ContractId::new(NEON_DEPLOYER, *name))
                .collect(),
            min_fee: None,
        },
    );
    registry.insert("smart-wallet-sbtc", SponsorshipProgram::AnyContractCall);

    if let Some(deployer) = dao_deployer.filter(|d| !d.is_empty()) {
        registry.insert(
            "dao",
            SponsorshipProgram::SignerRestricted {
                signer: deployer.to_string(),
            },
        );
    }

    registry
}
