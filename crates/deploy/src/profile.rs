//! Network profiles and their registry.
//!
//! Profiles are loaded once at process start from a TOML file merged with
//! `DROPSHIP_`-prefixed environment variables, validated eagerly, and never
//! mutated afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use url::Url;

use crate::{ConfigError, Credential};

/// Prefix for environment overrides, e.g.
/// `DROPSHIP_NETWORKS__MAINNET__CREDENTIAL=env:MAINNET_KEY`.
pub const ENV_PREFIX: &str = "DROPSHIP_";

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "dropship.toml";

/// Raw configuration as read from disk, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeployConfig {
    /// Name of the profile used when no network is selected.
    #[serde(default, alias = "defaultNetwork")]
    pub default_network: Option<String>,
    /// Network profiles keyed by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

/// Raw configuration of a single network.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkConfig {
    #[serde(default, alias = "url")]
    pub rpc_url: Option<String>,
    #[serde(default, alias = "account")]
    pub credential: Option<Credential>,
    /// Hardhat-style account list. Holds at most one credential.
    #[serde(default)]
    pub accounts: Vec<Credential>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Fixed gas price in wei.
    #[serde(default, alias = "gas_price")]
    pub gas_price_override: Option<u64>,
    #[serde(default)]
    pub gas_limit: Option<u64>,
    /// Factor applied to the estimated gas limit.
    #[serde(default)]
    pub gas_multiplier: Option<f64>,
    #[serde(default, alias = "default")]
    pub default_network: bool,
    #[serde(default)]
    pub live: bool,
    #[serde(default)]
    pub save_deployments: bool,
}

/// A validated, named bundle of connection and signing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkProfile {
    pub name: String,
    pub rpc_url: Url,
    /// Expected chain id. Discovered from the endpoint when absent.
    pub chain_id: Option<u64>,
    pub credential: Credential,
    pub gas_price_override: Option<u128>,
    pub gas_limit: Option<u64>,
    pub gas_multiplier: Option<f64>,
    pub default_network: bool,
    pub live: bool,
    pub save_deployments: bool,
}

impl NetworkProfile {
    fn from_config(name: &str, config: NetworkConfig) -> Result<Self, ConfigError> {
        let incomplete = |reason: &str| ConfigError::IncompleteProfile {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let rpc_url = config
            .rpc_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| incomplete("missing rpc_url"))?;
        let rpc_url =
            Url::parse(rpc_url.trim()).map_err(|_| incomplete("rpc_url is not a valid URL"))?;

        if config.accounts.len() > 1 {
            return Err(incomplete("accounts must list exactly one credential"));
        }
        if config.credential.is_some() && !config.accounts.is_empty() {
            return Err(incomplete("set either credential or accounts, not both"));
        }
        let credential = config
            .credential
            .or_else(|| config.accounts.into_iter().next())
            .filter(|credential| !credential.is_empty())
            .ok_or_else(|| incomplete("missing credential"))?;

        if let Some(multiplier) = config.gas_multiplier {
            if !multiplier.is_finite() || multiplier <= 0.0 {
                return Err(incomplete("gas_multiplier must be a positive number"));
            }
        }

        Ok(Self {
            name: name.to_string(),
            rpc_url,
            chain_id: config.chain_id,
            credential,
            gas_price_override: config.gas_price_override.map(u128::from),
            gas_limit: config.gas_limit,
            gas_multiplier: config.gas_multiplier,
            default_network: config.default_network,
            live: config.live,
            save_deployments: config.save_deployments,
        })
    }
}

/// Holds every configured profile and resolves the active one.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, NetworkProfile>,
    default: Option<String>,
}

impl ProfileRegistry {
    /// Load and validate profiles from a TOML file plus environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Load(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let config: DeployConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let registry = Self::from_config(config)?;
        tracing::info!(
            path = %path.display(),
            profiles = registry.profiles.len(),
            default = ?registry.default,
            "Network profiles loaded"
        );
        Ok(registry)
    }

    /// Validate a raw configuration. Fails on the first incomplete profile.
    pub fn from_config(config: DeployConfig) -> Result<Self, ConfigError> {
        let mut profiles = BTreeMap::new();
        for (name, network) in config.networks {
            let profile = NetworkProfile::from_config(&name, network)?;
            profiles.insert(name, profile);
        }

        let mut defaults: BTreeSet<String> = profiles
            .values()
            .filter(|profile| profile.default_network)
            .map(|profile| profile.name.clone())
            .collect();

        if let Some(name) = config.default_network {
            if !profiles.contains_key(&name) {
                return Err(ConfigError::UnknownProfile(name));
            }
            defaults.insert(name);
        }

        if defaults.len() > 1 {
            let names = defaults.into_iter().collect::<Vec<_>>().join(", ");
            return Err(ConfigError::AmbiguousDefault(names));
        }

        let default = defaults.into_iter().next();
        if let Some(name) = &default {
            if let Some(profile) = profiles.get_mut(name) {
                profile.default_network = true;
            }
        }

        Ok(Self { profiles, default })
    }

    /// Resolve a profile by name, or the default profile when no name is given.
    ///
    /// A name that is not in the registry never falls back to the default.
    pub fn resolve(&self, name: Option<&str>) -> Result<&NetworkProfile, ConfigError> {
        match name {
            Some(name) => self
                .profiles
                .get(name)
                .ok_or_else(|| ConfigError::UnknownProfile(name.to_string())),
            None => self
                .default
                .as_ref()
                .and_then(|name| self.profiles.get(name))
                .ok_or(ConfigError::NoDefaultProfile),
        }
    }

    /// All profiles, ordered by name.
    pub fn profiles(&self) -> impl Iterator<Item = &NetworkProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
