//! Read-only registries shared by every parse in the process.
//!
//! A catalog directory looks like:
//!
//! ```text
//! catalog/
//!   routes.yml
//!   parser.yml        (optional)
//!   contracts/*.yml
//!   layouts/*.yml     (optional)
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use log::info;

use crate::{
    config::ParserConfig, contract::ContractRegistry, layout::LayoutRegistry, router::Router,
};

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub router: Router,
    pub contracts: ContractRegistry,
    pub layouts: LayoutRegistry,
    pub config: ParserConfig,
}

pub(crate) fn yaml_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = fs::read_dir(dir)
        .with_context(|| format!("Listing {dir:?}"))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Listing {dir:?}"))?
        .into_iter()
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
        })
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

impl Catalog {
    pub fn new(
        router: Router,
        contracts: ContractRegistry,
        layouts: LayoutRegistry,
        config: ParserConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            router,
            contracts,
            layouts,
            config,
        })
    }

    pub fn load_dir(dir: &Path) -> Result<Self> {
        let routes = dir.join("routes.yml");
        ensure!(routes.exists(), "Catalog {dir:?} has no routes.yml");
        let router = Router::load(&routes)?;
        let contracts = ContractRegistry::load_dir(&dir.join("contracts"))
            .with_context(|| format!("Loading contracts from {dir:?}"))?;
        let layouts = LayoutRegistry::load_dir(&dir.join("layouts"))
            .with_context(|| format!("Loading layouts from {dir:?}"))?;
        let config_path = dir.join("parser.yml");
        let config = if config_path.exists() {
            ParserConfig::load(&config_path)?
        } else {
            ParserConfig::default()
        };
        let catalog = Self::new(router, contracts, layouts, config)?;
        catalog.check_routes()?;
        info!(
            "Loaded catalog {:?}: {} contract(s), {} layout(s)",
            dir,
            catalog.contracts.len(),
            catalog.layouts.len()
        );
        Ok(catalog)
    }

    /// Swaps in `config` after validating it.
    pub fn with_config(mut self, config: ParserConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Every route must point at a registered contract.
    pub fn check_routes(&self) -> Result<()> {
        for rule in self.router.rules() {
            ensure!(
                self.contracts.get(&rule.schema_id).is_some(),
                "Route '{}' points at unregistered contract '{}'",
                rule.pattern,
                rule.schema_id
            );
        }
        Ok(())
    }
}
