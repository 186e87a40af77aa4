//! Static `ConfigProvider`: a fixed configuration plus a fixed seed list,
//! suitable for a single-process node whose settings don't change at
//! runtime.

use async_trait::async_trait;

use crate::domain::address::Address;
use crate::domain::config::DhtConfig;
use crate::ports::ConfigProvider;

pub struct StaticDhtConfig {
    config: DhtConfig,
    seeds: Vec<Address>,
}

impl StaticDhtConfig {
    pub fn new(config: DhtConfig, seeds: Vec<Address>) -> Self {
        StaticDhtConfig { config, seeds }
    }
}

#[async_trait]
impl ConfigProvider for StaticDhtConfig {
    fn config(&self) -> DhtConfig {
        self.config.clone()
    }

    async fn starting_nodes(&self) -> Vec<Address> {
        self.seeds.clone()
    }
}
