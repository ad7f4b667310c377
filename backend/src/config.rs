use std::time::Duration;

use rpcpool::EndpointConfig;

/// Fixed recipient for every payment intent, used when the environment does
/// not override it.
const DEFAULT_PAYMENT_ADDRESS: &str = "t1YbZxQmvNckC4GWKyuJVxcHfuDAQq5kHdV";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// SQLite database file.
    pub database_path: String,

    /// HTTP listen port.
    pub port: u16,

    /// The drop's payment address; every intent points buyers here.
    pub payment_address: String,

    /// Upstream JSON-RPC providers, each with its own daily quota.
    pub endpoints: Vec<EndpointConfig>,

    /// Fixed confirmed-block scan period. Not adaptive: block scans are
    /// cheap relative to the total budget and correctness-critical.
    pub block_scan_period: Duration,

    /// How often stale sessions are swept.
    pub sweep_period: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "mintgate.db".to_string());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let payment_address = std::env::var("PAYMENT_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_PAYMENT_ADDRESS.to_string());

        let endpoints = match std::env::var("RPC_ENDPOINTS") {
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .enumerate()
                .map(|(i, url)| EndpointConfig::new(format!("rpc-{}", i + 1), url))
                .collect(),
            Err(_) => default_endpoints(),
        };

        Self {
            database_path,
            port,
            payment_address,
            endpoints,
            block_scan_period: observer::BLOCK_SCAN_PERIOD,
            sweep_period: Duration::from_secs(60),
        }
    }
}

fn default_endpoints() -> Vec<EndpointConfig> {
    [
        ("nownodes", "https://zec.nownodes.io"),
        ("getblock", "https://go.getblock.io/zec"),
        ("tatum", "https://zcash-mainnet.gateway.tatum.io"),
        ("chainstack", "https://zcash-mainnet.core.chainstack.com"),
        ("quicknode", "https://long-wild-glitter.zcash-mainnet.quiknode.pro"),
    ]
    .into_iter()
    .map(|(name, url)| EndpointConfig::new(name, url))
    .collect()
}
