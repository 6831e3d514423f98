use crate::config::Config;
use crate::error::Result;
use crate::requestor::Requestor;

/// The account balance, `GET /v1/balance`.
pub struct Balance;

impl Balance {
    pub const PATH: &'static str = "/v1/balance";

    pub fn retrieve(requestor: &Requestor, config: &Config) -> Result<serde_json::Value> {
        requestor.get(config, Self::PATH)
    }
}
