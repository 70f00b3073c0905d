use crate::domain::errors::BrokerError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Price source quoting FX rates against a base currency
///
/// The returned map holds "units of target per one unit of base" for every
/// target the source could price. Missing targets are simply absent.
#[async_trait]
pub trait FxRateSource: Send + Sync {
    async fn get_fx_rates(
        &self,
        base_currency: &str,
        targets: &[String],
    ) -> Result<HashMap<String, f64>, BrokerError>;
}
