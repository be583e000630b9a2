//! Warehouse selection: which warehouses may ship to a country in a channel.

use std::collections::HashMap;
use std::sync::Arc;

use stockline_core::{ChannelSlug, CountryCode, WarehouseId};

/// Ordered candidate warehouses for a destination (nearest or highest
/// priority first).
pub trait WarehousePolicy: Send + Sync {
    fn candidates(&self, country: &CountryCode, channel: &ChannelSlug) -> Vec<WarehouseId>;
}

impl<P> WarehousePolicy for Arc<P>
where
    P: WarehousePolicy + ?Sized,
{
    fn candidates(&self, country: &CountryCode, channel: &ChannelSlug) -> Vec<WarehouseId> {
        (**self).candidates(country, channel)
    }
}

/// Static priority lists: per (channel, country) with a channel-wide fallback.
#[derive(Debug, Clone, Default)]
pub struct PriorityWarehousePolicy {
    by_country: HashMap<(ChannelSlug, CountryCode), Vec<WarehouseId>>,
    by_channel: HashMap<ChannelSlug, Vec<WarehouseId>>,
}

impl PriorityWarehousePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warehouses serving every country of `channel`, in priority order.
    pub fn with_channel(mut self, channel: ChannelSlug, warehouses: Vec<WarehouseId>) -> Self {
        self.by_channel.insert(channel, warehouses);
        self
    }

    /// Override for one country of `channel`.
    pub fn with_country(
        mut self,
        channel: ChannelSlug,
        country: CountryCode,
        warehouses: Vec<WarehouseId>,
    ) -> Self {
        self.by_country.insert((channel, country), warehouses);
        self
    }
}

impl WarehousePolicy for PriorityWarehousePolicy {
    fn candidates(&self, country: &CountryCode, channel: &ChannelSlug) -> Vec<WarehouseId> {
        self.by_country
            .get(&(channel.clone(), country.clone()))
            .or_else(|| self.by_channel.get(channel))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_override_wins_over_channel_list() {
        let web = ChannelSlug::new("web").unwrap();
        let (eu, us) = (WarehouseId::new(), WarehouseId::new());
        let policy = PriorityWarehousePolicy::new()
            .with_channel(web.clone(), vec![us, eu])
            .with_country(web.clone(), CountryCode::new("DE").unwrap(), vec![eu]);

        assert_eq!(policy.candidates(&CountryCode::new("DE").unwrap(), &web), vec![eu]);
        assert_eq!(policy.candidates(&CountryCode::new("US").unwrap(), &web), vec![us, eu]);
    }

    #[test]
    fn unknown_channel_has_no_candidates() {
        let policy = PriorityWarehousePolicy::new();
        let none = policy.candidates(&CountryCode::new("US").unwrap(), &ChannelSlug::new("pos").unwrap());
        assert!(none.is_empty());
    }
}
