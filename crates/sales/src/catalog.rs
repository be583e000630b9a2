//! Catalog snapshots referenced by order lines and orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{ChannelId, ChannelSlug, CountryCode, VariantId};
use stockline_inventory::AllocationStrategy;

/// Preorder configuration of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreorderSettings {
    /// Preorder sales stop at this instant; `None` keeps it open.
    pub end_date: Option<DateTime<Utc>>,
}

/// Sellable product variant as seen by an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub sku: String,
    pub track_inventory: bool,
    pub preorder: Option<PreorderSettings>,
}

impl Variant {
    pub fn tracked(id: VariantId, sku: impl Into<String>) -> Self {
        Self {
            id,
            sku: sku.into(),
            track_inventory: true,
            preorder: None,
        }
    }

    pub fn is_preorder_active(&self, now: DateTime<Utc>) -> bool {
        match &self.preorder {
            Some(settings) => settings.end_date.is_none_or(|end| end > now),
            None => false,
        }
    }

    pub fn allocation_strategy(&self, now: DateTime<Utc>) -> AllocationStrategy {
        AllocationStrategy::resolve(self.track_inventory, self.is_preorder_active(now))
    }
}

/// Sales channel an order is placed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub slug: ChannelSlug,
    /// Used for warehouse selection when the order carries no address.
    pub default_country: CountryCode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn preorder_is_inactive_after_end_date() {
        let now = Utc::now();
        let mut variant = Variant::tracked(VariantId::new(), "SKU-1");
        assert!(!variant.is_preorder_active(now));

        variant.preorder = Some(PreorderSettings { end_date: Some(now + Duration::days(1)) });
        assert!(variant.is_preorder_active(now));
        assert_eq!(variant.allocation_strategy(now), AllocationStrategy::Preorder);

        variant.preorder = Some(PreorderSettings { end_date: Some(now - Duration::days(1)) });
        assert!(!variant.is_preorder_active(now));
        assert_eq!(variant.allocation_strategy(now), AllocationStrategy::Stock);
    }

    #[test]
    fn untracked_variant_is_skipped() {
        let variant = Variant {
            track_inventory: false,
            ..Variant::tracked(VariantId::new(), "GIFT-CARD")
        };
        assert_eq!(variant.allocation_strategy(Utc::now()), AllocationStrategy::Skip);
    }
}
