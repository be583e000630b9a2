//! Integration event published once a draft has been completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_events::Event;
use stockline_inventory::Allocation;

use crate::catalog::Channel;
use crate::order::{Order, OrderLine};
use crate::party::PaymentRef;

/// A completed line with the allocations committed for it.
///
/// `allocations` is empty for lines whose variant does not track inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedLine {
    pub line: OrderLine,
    pub allocations: Vec<Allocation>,
}

impl AllocatedLine {
    pub fn allocated_quantity(&self) -> u32 {
        self.allocations.iter().map(|a| a.quantity).sum()
    }
}

/// "Order created" notification.
///
/// Carries a snapshot of the completed order so subscribers do not need to
/// read it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order: Order,
    pub channel: Channel,
    pub customer_email: Option<String>,
    /// Most recent payment, if any.
    pub payment: Option<PaymentRef>,
    pub lines: Vec<AllocatedLine>,
    pub from_draft: bool,
    pub occurred_at: DateTime<Utc>,
}

impl OrderCreated {
    /// Build the notification for an order completed from a draft.
    pub fn from_draft(
        order: Order,
        channel: Channel,
        lines: Vec<AllocatedLine>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let customer_email = order.customer_email().map(str::to_owned);
        let payment = order.last_payment().cloned();
        Self {
            order,
            channel,
            customer_email,
            payment,
            lines,
            from_draft: true,
            occurred_at,
        }
    }
}

impl Event for OrderCreated {
    fn event_type(&self) -> &'static str {
        "order.created"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockline_core::{ChannelId, ChannelSlug, CountryCode, LineId, OrderId, VariantId, WarehouseId};
    use stockline_inventory::AllocationSource;

    use crate::catalog::Variant;

    #[test]
    fn allocated_quantity_sums_sources() {
        let line = OrderLine {
            id: LineId::new(),
            variant: Variant::tracked(VariantId::new(), "SKU"),
            quantity: 5,
        };
        let allocation = |quantity| Allocation {
            line_id: line.id,
            variant_id: line.variant.id,
            source: AllocationSource::Warehouse(WarehouseId::new()),
            quantity,
            consumed_reservations: vec![],
        };
        let allocated = AllocatedLine {
            allocations: vec![allocation(3), allocation(2)],
            line: line.clone(),
        };
        assert_eq!(allocated.allocated_quantity(), 5);
    }

    #[test]
    fn from_draft_sets_flag_and_event_type() {
        let channel = Channel {
            id: ChannelId::new(),
            slug: ChannelSlug::new("web").unwrap(),
            default_country: CountryCode::new("US").unwrap(),
        };
        let event = OrderCreated::from_draft(
            Order::empty(OrderId::new()),
            channel,
            vec![],
            Utc::now(),
        );
        assert!(event.from_draft);
        assert!(event.payment.is_none());
        assert_eq!(event.event_type(), "order.created");
    }
}
