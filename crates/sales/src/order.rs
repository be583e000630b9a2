use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{
    Aggregate, AggregateRoot, CountryCode, DomainError, Entity, LineId, Money, OrderId,
};
use stockline_events::Event;
use stockline_inventory::{AllocationRequest, CheckoutToken};

use crate::catalog::{Channel, Variant};
use crate::party::{Address, CustomerRef, PaymentRef};

/// Order status lifecycle.
///
/// Only `Draft -> Unfulfilled` is driven here; the remaining states belong to
/// fulfilment and cancellation flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Unconfirmed,
    Unfulfilled,
    PartiallyFulfilled,
    Fulfilled,
    Canceled,
}

/// Order line: variant snapshot and requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: LineId,
    pub variant: Variant,
    pub quantity: u32,
}

impl Entity for OrderLine {
    type Id = LineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl OrderLine {
    /// Allocation request for this line, with the strategy resolved at `now`.
    pub fn allocation_request(
        &self,
        owner: Option<CheckoutToken>,
        now: DateTime<Utc>,
    ) -> AllocationRequest {
        AllocationRequest {
            line_id: self.id,
            variant_id: self.variant.id,
            quantity: self.quantity,
            strategy: self.variant.allocation_strategy(now),
            owner,
        }
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    channel: Option<Channel>,
    status: OrderStatus,
    currency: String,
    shipping_required: bool,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    shipping_method_name: Option<String>,
    shipping_price: Option<Money>,
    customer: Option<CustomerRef>,
    user_email: Option<String>,
    checkout_token: Option<CheckoutToken>,
    search_document: String,
    payments: Vec<PaymentRef>,
    lines: Vec<OrderLine>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            channel: None,
            status: OrderStatus::Draft,
            currency: String::new(),
            shipping_required: false,
            shipping_address: None,
            billing_address: None,
            shipping_method_name: None,
            shipping_price: None,
            customer: None,
            user_email: None,
            checkout_token: None,
            search_document: String::new(),
            payments: Vec::new(),
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn is_draft(&self) -> bool {
        matches!(self.status, OrderStatus::Draft)
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_shipping_required(&self) -> bool {
        self.shipping_required
    }

    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    pub fn shipping_method_name(&self) -> Option<&str> {
        self.shipping_method_name.as_deref()
    }

    pub fn shipping_price(&self) -> Option<&Money> {
        self.shipping_price.as_ref()
    }

    pub fn customer(&self) -> Option<&CustomerRef> {
        self.customer.as_ref()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    pub fn checkout_token(&self) -> Option<CheckoutToken> {
        self.checkout_token
    }

    pub fn search_document(&self) -> &str {
        &self.search_document
    }

    pub fn payments(&self) -> &[PaymentRef] {
        &self.payments
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Country used for warehouse selection: the shipping address for orders
    /// that ship, the billing address otherwise, then the channel default.
    pub fn country(&self) -> Option<CountryCode> {
        let address = if self.shipping_required {
            self.shipping_address.as_ref()
        } else {
            self.billing_address.as_ref()
        };
        address
            .map(|a| a.country.clone())
            .or_else(|| self.channel.as_ref().map(|c| c.default_country.clone()))
    }

    /// Email of the linked customer, falling back to the email typed on the order.
    pub fn customer_email(&self) -> Option<&str> {
        self.customer
            .as_ref()
            .map(|c| c.email.as_str())
            .or(self.user_email.as_deref())
    }

    /// Most recently created payment.
    pub fn last_payment(&self) -> Option<&PaymentRef> {
        self.payments.iter().max_by_key(|p| p.created_at)
    }

    /// Checks a draft must pass before it can be completed.
    pub fn validate_for_completion(&self) -> Result<(), DomainError> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("order has no lines"));
        }
        if self.billing_address.is_none() {
            return Err(DomainError::validation("billing address is required"));
        }
        if self.shipping_required {
            if self.shipping_address.is_none() {
                return Err(DomainError::validation(
                    "shipping address is required for orders that need shipping",
                ));
            }
            if self.shipping_method_name.is_none() {
                return Err(DomainError::validation(
                    "shipping method is required for orders that need shipping",
                ));
            }
        }
        Ok(())
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateDraftOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDraftOrder {
    pub order_id: OrderId,
    pub channel: Channel,
    pub currency: String,
    pub shipping_required: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: OrderId,
    pub line_id: LineId,
    pub variant: Variant,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetShippingAddress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetShippingAddress {
    pub order_id: OrderId,
    pub address: Address,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetBillingAddress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBillingAddress {
    pub order_id: OrderId,
    pub address: Address,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetShippingMethod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetShippingMethod {
    pub order_id: OrderId,
    pub name: String,
    pub price: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetCustomer (as typed by staff on the draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCustomer {
    pub order_id: OrderId,
    pub customer: Option<CustomerRef>,
    pub user_email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachCheckout (reservations of this checkout belong to the order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachCheckout {
    pub order_id: OrderId,
    pub checkout_token: CheckoutToken,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub order_id: OrderId,
    pub payment: PaymentRef,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResolveCustomer.
///
/// `found` is the result of looking up `user_email` in the customer
/// directory; it is only consulted when no customer is linked yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveCustomer {
    pub order_id: OrderId,
    pub found: Option<CustomerRef>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: NormalizeShipping (drop shipping data of orders that do not ship).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeShipping {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteDraft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteDraft {
    pub order_id: OrderId,
    pub search_document: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateDraftOrder(CreateDraftOrder),
    AddLine(AddLine),
    SetShippingAddress(SetShippingAddress),
    SetBillingAddress(SetBillingAddress),
    SetShippingMethod(SetShippingMethod),
    SetCustomer(SetCustomer),
    AttachCheckout(AttachCheckout),
    RecordPayment(RecordPayment),
    ResolveCustomer(ResolveCustomer),
    NormalizeShipping(NormalizeShipping),
    CompleteDraft(CompleteDraft),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    DraftOrderCreated {
        order_id: OrderId,
        channel: Channel,
        currency: String,
        shipping_required: bool,
        occurred_at: DateTime<Utc>,
    },
    LineAdded {
        order_id: OrderId,
        line: OrderLine,
        occurred_at: DateTime<Utc>,
    },
    ShippingAddressSet {
        order_id: OrderId,
        address: Address,
        occurred_at: DateTime<Utc>,
    },
    BillingAddressSet {
        order_id: OrderId,
        address: Address,
        occurred_at: DateTime<Utc>,
    },
    ShippingMethodSet {
        order_id: OrderId,
        name: String,
        price: Money,
        occurred_at: DateTime<Utc>,
    },
    CustomerSet {
        order_id: OrderId,
        customer: Option<CustomerRef>,
        user_email: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    CheckoutAttached {
        order_id: OrderId,
        checkout_token: CheckoutToken,
        occurred_at: DateTime<Utc>,
    },
    PaymentRecorded {
        order_id: OrderId,
        payment: PaymentRef,
        occurred_at: DateTime<Utc>,
    },
    CustomerResolved {
        order_id: OrderId,
        customer: Option<CustomerRef>,
        user_email: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    ShippingCleared {
        order_id: OrderId,
        shipping_price: Money,
        occurred_at: DateTime<Utc>,
    },
    DraftCompleted {
        order_id: OrderId,
        search_document: String,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::DraftOrderCreated { .. } => "order.draft_created",
            OrderEvent::LineAdded { .. } => "order.line_added",
            OrderEvent::ShippingAddressSet { .. } => "order.shipping_address_set",
            OrderEvent::BillingAddressSet { .. } => "order.billing_address_set",
            OrderEvent::ShippingMethodSet { .. } => "order.shipping_method_set",
            OrderEvent::CustomerSet { .. } => "order.customer_set",
            OrderEvent::CheckoutAttached { .. } => "order.checkout_attached",
            OrderEvent::PaymentRecorded { .. } => "order.payment_recorded",
            OrderEvent::CustomerResolved { .. } => "order.customer_resolved",
            OrderEvent::ShippingCleared { .. } => "order.shipping_cleared",
            OrderEvent::DraftCompleted { .. } => "order.draft_completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::DraftOrderCreated { occurred_at, .. }
            | OrderEvent::LineAdded { occurred_at, .. }
            | OrderEvent::ShippingAddressSet { occurred_at, .. }
            | OrderEvent::BillingAddressSet { occurred_at, .. }
            | OrderEvent::ShippingMethodSet { occurred_at, .. }
            | OrderEvent::CustomerSet { occurred_at, .. }
            | OrderEvent::CheckoutAttached { occurred_at, .. }
            | OrderEvent::PaymentRecorded { occurred_at, .. }
            | OrderEvent::CustomerResolved { occurred_at, .. }
            | OrderEvent::ShippingCleared { occurred_at, .. }
            | OrderEvent::DraftCompleted { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::DraftOrderCreated {
                order_id,
                channel,
                currency,
                shipping_required,
                ..
            } => {
                self.id = *order_id;
                self.channel = Some(channel.clone());
                self.currency = currency.clone();
                self.shipping_required = *shipping_required;
                self.status = OrderStatus::Draft;
                self.lines.clear();
                self.created = true;
            }
            OrderEvent::LineAdded { line, .. } => {
                self.lines.push(line.clone());
            }
            OrderEvent::ShippingAddressSet { address, .. } => {
                self.shipping_address = Some(address.clone());
            }
            OrderEvent::BillingAddressSet { address, .. } => {
                self.billing_address = Some(address.clone());
            }
            OrderEvent::ShippingMethodSet { name, price, .. } => {
                self.shipping_method_name = Some(name.clone());
                self.shipping_price = Some(price.clone());
            }
            OrderEvent::CustomerSet {
                customer,
                user_email,
                ..
            }
            | OrderEvent::CustomerResolved {
                customer,
                user_email,
                ..
            } => {
                self.customer = customer.clone();
                self.user_email = user_email.clone();
            }
            OrderEvent::CheckoutAttached { checkout_token, .. } => {
                self.checkout_token = Some(*checkout_token);
            }
            OrderEvent::PaymentRecorded { payment, .. } => {
                self.payments.push(payment.clone());
            }
            OrderEvent::ShippingCleared { shipping_price, .. } => {
                self.shipping_method_name = None;
                self.shipping_price = Some(shipping_price.clone());
                // The address is owned by the order; dropping it releases it.
                self.shipping_address = None;
            }
            OrderEvent::DraftCompleted {
                search_document, ..
            } => {
                self.search_document = search_document.clone();
                self.status = OrderStatus::Unfulfilled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateDraftOrder(cmd) => self.handle_create(cmd),
            OrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            OrderCommand::SetShippingAddress(cmd) => {
                self.ensure_draft(cmd.order_id)?;
                Ok(vec![OrderEvent::ShippingAddressSet {
                    order_id: cmd.order_id,
                    address: cmd.address.clone(),
                    occurred_at: cmd.occurred_at,
                }])
            }
            OrderCommand::SetBillingAddress(cmd) => {
                self.ensure_draft(cmd.order_id)?;
                Ok(vec![OrderEvent::BillingAddressSet {
                    order_id: cmd.order_id,
                    address: cmd.address.clone(),
                    occurred_at: cmd.occurred_at,
                }])
            }
            OrderCommand::SetShippingMethod(cmd) => self.handle_set_shipping_method(cmd),
            OrderCommand::SetCustomer(cmd) => {
                self.ensure_draft(cmd.order_id)?;
                Ok(vec![OrderEvent::CustomerSet {
                    order_id: cmd.order_id,
                    customer: cmd.customer.clone(),
                    user_email: cmd.user_email.clone(),
                    occurred_at: cmd.occurred_at,
                }])
            }
            OrderCommand::AttachCheckout(cmd) => {
                self.ensure_draft(cmd.order_id)?;
                Ok(vec![OrderEvent::CheckoutAttached {
                    order_id: cmd.order_id,
                    checkout_token: cmd.checkout_token,
                    occurred_at: cmd.occurred_at,
                }])
            }
            OrderCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            OrderCommand::ResolveCustomer(cmd) => self.handle_resolve_customer(cmd),
            OrderCommand::NormalizeShipping(cmd) => self.handle_normalize_shipping(cmd),
            OrderCommand::CompleteDraft(cmd) => self.handle_complete(cmd),
        }
    }
}

impl Order {
    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_order_id(order_id)?;
        if !self.is_draft() {
            return Err(DomainError::invariant("order is not draft"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateDraftOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        // Validates the currency code.
        Money::zero(&cmd.currency)?;

        Ok(vec![OrderEvent::DraftOrderCreated {
            order_id: cmd.order_id,
            channel: cmd.channel.clone(),
            currency: cmd.currency.clone(),
            shipping_required: cmd.shipping_required,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_draft(cmd.order_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.lines.iter().any(|l| l.id == cmd.line_id) {
            return Err(DomainError::conflict("line already exists"));
        }

        Ok(vec![OrderEvent::LineAdded {
            order_id: cmd.order_id,
            line: OrderLine {
                id: cmd.line_id,
                variant: cmd.variant.clone(),
                quantity: cmd.quantity,
            },
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_set_shipping_method(
        &self,
        cmd: &SetShippingMethod,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_draft(cmd.order_id)?;

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("shipping method name cannot be empty"));
        }
        if cmd.price.currency() != self.currency {
            return Err(DomainError::validation("shipping price currency mismatch"));
        }

        Ok(vec![OrderEvent::ShippingMethodSet {
            order_id: cmd.order_id,
            name: cmd.name.clone(),
            price: cmd.price.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_record_payment(&self, cmd: &RecordPayment) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;
        if cmd.payment.amount.currency() != self.currency {
            return Err(DomainError::validation("payment currency mismatch"));
        }

        Ok(vec![OrderEvent::PaymentRecorded {
            order_id: cmd.order_id,
            payment: cmd.payment.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_resolve_customer(
        &self,
        cmd: &ResolveCustomer,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_draft(cmd.order_id)?;

        let (customer, user_email) = match (&self.customer, &self.user_email) {
            // A linked customer's email wins over whatever was typed.
            (Some(customer), _) => (Some(customer.clone()), Some(customer.email.clone())),
            (None, Some(email)) => (cmd.found.clone(), Some(email.clone())),
            (None, None) => return Ok(vec![]),
        };

        if customer == self.customer && user_email == self.user_email {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::CustomerResolved {
            order_id: cmd.order_id,
            customer,
            user_email,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_normalize_shipping(
        &self,
        cmd: &NormalizeShipping,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_draft(cmd.order_id)?;

        if self.shipping_required {
            return Ok(vec![]);
        }

        let zero = Money::zero(&self.currency)?;
        let already_clear = self.shipping_method_name.is_none()
            && self.shipping_address.is_none()
            && self.shipping_price.as_ref() == Some(&zero);
        if already_clear {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::ShippingCleared {
            order_id: cmd.order_id,
            shipping_price: zero,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_complete(&self, cmd: &CompleteDraft) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_draft(cmd.order_id)?;
        self.validate_for_completion()?;

        Ok(vec![OrderEvent::DraftCompleted {
            order_id: cmd.order_id,
            search_document: cmd.search_document.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }
}
