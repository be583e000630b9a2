//! Collaborators the completer delegates to, with simple default adapters.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use stockline_sales::{Address, CustomerRef, Order};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("customer directory lock poisoned")]
    Poisoned,
}

/// Customer identity lookup.
///
/// `Ok(None)` means no customer has that email; a lookup that could not be
/// answered is an error.
pub trait CustomerDirectory: Send + Sync {
    fn find_by_email(&self, email: &str) -> Result<Option<CustomerRef>, DirectoryError>;
}

impl<D> CustomerDirectory for Arc<D>
where
    D: CustomerDirectory + ?Sized,
{
    fn find_by_email(&self, email: &str) -> Result<Option<CustomerRef>, DirectoryError> {
        (**self).find_by_email(email)
    }
}

/// Customers keyed by case-insensitive email.
#[derive(Debug, Default)]
pub struct InMemoryCustomerDirectory {
    by_email: RwLock<HashMap<String, CustomerRef>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, customer: CustomerRef) -> Result<(), DirectoryError> {
        let mut by_email = self.by_email.write().map_err(|_| DirectoryError::Poisoned)?;
        by_email.insert(customer.email.to_lowercase(), customer);
        Ok(())
    }
}

impl CustomerDirectory for InMemoryCustomerDirectory {
    fn find_by_email(&self, email: &str) -> Result<Option<CustomerRef>, DirectoryError> {
        let by_email = self.by_email.read().map_err(|_| DirectoryError::Poisoned)?;
        Ok(by_email.get(&email.to_lowercase()).cloned())
    }
}

/// Builds the text an order is found by in back-office search.
pub trait SearchDocumentBuilder: Send + Sync {
    fn build(&self, order: &Order) -> String;
}

impl<B> SearchDocumentBuilder for Arc<B>
where
    B: SearchDocumentBuilder + ?Sized,
{
    fn build(&self, order: &Order) -> String {
        (**self).build(order)
    }
}

/// Lower-cased, newline separated: order id, customer email, address
/// fields, line SKUs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSearchDocument;

impl SearchDocumentBuilder for DefaultSearchDocument {
    fn build(&self, order: &Order) -> String {
        let mut parts = vec![order.id_typed().to_string()];
        parts.extend(order.customer_email().map(str::to_owned));
        for address in [order.billing_address(), order.shipping_address()]
            .into_iter()
            .flatten()
        {
            push_address(&mut parts, address);
        }
        parts.extend(order.lines().iter().map(|l| l.variant.sku.clone()));

        let mut document = parts.join("\n").to_lowercase();
        document.push('\n');
        document
    }
}

fn push_address(parts: &mut Vec<String>, address: &Address) {
    parts.push(format!("{} {}", address.first_name, address.last_name));
    parts.push(address.street_address.clone());
    parts.push(format!("{} {}", address.postal_code, address.city));
    parts.push(address.country.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockline_core::CustomerId;

    #[test]
    fn directory_lookup_ignores_case() {
        let directory = InMemoryCustomerDirectory::new();
        let customer = CustomerRef {
            id: CustomerId::new(),
            email: "Jane@Example.com".into(),
        };
        directory.register(customer.clone()).unwrap();

        assert_eq!(directory.find_by_email("jane@example.com"), Ok(Some(customer)));
        assert_eq!(directory.find_by_email("john@example.com"), Ok(None));
    }

    #[test]
    fn poisoned_directory_reports_an_error() {
        let directory = Arc::new(InMemoryCustomerDirectory::new());

        let poisoner = Arc::clone(&directory);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.by_email.write().unwrap();
            panic!("poison the directory lock");
        })
        .join();

        assert_eq!(
            directory.find_by_email("jane@example.com"),
            Err(DirectoryError::Poisoned)
        );
        let customer = CustomerRef {
            id: CustomerId::new(),
            email: "jane@example.com".into(),
        };
        assert_eq!(directory.register(customer), Err(DirectoryError::Poisoned));
    }
}
