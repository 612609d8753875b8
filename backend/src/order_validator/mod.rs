mod photos;

use shared::{LineItem, Order};

use photos::PhotoCounter;
pub use photos::PhotoCounting;

/// Line item whose uploaded photos don't match the ordered quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidItem {
    pub title: String,
    pub photo_count: u32,
    pub ordered_quantity: u32,
    pub difference: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    pub invalid_items: Vec<InvalidItem>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.invalid_items.is_empty()
    }

    /// Cites every mismatching item in line item order.
    pub fn reason(&self) -> Option<String> {
        if self.is_valid() {
            return None;
        }

        let items = self
            .invalid_items
            .iter()
            .map(|item| {
                format!(
                    "\"{}\": photos={}, ordered={}",
                    item.title, item.photo_count, item.ordered_quantity
                )
            })
            .collect::<Vec<_>>()
            .join("; ");

        Some(format!("Quantity mismatch: {items}"))
    }
}

/// Checks that every line item of the configured product carries one uploaded
/// photo per ordered unit.
#[derive(Debug, Clone)]
pub struct OrderValidator {
    product_name: String,
    counter: PhotoCounter,
}

impl OrderValidator {
    pub fn new(product_name: &str, counting: PhotoCounting) -> Self {
        Self {
            product_name: product_name.to_lowercase(),
            counter: PhotoCounter::new(counting),
        }
    }

    pub fn validate(&self, order: &Order) -> ValidationResult {
        let invalid_items = order
            .line_items
            .iter()
            .filter(|item| self.is_checked_product(item))
            .filter_map(|item| self.check_item(item))
            .collect();

        ValidationResult { invalid_items }
    }

    fn is_checked_product(&self, item: &LineItem) -> bool {
        item.title.to_lowercase().contains(&self.product_name)
    }

    fn check_item(&self, item: &LineItem) -> Option<InvalidItem> {
        let photo_count = self.counter.count(&item.properties);
        let ordered_quantity = item.quantity;

        tracing::debug!(
            title = %item.title,
            photo_count,
            ordered_quantity,
            "Line item checked"
        );

        (photo_count != ordered_quantity).then(|| InvalidItem {
            title: item.title.clone(),
            photo_count,
            ordered_quantity,
            difference: photo_count.abs_diff(ordered_quantity),
        })
    }
}
