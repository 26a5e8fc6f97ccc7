pub mod card_payment_service;
pub mod cart_service;
pub mod fulfillment_service;
pub mod order_service;
pub mod payment_intent_service;
pub mod push_payment_service;

/// Trimmed value, or `None` when absent or blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
