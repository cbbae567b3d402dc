//! Validation utilities

use crate::types::*;
use bigdecimal::BigDecimal;

/// Validate that an amount is strictly positive
pub fn validate_positive_amount(amount: &BigDecimal) -> BillingResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(BillingError::InvalidAmount(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an amount is zero or positive
pub fn validate_non_negative_amount(amount: &BigDecimal) -> BillingResult<()> {
    if *amount < BigDecimal::from(0) {
        Err(BillingError::InvalidAmount(
            "Amount cannot be negative".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an entity ID is usable as a storage key
pub fn validate_entity_id(id: &str) -> BillingResult<()> {
    if id.trim().is_empty() {
        return Err(BillingError::Validation(
            "Entity ID cannot be empty".to_string(),
        ));
    }

    if id.len() > 64 {
        return Err(BillingError::Validation(
            "Entity ID cannot exceed 64 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate a payment schedule before issuing an invoice
pub fn validate_schedule(amounts: &[BigDecimal]) -> BillingResult<()> {
    if amounts.is_empty() {
        return Err(BillingError::Validation(
            "Payment schedule must contain at least one fee".to_string(),
        ));
    }

    for amount in amounts {
        validate_positive_amount(amount)?;
    }

    Ok(())
}
