//! Fee line-item extraction from send-many style calls.

use crate::transaction::{ClarityValue, ContractCall};

/// One `{to, amount}` entry of a send-many argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub to: String,
    pub amount: u128,
}

/// All well-formed `{to, amount}` tuples in the call's first argument.
/// Entries missing either field, or with the wrong value types, are skipped.
pub fn payment_lines(call: &ContractCall) -> Vec<Payment> {
    let Some(ClarityValue::List(items)) = call.function_args.first() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let ClarityValue::Tuple(fields) = item else {
                return None;
            };
            match (fields.get("to"), fields.get("amount")) {
                (Some(ClarityValue::Principal(to)), Some(ClarityValue::UInt(amount))) => Some(Payment {
                    to: to.clone(),
                    amount: *amount,
                }),
                _ => None,
            }
        })
        .collect()
}

/// First line item addressed to `recipient` (exact match).
pub fn payment_to(call: &ContractCall, recipient: &str) -> Option<Payment> {
    payment_lines(call).into_iter().find(|p| p.to == recipient)
}
