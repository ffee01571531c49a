// crates/nysm-cli/src/handlers.rs
// ============================================================================
// Module: Demo Action Handlers
// Description: The Cart/Inventory action handlers behind the CLI's `run`
//              and `test` subcommands.
// Purpose: Give the thin CLI a real, pure handler registry to dispatch
//          through, matching the Cart/Inventory actions spec §8's
//          concrete end-to-end scenarios (S1/S2) name literally.
// Dependencies: nysm-engine, nysm-ir, nysm-store
// ============================================================================

//! ## Overview
//! Handlers are a Rust-embedding concern spec.md deliberately leaves to
//! whoever constructs the engine (the "specification source language and
//! its loader" external collaborator, spec §1); a scenario's spec bundle
//! declares an action's *schema*, never its implementation. This module is
//! the one fixed handler registry the CLI ships, wired to the four actions
//! the canonical scenarios exercise: `Inventory.setStock`,
//! `Inventory.reserve`, `Cart.addItem`, `Cart.checkout`. It always uses a
//! single implicit cart, `"default"`, since none of those actions carry a
//! `cart_id` argument.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use nysm_engine::HandlerRegistry;
use nysm_ir::OutputCase;
use nysm_ir::Value;
use nysm_store::ConceptStateStore;
use nysm_store::Row;
use nysm_store::StoreError;

/// The fixed cart identity every demo action implicitly operates on.
const DEFAULT_CART_ID: &str = "default";

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Builds the registry backing the CLI's `run`/`test` subcommands.
#[must_use]
pub fn build_handler_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .register("Inventory.setStock", inventory_set_stock)
        .register("Inventory.reserve", inventory_reserve)
        .register("Cart.addItem", cart_add_item)
        .register("Cart.checkout", cart_checkout)
}

// ============================================================================
// SECTION: Inventory
// ============================================================================

/// `Inventory.setStock{item_id, quantity}` — (re)sets an item's stock level.
fn inventory_set_stock(args: &Value, state: &mut dyn ConceptStateStore) -> Result<(OutputCase, Value), StoreError> {
    let item_id = required_string(args, "item_id")?;
    let quantity = required_int(args, "quantity")?;
    state.upsert_row("inventory", inventory_row(&item_id, quantity))?;
    Ok((OutputCase::new("Set"), Value::object(std::iter::empty::<(String, Value)>())))
}

/// `Inventory.reserve{item_id, quantity}` — decrements stock, failing with
/// `InsufficientStock` rather than going negative.
fn inventory_reserve(args: &Value, state: &mut dyn ConceptStateStore) -> Result<(OutputCase, Value), StoreError> {
    let item_id = required_string(args, "item_id")?;
    let quantity = required_int(args, "quantity")?;
    let available = find_row(state, "inventory", "item_id", &item_id)?.and_then(|row| row.get("quantity").and_then(Value::as_int)).unwrap_or(0);

    if available < quantity {
        return Ok((
            OutputCase::new("InsufficientStock"),
            Value::object([("item_id".to_string(), Value::String(item_id))]),
        ));
    }

    let remaining = available - quantity;
    state.upsert_row("inventory", inventory_row(&item_id, remaining))?;
    Ok((
        OutputCase::new("Reserved"),
        Value::object([("item_id".to_string(), Value::String(item_id)), ("quantity_remaining".to_string(), Value::Int(remaining))]),
    ))
}

/// Builds an `inventory` row keyed by `item_id`.
fn inventory_row(item_id: &str, quantity: i64) -> Row {
    BTreeMap::from([
        ("id".to_string(), Value::String(item_id.to_string())),
        ("item_id".to_string(), Value::String(item_id.to_string())),
        ("quantity".to_string(), Value::Int(quantity)),
    ])
}

// ============================================================================
// SECTION: Cart
// ============================================================================

/// `Cart.addItem{item_id, quantity}` — records or replaces one cart line.
fn cart_add_item(args: &Value, state: &mut dyn ConceptStateStore) -> Result<(OutputCase, Value), StoreError> {
    let item_id = required_string(args, "item_id")?;
    let quantity = required_int(args, "quantity")?;
    let row = BTreeMap::from([
        ("id".to_string(), Value::String(format!("{DEFAULT_CART_ID}:{item_id}"))),
        ("cart_id".to_string(), Value::String(DEFAULT_CART_ID.to_string())),
        ("item_id".to_string(), Value::String(item_id)),
        ("quantity".to_string(), Value::Int(quantity)),
    ]);
    state.upsert_row("cart", row)?;
    Ok((OutputCase::new("Added"), Value::object(std::iter::empty::<(String, Value)>())))
}

/// `Cart.checkout{}` — succeeds only if every cart line has sufficient
/// stock; never mutates inventory itself (that happens via the
/// `Inventory.reserve` sync rule firing on `Success`).
fn cart_checkout(_args: &Value, state: &mut dyn ConceptStateStore) -> Result<(OutputCase, Value), StoreError> {
    let cart_lines: Vec<Row> = state.list_rows("cart")?.into_iter().filter(|row| row.get("cart_id").and_then(Value::as_str) == Some(DEFAULT_CART_ID)).collect();
    let inventory_rows = state.list_rows("inventory")?;

    let sufficient = cart_lines.iter().all(|line| {
        let Some(item_id) = line.get("item_id").and_then(Value::as_str) else {
            return false;
        };
        let Some(requested) = line.get("quantity").and_then(Value::as_int) else {
            return false;
        };
        let available = inventory_rows.iter().find(|row| row.get("item_id").and_then(Value::as_str) == Some(item_id)).and_then(|row| row.get("quantity")).and_then(Value::as_int).unwrap_or(0);
        available >= requested
    });

    let result = Value::object([("cart_id".to_string(), Value::String(DEFAULT_CART_ID.to_string()))]);
    if sufficient {
        Ok((OutputCase::new("Success"), result))
    } else {
        Ok((OutputCase::new("CheckoutFailed"), result))
    }
}

// ============================================================================
// SECTION: Argument Helpers
// ============================================================================

/// Reads a required string argument.
fn required_string(args: &Value, field: &str) -> Result<String, StoreError> {
    args.as_object().and_then(|fields| fields.get(field)).and_then(Value::as_str).map(ToString::to_string).ok_or_else(|| StoreError::Query(format!("missing or non-string argument '{field}'")))
}

/// Reads a required integer argument.
fn required_int(args: &Value, field: &str) -> Result<i64, StoreError> {
    args.as_object().and_then(|fields| fields.get(field)).and_then(Value::as_int).ok_or_else(|| StoreError::Query(format!("missing or non-int argument '{field}'")))
}

/// Finds the first row in `table` whose `key` column equals `value`.
fn find_row(state: &dyn ConceptStateStore, table: &str, key: &str, value: &str) -> Result<Option<Row>, StoreError> {
    Ok(state.list_rows(table)?.into_iter().find(|row| row.get(key).and_then(Value::as_str) == Some(value)))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use nysm_ir::TypeName;
    use nysm_store::InMemoryEventStore;

    use super::*;

    fn store_with_tables() -> InMemoryEventStore {
        let mut store = InMemoryEventStore::new();
        store.ensure_table("inventory", &[("item_id".to_string(), TypeName::String), ("quantity".to_string(), TypeName::Int)]).expect("ensure inventory table");
        store.ensure_table("cart", &[("cart_id".to_string(), TypeName::String), ("item_id".to_string(), TypeName::String), ("quantity".to_string(), TypeName::Int)]).expect("ensure cart table");
        store
    }

    #[test]
    fn checkout_succeeds_when_stock_covers_the_cart() {
        let mut store = store_with_tables();
        inventory_set_stock(&Value::object([("item_id".to_string(), Value::String("widget".to_string())), ("quantity".to_string(), Value::Int(10))]), &mut store).expect("set stock");
        cart_add_item(&Value::object([("item_id".to_string(), Value::String("widget".to_string())), ("quantity".to_string(), Value::Int(3))]), &mut store).expect("add item");
        let (case, _) = cart_checkout(&Value::object(std::iter::empty::<(String, Value)>()), &mut store).expect("checkout");
        assert_eq!(case.as_str(), "Success");
    }

    #[test]
    fn checkout_fails_when_stock_is_insufficient() {
        let mut store = store_with_tables();
        inventory_set_stock(&Value::object([("item_id".to_string(), Value::String("widget".to_string())), ("quantity".to_string(), Value::Int(1))]), &mut store).expect("set stock");
        cart_add_item(&Value::object([("item_id".to_string(), Value::String("widget".to_string())), ("quantity".to_string(), Value::Int(3))]), &mut store).expect("add item");
        let (case, _) = cart_checkout(&Value::object(std::iter::empty::<(String, Value)>()), &mut store).expect("checkout");
        assert_eq!(case.as_str(), "CheckoutFailed");
    }

    #[test]
    fn reserve_decrements_stock_and_rejects_overdraw() {
        let mut store = store_with_tables();
        inventory_set_stock(&Value::object([("item_id".to_string(), Value::String("widget".to_string())), ("quantity".to_string(), Value::Int(10))]), &mut store).expect("set stock");
        let (case, result) = inventory_reserve(&Value::object([("item_id".to_string(), Value::String("widget".to_string())), ("quantity".to_string(), Value::Int(3))]), &mut store).expect("reserve");
        assert_eq!(case.as_str(), "Reserved");
        assert_eq!(result.as_object().and_then(|fields| fields.get("quantity_remaining")).and_then(Value::as_int), Some(7));

        let (case, _) = inventory_reserve(&Value::object([("item_id".to_string(), Value::String("widget".to_string())), ("quantity".to_string(), Value::Int(100))]), &mut store).expect("reserve");
        assert_eq!(case.as_str(), "InsufficientStock");
    }
}
