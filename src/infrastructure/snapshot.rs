//! Versioned snapshot of every collection.
//!
//! Older documents are brought up to date by a chain of pure upgrade steps
//! run once at load time, so the domain types only ever see the current
//! shape.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::affiliate::Affiliate;
use crate::domain::cash_out::CashOut;
use crate::domain::inventory::InventoryChange;
use crate::domain::order::Order;
use crate::domain::referral::{Coupon, Customer, Referral};
use crate::domain::settings::Settings;

pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Namespace for ids minted from legacy `Date.now()` style identifiers.
const LEGACY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5d6f_1e2a_7c3b_4f80_9a1d_2b3c_4d5e_6f70);

const ORDER_STATUSES: &[(&str, &str)] = &[
    ("Pendiente de Confirmación", "PendingConfirmation"),
    ("Activo", "Active"),
    ("Finalizado", "Finished"),
    ("Cancelado", "Cancelled"),
];
const PAYMENT_METHODS: &[(&str, &str)] = &[("Efectivo", "Cash"), ("Transferencia", "Transfer")];
const DELIVERY_CHOICES: &[(&str, &str)] = &[("delivery", "Delivery"), ("pickup", "Pickup")];
const REFERRAL_STATUSES: &[(&str, &str)] = &[
    ("Pedido Activo", "ActiveOrder"),
    ("Completado", "Completed"),
    ("Cancelado", "Cancelled"),
];
const AFFILIATE_STATUSES: &[(&str, &str)] = &[
    ("Pendiente", "Pending"),
    ("Aprobado", "Approved"),
    ("Rechazado", "Rejected"),
    ("Suspendido", "Suspended"),
];
const INVENTORY_STATUSES: &[(&str, &str)] = &[
    ("Pendiente", "Pending"),
    ("Aprobado", "Approved"),
    ("Rechazado", "Rejected"),
    ("Completado", "Completed"),
];
const CASH_OUT_STATUSES: &[(&str, &str)] = &[
    ("Pendiente Confirmación Vendedor", "PendingAffiliateConfirmation"),
    ("Completado", "Completed"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub schema_version: u32,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub affiliates: Vec<Affiliate>,
    #[serde(default)]
    pub inventory_changes: Vec<InventoryChange>,
    #[serde(default)]
    pub cash_outs: Vec<CashOut>,
    #[serde(default)]
    pub referrals: Vec<Referral>,
    #[serde(default)]
    pub coupons: Vec<Coupon>,
    #[serde(default)]
    pub users: Vec<Customer>,
    pub settings: Option<Settings>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported snapshot schema version {0}")]
    UnsupportedVersion(u64),
    #[error("Malformed snapshot: {0}")]
    Malformed(String),
}

/// Parses a snapshot document of any supported version.
pub fn load_snapshot(text: &str) -> Result<Snapshot, SnapshotError> {
    let document: Value = serde_json::from_str(text)?;
    let upgraded = upgrade(document)?;
    Ok(serde_json::from_value(upgraded)?)
}

/// Runs every upgrade step between the document's version and the current
/// one. Documents without a version are version 1.
pub fn upgrade(mut document: Value) -> Result<Value, SnapshotError> {
    let root = document
        .as_object_mut()
        .ok_or_else(|| SnapshotError::Malformed("root is not an object".to_string()))?;
    let mut version = root
        .get("schemaVersion")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    if version > u64::from(CURRENT_SCHEMA_VERSION) {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    while version < u64::from(CURRENT_SCHEMA_VERSION) {
        match version {
            1 => v1_to_v2(root),
            2 => v2_to_v3(root),
            other => return Err(SnapshotError::UnsupportedVersion(other)),
        }
        version += 1;
        root.insert("schemaVersion".to_string(), json!(version));
    }
    Ok(document)
}

/// Translates the browser client's documents: Spanish enum labels,
/// `paymentReceiptImage`, and non-UUID ids. Legacy ids become v5 UUIDs, so
/// the same id maps to the same UUID wherever it is referenced.
fn legacy_values(root: &mut Map<String, Value>) {
    for order in documents_mut(root, "orders") {
        translate(order, "status", ORDER_STATUSES);
        translate(order, "paymentMethod", PAYMENT_METHODS);
        translate(order, "deliveryChoice", DELIVERY_CHOICES);
        if let Some(receipt) = order.remove("paymentReceiptImage") {
            default_field(order, "paymentReceipt", receipt);
        }
        map_id(order, "id", "order");
        map_id(order, "settledInCashOutId", "cashOut");
    }
    for affiliate in documents_mut(root, "affiliates") {
        translate(affiliate, "status", AFFILIATE_STATUSES);
        affiliate.remove("password");
    }
    for change in documents_mut(root, "inventoryChanges") {
        translate(change, "status", INVENTORY_STATUSES);
        map_id(change, "id", "inventoryChange");
    }
    for cash_out in documents_mut(root, "cashOuts") {
        translate(cash_out, "status", CASH_OUT_STATUSES);
        map_id(cash_out, "id", "cashOut");
        if let Some(Value::Array(ids)) = cash_out.get_mut("ordersCoveredIds") {
            for id in ids.iter_mut() {
                *id = legacy_id("order", id);
            }
        }
    }
    for referral in documents_mut(root, "referrals") {
        translate(referral, "status", REFERRAL_STATUSES);
        map_id(referral, "id", "referral");
        map_id(referral, "refereeOrderId", "order");
    }
}

fn translate(doc: &mut Map<String, Value>, key: &str, labels: &[(&str, &str)]) {
    let Some(Value::String(current)) = doc.get(key) else {
        return;
    };
    if let Some((_, name)) = labels.iter().find(|(label, _)| *label == current.as_str()) {
        doc.insert(key.to_string(), json!(name));
    }
}

fn map_id(doc: &mut Map<String, Value>, key: &str, kind: &str) {
    if let Some(id) = doc.get_mut(key) {
        *id = legacy_id(kind, id);
    }
}

fn legacy_id(kind: &str, id: &Value) -> Value {
    let raw = match id {
        Value::String(text) if Uuid::parse_str(text).is_ok() => return id.clone(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => return id.clone(),
    };
    let name = format!("{}:{}", kind, raw);
    json!(Uuid::new_v5(&LEGACY_ID_NAMESPACE, name.as_bytes()))
}

/// Back-fills order fields that older clients left out, and gathers the
/// loose tenant settings into one object.
fn v1_to_v2(root: &mut Map<String, Value>) {
    legacy_values(root);
    for order in documents_mut(root, "orders") {
        default_field(order, "discountApplied", json!(0));
        default_field(order, "deliveryFeeApplied", json!(0));
        default_field(order, "settledInCashOutId", Value::Null);
        default_field(order, "isLowInventoryOrder", json!(false));
        default_field(order, "deliveryChoice", json!("Pickup"));
    }

    if !root.contains_key("settings") {
        let defaults = Settings::default();
        let commission = root
            .remove("affiliateCommissionPerTortilla")
            .unwrap_or_else(|| json!(defaults.commission_rate_cents));
        let price = root
            .remove("tortillaPrice")
            .unwrap_or_else(|| json!(defaults.unit_price.to_string()));
        root.insert(
            "settings".to_string(),
            json!({
                "commissionRateCents": commission,
                "unitPrice": price,
                "rewardUnits": defaults.reward_units,
                "lowStockThreshold": defaults.low_stock_threshold,
            }),
        );
    }
}

/// Records written before the confirmation workflows existed were applied
/// immediately; they are completed.
fn v2_to_v3(root: &mut Map<String, Value>) {
    for change in documents_mut(root, "inventoryChanges") {
        default_field(change, "status", json!("Completed"));
    }
    for cash_out in documents_mut(root, "cashOuts") {
        default_field(cash_out, "status", json!("Completed"));
    }
    for coupon in documents_mut(root, "coupons") {
        default_field(coupon, "isActive", json!(true));
    }
}

fn documents_mut<'a>(
    root: &'a mut Map<String, Value>,
    collection: &str,
) -> impl Iterator<Item = &'a mut Map<String, Value>> {
    root.get_mut(collection)
        .and_then(Value::as_array_mut)
        .into_iter()
        .flat_map(|docs| docs.iter_mut())
        .filter_map(Value::as_object_mut)
}

fn default_field(doc: &mut Map<String, Value>, key: &str, value: Value) {
    if doc.get(key).map_or(true, Value::is_null) {
        doc.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn v1_document() -> Value {
        json!({
            "affiliateCommissionPerTortilla": 150,
            "tortillaPrice": 14,
            "orders": [{
                "id": "6f1c1c4e-3b7a-4b7e-9a39-1f8c7d9b2a10",
                "customerName": "Ana Lopez",
                "phone": "5511112222",
                "address": "Calle 1",
                "quantity": 10,
                "totalCost": 140,
                "paymentMethod": "Cash",
                "timestamp": 1_700_000_000_000i64,
                "status": "Finished",
                "affiliateId": "5599990000",
                "affiliateName": "Tortilleria Sol"
            }],
            "inventoryChanges": [{
                "id": "0b3f3c0e-2b1a-4c55-8d3e-6a0f4b5e9c21",
                "affiliateId": "5599990000",
                "amount": 50,
                "timestamp": 1_700_000_000_000i64
            }],
            "coupons": [{
                "code": "REGALO-ABC123",
                "isUsed": false,
                "rewardAmount": 120
            }]
        })
    }

    #[test]
    fn v1_documents_are_upgraded_to_current() {
        let snapshot =
            load_snapshot(&v1_document().to_string()).expect("v1 snapshot should load");

        assert_eq!(snapshot.schema_version, CURRENT_SCHEMA_VERSION);
        let order = &snapshot.orders[0];
        assert_eq!(order.discount_applied, BigDecimal::from(0));
        assert!(order.settled_in_cash_out_id.is_none());
        assert!(!order.is_low_inventory_order);
        assert_eq!(
            snapshot.inventory_changes[0].status,
            crate::domain::inventory::InventoryChangeStatus::Completed
        );
        assert!(snapshot.coupons[0].is_active);

        let settings = snapshot.settings.expect("settings back-filled");
        assert_eq!(settings.commission_rate_cents, 150);
        assert_eq!(settings.unit_price, BigDecimal::from(14));
    }

    fn browser_document() -> Value {
        json!({
            "affiliateCommissionPerTortilla": 100,
            "tortillaPrice": 12,
            "orders": [{
                "id": "1712345678901",
                "customerName": "Ana Lopez",
                "phone": "5511112222",
                "address": "Calle 1",
                "quantity": 10,
                "totalCost": 120,
                "paymentMethod": "Transferencia",
                "timestamp": 1_712_345_678_901i64,
                "status": "Finalizado",
                "affiliateId": "5599990000",
                "affiliateName": "Tortilleria Sol",
                "deliveryChoice": "delivery",
                "deliveryFeeApplied": 20,
                "paymentReceiptImage": "data:image/png;base64,AAAA",
                "settledInCashOutId": "1712345699999"
            }],
            "affiliates": [{
                "id": "5599990000",
                "customerName": "Tortilleria Sol",
                "phone": "5599990000",
                "address": "Mercado 4",
                "password": "secret",
                "status": "Aprobado",
                "inventory": 90,
                "hasDeliveryService": true,
                "deliveryCost": 20,
                "schedule": {
                    "lunes": { "isOpen": true, "openTime": "08:00", "closeTime": "14:00" }
                },
                "isTemporarilyClosed": false
            }],
            "inventoryChanges": [{
                "id": "1712345600000",
                "affiliateId": "5599990000",
                "amount": 100,
                "timestamp": 1_712_345_600_000i64,
                "status": "Completado"
            }],
            "cashOuts": [{
                "id": "1712345699999",
                "affiliateId": "5599990000",
                "timestamp": 1_712_345_699_999i64,
                "ordersCoveredIds": ["1712345678901"],
                "totalSales": 140,
                "totalCommission": 10,
                "totalDeliveryFees": 20,
                "balance": -30,
                "status": "Pendiente Confirmación Vendedor",
                "startDate": 1_712_345_678_901i64,
                "endDate": 1_712_345_678_901i64
            }],
            "referrals": [{
                "id": "1712345678902",
                "referrerCode": "ANA-2222",
                "referrerName": "Beto Ruiz",
                "referrerPhone": "5533334444",
                "refereeOrderId": "1712345678901",
                "refereeName": "Ana Lopez",
                "refereePhone": "5511112222",
                "refereeOrderQuantity": 10,
                "status": "Pedido Activo",
                "timestamp": 1_712_345_678_902i64
            }],
            "users": [{ "customerName": "Ana Lopez", "phone": "5511112222" }]
        })
    }

    #[test]
    fn browser_documents_load_with_consistent_ids() {
        use crate::domain::affiliate::AffiliateStatus;
        use crate::domain::cash_out::CashOutStatus;
        use crate::domain::order::{DeliveryChoice, OrderStatus, PaymentMethod};
        use crate::domain::referral::ReferralStatus;

        let snapshot = load_snapshot(&browser_document().to_string())
            .expect("browser snapshot should load");

        let order = &snapshot.orders[0];
        assert_eq!(order.status, OrderStatus::Finished);
        assert_eq!(order.payment_method, PaymentMethod::Transfer);
        assert_eq!(order.delivery_choice, DeliveryChoice::Delivery);
        assert_eq!(order.payment_receipt.as_deref(), Some("data:image/png;base64,AAAA"));

        let cash_out = &snapshot.cash_outs[0];
        assert_eq!(cash_out.status, CashOutStatus::PendingAffiliateConfirmation);
        assert_eq!(cash_out.orders_covered_ids, vec![order.id]);
        assert_eq!(order.settled_in_cash_out_id, Some(cash_out.id));

        let referral = &snapshot.referrals[0];
        assert_eq!(referral.status, ReferralStatus::ActiveOrder);
        assert_eq!(referral.referee_order_id, order.id);
        assert_ne!(referral.id, order.id);

        assert_eq!(snapshot.affiliates[0].status, AffiliateStatus::Approved);
        assert_eq!(
            snapshot.inventory_changes[0].status,
            crate::domain::inventory::InventoryChangeStatus::Completed
        );
        assert_eq!(snapshot.users[0].name, "Ana Lopez");

        let again = load_snapshot(&browser_document().to_string()).expect("reload");
        assert_eq!(again.orders[0].id, order.id);
    }

    #[test]
    fn uuid_ids_are_kept_as_they_are() {
        let id = "6f1c1c4e-3b7a-4b7e-9a39-1f8c7d9b2a10";
        assert_eq!(legacy_id("order", &json!(id)), json!(id));
        assert_ne!(
            legacy_id("order", &json!("1712345678901")),
            legacy_id("cashOut", &json!("1712345678901"))
        );
    }

    #[test]
    fn upgrade_keeps_existing_values() {
        let mut doc = v1_document();
        doc["orders"][0]["discountApplied"] = json!(20);
        let upgraded = upgrade(doc).expect("upgrade failed");
        assert_eq!(upgraded["orders"][0]["discountApplied"], json!(20));
        assert_eq!(upgraded["schemaVersion"], json!(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn future_versions_are_rejected() {
        let doc = json!({ "schemaVersion": CURRENT_SCHEMA_VERSION + 1 });
        assert!(matches!(
            upgrade(doc),
            Err(SnapshotError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn non_object_root_is_malformed() {
        assert!(matches!(
            upgrade(json!([1, 2, 3])),
            Err(SnapshotError::Malformed(_))
        ));
    }
}
