use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn default_active_status() -> String {
    "active".to_string()
}
fn default_paid_status() -> String {
    "paid".to_string()
}
fn default_cash_method() -> String {
    "cash".to_string()
}
fn default_manager_role() -> String {
    "manager".to_string()
}
fn default_zero() -> f64 {
    0.0
}
fn default_limit_300() -> i64 {
    300
}
fn default_limit_500() -> i64 {
    500
}

// ── Buildings ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateBuildingInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct AddBuildingMemberInput {
    pub user_id: String,
    #[serde(default = "default_manager_role")]
    pub role: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct BuildingPath {
    pub building_id: String,
}

// ── Tenants ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateTenantInput {
    pub building_id: String,
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    pub phone: Option<String>,
    pub national_id: Option<String>,
    pub occupation: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub flat_no: String,
    #[validate(range(min = 0.0))]
    pub rent_amount: f64,
    #[serde(default = "default_zero")]
    #[validate(range(min = 0.0))]
    pub security_deposit: f64,
    #[serde(default = "default_active_status")]
    pub status: String,
    pub joined_date: Option<String>,
    pub family_members: Option<serde_json::Value>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateTenantInput {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub national_id: Option<String>,
    pub occupation: Option<String>,
    pub flat_no: Option<String>,
    pub rent_amount: Option<f64>,
    pub security_deposit: Option<f64>,
    pub joined_date: Option<String>,
    pub family_members: Option<serde_json::Value>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct MoveOutInput {
    /// Defaults to today when omitted.
    pub exit_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantsQuery {
    pub building_id: String,
    /// When month and year are both given, the list applies the lifecycle
    /// filter for that period and attaches each tenant's payment status.
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub status: Option<String>,
    pub flat_no: Option<String>,
    #[serde(default = "default_limit_500")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantPath {
    pub tenant_id: String,
}

// ── Rent payments ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct RecordPaymentInput {
    pub building_id: String,
    pub tenant_id: String,
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
    /// Defaults to the tenant's contracted rent when omitted.
    pub rent_amount: Option<f64>,
    #[serde(default = "default_zero")]
    #[validate(range(min = 0.0))]
    pub service_charge: f64,
    #[serde(default = "default_paid_status")]
    pub status: String,
    #[serde(default = "default_cash_method")]
    pub method: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PaymentsQuery {
    pub building_id: String,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub tenant_id: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_limit_500")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PaymentPath {
    pub payment_id: String,
}

// ── Expenses ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateExpenseInput {
    pub building_id: String,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(range(min = 0.0))]
    pub amount: f64,
    pub category: String,
    pub expense_date: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ExpensesQuery {
    pub building_id: String,
    pub category: Option<String>,
    #[serde(rename = "from")]
    pub from_date: Option<String>,
    #[serde(rename = "to")]
    pub to_date: Option<String>,
    #[serde(default = "default_limit_300")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ExpensePath {
    pub expense_id: String,
}

// ── Employees ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateEmployeeInput {
    pub building_id: String,
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    pub role_title: Option<String>,
    pub phone: Option<String>,
    #[serde(default = "default_zero")]
    #[validate(range(min = 0.0))]
    pub salary: f64,
    pub joined_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateEmployeeInput {
    pub full_name: Option<String>,
    pub role_title: Option<String>,
    pub phone: Option<String>,
    pub salary: Option<f64>,
    pub joined_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct EmployeesQuery {
    pub building_id: String,
    #[serde(default = "default_limit_300")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct EmployeePath {
    pub employee_id: String,
}

// ── Handovers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateHandoverInput {
    pub building_id: String,
    #[validate(range(min = 0.01))]
    pub amount: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct HandoversQuery {
    pub building_id: String,
    pub status: Option<String>,
    #[serde(default = "default_limit_300")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct HandoverPath {
    pub handover_id: String,
}

// ── Notices / complaints ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateNoticeInput {
    pub building_id: String,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct NoticesQuery {
    pub building_id: String,
    #[serde(default = "default_limit_300")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct NoticePath {
    pub notice_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateComplaintInput {
    pub building_id: String,
    #[validate(length(min = 1, max = 255))]
    pub subject: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ComplaintsQuery {
    pub building_id: String,
    pub status: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(default = "default_limit_300")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ComplaintPath {
    pub complaint_id: String,
}

// ── Reports / activity ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct MonthlyCollectionQuery {
    pub building_id: String,
    #[validate(range(min = 1, max = 12))]
    pub month: u32,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct FinancialSummaryQuery {
    pub building_id: String,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct CashPositionQuery {
    pub building_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ActivityLogsQuery {
    pub building_id: String,
    #[serde(default = "default_limit_300")]
    pub limit: i64,
}

// ── Helpers ────────────────────────────────────────────────────────────────

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: serde::Serialize,
{
    let json = serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

pub fn clamp_limit_in_range(limit: i64, minimum: i64, maximum: i64) -> i64 {
    limit.clamp(minimum, maximum)
}

#[cfg(test)]
mod tests {
    use super::{clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input};

    #[test]
    fn clamps_limits() {
        assert_eq!(clamp_limit_in_range(0, 1, 500), 1);
        assert_eq!(clamp_limit_in_range(9000, 1, 500), 500);
        assert_eq!(clamp_limit_in_range(42, 1, 500), 42);
    }

    #[test]
    fn strips_nulls_from_serialized_patch() {
        let patch = super::UpdateTenantInput {
            full_name: Some("Rahim Uddin".to_string()),
            phone: None,
            national_id: None,
            occupation: None,
            flat_no: None,
            rent_amount: Some(12000.0),
            security_deposit: None,
            joined_date: None,
            family_members: None,
            user_id: None,
        };
        let map = remove_nulls(serialize_to_map(&patch));
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("full_name"));
        assert!(map.contains_key("rent_amount"));
    }

    #[test]
    fn rejects_out_of_range_payment_period() {
        let input = super::RecordPaymentInput {
            building_id: "b1".to_string(),
            tenant_id: "t1".to_string(),
            month: 13,
            year: 2025,
            rent_amount: None,
            service_charge: 0.0,
            status: "paid".to_string(),
            method: "cash".to_string(),
        };
        assert!(validate_input(&input).is_err());
    }
}
