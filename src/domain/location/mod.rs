//! Site location with a shared power budget

/// A site grouping charge points behind one grid connection.
///
/// Read-only for the central system; only the load balancer consults it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Location {
    pub id: String,
    pub name: String,
    /// Charge-point-wide default limit pushed at boot (A), 0 clears it
    pub default_power_limit: i32,
    /// Site limit in amperes, 0 when not capped
    pub power_limit: i32,
    pub charge_point_ids: Vec<String>,
}

impl Location {
    pub fn contains(&self, charge_point_id: &str) -> bool {
        self.charge_point_ids.iter().any(|id| id == charge_point_id)
    }
}
