//! Transaction domain entity

use chrono::{DateTime, Utc};

/// One charging session on one connector.
///
/// Created by StartTransaction and closed exactly once by StopTransaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Process-wide unique transaction ID
    pub id: i32,
    pub charge_point_id: String,
    pub connector_id: u32,
    /// ID tag that started the transaction
    pub id_tag: String,
    /// Username resolved from the ID tag, empty if unknown
    pub username: String,
    pub user_note: String,
    /// Meter value at start (Wh)
    pub meter_start: i32,
    /// Meter value at stop (Wh)
    pub meter_stop: i32,
    pub time_start: DateTime<Utc>,
    pub time_stop: Option<DateTime<Utc>>,
    pub reservation_id: Option<i32>,
    pub is_finished: bool,
    pub reason: Option<String>,
}

impl Transaction {
    pub fn new(
        id: i32,
        charge_point_id: impl Into<String>,
        connector_id: u32,
        id_tag: impl Into<String>,
        meter_start: i32,
        time_start: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            charge_point_id: charge_point_id.into(),
            connector_id,
            id_tag: id_tag.into(),
            username: String::new(),
            user_note: String::new(),
            meter_start,
            meter_stop: meter_start,
            time_start,
            time_stop: None,
            reservation_id: None,
            is_finished: false,
            reason: None,
        }
    }

    /// Close the transaction. Returns `false` if it was already closed, in
    /// which case nothing is modified.
    pub fn finish(
        &mut self,
        meter_stop: i32,
        time_stop: DateTime<Utc>,
        reason: Option<String>,
    ) -> bool {
        if self.is_finished {
            return false;
        }
        self.meter_stop = meter_stop;
        self.time_stop = Some(time_stop);
        self.reason = reason;
        self.is_finished = true;
        true
    }

    /// Energy delivered in Wh, once closed
    pub fn energy_consumed(&self) -> Option<i32> {
        self.is_finished
            .then(|| self.meter_stop.saturating_sub(self.meter_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_is_applied_once() {
        let start = Utc::now();
        let mut tx = Transaction::new(1, "CP1", 1, "TAG", 100, start);
        let stop = start + chrono::Duration::minutes(30);

        assert!(tx.finish(1500, stop, Some("Local".into())));
        assert!(!tx.finish(9999, Utc::now(), None));

        assert_eq!(tx.meter_stop, 1500);
        assert_eq!(tx.time_stop, Some(stop));
        assert_eq!(tx.reason.as_deref(), Some("Local"));
        assert_eq!(tx.energy_consumed(), Some(1400));
    }
}
