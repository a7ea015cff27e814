//! Charge Point domain entity

use chrono::{DateTime, Utc};
use rust_ocpp::v1_6::types::ChargePointStatus;

/// Sentinel stored in `Connector::current_transaction_id` when idle.
pub const NO_TRANSACTION: i32 = -1;

/// Connector status on a charge point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectorStatus {
    #[default]
    Available,
    Preparing,
    Charging,
    SuspendedEVSE,
    SuspendedEV,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::SuspendedEVSE => "SuspendedEVSE",
            Self::SuspendedEV => "SuspendedEV",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
        }
    }
}

impl std::fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ChargePointStatus> for ConnectorStatus {
    fn from(status: &ChargePointStatus) -> Self {
        match status {
            ChargePointStatus::Available => Self::Available,
            ChargePointStatus::Preparing => Self::Preparing,
            ChargePointStatus::Charging => Self::Charging,
            ChargePointStatus::SuspendedEVSE => Self::SuspendedEVSE,
            ChargePointStatus::SuspendedEV => Self::SuspendedEV,
            ChargePointStatus::Finishing => Self::Finishing,
            ChargePointStatus::Reserved => Self::Reserved,
            ChargePointStatus::Unavailable => Self::Unavailable,
            ChargePointStatus::Faulted => Self::Faulted,
        }
    }
}

/// Connector on a charge point
#[derive(Debug, Clone, PartialEq)]
pub struct Connector {
    pub id: u32,
    pub status: ConnectorStatus,
    pub error_code: String,
    pub info: Option<String>,
    pub vendor_id: Option<String>,
    pub vendor_error_code: Option<String>,
    /// Open transaction on this connector, or [`NO_TRANSACTION`].
    pub current_transaction_id: i32,
    /// Granted power limit in amperes, 0 when unconstrained.
    pub current_power_limit: i32,
}

impl Connector {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            status: ConnectorStatus::default(),
            error_code: "NoError".to_string(),
            info: None,
            vendor_id: None,
            vendor_error_code: None,
            current_transaction_id: NO_TRANSACTION,
            current_power_limit: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current_transaction_id >= 0
    }

    /// Apply a reported status. Available always frees the connector so a
    /// missed StopTransaction cannot leave it stuck.
    ///
    /// Returns the transaction id that was dropped, if any.
    pub fn apply_status(&mut self, status: ConnectorStatus) -> Option<i32> {
        self.status = status;
        if status == ConnectorStatus::Available && self.is_active() {
            let dropped = self.current_transaction_id;
            self.current_transaction_id = NO_TRANSACTION;
            return Some(dropped);
        }
        None
    }
}

/// Charge Point entity
#[derive(Debug, Clone, PartialEq)]
pub struct ChargePoint {
    /// Unique identifier
    pub id: String,
    pub enabled: bool,
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    /// Status reported for connector 0
    pub status: String,
    pub error_code: String,
    pub location_id: Option<String>,
    /// Whether the station accepts charging profiles
    pub smart_charging: bool,
    pub firmware_status: Option<String>,
    pub diagnostics_status: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl ChargePoint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            vendor: String::new(),
            model: String::new(),
            serial_number: None,
            firmware_version: None,
            status: "Unavailable".to_string(),
            error_code: "NoError".to_string(),
            location_id: None,
            smart_charging: false,
            firmware_status: None,
            diagnostics_status: None,
            last_seen: None,
        }
    }

    /// Overwrite the station identity fields with what it reported at boot.
    ///
    /// Returns `true` if anything changed.
    pub fn update_identity(
        &mut self,
        vendor: &str,
        model: &str,
        serial_number: Option<&str>,
        firmware_version: Option<&str>,
    ) -> bool {
        let mut changed = false;
        if self.vendor != vendor {
            self.vendor = vendor.to_string();
            changed = true;
        }
        if self.model != model {
            self.model = model.to_string();
            changed = true;
        }
        if serial_number.is_some() && self.serial_number.as_deref() != serial_number {
            self.serial_number = serial_number.map(String::from);
            changed = true;
        }
        if firmware_version.is_some() && self.firmware_version.as_deref() != firmware_version {
            self.firmware_version = firmware_version.map(String::from);
            changed = true;
        }
        changed
    }

    pub fn touch(&mut self) {
        self.last_seen = Some(Utc::now());
    }
}
