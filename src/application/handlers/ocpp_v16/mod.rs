//! OCPP 1.6 action handlers, one file per action

mod handle_authorize;
mod handle_boot_notification;
mod handle_data_transfer;
mod handle_diagnostics_status_notification;
mod handle_firmware_status_notification;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_status_notification;
mod handle_stop_transaction;

/// Wire spelling of a protocol enum, e.g. `Energy.Active.Import.Register`.
fn wire_name<T: serde::Serialize + std::fmt::Debug>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => format!("{:?}", value),
    }
}
