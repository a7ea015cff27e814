//! Site load balancer
//!
//! Grants each active connector at a location one of three current tiers and
//! pushes the grant to the station as a TxProfile. A boot pushes (or clears)
//! the location's default TxDefaultProfile.
//!
//! Recomputations are serialized behind one mutex. Connector locks are held
//! only while a connector's limit is read or changed, and profile requests are
//! sent after every lock has been released.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::ocpp::OutgoingRequest;
use crate::application::ports::SharedPowerHandler;
use crate::application::store::StateStore;
use crate::config::LoadBalancerConfig;
use crate::domain::{Location, OcppResult, PowerRepository};

/// Charging profile id used for the station-wide default profile.
const DEFAULT_PROFILE_ID: i32 = 1;

/// Current tiers in amperes, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerTiers {
    pub high: i32,
    pub middle: i32,
    pub floor: i32,
}

impl Default for PowerTiers {
    fn default() -> Self {
        Self {
            high: 150,
            middle: 100,
            floor: 50,
        }
    }
}

impl From<&LoadBalancerConfig> for PowerTiers {
    fn from(config: &LoadBalancerConfig) -> Self {
        Self {
            high: config.high_amps,
            middle: config.middle_amps,
            floor: config.floor_amps,
        }
    }
}

impl PowerTiers {
    /// Highest tier not already held, else the floor.
    fn pick(&self, held: &[i32]) -> i32 {
        [self.high, self.middle]
            .into_iter()
            .find(|tier| !held.contains(tier))
            .unwrap_or(self.floor)
    }
}

/// One limit granted during a recomputation, to be sent once locks are released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub charge_point_id: String,
    pub connector_id: u32,
    pub transaction_id: i32,
    pub amps: i32,
}

pub struct LoadBalancer {
    store: Arc<StateStore>,
    repository: Arc<dyn PowerRepository>,
    power: SharedPowerHandler,
    tiers: PowerTiers,
    recompute: Mutex<()>,
}

impl LoadBalancer {
    pub fn new(
        store: Arc<StateStore>,
        repository: Arc<dyn PowerRepository>,
        power: SharedPowerHandler,
        tiers: PowerTiers,
    ) -> Self {
        Self {
            store,
            repository,
            power,
            tiers,
            recompute: Mutex::new(()),
        }
    }

    async fn location_of(&self, charge_point_id: &str) -> OcppResult<Option<Location>> {
        let Some(cp) = self.repository.get_charge_point(charge_point_id).await? else {
            return Ok(None);
        };
        let Some(location_id) = cp.location_id else {
            return Ok(None);
        };
        let location = self.repository.get_location(&location_id).await?;
        if location.is_none() {
            warn!(
                charge_point_id,
                location_id = location_id.as_str(),
                "Charge point references an unknown location"
            );
        }
        Ok(location)
    }

    /// Stations at `location`: those it lists, plus every known station that
    /// names it as its location.
    async fn members(&self, location: &Location, charge_point_id: &str) -> OcppResult<Vec<String>> {
        let mut members = location.charge_point_ids.clone();
        members.push(charge_point_id.to_string());
        for cp_id in self.store.charge_point_ids() {
            if location.contains(&cp_id) {
                continue;
            }
            if let Some(cp) = self.repository.get_charge_point(&cp_id).await? {
                if cp.location_id.as_deref() == Some(location.id.as_str()) {
                    members.push(cp_id);
                }
            }
        }
        members.sort();
        members.dedup();
        Ok(members)
    }

    /// Push the location's default limit to a freshly booted station, or clear
    /// it when the default is 0.
    pub async fn on_charge_point_boot(&self, charge_point_id: &str) -> OcppResult<()> {
        let Some(location) = self.location_of(charge_point_id).await? else {
            debug!(charge_point_id, "No location, default profile skipped");
            return Ok(());
        };

        let request = if location.default_power_limit == 0 {
            OutgoingRequest::decode(
                "ClearChargingProfile",
                json!({
                    "connectorId": 0,
                    "chargingProfilePurpose": "TxDefaultProfile",
                }),
            )?
        } else {
            OutgoingRequest::decode(
                "SetChargingProfile",
                profile_payload(0, DEFAULT_PROFILE_ID, "TxDefaultProfile", None, location.default_power_limit),
            )?
        };

        info!(
            charge_point_id,
            location_id = location.id.as_str(),
            default_power_limit = location.default_power_limit,
            action = %request.action(),
            "Applying location default profile"
        );
        if let Err(e) = self.power.send_request(charge_point_id, request).await {
            warn!(charge_point_id, error = %e, "Default profile not sent");
        }
        Ok(())
    }

    /// Recompute the limits of every connector at the charge point's location.
    ///
    /// Returns the grants that were made.
    pub async fn check_power_limit(&self, charge_point_id: &str) -> OcppResult<Vec<Grant>> {
        let _guard = self.recompute.lock().await;

        let Some(location) = self.location_of(charge_point_id).await? else {
            return Ok(Vec::new());
        };

        let members = self.members(&location, charge_point_id).await?;

        // Pass 1: release limits held by idle connectors, collect held tiers.
        let mut held = Vec::new();
        let mut pending = Vec::new();
        for cp_id in &members {
            let smart = match self.repository.get_charge_point(cp_id).await? {
                Some(cp) => cp.smart_charging,
                None => false,
            };
            let Some(state) = self.store.charge_point(cp_id).filter(|_| smart) else {
                continue;
            };

            for connector_id in state.connector_ids() {
                let Some(shared) = state.connector(connector_id) else {
                    continue;
                };
                let mut connector = shared.lock().await;
                if !connector.is_active() {
                    if connector.current_power_limit != 0 {
                        connector.current_power_limit = 0;
                        self.persist_limit(cp_id, connector_id, 0).await;
                        debug!(charge_point_id = cp_id.as_str(), connector_id, "Power limit released");
                    }
                } else if connector.current_power_limit != 0 {
                    held.push(connector.current_power_limit);
                } else {
                    pending.push((cp_id.clone(), connector_id, connector.current_transaction_id));
                }
            }
        }

        // Pass 2: grant a tier to each active connector without one.
        let mut grants = Vec::new();
        for (cp_id, connector_id, transaction_id) in pending {
            let Some(shared) = self
                .store
                .charge_point(&cp_id)
                .and_then(|state| state.connector(connector_id))
            else {
                continue;
            };
            let mut connector = shared.lock().await;
            if connector.current_transaction_id != transaction_id || connector.current_power_limit != 0 {
                continue;
            }
            let amps = self.tiers.pick(&held);
            connector.current_power_limit = amps;
            self.persist_limit(&cp_id, connector_id, amps).await;
            held.push(amps);
            grants.push(Grant {
                charge_point_id: cp_id,
                connector_id,
                transaction_id,
                amps,
            });
        }

        let aggregate: i32 = held.iter().sum();
        if location.power_limit > 0 && aggregate > location.power_limit {
            warn!(
                location_id = location.id.as_str(),
                aggregate,
                power_limit = location.power_limit,
                "Granted current exceeds the site limit"
            );
        }

        for grant in &grants {
            self.send_grant(grant).await;
        }
        Ok(grants)
    }

    async fn persist_limit(&self, charge_point_id: &str, connector_id: u32, amps: i32) {
        if let Err(e) = self
            .repository
            .update_connector_current_power(charge_point_id, connector_id, amps)
            .await
        {
            warn!(charge_point_id, connector_id, error = %e, "Power limit not persisted");
        }
    }

    async fn send_grant(&self, grant: &Grant) {
        info!(
            charge_point_id = grant.charge_point_id.as_str(),
            connector_id = grant.connector_id,
            transaction_id = grant.transaction_id,
            amps = grant.amps,
            "Granting power limit"
        );
        let request = match OutgoingRequest::decode(
            "SetChargingProfile",
            profile_payload(
                grant.connector_id,
                grant.transaction_id,
                "TxProfile",
                Some(grant.transaction_id),
                grant.amps,
            ),
        ) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Charging profile could not be built");
                return;
            }
        };
        if let Err(e) = self.power.send_request(&grant.charge_point_id, request).await {
            warn!(
                charge_point_id = grant.charge_point_id.as_str(),
                connector_id = grant.connector_id,
                error = %e,
                "Charging profile not sent"
            );
        }
    }
}

/// SetChargingProfile payload with a single absolute period at `amps`.
fn profile_payload(
    connector_id: u32,
    profile_id: i32,
    purpose: &str,
    transaction_id: Option<i32>,
    amps: i32,
) -> serde_json::Value {
    let mut profile = json!({
        "chargingProfileId": profile_id,
        "stackLevel": 0,
        "chargingProfilePurpose": purpose,
        "chargingProfileKind": "Absolute",
        "chargingSchedule": {
            "startSchedule": Utc::now(),
            "chargingRateUnit": "A",
            "chargingSchedulePeriod": [
                { "startPeriod": 0, "limit": f64::from(amps) }
            ]
        }
    });
    if let Some(transaction_id) = transaction_id {
        profile["transactionId"] = json!(transaction_id);
    }
    json!({
        "connectorId": connector_id,
        "csChargingProfiles": profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ocpp::Action;
    use crate::application::ports::RecordingPowerHandler;
    use crate::domain::{ChargePoint, NO_TRANSACTION};
    use crate::infrastructure::storage::InMemoryDatabase;

    struct Fixture {
        db: Arc<InMemoryDatabase>,
        store: Arc<StateStore>,
        power: Arc<RecordingPowerHandler>,
        balancer: LoadBalancer,
    }

    fn fixture(default_power_limit: i32, connectors: u32) -> Fixture {
        let db = Arc::new(InMemoryDatabase::new());
        db.insert_location(Location {
            id: "site".into(),
            name: "Site".into(),
            default_power_limit,
            power_limit: 400,
            charge_point_ids: vec!["CP1".into()],
        });
        let mut cp = ChargePoint::new("CP1");
        cp.location_id = Some("site".into());
        cp.smart_charging = true;
        db.insert_charge_point(cp.clone());

        let store = Arc::new(StateStore::new());
        let state = store.insert_charge_point(cp);
        for id in 1..=connectors {
            state.connector_or_insert(id);
        }

        let power = Arc::new(RecordingPowerHandler::new());
        let balancer = LoadBalancer::new(store.clone(), db.clone(), power.clone(), PowerTiers::default());
        Fixture {
            db,
            store,
            power,
            balancer,
        }
    }

    /// Smart station at the site by its own `location_id`, not listed by the site.
    fn add_station(f: &Fixture, charge_point_id: &str, connectors: u32) {
        let mut cp = ChargePoint::new(charge_point_id);
        cp.location_id = Some("site".into());
        cp.smart_charging = true;
        f.db.insert_charge_point(cp.clone());
        let state = f.store.insert_charge_point(cp);
        for id in 1..=connectors {
            state.connector_or_insert(id);
        }
    }

    async fn set_transaction_on(
        store: &StateStore,
        charge_point_id: &str,
        connector_id: u32,
        transaction_id: i32,
    ) {
        let state = store.charge_point(charge_point_id).unwrap();
        let connector = state.connector(connector_id).unwrap();
        connector.lock().await.current_transaction_id = transaction_id;
    }

    async fn limit_on(store: &StateStore, charge_point_id: &str, connector_id: u32) -> i32 {
        let state = store.charge_point(charge_point_id).unwrap();
        let connector = state.connector(connector_id).unwrap();
        let limit = connector.lock().await.current_power_limit;
        limit
    }

    async fn set_transaction(store: &StateStore, connector_id: u32, transaction_id: i32) {
        set_transaction_on(store, "CP1", connector_id, transaction_id).await;
    }

    async fn limit(store: &StateStore, connector_id: u32) -> i32 {
        limit_on(store, "CP1", connector_id).await
    }

    #[tokio::test]
    async fn tiers_are_granted_in_sequence_and_reused() {
        let f = fixture(0, 4);

        for (connector_id, expected) in [(1, 150), (2, 100), (3, 50)] {
            set_transaction(&f.store, connector_id, connector_id as i32).await;
            let grants = f.balancer.check_power_limit("CP1").await.unwrap();
            assert_eq!(grants.len(), 1);
            assert_eq!(grants[0].amps, expected);
            assert_eq!(limit(&f.store, connector_id).await, expected);
        }

        // The 150 A connector stops and its limit is cleared
        set_transaction(&f.store, 1, NO_TRANSACTION).await;
        assert!(f.balancer.check_power_limit("CP1").await.unwrap().is_empty());
        assert_eq!(limit(&f.store, 1).await, 0);
        assert_eq!(f.db.connector("CP1", 1).unwrap().current_power_limit, 0);

        set_transaction(&f.store, 4, 4).await;
        let grants = f.balancer.check_power_limit("CP1").await.unwrap();
        assert_eq!(grants[0].amps, 150);
        assert_eq!(limit(&f.store, 2).await, 100);
        assert_eq!(limit(&f.store, 3).await, 50);

        let sent = f.power.sent();
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|(_, r)| r.action() == Action::SetChargingProfile));
        let payload = sent[3].1.to_payload().unwrap();
        assert_eq!(payload["connectorId"], 4);
        assert_eq!(payload["csChargingProfiles"]["chargingProfilePurpose"], "TxProfile");
        assert_eq!(payload["csChargingProfiles"]["transactionId"], 4);
    }

    #[tokio::test]
    async fn floor_is_shared_once_upper_tiers_are_held() {
        let f = fixture(0, 4);
        for connector_id in 1..=4 {
            set_transaction(&f.store, connector_id, connector_id as i32).await;
        }
        let grants = f.balancer.check_power_limit("CP1").await.unwrap();
        let amps: Vec<i32> = grants.iter().map(|g| g.amps).collect();
        assert_eq!(amps, vec![150, 100, 50, 50]);
    }

    #[tokio::test]
    async fn non_smart_stations_are_ignored() {
        let f = fixture(0, 1);
        let mut cp = f.db.charge_point("CP1").unwrap();
        cp.smart_charging = false;
        f.db.insert_charge_point(cp);

        set_transaction(&f.store, 1, 1).await;
        assert!(f.balancer.check_power_limit("CP1").await.unwrap().is_empty());
        assert!(f.power.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failures_keep_the_grant() {
        let f = fixture(0, 1);
        f.power.disconnect("CP1");
        set_transaction(&f.store, 1, 1).await;
        let grants = f.balancer.check_power_limit("CP1").await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(limit(&f.store, 1).await, 150);
    }

    #[tokio::test]
    async fn boot_pushes_or_clears_default_profile() {
        let f = fixture(32, 0);
        f.balancer.on_charge_point_boot("CP1").await.unwrap();
        let sent = f.power.sent();
        assert_eq!(sent[0].1.action(), Action::SetChargingProfile);
        let payload = sent[0].1.to_payload().unwrap();
        assert_eq!(payload["connectorId"], 0);
        assert_eq!(payload["csChargingProfiles"]["chargingProfilePurpose"], "TxDefaultProfile");

        let f = fixture(0, 0);
        f.balancer.on_charge_point_boot("CP1").await.unwrap();
        let sent = f.power.sent();
        assert_eq!(sent[0].1.action(), Action::ClearChargingProfile);
        assert_eq!(sent[0].1.to_payload().unwrap()["chargingProfilePurpose"], "TxDefaultProfile");
    }

    #[tokio::test]
    async fn unknown_station_is_skipped() {
        let f = fixture(32, 0);
        f.balancer.on_charge_point_boot("CP9").await.unwrap();
        assert!(f.balancer.check_power_limit("CP9").await.unwrap().is_empty());
        assert!(f.power.sent().is_empty());
    }

    #[tokio::test]
    async fn stations_naming_the_site_share_its_tiers() {
        let f = fixture(0, 1);
        add_station(&f, "CP2", 1);

        set_transaction_on(&f.store, "CP2", 1, 20).await;
        let grants = f.balancer.check_power_limit("CP2").await.unwrap();
        assert_eq!(grants[0].amps, 150);

        set_transaction(&f.store, 1, 10).await;
        let grants = f.balancer.check_power_limit("CP1").await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].charge_point_id, "CP1");
        assert_eq!(grants[0].amps, 100);
        assert_eq!(limit_on(&f.store, "CP2", 1).await, 150);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_recomputations_never_share_upper_tiers() {
        let stations = ["CP1", "CP2", "CP3", "CP4"];
        for _ in 0..20 {
            let f = Arc::new(fixture(0, 2));
            for cp_id in &stations[1..] {
                add_station(&f, cp_id, 2);
            }

            let mut tasks = Vec::new();
            for (n, &cp_id) in stations.iter().enumerate() {
                for connector_id in 1..=2u32 {
                    let f = f.clone();
                    let transaction_id = (n as i32) * 10 + connector_id as i32;
                    tasks.push(tokio::spawn(async move {
                        set_transaction_on(&f.store, cp_id, connector_id, transaction_id).await;
                        f.balancer.check_power_limit(cp_id).await.unwrap()
                    }));
                }
            }
            let mut granted = 0;
            for task in tasks {
                granted += task.await.unwrap().len();
            }
            assert_eq!(granted, 8);

            let mut limits = Vec::new();
            for cp_id in &stations {
                for connector_id in 1..=2 {
                    limits.push(limit_on(&f.store, cp_id, connector_id).await);
                }
            }
            assert_eq!(limits.iter().filter(|&&a| a == 150).count(), 1);
            assert_eq!(limits.iter().filter(|&&a| a == 100).count(), 1);
            assert_eq!(limits.iter().filter(|&&a| a == 50).count(), 6);
            assert_eq!(f.power.sent().len(), 8);
        }
    }
}
