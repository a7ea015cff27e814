//! In-memory storage implementation

use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::AppConfig;
use crate::domain::{
    ChargePoint, Connector, Database, Location, MeterSample, OcppError, OcppResult,
    PowerRepository, Transaction, UserTag,
};

/// In-memory database for development and testing.
///
/// Also serves as the [`PowerRepository`], reading locations seeded from
/// configuration.
pub struct InMemoryDatabase {
    charge_points: DashMap<String, ChargePoint>,
    connectors: DashMap<(String, u32), Connector>,
    transactions: DashMap<i32, Transaction>,
    user_tags: DashMap<String, UserTag>,
    locations: DashMap<String, Location>,
    meter_samples: DashMap<String, Vec<MeterSample>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self {
            charge_points: DashMap::new(),
            connectors: DashMap::new(),
            transactions: DashMap::new(),
            user_tags: DashMap::new(),
            locations: DashMap::new(),
            meter_samples: DashMap::new(),
        }
    }

    /// Database pre-populated with the config's seed tables.
    pub fn from_config(config: &AppConfig) -> Self {
        let db = Self::new();
        for seed in &config.locations {
            db.insert_location(seed.to_location());
        }
        for seed in &config.charge_points {
            let mut cp = seed.to_charge_point();
            // A charge point listed by a location inherits it
            if cp.location_id.is_none() {
                cp.location_id = config
                    .locations
                    .iter()
                    .find(|l| l.charge_points.contains(&cp.id))
                    .map(|l| l.id.clone());
            }
            db.insert_charge_point(cp);
        }
        for seed in &config.user_tags {
            db.insert_user_tag(seed.to_user_tag());
        }
        db
    }

    pub fn insert_charge_point(&self, charge_point: ChargePoint) {
        self.charge_points
            .insert(charge_point.id.clone(), charge_point);
    }

    pub fn insert_connector(&self, charge_point_id: &str, connector: Connector) {
        self.connectors
            .insert((charge_point_id.to_string(), connector.id), connector);
    }

    pub fn insert_transaction(&self, transaction: Transaction) {
        self.transactions.insert(transaction.id, transaction);
    }

    pub fn insert_user_tag(&self, tag: UserTag) {
        self.user_tags.insert(tag.id_tag.clone(), tag);
    }

    pub fn insert_location(&self, location: Location) {
        self.locations.insert(location.id.clone(), location);
    }

    pub fn charge_point(&self, id: &str) -> Option<ChargePoint> {
        self.charge_points.get(id).map(|cp| cp.clone())
    }

    pub fn connector(&self, charge_point_id: &str, connector_id: u32) -> Option<Connector> {
        self.connectors
            .get(&(charge_point_id.to_string(), connector_id))
            .map(|c| c.clone())
    }

    pub fn transaction(&self, id: i32) -> Option<Transaction> {
        self.transactions.get(&id).map(|t| t.clone())
    }

    pub fn user_tag(&self, id_tag: &str) -> Option<UserTag> {
        self.user_tags.get(id_tag).map(|t| t.clone())
    }

    pub fn meter_samples(&self, charge_point_id: &str) -> Vec<MeterSample> {
        self.meter_samples
            .get(charge_point_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn get_charge_points(&self) -> OcppResult<Vec<ChargePoint>> {
        Ok(self.charge_points.iter().map(|e| e.value().clone()).collect())
    }

    async fn get_connectors(&self, charge_point_id: &str) -> OcppResult<Vec<Connector>> {
        let mut connectors: Vec<Connector> = self
            .connectors
            .iter()
            .filter(|e| e.key().0 == charge_point_id)
            .map(|e| e.value().clone())
            .collect();
        connectors.sort_by_key(|c| c.id);
        Ok(connectors)
    }

    async fn add_charge_point(&self, charge_point: &ChargePoint) -> OcppResult<()> {
        if self.charge_points.contains_key(&charge_point.id) {
            return Err(OcppError::Database(format!(
                "charge point {} already exists",
                charge_point.id
            )));
        }
        self.insert_charge_point(charge_point.clone());
        Ok(())
    }

    async fn update_charge_point(&self, charge_point: &ChargePoint) -> OcppResult<()> {
        match self.charge_points.get_mut(&charge_point.id) {
            Some(mut existing) => {
                *existing = charge_point.clone();
                Ok(())
            }
            None => Err(OcppError::not_found("charge point", &charge_point.id)),
        }
    }

    async fn add_connector(&self, charge_point_id: &str, connector: &Connector) -> OcppResult<()> {
        self.insert_connector(charge_point_id, connector.clone());
        Ok(())
    }

    async fn update_connector(
        &self,
        charge_point_id: &str,
        connector: &Connector,
    ) -> OcppResult<()> {
        self.insert_connector(charge_point_id, connector.clone());
        Ok(())
    }

    async fn add_transaction(&self, transaction: &Transaction) -> OcppResult<()> {
        if self.transactions.contains_key(&transaction.id) {
            return Err(OcppError::Database(format!(
                "transaction {} already exists",
                transaction.id
            )));
        }
        self.insert_transaction(transaction.clone());
        Ok(())
    }

    async fn update_transaction(&self, transaction: &Transaction) -> OcppResult<()> {
        match self.transactions.get_mut(&transaction.id) {
            Some(mut existing) => {
                *existing = transaction.clone();
                Ok(())
            }
            None => Err(OcppError::not_found("transaction", transaction.id)),
        }
    }

    async fn get_transaction(&self, id: i32) -> OcppResult<Option<Transaction>> {
        Ok(self.transaction(id))
    }

    async fn get_last_transaction(&self) -> OcppResult<Option<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .max_by_key(|e| *e.key())
            .map(|e| e.value().clone()))
    }

    async fn get_user_tag(&self, id_tag: &str) -> OcppResult<Option<UserTag>> {
        Ok(self.user_tag(id_tag))
    }

    async fn add_user_tag(&self, tag: &UserTag) -> OcppResult<()> {
        self.insert_user_tag(tag.clone());
        Ok(())
    }

    async fn add_meter_samples(&self, samples: &[MeterSample]) -> OcppResult<()> {
        for sample in samples {
            self.meter_samples
                .entry(sample.charge_point_id.clone())
                .or_default()
                .push(sample.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl PowerRepository for InMemoryDatabase {
    async fn get_charge_point(&self, charge_point_id: &str) -> OcppResult<Option<ChargePoint>> {
        Ok(self.charge_point(charge_point_id))
    }

    async fn get_location(&self, location_id: &str) -> OcppResult<Option<Location>> {
        Ok(self.locations.get(location_id).map(|l| l.clone()))
    }

    async fn update_connector_current_power(
        &self,
        charge_point_id: &str,
        connector_id: u32,
        power_limit: i32,
    ) -> OcppResult<()> {
        let key = (charge_point_id.to_string(), connector_id);
        let mut connector = self
            .connectors
            .entry(key)
            .or_insert_with(|| Connector::new(connector_id));
        connector.current_power_limit = power_limit;
        Ok(())
    }
}
