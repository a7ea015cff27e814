//! Protocol state machine and the services that react to it

pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod handlers;
pub mod load_balancer;
pub mod logging;
pub mod ocpp;
pub mod ports;
pub mod store;
pub mod trigger_watcher;

pub use dispatcher::Dispatcher;
pub use events::{EventBus, SharedEventBus};
pub use handlers::{HandlerSettings, SystemHandler};
pub use load_balancer::{LoadBalancer, PowerTiers};
pub use logging::TracingLogHandler;
pub use ports::{PowerHandler, SharedPowerHandler};
pub use store::StateStore;
pub use trigger_watcher::{trigger_watcher, TriggerHandle, TriggerWatcher};
