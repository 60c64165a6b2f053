use super::event::event_timestamp;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The kind of network connection at metadata-snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkType {
    Wifi,
    Ethernet,
    Cellular2G,
    Cellular3G,
    Cellular4G,
    Cellular5G,
    #[default]
    Other,
}

impl NetworkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wifi => "Wi-Fi",
            Self::Ethernet => "Ethernet",
            Self::Cellular2G => "2G",
            Self::Cellular3G => "3G",
            Self::Cellular4G => "4G",
            Self::Cellular5G => "5G",
            Self::Other => "Other",
        }
    }
}

/// Reports the current network type. Host applications plug their own
/// reachability logic in here.
pub trait NetworkTypeProvider: Send + Sync + 'static {
    fn current_network_type(&self) -> NetworkType;
}

/// Always answers `Other`; the default when the host supplies nothing.
pub struct UnknownNetwork;

impl NetworkTypeProvider for UnknownNetwork {
    fn current_network_type(&self) -> NetworkType {
        NetworkType::Other
    }
}

/// Produces the opaque metadata map attached to every batch. A fresh
/// snapshot is taken per batch so time- and network-dependent fields are
/// current at admission.
pub trait MetaProvider: Send + 'static {
    fn snapshot(&self) -> Map<String, Value>;
}

/// Shared new-launch marker; `is_new_user` in batch metadata reflects it.
#[derive(Clone, Default)]
pub struct NewLaunchFlag(Arc<AtomicBool>);

impl NewLaunchFlag {
    pub fn new(is_new_launch: bool) -> Self {
        Self(Arc::new(AtomicBool::new(is_new_launch)))
    }

    pub fn set(&self, is_new_launch: bool) {
        self.0.store(is_new_launch, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Default metadata provider: static host-supplied fields (device id, app
/// id, locale and the like) enriched per snapshot with network type, local
/// time, and the new-launch marker.
pub struct AppMeta {
    base: Map<String, Value>,
    network: Arc<dyn NetworkTypeProvider>,
    new_launch: NewLaunchFlag,
}

impl AppMeta {
    pub fn new(
        base: Map<String, Value>,
        network: Arc<dyn NetworkTypeProvider>,
        new_launch: NewLaunchFlag,
    ) -> Self {
        Self {
            base,
            network,
            new_launch,
        }
    }

    pub fn with_base(base: Map<String, Value>) -> Self {
        Self::new(base, Arc::new(UnknownNetwork), NewLaunchFlag::default())
    }
}

impl MetaProvider for AppMeta {
    fn snapshot(&self) -> Map<String, Value> {
        let mut meta = self.base.clone();
        meta.insert(
            "net_type".to_string(),
            Value::from(self.network.current_network_type().as_str()),
        );
        meta.insert("local_time".to_string(), Value::from(event_timestamp()));
        meta.insert(
            "is_new_user".to_string(),
            Value::from(i64::from(self.new_launch.get())),
        );
        meta
    }
}
