use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    #[default]
    Monitored,
    NotMonitored,
    Template,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: HostId,
    pub name: String,
    #[serde(default)]
    pub dns: String,
    #[serde(default)]
    pub ip: String,
    /// Whether `{HOST.CONN}` should resolve to the IP or the DNS name.
    #[serde(default)]
    pub use_ip: bool,
    #[serde(default)]
    pub status: HostStatus,
    #[serde(default)]
    pub available: Availability,
    #[serde(default)]
    pub maintenance: Option<MaintenanceId>,
}

impl HostRecord {
    pub fn conn(&self) -> &str {
        if self.use_ip { &self.ip } else { &self.dns }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<HostId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub id: TriggerId,
    pub host: HostId,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub value: TriggerValue,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Unix timestamp of the last value change.
    #[serde(default)]
    pub last_change: i64,
    /// Whether the latest problem event has been acknowledged.
    #[serde(default)]
    pub acknowledged: bool,
}

fn default_enabled() -> bool {
    true
}

impl TriggerRecord {
    pub fn firing(&self) -> bool {
        self.enabled && self.value == TriggerValue::Problem
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub name: String,
    pub width: f32,
    pub height: f32,
    /// Optional base64-encoded PNG payload for raster compositing; scene
    /// output refers to the image by id only.
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: MaintenanceId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Float,
    Unsigned,
    Str,
    Text,
    Log,
}

impl ValueType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Float | ValueType::Unsigned)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub host: HostId,
    pub key: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub units: String,
}

/// One stored history point. Numeric items carry `value`, the string-ish
/// value types carry `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    pub item: ItemId,
    pub clock: i64,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValue {
    Num(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Last,
    Min,
    Max,
    Avg,
}

impl AggFunc {
    pub fn parse(name: &str) -> Option<AggFunc> {
        match name {
            "last" => Some(AggFunc::Last),
            "min" => Some(AggFunc::Min),
            "max" => Some(AggFunc::Max),
            "avg" => Some(AggFunc::Avg),
            _ => None,
        }
    }
}

/// Fetch-by-id access to the monitored configuration. Absence is never an
/// error; callers degrade per entity.
pub trait Directory {
    fn host(&self, id: HostId) -> Option<HostRecord>;
    fn host_by_name(&self, name: &str) -> Option<HostRecord>;
    fn host_group(&self, id: GroupId) -> Option<GroupRecord>;
    fn trigger(&self, id: TriggerId) -> Option<TriggerRecord>;
    /// Enabled and disabled triggers defined on one host.
    fn host_triggers(&self, id: HostId) -> Vec<TriggerRecord>;
    /// Triggers on the group's monitored, non-template, non-maintenance
    /// member hosts.
    fn group_triggers(&self, id: GroupId) -> Vec<TriggerRecord>;
    fn map(&self, id: MapId) -> Option<MapDef>;
    fn image(&self, id: ImageId) -> Option<ImageRecord>;
    fn item_by_key(&self, host: &str, key: &str) -> Option<ItemRecord>;
    fn maintenance_name(&self, id: MaintenanceId) -> Option<String>;
}

/// Point and windowed-aggregate lookups against stored history.
pub trait TimeSeries {
    fn latest(&self, item: ItemId) -> Option<SeriesValue>;
    /// Aggregate over the trailing `window` seconds, numeric rows only.
    fn aggregate(&self, item: ItemId, func: AggFunc, window: i64, now: i64) -> Option<f64>;
}

/// In-memory snapshot of the monitored world; implements both lookup traits
/// and deserializes from a single JSON document. Drives the CLI and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    #[serde(default)]
    pub hosts: Vec<HostRecord>,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
    #[serde(default)]
    pub triggers: Vec<TriggerRecord>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub history: Vec<HistoryRow>,
    #[serde(default)]
    pub maps: Vec<MapDef>,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
    #[serde(default)]
    pub maintenances: Vec<MaintenanceRecord>,
}

impl World {
    pub fn load(path: &Path) -> Result<World> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read world snapshot '{}'", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse world snapshot '{}'", path.display()))
    }
}

impl Directory for World {
    fn host(&self, id: HostId) -> Option<HostRecord> {
        self.hosts.iter().find(|h| h.id == id).cloned()
    }

    fn host_by_name(&self, name: &str) -> Option<HostRecord> {
        self.hosts.iter().find(|h| h.name == name).cloned()
    }

    fn host_group(&self, id: GroupId) -> Option<GroupRecord> {
        self.groups.iter().find(|g| g.id == id).cloned()
    }

    fn trigger(&self, id: TriggerId) -> Option<TriggerRecord> {
        self.triggers.iter().find(|t| t.id == id).cloned()
    }

    fn host_triggers(&self, id: HostId) -> Vec<TriggerRecord> {
        self.triggers.iter().filter(|t| t.host == id).cloned().collect()
    }

    fn group_triggers(&self, id: GroupId) -> Vec<TriggerRecord> {
        let Some(group) = self.host_group(id) else {
            return Vec::new();
        };

        let mut scoped = Vec::new();
        for host_id in &group.hosts {
            let Some(host) = self.host(*host_id) else {
                continue;
            };
            if host.status != HostStatus::Monitored || host.maintenance.is_some() {
                continue;
            }
            scoped.extend(self.host_triggers(*host_id));
        }
        scoped
    }

    fn map(&self, id: MapId) -> Option<MapDef> {
        self.maps.iter().find(|m| m.id == id).cloned()
    }

    fn image(&self, id: ImageId) -> Option<ImageRecord> {
        self.images.iter().find(|i| i.id == id).cloned()
    }

    fn item_by_key(&self, host: &str, key: &str) -> Option<ItemRecord> {
        let host = self.host_by_name(host)?;
        self.items
            .iter()
            .find(|i| i.host == host.id && i.key == key)
            .cloned()
    }

    fn maintenance_name(&self, id: MaintenanceId) -> Option<String> {
        self.maintenances
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.name.clone())
    }
}

impl TimeSeries for World {
    fn latest(&self, item: ItemId) -> Option<SeriesValue> {
        self.history
            .iter()
            .filter(|row| row.item == item)
            .max_by_key(|row| row.clock)
            .and_then(|row| match (&row.value, &row.text) {
                (Some(value), _) => Some(SeriesValue::Num(*value)),
                (None, Some(text)) => Some(SeriesValue::Text(text.clone())),
                (None, None) => None,
            })
    }

    fn aggregate(&self, item: ItemId, func: AggFunc, window: i64, now: i64) -> Option<f64> {
        let since = now - window;
        let mut values = self
            .history
            .iter()
            .filter(|row| row.item == item && row.clock > since)
            .filter_map(|row| row.value)
            .peekable();

        values.peek()?;
        match func {
            AggFunc::Min => values.fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            }),
            AggFunc::Max => values.fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            }),
            AggFunc::Avg => {
                let (sum, count) = values.fold((0.0, 0_u32), |(s, c), v| (s + v, c + 1));
                Some(sum / f64::from(count))
            }
            // `last` ignores the window, mirroring the point lookup.
            AggFunc::Last => self.latest(item).and_then(|v| match v {
                SeriesValue::Num(n) => Some(n),
                SeriesValue::Text(_) => None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_world() -> World {
        World {
            items: vec![ItemRecord {
                id: 1,
                host: 1,
                key: "cpu.load".to_string(),
                value_type: ValueType::Float,
                units: String::new(),
            }],
            history: vec![
                HistoryRow { item: 1, clock: 100, value: Some(1.0), text: None },
                HistoryRow { item: 1, clock: 200, value: Some(3.0), text: None },
                HistoryRow { item: 1, clock: 300, value: Some(2.0), text: None },
            ],
            ..World::default()
        }
    }

    #[test]
    fn latest_picks_newest_row() {
        let world = history_world();
        assert_eq!(world.latest(1), Some(SeriesValue::Num(2.0)));
    }

    #[test]
    fn aggregate_respects_window() {
        let world = history_world();
        // Window reaches back to clock 150, excluding the first row.
        assert_eq!(world.aggregate(1, AggFunc::Min, 250, 400), Some(2.0));
        assert_eq!(world.aggregate(1, AggFunc::Max, 250, 400), Some(3.0));
        assert_eq!(world.aggregate(1, AggFunc::Avg, 250, 400), Some(2.5));
    }

    #[test]
    fn aggregate_with_no_rows_is_none() {
        let world = history_world();
        assert_eq!(world.aggregate(1, AggFunc::Avg, 10, 400), None);
        assert_eq!(world.aggregate(99, AggFunc::Avg, 1000, 400), None);
    }

    #[test]
    fn group_triggers_skip_unmonitored_and_maintenance_hosts() {
        let mut world = World::default();
        world.hosts = vec![
            HostRecord {
                id: 1,
                name: "a".into(),
                dns: String::new(),
                ip: String::new(),
                use_ip: false,
                status: HostStatus::Monitored,
                available: Availability::Available,
                maintenance: None,
            },
            HostRecord {
                id: 2,
                name: "b".into(),
                dns: String::new(),
                ip: String::new(),
                use_ip: false,
                status: HostStatus::NotMonitored,
                available: Availability::Unknown,
                maintenance: None,
            },
            HostRecord {
                id: 3,
                name: "c".into(),
                dns: String::new(),
                ip: String::new(),
                use_ip: false,
                status: HostStatus::Monitored,
                available: Availability::Available,
                maintenance: Some(9),
            },
        ];
        world.groups = vec![GroupRecord { id: 5, name: "g".into(), hosts: vec![1, 2, 3] }];
        world.triggers = (1..=3)
            .map(|host| TriggerRecord {
                id: host,
                host,
                description: "t".into(),
                priority: Priority::Warning,
                value: TriggerValue::Problem,
                enabled: true,
                last_change: 0,
                acknowledged: false,
            })
            .collect();

        let scoped = world.group_triggers(5);
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].host, 1);
    }
}
